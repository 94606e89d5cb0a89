//! Configuration for the content tree.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variable (FOLIO_CONTENT_ROOT)
//! 2. Config file (.folio/config.yaml)
//! 3. Defaults (./src/content)
//!
//! Config file discovery:
//! - Searches current directory and parents for .folio/config.yaml
//! - Falls back to the user config dir (e.g. ~/.config/folio/config.yaml)
//! - Paths in a project config file are relative to the project root
//!   (the parent of .folio/)

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::RepoError;
use crate::schema::{coerce, site_types, ContentType, FieldKind, FieldSpec, Rule, SchemaRegistry};

/// Environment override for the content root
pub const CONTENT_ROOT_ENV: &str = "FOLIO_CONTENT_ROOT";

/// Content root used when nothing else is configured
pub const DEFAULT_CONTENT_ROOT: &str = "src/content";

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    /// Extra content types beyond the built-in site types
    #[serde(default)]
    pub types: Vec<TypeDef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Content root (relative to the project root)
    pub content_root: Option<String>,
    /// Type name to subdirectory override
    #[serde(default)]
    pub directories: HashMap<String, String>,
}

/// A content type declared in YAML
#[derive(Debug, Clone, Deserialize)]
pub struct TypeDef {
    pub name: String,
    pub directory: String,
    pub extension: Option<String>,
    pub title_field: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl TypeDef {
    pub fn to_content_type(&self) -> Result<ContentType, RepoError> {
        let mut ty = ContentType::new(&self.name, &self.directory);
        if let Some(extension) = &self.extension {
            ty = ty.with_extension(extension);
        }
        if let Some(title_field) = &self.title_field {
            ty = ty.with_title_field(title_field);
        }

        for def in &self.fields {
            let mut spec = FieldSpec::new(&def.name, def.kind.clone());
            if def.required {
                spec = spec.required();
            }
            if let Some(raw) = &def.default {
                let value = coerce(&def.kind, raw).map_err(|reason| {
                    RepoError::schema(&self.name, format!("default for '{}': {}", def.name, reason))
                })?;
                spec = spec.with_default(value);
            }
            for rule in &def.rules {
                spec = spec.with_rule(rule.clone());
            }
            ty = ty.field(spec);
        }
        Ok(ty)
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to the content root
    pub content_root: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Type name to subdirectory override
    pub directories: HashMap<String, String>,
    /// Extra content types from the config file
    pub types: Vec<TypeDef>,
}

impl ResolvedConfig {
    /// Configuration rooted at `content_root` with no overrides
    pub fn with_root(content_root: impl Into<PathBuf>) -> Self {
        Self {
            content_root: content_root.into(),
            config_file: None,
            directories: HashMap::new(),
            types: Vec::new(),
        }
    }

    /// Build the schema registry: built-in site types, then declared types,
    /// with directory overrides applied to both
    pub fn registry(&self) -> Result<SchemaRegistry, RepoError> {
        let mut registry = SchemaRegistry::new();

        let declared = self
            .types
            .iter()
            .map(TypeDef::to_content_type)
            .collect::<Result<Vec<_>, _>>()?;

        for ty in site_types().into_iter().chain(declared) {
            let ty = match self.directories.get(&ty.name) {
                Some(dir) => ty.with_directory(dir),
                None => ty,
            };
            registry.register(ty)?;
        }
        Ok(registry)
    }
}

/// Find config file by searching `start` and its parents, then the user
/// config dir
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".folio").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    dirs::config_dir()
        .map(|dir| dir.join("folio").join("config.yaml"))
        .filter(|path| path.exists())
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Project root a config file's relative paths hang off
fn base_dir(config_path: &Path, start: &Path) -> PathBuf {
    let folio_dir = config_path.parent();
    match folio_dir {
        Some(dir) if dir.file_name().is_some_and(|n| n == ".folio") => dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| start.to_path_buf()),
        // User-level config: relative paths follow the working directory
        _ => start.to_path_buf(),
    }
}

fn resolve(start: &Path, env_root: Option<PathBuf>) -> Result<ResolvedConfig> {
    let config_file = find_config_file(start);

    let (file_root, directories, types) = match &config_file {
        Some(config_path) => {
            let config = load_config_file(config_path)?;
            let base = base_dir(config_path, start);
            let root = config
                .paths
                .content_root
                .as_deref()
                .map(|p| resolve_path(&base, p))
                .unwrap_or_else(|| base.join(DEFAULT_CONTENT_ROOT));
            tracing::debug!("Loaded config from {}", config_path.display());
            (root, config.paths.directories, config.types)
        }
        None => (start.join(DEFAULT_CONTENT_ROOT), HashMap::new(), Vec::new()),
    };

    Ok(ResolvedConfig {
        content_root: env_root.unwrap_or(file_root),
        config_file,
        directories,
        types,
    })
}

/// Load configuration as seen from `start`
pub fn load_config_from(start: &Path) -> Result<ResolvedConfig> {
    let env_root = std::env::var_os(CONTENT_ROOT_ENV).map(PathBuf::from);
    resolve(start, env_root)
}

fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    load_config_from(&cwd)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
