//! Content type descriptors: field kinds, field specs, rules.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::domain::Value;
use crate::error::RepoError;

/// Closed set of field kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// Single-line string
    String,

    /// Multi-line string
    Text,

    Number,

    Boolean,

    /// Calendar date (YYYY-MM-DD)
    Date,

    /// One of a fixed set of strings
    Enum { options: Vec<String> },

    StringList,

    /// Slug of an item of another (or the same) type
    Reference { target: String },
}

impl FieldKind {
    pub fn label(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Text => "text",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::Enum { .. } => "enum",
            FieldKind::StringList => "string_list",
            FieldKind::Reference { .. } => "reference",
        }
    }
}

/// Declarative checks applied after coercion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Strings must not be blank; lists must have at least one entry
    NonEmpty,

    /// Maximum characters (strings) or entries (lists)
    MaxLength(usize),

    Min(f64),

    Max(f64),

    /// Glob the string must match
    Pattern(String),

    /// `#RGB` or `#RRGGBB`
    HexColor,
}

impl Rule {
    /// Check a coerced value; returns a reason on failure
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match (self, value) {
            (Rule::NonEmpty, Value::Text(s)) if s.trim().is_empty() => {
                Err("must not be empty".to_string())
            }
            (Rule::NonEmpty, Value::List(items)) if items.is_empty() => {
                Err("must have at least one entry".to_string())
            }
            (Rule::MaxLength(max), Value::Text(s)) if s.chars().count() > *max => {
                Err(format!("must be at most {} characters", max))
            }
            (Rule::MaxLength(max), Value::List(items)) if items.len() > *max => {
                Err(format!("must have at most {} entries", max))
            }
            (Rule::Min(min), Value::Number(n)) if n < min => {
                Err(format!("must be at least {}", min))
            }
            (Rule::Max(max), Value::Number(n)) if n > max => {
                Err(format!("must be at most {}", max))
            }
            (Rule::Pattern(glob), Value::Text(s)) => match Pattern::new(glob) {
                Ok(pattern) if pattern.matches(s) => Ok(()),
                Ok(_) => Err(format!("must match pattern '{}'", glob)),
                Err(e) => Err(format!("invalid pattern '{}': {}", glob, e)),
            },
            (Rule::HexColor, Value::Text(s)) if !is_hex_color(s) => {
                Err("must be a hex color like #2A53DD".to_string())
            }
            _ => Ok(()),
        }
    }
}

fn is_hex_color(s: &str) -> bool {
    match s.strip_prefix('#') {
        Some(hex) => {
            (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}

/// Programmatic predicate attached to a field
#[derive(Clone)]
pub struct Validator {
    name: String,
    check: Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>,
}

impl Validator {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn check(&self, value: &Value) -> Result<(), String> {
        (self.check)(value)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator").field("name", &self.name).finish()
    }
}

/// One declared field of a content type
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<Value>,
    pub rules: Vec<Rule>,
    pub validator: Option<Validator>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: None,
            rules: Vec::new(),
            validator: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Number)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Date)
    }

    pub fn list(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::StringList)
    }

    pub fn one_of<I, S>(name: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            FieldKind::Enum {
                options: options.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn reference(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Reference {
                target: target.into(),
            },
        )
    }

    /// Mark the field required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the value applied when the field is not supplied
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }
}

/// Immutable descriptor of a content type
#[derive(Debug, Clone)]
pub struct ContentType {
    /// Unique key, e.g. "post"
    pub name: String,

    /// Subdirectory of the content root
    pub directory: PathBuf,

    /// File extension including the dot, e.g. ".md"
    pub extension: String,

    /// Field whose value names the item (slug source and listing title)
    pub title_field: String,

    /// Fields in declaration order
    pub fields: Vec<FieldSpec>,
}

impl ContentType {
    /// Create a type storing `<directory>/<slug>.md`, titled by `title`
    pub fn new(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            directory: directory.into(),
            extension: ".md".to_string(),
            title_field: "title".to_string(),
            fields: Vec::new(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        self.extension = if extension.starts_with('.') {
            extension
        } else {
            format!(".{}", extension)
        };
        self
    }

    pub fn with_title_field(mut self, field: impl Into<String>) -> Self {
        self.title_field = field.into();
        self
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn field_spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Check the descriptor is internally consistent
    pub fn check(&self) -> Result<(), RepoError> {
        if self.name.trim().is_empty() {
            return Err(RepoError::schema(&self.name, "type name is empty"));
        }
        if self.directory.as_os_str().is_empty()
            || self.directory.is_absolute()
            || self
                .directory
                .components()
                .any(|c| !matches!(c, std::path::Component::Normal(_)))
        {
            return Err(RepoError::schema(
                &self.name,
                format!(
                    "directory must be a plain relative path: {}",
                    self.directory.display()
                ),
            ));
        }
        if !self.extension.starts_with('.')
            || self.extension.len() < 2
            || self.extension[1..].contains(['.', '/', '\\'])
        {
            return Err(RepoError::schema(
                &self.name,
                format!("invalid extension '{}'", self.extension),
            ));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(RepoError::schema(
                    &self.name,
                    format!("duplicate field '{}'", field.name),
                ));
            }
            if let Some(default) = &field.default {
                super::validate::coerce(&field.kind, &default.to_json()).map_err(|reason| {
                    RepoError::schema(
                        &self.name,
                        format!("default for '{}' is invalid: {}", field.name, reason),
                    )
                })?;
            }
            for rule in &field.rules {
                if let Rule::Pattern(glob) = rule {
                    Pattern::new(glob).map_err(|e| {
                        RepoError::schema(
                            &self.name,
                            format!("invalid pattern on '{}': {}", field.name, e),
                        )
                    })?;
                }
            }
        }

        if self.field_spec(&self.title_field).is_none() {
            return Err(RepoError::schema(
                &self.name,
                format!("title field '{}' is not declared", self.title_field),
            ));
        }

        Ok(())
    }
}
