//! Command-line interface for folio.
//!
//! Provides commands for inspecting content types, listing and showing
//! items, creating/updating/renaming/deleting them, and a JSON-lines
//! request loop (`serve`) for UI hosts.

use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::api;
use crate::config::{self, ResolvedConfig};
use crate::core::{ContentRepository, IndexWatcher};
use crate::domain::{ContentItem, RawMetadata};

/// folio - schema-validated content repository
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Content root (overrides config file and FOLIO_CONTENT_ROOT)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List registered content types and their fields
    Types,

    /// List items of a content type
    List {
        /// Content type name (e.g. post, diary, skill)
        type_name: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show a single item
    Show {
        type_name: String,
        slug: String,

        /// Print JSON instead of the front matter and body
        #[arg(long)]
        json: bool,
    },

    /// Create an item; the slug is derived from its title
    Create {
        type_name: String,

        #[command(flatten)]
        content: ContentArgs,
    },

    /// Replace an item's metadata and body
    Update {
        type_name: String,
        slug: String,

        #[command(flatten)]
        content: ContentArgs,

        /// Start from the stored item and only change what is given
        #[arg(long)]
        merge: bool,

        /// Refuse to write unless the item is still at this revision
        #[arg(long, conflicts_with = "merge")]
        revision: Option<String>,
    },

    /// Give an item a new slug
    Rename {
        type_name: String,
        slug: String,
        new_slug: String,
    },

    /// Delete an item
    Delete { type_name: String, slug: String },

    /// Show resolved configuration (debug)
    Config,

    /// Answer JSON requests on stdin, one per line
    Serve {
        /// Invalidate cached listings when files change on disk
        #[arg(long)]
        watch: bool,
    },
}

/// Metadata and body input shared by create and update
#[derive(clap::Args, Debug)]
pub struct ContentArgs {
    /// Field assignment, repeatable (e.g. --set title="Hello" --set tags=a,b)
    #[arg(short, long = "set", value_name = "FIELD=VALUE", value_parser = parse_assignment)]
    pub set: Vec<(String, String)>,

    /// Read the body from a file
    #[arg(short, long, conflicts_with = "stdin")]
    pub body_file: Option<PathBuf>,

    /// Read the body from stdin
    #[arg(long)]
    pub stdin: bool,
}

impl ContentArgs {
    fn metadata(&self) -> RawMetadata {
        self.set
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect()
    }

    /// Body if one was supplied
    fn body(&self) -> Result<Option<String>> {
        if let Some(path) = &self.body_file {
            let body = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read body file: {}", path.display()))?;
            Ok(Some(body))
        } else if self.stdin {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read from stdin")?;
            Ok(Some(buffer))
        } else {
            Ok(None)
        }
    }
}

fn parse_assignment(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing field name in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = resolve_config(self.root)?;

        match self.command {
            Commands::Types => show_types(&config),
            Commands::List { type_name, json } => list_items(&config, &type_name, json).await,
            Commands::Show {
                type_name,
                slug,
                json,
            } => show_item(&config, &type_name, &slug, json).await,
            Commands::Create { type_name, content } => {
                create_item(&config, &type_name, &content).await
            }
            Commands::Update {
                type_name,
                slug,
                content,
                merge,
                revision,
            } => update_item(&config, &type_name, &slug, &content, merge, revision).await,
            Commands::Rename {
                type_name,
                slug,
                new_slug,
            } => rename_item(&config, &type_name, &slug, &new_slug).await,
            Commands::Delete { type_name, slug } => delete_item(&config, &type_name, &slug).await,
            Commands::Config => show_config(&config),
            Commands::Serve { watch } => serve(&config, watch).await,
        }
    }
}

fn resolve_config(root: Option<PathBuf>) -> Result<ResolvedConfig> {
    let mut resolved = config::config()?.clone();
    if let Some(root) = root {
        resolved.content_root = root;
    }
    Ok(resolved)
}

fn open(config: &ResolvedConfig) -> Result<ContentRepository> {
    ContentRepository::open(config).context("Failed to build content schema")
}

fn show_types(config: &ResolvedConfig) -> Result<()> {
    let registry = config.registry()?;

    for ty in registry.types() {
        println!("{} ({}/*{})", ty.name, ty.directory().display(), ty.extension);
        for spec in &ty.fields {
            let mut notes = Vec::new();
            if spec.required {
                notes.push("required".to_string());
            }
            if let Some(default) = &spec.default {
                notes.push(format!("default {}", default));
            }
            if spec.name == ty.title_field {
                notes.push("title".to_string());
            }
            let notes = if notes.is_empty() {
                String::new()
            } else {
                format!("  [{}]", notes.join(", "))
            };
            println!("  {:<14} {:<12}{}", spec.name, spec.kind.label(), notes);
        }
        println!();
    }

    Ok(())
}

async fn list_items(config: &ResolvedConfig, type_name: &str, json: bool) -> Result<()> {
    let repo = open(config)?;
    let items = repo.list(type_name).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No {} items. Use 'folio create {}' to add one.", type_name, type_name);
        return Ok(());
    }

    println!("{:<32} {:<40} {:<20}", "SLUG", "TITLE", "MODIFIED");
    println!("{}", "-".repeat(92));

    for item in &items {
        let title = if item.title.chars().count() > 37 {
            format!("{}...", item.title.chars().take(37).collect::<String>())
        } else {
            item.title.clone()
        };
        println!(
            "{:<32} {:<40} {:<20}",
            item.slug,
            title,
            item.last_modified.format("%Y-%m-%d %H:%M")
        );
    }

    println!("\nTotal: {} items", items.len());

    Ok(())
}

async fn show_item(config: &ResolvedConfig, type_name: &str, slug: &str, json: bool) -> Result<()> {
    let repo = open(config)?;
    let item = repo.get(type_name, slug).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        print_item(&item);
    }

    Ok(())
}

fn print_item(item: &ContentItem) {
    println!("{}/{}  (revision {})", item.type_name, item.slug, item.revision);
    println!("{}", "-".repeat(60));
    for (name, value) in item.metadata.iter() {
        println!("{:<14} {}", name, value);
    }
    if !item.body.is_empty() {
        println!();
        print!("{}", item.body);
        if !item.body.ends_with('\n') {
            println!();
        }
    }
}

async fn create_item(config: &ResolvedConfig, type_name: &str, content: &ContentArgs) -> Result<()> {
    let repo = open(config)?;
    let body = content.body()?.unwrap_or_default();
    let item = repo.create(type_name, &content.metadata(), &body).await?;

    eprintln!("Created {}", item.source_path().display());
    println!("{}", item.slug);

    Ok(())
}

async fn update_item(
    config: &ResolvedConfig,
    type_name: &str,
    slug: &str,
    content: &ContentArgs,
    merge: bool,
    revision: Option<String>,
) -> Result<()> {
    let repo = open(config)?;
    let body = content.body()?;
    let changes = content.metadata();

    let item = if merge {
        repo.modify(type_name, slug, |current| {
            let mut metadata = current.metadata.to_raw();
            metadata.extend(changes);
            (metadata, body.unwrap_or_else(|| current.body.clone()))
        })
        .await?
    } else {
        let body = body.unwrap_or_default();
        match revision {
            Some(revision) => {
                repo.update_if(type_name, slug, &changes, &body, &revision)
                    .await?
            }
            None => repo.update(type_name, slug, &changes, &body).await?,
        }
    };

    eprintln!("Updated {} (revision {})", item.source_path().display(), item.revision);

    Ok(())
}

async fn rename_item(
    config: &ResolvedConfig,
    type_name: &str,
    slug: &str,
    new_slug: &str,
) -> Result<()> {
    let repo = open(config)?;
    let item = repo.rename(type_name, slug, new_slug).await?;

    eprintln!("Renamed {}/{} to {}", type_name, slug, item.source_path().display());

    Ok(())
}

async fn delete_item(config: &ResolvedConfig, type_name: &str, slug: &str) -> Result<()> {
    let repo = open(config)?;
    repo.delete(type_name, slug).await?;

    eprintln!("Deleted {}/{}", type_name, slug);

    Ok(())
}

fn show_config(config: &ResolvedConfig) -> Result<()> {
    println!("Folio Configuration");
    println!("{}", "=".repeat(60));
    println!();
    println!(
        "Config file:  {}",
        config
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!("Content root: {}", config.content_root.display());
    println!();
    println!("Type directories:");
    match config.registry() {
        Ok(registry) => {
            for ty in registry.types() {
                println!(
                    "  {:<10} {}",
                    ty.name,
                    config.content_root.join(ty.directory()).display()
                );
            }
        }
        Err(e) => println!("  (schema error: {})", e),
    }
    println!();
    println!("Declared types: {}", config.types.len());

    Ok(())
}

/// JSON-lines request loop. Requests run concurrently; responses carry
/// the request's `id` so hosts can match them up.
async fn serve(config: &ResolvedConfig, watch: bool) -> Result<()> {
    let repo = Arc::new(open(config)?);

    let watcher = if watch {
        tokio::fs::create_dir_all(&config.content_root)
            .await
            .with_context(|| {
                format!("Failed to create content root: {}", config.content_root.display())
            })?;
        let watcher = IndexWatcher::new(
            &config.content_root,
            Arc::clone(repo.registry()),
            Arc::clone(repo.index()),
        );
        Some(watcher.start()?)
    } else {
        None
    };

    tracing::info!("Serving requests for {}", config.content_root.display());

    let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err()
                || stdout.write_all(b"\n").await.is_err()
                || stdout.flush().await.is_err()
            {
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read request")? {
        if line.trim().is_empty() {
            continue;
        }
        let repo = Arc::clone(&repo);
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            let response = api::handle_line(&repo, &line).await;
            let _ = out_tx.send(response).await;
        });
    }

    // Writer exits once every in-flight request has answered
    drop(out_tx);
    writer.await?;

    if let Some(handle) = watcher {
        handle.stop().await?;
    }

    Ok(())
}
