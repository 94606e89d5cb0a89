//! folio - Schema-validated content repository
//!
//! Manages a tree of typed content files (pages, posts, diary entries,
//! skills, ...) for a static site: each item is one file holding a YAML
//! metadata block and a free-text body, validated against the schema of
//! its content type.
//!
//! # Architecture
//!
//! The file tree is the only persisted state:
//! - Every write is atomic (temp file + rename), so readers see the old
//!   or the new file, never a torn one
//! - Mutations of one item are serialized by a per-item lock
//! - Listings are served from an in-memory index rebuilt from disk on demand
//!
//! # Modules
//!
//! - `schema`: Content types, field kinds, validation
//! - `library`: Slug/path resolution and the front-matter codec
//! - `core`: Storage, locks, index, and the repository service
//! - `domain`: Data structures (Value, Metadata, ContentItem)
//! - `api`: JSON request/response contract
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Create a post (slug derived from the title)
//! folio create post --set title="Hello World" --set tags=rust,web --body-file hello.md
//!
//! # List and show
//! folio list post
//! folio show post hello-world
//!
//! # Serve JSON requests from a UI host
//! folio serve --watch
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod library;
pub mod schema;

// Re-export main types at crate root for convenience
pub use core::{ContentRepository, FsStorage, IndexWatcher, ItemIndex, Storage};
pub use domain::{ContentItem, ItemSummary, Metadata, RawMetadata, Value};
pub use error::{FieldViolation, Problem, RepoError, ValidationErrors};
pub use schema::{ContentType, FieldKind, FieldSpec, Rule, SchemaRegistry, Validator};
