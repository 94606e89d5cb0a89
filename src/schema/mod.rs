//! Content type schemas.
//!
//! A content type declares its fields, where its files live, and which
//! field names an item. Types are registered once at startup.

pub mod registry;
pub mod site;
pub mod types;
pub mod validate;

pub use registry::SchemaRegistry;
pub use site::site_types;
pub use types::{ContentType, FieldKind, FieldSpec, Rule, Validator};
pub use validate::{coerce, validate};
