//! Domain types for the content repository.
//!
//! This module contains the core data structures:
//! - Value/Metadata: Typed, schema-ordered field data
//! - ContentItem: A fully loaded item (metadata + body)
//! - ItemSummary: Listing projection without the body

pub mod item;
pub mod value;

// Re-export commonly used types
pub use item::{revision_of, ContentItem, ItemSummary, RawMetadata};
pub use value::{Metadata, Value, DATE_FORMAT};
