//! Content items and their lightweight summaries.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::value::Metadata;

/// Raw field data as submitted by a caller (form or JSON request)
pub type RawMetadata = serde_json::Map<String, serde_json::Value>;

/// A single managed item, fully loaded
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentItem {
    /// Name of the content type
    #[serde(rename = "type")]
    pub type_name: String,

    /// Unique identifier within the type, also the file stem
    pub slug: String,

    /// Validated field values in schema order
    pub metadata: Metadata,

    /// Free text after the metadata block, verbatim
    pub body: String,

    /// Hash of the on-disk text this item was read from or written as
    pub revision: String,

    /// Location relative to the content root
    source_path: PathBuf,
}

impl ContentItem {
    pub(crate) fn new(
        type_name: impl Into<String>,
        slug: impl Into<String>,
        metadata: Metadata,
        body: impl Into<String>,
        source_path: PathBuf,
        text: &str,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            slug: slug.into(),
            metadata,
            body: body.into(),
            revision: revision_of(text),
            source_path,
        }
    }

    /// Location relative to the content root (derived from type and slug)
    pub fn source_path(&self) -> &std::path::Path {
        &self.source_path
    }
}

/// Listing projection, built without reading bodies
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemSummary {
    pub slug: String,

    /// Value of the type's title field, or the slug when absent
    pub title: String,

    pub last_modified: DateTime<Utc>,
}

/// Revision of a file's text (SHA256[0:8] as 16 hex chars)
pub fn revision_of(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_consistency() {
        let a = revision_of("---\ntitle: A\n---\nbody");
        let b = revision_of("---\ntitle: A\n---\nbody");
        let c = revision_of("---\ntitle: B\n---\nbody");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_item_serializes_type_and_path() {
        let item = ContentItem::new(
            "post",
            "hello",
            Metadata::new(),
            "text",
            PathBuf::from("posts/hello.md"),
            "raw",
        );
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "post");
        assert_eq!(json["source_path"], "posts/hello.md");
        assert_eq!(json["body"], "text");
    }
}
