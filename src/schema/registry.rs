//! Registry of content types.
//!
//! Populated once at startup and read-only afterwards; share it behind
//! an `Arc` and read without locking.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use super::types::{ContentType, FieldKind};
use crate::error::RepoError;
use crate::library::check_slug;

/// All registered content types, keyed by name
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    types: BTreeMap<String, Arc<ContentType>>,
}

impl SchemaRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a content type.
    ///
    /// Fails if the name is taken, the descriptor is inconsistent, the
    /// directory is shared with another type, or a reference field
    /// targets a type that is not registered (self-references allowed).
    pub fn register(&mut self, ty: ContentType) -> Result<(), RepoError> {
        if self.types.contains_key(&ty.name) {
            return Err(RepoError::DuplicateType(ty.name));
        }
        ty.check()?;

        if let Some(other) = self.types.values().find(|t| t.directory == ty.directory) {
            return Err(RepoError::schema(
                &ty.name,
                format!(
                    "directory '{}' already belongs to '{}'",
                    ty.directory.display(),
                    other.name
                ),
            ));
        }

        for field in &ty.fields {
            if let FieldKind::Reference { target } = &field.kind {
                if target != &ty.name && !self.types.contains_key(target) {
                    return Err(RepoError::schema(
                        &ty.name,
                        format!(
                            "field '{}' references unregistered type '{}'",
                            field.name, target
                        ),
                    ));
                }
            }
        }

        tracing::debug!("Registered content type {}", ty.name);
        self.types.insert(ty.name.clone(), Arc::new(ty));
        Ok(())
    }

    /// Look up a type by name
    pub fn get(&self, name: &str) -> Result<Arc<ContentType>, RepoError> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| RepoError::UnknownType(name.to_string()))
    }

    /// All types, ordered by name
    pub fn types(&self) -> impl Iterator<Item = &Arc<ContentType>> {
        self.types.values()
    }

    pub fn names(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Map a path relative to the content root back to (type, slug).
    ///
    /// Hidden files (including in-flight temp files) never map.
    pub fn locate(&self, relative: &Path) -> Option<(Arc<ContentType>, String)> {
        let parent = relative.parent()?;
        let file_name = relative.file_name()?.to_str()?;
        if file_name.starts_with('.') {
            return None;
        }

        self.types
            .values()
            .find(|t| t.directory == parent)
            .and_then(|ty| {
                let slug = file_name.strip_suffix(ty.extension.as_str())?;
                check_slug(slug).ok()?;
                Some((Arc::clone(ty), slug.to_string()))
            })
    }
}
