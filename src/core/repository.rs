//! Content repository: the public CRUD API.
//!
//! Every mutation follows validate-then-commit: the submission is fully
//! validated before any file is touched, the per-item lock is held from
//! the existence check through the write and the index invalidation, and
//! the lock is released on every exit path.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::index::{slug_of, ItemIndex};
use super::locks::ItemLocks;
use super::storage::{FsStorage, Storage};
use crate::config::ResolvedConfig;
use crate::domain::{revision_of, ContentItem, ItemSummary, Metadata, RawMetadata};
use crate::error::{FieldViolation, RepoError, ValidationErrors};
use crate::library::{codec, resolve_path, slug_for_title, unique_slug};
use crate::schema::{validate, ContentType, FieldKind, SchemaRegistry};

/// CRUD service over a content tree
pub struct ContentRepository {
    registry: Arc<SchemaRegistry>,
    storage: Arc<dyn Storage>,
    index: Arc<ItemIndex>,
    locks: ItemLocks,
}

impl ContentRepository {
    /// Create a repository over `storage` with a fresh index
    pub fn new(registry: Arc<SchemaRegistry>, storage: Arc<dyn Storage>) -> Self {
        let index = Arc::new(ItemIndex::new(Arc::clone(&storage)));
        Self::with_index(registry, storage, index)
    }

    /// Create a repository sharing an existing index
    pub fn with_index(
        registry: Arc<SchemaRegistry>,
        storage: Arc<dyn Storage>,
        index: Arc<ItemIndex>,
    ) -> Self {
        Self {
            registry,
            storage,
            index,
            locks: ItemLocks::new(),
        }
    }

    /// Open the content tree described by a resolved configuration
    pub fn open(config: &ResolvedConfig) -> Result<Self, RepoError> {
        let registry = config.registry()?;
        let storage = FsStorage::new(&config.content_root);
        Ok(Self::new(Arc::new(registry), Arc::new(storage)))
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn index(&self) -> &Arc<ItemIndex> {
        &self.index
    }

    /// Create a new item; the slug is derived from the title field and
    /// suffixed (`-2`, `-3`, ...) if already taken
    pub async fn create(
        &self,
        type_name: &str,
        raw: &RawMetadata,
        body: &str,
    ) -> Result<ContentItem, RepoError> {
        let ty = self.registry.get(type_name)?;
        let metadata = self.validated(&ty, raw).await?;
        let text = codec::encode(&ty, &metadata, body).map_err(RepoError::Encoding)?;

        let base = metadata
            .get(&ty.title_field)
            .map(|title| slug_for_title(&title.to_string()))
            .unwrap_or_else(|| slug_for_title(""));

        let mut taken = self.existing_slugs(&ty).await?;
        loop {
            let slug = unique_slug(&base, &taken);
            let path = resolve_path(&ty, &slug)?;

            let guard = self.locks.acquire(&ty.name, &slug).await;
            if self.storage.exists(&path).await? {
                // Lost a race for this slug; try the next suffix
                drop(guard);
                tracing::debug!("Slug {}/{} taken, retrying", ty.name, slug);
                taken.insert(slug);
                continue;
            }

            self.storage.write(&path, &text).await?;
            self.index.invalidate(&ty.name, Some(&slug)).await;
            drop(guard);

            tracing::info!("Created {}/{}", ty.name, slug);
            return Ok(ContentItem::new(&ty.name, slug, metadata, body, path, &text));
        }
    }

    /// Replace an item's metadata and body.
    ///
    /// `raw` must be the complete field set: omitted optional fields are
    /// removed (or reset to their default), not carried over.
    pub async fn update(
        &self,
        type_name: &str,
        slug: &str,
        raw: &RawMetadata,
        body: &str,
    ) -> Result<ContentItem, RepoError> {
        self.replace(type_name, slug, raw, body, None).await
    }

    /// Like [`update`](Self::update), but fails with `Conflict` unless the
    /// stored item is still at `expected_revision`
    pub async fn update_if(
        &self,
        type_name: &str,
        slug: &str,
        raw: &RawMetadata,
        body: &str,
        expected_revision: &str,
    ) -> Result<ContentItem, RepoError> {
        self.replace(type_name, slug, raw, body, Some(expected_revision))
            .await
    }

    async fn replace(
        &self,
        type_name: &str,
        slug: &str,
        raw: &RawMetadata,
        body: &str,
        expected_revision: Option<&str>,
    ) -> Result<ContentItem, RepoError> {
        let ty = self.registry.get(type_name)?;
        let path = resolve_path(&ty, slug)?;
        if !self.storage.exists(&path).await? {
            return Err(RepoError::NotFound { path });
        }

        let metadata = self.validated(&ty, raw).await?;
        let text = codec::encode(&ty, &metadata, body).map_err(RepoError::Encoding)?;

        let guard = self.locks.acquire(&ty.name, slug).await;
        // Re-read under the lock: the item may have been deleted or
        // rewritten while we validated
        let current = self.storage.read(&path).await?;
        if let Some(expected) = expected_revision {
            let actual = revision_of(&current);
            if actual != expected {
                return Err(RepoError::Conflict {
                    type_name: ty.name.clone(),
                    slug: slug.to_string(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        self.storage.write(&path, &text).await?;
        self.index.invalidate(&ty.name, Some(slug)).await;
        drop(guard);

        tracing::info!("Updated {}/{}", ty.name, slug);
        Ok(ContentItem::new(&ty.name, slug, metadata, body, path, &text))
    }

    /// Read-modify-write under the item lock.
    ///
    /// `edit` sees the committed state and returns the complete
    /// replacement (metadata, body), which is validated like an update.
    pub async fn modify<F>(
        &self,
        type_name: &str,
        slug: &str,
        edit: F,
    ) -> Result<ContentItem, RepoError>
    where
        F: FnOnce(&ContentItem) -> (RawMetadata, String) + Send,
    {
        let ty = self.registry.get(type_name)?;
        let path = resolve_path(&ty, slug)?;

        let guard = self.locks.acquire(&ty.name, slug).await;
        let current = self.load(&ty, slug, &path).await?;
        let (raw, body) = edit(&current);

        let metadata = self.validated(&ty, &raw).await?;
        let text = codec::encode(&ty, &metadata, &body).map_err(RepoError::Encoding)?;

        self.storage.write(&path, &text).await?;
        self.index.invalidate(&ty.name, Some(slug)).await;
        drop(guard);

        tracing::info!("Modified {}/{}", ty.name, slug);
        Ok(ContentItem::new(&ty.name, slug, metadata, body, path, &text))
    }

    /// Move an item to a new slug.
    ///
    /// The new file is written before the old one is removed, so an
    /// interruption can leave both copies but never neither.
    pub async fn rename(
        &self,
        type_name: &str,
        slug: &str,
        new_slug: &str,
    ) -> Result<ContentItem, RepoError> {
        let ty = self.registry.get(type_name)?;
        let from = resolve_path(&ty, slug)?;
        let to = resolve_path(&ty, new_slug)?;
        if slug == new_slug {
            return self.get(type_name, slug).await;
        }

        let guards = self.locks.acquire_all(&ty.name, &[slug, new_slug]).await;
        let current = self.load(&ty, slug, &from).await?;
        if self.storage.exists(&to).await? {
            return Err(RepoError::SlugTaken {
                type_name: ty.name.clone(),
                slug: new_slug.to_string(),
            });
        }

        let text = self.storage.read(&from).await?;
        self.storage.write(&to, &text).await?;
        self.index.invalidate(&ty.name, Some(new_slug)).await;
        // The new copy is visible from here on, even if the old one stays
        let removed = self.storage.delete(&from).await;
        self.index.invalidate(&ty.name, Some(slug)).await;
        drop(guards);
        removed?;

        tracing::info!("Renamed {}/{} to {}", ty.name, slug, new_slug);
        Ok(ContentItem::new(
            &ty.name,
            new_slug,
            current.metadata,
            current.body,
            to,
            &text,
        ))
    }

    /// Remove an item; deleting a missing item is `NotFound`
    pub async fn delete(&self, type_name: &str, slug: &str) -> Result<(), RepoError> {
        let ty = self.registry.get(type_name)?;
        let path = resolve_path(&ty, slug)?;

        let guard = self.locks.acquire(&ty.name, slug).await;
        self.storage.delete(&path).await?;
        self.index.invalidate(&ty.name, Some(slug)).await;
        drop(guard);

        tracing::info!("Deleted {}/{}", ty.name, slug);
        Ok(())
    }

    /// Read a full item straight from disk
    pub async fn get(&self, type_name: &str, slug: &str) -> Result<ContentItem, RepoError> {
        let ty = self.registry.get(type_name)?;
        let path = resolve_path(&ty, slug)?;
        self.load(&ty, slug, &path).await
    }

    /// Summaries of every item of a type, ordered by slug
    pub async fn list(&self, type_name: &str) -> Result<Vec<ItemSummary>, RepoError> {
        let ty = self.registry.get(type_name)?;
        self.index.list_summaries(&ty).await
    }

    async fn load(
        &self,
        ty: &ContentType,
        slug: &str,
        path: &Path,
    ) -> Result<ContentItem, RepoError> {
        let text = self.storage.read(path).await?;
        let doc = codec::decode(&text, ty).map_err(|source| RepoError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(ContentItem::new(
            &ty.name,
            slug,
            doc.metadata,
            doc.body,
            path.to_path_buf(),
            &text,
        ))
    }

    async fn existing_slugs(&self, ty: &ContentType) -> Result<HashSet<String>, RepoError> {
        let paths = self.storage.list(ty.directory(), &ty.extension).await?;
        Ok(paths
            .iter()
            .filter_map(|path| slug_of(path, &ty.extension))
            .collect())
    }

    /// Schema validation plus reference checks, all violations together
    async fn validated(&self, ty: &ContentType, raw: &RawMetadata) -> Result<Metadata, RepoError> {
        let (metadata, mut violations) = validate::collect(ty, raw);
        violations.extend(self.dangling_references(ty, &metadata).await?);

        if violations.is_empty() {
            Ok(metadata)
        } else {
            Err(RepoError::Validation(ValidationErrors(violations)))
        }
    }

    async fn dangling_references(
        &self,
        ty: &ContentType,
        metadata: &Metadata,
    ) -> Result<Vec<FieldViolation>, RepoError> {
        let mut violations = Vec::new();
        for spec in &ty.fields {
            let FieldKind::Reference { target } = &spec.kind else {
                continue;
            };
            let Some(slug) = metadata.get(&spec.name).and_then(|v| v.as_str()) else {
                continue;
            };

            let target_ty = self.registry.get(target)?;
            let path = resolve_path(&target_ty, slug)?;
            if !self.storage.exists(&path).await? {
                violations.push(FieldViolation::invalid(
                    &spec.name,
                    format!("no {} named '{}'", target, slug),
                ));
            }
        }
        Ok(violations)
    }
}
