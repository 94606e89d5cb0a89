//! In-memory index of item summaries, per content type.
//!
//! Populated lazily from disk on first listing, then kept until
//! invalidated. The index is derived state only: dropping it costs a
//! rescan, never data.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::storage::Storage;
use crate::domain::ItemSummary;
use crate::error::RepoError;
use crate::library::{check_slug, codec, resolve_path};
use crate::schema::ContentType;

#[derive(Debug, Default)]
struct TypeIndex {
    summaries: BTreeMap<String, ItemSummary>,

    /// Slugs whose files changed since they were indexed
    stale: BTreeSet<String>,
}

/// Cache of item summaries keyed by type name
pub struct ItemIndex {
    storage: Arc<dyn Storage>,
    types: RwLock<HashMap<String, TypeIndex>>,
}

impl ItemIndex {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            types: RwLock::new(HashMap::new()),
        }
    }

    /// Summaries for every item of `ty`, ordered by slug
    pub async fn list_summaries(&self, ty: &ContentType) -> Result<Vec<ItemSummary>, RepoError> {
        {
            let types = self.types.read().await;
            if let Some(index) = types.get(&ty.name) {
                if index.stale.is_empty() {
                    return Ok(index.summaries.values().cloned().collect());
                }
            }
        }

        let mut types = self.types.write().await;
        match types.get_mut(&ty.name) {
            Some(index) => {
                let stale = std::mem::take(&mut index.stale);
                for slug in &stale {
                    if let Err(e) = self.refresh(ty, index, slug).await {
                        // Keep the remaining entries marked for the next attempt
                        index.stale.extend(stale.iter().cloned());
                        return Err(e);
                    }
                }
                Ok(index.summaries.values().cloned().collect())
            }
            None => {
                let index = self.scan(ty).await?;
                let summaries = index.summaries.values().cloned().collect();
                types.insert(ty.name.clone(), index);
                Ok(summaries)
            }
        }
    }

    /// Drop one slug (or the whole type) from the cache.
    ///
    /// A dropped slug is re-read on the next listing; a dropped type is
    /// rescanned.
    pub async fn invalidate(&self, type_name: &str, slug: Option<&str>) {
        let mut types = self.types.write().await;
        match slug {
            Some(slug) => {
                if let Some(index) = types.get_mut(type_name) {
                    index.stale.insert(slug.to_string());
                    tracing::debug!("Invalidated {}/{}", type_name, slug);
                }
            }
            None => {
                if types.remove(type_name).is_some() {
                    tracing::debug!("Invalidated all {} summaries", type_name);
                }
            }
        }
    }

    /// Forget everything
    pub async fn clear(&self) {
        self.types.write().await.clear();
    }

    /// Whether a type is currently populated
    pub async fn is_cached(&self, type_name: &str) -> bool {
        self.types.read().await.contains_key(type_name)
    }

    async fn scan(&self, ty: &ContentType) -> Result<TypeIndex, RepoError> {
        let paths = self.storage.list(ty.directory(), &ty.extension).await?;
        let mut index = TypeIndex::default();

        for path in paths {
            let Some(slug) = slug_of(&path, &ty.extension) else {
                tracing::warn!("Skipping {}: file name is not a valid slug", path.display());
                continue;
            };
            let summary = self.summarize(ty, &path, &slug).await?;
            index.summaries.insert(slug, summary);
        }

        tracing::debug!("Indexed {} {} items", index.summaries.len(), ty.name);
        Ok(index)
    }

    async fn refresh(
        &self,
        ty: &ContentType,
        index: &mut TypeIndex,
        slug: &str,
    ) -> Result<(), RepoError> {
        if check_slug(slug).is_err() {
            // Never listed, so nothing to refresh
            index.summaries.remove(slug);
            return Ok(());
        }
        let path = resolve_path(ty, slug)?;
        match self.summarize(ty, &path, slug).await {
            Ok(summary) => {
                index.summaries.insert(slug.to_string(), summary);
                Ok(())
            }
            Err(RepoError::NotFound { .. }) => {
                index.summaries.remove(slug);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn summarize(
        &self,
        ty: &ContentType,
        path: &Path,
        slug: &str,
    ) -> Result<ItemSummary, RepoError> {
        let head = self.storage.read_head(path).await?;
        let metadata = codec::decode_metadata(&head, ty).map_err(|source| RepoError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        let last_modified = self.storage.modified(path).await?;

        let title = metadata
            .get(&ty.title_field)
            .map(ToString::to_string)
            .unwrap_or_else(|| slug.to_string());

        Ok(ItemSummary {
            slug: slug.to_string(),
            title,
            last_modified,
        })
    }
}

/// File stem of an item path, if it is a usable slug
pub(crate) fn slug_of(path: &Path, extension: &str) -> Option<String> {
    path.file_name()?
        .to_str()?
        .strip_suffix(extension)
        .filter(|s| check_slug(s).is_ok())
        .map(String::from)
}
