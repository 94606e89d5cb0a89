//! Content tree watcher.
//!
//! Keeps the [`ItemIndex`] honest when files are edited outside the
//! repository (by hand, by git, by another process): changed item files
//! are marked stale, removed type directories drop the whole type.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use thiserror::Error;
use tokio::sync::mpsc;

use super::index::ItemIndex;
use crate::schema::SchemaRegistry;

/// Errors that can occur starting the watcher
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Content root does not exist: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("Watcher task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// What a filesystem change means for the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    Item { type_name: String, slug: String },
    Type(String),
}

/// Watches a content root and invalidates index entries on change
pub struct IndexWatcher {
    root: PathBuf,
    registry: Arc<SchemaRegistry>,
    index: Arc<ItemIndex>,
    debounce: Duration,
}

impl IndexWatcher {
    pub fn new(root: impl Into<PathBuf>, registry: Arc<SchemaRegistry>, index: Arc<ItemIndex>) -> Self {
        Self {
            root: root.into(),
            registry,
            index,
            debounce: Duration::from_millis(250),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Map an absolute event path to the index entry it affects
    pub fn classify(&self, path: &Path) -> Option<Invalidation> {
        let relative = path.strip_prefix(&self.root).ok()?;

        if let Some((ty, slug)) = self.registry.locate(relative) {
            return Some(Invalidation::Item {
                type_name: ty.name.clone(),
                slug,
            });
        }
        self.registry
            .types()
            .find(|ty| ty.directory() == relative)
            .map(|ty| Invalidation::Type(ty.name.clone()))
    }

    /// Start watching; must be called inside a tokio runtime
    pub fn start(mut self) -> Result<WatchHandle, WatcherError> {
        if !self.root.is_dir() {
            return Err(WatcherError::DirectoryNotFound(self.root));
        }
        // Event paths come back canonicalized on some platforms
        if let Ok(canonical) = self.root.canonicalize() {
            self.root = canonical;
        }

        let (event_tx, mut event_rx) = mpsc::channel::<DebounceEventResult>(64);
        let mut debouncer = new_debouncer(self.debounce, move |result: DebounceEventResult| {
            let _ = event_tx.blocking_send(result);
        })?;
        debouncer
            .watcher()
            .watch(&self.root, RecursiveMode::Recursive)?;

        tracing::info!("Watching {} for content changes", self.root.display());

        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        let task = tokio::spawn(async move {
            // Dropping the debouncer stops the underlying watcher
            let _debouncer = debouncer;
            loop {
                tokio::select! {
                    _ = stop_rx.recv() => {
                        tracing::info!("Watcher stopping...");
                        break;
                    }
                    received = event_rx.recv() => match received {
                        Some(Ok(events)) => {
                            for event in events {
                                self.apply(&event.path).await;
                            }
                        }
                        Some(Err(e)) => tracing::warn!("Watcher error: {:?}", e),
                        None => break,
                    }
                }
            }
        });

        Ok(WatchHandle { stop_tx, task })
    }

    async fn apply(&self, path: &Path) {
        match self.classify(path) {
            Some(Invalidation::Item { type_name, slug }) => {
                self.index.invalidate(&type_name, Some(&slug)).await;
            }
            Some(Invalidation::Type(type_name)) => {
                self.index.invalidate(&type_name, None).await;
            }
            None => tracing::trace!("Ignoring change to {}", path.display()),
        }
    }
}

/// Handle to control the watcher
pub struct WatchHandle {
    stop_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl WatchHandle {
    /// Stop the watcher and wait for it to finish
    pub async fn stop(self) -> Result<(), WatcherError> {
        let _ = self.stop_tx.send(()).await;
        self.task.await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::{FsStorage, Storage};
    use crate::schema::{ContentType, FieldSpec};
    use tempfile::TempDir;

    fn post() -> ContentType {
        ContentType::new("post", "posts").field(FieldSpec::string("title").required())
    }

    fn watcher(root: &Path) -> (IndexWatcher, Arc<ItemIndex>, Arc<FsStorage>) {
        let mut registry = SchemaRegistry::new();
        registry.register(post()).unwrap();
        let storage = Arc::new(FsStorage::new(root));
        let index = Arc::new(ItemIndex::new(storage.clone()));
        let watcher = IndexWatcher::new(root, Arc::new(registry), Arc::clone(&index));
        (watcher, index, storage)
    }

    #[test]
    fn test_classify_item_and_type_paths() {
        let temp = TempDir::new().unwrap();
        let (watcher, _, _) = watcher(temp.path());

        assert_eq!(
            watcher.classify(&temp.path().join("posts/hello.md")),
            Some(Invalidation::Item {
                type_name: "post".to_string(),
                slug: "hello".to_string(),
            })
        );
        assert_eq!(
            watcher.classify(&temp.path().join("posts")),
            Some(Invalidation::Type("post".to_string()))
        );
    }

    #[test]
    fn test_classify_ignores_noise() {
        let temp = TempDir::new().unwrap();
        let (watcher, _, _) = watcher(temp.path());

        assert_eq!(watcher.classify(&temp.path().join("posts/.folio-x.tmp")), None);
        assert_eq!(watcher.classify(&temp.path().join("posts/notes.txt")), None);
        assert_eq!(watcher.classify(&temp.path().join("drafts/a.md")), None);
        assert_eq!(watcher.classify(Path::new("/elsewhere/posts/a.md")), None);
    }

    #[test]
    fn test_start_requires_existing_root() {
        let temp = TempDir::new().unwrap();
        let (watcher, _, _) = watcher(&temp.path().join("missing"));
        assert!(matches!(
            watcher.start(),
            Err(WatcherError::DirectoryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_apply_marks_entries_stale() {
        let temp = TempDir::new().unwrap();
        let (watcher, index, storage) = watcher(temp.path());
        storage
            .write(Path::new("posts/a.md"), "---\ntitle: A\n---\n")
            .await
            .unwrap();
        index.list_summaries(&post()).await.unwrap();

        storage
            .write(Path::new("posts/a.md"), "---\ntitle: Edited\n---\n")
            .await
            .unwrap();
        watcher.apply(&temp.path().join("posts/a.md")).await;
        assert_eq!(index.list_summaries(&post()).await.unwrap()[0].title, "Edited");

        watcher.apply(&temp.path().join("posts")).await;
        assert!(!index.is_cached("post").await);
    }
}
