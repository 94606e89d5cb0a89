//! Atomic Write Integration Tests
//!
//! Interrupting a write between staging and rename must leave the
//! previous file (or nothing) behind.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio::domain::RawMetadata;
use folio::schema::{ContentType, FieldSpec, SchemaRegistry};
use folio::{ContentRepository, FsStorage, RepoError, Storage};
use serde_json::json;
use tempfile::TempDir;

/// Filesystem storage that can "crash" after staging a write, or fail
/// deletes outright
struct CrashingStorage {
    inner: FsStorage,
    crash: AtomicBool,
    fail_delete: AtomicBool,
}

#[async_trait]
impl Storage for CrashingStorage {
    async fn read(&self, path: &Path) -> Result<String, RepoError> {
        self.inner.read(path).await
    }

    async fn read_head(&self, path: &Path) -> Result<String, RepoError> {
        self.inner.read_head(path).await
    }

    async fn write(&self, path: &Path, text: &str) -> Result<(), RepoError> {
        let staged = self.inner.stage(path, text).await?;
        if self.crash.load(Ordering::SeqCst) {
            // The temp file is complete on disk but never renamed
            assert!(staged.temp_path().exists());
            drop(staged);
            return Err(RepoError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "simulated crash"),
            });
        }
        staged.commit().await
    }

    async fn delete(&self, path: &Path) -> Result<(), RepoError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(RepoError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        self.inner.delete(path).await
    }

    async fn exists(&self, path: &Path) -> Result<bool, RepoError> {
        self.inner.exists(path).await
    }

    async fn modified(&self, path: &Path) -> Result<DateTime<Utc>, RepoError> {
        self.inner.modified(path).await
    }

    async fn list(&self, dir: &Path, extension: &str) -> Result<Vec<PathBuf>, RepoError> {
        self.inner.list(dir, extension).await
    }
}

fn setup() -> (ContentRepository, Arc<CrashingStorage>, TempDir) {
    let temp = TempDir::new().unwrap();
    let mut registry = SchemaRegistry::new();
    registry
        .register(ContentType::new("page", "pages").field(FieldSpec::string("title").required()))
        .unwrap();

    let storage = Arc::new(CrashingStorage {
        inner: FsStorage::new(temp.path()),
        crash: AtomicBool::new(false),
        fail_delete: AtomicBool::new(false),
    });
    let repo = ContentRepository::new(Arc::new(registry), storage.clone());
    (repo, storage, temp)
}

fn raw(value: serde_json::Value) -> RawMetadata {
    value.as_object().cloned().unwrap()
}

fn leftover_temp_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with(".folio-"))
        .collect()
}

#[tokio::test]
async fn test_interrupted_update_keeps_previous_file() {
    let (repo, storage, temp) = setup();
    repo.create("page", &raw(json!({"title": "About"})), "original body")
        .await
        .unwrap();
    let path = temp.path().join("pages/about.md");
    let before = std::fs::read_to_string(&path).unwrap();

    storage.crash.store(true, Ordering::SeqCst);
    let err = repo
        .update("page", "about", &raw(json!({"title": "About us"})), "new body")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "io_failure");

    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    assert!(leftover_temp_files(&temp.path().join("pages")).is_empty());

    storage.crash.store(false, Ordering::SeqCst);
    let item = repo.get("page", "about").await.unwrap();
    assert_eq!(item.body, "original body");
}

#[tokio::test]
async fn test_interrupted_create_leaves_nothing() {
    let (repo, storage, temp) = setup();
    storage.crash.store(true, Ordering::SeqCst);

    assert!(repo
        .create("page", &raw(json!({"title": "Contact"})), "")
        .await
        .is_err());

    assert!(!temp.path().join("pages/contact.md").exists());
    assert!(leftover_temp_files(&temp.path().join("pages")).is_empty());

    storage.crash.store(false, Ordering::SeqCst);
    assert!(repo.list("page").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_staged_file_is_invisible_until_commit() {
    let temp = TempDir::new().unwrap();
    let storage = FsStorage::new(temp.path());
    let target = Path::new("pages/draft.md");

    let staged = storage.stage(target, "---\ntitle: Draft\n---\n").await.unwrap();
    assert!(!storage.exists(target).await.unwrap());
    assert!(storage.list(Path::new("pages"), ".md").await.unwrap().is_empty());

    staged.commit().await.unwrap();
    assert!(storage.exists(target).await.unwrap());
    assert_eq!(
        storage.list(Path::new("pages"), ".md").await.unwrap(),
        vec![PathBuf::from("pages/draft.md")]
    );
}

#[tokio::test]
async fn test_rename_with_failed_delete_still_lists_new_copy() {
    let (repo, storage, temp) = setup();
    repo.create("page", &raw(json!({"title": "Old Name"})), "kept")
        .await
        .unwrap();
    assert_eq!(repo.list("page").await.unwrap().len(), 1);

    storage.fail_delete.store(true, Ordering::SeqCst);
    let err = repo.rename("page", "old-name", "new-name").await.unwrap_err();
    assert_eq!(err.kind(), "io_failure");

    // Both copies exist on disk and the listing agrees
    assert!(temp.path().join("pages/old-name.md").exists());
    assert!(temp.path().join("pages/new-name.md").exists());
    let slugs: Vec<_> = repo
        .list("page")
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.slug)
        .collect();
    assert_eq!(slugs, vec!["new-name", "old-name"]);
    assert_eq!(repo.get("page", "new-name").await.unwrap().body, "kept");
}
