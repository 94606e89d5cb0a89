//! Storage adapter for the content tree.
//!
//! Writes are atomic: text goes to a hidden temp file in the target's
//! directory, is synced, then renamed over the target (and the directory
//! synced so the new entry survives power loss). Readers see the
//! old file or the new one, never a partial write, and an interrupted
//! write leaves the previous file untouched.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs::{self, File, ReadDir};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::RepoError;
use crate::library::CodecError;

/// Prefix of in-flight temp files; hidden so listings skip them
const TEMP_PREFIX: &str = ".folio-";

/// Persistence operations on paths relative to the content root
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read a whole file
    async fn read(&self, path: &Path) -> Result<String, RepoError>;

    /// Read only the leading metadata block (through the closing `---`)
    async fn read_head(&self, path: &Path) -> Result<String, RepoError>;

    /// Atomically replace (or create) a file
    async fn write(&self, path: &Path, text: &str) -> Result<(), RepoError>;

    /// Remove a file; a missing file is `NotFound`, not success
    async fn delete(&self, path: &Path) -> Result<(), RepoError>;

    async fn exists(&self, path: &Path) -> Result<bool, RepoError>;

    /// Last modification time
    async fn modified(&self, path: &Path) -> Result<DateTime<Utc>, RepoError>;

    /// Files in `dir` ending in `extension`, in no particular order
    async fn list(&self, dir: &Path, extension: &str) -> Result<Vec<PathBuf>, RepoError>;
}

/// Filesystem-backed storage rooted at the content directory
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    /// Write text to a temp file beside `path` without touching `path`.
    ///
    /// Nothing is visible until [`StagedWrite::commit`]; dropping the
    /// staged write removes the temp file.
    pub async fn stage(&self, path: &Path, text: &str) -> Result<StagedWrite, RepoError> {
        let target = self.absolute(path);
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        fs::create_dir_all(&dir)
            .await
            .map_err(|e| RepoError::io(&dir, e))?;

        let bytes = text.as_bytes().to_vec();
        let temp_dir = dir.clone();
        let temp = tokio::task::spawn_blocking(move || -> std::io::Result<_> {
            use std::io::Write;

            let mut temp = tempfile::Builder::new()
                .prefix(TEMP_PREFIX)
                .suffix(".tmp")
                .tempfile_in(&temp_dir)?;
            temp.write_all(&bytes)?;
            temp.as_file().sync_all()?;
            Ok(temp)
        })
        .await
        .map_err(|e| RepoError::io(&dir, std::io::Error::new(std::io::ErrorKind::Other, e)))?
        .map_err(|e| RepoError::io(&dir, e))?;

        Ok(StagedWrite {
            temp,
            target,
            relative: path.to_path_buf(),
        })
    }

    /// Lazy enumeration of item files in `dir`
    pub fn listing(&self, dir: &Path, extension: &str) -> Listing {
        Listing {
            root: self.root.clone(),
            dir: dir.to_path_buf(),
            extension: extension.to_string(),
            entries: None,
            done: false,
        }
    }
}

/// A fully written temp file waiting to be renamed into place
#[derive(Debug)]
pub struct StagedWrite {
    temp: tempfile::NamedTempFile,
    target: PathBuf,
    relative: PathBuf,
}

impl StagedWrite {
    /// Path of the temp file holding the new contents
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Target path, relative to the content root
    pub fn target(&self) -> &Path {
        &self.relative
    }

    /// Atomically rename the temp file over the target
    pub async fn commit(self) -> Result<(), RepoError> {
        let StagedWrite {
            temp,
            target,
            relative,
        } = self;

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            temp.persist(&target).map_err(|e| e.error)?;
            sync_parent(&target)
        })
        .await
        .map_err(|e| RepoError::io(&relative, std::io::Error::new(std::io::ErrorKind::Other, e)))?
        .map_err(|e| RepoError::io(&relative, e))
    }
}

/// Flush the directory entry a rename just created
#[cfg(unix)]
fn sync_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(dir) => std::fs::File::open(dir)?.sync_all(),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Restartable, lazily-read directory listing.
///
/// Yields paths relative to the content root. Hidden files, directories
/// and files with other extensions are skipped. Order is whatever the
/// filesystem returns; sort if it matters.
#[derive(Debug)]
pub struct Listing {
    root: PathBuf,
    dir: PathBuf,
    extension: String,
    entries: Option<ReadDir>,
    done: bool,
}

impl Listing {
    /// Next matching path, or `None` when exhausted
    pub async fn next_path(&mut self) -> Result<Option<PathBuf>, RepoError> {
        if self.done {
            return Ok(None);
        }

        let abs_dir = self.root.join(&self.dir);
        if self.entries.is_none() {
            match fs::read_dir(&abs_dir).await {
                Ok(entries) => self.entries = Some(entries),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    // No items of this type yet
                    self.done = true;
                    return Ok(None);
                }
                Err(e) => return Err(RepoError::io(&self.dir, e)),
            }
        }

        let Some(entries) = self.entries.as_mut() else {
            return Ok(None);
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RepoError::io(&self.dir, e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') || !name.ends_with(self.extension.as_str()) {
                continue;
            }
            if name.len() == self.extension.len() {
                continue;
            }
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| RepoError::io(entry.path(), e))?;
            if !file_type.is_file() {
                continue;
            }
            return Ok(Some(self.dir.join(name)));
        }

        self.done = true;
        Ok(None)
    }

    /// Start the enumeration over from the beginning
    pub fn restart(&mut self) {
        self.entries = None;
        self.done = false;
    }

    /// Drain the remaining paths
    pub async fn collect(mut self) -> Result<Vec<PathBuf>, RepoError> {
        let mut paths = Vec::new();
        while let Some(path) = self.next_path().await? {
            paths.push(path);
        }
        Ok(paths)
    }
}

fn not_utf8(path: &Path) -> RepoError {
    RepoError::Malformed {
        path: path.to_path_buf(),
        source: CodecError::NotUtf8,
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn read(&self, path: &Path) -> Result<String, RepoError> {
        let bytes = fs::read(self.absolute(path))
            .await
            .map_err(|e| RepoError::io(path, e))?;
        String::from_utf8(bytes).map_err(|_| not_utf8(path))
    }

    async fn read_head(&self, path: &Path) -> Result<String, RepoError> {
        let file = File::open(self.absolute(path))
            .await
            .map_err(|e| RepoError::io(path, e))?;

        let mut reader = BufReader::new(file);
        let mut head = String::new();
        let mut line = String::new();
        let mut first = true;

        loop {
            line.clear();
            let read = reader.read_line(&mut line).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::InvalidData {
                    not_utf8(path)
                } else {
                    RepoError::io(path, e)
                }
            })?;
            if read == 0 {
                break;
            }
            head.push_str(&line);

            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed == "---" {
                if first {
                    first = false;
                    continue;
                }
                break;
            }
            if first {
                // Not a metadata block; let the codec report it
                break;
            }
        }

        Ok(head)
    }

    async fn write(&self, path: &Path, text: &str) -> Result<(), RepoError> {
        self.stage(path, text).await?.commit().await
    }

    async fn delete(&self, path: &Path) -> Result<(), RepoError> {
        fs::remove_file(self.absolute(path))
            .await
            .map_err(|e| RepoError::io(path, e))
    }

    async fn exists(&self, path: &Path) -> Result<bool, RepoError> {
        fs::try_exists(self.absolute(path))
            .await
            .map_err(|e| RepoError::io(path, e))
    }

    async fn modified(&self, path: &Path) -> Result<DateTime<Utc>, RepoError> {
        let metadata = fs::metadata(self.absolute(path))
            .await
            .map_err(|e| RepoError::io(path, e))?;
        let modified = metadata.modified().map_err(|e| RepoError::io(path, e))?;
        Ok(DateTime::<Utc>::from(modified))
    }

    async fn list(&self, dir: &Path, extension: &str) -> Result<Vec<PathBuf>, RepoError> {
        self.listing(dir, extension).collect().await
    }
}
