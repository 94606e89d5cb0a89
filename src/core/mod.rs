//! Repository machinery.
//!
//! This module contains:
//! - Storage: filesystem adapter with atomic writes
//! - ItemLocks: per-item mutual exclusion
//! - ItemIndex: cached summaries per content type
//! - ContentRepository: the CRUD service
//! - IndexWatcher: external-change invalidation

pub mod index;
pub mod locks;
pub mod repository;
pub mod storage;
pub mod watcher;

// Re-export commonly used types
pub use index::ItemIndex;
pub use locks::{ItemGuard, ItemLocks};
pub use repository::ContentRepository;
pub use storage::{FsStorage, Listing, StagedWrite, Storage};
pub use watcher::{IndexWatcher, Invalidation, WatchHandle, WatcherError};
