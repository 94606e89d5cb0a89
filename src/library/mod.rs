//! On-disk representation of the content tree.
//!
//! # Storage Layout
//!
//! ```text
//! <content_root>/
//! ├── posts/
//! │   ├── hello-world.md        # --- yaml metadata --- + body
//! │   └── hello-world-2.md
//! ├── diary/
//! │   └── 2024-05-01.md
//! └── skills/
//!     └── rust.md
//! ```
//!
//! One subdirectory per content type, one file per item, named
//! `<slug><extension>`. Nothing else is persisted.

pub mod codec;
pub mod slug;

pub use codec::{decode, decode_metadata, encode, CodecError, Document};
pub use slug::{check_slug, resolve_path, slug_for_title, slugify, unique_slug};
