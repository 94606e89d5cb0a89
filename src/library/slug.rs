//! Slug derivation and canonical path resolution.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::RepoError;
use crate::schema::ContentType;

const MAX_SLUG_LEN: usize = 80;

/// Slug used when a title has no usable characters
pub const FALLBACK_SLUG: &str = "untitled";

/// Generate a slug from a title.
///
/// - Lowercase
/// - Alphanumerics kept (any script), everything else becomes a dash
/// - Runs of dashes collapsed, leading/trailing dashes stripped
/// - Max 80 chars
///
/// May return an empty string; see [`slug_for_title`].
pub fn slugify(title: &str) -> String {
    let mut slug = String::new();
    let mut last_was_dash = false;

    for ch in title.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            slug.push(ch);
            last_was_dash = false;
        } else if !slug.is_empty() && !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }

    if slug.chars().count() > MAX_SLUG_LEN {
        slug = slug.chars().take(MAX_SLUG_LEN).collect();
        while slug.ends_with('-') {
            slug.pop();
        }
    }

    slug
}

/// Slugify, falling back to "untitled" for titles with nothing usable
pub fn slug_for_title(title: &str) -> String {
    let slug = slugify(title);
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Check a slug is safe to use as a file stem
pub fn check_slug(slug: &str) -> Result<(), RepoError> {
    if slug.is_empty() {
        return Err(RepoError::invalid_slug(slug, "slug is empty"));
    }
    if slug.contains("..") {
        return Err(RepoError::invalid_slug(slug, "path traversal is not allowed"));
    }
    if slug.starts_with('.') || slug.starts_with('-') {
        return Err(RepoError::invalid_slug(slug, "must start with a letter or digit"));
    }
    if let Some(bad) = slug
        .chars()
        .find(|c| !(c.is_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(RepoError::invalid_slug(
            slug,
            format!("character {:?} is not allowed", bad),
        ));
    }
    if slug.chars().count() > MAX_SLUG_LEN + 16 {
        return Err(RepoError::invalid_slug(slug, "slug is too long"));
    }
    Ok(())
}

/// Canonical location of an item, relative to the content root
pub fn resolve_path(ty: &ContentType, slug: &str) -> Result<PathBuf, RepoError> {
    check_slug(slug)?;
    Ok(ty.directory.join(format!("{}{}", slug, ty.extension)))
}

/// First free slug: `desired`, then `desired-2`, `desired-3`, ...
pub fn unique_slug(desired: &str, existing: &HashSet<String>) -> String {
    if !existing.contains(desired) {
        return desired.to_string();
    }

    (2..)
        .map(|n| format!("{}-{}", desired, n))
        .find(|candidate| !existing.contains(candidate))
        .unwrap_or_else(|| desired.to_string())
}
