//! Error taxonomy for the content repository.
//!
//! Every failure path in the core returns one of these to the caller.
//! Nothing is logged-and-ignored.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::library::codec::CodecError;

/// Errors surfaced by the repository core
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Unknown content type: {0}")]
    UnknownType(String),

    #[error("Content type already registered: {0}")]
    DuplicateType(String),

    #[error("Invalid content type '{type_name}': {reason}")]
    SchemaError { type_name: String, reason: String },

    #[error("Invalid slug '{slug}': {reason}")]
    InvalidSlug { slug: String, reason: String },

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Slug already taken: {type_name}/{slug}")]
    SlugTaken { type_name: String, slug: String },

    #[error("Revision conflict on {type_name}/{slug}: expected {expected}, found {actual}")]
    Conflict {
        type_name: String,
        slug: String,
        expected: String,
        actual: String,
    },

    #[error("Malformed content in {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    #[error("Failed to encode metadata: {0}")]
    Encoding(#[source] CodecError),

    #[error("IO failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RepoError {
    /// Stable discriminator for the wire contract
    pub fn kind(&self) -> &'static str {
        match self {
            RepoError::UnknownType(_) => "unknown_type",
            RepoError::DuplicateType(_) => "duplicate_type",
            RepoError::SchemaError { .. } => "schema_error",
            RepoError::InvalidSlug { .. } => "invalid_slug",
            RepoError::Validation(_) => "validation",
            RepoError::NotFound { .. } => "not_found",
            RepoError::SlugTaken { .. } => "slug_taken",
            RepoError::Conflict { .. } => "conflict",
            RepoError::Malformed { .. } => "malformed_content",
            RepoError::Encoding(_) => "encoding",
            RepoError::Io { .. } => "io_failure",
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            RepoError::NotFound { path }
        } else {
            RepoError::Io { path, source }
        }
    }

    pub(crate) fn schema(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        RepoError::SchemaError {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_slug(slug: impl Into<String>, reason: impl Into<String>) -> Self {
        RepoError::InvalidSlug {
            slug: slug.into(),
            reason: reason.into(),
        }
    }

    /// Field violations carried by a validation failure
    pub fn violations(&self) -> &[FieldViolation] {
        match self {
            RepoError::Validation(errors) => &errors.0,
            _ => &[],
        }
    }
}

/// What is wrong with a single field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "problem", content = "detail", rename_all = "snake_case")]
pub enum Problem {
    /// Required field absent and no default declared
    Missing,

    /// Field not declared by the content type
    Unknown,

    /// Value present but not acceptable for the field
    Invalid(String),
}

/// One offending field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    #[serde(flatten)]
    pub problem: Problem,
}

impl FieldViolation {
    pub fn missing(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            problem: Problem::Missing,
        }
    }

    pub fn unknown(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            problem: Problem::Unknown,
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            problem: Problem::Invalid(reason.into()),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            Problem::Missing => write!(f, "{}: required field is missing", self.field),
            Problem::Unknown => write!(f, "{}: unknown field", self.field),
            Problem::Invalid(reason) => write!(f, "{}: {}", self.field, reason),
        }
    }
}

/// The complete list of violations for one submission
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationErrors(pub Vec<FieldViolation>);

impl ValidationErrors {
    pub fn fields(&self) -> Vec<&str> {
        self.0.iter().map(|v| v.field.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("; "))
    }
}
