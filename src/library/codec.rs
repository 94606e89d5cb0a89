//! YAML front-matter codec.
//!
//! Files look like:
//! ```markdown
//! ---
//! title: Hello World
//! published: false
//! ---
//! Body text, kept byte-for-byte.
//! ```
//!
//! Metadata is written in the type's field declaration order so diffs of
//! the content tree stay stable. The body after the closing delimiter is
//! never reformatted.

use thiserror::Error;

use crate::domain::Metadata;
use crate::schema::{validate::coerce, ContentType};

const DELIMITER: &str = "---";

/// Front-matter parsing/writing errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("file is not valid UTF-8")]
    NotUtf8,

    #[error("no metadata block found - file must start with ---")]
    NoFrontmatter,

    #[error("unclosed metadata block - missing closing ---")]
    Unclosed,

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("metadata block must be a mapping of field names to values")]
    NotAMapping,

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("required field '{0}' is missing")]
    MissingField(String),

    #[error("field '{field}': {reason}")]
    BadValue { field: String, reason: String },
}

/// Decoded file contents
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub metadata: Metadata,
    pub body: String,
}

/// Render metadata and body as file text
pub fn encode(ty: &ContentType, metadata: &Metadata, body: &str) -> Result<String, CodecError> {
    let mut mapping = serde_yaml::Mapping::new();
    for spec in &ty.fields {
        if let Some(value) = metadata.get(&spec.name) {
            mapping.insert(serde_yaml::Value::String(spec.name.clone()), value.to_yaml());
        }
    }

    let yaml = serde_yaml::to_string(&mapping)?;
    Ok(format!("{}\n{}{}\n{}", DELIMITER, yaml, DELIMITER, body))
}

/// Parse file text into metadata and body
pub fn decode(text: &str, ty: &ContentType) -> Result<Document, CodecError> {
    let (yaml, body) = split(text)?;
    let metadata = parse_metadata(yaml, ty)?;
    Ok(Document {
        metadata,
        body: body.unwrap_or_default().to_string(),
    })
}

/// Parse only the metadata block; trailing body text (if any) is ignored
pub fn decode_metadata(text: &str, ty: &ContentType) -> Result<Metadata, CodecError> {
    let (yaml, _) = split(text)?;
    parse_metadata(yaml, ty)
}

/// Split text into (yaml, body). Body is `None` when the closing
/// delimiter is the last line without a trailing newline.
fn split(text: &str) -> Result<(&str, Option<&str>), CodecError> {
    let rest = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
        .ok_or(CodecError::NoFrontmatter)?;

    // An empty block closes immediately
    if let Some(body) = closing_line(rest) {
        return Ok(("", body));
    }

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        offset += line.len();
        if let Some(body) = closing_line(&rest[offset..]) {
            return Ok((&rest[..offset], body));
        }
    }

    Err(CodecError::Unclosed)
}

/// If `s` starts with a closing delimiter line, return the text after it
fn closing_line(s: &str) -> Option<Option<&str>> {
    let after = s.strip_prefix(DELIMITER)?;
    if let Some(body) = after.strip_prefix('\n') {
        Some(Some(body))
    } else if let Some(body) = after.strip_prefix("\r\n") {
        Some(Some(body))
    } else if after.is_empty() {
        Some(None)
    } else {
        None
    }
}

fn parse_metadata(yaml: &str, ty: &ContentType) -> Result<Metadata, CodecError> {
    let parsed: serde_yaml::Value = if yaml.trim().is_empty() {
        serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
    } else {
        serde_yaml::from_str(yaml)?
    };

    let mapping = match parsed {
        serde_yaml::Value::Mapping(mapping) => mapping,
        serde_yaml::Value::Null => serde_yaml::Mapping::new(),
        _ => return Err(CodecError::NotAMapping),
    };

    let mut raw = serde_json::Map::new();
    for (key, value) in mapping {
        let key = match key {
            serde_yaml::Value::String(key) => key,
            _ => return Err(CodecError::NotAMapping),
        };
        if ty.field_spec(&key).is_none() {
            return Err(CodecError::UnknownField(key));
        }
        let json = serde_json::to_value(&value).map_err(|e| CodecError::BadValue {
            field: key.clone(),
            reason: e.to_string(),
        })?;
        raw.insert(key, json);
    }

    let mut metadata = Metadata::new();
    for spec in &ty.fields {
        match raw.get(&spec.name) {
            Some(serde_json::Value::Null) | None => {
                if spec.required {
                    return Err(CodecError::MissingField(spec.name.clone()));
                }
            }
            Some(value) => {
                let value = coerce(&spec.kind, value).map_err(|reason| CodecError::BadValue {
                    field: spec.name.clone(),
                    reason,
                })?;
                metadata.insert(&spec.name, value);
            }
        }
    }

    Ok(metadata)
}
