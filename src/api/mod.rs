//! Request/response contract for UI hosts.
//!
//! Requests and responses are JSON objects tagged by `op` and `status`:
//!
//! ```json
//! {"id": 7, "op": "create", "type": "post", "metadata": {"title": "Hi"}, "body": "..."}
//! {"id": 7, "status": "item", "item": {"type": "post", "slug": "hi", ...}}
//! {"id": 8, "status": "error", "kind": "validation", "message": "...", "violations": [...]}
//! ```

use serde::{Deserialize, Serialize};

use crate::core::ContentRepository;
use crate::domain::{ContentItem, ItemSummary, RawMetadata};
use crate::error::{FieldViolation, RepoError};
use crate::schema::{ContentType, FieldKind};

/// One operation against the repository
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Create {
        #[serde(rename = "type", alias = "typeName")]
        type_name: String,
        #[serde(default)]
        metadata: RawMetadata,
        #[serde(default)]
        body: String,
    },
    Update {
        #[serde(rename = "type", alias = "typeName")]
        type_name: String,
        slug: String,
        #[serde(default)]
        metadata: RawMetadata,
        #[serde(default)]
        body: String,
        /// Only apply if the stored item is still at this revision
        #[serde(default)]
        revision: Option<String>,
    },
    Rename {
        #[serde(rename = "type", alias = "typeName")]
        type_name: String,
        slug: String,
        new_slug: String,
    },
    Delete {
        #[serde(rename = "type", alias = "typeName")]
        type_name: String,
        slug: String,
    },
    Get {
        #[serde(rename = "type", alias = "typeName")]
        type_name: String,
        slug: String,
    },
    List {
        #[serde(rename = "type", alias = "typeName")]
        type_name: String,
    },
    Types,
}

/// Outcome of a request
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Item {
        item: ContentItem,
    },
    Items {
        items: Vec<ItemSummary>,
    },
    Types {
        types: Vec<TypeInfo>,
    },
    Deleted {
        #[serde(rename = "type")]
        type_name: String,
        slug: String,
    },
    Error(ErrorBody),
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Stable error discriminator (see [`RepoError::kind`])
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<FieldViolation>,
}

impl From<&RepoError> for ErrorBody {
    fn from(err: &RepoError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            violations: err.violations().to_vec(),
        }
    }
}

impl Response {
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Response::Error(ErrorBody {
            kind: "bad_request".to_string(),
            message: message.into(),
            violations: Vec::new(),
        })
    }
}

/// Schema description for form builders
#[derive(Debug, Clone, Serialize)]
pub struct TypeInfo {
    pub name: String,
    pub directory: String,
    pub extension: String,
    pub title_field: String,
    pub fields: Vec<FieldInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldInfo {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl From<&ContentType> for TypeInfo {
    fn from(ty: &ContentType) -> Self {
        Self {
            name: ty.name.clone(),
            directory: ty.directory().display().to_string(),
            extension: ty.extension.clone(),
            title_field: ty.title_field.clone(),
            fields: ty
                .fields
                .iter()
                .map(|spec| FieldInfo {
                    name: spec.name.clone(),
                    kind: spec.kind.clone(),
                    required: spec.required,
                    default: spec.default.as_ref().map(|v| v.to_json()),
                })
                .collect(),
        }
    }
}

/// Request with an optional correlation id, echoed back on the response
#[derive(Debug, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(flatten)]
    pub request: Request,
}

#[derive(Debug, Serialize)]
pub struct ResponseEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(flatten)]
    pub response: Response,
}

/// Run one request; every failure becomes an error response
pub async fn dispatch(repo: &ContentRepository, request: Request) -> Response {
    let result = match request {
        Request::Create {
            type_name,
            metadata,
            body,
        } => repo
            .create(&type_name, &metadata, &body)
            .await
            .map(|item| Response::Item { item }),
        Request::Update {
            type_name,
            slug,
            metadata,
            body,
            revision,
        } => match revision {
            Some(revision) => repo
                .update_if(&type_name, &slug, &metadata, &body, &revision)
                .await
                .map(|item| Response::Item { item }),
            None => repo
                .update(&type_name, &slug, &metadata, &body)
                .await
                .map(|item| Response::Item { item }),
        },
        Request::Rename {
            type_name,
            slug,
            new_slug,
        } => repo
            .rename(&type_name, &slug, &new_slug)
            .await
            .map(|item| Response::Item { item }),
        Request::Delete { type_name, slug } => repo
            .delete(&type_name, &slug)
            .await
            .map(|()| Response::Deleted { type_name, slug }),
        Request::Get { type_name, slug } => repo
            .get(&type_name, &slug)
            .await
            .map(|item| Response::Item { item }),
        Request::List { type_name } => repo
            .list(&type_name)
            .await
            .map(|items| Response::Items { items }),
        Request::Types => Ok(Response::Types {
            types: repo
                .registry()
                .types()
                .map(|ty| TypeInfo::from(ty.as_ref()))
                .collect(),
        }),
    };

    result.unwrap_or_else(|err| {
        tracing::debug!("Request failed: {}", err);
        Response::Error(ErrorBody::from(&err))
    })
}

/// Handle one JSON-encoded request line, producing one JSON response line
pub async fn handle_line(repo: &ContentRepository, line: &str) -> String {
    let envelope = match serde_json::from_str::<RequestEnvelope>(line) {
        Ok(envelope) => ResponseEnvelope {
            id: envelope.id,
            response: dispatch(repo, envelope.request).await,
        },
        Err(e) => ResponseEnvelope {
            id: None,
            response: Response::bad_request(format!("invalid request: {}", e)),
        },
    };

    serde_json::to_string(&envelope).unwrap_or_else(|e| {
        format!(
            r#"{{"status":"error","kind":"encoding","message":"{}"}}"#,
            e.to_string().replace('"', "'")
        )
    })
}
