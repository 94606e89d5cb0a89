//! Coercion of raw field data and full-submission validation.
//!
//! Validation never stops at the first problem: every offending field
//! is collected so the caller can report them together.

use chrono::NaiveDate;
use serde_json::Value as Json;

use super::types::{ContentType, FieldKind, FieldSpec};
use crate::domain::{Metadata, RawMetadata, Value, DATE_FORMAT};
use crate::error::{FieldViolation, ValidationErrors};

/// Coerce one raw value to the given kind.
///
/// Accepts the string forms an HTML form submits (`"true"`, `"42"`,
/// `"a, b, c"`) alongside native JSON values.
pub fn coerce(kind: &FieldKind, raw: &Json) -> Result<Value, String> {
    match kind {
        FieldKind::String => match raw {
            Json::String(s) if s.contains('\n') => {
                Err("expected a single-line string".to_string())
            }
            Json::String(s) => Ok(Value::Text(s.clone())),
            other => Err(format!("expected a string, found {}", describe(other))),
        },
        FieldKind::Text => match raw {
            Json::String(s) => Ok(Value::Text(s.clone())),
            other => Err(format!("expected text, found {}", describe(other))),
        },
        FieldKind::Number => match raw {
            Json::Number(n) => n
                .as_f64()
                .map(Value::Number)
                .ok_or_else(|| "expected a finite number".to_string()),
            Json::String(s) => match s.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => Ok(Value::Number(n)),
                _ => Err(format!("expected a number, found '{}'", s)),
            },
            other => Err(format!("expected a number, found {}", describe(other))),
        },
        FieldKind::Boolean => match raw {
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::String(s) if s.trim().eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Json::String(s) if s.trim().eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            Json::String(s) => Err(format!("expected a boolean, found '{}'", s)),
            other => Err(format!("expected a boolean, found {}", describe(other))),
        },
        FieldKind::Date => match raw {
            Json::String(s) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                .map(Value::Date)
                .map_err(|_| format!("expected a date (YYYY-MM-DD), found '{}'", s)),
            other => Err(format!("expected a date, found {}", describe(other))),
        },
        FieldKind::Enum { options } => match raw {
            Json::String(s) if options.iter().any(|o| o == s) => Ok(Value::Text(s.clone())),
            Json::String(s) => Err(format!(
                "expected one of [{}], found '{}'",
                options.join(", "),
                s
            )),
            other => Err(format!("expected a string, found {}", describe(other))),
        },
        FieldKind::StringList => match raw {
            Json::Array(items) => items
                .iter()
                .map(|item| match item {
                    Json::String(s) => Ok(s.clone()),
                    other => Err(format!(
                        "expected a list of strings, found {} in list",
                        describe(other)
                    )),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Json::String(s) => Ok(Value::List(
                s.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect(),
            )),
            other => Err(format!("expected a list of strings, found {}", describe(other))),
        },
        FieldKind::Reference { target } => match raw {
            Json::String(s) => {
                crate::library::slug::check_slug(s)
                    .map_err(|_| format!("'{}' is not a valid {} slug", s, target))?;
                Ok(Value::Text(s.clone()))
            }
            other => Err(format!("expected a {} slug, found {}", target, describe(other))),
        },
    }
}

fn describe(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "a list",
        Json::Object(_) => "an object",
    }
}

/// Null and blank strings count as "not supplied"
fn is_absent(raw: &Json) -> bool {
    match raw {
        Json::Null => true,
        Json::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn check_value(spec: &FieldSpec, value: &Value) -> Result<(), String> {
    for rule in &spec.rules {
        rule.check(value)?;
    }
    if let Some(validator) = &spec.validator {
        validator.check(value)?;
    }
    Ok(())
}

/// Validate a submission, returning whatever could be coerced plus
/// every violation found.
///
/// Missing optional fields take their declared default; unknown keys
/// are reported rather than dropped.
pub fn collect(ty: &ContentType, raw: &RawMetadata) -> (Metadata, Vec<FieldViolation>) {
    let mut metadata = Metadata::new();
    let mut violations = Vec::new();

    for spec in &ty.fields {
        match raw.get(&spec.name).filter(|v| !is_absent(v)) {
            Some(value) => match coerce(&spec.kind, value) {
                Ok(value) => match check_value(spec, &value) {
                    Ok(()) => metadata.insert(&spec.name, value),
                    Err(reason) => violations.push(FieldViolation::invalid(&spec.name, reason)),
                },
                Err(reason) => violations.push(FieldViolation::invalid(&spec.name, reason)),
            },
            None => {
                if let Some(default) = &spec.default {
                    metadata.insert(&spec.name, default.clone());
                } else if spec.required {
                    violations.push(FieldViolation::missing(&spec.name));
                }
            }
        }
    }

    let mut unknown: Vec<&String> = raw
        .keys()
        .filter(|key| ty.field_spec(key).is_none())
        .collect();
    unknown.sort();
    violations.extend(unknown.into_iter().map(FieldViolation::unknown));

    (metadata, violations)
}

/// Validate a full submission against its content type
pub fn validate(ty: &ContentType, raw: &RawMetadata) -> Result<Metadata, ValidationErrors> {
    let (metadata, violations) = collect(ty, raw);
    if violations.is_empty() {
        Ok(metadata)
    } else {
        Err(ValidationErrors(violations))
    }
}
