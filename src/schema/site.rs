//! Built-in content types for the blog/portfolio site layout.
//!
//! Field names match the keys the site renderer reads, which is why a
//! few of them are camelCase.

use super::registry::SchemaRegistry;
use super::types::{ContentType, FieldSpec, Rule};
use crate::domain::Value;
use crate::error::RepoError;

/// Default icon for skills without one
pub const DEFAULT_SKILL_ICON: &str = "material-symbols:construction-rounded";

fn flag(name: &str) -> FieldSpec {
    FieldSpec::boolean(name).with_default(Value::Bool(false))
}

pub fn page() -> ContentType {
    ContentType::new("page", "pages")
        .field(FieldSpec::string("title").required())
        .field(FieldSpec::text("description"))
        .field(FieldSpec::date("updated"))
}

pub fn post() -> ContentType {
    ContentType::new("post", "posts")
        .field(FieldSpec::string("title").required().with_rule(Rule::MaxLength(200)))
        .field(FieldSpec::date("published"))
        .field(FieldSpec::text("description"))
        .field(FieldSpec::list("tags"))
        .field(FieldSpec::string("category"))
        .field(FieldSpec::string("author"))
        .field(FieldSpec::string("permalink"))
        .field(FieldSpec::string("image"))
        .field(flag("pinned"))
        .field(flag("draft"))
}

pub fn diary() -> ContentType {
    ContentType::new("diary", "diary")
        .with_title_field("date")
        .field(FieldSpec::date("date").required())
        .field(FieldSpec::string("mood"))
        .field(FieldSpec::string("location"))
        .field(FieldSpec::list("tags"))
        .field(FieldSpec::list("images"))
}

pub fn friend() -> ContentType {
    ContentType::new("friend", "friends")
        .field(FieldSpec::string("title").required())
        .field(FieldSpec::string("siteurl").required().with_rule(Rule::Pattern("http*://*".into())))
        .field(FieldSpec::string("imgurl"))
        .field(FieldSpec::text("desc"))
        .field(FieldSpec::list("tags"))
}

pub fn project() -> ContentType {
    ContentType::new("project", "projects")
        .field(FieldSpec::string("title").required())
        .field(FieldSpec::text("description").required())
        .field(FieldSpec::string("image"))
        .field(FieldSpec::string("category"))
        .field(FieldSpec::list("techStack"))
        .field(
            FieldSpec::one_of("status", ["completed", "in-progress", "planned"])
                .with_default(Value::Text("in-progress".into())),
        )
        .field(FieldSpec::string("liveDemo"))
        .field(FieldSpec::string("sourceCode"))
        .field(FieldSpec::string("visitUrl"))
        .field(FieldSpec::date("startDate"))
        .field(FieldSpec::date("endDate"))
        .field(flag("featured"))
        .field(FieldSpec::list("tags"))
}

pub fn device() -> ContentType {
    ContentType::new("device", "devices")
        .with_title_field("name")
        .field(FieldSpec::string("name").required())
        .field(FieldSpec::string("category").required())
        .field(FieldSpec::string("image"))
        .field(FieldSpec::string("specs"))
        .field(FieldSpec::text("description"))
        .field(FieldSpec::string("link"))
}

pub fn album() -> ContentType {
    ContentType::new("album", "albums")
        .field(FieldSpec::string("title").required())
        .field(FieldSpec::text("description"))
        .field(FieldSpec::date("date"))
        .field(FieldSpec::string("location"))
        .field(FieldSpec::list("tags"))
        .field(
            FieldSpec::one_of("layout", ["grid", "masonry"])
                .with_default(Value::Text("grid".into())),
        )
        .field(
            FieldSpec::number("columns")
                .with_default(Value::Number(3.0))
                .with_rule(Rule::Min(1.0))
                .with_rule(Rule::Max(6.0)),
        )
        .field(FieldSpec::string("cover"))
}

pub fn timeline() -> ContentType {
    ContentType::new("timeline", "timeline")
        .field(FieldSpec::string("title").required())
        .field(FieldSpec::text("description").required())
        .field(FieldSpec::one_of("type", ["education", "certificate", "project", "other"]).required())
        .field(FieldSpec::date("startDate").required())
        .field(FieldSpec::date("endDate"))
        .field(FieldSpec::string("location"))
        .field(FieldSpec::string("organization"))
        .field(FieldSpec::list("skills"))
        .field(flag("featured"))
        .field(FieldSpec::string("icon"))
        .field(FieldSpec::string("color").with_rule(Rule::HexColor))
        .field(FieldSpec::reference("project", "project"))
}

pub fn skill() -> ContentType {
    ContentType::new("skill", "skills")
        .with_title_field("name")
        .field(FieldSpec::string("name").required())
        .field(FieldSpec::text("description").required())
        .field(FieldSpec::string("icon").with_default(Value::Text(DEFAULT_SKILL_ICON.into())))
        .field(
            FieldSpec::one_of("category", ["frontend", "backend", "database", "tools", "other"])
                .required(),
        )
        .field(
            FieldSpec::one_of("level", ["beginner", "intermediate", "advanced", "expert"])
                .required(),
        )
        .field(
            FieldSpec::number("years")
                .with_default(Value::Number(0.0))
                .with_rule(Rule::Min(0.0)),
        )
        .field(
            FieldSpec::number("months")
                .with_default(Value::Number(0.0))
                .with_rule(Rule::Min(0.0))
                .with_rule(Rule::Max(11.0)),
        )
        .field(FieldSpec::string("color").with_rule(Rule::HexColor))
}

/// Every built-in type, in registration order (targets before referrers)
pub fn site_types() -> Vec<ContentType> {
    vec![
        page(),
        post(),
        diary(),
        friend(),
        project(),
        device(),
        album(),
        timeline(),
        skill(),
    ]
}

impl SchemaRegistry {
    /// Registry holding the built-in site types
    pub fn with_site_types() -> Result<Self, RepoError> {
        let mut registry = Self::new();
        for ty in site_types() {
            registry.register(ty)?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::validate::validate;
    use serde_json::json;

    #[test]
    fn test_site_types_register() {
        let registry = SchemaRegistry::with_site_types().unwrap();
        assert_eq!(registry.len(), 9);
        assert_eq!(
            registry.names(),
            vec![
                "album", "device", "diary", "friend", "page", "post", "project", "skill",
                "timeline"
            ]
        );
    }

    #[test]
    fn test_skill_defaults() {
        let meta = validate(
            &skill(),
            json!({
                "name": "Rust",
                "description": "Systems programming",
                "category": "backend",
                "level": "advanced"
            })
            .as_object()
            .unwrap(),
        )
        .unwrap();

        assert_eq!(meta.get("icon").and_then(Value::as_str), Some(DEFAULT_SKILL_ICON));
        assert_eq!(meta.get("years"), Some(&Value::Number(0.0)));
        assert_eq!(meta.get("months"), Some(&Value::Number(0.0)));
    }

    #[test]
    fn test_timeline_rejects_bad_color_and_type() {
        let err = validate(
            &timeline(),
            json!({
                "title": "Graduated",
                "description": "BSc",
                "type": "教育",
                "startDate": "2020-06-30",
                "color": "blue"
            })
            .as_object()
            .unwrap(),
        )
        .unwrap_err();

        assert_eq!(err.fields(), vec!["type", "color"]);
    }
}
