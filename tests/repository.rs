//! Repository Integration Tests
//!
//! End-to-end CRUD behavior against a real directory tree.

use std::sync::Arc;

use folio::domain::{RawMetadata, Value};
use folio::library::codec;
use folio::schema::{ContentType, FieldSpec, SchemaRegistry};
use folio::{ContentRepository, FsStorage, RepoError};
use serde_json::json;
use tempfile::TempDir;

fn post_type() -> ContentType {
    ContentType::new("post", "posts")
        .field(FieldSpec::string("title").required())
        .field(FieldSpec::boolean("published").with_default(Value::Bool(false)))
}

fn setup() -> (ContentRepository, TempDir) {
    let temp = TempDir::new().unwrap();
    let mut registry = SchemaRegistry::new();
    registry.register(post_type()).unwrap();
    registry
        .register(
            ContentType::new("event", "events")
                .field(FieldSpec::string("title").required())
                .field(FieldSpec::date("date").required())
                .field(FieldSpec::number("seats")),
        )
        .unwrap();

    let storage = Arc::new(FsStorage::new(temp.path()));
    (ContentRepository::new(Arc::new(registry), storage), temp)
}

fn raw(value: serde_json::Value) -> RawMetadata {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn test_create_collide_delete_scenario() {
    let (repo, temp) = setup();

    let first = repo
        .create("post", &raw(json!({"title": "Hello World"})), "body text")
        .await
        .unwrap();
    assert_eq!(first.slug, "hello-world");
    assert_eq!(first.metadata.get("published"), Some(&Value::Bool(false)));
    assert!(temp.path().join("posts/hello-world.md").is_file());

    let second = repo
        .create("post", &raw(json!({"title": "Hello World"})), "other")
        .await
        .unwrap();
    assert_eq!(second.slug, "hello-world-2");
    assert!(temp.path().join("posts/hello-world.md").is_file());
    assert!(temp.path().join("posts/hello-world-2.md").is_file());

    // The first item was not overwritten
    assert_eq!(repo.get("post", "hello-world").await.unwrap().body, "body text");

    repo.delete("post", "hello-world").await.unwrap();
    assert!(matches!(
        repo.get("post", "hello-world").await,
        Err(RepoError::NotFound { .. })
    ));
    assert!(matches!(
        repo.delete("post", "hello-world").await,
        Err(RepoError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_file_layout_is_front_matter_then_body() {
    let (repo, temp) = setup();
    repo.create(
        "post",
        &raw(json!({"published": true, "title": "Layout"})),
        "# Heading\n\nParagraph.\n",
    )
    .await
    .unwrap();

    let text = std::fs::read_to_string(temp.path().join("posts/layout.md")).unwrap();
    assert_eq!(
        text,
        "---\ntitle: Layout\npublished: true\n---\n# Heading\n\nParagraph.\n"
    );
}

#[tokio::test]
async fn test_get_round_trips_created_item() {
    let (repo, _temp) = setup();
    let created = repo
        .create(
            "event",
            &raw(json!({"title": "Launch", "date": "2024-05-01", "seats": "40"})),
            "Doors at seven.\n---\nNot a delimiter.",
        )
        .await
        .unwrap();

    let fetched = repo.get("event", &created.slug).await.unwrap();
    assert_eq!(fetched, created);
    assert_eq!(fetched.metadata.get("seats"), Some(&Value::Number(40.0)));
    assert_eq!(fetched.body, "Doors at seven.\n---\nNot a delimiter.");
}

#[tokio::test]
async fn test_validation_names_every_violation() {
    let (repo, temp) = setup();

    let err = repo
        .create(
            "event",
            &raw(json!({"seats": "plenty"})),
            "",
        )
        .await
        .unwrap_err();

    let RepoError::Validation(errors) = &err else {
        panic!("expected validation error, got {:?}", err);
    };
    assert_eq!(errors.len(), 3);
    assert_eq!(errors.fields(), vec!["title", "date", "seats"]);
    assert!(!temp.path().join("events").exists());
}

#[tokio::test]
async fn test_unknown_fields_are_rejected() {
    let (repo, _temp) = setup();
    let err = repo
        .create("post", &raw(json!({"title": "T", "author": "me"})), "")
        .await
        .unwrap_err();
    assert_eq!(err.violations()[0].field, "author");
}

#[tokio::test]
async fn test_update_is_full_replacement() {
    let (repo, _temp) = setup();
    let item = repo
        .create("event", &raw(json!({"title": "Meetup", "date": "2024-01-01", "seats": 10})), "v1")
        .await
        .unwrap();

    let updated = repo
        .update("event", &item.slug, &raw(json!({"title": "Meetup", "date": "2024-02-01"})), "v2")
        .await
        .unwrap();
    assert!(!updated.metadata.contains("seats"));

    let fetched = repo.get("event", &item.slug).await.unwrap();
    assert_eq!(fetched.body, "v2");
    assert!(!fetched.metadata.contains("seats"));
    assert_eq!(fetched.metadata.get("date").unwrap().to_string(), "2024-02-01");
}

#[tokio::test]
async fn test_update_missing_item_is_not_found() {
    let (repo, temp) = setup();
    let err = repo
        .update("post", "ghost", &raw(json!({"title": "Ghost"})), "")
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound { .. }));
    assert!(!temp.path().join("posts/ghost.md").exists());
}

#[tokio::test]
async fn test_invalid_update_leaves_file_untouched() {
    let (repo, temp) = setup();
    let item = repo
        .create("post", &raw(json!({"title": "Keep"})), "original")
        .await
        .unwrap();
    let before = std::fs::read_to_string(temp.path().join("posts/keep.md")).unwrap();

    let err = repo
        .update("post", &item.slug, &raw(json!({"published": "maybe"})), "changed")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");

    let after = std::fs::read_to_string(temp.path().join("posts/keep.md")).unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_unknown_type_and_unsafe_slugs() {
    let (repo, temp) = setup();

    assert!(matches!(
        repo.create("recipe", &raw(json!({"title": "Soup"})), "").await,
        Err(RepoError::UnknownType(name)) if name == "recipe"
    ));
    assert!(matches!(repo.list("recipe").await, Err(RepoError::UnknownType(_))));

    for slug in ["../escape", "a/b", "..", ".hidden", ""] {
        assert!(
            matches!(repo.get("post", slug).await, Err(RepoError::InvalidSlug { .. })),
            "slug {:?} should be rejected",
            slug
        );
    }
    assert!(matches!(
        repo.update("post", "../../x", &raw(json!({"title": "X"})), "").await,
        Err(RepoError::InvalidSlug { .. })
    ));
    assert!(!temp.path().join("x.md").exists());
}

#[tokio::test]
async fn test_malformed_file_is_reported_not_skipped() {
    let (repo, temp) = setup();
    std::fs::create_dir_all(temp.path().join("posts")).unwrap();
    std::fs::write(temp.path().join("posts/broken.md"), "---\ntitle: [unclosed\n").unwrap();

    let err = repo.get("post", "broken").await.unwrap_err();
    assert_eq!(err.kind(), "malformed_content");
    assert!(matches!(repo.list("post").await, Err(RepoError::Malformed { .. })));
}

#[tokio::test]
async fn test_non_utf8_file_is_malformed() {
    let (repo, temp) = setup();
    std::fs::create_dir_all(temp.path().join("posts")).unwrap();
    std::fs::write(temp.path().join("posts/bad.md"), b"---\ntitle: \xff\xfe\n---\n").unwrap();

    assert_eq!(repo.get("post", "bad").await.unwrap_err().kind(), "malformed_content");
    assert_eq!(repo.list("post").await.unwrap_err().kind(), "malformed_content");
}

#[tokio::test]
async fn test_hand_made_file_with_unusable_name_is_not_listed() {
    let (repo, temp) = setup();
    std::fs::create_dir_all(temp.path().join("posts")).unwrap();
    std::fs::write(temp.path().join("posts/My Post.md"), "---\ntitle: Mine\n---\n").unwrap();

    assert!(repo.list("post").await.unwrap().is_empty());

    repo.index().invalidate("post", Some("My Post")).await;
    repo.create("post", &raw(json!({"title": "Proper"})), "").await.unwrap();
    let slugs: Vec<_> = repo
        .list("post")
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.slug)
        .collect();
    assert_eq!(slugs, vec!["proper"]);
}

#[tokio::test]
async fn test_list_tracks_mutations() {
    let (repo, _temp) = setup();
    assert!(repo.list("post").await.unwrap().is_empty());

    repo.create("post", &raw(json!({"title": "Banana"})), "").await.unwrap();
    repo.create("post", &raw(json!({"title": "Apple"})), "").await.unwrap();
    let titles: Vec<_> = repo
        .list("post")
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.title)
        .collect();
    assert_eq!(titles, vec!["Apple", "Banana"]);

    repo.update("post", "apple", &raw(json!({"title": "Green Apple"})), "")
        .await
        .unwrap();
    repo.delete("post", "banana").await.unwrap();

    let summaries = repo.list("post").await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].slug, "apple");
    assert_eq!(summaries[0].title, "Green Apple");
}

#[tokio::test]
async fn test_external_edits_need_invalidation() {
    let (repo, temp) = setup();
    repo.create("post", &raw(json!({"title": "Cached"})), "").await.unwrap();
    repo.list("post").await.unwrap();

    let ty = repo.registry().get("post").unwrap();
    let mut metadata = folio::Metadata::new();
    metadata.insert("title", Value::Text("Added by hand".into()));
    metadata.insert("published", Value::Bool(true));
    let text = codec::encode(&ty, &metadata, "").unwrap();
    std::fs::write(temp.path().join("posts/by-hand.md"), text).unwrap();

    assert_eq!(repo.list("post").await.unwrap().len(), 1);
    repo.index().invalidate("post", None).await;
    assert_eq!(repo.list("post").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_modify_sees_committed_state() {
    let (repo, _temp) = setup();
    repo.create("post", &raw(json!({"title": "Draft"})), "text").await.unwrap();

    let published = repo
        .modify("post", "draft", |current| {
            let mut metadata = current.metadata.to_raw();
            metadata.insert("published".into(), json!(true));
            (metadata, format!("{} (final)", current.body))
        })
        .await
        .unwrap();

    assert_eq!(published.metadata.get("published"), Some(&Value::Bool(true)));
    assert_eq!(repo.get("post", "draft").await.unwrap().body, "text (final)");
}
