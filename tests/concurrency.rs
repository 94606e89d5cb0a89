//! Concurrency Integration Tests
//!
//! Per-item serialization, collision-free creates, and readers that never
//! observe a partially written file.

use std::sync::Arc;

use folio::domain::{RawMetadata, Value};
use folio::schema::{ContentType, FieldSpec, SchemaRegistry};
use folio::{ContentRepository, FsStorage, RepoError};
use serde_json::json;
use tempfile::TempDir;

fn setup() -> (Arc<ContentRepository>, TempDir) {
    let temp = TempDir::new().unwrap();
    let mut registry = SchemaRegistry::new();
    registry
        .register(
            ContentType::new("counter", "counters")
                .field(FieldSpec::string("title").required())
                .field(FieldSpec::number("count").with_default(Value::Number(0.0))),
        )
        .unwrap();

    let storage = Arc::new(FsStorage::new(temp.path()));
    let repo = ContentRepository::new(Arc::new(registry), storage);
    (Arc::new(repo), temp)
}

fn raw(value: serde_json::Value) -> RawMetadata {
    value.as_object().cloned().unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_modifies_never_lose_updates() {
    let (repo, _temp) = setup();
    repo.create("counter", &raw(json!({"title": "Hits"})), "")
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let repo = Arc::clone(&repo);
        tasks.push(tokio::spawn(async move {
            repo.modify("counter", "hits", |current| {
                let count = current
                    .metadata
                    .get("count")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                let mut metadata = current.metadata.to_raw();
                metadata.insert("count".into(), json!(count + 1.0));
                (metadata, current.body.clone())
            })
            .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let item = repo.get("counter", "hits").await.unwrap();
    assert_eq!(item.metadata.get("count"), Some(&Value::Number(20.0)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_title_creates_get_distinct_slugs() {
    let (repo, temp) = setup();

    let mut tasks = Vec::new();
    for i in 0..10 {
        let repo = Arc::clone(&repo);
        tasks.push(tokio::spawn(async move {
            repo.create("counter", &raw(json!({"title": "Same Title"})), &format!("writer {}", i))
                .await
        }));
    }

    let mut slugs = Vec::new();
    for task in tasks {
        slugs.push(task.await.unwrap().unwrap().slug);
    }
    slugs.sort();
    slugs.dedup();
    assert_eq!(slugs.len(), 10);
    assert!(slugs.contains(&"same-title".to_string()));

    // Every writer's body survived in its own file
    let mut bodies = Vec::new();
    for slug in &slugs {
        bodies.push(repo.get("counter", slug).await.unwrap().body);
    }
    bodies.sort();
    bodies.dedup();
    assert_eq!(bodies.len(), 10);

    let files = std::fs::read_dir(temp.path().join("counters")).unwrap().count();
    assert_eq!(files, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_torn_files() {
    let (repo, _temp) = setup();
    let small = "x".repeat(16);
    let large = "y".repeat(256 * 1024);
    repo.create("counter", &raw(json!({"title": "Blob"})), &small)
        .await
        .unwrap();

    let writer = {
        let repo = Arc::clone(&repo);
        let (small, large) = (small.clone(), large.clone());
        tokio::spawn(async move {
            for i in 0..30 {
                let body = if i % 2 == 0 { &large } else { &small };
                repo.update("counter", "blob", &raw(json!({"title": "Blob"})), body)
                    .await
                    .unwrap();
            }
        })
    };

    let reader = {
        let repo = Arc::clone(&repo);
        tokio::spawn(async move {
            for _ in 0..60 {
                let item = repo.get("counter", "blob").await.unwrap();
                assert!(
                    item.body == small || item.body == large,
                    "observed a partial body of {} bytes",
                    item.body.len()
                );
                tokio::task::yield_now().await;
            }
        })
    };

    writer.await.unwrap();
    reader.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_different_items_update_in_parallel() {
    let (repo, _temp) = setup();
    for title in ["Alpha", "Beta", "Gamma", "Delta"] {
        repo.create("counter", &raw(json!({"title": title})), "")
            .await
            .unwrap();
    }

    let mut tasks = Vec::new();
    for slug in ["alpha", "beta", "gamma", "delta"] {
        for n in 0..5 {
            let repo = Arc::clone(&repo);
            tasks.push(tokio::spawn(async move {
                repo.modify("counter", slug, move |current| {
                    let mut metadata = current.metadata.to_raw();
                    let count = current.metadata.get("count").and_then(Value::as_f64).unwrap_or(0.0);
                    metadata.insert("count".into(), json!(count + 1.0));
                    (metadata, format!("{}", n))
                })
                .await
            }));
        }
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let summaries = repo.list("counter").await.unwrap();
    assert_eq!(summaries.len(), 4);
    for summary in summaries {
        let item = repo.get("counter", &summary.slug).await.unwrap();
        assert_eq!(item.metadata.get("count"), Some(&Value::Number(5.0)));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_conditional_updates_have_one_winner() {
    let (repo, _temp) = setup();
    let item = repo
        .create("counter", &raw(json!({"title": "Shared"})), "start")
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for body in ["from a", "from b"] {
        let repo = Arc::clone(&repo);
        let revision = item.revision.clone();
        tasks.push(tokio::spawn(async move {
            repo.update_if("counter", "shared", &raw(json!({"title": "Shared"})), body, &revision)
                .await
        }));
    }

    let mut winners = Vec::new();
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(updated) => winners.push(updated.body),
            Err(RepoError::Conflict { .. }) => conflicts += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(conflicts, 1);
    assert_eq!(repo.get("counter", "shared").await.unwrap().body, winners[0]);
}
