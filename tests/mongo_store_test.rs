//! Integration tests for the MongoDB provider
//!
//! These need a reachable deployment and are skipped unless `MONGODB_URI`
//! is set. They run against the `polystore_test` database.

mod common;

use common::{assert_paging_scenario, Article, Tag};
use polystore::prelude::*;
use serde_json::json;

// these tests share one collection per entity type; run them one at a time
static TEST_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

async fn context() -> Option<MongoContext> {
    let Ok(uri) = std::env::var("MONGODB_URI") else {
        eprintln!("skipping: MONGODB_URI not set");
        return None;
    };
    let config = MongoConfig {
        uri,
        database: "polystore_test".to_string(),
        enforce_soft_delete: true,
        use_transactions: false,
    };
    let naming = NamingPolicy {
        prefix: Some("itest_".to_string()),
        ..NamingPolicy::default()
    };
    Some(MongoContext::connect(&config, naming).await.unwrap())
}

/// Fresh collection per test run.
async fn repo<T: Entity>(ctx: &MongoContext) -> MongoRepository<T> {
    let name = ctx.collection_name::<T>().unwrap();
    ctx.database()
        .collection::<mongo_store::mongodb::bson::Document>(&name)
        .drop()
        .await
        .unwrap();
    ctx.ensure_indexes::<T>().await.unwrap();
    ctx.repository::<T>().unwrap()
}

#[tokio::test]
async fn crud_and_identifier_assignment() {
    let _guard = TEST_LOCK.lock().await;
    let Some(ctx) = context().await else { return };
    let repo = repo::<Article>(&ctx).await;
    let cancel = CancellationToken::new();

    let created = repo.create(Article::new("a", 1), &cancel).await.unwrap();
    assert!(!created.id.is_nil());

    let found = repo.get_by_id(created.id, &cancel).await.unwrap().unwrap();
    assert_eq!(found.title, "a");

    let mut changed = found.clone();
    changed.title = "a2".to_string();
    let updated = repo.update(changed, &cancel).await.unwrap().unwrap();
    assert_eq!(updated.title, "a2");

    let removed = repo.delete(created.id, &cancel).await.unwrap().unwrap();
    assert_eq!(removed.title, "a2");
    assert_eq!(repo.get_by_id(created.id, &cancel).await.unwrap(), None);

    assert_eq!(repo.delete(Uuid::new_v4(), &cancel).await.unwrap(), None);
    assert!(matches!(
        repo.update(Article::new("nil id", 9), &cancel).await,
        Err(StoreError::InvalidArgument { .. })
    ));
}

#[tokio::test]
async fn duplicate_identifier_is_conflict() {
    let _guard = TEST_LOCK.lock().await;
    let Some(ctx) = context().await else { return };
    let repo = repo::<Article>(&ctx).await;
    let cancel = CancellationToken::new();

    let stored = repo.create(Article::new("a", 1), &cancel).await.unwrap();
    let mut dup = Article::new("b", 2);
    dup.set_id(stored.id);
    assert!(matches!(
        repo.create(dup, &cancel).await,
        Err(StoreError::Conflict { .. })
    ));
}

#[tokio::test]
async fn paging_scenario() {
    let _guard = TEST_LOCK.lock().await;
    let Some(ctx) = context().await else { return };
    let repo = repo::<Article>(&ctx).await;
    assert_paging_scenario(&repo).await;
}

#[tokio::test]
async fn soft_delete_lifecycle_and_standing_filter() {
    let _guard = TEST_LOCK.lock().await;
    let Some(ctx) = context().await else { return };
    let repo = repo::<Article>(&ctx).await;
    let cancel = CancellationToken::new();

    let stored = repo.create(Article::new("a", 1), &cancel).await.unwrap();
    repo.soft_delete(stored.id, Some("editor"), &cancel)
        .await
        .unwrap();

    assert_eq!(repo.get_by_id(stored.id, &cancel).await.unwrap(), None);
    assert_eq!(repo.count(None, &cancel).await.unwrap(), 0);
    let hidden = repo
        .get_by_id_any(stored.id, &cancel)
        .await
        .unwrap()
        .unwrap();
    assert!(hidden.deleted);

    let restored = repo.restore(stored.id, &cancel).await.unwrap().unwrap();
    assert!(!restored.deleted);
    assert!(repo.get_by_id(stored.id, &cancel).await.unwrap().is_some());
}

#[tokio::test]
async fn soft_delete_on_incapable_type_is_noop() {
    let _guard = TEST_LOCK.lock().await;
    let Some(ctx) = context().await else { return };
    let repo = repo::<Tag>(&ctx).await;
    let cancel = CancellationToken::new();

    let stored = repo.create(Tag::new("rust"), &cancel).await.unwrap();
    assert_eq!(
        repo.soft_delete(stored.id, None, &cancel).await.unwrap(),
        None
    );
    assert!(repo.get_by_id(stored.id, &cancel).await.unwrap().is_some());
}

#[tokio::test]
async fn filter_translation_matches_reference_semantics() {
    let _guard = TEST_LOCK.lock().await;
    let Some(ctx) = context().await else { return };
    let repo = repo::<Article>(&ctx).await;
    let cancel = CancellationToken::new();

    let mut with_summary = Article::new("with", 1);
    with_summary.summary = Some("a summary".to_string());
    repo.create(with_summary, &cancel).await.unwrap();
    repo.create(Article::new("without", 2), &cancel).await.unwrap();

    let nulls = repo
        .count(Some(Filter::is_null("summary")), &cancel)
        .await
        .unwrap();
    assert_eq!(nulls, 1);
    // Ne excludes null fields, like the reference evaluator
    let ne = repo
        .count(Some(Filter::ne("summary", json!("other"))), &cancel)
        .await
        .unwrap();
    assert_eq!(ne, 1);
    // regex metacharacters in the probe are literal
    let contains = repo
        .count(Some(Filter::contains("summary", "a summ")), &cancel)
        .await
        .unwrap();
    assert_eq!(contains, 1);
}

#[tokio::test]
async fn best_effort_bulk_insert_reports_stored_subset() {
    let _guard = TEST_LOCK.lock().await;
    let Some(ctx) = context().await else { return };
    let repo = repo::<Article>(&ctx).await;
    let cancel = CancellationToken::new();

    let stored = repo.create(Article::new("existing", 1), &cancel).await.unwrap();
    let mut colliding = Article::new("collides", 2);
    colliding.set_id(stored.id);
    let batch = vec![Article::new("fresh", 3), colliding, Article::new("also", 4)];
    let inserted = repo.create_many(batch, &cancel).await.unwrap();
    // unordered insert: everything except the collision landed
    assert_eq!(inserted.len(), 2);
    assert_eq!(repo.count(None, &cancel).await.unwrap(), 3);
}

#[tokio::test]
async fn update_fields_and_stream() {
    use futures::TryStreamExt;

    let _guard = TEST_LOCK.lock().await;
    let Some(ctx) = context().await else { return };
    let repo = repo::<Article>(&ctx).await;
    let cancel = CancellationToken::new();

    for n in 1..=3 {
        repo.create(Article::new(&format!("a{n}"), n), &cancel)
            .await
            .unwrap();
    }
    let changed = repo
        .update_fields(
            Some(Filter::lte("tag", json!(2))),
            &[("status".to_string(), json!("archived"))],
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(changed, 2);

    let streamed: Vec<Article> = repo
        .stream(CancellationToken::new())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(streamed.len(), 3);
}
