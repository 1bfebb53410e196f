//! Integration tests for the PostgreSQL provider
//!
//! These need a reachable server and are skipped unless
//! `POLYSTORE_TEST_PG_HOST` is set. Optional overrides:
//! `POLYSTORE_TEST_PG_PORT`, `POLYSTORE_TEST_PG_DB`,
//! `POLYSTORE_TEST_PG_USER`, `POLYSTORE_TEST_PG_PASSWORD`.

mod common;

use common::{assert_paging_scenario, Article, Tag};
use polystore::prelude::*;
use serde_json::json;

// these tests share one table per entity type; run them one at a time
static TEST_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}

async fn context() -> Option<PgContext> {
    let Ok(host) = std::env::var("POLYSTORE_TEST_PG_HOST") else {
        eprintln!("skipping: POLYSTORE_TEST_PG_HOST not set");
        return None;
    };
    let config = PostgresConfig {
        host,
        port: env_or("POLYSTORE_TEST_PG_PORT", "5432").parse().unwrap(),
        database: env_or("POLYSTORE_TEST_PG_DB", "postgres"),
        username: env_or("POLYSTORE_TEST_PG_USER", "postgres"),
        password: env_or("POLYSTORE_TEST_PG_PASSWORD", "postgres"),
        schema: None,
        min_connections: 1,
        max_connections: 5,
        connect_timeout_seconds: 10,
        command_timeout_seconds: 10,
        retry_attempts: 2,
        retry_backoff_ms: 50,
        enforce_soft_delete: true,
    };
    let naming = NamingPolicy {
        prefix: Some("itest_".to_string()),
        ..NamingPolicy::default()
    };
    Some(PgContext::connect(&config, naming).await.unwrap())
}

/// Fresh table per test run.
async fn repo<T: Entity>(ctx: &PgContext) -> PgRepository<T> {
    let table = ctx.table_name::<T>().unwrap();
    sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
        .execute(ctx.pool())
        .await
        .unwrap();
    ctx.ensure_table::<T>().await.unwrap();
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

    // misses are plain outcomes, not faults
    assert_eq!(repo.delete(Uuid::new_v4(), &cancel).await.unwrap(), None);
    assert!(matches!(
        repo.update(Article::new("nil id", 9), &cancel).await,
        Err(StoreError::InvalidArgument { .. })
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
    assert_eq!(hidden.deleted_by.as_deref(), Some("editor"));

    let restored = repo.restore(stored.id, &cancel).await.unwrap().unwrap();
    assert!(!restored.deleted);
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

    // null fields match IsNull only, never Ne
    let nulls = repo
        .count(Some(Filter::is_null("summary")), &cancel)
        .await
        .unwrap();
    assert_eq!(nulls, 1);
    let ne = repo
        .count(Some(Filter::ne("summary", json!("other"))), &cancel)
        .await
        .unwrap();
    assert_eq!(ne, 1);

    // mixed-type comparison matches nothing
    let mixed = repo
        .count(Some(Filter::gt("title", json!(5))), &cancel)
        .await
        .unwrap();
    assert_eq!(mixed, 0);

    // substring probe
    let contains = repo
        .count(Some(Filter::contains("summary", "summ")), &cancel)
        .await
        .unwrap();
    assert_eq!(contains, 1);
}

#[tokio::test]
async fn hard_delete_only_for_incapable_types() {
    let _guard = TEST_LOCK.lock().await;
    let Some(ctx) = context().await else { return };
    let repo = repo::<Tag>(&ctx).await;
    let cancel = CancellationToken::new();

    let stored = repo.create(Tag::new("rust"), &cancel).await.unwrap();
    assert_eq!(
        repo.soft_delete(stored.id, None, &cancel).await.unwrap(),
        None
    );
    let removed = repo.delete(stored.id, &cancel).await.unwrap();
    assert!(removed.is_some());
    assert_eq!(repo.get_by_id(stored.id, &cancel).await.unwrap(), None);
}

#[tokio::test]
async fn transactional_batches_and_capabilities() {
    let _guard = TEST_LOCK.lock().await;
    let Some(ctx) = context().await else { return };
    let repo = repo::<Article>(&ctx).await;
    let cancel = CancellationToken::new();

    assert!(repo.capabilities().transactions);

    // a failing item rolls back the whole batch
    let stored = repo.create(Article::new("existing", 1), &cancel).await.unwrap();
    let mut colliding = Article::new("collides", 2);
    colliding.set_id(stored.id);
    let result = repo
        .create_many(vec![Article::new("fresh", 3), colliding], &cancel)
        .await;
    assert!(matches!(result, Err(StoreError::Conflict { .. })));
    assert_eq!(repo.count(None, &cancel).await.unwrap(), 1);

    // caller-managed transaction spanning operations
    let mut tx = ctx.begin().await.unwrap();
    let staged = repo
        .create_tx(Article::new("staged", 4), &mut tx, &cancel)
        .await
        .unwrap();
    tx.rollback().await.unwrap();
    assert_eq!(repo.get_by_id(staged.id, &cancel).await.unwrap(), None);
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
            Some(Filter::gte("tag", json!(2))),
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
