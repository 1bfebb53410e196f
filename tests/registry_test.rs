//! Coordinator tests: provider selection, the repository registry and
//! fail-fast configuration validation, exercised over the embedded provider.

mod common;

use common::Article;
use polystore::prelude::*;

fn file_config(dir: &tempfile::TempDir) -> StoreConfig {
    StoreConfig {
        provider: ProviderKind::File,
        postgres: None,
        mongo: None,
        file: Some(FileConfig {
            directory: dir.path().to_string_lossy().into_owned(),
            enforce_soft_delete: true,
        }),
        naming: NamingConfig::default(),
    }
}

#[tokio::test]
async fn connect_registers_and_resolves_repositories() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = PolyStore::connect(&file_config(&dir)).await.unwrap();
    store.health_check().await.unwrap();

    let articles = store.files().unwrap().repository::<Article>().await.unwrap();
    store
        .register_repository("articles".to_string(), articles)
        .unwrap();

    // exactly one implementation per name
    let duplicate = store.files().unwrap().repository::<Article>().await.unwrap();
    assert!(matches!(
        store.register_repository("articles".to_string(), duplicate),
        Err(PolyStoreError::RepositoryAlreadyRegistered(_))
    ));

    let repo = store
        .repository::<FileRepository<Article>>("articles")
        .unwrap();
    let cancel = CancellationToken::new();
    let created = repo.create(Article::new("a", 1), &cancel).await.unwrap();
    assert!(!created.id.is_nil());

    assert_eq!(store.repository_names().len(), 1);
    store.unregister_repository("articles").unwrap();
    assert!(matches!(
        store.repository::<FileRepository<Article>>("articles"),
        Err(PolyStoreError::RepositoryNotFound(_))
    ));
}

#[tokio::test]
async fn unconfigured_providers_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = PolyStore::connect(&file_config(&dir)).await.unwrap();
    assert!(matches!(
        store.postgres(),
        Err(PolyStoreError::ProviderNotConfigured("postgres"))
    ));
    assert!(matches!(
        store.mongo(),
        Err(PolyStoreError::ProviderNotConfigured("mongodb"))
    ));
}

#[tokio::test]
async fn invalid_configuration_fails_before_any_connection() {
    let config = StoreConfig {
        provider: ProviderKind::File,
        postgres: None,
        mongo: None,
        file: Some(FileConfig {
            directory: "   ".to_string(),
            enforce_soft_delete: true,
        }),
        naming: NamingConfig::default(),
    };
    assert!(matches!(
        PolyStore::connect(&config).await,
        Err(PolyStoreError::Config(_))
    ));
}
