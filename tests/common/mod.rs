//! Shared fixtures for the provider integration tests
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use polystore::prelude::*;
use repo_core::{AuditStamp, DeletionStamp};

/// Soft-deletable, auditable fixture entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub tag: i64,
    pub status: String,
    pub summary: Option<String>,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
    pub modified_by: Option<String>,
}

impl Article {
    pub fn new(title: &str, tag: i64) -> Self {
        Self {
            id: Uuid::nil(),
            title: title.to_string(),
            tag,
            status: "published".to_string(),
            summary: None,
            deleted: false,
            deleted_at: None,
            deleted_by: None,
            created_at: None,
            created_by: None,
            modified_at: None,
            modified_by: None,
        }
    }
}

impl Entity for Article {
    fn id(&self) -> Uuid {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = id;
    }

    fn type_name() -> &'static str {
        "Article"
    }

    fn soft_delete_capable() -> bool {
        true
    }

    fn deleted_flag_field() -> Option<&'static str> {
        Some("deleted")
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn deletion_stamp(&self) -> Option<DeletionStamp> {
        self.deleted_at.map(|at| DeletionStamp {
            at,
            by: self.deleted_by.clone(),
        })
    }

    fn set_deletion_stamp(&mut self, stamp: Option<DeletionStamp>) {
        match stamp {
            Some(stamp) => {
                self.deleted = true;
                self.deleted_at = Some(stamp.at);
                self.deleted_by = stamp.by;
            }
            None => {
                self.deleted = false;
                self.deleted_at = None;
                self.deleted_by = None;
            }
        }
    }

    fn audit_capable() -> bool {
        true
    }

    fn created_stamp(&self) -> Option<AuditStamp> {
        self.created_at.map(|at| AuditStamp {
            at,
            by: self.created_by.clone(),
        })
    }

    fn modified_stamp(&self) -> Option<AuditStamp> {
        self.modified_at.map(|at| AuditStamp {
            at,
            by: self.modified_by.clone(),
        })
    }

    fn stamp_created(&mut self, actor: Option<&str>, at: DateTime<Utc>) {
        self.created_at = Some(at);
        self.created_by = actor.map(str::to_string);
    }

    fn stamp_modified(&mut self, actor: Option<&str>, at: DateTime<Utc>) {
        self.modified_at = Some(at);
        self.modified_by = actor.map(str::to_string);
    }
}

/// Fixture entity with no capabilities: always physically deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
}

impl Tag {
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::nil(),
            name: name.to_string(),
        }
    }
}

impl Entity for Tag {
    fn id(&self) -> Uuid {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = id;
    }

    fn type_name() -> &'static str {
        "Tag"
    }
}

/// The shared paging/sorting scenario every provider must reproduce
/// identically: 25 sequential tags, page 2 of size 10 sorted ascending.
pub async fn assert_paging_scenario<R>(repo: &R)
where
    R: EntityRepository<Article>,
{
    let cancel = CancellationToken::new();
    let articles: Vec<Article> = (1..=25)
        .map(|n| Article::new(&format!("article {n}"), n))
        .collect();
    let stored = repo.create_many(articles, &cancel).await.unwrap();
    assert_eq!(stored.len(), 25);

    let page = repo
        .query(
            QueryParams::new()
                .sort_by("tag", SortOrder::Asc)
                .page(2)
                .page_size(10),
            &cancel,
        )
        .await
        .unwrap();
    let tags: Vec<i64> = page.items.iter().map(|a| a.tag).collect();
    assert_eq!(tags, (11..=20).collect::<Vec<_>>());
    assert_eq!(page.total_count, 25);
    assert_eq!(page.total_pages(), 3);
    assert!(page.has_previous());
    assert!(page.has_next());

    // a page past the end is empty but keeps the filter's total
    let past = repo
        .query(
            QueryParams::new()
                .sort_by("tag", SortOrder::Asc)
                .page(9)
                .page_size(10),
            &cancel,
        )
        .await
        .unwrap();
    assert!(past.items.is_empty());
    assert_eq!(past.total_count, 25);
}
