use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Post aggregate root; like_count/reply_count mirror live child rows
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub media: Vec<String>,
    /// Resolved mention ids, one entry per occurrence in content
    pub mentions: Vec<Uuid>,
    pub like_count: i32,
    pub reply_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker; NULL means live
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Like entity - unique per (post_id, user_id)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PostLike {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Reply entity - referential to its parent Post
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PostReply {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub media: Vec<String>,
    pub mentions: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Local copy of an externally-owned user record; never authoritative,
/// written only by consumed auth.user.* events and the startup backfill.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserReplica {
    pub id: Uuid,
    pub username: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Partial update for a post; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostPatch {
    pub content: Option<String>,
    pub media: Option<Vec<String>>,
}

/// Pagination metadata for listing responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total: i64,
    pub page: i64,
    pub last_page: i64,
}

impl PageMeta {
    pub fn new(total: i64, page: i64, limit: i64) -> Self {
        // A page size below 1 would divide by zero; floor it.
        let limit = limit.max(1);
        let last_page = if total == 0 {
            1
        } else {
            (total + limit - 1) / limit
        };
        Self {
            total,
            page,
            last_page,
        }
    }
}

/// One page of items plus its metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_meta_last_page() {
        assert_eq!(PageMeta::new(0, 1, 20).last_page, 1);
        assert_eq!(PageMeta::new(20, 1, 20).last_page, 1);
        assert_eq!(PageMeta::new(21, 1, 20).last_page, 2);
        assert_eq!(PageMeta::new(41, 2, 20).last_page, 3);
    }

    #[test]
    fn test_page_meta_floors_non_positive_limit() {
        assert_eq!(PageMeta::new(10, 1, 0).last_page, 10);
        assert_eq!(PageMeta::new(0, 1, 0).last_page, 1);
        assert_eq!(PageMeta::new(5, 1, -3).last_page, 5);
    }

    #[test]
    fn test_replica_active_defaults_true() {
        let replica: UserReplica =
            serde_json::from_str(r#"{"id":"7f3b7e66-7f1c-4a96-a79e-3f8894face13","username":"alice"}"#)
                .unwrap();
        assert!(replica.active);
    }
}
