use crate::error::Result;
use crate::models::PostReply;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Repository for reply rows
#[derive(Clone)]
pub struct ReplyRepository {
    pool: PgPool,
}

impl ReplyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a reply row inside the caller's transaction
    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        post_id: Uuid,
        user_id: Uuid,
        content: &str,
        media: &[String],
        mentions: &[Uuid],
    ) -> Result<PostReply> {
        let reply = sqlx::query_as::<_, PostReply>(
            r#"
            INSERT INTO post_replies (post_id, user_id, content, media, mentions)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, post_id, user_id, content, media, mentions,
                      created_at, updated_at, deleted_at
            "#,
        )
        .bind(post_id)
        .bind(user_id)
        .bind(content)
        .bind(media)
        .bind(mentions)
        .fetch_one(tx.as_mut())
        .await?;

        Ok(reply)
    }

    /// Get a live reply by ID
    pub async fn find_live(&self, reply_id: Uuid) -> Result<Option<PostReply>> {
        let reply = sqlx::query_as::<_, PostReply>(
            r#"
            SELECT id, post_id, user_id, content, media, mentions,
                   created_at, updated_at, deleted_at
            FROM post_replies
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(reply_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reply)
    }

    /// Get a live reply inside the caller's transaction (ownership checks)
    pub async fn find_live_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        reply_id: Uuid,
    ) -> Result<Option<PostReply>> {
        let reply = sqlx::query_as::<_, PostReply>(
            r#"
            SELECT id, post_id, user_id, content, media, mentions,
                   created_at, updated_at, deleted_at
            FROM post_replies
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(reply_id)
        .fetch_optional(tx.as_mut())
        .await?;

        Ok(reply)
    }

    /// Mark a reply soft-deleted; returns false when already deleted
    pub async fn soft_delete(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        reply_id: Uuid,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE post_replies
            SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(reply_id)
        .execute(tx.as_mut())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// One page of live replies for a post, oldest first, plus total count
    pub async fn page_live_for_post(
        &self,
        post_id: Uuid,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<PostReply>, i64)> {
        let offset = (page - 1) * limit;

        let replies = sqlx::query_as::<_, PostReply>(
            r#"
            SELECT id, post_id, user_id, content, media, mentions,
                   created_at, updated_at, deleted_at
            FROM post_replies
            WHERE post_id = $1 AND deleted_at IS NULL
            ORDER BY created_at ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(post_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM post_replies
            WHERE post_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(post_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((replies, total))
    }
}
