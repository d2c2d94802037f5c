use crate::error::Result;
use crate::models::{Post, PostPatch};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Repository for the Post aggregate root
///
/// Counter columns are only ever mutated through the atomic
/// increment/decrement statements below, inside the same transaction as the
/// child-row change they mirror.
#[derive(Clone)]
pub struct PostRepository {
    pool: PgPool,
}

impl PostRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new post with its resolved mention occurrences
    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        content: &str,
        media: &[String],
        mentions: &[Uuid],
    ) -> Result<Post> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (user_id, content, media, mentions)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, content, media, mentions, like_count, reply_count,
                      created_at, updated_at, deleted_at
            "#,
        )
        .bind(user_id)
        .bind(content)
        .bind(media)
        .bind(mentions)
        .fetch_one(tx.as_mut())
        .await?;

        Ok(post)
    }

    /// Check that a live (not soft-deleted) post exists, inside the caller's
    /// transaction
    pub async fn exists_live(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        post_id: Uuid,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM posts
                WHERE id = $1 AND deleted_at IS NULL
            )
            "#,
        )
        .bind(post_id)
        .fetch_one(tx.as_mut())
        .await?;

        Ok(exists)
    }

    /// Get a live post by ID
    pub async fn find_live(&self, post_id: Uuid) -> Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, user_id, content, media, mentions, like_count, reply_count,
                   created_at, updated_at, deleted_at
            FROM posts
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(post)
    }

    /// Get a post by ID regardless of soft-delete state (internal lookups)
    pub async fn find_any(&self, post_id: Uuid) -> Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, user_id, content, media, mentions, like_count, reply_count,
                   created_at, updated_at, deleted_at
            FROM posts
            WHERE id = $1
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(post)
    }

    /// Get a live post inside the caller's transaction (ownership checks)
    pub async fn find_live_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        post_id: Uuid,
    ) -> Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, user_id, content, media, mentions, like_count, reply_count,
                   created_at, updated_at, deleted_at
            FROM posts
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(post_id)
        .fetch_optional(tx.as_mut())
        .await?;

        Ok(post)
    }

    /// One page of live posts, newest first, plus the total live count
    pub async fn page_live(&self, page: i64, limit: i64) -> Result<(Vec<Post>, i64)> {
        let offset = (page - 1) * limit;

        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, user_id, content, media, mentions, like_count, reply_count,
                   created_at, updated_at, deleted_at
            FROM posts
            WHERE deleted_at IS NULL
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM posts
            WHERE deleted_at IS NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok((posts, total))
    }

    /// Apply a partial update; absent patch fields keep their current value
    pub async fn update_partial(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        post_id: Uuid,
        patch: &PostPatch,
    ) -> Result<Post> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            UPDATE posts
            SET content = COALESCE($2, content),
                media = COALESCE($3, media),
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING id, user_id, content, media, mentions, like_count, reply_count,
                      created_at, updated_at, deleted_at
            "#,
        )
        .bind(post_id)
        .bind(patch.content.as_deref())
        .bind(patch.media.as_deref())
        .fetch_one(tx.as_mut())
        .await?;

        Ok(post)
    }

    /// Mark a post soft-deleted; returns false when already deleted or absent
    pub async fn soft_delete(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        post_id: Uuid,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(post_id)
        .execute(tx.as_mut())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Atomic storage-level increment; returns the value the commit will make
    /// authoritative
    pub async fn increment_like_count(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        post_id: Uuid,
    ) -> Result<i32> {
        let count: i32 = sqlx::query_scalar(
            r#"
            UPDATE posts
            SET like_count = like_count + 1
            WHERE id = $1
            RETURNING like_count
            "#,
        )
        .bind(post_id)
        .fetch_one(tx.as_mut())
        .await?;

        Ok(count)
    }

    /// Atomic decrement; only called after a like row was actually removed
    pub async fn decrement_like_count(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        post_id: Uuid,
    ) -> Result<i32> {
        let count: i32 = sqlx::query_scalar(
            r#"
            UPDATE posts
            SET like_count = like_count - 1
            WHERE id = $1
            RETURNING like_count
            "#,
        )
        .bind(post_id)
        .fetch_one(tx.as_mut())
        .await?;

        Ok(count)
    }

    pub async fn increment_reply_count(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        post_id: Uuid,
    ) -> Result<i32> {
        let count: i32 = sqlx::query_scalar(
            r#"
            UPDATE posts
            SET reply_count = reply_count + 1
            WHERE id = $1
            RETURNING reply_count
            "#,
        )
        .bind(post_id)
        .fetch_one(tx.as_mut())
        .await?;

        Ok(count)
    }

    pub async fn decrement_reply_count(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        post_id: Uuid,
    ) -> Result<i32> {
        let count: i32 = sqlx::query_scalar(
            r#"
            UPDATE posts
            SET reply_count = reply_count - 1
            WHERE id = $1
            RETURNING reply_count
            "#,
        )
        .bind(post_id)
        .fetch_one(tx.as_mut())
        .await?;

        Ok(count)
    }
}
