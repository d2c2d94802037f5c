use crate::error::{is_unique_violation, AppError, Result};
use crate::models::PostLike;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Repository for like rows
///
/// The unique (post_id, user_id) constraint is the backstop for concurrent
/// duplicate likes; the pre-check in `exists` is only a fast path.
#[derive(Clone)]
pub struct LikeRepository {
    pool: PgPool,
}

impl LikeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Check if the pair already has a like, inside the caller's transaction
    pub async fn exists(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        post_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM post_likes
                WHERE post_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(post_id)
        .bind(user_id)
        .fetch_one(tx.as_mut())
        .await?;

        Ok(exists)
    }

    /// Insert a like row; a concurrent duplicate maps to Conflict via the
    /// unique constraint
    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        post_id: Uuid,
        user_id: Uuid,
    ) -> Result<PostLike> {
        let like = sqlx::query_as::<_, PostLike>(
            r#"
            INSERT INTO post_likes (post_id, user_id)
            VALUES ($1, $2)
            RETURNING id, post_id, user_id, created_at
            "#,
        )
        .bind(post_id)
        .bind(user_id)
        .fetch_one(tx.as_mut())
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AppError::Conflict(format!("post {} already liked by {}", post_id, user_id))
            } else {
                err.into()
            }
        })?;

        Ok(like)
    }

    /// Delete the like row if present; returns whether a row was removed
    pub async fn delete(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        post_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM post_likes
            WHERE post_id = $1 AND user_id = $2
            "#,
        )
        .bind(post_id)
        .bind(user_id)
        .execute(tx.as_mut())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Count like rows for a post (ledger-side verification)
    pub async fn count_for_post(&self, post_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM post_likes
            WHERE post_id = $1
            "#,
        )
        .bind(post_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
