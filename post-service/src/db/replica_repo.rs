use crate::error::Result;
use crate::models::UserReplica;
use sqlx::PgPool;
use uuid::Uuid;

/// Repository for the local user replica
///
/// Rows are written only by consumed auth.user.* events and the startup
/// backfill. Every write is safe to apply twice: the consumer may hand the
/// same event to the handler more than once.
#[derive(Clone)]
pub struct ReplicaRepository {
    pool: PgPool,
}

impl ReplicaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a replica row if absent; an existing row is left untouched so
    /// later events are never clobbered by a redelivered created event
    pub async fn upsert_created(&self, id: Uuid, username: &str, active: bool) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_replicas (id, username, active)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(username)
        .bind(active)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Partial update by id; a missing row is a no-op
    pub async fn update_partial(
        &self,
        id: Uuid,
        username: Option<&str>,
        active: Option<bool>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE user_replicas
            SET username = COALESCE($2, username),
                active = COALESCE($3, active)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(username)
        .bind(active)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Update username only; a missing row is a no-op
    pub async fn set_username(&self, id: Uuid, username: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE user_replicas
            SET username = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(username)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Exact-match username lookup
    pub async fn find_by_username(&self, username: &str) -> Result<Option<UserReplica>> {
        let replica = sqlx::query_as::<_, UserReplica>(
            r#"
            SELECT id, username, active
            FROM user_replicas
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(replica)
    }

    /// Exact-match lookup for a batch of usernames (mention resolution)
    pub async fn find_many_by_username(&self, usernames: &[String]) -> Result<Vec<UserReplica>> {
        if usernames.is_empty() {
            return Ok(Vec::new());
        }

        let replicas = sqlx::query_as::<_, UserReplica>(
            r#"
            SELECT id, username, active
            FROM user_replicas
            WHERE username = ANY($1)
            "#,
        )
        .bind(usernames)
        .fetch_all(&self.pool)
        .await?;

        Ok(replicas)
    }

    /// True when no replica rows exist yet (first boot, pre-backfill)
    pub async fn is_empty(&self) -> Result<bool> {
        let any_row: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(SELECT 1 FROM user_replicas)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(!any_row)
    }

    /// Bulk insert a snapshot; rows already present (written by events that
    /// arrived while the snapshot was in flight) win over snapshot data
    pub async fn bulk_insert(&self, records: &[UserReplica]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let usernames: Vec<String> = records.iter().map(|r| r.username.clone()).collect();
        let actives: Vec<bool> = records.iter().map(|r| r.active).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO user_replicas (id, username, active)
            SELECT * FROM UNNEST($1::uuid[], $2::text[], $3::boolean[])
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&ids)
        .bind(&usernames)
        .bind(&actives)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
