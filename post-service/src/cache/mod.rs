use crate::error::Result;
use crate::metrics;
use crate::models::Post;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::collections::HashMap;
use uuid::Uuid;

/// Redis cache for posts and their derived counters
///
/// Keys: post:{post_id} (serialized row), post:{post_id}:likes,
/// post:{post_id}:replies.
///
/// Counters are always written with the authoritative post-commit value via
/// SET, never INCR/DECR: a blind cache-side increment can drift from the
/// ledger under duplicate or lost updates. The cache is non-authoritative;
/// every mutating caller treats failures here as log-and-continue.
#[derive(Clone)]
pub struct PostCache {
    redis: ConnectionManager,
    post_ttl: u64,
    counter_ttl: u64,
}

/// Cached counter values for one post; `None` means the key was absent and
/// the caller must keep the ledger value
#[derive(Debug, Clone, Default)]
pub struct CachedCounts {
    pub like_count: Option<i64>,
    pub reply_count: Option<i64>,
}

fn post_key(post_id: Uuid) -> String {
    format!("post:{}", post_id)
}

fn likes_key(post_id: Uuid) -> String {
    format!("post:{}:likes", post_id)
}

fn replies_key(post_id: Uuid) -> String {
    format!("post:{}:replies", post_id)
}

impl PostCache {
    pub fn new(redis: ConnectionManager, post_ttl: u64, counter_ttl: u64) -> Self {
        Self {
            redis,
            post_ttl,
            counter_ttl,
        }
    }

    // ========== Post Entry Operations ==========

    /// Get a cached post entry; a corrupt entry counts as a miss
    pub async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>> {
        let raw: Option<String> = match self.redis.clone().get(post_key(post_id)).await {
            Ok(raw) => raw,
            Err(err) => {
                metrics::record_cache_event("error");
                return Err(err.into());
            }
        };

        match raw {
            Some(json) => match serde_json::from_str::<Post>(&json) {
                Ok(post) => {
                    metrics::record_cache_event("hit");
                    Ok(Some(post))
                }
                Err(err) => {
                    metrics::record_cache_event("error");
                    tracing::warn!(%post_id, error = %err, "Discarding corrupt cached post entry");
                    Ok(None)
                }
            },
            None => {
                metrics::record_cache_event("miss");
                Ok(None)
            }
        }
    }

    /// Write the post entry with the configured TTL
    pub async fn set_post(&self, post: &Post) -> Result<()> {
        let json = serde_json::to_string(post)?;
        let _: () = self
            .redis
            .clone()
            .set_ex(post_key(post.id), json, self.post_ttl)
            .await?;
        Ok(())
    }

    /// Drop the entry and both counter keys (post soft-deleted)
    pub async fn delete_post(&self, post_id: Uuid) -> Result<()> {
        let keys = [post_key(post_id), likes_key(post_id), replies_key(post_id)];
        let _: () = self.redis.clone().del(&keys).await?;
        Ok(())
    }

    // ========== Counter Operations ==========

    /// Overwrite the cached like counter with the authoritative value
    pub async fn set_like_count(&self, post_id: Uuid, count: i64) -> Result<()> {
        let _: () = self
            .redis
            .clone()
            .set_ex(likes_key(post_id), count, self.counter_ttl)
            .await?;
        Ok(())
    }

    /// Overwrite the cached reply counter with the authoritative value
    pub async fn set_reply_count(&self, post_id: Uuid, count: i64) -> Result<()> {
        let _: () = self
            .redis
            .clone()
            .set_ex(replies_key(post_id), count, self.counter_ttl)
            .await?;
        Ok(())
    }

    pub async fn get_like_count(&self, post_id: Uuid) -> Result<Option<i64>> {
        let count: Option<i64> = self.redis.clone().get(likes_key(post_id)).await?;
        Ok(count)
    }

    pub async fn get_reply_count(&self, post_id: Uuid) -> Result<Option<i64>> {
        let count: Option<i64> = self.redis.clone().get(replies_key(post_id)).await?;
        Ok(count)
    }

    // ========== Batch Operations (MGET Optimization) ==========

    /// Batch get cached counters for a page of posts with one MGET
    ///
    /// Absent keys stay `None` so the caller overlays only what the cache
    /// actually knows; defaulting to zero here would erase ledger values.
    pub async fn batch_get_counts(&self, post_ids: &[Uuid]) -> Result<HashMap<Uuid, CachedCounts>> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }

        // Key layout: [likes1, replies1, likes2, replies2, ...]
        let mut keys = Vec::with_capacity(post_ids.len() * 2);
        for post_id in post_ids {
            keys.push(likes_key(*post_id));
            keys.push(replies_key(*post_id));
        }

        let values: Vec<Option<i64>> = self.redis.clone().get(&keys).await?;

        let mut result = HashMap::new();
        for (i, post_id) in post_ids.iter().enumerate() {
            result.insert(
                *post_id,
                CachedCounts {
                    like_count: values[i * 2],
                    reply_count: values[i * 2 + 1],
                },
            );
        }

        Ok(result)
    }
}
