//! Post orchestration service
//!
//! Composes every mutating operation the same way: open a ledger
//! transaction, run the existence/ownership checks and row + counter
//! mutations inside it, commit, then update the cache and publish the
//! domain event. Cache writes and publishes after commit are
//! fire-and-forget: the committed transaction is the source of truth and a
//! lost cache write or lost publish is logged, never retried.

use event_schema::{
    topics, MentionCreatedEvent, PostCreatedEvent, PostDeletedEvent, PostLikedEvent,
    PostUnlikedEvent, ReplyCreatedEvent, ReplyDeletedEvent,
};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::cache::PostCache;
use crate::db::{LikeRepository, PostRepository, ReplicaRepository, ReplyRepository};
use crate::error::{AppError, Result};
use crate::kafka::EventProducer;
use crate::models::{PageMeta, Paginated, Post, PostPatch, PostReply};
use crate::services::mentions;

const MAX_PAGE_SIZE: i64 = 100;

pub struct PostService {
    pool: PgPool,
    posts: PostRepository,
    likes: LikeRepository,
    replies: ReplyRepository,
    replicas: ReplicaRepository,
    cache: PostCache,
    producer: EventProducer,
}

impl PostService {
    pub fn new(
        pool: PgPool,
        posts: PostRepository,
        likes: LikeRepository,
        replies: ReplyRepository,
        replicas: ReplicaRepository,
        cache: PostCache,
        producer: EventProducer,
    ) -> Self {
        Self {
            pool,
            posts,
            likes,
            replies,
            replicas,
            cache,
            producer,
        }
    }

    // ========== Reads ==========

    /// Get a live post by id (read-through cached)
    pub async fn find_by_id(&self, post_id: Uuid) -> Result<Post> {
        if let Some(cached) = self.cache.get_post(post_id).await? {
            return Ok(cached);
        }

        let post = self
            .posts
            .find_live(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {post_id} not found")))?;

        if let Err(err) = self.cache.set_post(&post).await {
            debug!(%post_id, "post cache set failed: {}", err);
        }

        Ok(post)
    }

    /// Internal lookup that includes soft-deleted rows
    pub async fn find_any(&self, post_id: Uuid) -> Result<Option<Post>> {
        self.posts.find_any(post_id).await
    }

    /// Page through live posts, newest first.
    ///
    /// Base rows always come fresh from the ledger; cached counters are
    /// overlaid on top where present so hot counters stay fresh without
    /// re-scanning child tables.
    pub async fn find_all(&self, page: i64, limit: i64) -> Result<Paginated<Post>> {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);

        let (mut items, total) = self.posts.page_live(page, limit).await?;

        let post_ids: Vec<Uuid> = items.iter().map(|post| post.id).collect();
        match self.cache.batch_get_counts(&post_ids).await {
            Ok(counts) => {
                for post in &mut items {
                    if let Some(cached) = counts.get(&post.id) {
                        if let Some(like_count) = cached.like_count {
                            post.like_count = like_count as i32;
                        }
                        if let Some(reply_count) = cached.reply_count {
                            post.reply_count = reply_count as i32;
                        }
                    }
                }
            }
            Err(err) => {
                debug!("counter overlay skipped, cache unavailable: {}", err);
            }
        }

        Ok(Paginated {
            items,
            meta: PageMeta::new(total, page, limit),
        })
    }

    /// Page through live replies of a post, oldest first
    pub async fn find_replies(
        &self,
        post_id: Uuid,
        page: i64,
        limit: i64,
    ) -> Result<Paginated<PostReply>> {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);

        self.posts
            .find_live(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {post_id} not found")))?;

        let (items, total) = self.replies.page_live_for_post(post_id, page, limit).await?;

        Ok(Paginated {
            items,
            meta: PageMeta::new(total, page, limit),
        })
    }

    // ========== Mutations ==========

    /// Create a post, resolving @mentions against the local replica.
    ///
    /// Publishes `post.created` plus one `post.mention.created` per resolved
    /// mention occurrence, repeats included.
    pub async fn create_post(
        &self,
        user_id: Uuid,
        content: &str,
        media: Vec<String>,
    ) -> Result<Post> {
        let mentioned = mentions::resolve_mentions(&self.replicas, content).await?;

        let mut tx = self.pool.begin().await?;
        let post = self
            .posts
            .insert(&mut tx, user_id, content, &media, &mentioned)
            .await?;
        tx.commit().await?;

        self.write_post_cache(&post).await;

        if let Err(err) = self
            .producer
            .publish(
                topics::POST_CREATED,
                post.id,
                PostCreatedEvent {
                    post_id: post.id,
                    user_id,
                },
            )
            .await
        {
            debug!(post_id = %post.id, "post.created publish failed: {}", err);
        }

        for mentioned_user_id in &post.mentions {
            if let Err(err) = self
                .producer
                .publish(
                    topics::POST_MENTION_CREATED,
                    *mentioned_user_id,
                    MentionCreatedEvent {
                        post_id: post.id,
                        mentioned_user_id: *mentioned_user_id,
                        by_user_id: user_id,
                    },
                )
                .await
            {
                debug!(post_id = %post.id, "post.mention.created publish failed: {}", err);
            }
        }

        Ok(post)
    }

    /// Apply a partial edit to an owned post. No event is published for
    /// content edits.
    pub async fn update_post(&self, post_id: Uuid, user_id: Uuid, patch: PostPatch) -> Result<Post> {
        let mut tx = self.pool.begin().await?;

        let existing = self
            .posts
            .find_live_in_tx(&mut tx, post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {post_id} not found")))?;

        if existing.user_id != user_id {
            return Err(AppError::Forbidden(format!(
                "post {post_id} is not owned by {user_id}"
            )));
        }

        let post = self.posts.update_partial(&mut tx, post_id, &patch).await?;
        tx.commit().await?;

        self.write_post_cache(&post).await;

        Ok(post)
    }

    /// Soft-delete an owned post and invalidate its cache entry
    pub async fn delete_post(&self, post_id: Uuid, user_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let existing = self
            .posts
            .find_live_in_tx(&mut tx, post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {post_id} not found")))?;

        if existing.user_id != user_id {
            return Err(AppError::Forbidden(format!(
                "post {post_id} is not owned by {user_id}"
            )));
        }

        let deleted = self.posts.soft_delete(&mut tx, post_id).await?;
        tx.commit().await?;

        if deleted {
            if let Err(err) = self.cache.delete_post(post_id).await {
                debug!(%post_id, "post cache invalidation failed: {}", err);
            }

            if let Err(err) = self
                .producer
                .publish(
                    topics::POST_DELETED,
                    post_id,
                    PostDeletedEvent { post_id, user_id },
                )
                .await
            {
                debug!(%post_id, "post.deleted publish failed: {}", err);
            }
        }

        Ok(())
    }

    /// Like a post, returning the new authoritative like count.
    ///
    /// The duplicate pre-check is a fast path only; under concurrency the
    /// unique constraint on (post_id, user_id) is what guarantees exactly
    /// one of the racing inserts wins, surfacing the loser as Conflict.
    pub async fn like_post(&self, post_id: Uuid, user_id: Uuid) -> Result<i32> {
        let mut tx = self.pool.begin().await?;

        if !self.posts.exists_live(&mut tx, post_id).await? {
            return Err(AppError::NotFound(format!("post {post_id} not found")));
        }

        if self.likes.exists(&mut tx, post_id, user_id).await? {
            return Err(AppError::Conflict(format!(
                "post {post_id} already liked by {user_id}"
            )));
        }

        self.likes.insert(&mut tx, post_id, user_id).await?;
        let like_count = self.posts.increment_like_count(&mut tx, post_id).await?;
        tx.commit().await?;

        if let Err(err) = self.cache.set_like_count(post_id, like_count as i64).await {
            debug!(%post_id, "like counter cache set failed: {}", err);
        }

        if let Err(err) = self
            .producer
            .publish(
                topics::POST_LIKED,
                post_id,
                PostLikedEvent {
                    post_id,
                    user_id,
                    like_count,
                },
            )
            .await
        {
            debug!(%post_id, "post.liked publish failed: {}", err);
        }

        Ok(like_count)
    }

    /// Remove a like. Removing a like that does not exist is a silent
    /// success and leaves the counter untouched.
    pub async fn unlike_post(&self, post_id: Uuid, user_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if !self.posts.exists_live(&mut tx, post_id).await? {
            return Err(AppError::NotFound(format!("post {post_id} not found")));
        }

        let removed = self.likes.delete(&mut tx, post_id, user_id).await?;
        if !removed {
            return Ok(());
        }

        let like_count = self.posts.decrement_like_count(&mut tx, post_id).await?;
        tx.commit().await?;

        if let Err(err) = self.cache.set_like_count(post_id, like_count as i64).await {
            debug!(%post_id, "like counter cache set failed: {}", err);
        }

        if let Err(err) = self
            .producer
            .publish(
                topics::POST_UNLIKED,
                post_id,
                PostUnlikedEvent {
                    post_id,
                    user_id,
                    like_count,
                },
            )
            .await
        {
            debug!(%post_id, "post.unliked publish failed: {}", err);
        }

        Ok(())
    }

    /// Reply to a post. Mentions in the reply are resolved and stored on
    /// the row, but no mention events are emitted for replies.
    pub async fn create_reply(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        content: &str,
        media: Vec<String>,
    ) -> Result<PostReply> {
        let mentioned = mentions::resolve_mentions(&self.replicas, content).await?;

        let mut tx = self.pool.begin().await?;

        if !self.posts.exists_live(&mut tx, post_id).await? {
            return Err(AppError::NotFound(format!("post {post_id} not found")));
        }

        let reply = self
            .replies
            .insert(&mut tx, post_id, user_id, content, &media, &mentioned)
            .await?;
        let reply_count = self.posts.increment_reply_count(&mut tx, post_id).await?;
        tx.commit().await?;

        if let Err(err) = self.cache.set_reply_count(post_id, reply_count as i64).await {
            debug!(%post_id, "reply counter cache set failed: {}", err);
        }

        if let Err(err) = self
            .producer
            .publish(
                topics::POST_REPLY_CREATED,
                post_id,
                ReplyCreatedEvent {
                    reply_id: reply.id,
                    post_id,
                    user_id,
                    reply_count,
                },
            )
            .await
        {
            debug!(%post_id, "post.reply.created publish failed: {}", err);
        }

        Ok(reply)
    }

    /// Soft-delete an owned reply and decrement the parent's reply count
    pub async fn delete_reply(&self, reply_id: Uuid, user_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let reply = self
            .replies
            .find_live_in_tx(&mut tx, reply_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("reply {reply_id} not found")))?;

        if reply.user_id != user_id {
            return Err(AppError::Forbidden(format!(
                "reply {reply_id} is not owned by {user_id}"
            )));
        }

        let removed = self.replies.soft_delete(&mut tx, reply_id).await?;
        if !removed {
            return Ok(());
        }

        let reply_count = self
            .posts
            .decrement_reply_count(&mut tx, reply.post_id)
            .await?;
        tx.commit().await?;

        if let Err(err) = self
            .cache
            .set_reply_count(reply.post_id, reply_count as i64)
            .await
        {
            debug!(post_id = %reply.post_id, "reply counter cache set failed: {}", err);
        }

        if let Err(err) = self
            .producer
            .publish(
                topics::POST_REPLY_DELETED,
                reply.post_id,
                ReplyDeletedEvent {
                    reply_id,
                    post_id: reply.post_id,
                    reply_count,
                },
            )
            .await
        {
            debug!(post_id = %reply.post_id, "post.reply.deleted publish failed: {}", err);
        }

        Ok(())
    }

    /// Write the post entry and both counter keys after a committed
    /// create/update
    async fn write_post_cache(&self, post: &Post) {
        if let Err(err) = self.cache.set_post(post).await {
            debug!(post_id = %post.id, "post cache set failed: {}", err);
        }
        if let Err(err) = self
            .cache
            .set_like_count(post.id, post.like_count as i64)
            .await
        {
            debug!(post_id = %post.id, "like counter cache set failed: {}", err);
        }
        if let Err(err) = self
            .cache
            .set_reply_count(post.id, post.reply_count as i64)
            .await
        {
            debug!(post_id = %post.id, "reply counter cache set failed: {}", err);
        }
    }
}
