use chrono::{DateTime, Utc};
/// Event contract for the `post.*` and `auth.user.*` Kafka topics.
///
/// Every message on the bus is an [`EventEnvelope`]: the domain payload
/// flattened at the top level plus `eventId` and `occurredAt`. Consumers key
/// their idempotency tracking on (`eventId`, topic), so the id must be
/// generated exactly once, at publish time.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Topic names, `<domain>.<entity>.<action>`.
pub mod topics {
    // Published by post-service
    pub const POST_CREATED: &str = "post.created";
    pub const POST_LIKED: &str = "post.liked";
    pub const POST_UNLIKED: &str = "post.unliked";
    pub const POST_DELETED: &str = "post.deleted";
    pub const POST_REPLY_CREATED: &str = "post.reply.created";
    pub const POST_REPLY_DELETED: &str = "post.reply.deleted";
    pub const POST_MENTION_CREATED: &str = "post.mention.created";

    // Published by the identity service, consumed here
    pub const USER_CREATED: &str = "auth.user.created";
    pub const USER_UPDATED: &str = "auth.user.updated";
    pub const USER_USERNAME_CHANGED: &str = "auth.user.username.changed";
}

/// Wire envelope for all bus messages.
///
/// Serializes as `{ ...payload fields, "eventId": ..., "occurredAt": ... }`;
/// the payload is flattened rather than nested under a `data` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<T> {
    /// Unique event ID for idempotency and tracing
    pub event_id: Uuid,
    /// Emission timestamp
    pub occurred_at: DateTime<Utc>,
    /// Domain payload, flattened into the top-level object
    #[serde(flatten)]
    pub payload: T,
}

impl<T> EventEnvelope<T> {
    /// Wraps a payload with a freshly generated id and the current time.
    pub fn new(payload: T) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            payload,
        }
    }
}

// ============================================================================
// POST SERVICE EVENTS (published)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCreatedEvent {
    pub post_id: Uuid,
    pub user_id: Uuid,
}

/// `likeCount` is the authoritative post-commit value, not a delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostLikedEvent {
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub like_count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostUnlikedEvent {
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub like_count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDeletedEvent {
    pub post_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyCreatedEvent {
    pub reply_id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub reply_count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyDeletedEvent {
    pub reply_id: Uuid,
    pub post_id: Uuid,
    pub reply_count: i32,
}

/// One event per `@mention` occurrence, repeats included.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentionCreatedEvent {
    pub post_id: Uuid,
    pub mentioned_user_id: Uuid,
    pub by_user_id: Uuid,
}

// ============================================================================
// IDENTITY SERVICE EVENTS (consumed)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCreatedEvent {
    pub id: Uuid,
    pub username: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdatedEvent {
    pub id: Uuid,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsernameChangedEvent {
    pub id: Uuid,
    pub new_username: String,
}

fn default_active() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_flattens_payload() {
        let envelope = EventEnvelope::new(PostLikedEvent {
            post_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            like_count: 3,
        });

        let value = serde_json::to_value(&envelope).unwrap();
        let obj = value.as_object().unwrap();
        assert!(obj.contains_key("eventId"));
        assert!(obj.contains_key("occurredAt"));
        assert!(obj.contains_key("postId"));
        assert!(obj.contains_key("likeCount"));
        assert!(!obj.contains_key("payload"));
        assert_eq!(obj["likeCount"], 3);
    }

    #[test]
    fn test_envelope_round_trip() {
        let envelope = EventEnvelope::new(MentionCreatedEvent {
            post_id: Uuid::new_v4(),
            mentioned_user_id: Uuid::new_v4(),
            by_user_id: Uuid::new_v4(),
        });

        let json = serde_json::to_string(&envelope).unwrap();
        let parsed: EventEnvelope<MentionCreatedEvent> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event_id, envelope.event_id);
        assert_eq!(
            parsed.payload.mentioned_user_id,
            envelope.payload.mentioned_user_id
        );
    }

    #[test]
    fn test_user_created_active_defaults_true() {
        let json = format!(
            r#"{{"id":"{}","username":"alice","eventId":"{}","occurredAt":"2025-01-01T00:00:00Z"}}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );
        let envelope: EventEnvelope<UserCreatedEvent> = serde_json::from_str(&json).unwrap();
        assert!(envelope.payload.active);
        assert_eq!(envelope.payload.username, "alice");
    }

    #[test]
    fn test_username_changed_uses_camel_case() {
        let payload = UsernameChangedEvent {
            id: Uuid::new_v4(),
            new_username: "bob_2".to_string(),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["newUsername"], "bob_2");
    }
}
