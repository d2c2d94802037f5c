//! Mention extraction and resolution
//!
//! Extracts @username tokens from content and resolves them against the
//! local user replica only. Tokens are kept per occurrence, repeats
//! included, because one mention event is emitted per occurrence.
//! Unresolvable tokens are dropped silently.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use uuid::Uuid;

use crate::db::ReplicaRepository;
use crate::error::Result;
use crate::models::UserReplica;

/// Matches @username where username is alphanumeric characters and
/// underscores
static MENTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([a-zA-Z0-9_]+)").expect("Invalid mention regex"));

/// Extract @mention tokens from content, one entry per occurrence.
///
/// `"hi @alice @alice @bob"` yields `["alice", "alice", "bob"]`.
pub fn extract_mention_tokens(content: &str) -> Vec<String> {
    MENTION_REGEX
        .captures_iter(content)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Map extracted tokens to replica user ids, dropping tokens with no
/// matching replica row. Occurrence order and repeats are preserved.
fn map_tokens_to_ids(tokens: &[String], users: &[UserReplica]) -> Vec<Uuid> {
    let by_username: HashMap<&str, Uuid> = users
        .iter()
        .map(|user| (user.username.as_str(), user.id))
        .collect();

    tokens
        .iter()
        .filter_map(|token| by_username.get(token.as_str()).copied())
        .collect()
}

/// Resolve every @mention occurrence in `content` to a replica user id.
///
/// One replica lookup covers all distinct tokens; the identity service is
/// never contacted on this path.
pub async fn resolve_mentions(replicas: &ReplicaRepository, content: &str) -> Result<Vec<Uuid>> {
    let tokens = extract_mention_tokens(content);
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let mut distinct = tokens.clone();
    distinct.sort_unstable();
    distinct.dedup();

    let users = replicas.find_many_by_username(&distinct).await?;

    Ok(map_tokens_to_ids(&tokens, &users))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replica(username: &str) -> UserReplica {
        UserReplica {
            id: Uuid::new_v4(),
            username: username.to_string(),
            active: true,
        }
    }

    #[test]
    fn test_extract_single_mention() {
        let tokens = extract_mention_tokens("Hello @alice!");
        assert_eq!(tokens, vec!["alice"]);
    }

    #[test]
    fn test_extract_multiple_mentions() {
        let tokens = extract_mention_tokens("Hey @alice and @bob123, check this out!");
        assert_eq!(tokens, vec!["alice", "bob123"]);
    }

    #[test]
    fn test_extract_keeps_repeated_mentions() {
        let tokens = extract_mention_tokens("hello @alice @alice @bob");
        assert_eq!(tokens, vec!["alice", "alice", "bob"]);
    }

    #[test]
    fn test_extract_no_mentions() {
        assert!(extract_mention_tokens("Hello world!").is_empty());
    }

    #[test]
    fn test_extract_mentions_with_underscores() {
        let tokens = extract_mention_tokens("Hello @user_name_123!");
        assert_eq!(tokens, vec!["user_name_123"]);
    }

    #[test]
    fn test_extract_mentions_at_boundaries() {
        let tokens = extract_mention_tokens("@start middle @end");
        assert_eq!(tokens, vec!["start", "end"]);
    }

    #[test]
    fn test_map_preserves_occurrences() {
        let alice = replica("alice");
        let bob = replica("bob");
        let tokens = extract_mention_tokens("hello @alice @alice @bob");

        let ids = map_tokens_to_ids(&tokens, &[alice.clone(), bob.clone()]);

        assert_eq!(ids, vec![alice.id, alice.id, bob.id]);
    }

    #[test]
    fn test_map_drops_unresolvable_tokens() {
        let alice = replica("alice");
        let tokens = extract_mention_tokens("@alice and @nobody");

        let ids = map_tokens_to_ids(&tokens, &[alice.clone()]);

        assert_eq!(ids, vec![alice.id]);
    }

    #[test]
    fn test_map_is_case_sensitive() {
        let alice = replica("alice");
        let tokens = extract_mention_tokens("@Alice");

        let ids = map_tokens_to_ids(&tokens, &[alice]);

        assert!(ids.is_empty());
    }
}
