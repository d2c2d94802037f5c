//! Business logic services

pub mod backfill;
pub mod mentions;
pub mod posts;

pub use backfill::run_replica_backfill;
pub use mentions::{extract_mention_tokens, resolve_mentions};
pub use posts::PostService;
