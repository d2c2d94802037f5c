//! Repositories over PostgreSQL.
//!
//! Counter mutations run inside the caller's transaction and use atomic
//! storage-level increments; callers pass the open transaction via
//! `tx.as_mut()`-style parameters so the row mutation and its counter commit
//! or roll back together.

pub mod like_repo;
pub mod post_repo;
pub mod replica_repo;
pub mod reply_repo;

pub use like_repo::LikeRepository;
pub use post_repo::PostRepository;
pub use replica_repo::ReplicaRepository;
pub use reply_repo::ReplyRepository;
