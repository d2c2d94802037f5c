//! HTTP clients for collaborating services

pub mod identity;

pub use identity::IdentityClient;
