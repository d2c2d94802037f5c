pub mod cache;
pub mod clients;
pub mod config;
pub mod consumers;
pub mod db;
pub mod error;
pub mod kafka;
pub mod metrics;
pub mod models;
pub mod services;
