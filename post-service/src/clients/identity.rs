//! Identity service HTTP client
//!
//! Used only on the backfill path: mention resolution at request time always
//! goes against the local replica, never this client, so identity outages
//! cannot fail post writes.

use std::time::Duration;

use reqwest::Client;
use tracing::info;

use crate::config::IdentityConfig;
use crate::error::{AppError, Result};
use crate::models::UserReplica;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the identity service internal API
#[derive(Clone)]
pub struct IdentityClient {
    client: Client,
    base_url: String,
    internal_api_key: Option<String>,
}

impl IdentityClient {
    pub fn new(config: &IdentityConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            internal_api_key: config.internal_api_key.clone(),
        })
    }

    /// Fetch the full user snapshot for replica backfill.
    ///
    /// Any failure maps to `Unavailable`: the caller decides whether the
    /// snapshot is required (empty replica at startup) or optional.
    pub async fn fetch_replica_snapshot(&self) -> Result<Vec<UserReplica>> {
        let url = format!("{}/internal/users/replica", self.base_url);

        info!(url = %url, "Fetching user replica snapshot from identity service");

        let mut request = self.client.get(&url);
        if let Some(key) = &self.internal_api_key {
            request = request.header("X-Internal-API-Key", key);
        }

        let response = request.send().await.map_err(|e| {
            AppError::Unavailable(format!("identity snapshot request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Unavailable(format!(
                "identity snapshot returned {status}: {error_text}"
            )));
        }

        let users = response.json::<Vec<UserReplica>>().await.map_err(|e| {
            AppError::Unavailable(format!("identity snapshot parse failed: {e}"))
        })?;

        info!(count = users.len(), "Fetched user replica snapshot");

        Ok(users)
    }
}
