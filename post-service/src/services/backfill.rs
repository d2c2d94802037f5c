//! Replica backfill at startup
//!
//! If the local user replica is empty, the full snapshot is pulled from the
//! identity service before the consumer starts, so mention resolution has
//! data to work with from the first request. The insert is insert-if-absent:
//! any replica row that incremental events already created wins over the
//! snapshot, which keeps the backfill safe to run concurrently with late
//! event application.

use tracing::info;

use crate::clients::IdentityClient;
use crate::db::ReplicaRepository;
use crate::error::Result;

/// Populate the replica store from the identity snapshot when it is empty.
///
/// Errors propagate: an empty replica plus an unreachable identity service
/// means the service cannot resolve mentions and must not start.
pub async fn run_replica_backfill(
    replicas: &ReplicaRepository,
    identity: &IdentityClient,
) -> Result<()> {
    if !replicas.is_empty().await? {
        info!("User replica already populated, skipping backfill");
        return Ok(());
    }

    let snapshot = identity.fetch_replica_snapshot().await?;

    if snapshot.is_empty() {
        info!("Identity snapshot is empty, nothing to backfill");
        return Ok(());
    }

    let inserted = replicas.bulk_insert(&snapshot).await?;

    info!(
        fetched = snapshot.len(),
        inserted = inserted,
        "User replica backfill complete"
    );

    Ok(())
}
