use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::guard::{SyncGuard, SyncOutcome};
use super::policy::SyncPolicy;

/// Run the background sync loop until `shutdown` is cancelled.
///
/// Cancellation is only observed between posts and while sleeping, so a sync
/// in flight always gets to release the lock.
pub async fn sync_loop(
    guard: SyncGuard,
    policy: SyncPolicy,
    interval: Duration,
    shutdown: CancellationToken,
) {
    loop {
        match sync_once(&guard, &policy, &shutdown).await {
            Ok(updated) => {
                if updated > 0 {
                    info!(updated, "Synced comment counts");
                } else {
                    debug!("No posts needed a sync");
                }
            }
            Err(e) => {
                error!("Sync pass failed: {e:#}");
            }
        }

        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            () = shutdown.cancelled() => {
                info!("Sync loop shutting down");
                break;
            }
        }
    }
}

/// Offer every post with a permalink to the guard once.
///
/// Returns how many posts had their count updated. Posts that are not due,
/// or that lose the lock to another process, are left for the next pass.
/// Stops early, between posts, once `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the list of posts cannot be read.
pub async fn sync_once(
    guard: &SyncGuard,
    policy: &SyncPolicy,
    shutdown: &CancellationToken,
) -> Result<usize> {
    let post_ids = guard
        .store()
        .posts_with_permalink()
        .await
        .context("Failed to list posts with a permalink")?;

    let mut updated = 0;
    for post_id in post_ids {
        if shutdown.is_cancelled() {
            debug!(post_id, "Shutdown requested, ending sync pass early");
            break;
        }
        if let SyncOutcome::Updated { .. } = guard.sync(post_id, policy).await {
            updated += 1;
        }
    }

    Ok(updated)
}
