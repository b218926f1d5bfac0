use std::time::Duration;

use log::info;

/// Holds the whole pipeline for the rate-limit window between two batches.
pub async fn cool_down(delay: Duration, finished_batch: usize, total_batches: usize) {
    if delay.is_zero() {
        return;
    }
    info!(
        "Batch {}/{} done. Waiting for {} seconds before the next batch...",
        finished_batch,
        total_batches,
        delay.as_secs_f64()
    );
    tokio::time::sleep(delay).await;
}

/// Poll interval while a run is paused.
pub const PAUSE_POLL: Duration = Duration::from_millis(500);

pub async fn pause_tick() {
    tokio::time::sleep(PAUSE_POLL).await;
}
