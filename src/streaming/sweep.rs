use super::buffer::SegmentBuffer;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Run [`SegmentBuffer::sweep_at`] every `interval` until `cancel` fires
pub fn spawn_sweeper(
    buffer: Arc<SegmentBuffer>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Segment sweeper started (every {}s)", interval.as_secs());

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = buffer.sweep_at(Utc::now()).await;
                    debug!(
                        "Sweep done: {} evicted, {} still tracked",
                        report.evicted_sessions.len(),
                        buffer.tracked_sessions()
                    );
                }
            }
        }

        info!("Segment sweeper stopped");
    })
}
