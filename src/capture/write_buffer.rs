//! Write buffer for batched partition appends
//!
//! Captured requests are sent to a channel and appended to their day's
//! partition in batches on the blocking pool, so request handling never
//! waits on the filesystem.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::RequestLogger;
use crate::record::CapturedRequest;

/// Sender handle for queueing captured requests
pub type WriteSender = mpsc::UnboundedSender<CapturedRequest>;

const BATCH_SIZE: usize = 100;
const FLUSH_INTERVAL_MS: u64 = 250;

/// Start the write buffer background task
/// Returns a sender that the capture middleware uses to queue records
pub fn start_write_buffer(logger: Arc<RequestLogger>) -> WriteSender {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(run_write_buffer(logger, rx));

    tx
}

/// Collect records and append them in batches until every sender is dropped
pub async fn run_write_buffer(
    logger: Arc<RequestLogger>,
    mut rx: mpsc::UnboundedReceiver<CapturedRequest>,
) {
    let mut buffer: Vec<CapturedRequest> = Vec::with_capacity(BATCH_SIZE);
    let mut flush_interval =
        tokio::time::interval(tokio::time::Duration::from_millis(FLUSH_INTERVAL_MS));

    info!(
        "Write buffer started (batch_size={}, flush_interval={}ms, log_root={})",
        BATCH_SIZE,
        FLUSH_INTERVAL_MS,
        logger.log_root().display()
    );

    loop {
        tokio::select! {
            record = rx.recv() => {
                match record {
                    Some(r) => {
                        buffer.push(r);
                        if buffer.len() >= BATCH_SIZE {
                            flush_batch(&logger, &mut buffer).await;
                        }
                    }
                    None => {
                        // Channel closed, flush remaining and exit
                        if !buffer.is_empty() {
                            flush_batch(&logger, &mut buffer).await;
                        }
                        info!("Write buffer shutting down");
                        break;
                    }
                }
            }
            // Periodic flush for low-traffic periods
            _ = flush_interval.tick() => {
                if !buffer.is_empty() {
                    flush_batch(&logger, &mut buffer).await;
                }
            }
        }
    }
}

/// Append buffered records on the blocking pool
async fn flush_batch(logger: &Arc<RequestLogger>, buffer: &mut Vec<CapturedRequest>) {
    let batch = std::mem::replace(buffer, Vec::with_capacity(BATCH_SIZE));
    let count = batch.len();
    debug!("Flushing {} request(s) to disk", count);

    let logger = logger.clone();
    match tokio::task::spawn_blocking(move || logger.append_all(&batch)).await {
        Ok(outcome) => {
            // Failed records are lost; the next batch starts from scratch
            for e in &outcome.errors {
                error!("Failed to append request(s): {}", e);
            }
            if outcome.failed > 0 {
                error!(
                    "Flushed {} of {} request(s), {} lost",
                    outcome.written, count, outcome.failed
                );
            } else {
                debug!("Successfully flushed {} request(s)", outcome.written);
            }
        }
        Err(e) => error!("Flush task for {} request(s) panicked: {}", count, e),
    }
}
