//! Periodic dispatch inside the API process.
//!
//! Picks up jobs whose immediate dispatch never happened or lost the
//! race, e.g. because the process restarted right after accepting them.
//! Jobs an immediate dispatch left `processing` when the process died are
//! failed by the loop's stale sweep.

use std::sync::Arc;

use atelier_pipeline::Dispatcher;
use tokio_util::sync::CancellationToken;

/// Run the scheduled dispatch loop until `cancel` is triggered.
pub async fn run(dispatcher: Arc<Dispatcher>, cancel: CancellationToken) {
    dispatcher.run(cancel).await;
}

/// Fire one dispatch in the background, e.g. right after a submission.
pub fn spawn_immediate(dispatcher: Arc<Dispatcher>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = dispatcher.dispatch_once().await {
            tracing::warn!(error = %e, "Immediate dispatch failed, scheduled dispatch will retry");
        }
    })
}
