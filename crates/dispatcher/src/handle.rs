//! SinkHandle - manages a sink with isolated queue and worker task
//!
//! Callers await the worker's reply, so a publish completes only once the sink
//! has produced a terminal result for it. A panicking publish is reported as a
//! failed write and the worker keeps serving the queue.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{CapturedEvent, ContractError, DataSink};

use crate::metrics::SinkMetrics;

struct PublishRequest {
    event: Arc<CapturedEvent>,
    payload: Bytes,
    reply: oneshot::Sender<Result<(), ContractError>>,
}

/// Handle to a running sink worker
pub struct SinkHandle {
    name: String,
    tx: mpsc::Sender<PublishRequest>,
    metrics: Arc<SinkMetrics>,
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    pub fn spawn<S: DataSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker_metrics, worker_name).await;
        });

        Self {
            name,
            tx,
            metrics,
            worker_handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Publish one payload and wait for the sink's result
    ///
    /// Waits for queue space when the worker is behind; nothing is dropped.
    pub async fn publish(
        &self,
        event: Arc<CapturedEvent>,
        payload: Bytes,
    ) -> Result<(), ContractError> {
        let (reply, reply_rx) = oneshot::channel();
        let event_id = event.id;

        self.tx
            .send(PublishRequest {
                event,
                payload,
                reply,
            })
            .await
            .map_err(|_| self.worker_gone("sink worker is not running"))?;
        self.metrics
            .set_queue_len(self.tx.max_capacity() - self.tx.capacity());

        reply_rx.await.map_err(|_| {
            warn!(sink = %self.name, event_id, "Sink worker dropped a publish request");
            self.worker_gone("sink worker stopped before replying")
        })?
    }

    fn worker_gone(&self, message: &str) -> ContractError {
        ContractError::sink_connection(&self.name, message)
    }

    /// Shutdown the sink worker gracefully
    ///
    /// Queued requests are still published before the sink is flushed and closed.
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker_handle.await {
            error!(sink = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
    }
}

impl std::fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkHandle")
            .field("name", &self.name)
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

/// Worker task that consumes publish requests in arrival order
#[instrument(name = "sink_worker_loop", skip(sink, rx, metrics), fields(sink = %name))]
async fn sink_worker<S: DataSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<PublishRequest>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!(sink = %name, "Sink worker started");

    while let Some(request) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        let result = AssertUnwindSafe(sink.publish(&request.event, &request.payload))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                error!(
                    sink = %name,
                    event_id = request.event.id,
                    panic = %message,
                    "Sink panicked during publish"
                );
                Err(ContractError::sink_write(&name, format!("sink panicked: {message}")))
            });
        match &result {
            Ok(()) => metrics.inc_publish_count(),
            Err(e) => {
                metrics.inc_failure_count();
                debug!(
                    sink = %name,
                    event_id = request.event.id,
                    error = %e,
                    "Publish failed"
                );
            }
        }
        // caller may have given up; the result is already accounted for
        let _ = request.reply.send(result);
    }

    if let Err(e) = sink.flush().await {
        error!(sink = %name, error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "Close failed on shutdown");
    }

    debug!(sink = %name, "Sink worker stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic payload")
}
