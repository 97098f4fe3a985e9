//! Share Worker
//!
//! Drains the dispatch queue of one host, one message at a time, in order.
//! Shutdown is only observed between messages.

use crate::error::ErrorAction;
use crate::manager::ShareManager;
use crate::rpc::Envelope;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Consumer of a host's dispatch queue
pub struct ShareWorker {
    manager: Arc<ShareManager>,
    receiver: mpsc::Receiver<Envelope>,
    shutdown: CancellationToken,
}

impl ShareWorker {
    pub fn new(
        manager: Arc<ShareManager>,
        receiver: mpsc::Receiver<Envelope>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            manager,
            receiver,
            shutdown,
        }
    }

    /// Process messages until shutdown or until every sender is gone.
    ///
    /// Returns the number of messages handled.
    pub async fn run(mut self) -> u64 {
        info!(host = %self.manager.host(), "Share worker started");
        let mut handled = 0u64;

        loop {
            let envelope = tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    debug!("Share worker received shutdown signal");
                    break;
                }

                envelope = self.receiver.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => {
                        debug!("All dispatch senders dropped");
                        break;
                    }
                },
            };

            let operation = envelope.message.operation();
            let request_id = envelope.ctx.request_id.clone();
            if let Err(e) = self.manager.handle(envelope).await {
                match e.action() {
                    ErrorAction::Abandon => {
                        warn!(operation, request_id = %request_id, error = %e, "Share operation failed")
                    }
                    action => warn!(
                        operation,
                        request_id = %request_id,
                        error = %e,
                        ?action,
                        "Share operation failed, caller may retry"
                    ),
                }
            }
            handled += 1;
        }

        info!(host = %self.manager.host(), handled, "Share worker stopped");
        handled
    }
}
