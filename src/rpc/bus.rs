//! In-process Message Bus
//!
//! Routes envelopes to the queue of the host that owns them. Each host has a
//! single bounded queue drained in order by one worker.

use crate::domain::ShareRpc;
use crate::error::{Error, Result};
use crate::rpc::Envelope;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default per-host queue depth
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Host-addressed dispatch over tokio channels
pub struct MessageBus {
    topic: String,
    queue_capacity: usize,
    queues: DashMap<String, mpsc::Sender<Envelope>>,
}

impl MessageBus {
    pub fn new(topic: impl Into<String>, queue_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            topic: topic.into(),
            queue_capacity: queue_capacity.max(1),
            queues: DashMap::new(),
        })
    }

    /// Topic the bus serves
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Open the queue for `host` and return its consuming end.
    ///
    /// Registering a host again replaces its queue; the previous receiver
    /// sees the channel close once drained.
    pub fn register(&self, host: &str) -> mpsc::Receiver<Envelope> {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        if self.queues.insert(host.to_string(), tx).is_some() {
            warn!(topic = %self.topic, host = %host, "Replaced existing queue");
        } else {
            debug!(topic = %self.topic, host = %host, "Registered queue");
        }
        rx
    }

    /// Close the queue for `host`
    pub fn unregister(&self, host: &str) {
        self.queues.remove(host);
    }

    /// Hosts with an open queue, sorted
    pub fn hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.queues.iter().map(|e| e.key().clone()).collect();
        hosts.sort();
        hosts
    }
}

#[async_trait]
impl ShareRpc for MessageBus {
    async fn cast(&self, host: &str, envelope: Envelope) -> Result<()> {
        // Clone the sender so no map guard is held across the await
        let sender = self
            .queues
            .get(host)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::Dispatch {
                host: host.to_string(),
                reason: format!("no consumer on topic {}", self.topic),
            })?;

        let operation = envelope.message.operation();
        sender.send(envelope).await.map_err(|_| Error::Dispatch {
            host: host.to_string(),
            reason: "queue closed".to_string(),
        })?;

        debug!(topic = %self.topic, host = %host, operation, "Cast message");
        Ok(())
    }
}
