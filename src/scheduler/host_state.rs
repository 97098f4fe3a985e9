//! Host State Registry
//!
//! Fleet view fed by share managers' capability reports. The scheduler reads
//! it to skip hosts whose backend cannot serve the requested protocol.

use crate::domain::{CapabilityPublisher, ShareProtocol, ShareStats};
use crate::error::Result;
use crate::metrics::ControlPlaneMetrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Last capability report of one host
#[derive(Debug, Clone, PartialEq)]
pub struct HostState {
    pub host: String,
    pub stats: ShareStats,
    pub updated_at: DateTime<Utc>,
}

impl HostState {
    pub fn supports(&self, proto: ShareProtocol) -> bool {
        self.stats.supports(proto)
    }
}

/// Capability reports keyed by host
pub struct HostStateRegistry {
    hosts: DashMap<String, HostState>,
    metrics: Option<Arc<ControlPlaneMetrics>>,
}

impl HostStateRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            hosts: DashMap::new(),
            metrics: None,
        })
    }

    /// Registry that mirrors reported capacity into gauges
    pub fn with_metrics(metrics: Arc<ControlPlaneMetrics>) -> Arc<Self> {
        Arc::new(Self {
            hosts: DashMap::new(),
            metrics: Some(metrics),
        })
    }

    pub fn get(&self, host: &str) -> Option<HostState> {
        self.hosts.get(host).map(|h| h.value().clone())
    }

    /// Reporting hosts, sorted
    pub fn hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.hosts.iter().map(|h| h.key().clone()).collect();
        hosts.sort();
        hosts
    }

    /// Whether `host` may serve `proto`. Hosts that never reported are
    /// assumed capable.
    pub fn host_supports(&self, host: &str, proto: ShareProtocol) -> bool {
        self.hosts
            .get(host)
            .map(|h| h.supports(proto))
            .unwrap_or(true)
    }

    /// Forget reports older than `max_age_secs`; returns the hosts removed
    pub fn remove_stale(&self, max_age_secs: i64) -> Vec<String> {
        let now = Utc::now();
        let stale: Vec<String> = self
            .hosts
            .iter()
            .filter(|h| now.signed_duration_since(h.updated_at).num_seconds() > max_age_secs)
            .map(|h| h.key().clone())
            .collect();

        for host in &stale {
            self.hosts.remove(host);
            if let Some(metrics) = &self.metrics {
                metrics.clear_host_capacity(host);
            }
        }
        if !stale.is_empty() {
            info!(count = stale.len(), "Dropped stale host capability reports");
        }
        stale
    }
}

#[async_trait]
impl CapabilityPublisher for HostStateRegistry {
    async fn publish_capabilities(&self, host: &str, stats: ShareStats) -> Result<()> {
        if let Some(metrics) = &self.metrics {
            metrics.set_host_capacity(host, stats.total_capacity_gb, stats.free_capacity_gb);
        }
        debug!(
            host,
            backend = %stats.share_backend_name,
            protocols = %stats.storage_protocol,
            free_gb = ?stats.free_capacity_gb,
            "Capabilities updated"
        );
        self.hosts.insert(
            host.to_string(),
            HostState {
                host: host.to_string(),
                stats,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(protocols: &str) -> ShareStats {
        ShareStats {
            share_backend_name: "test".into(),
            vendor_name: "test".into(),
            driver_version: "1.0".into(),
            storage_protocol: protocols.into(),
            total_capacity_gb: Some(100),
            free_capacity_gb: Some(40),
            reserved_percentage: 0,
            qos_support: false,
        }
    }

    #[tokio::test]
    async fn test_protocol_support() {
        let registry = HostStateRegistry::new();
        registry.publish_capabilities("host-a", stats("NFS")).await.unwrap();

        assert!(registry.host_supports("host-a", ShareProtocol::Nfs));
        assert!(!registry.host_supports("host-a", ShareProtocol::Cifs));
        // No report yet
        assert!(registry.host_supports("host-b", ShareProtocol::Cifs));
    }

    #[tokio::test]
    async fn test_latest_report_wins() {
        let registry = HostStateRegistry::new();
        registry.publish_capabilities("host-a", stats("NFS")).await.unwrap();
        registry.publish_capabilities("host-a", stats("NFS_CIFS")).await.unwrap();

        assert_eq!(registry.hosts(), vec!["host-a".to_string()]);
        assert!(registry.host_supports("host-a", ShareProtocol::Cifs));
    }

    #[tokio::test]
    async fn test_capacity_gauges() {
        let metrics = ControlPlaneMetrics::new().unwrap();
        let registry = HostStateRegistry::with_metrics(metrics.clone());
        registry.publish_capabilities("host-a", stats("NFS")).await.unwrap();

        assert_eq!(metrics.host_free_capacity_gb("host-a"), Some(40.0));
        assert!(registry.remove_stale(3600).is_empty());
        assert_eq!(registry.remove_stale(-1), vec!["host-a".to_string()]);
        assert!(registry.get("host-a").is_none());
    }
}
