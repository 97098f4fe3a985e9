//! In-memory Share Driver
//!
//! Simulates a file-share backend in process memory. Used in standalone mode
//! and as the reference implementation of the driver contract: it tracks
//! shares, snapshots, access rules and configured share networks, and refuses
//! to delete a snapshot while shares created from it still exist.

use crate::domain::*;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;
use tracing::{debug, info};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the in-memory driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryDriverConfig {
    /// Name reported in capability reports
    pub backend_name: String,
    /// Host part of export locations
    pub export_host: String,
    /// Directory under which shares are exported
    pub export_root: String,
    /// Advertised capacity; `None` reports unknown
    pub total_capacity_gb: Option<u64>,
    /// Protocols served, underscore separated
    pub storage_protocol: String,
    /// Addresses needed per share network
    pub network_allocations: u32,
}

impl Default for MemoryDriverConfig {
    fn default() -> Self {
        Self {
            backend_name: "memory".to_string(),
            export_host: "127.0.0.1".to_string(),
            export_root: "/shares".to_string(),
            total_capacity_gb: Some(1000),
            storage_protocol: "NFS_CIFS".to_string(),
            network_allocations: 0,
        }
    }
}

// =============================================================================
// Backend State
// =============================================================================

#[derive(Debug, Clone)]
struct ShareState {
    name: String,
    size: u64,
    path: String,
    source_snapshot_id: Option<String>,
    rules: BTreeSet<(AccessType, String)>,
}

#[derive(Debug, Clone)]
struct SnapshotState {
    share_id: String,
    path: String,
}

#[derive(Debug, Default)]
struct BackendState {
    shares: BTreeMap<String, ShareState>,
    snapshots: BTreeMap<String, SnapshotState>,
    networks: BTreeSet<String>,
}

// =============================================================================
// Memory Driver
// =============================================================================

/// Share driver backed by process memory
pub struct MemoryDriver {
    config: MemoryDriverConfig,
    state: RwLock<BackendState>,
}

impl MemoryDriver {
    pub fn new(config: MemoryDriverConfig) -> Self {
        Self {
            config,
            state: RwLock::new(BackendState::default()),
        }
    }

    fn share_path(&self, share: &Share) -> String {
        format!("{}/{}", self.config.export_root.trim_end_matches('/'), share.name)
    }

    fn export_location(&self, path: &str) -> String {
        format!("{}:{}", self.config.export_host, path)
    }

    async fn add_share(&self, share: &Share, source_snapshot_id: Option<String>) -> String {
        let path = self.share_path(share);
        let state = ShareState {
            name: share.name.clone(),
            size: share.size,
            path: path.clone(),
            source_snapshot_id,
            rules: BTreeSet::new(),
        };
        self.state.write().await.shares.insert(share.id.clone(), state);
        self.export_location(&path)
    }

    /// Whether the backend holds the share
    pub async fn has_share(&self, share_id: &str) -> bool {
        self.state.read().await.shares.contains_key(share_id)
    }

    /// Access entries of a share, as `type:to`
    pub async fn access_entries(&self, share_id: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .shares
            .get(share_id)
            .map(|s| s.rules.iter().map(|(t, to)| format!("{}:{}", t, to)).collect())
            .unwrap_or_default()
    }

    /// Whether a share network is currently set up
    pub async fn has_network(&self, share_network_id: &str) -> bool {
        self.state.read().await.networks.contains(share_network_id)
    }
}

#[async_trait]
impl ShareDriver for MemoryDriver {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn do_setup(&self, _ctx: &RequestContext) -> Result<()> {
        info!(backend = %self.config.backend_name, "In-memory share backend ready");
        Ok(())
    }

    async fn check_for_setup_error(&self) -> Result<()> {
        if self.config.storage_protocol.trim().is_empty() {
            return Err(Error::Configuration(
                "memory driver needs at least one storage protocol".to_string(),
            ));
        }
        Ok(())
    }

    async fn ensure_share(&self, _ctx: &RequestContext, share: &Share) -> Result<()> {
        // Re-register shares that exist in the ledger but not in this process
        if !self.has_share(&share.id).await {
            debug!(share_id = %share.id, "Re-registering share");
            self.add_share(share, share.snapshot_id.clone()).await;
        }
        Ok(())
    }

    async fn create_share(
        &self,
        _ctx: &RequestContext,
        share: &Share,
        _share_network: Option<&ShareNetwork>,
    ) -> Result<String> {
        let location = self.add_share(share, None).await;
        debug!(share_id = %share.id, location = %location, "Created share");
        Ok(location)
    }

    async fn create_share_from_snapshot(
        &self,
        _ctx: &RequestContext,
        share: &Share,
        snapshot: &Snapshot,
        _share_network: Option<&ShareNetwork>,
    ) -> Result<String> {
        if !self.state.read().await.snapshots.contains_key(&snapshot.id) {
            return Err(Error::driver(
                self.backend_name(),
                "create_share_from_snapshot",
                format!("snapshot {} not found on backend", snapshot.id),
            ));
        }
        let location = self.add_share(share, Some(snapshot.id.clone())).await;
        debug!(share_id = %share.id, snapshot_id = %snapshot.id, "Created share from snapshot");
        Ok(location)
    }

    async fn delete_share(&self, _ctx: &RequestContext, share: &Share) -> Result<()> {
        if self.state.write().await.shares.remove(&share.id).is_none() {
            debug!(share_id = %share.id, "Share already absent from backend");
        }
        Ok(())
    }

    async fn create_snapshot(
        &self,
        _ctx: &RequestContext,
        snapshot: &Snapshot,
    ) -> Result<Option<SnapshotUpdate>> {
        let mut state = self.state.write().await;
        let share = state.shares.get(&snapshot.share_id).ok_or_else(|| {
            Error::driver(
                "memory",
                "create_snapshot",
                format!("share {} not found on backend", snapshot.share_id),
            )
        })?;

        let path = format!("{}/.snapshots/{}", share.path, snapshot.name);
        let mut update = SnapshotUpdate {
            provider_location: Some(path.clone()),
            ..Default::default()
        };
        update.metadata.insert("source_share".to_string(), share.name.clone());
        update.metadata.insert("source_size_gb".to_string(), share.size.to_string());

        state.snapshots.insert(
            snapshot.id.clone(),
            SnapshotState {
                share_id: snapshot.share_id.clone(),
                path,
            },
        );
        Ok(Some(update))
    }

    async fn delete_snapshot(&self, _ctx: &RequestContext, snapshot: &Snapshot) -> Result<()> {
        let mut state = self.state.write().await;
        let busy = state
            .shares
            .values()
            .any(|s| s.source_snapshot_id.as_deref() == Some(snapshot.id.as_str()));
        if busy {
            return Err(Error::SnapshotIsBusy {
                snapshot_id: snapshot.id.clone(),
            });
        }
        if let Some(removed) = state.snapshots.remove(&snapshot.id) {
            debug!(snapshot_id = %snapshot.id, share_id = %removed.share_id, path = %removed.path, "Deleted snapshot");
        }
        Ok(())
    }

    async fn allow_access(
        &self,
        _ctx: &RequestContext,
        share: &Share,
        access: &AccessRule,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state.shares.get_mut(&share.id).ok_or_else(|| {
            Error::driver("memory", "allow_access", format!("share {} not found on backend", share.id))
        })?;

        if !entry
            .rules
            .insert((access.access_type, access.access_to.clone()))
        {
            return Err(Error::AccessRuleAlreadyExists {
                access_type: access.access_type.to_string(),
                access_to: access.access_to.clone(),
            });
        }
        debug!(share = %entry.name, access_to = %access.access_to, "Granted access");
        Ok(())
    }

    async fn deny_access(&self, _ctx: &RequestContext, share: &Share, access: &AccessRule) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(entry) = state.shares.get_mut(&share.id) {
            entry
                .rules
                .remove(&(access.access_type, access.access_to.clone()));
        }
        Ok(())
    }

    async fn setup_network(&self, share_network: &ShareNetwork, metadata: &NetworkMetadata) -> Result<()> {
        let expected = self.config.network_allocations as usize;
        if share_network.network_allocations.len() < expected {
            return Err(Error::driver(
                "memory",
                "setup_network",
                format!(
                    "share network {} has {} allocations, needs {}",
                    share_network.id,
                    share_network.network_allocations.len(),
                    expected
                ),
            ));
        }
        self.state
            .write()
            .await
            .networks
            .insert(share_network.id.clone());
        debug!(
            share_network_id = %share_network.id,
            security_services = share_network.security_services.len(),
            metadata_keys = metadata.len(),
            "Network set up"
        );
        Ok(())
    }

    async fn teardown_network(&self, share_network: &ShareNetwork) -> Result<()> {
        self.state.write().await.networks.remove(&share_network.id);
        Ok(())
    }

    fn get_network_allocations_number(&self) -> u32 {
        self.config.network_allocations
    }

    async fn get_share_stats(&self, _refresh: bool) -> Result<ShareStats> {
        let used = self
            .state
            .read()
            .await
            .shares
            .values()
            .fold(0u64, |total, s| total.saturating_add(s.size));
        Ok(ShareStats {
            share_backend_name: self.config.backend_name.clone(),
            vendor_name: "Open Source".to_string(),
            driver_version: crate::VERSION.to_string(),
            storage_protocol: self.config.storage_protocol.clone(),
            total_capacity_gb: self.config.total_capacity_gb,
            free_capacity_gb: self.config.total_capacity_gb.map(|t| t.saturating_sub(used)),
            reserved_percentage: 0,
            qos_support: false,
        })
    }
}
