//! Domain Ports - Core trait definitions for the share control plane
//!
//! These traits define the boundaries between the scheduler / share manager
//! and the systems they coordinate: the status ledger, the quota ledger, the
//! network allocator, the backend driver, message dispatch and the fleet
//! capability view. In-process adapters implement each of them.

use crate::domain::context::RequestContext;
use crate::domain::models::*;
use crate::error::Result;
use crate::rpc::Envelope;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// Status Ledger Port
// =============================================================================

/// Port for the persistent record of every entity and its status.
///
/// Reads of tenant-owned records are scoped to the caller's project unless the
/// context is elevated; a record outside that scope reads as not found.
#[async_trait]
pub trait StatusLedger: Send + Sync {
    // --- shares ---
    async fn share_create(&self, ctx: &RequestContext, share: NewShare) -> Result<Share>;
    async fn share_get(&self, ctx: &RequestContext, share_id: &str) -> Result<Share>;
    async fn share_update(
        &self,
        ctx: &RequestContext,
        share_id: &str,
        update: ShareUpdate,
    ) -> Result<Share>;
    async fn share_delete(&self, ctx: &RequestContext, share_id: &str) -> Result<()>;
    async fn share_get_all_by_host(&self, ctx: &RequestContext, host: &str) -> Result<Vec<Share>>;

    // --- snapshots ---
    async fn share_snapshot_create(
        &self,
        ctx: &RequestContext,
        snapshot: NewSnapshot,
    ) -> Result<Snapshot>;
    async fn share_snapshot_get(&self, ctx: &RequestContext, snapshot_id: &str)
        -> Result<Snapshot>;
    async fn share_snapshot_update(
        &self,
        ctx: &RequestContext,
        snapshot_id: &str,
        update: SnapshotUpdate,
    ) -> Result<Snapshot>;
    async fn share_snapshot_destroy(&self, ctx: &RequestContext, snapshot_id: &str) -> Result<()>;

    // --- access rules ---
    async fn share_access_create(
        &self,
        ctx: &RequestContext,
        rule: NewAccessRule,
    ) -> Result<AccessRule>;
    async fn share_access_get(&self, ctx: &RequestContext, access_id: &str) -> Result<AccessRule>;
    async fn share_access_update(
        &self,
        ctx: &RequestContext,
        access_id: &str,
        state: AccessRuleState,
    ) -> Result<AccessRule>;
    async fn share_access_delete(&self, ctx: &RequestContext, access_id: &str) -> Result<()>;
    /// All rules of a share in creation order
    async fn share_access_get_all_for_share(
        &self,
        ctx: &RequestContext,
        share_id: &str,
    ) -> Result<Vec<AccessRule>>;

    // --- share networks ---
    async fn share_network_create(
        &self,
        ctx: &RequestContext,
        network: NewShareNetwork,
    ) -> Result<ShareNetwork>;
    /// Share network with its allocations and security services joined
    async fn share_network_get(
        &self,
        ctx: &RequestContext,
        share_network_id: &str,
    ) -> Result<ShareNetwork>;
    async fn share_network_update(
        &self,
        ctx: &RequestContext,
        share_network_id: &str,
        update: ShareNetworkUpdate,
    ) -> Result<ShareNetwork>;
    /// Fails unless the share network is inactive
    async fn share_network_delete(&self, ctx: &RequestContext, share_network_id: &str)
        -> Result<()>;
    async fn share_network_add_security_service(
        &self,
        ctx: &RequestContext,
        share_network_id: &str,
        security_service_id: &str,
    ) -> Result<()>;
    async fn share_network_remove_security_service(
        &self,
        ctx: &RequestContext,
        share_network_id: &str,
        security_service_id: &str,
    ) -> Result<()>;

    // --- security services ---
    async fn security_service_create(
        &self,
        ctx: &RequestContext,
        service: NewSecurityService,
    ) -> Result<SecurityService>;
    async fn security_service_get(
        &self,
        ctx: &RequestContext,
        security_service_id: &str,
    ) -> Result<SecurityService>;
    async fn security_service_delete(
        &self,
        ctx: &RequestContext,
        security_service_id: &str,
    ) -> Result<()>;

    // --- network allocations ---
    async fn network_allocation_create(
        &self,
        ctx: &RequestContext,
        share_network_id: &str,
        ip_address: &str,
    ) -> Result<NetworkAllocation>;
    async fn network_allocations_get_for_share_network(
        &self,
        ctx: &RequestContext,
        share_network_id: &str,
    ) -> Result<Vec<NetworkAllocation>>;
    async fn network_allocation_delete(&self, ctx: &RequestContext, allocation_id: &str)
        -> Result<()>;

    // --- services ---
    async fn service_create(&self, ctx: &RequestContext, service: NewService)
        -> Result<ServiceRecord>;
    async fn service_get_by_args(
        &self,
        ctx: &RequestContext,
        host: &str,
        topic: &str,
    ) -> Result<ServiceRecord>;
    /// Share services with their allocated gigabytes, least loaded first,
    /// ties broken by host name
    async fn service_get_all_share_sorted(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<(ServiceRecord, u64)>>;
    /// Record a heartbeat for a service
    async fn service_heartbeat(&self, ctx: &RequestContext, service_id: &str)
        -> Result<ServiceRecord>;
    async fn service_set_disabled(
        &self,
        ctx: &RequestContext,
        service_id: &str,
        disabled: bool,
    ) -> Result<ServiceRecord>;
}

// =============================================================================
// Quota Ledger Port
// =============================================================================

/// Resources tracked per project
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaResource {
    Shares,
    Snapshots,
    Gigabytes,
    ShareNetworks,
}

impl std::fmt::Display for QuotaResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaResource::Shares => write!(f, "shares"),
            QuotaResource::Snapshots => write!(f, "snapshots"),
            QuotaResource::Gigabytes => write!(f, "gigabytes"),
            QuotaResource::ShareNetworks => write!(f, "share_networks"),
        }
    }
}

/// Signed usage changes for one reservation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaDeltas(pub BTreeMap<QuotaResource, i64>);

impl QuotaDeltas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resource: QuotaResource, delta: i64) -> Self {
        *self.0.entry(resource).or_insert(0) += delta;
        self
    }

    pub fn shares(self, delta: i64) -> Self {
        self.with(QuotaResource::Shares, delta)
    }

    pub fn snapshots(self, delta: i64) -> Self {
        self.with(QuotaResource::Snapshots, delta)
    }

    pub fn gigabytes(self, delta: i64) -> Self {
        self.with(QuotaResource::Gigabytes, delta)
    }

    pub fn share_networks(self, delta: i64) -> Self {
        self.with(QuotaResource::ShareNetworks, delta)
    }

    pub fn get(&self, resource: QuotaResource) -> i64 {
        self.0.get(&resource).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (QuotaResource, i64)> + '_ {
        self.0.iter().map(|(r, d)| (*r, *d))
    }
}

/// Handle to reserved, not yet committed usage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub project_id: String,
    pub deltas: QuotaDeltas,
    pub expires_at: DateTime<Utc>,
}

/// Port for two-phase per-project usage accounting
#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// Reserve usage changes; positive deltas are checked against limits
    async fn reserve(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        deltas: QuotaDeltas,
    ) -> Result<Reservation>;

    /// Apply a reservation to usage
    async fn commit(&self, ctx: &RequestContext, reservation: &Reservation) -> Result<()>;

    /// Release a reservation without applying it
    async fn rollback(&self, ctx: &RequestContext, reservation: &Reservation) -> Result<()>;
}

// =============================================================================
// Network Allocator Port
// =============================================================================

/// Port for network resources held by share networks
#[async_trait]
pub trait NetworkAllocator: Send + Sync {
    /// Allocate `count` addresses and return the refreshed share network
    async fn allocate_network(
        &self,
        ctx: &RequestContext,
        share_network: &ShareNetwork,
        count: u32,
    ) -> Result<ShareNetwork>;

    /// Release every allocation of the share network
    async fn deallocate_network(&self, ctx: &RequestContext, share_network: &ShareNetwork)
        -> Result<()>;
}

// =============================================================================
// Share Driver Port
// =============================================================================

/// Port for a storage backend
#[async_trait]
pub trait ShareDriver: Send + Sync {
    /// Get backend name
    fn backend_name(&self) -> &str;

    /// Prepare the backend; called once per process start
    async fn do_setup(&self, ctx: &RequestContext) -> Result<()>;

    /// Verify the backend is usable after setup
    async fn check_for_setup_error(&self) -> Result<()>;

    /// Re-export an existing share after a restart
    async fn ensure_share(&self, ctx: &RequestContext, share: &Share) -> Result<()>;

    /// Create a share and return its export location
    async fn create_share(
        &self,
        ctx: &RequestContext,
        share: &Share,
        share_network: Option<&ShareNetwork>,
    ) -> Result<String>;

    /// Create a share seeded from a snapshot and return its export location
    async fn create_share_from_snapshot(
        &self,
        ctx: &RequestContext,
        share: &Share,
        snapshot: &Snapshot,
        share_network: Option<&ShareNetwork>,
    ) -> Result<String>;

    async fn delete_share(&self, ctx: &RequestContext, share: &Share) -> Result<()>;

    /// Create a snapshot; may return fields to merge into the record
    async fn create_snapshot(
        &self,
        ctx: &RequestContext,
        snapshot: &Snapshot,
    ) -> Result<Option<SnapshotUpdate>>;

    /// Fails with `SnapshotIsBusy` while shares depend on the snapshot
    async fn delete_snapshot(&self, ctx: &RequestContext, snapshot: &Snapshot) -> Result<()>;

    async fn allow_access(
        &self,
        ctx: &RequestContext,
        share: &Share,
        access: &AccessRule,
    ) -> Result<()>;

    /// Revoking an absent rule succeeds
    async fn deny_access(&self, ctx: &RequestContext, share: &Share, access: &AccessRule)
        -> Result<()>;

    async fn setup_network(
        &self,
        share_network: &ShareNetwork,
        metadata: &NetworkMetadata,
    ) -> Result<()>;

    async fn teardown_network(&self, share_network: &ShareNetwork) -> Result<()>;

    /// Number of addresses the backend needs per share network
    fn get_network_allocations_number(&self) -> u32;

    /// Capacity and capability report
    async fn get_share_stats(&self, refresh: bool) -> Result<ShareStats>;
}

// =============================================================================
// Dispatch Port
// =============================================================================

/// Port for fire-and-forget delivery of manager operations to a host
#[async_trait]
pub trait ShareRpc: Send + Sync {
    async fn cast(&self, host: &str, envelope: Envelope) -> Result<()>;
}

// =============================================================================
// Capability Publisher Port
// =============================================================================

/// Port through which managers publish driver capabilities to the scheduler
#[async_trait]
pub trait CapabilityPublisher: Send + Sync {
    async fn publish_capabilities(&self, host: &str, stats: ShareStats) -> Result<()>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type StatusLedgerRef = Arc<dyn StatusLedger>;
pub type QuotaLedgerRef = Arc<dyn QuotaLedger>;
pub type NetworkAllocatorRef = Arc<dyn NetworkAllocator>;
pub type ShareDriverRef = Arc<dyn ShareDriver>;
pub type ShareRpcRef = Arc<dyn ShareRpc>;
pub type CapabilityPublisherRef = Arc<dyn CapabilityPublisher>;
