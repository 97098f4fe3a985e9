//! Domain Models - Ledger records and their status machines
//!
//! Plain data for shares, snapshots, access rules, share networks, security
//! services and storage services, plus the valid transitions of each status.
//! Records are owned by the status ledger; everything here is a copy read
//! from it or an update to be written back.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Free-form metadata handed to a driver when a share network is set up
pub type NetworkMetadata = BTreeMap<String, String>;

// =============================================================================
// Share Protocol
// =============================================================================

/// Network file-sharing protocol of a share
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ShareProtocol {
    Nfs,
    Cifs,
    Glusterfs,
}

impl std::fmt::Display for ShareProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShareProtocol::Nfs => write!(f, "NFS"),
            ShareProtocol::Cifs => write!(f, "CIFS"),
            ShareProtocol::Glusterfs => write!(f, "GLUSTERFS"),
        }
    }
}

// =============================================================================
// Share
// =============================================================================

/// Lifecycle status of a share
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShareStatus {
    #[serde(rename = "creating")]
    Creating,
    #[serde(rename = "available")]
    Available,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "deleting")]
    Deleting,
    #[serde(rename = "error_deleting")]
    ErrorDeleting,
    #[serde(rename = "in-use")]
    InUse,
}

impl ShareStatus {
    /// Whether a transition from `self` to `next` is part of the lifecycle
    pub fn can_transition_to(self, next: ShareStatus) -> bool {
        use ShareStatus::*;
        match (self, next) {
            (Creating, Available | Error) => true,
            // Creation is not idempotent; re-running it rewrites the outcome
            (Available, Available | Error) => true,
            (Available | InUse, InUse | Available) => true,
            (Available | InUse | Error, Deleting | ErrorDeleting) => true,
            (Error, Creating) => true,
            (Deleting | ErrorDeleting, ErrorDeleting | Deleting) => true,
            _ => false,
        }
    }

    /// Shares in these states are exported by their host
    pub fn is_exported(self) -> bool {
        matches!(self, ShareStatus::Available | ShareStatus::InUse)
    }
}

impl std::fmt::Display for ShareStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShareStatus::Creating => write!(f, "creating"),
            ShareStatus::Available => write!(f, "available"),
            ShareStatus::Error => write!(f, "error"),
            ShareStatus::Deleting => write!(f, "deleting"),
            ShareStatus::ErrorDeleting => write!(f, "error_deleting"),
            ShareStatus::InUse => write!(f, "in-use"),
        }
    }
}

/// A provisioned network file share
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Share {
    pub id: String,
    pub name: String,
    pub project_id: String,
    pub user_id: String,
    /// Size in GB
    pub size: u64,
    pub share_proto: ShareProtocol,
    pub status: ShareStatus,
    pub export_location: Option<String>,
    pub share_network_id: Option<String>,
    /// Snapshot this share was created from
    pub snapshot_id: Option<String>,
    /// Host assigned by the scheduler
    pub host: Option<String>,
    pub availability_zone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub launched_at: Option<DateTime<Utc>>,
}

/// Fields for a share record about to be created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewShare {
    pub project_id: String,
    pub user_id: String,
    pub size: u64,
    pub share_proto: ShareProtocol,
    pub share_network_id: Option<String>,
    pub snapshot_id: Option<String>,
    pub availability_zone: Option<String>,
}

impl NewShare {
    pub fn new(
        project_id: impl Into<String>,
        user_id: impl Into<String>,
        size: u64,
        share_proto: ShareProtocol,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            user_id: user_id.into(),
            size,
            share_proto,
            share_network_id: None,
            snapshot_id: None,
            availability_zone: None,
        }
    }
}

/// Partial update of a share record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShareUpdate {
    pub status: Option<ShareStatus>,
    pub export_location: Option<String>,
    pub host: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub launched_at: Option<DateTime<Utc>>,
    /// Clear the host assignment before any other field is applied
    #[serde(default)]
    pub unschedule: bool,
}

impl ShareUpdate {
    pub fn status(status: ShareStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn export_location(location: impl Into<String>) -> Self {
        Self {
            export_location: Some(location.into()),
            ..Default::default()
        }
    }

    /// Host assignment written by the scheduler
    pub fn scheduled_to(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            scheduled_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Undo a host assignment whose dispatch failed
    pub fn unscheduled() -> Self {
        Self {
            unschedule: true,
            ..Default::default()
        }
    }

    pub fn with_launched_at(mut self, at: DateTime<Utc>) -> Self {
        self.launched_at = Some(at);
        self
    }

    /// Merge this update into a record
    pub fn apply(&self, share: &mut Share) {
        if self.unschedule {
            share.host = None;
            share.scheduled_at = None;
        }
        if let Some(status) = self.status {
            share.status = status;
        }
        if let Some(location) = &self.export_location {
            share.export_location = Some(location.clone());
        }
        if let Some(host) = &self.host {
            share.host = Some(host.clone());
        }
        if let Some(at) = self.scheduled_at {
            share.scheduled_at = Some(at);
        }
        if let Some(at) = self.launched_at {
            share.launched_at = Some(at);
        }
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Lifecycle status of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Creating,
    Available,
    Error,
    Deleting,
    ErrorDeleting,
}

impl SnapshotStatus {
    pub fn can_transition_to(self, next: SnapshotStatus) -> bool {
        use SnapshotStatus::*;
        match (self, next) {
            (Creating, Available | Error) => true,
            (Available | Error, Deleting | ErrorDeleting) => true,
            // A busy snapshot goes back to available
            (Deleting, Available | ErrorDeleting) => true,
            (ErrorDeleting, Deleting) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotStatus::Creating => write!(f, "creating"),
            SnapshotStatus::Available => write!(f, "available"),
            SnapshotStatus::Error => write!(f, "error"),
            SnapshotStatus::Deleting => write!(f, "deleting"),
            SnapshotStatus::ErrorDeleting => write!(f, "error_deleting"),
        }
    }
}

/// A point-in-time, read-only derivative of a share
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub name: String,
    pub share_id: String,
    pub project_id: String,
    pub user_id: String,
    /// Size in GB, inherited from the share at creation
    pub size: u64,
    pub share_size: u64,
    pub share_proto: ShareProtocol,
    pub status: SnapshotStatus,
    pub progress: String,
    pub export_location: Option<String>,
    pub provider_location: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// Fields for a snapshot record about to be created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSnapshot {
    pub share_id: String,
    pub project_id: String,
    pub user_id: String,
    pub size: u64,
    pub share_size: u64,
    pub share_proto: ShareProtocol,
}

impl NewSnapshot {
    /// Snapshot of `share` in its current size
    pub fn of(share: &Share) -> Self {
        Self {
            share_id: share.id.clone(),
            project_id: share.project_id.clone(),
            user_id: share.user_id.clone(),
            size: share.size,
            share_size: share.size,
            share_proto: share.share_proto,
        }
    }
}

/// Partial update of a snapshot record, also returned by drivers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotUpdate {
    pub status: Option<SnapshotStatus>,
    pub progress: Option<String>,
    pub export_location: Option<String>,
    pub provider_location: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl SnapshotUpdate {
    pub fn status(status: SnapshotStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_progress(mut self, progress: impl Into<String>) -> Self {
        self.progress = Some(progress.into());
        self
    }

    pub fn apply(&self, snapshot: &mut Snapshot) {
        if let Some(status) = self.status {
            snapshot.status = status;
        }
        if let Some(progress) = &self.progress {
            snapshot.progress = progress.clone();
        }
        if let Some(location) = &self.export_location {
            snapshot.export_location = Some(location.clone());
        }
        if let Some(location) = &self.provider_location {
            snapshot.provider_location = Some(location.clone());
        }
        for (key, value) in &self.metadata {
            snapshot.metadata.insert(key.clone(), value.clone());
        }
    }
}

// =============================================================================
// Access Rule
// =============================================================================

/// Kind of client identity an access rule grants
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    Ip,
    User,
    Cert,
}

impl std::fmt::Display for AccessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessType::Ip => write!(f, "ip"),
            AccessType::User => write!(f, "user"),
            AccessType::Cert => write!(f, "cert"),
        }
    }
}

/// State of an access rule. Removal is physical deletion, not a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessRuleState {
    New,
    Active,
    Error,
}

impl AccessRuleState {
    pub fn can_transition_to(self, next: AccessRuleState) -> bool {
        matches!(
            (self, next),
            (AccessRuleState::New, AccessRuleState::Active)
                | (AccessRuleState::New, AccessRuleState::Error)
                | (AccessRuleState::Active, AccessRuleState::Error)
        )
    }
}

impl std::fmt::Display for AccessRuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessRuleState::New => write!(f, "new"),
            AccessRuleState::Active => write!(f, "active"),
            AccessRuleState::Error => write!(f, "error"),
        }
    }
}

/// A grant permitting a client to reach a share
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRule {
    pub id: String,
    pub share_id: String,
    pub access_type: AccessType,
    pub access_to: String,
    pub state: AccessRuleState,
    pub created_at: DateTime<Utc>,
}

/// Fields for an access rule about to be created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccessRule {
    pub share_id: String,
    pub access_type: AccessType,
    pub access_to: String,
}

impl NewAccessRule {
    pub fn ip(share_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            share_id: share_id.into(),
            access_type: AccessType::Ip,
            access_to: address.into(),
        }
    }
}

// =============================================================================
// Share Network
// =============================================================================

/// Status of a share network's topology binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareNetworkStatus {
    Inactive,
    Activating,
    Active,
    Deactivating,
    Error,
}

impl ShareNetworkStatus {
    pub fn can_transition_to(self, next: ShareNetworkStatus) -> bool {
        use ShareNetworkStatus::*;
        matches!(
            (self, next),
            (Inactive, Activating)
                | (Activating, Active)
                | (Activating, Error)
                | (Active, Deactivating)
                | (Deactivating, Inactive)
                | (Deactivating, Error)
                | (Error, Activating)
                | (Error, Deactivating)
        )
    }
}

impl std::fmt::Display for ShareNetworkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShareNetworkStatus::Inactive => write!(f, "inactive"),
            ShareNetworkStatus::Activating => write!(f, "activating"),
            ShareNetworkStatus::Active => write!(f, "active"),
            ShareNetworkStatus::Deactivating => write!(f, "deactivating"),
            ShareNetworkStatus::Error => write!(f, "error"),
        }
    }
}

/// A network address held by a share network on behalf of its driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkAllocation {
    pub id: String,
    pub share_network_id: String,
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
}

/// Tenant-scoped network topology binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareNetwork {
    pub id: String,
    pub project_id: String,
    pub name: Option<String>,
    pub neutron_net_id: Option<String>,
    pub neutron_subnet_id: Option<String>,
    pub network_type: Option<String>,
    pub segmentation_id: Option<u32>,
    pub cidr: Option<String>,
    pub ip_version: Option<u8>,
    pub status: ShareNetworkStatus,
    #[serde(default)]
    pub network_allocations: Vec<NetworkAllocation>,
    #[serde(default)]
    pub security_services: Vec<SecurityService>,
    pub created_at: DateTime<Utc>,
}

/// Fields for a share network about to be created
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewShareNetwork {
    pub project_id: String,
    pub name: Option<String>,
    pub neutron_net_id: Option<String>,
    pub neutron_subnet_id: Option<String>,
    pub cidr: Option<String>,
}

/// Partial update of a share network
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShareNetworkUpdate {
    pub status: Option<ShareNetworkStatus>,
    pub network_type: Option<String>,
    pub segmentation_id: Option<u32>,
    pub cidr: Option<String>,
    pub ip_version: Option<u8>,
}

impl ShareNetworkUpdate {
    pub fn status(status: ShareNetworkStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn apply(&self, network: &mut ShareNetwork) {
        if let Some(status) = self.status {
            network.status = status;
        }
        if let Some(network_type) = &self.network_type {
            network.network_type = Some(network_type.clone());
        }
        if let Some(segmentation_id) = self.segmentation_id {
            network.segmentation_id = Some(segmentation_id);
        }
        if let Some(cidr) = &self.cidr {
            network.cidr = Some(cidr.clone());
        }
        if let Some(ip_version) = self.ip_version {
            network.ip_version = Some(ip_version);
        }
    }
}

// =============================================================================
// Security Service
// =============================================================================

/// Directory or authentication service kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityServiceType {
    Ldap,
    Kerberos,
    ActiveDirectory,
}

/// External directory/authentication service attachable to share networks
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityService {
    pub id: String,
    pub project_id: String,
    pub service_type: SecurityServiceType,
    pub name: Option<String>,
    pub dns_ip: Option<String>,
    pub server: Option<String>,
    pub domain: Option<String>,
    pub user: Option<String>,
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for SecurityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityService")
            .field("id", &self.id)
            .field("project_id", &self.project_id)
            .field("service_type", &self.service_type)
            .field("server", &self.server)
            .field("domain", &self.domain)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Fields for a security service about to be created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSecurityService {
    pub project_id: String,
    pub service_type: SecurityServiceType,
    pub name: Option<String>,
    pub dns_ip: Option<String>,
    pub server: Option<String>,
    pub domain: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

// =============================================================================
// Storage Service
// =============================================================================

/// Registration and heartbeat of a share service running on a host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: String,
    pub host: String,
    pub topic: String,
    pub availability_zone: String,
    pub disabled: bool,
    pub report_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ServiceRecord {
    /// Whether the service has reported within `down_time`
    pub fn is_up(&self, down_time: Duration, now: DateTime<Utc>) -> bool {
        let last_seen = self.updated_at.unwrap_or(self.created_at);
        let down_time = ChronoDuration::from_std(down_time).unwrap_or(ChronoDuration::MAX);
        now.signed_duration_since(last_seen) <= down_time
    }
}

/// Fields for a service registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewService {
    pub host: String,
    pub topic: String,
    pub availability_zone: String,
}

// =============================================================================
// Scheduling Requests
// =============================================================================

/// Share properties relevant to host selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareProperties {
    /// Requested size in GB
    pub size: u64,
    /// `"zone"`, `"zone:host"` or `":host"`
    pub availability_zone: Option<String>,
    pub share_proto: Option<ShareProtocol>,
}

/// Request to place a share
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    pub share_id: String,
    pub snapshot_id: Option<String>,
    pub share_properties: ShareProperties,
}

impl RequestSpec {
    /// Build the placement request for an existing share record
    pub fn for_share(share: &Share) -> Self {
        Self {
            share_id: share.id.clone(),
            snapshot_id: share.snapshot_id.clone(),
            share_properties: ShareProperties {
                size: share.size,
                availability_zone: share.availability_zone.clone(),
                share_proto: Some(share.share_proto),
            },
        }
    }
}

/// Opaque scheduler hints passed through to the manager
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterProperties {
    #[serde(default)]
    pub scheduler_hints: BTreeMap<String, String>,
}

// =============================================================================
// Driver Capabilities
// =============================================================================

/// Capacity and capability report of a backend driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareStats {
    pub share_backend_name: String,
    pub vendor_name: String,
    pub driver_version: String,
    /// Underscore-separated protocol list, e.g. `NFS_CIFS`
    pub storage_protocol: String,
    /// `None` when the backend cannot tell
    pub total_capacity_gb: Option<u64>,
    pub free_capacity_gb: Option<u64>,
    pub reserved_percentage: u8,
    pub qos_support: bool,
}

impl ShareStats {
    /// Whether the backend serves `proto`
    pub fn supports(&self, proto: ShareProtocol) -> bool {
        let wanted = proto.to_string();
        self.storage_protocol
            .split('_')
            .any(|p| p.eq_ignore_ascii_case(&wanted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(updated_secs_ago: Option<i64>) -> ServiceRecord {
        let now = Utc::now();
        ServiceRecord {
            id: "svc-1".into(),
            host: "host-a".into(),
            topic: "share".into(),
            availability_zone: "nova".into(),
            disabled: false,
            report_count: 1,
            created_at: now - ChronoDuration::seconds(3600),
            updated_at: updated_secs_ago.map(|s| now - ChronoDuration::seconds(s)),
        }
    }

    #[test]
    fn test_share_status_serde_names() {
        assert_eq!(serde_json::to_string(&ShareStatus::InUse).unwrap(), "\"in-use\"");
        assert_eq!(
            serde_json::to_string(&ShareStatus::ErrorDeleting).unwrap(),
            "\"error_deleting\""
        );
        assert_eq!(format!("{}", ShareStatus::InUse), "in-use");
    }

    #[test]
    fn test_share_transitions() {
        assert!(ShareStatus::Creating.can_transition_to(ShareStatus::Available));
        assert!(ShareStatus::Creating.can_transition_to(ShareStatus::Error));
        assert!(ShareStatus::Available.can_transition_to(ShareStatus::ErrorDeleting));
        assert!(!ShareStatus::Deleting.can_transition_to(ShareStatus::Available));
        assert!(ShareStatus::InUse.is_exported());
        assert!(!ShareStatus::Creating.is_exported());
    }

    #[test]
    fn test_access_rule_transitions() {
        assert!(AccessRuleState::New.can_transition_to(AccessRuleState::Active));
        assert!(AccessRuleState::New.can_transition_to(AccessRuleState::Error));
        assert!(AccessRuleState::Active.can_transition_to(AccessRuleState::Error));
        assert!(!AccessRuleState::Active.can_transition_to(AccessRuleState::New));
        assert!(!AccessRuleState::Error.can_transition_to(AccessRuleState::Active));
    }

    #[test]
    fn test_share_network_transitions() {
        use ShareNetworkStatus::*;
        assert!(Inactive.can_transition_to(Activating));
        assert!(Error.can_transition_to(Activating));
        assert!(!Active.can_transition_to(Activating));
        assert!(!Activating.can_transition_to(Deactivating));
        assert!(Deactivating.can_transition_to(Error));
    }

    #[test]
    fn test_snapshot_update_merges_metadata() {
        let mut snapshot = Snapshot {
            id: "snap-1".into(),
            name: "share-snapshot-snap-1".into(),
            share_id: "share-1".into(),
            project_id: "p".into(),
            user_id: "u".into(),
            size: 1,
            share_size: 1,
            share_proto: ShareProtocol::Nfs,
            status: SnapshotStatus::Creating,
            progress: "0%".into(),
            export_location: None,
            provider_location: None,
            metadata: BTreeMap::from([("a".to_string(), "1".to_string())]),
            created_at: Utc::now(),
        };

        let mut update = SnapshotUpdate::default();
        update.provider_location = Some("vol/snap".into());
        update.metadata.insert("b".into(), "2".into());
        update.apply(&mut snapshot);

        assert_eq!(snapshot.provider_location.as_deref(), Some("vol/snap"));
        assert_eq!(snapshot.metadata.len(), 2);
        assert_eq!(snapshot.status, SnapshotStatus::Creating);
    }

    #[test]
    fn test_service_liveness() {
        let down_time = Duration::from_secs(60);
        assert!(service(Some(10)).is_up(down_time, Utc::now()));
        assert!(!service(Some(120)).is_up(down_time, Utc::now()));
        // Never reported: falls back to registration time
        assert!(!service(None).is_up(down_time, Utc::now()));
    }

    #[test]
    fn test_stats_protocol_support() {
        let stats = ShareStats {
            share_backend_name: "generic".into(),
            vendor_name: "Open Source".into(),
            driver_version: "1.0".into(),
            storage_protocol: "NFS_CIFS".into(),
            total_capacity_gb: None,
            free_capacity_gb: None,
            reserved_percentage: 0,
            qos_support: false,
        };
        assert!(stats.supports(ShareProtocol::Nfs));
        assert!(stats.supports(ShareProtocol::Cifs));
        assert!(!stats.supports(ShareProtocol::Glusterfs));
    }
}
