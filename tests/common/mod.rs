//! Common test utilities.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use share_control_plane::db::MemoryLedger;
use share_control_plane::domain::*;
use share_control_plane::drivers::{MemoryDriver, MemoryDriverConfig};
use share_control_plane::network::{CidrAllocator, NetworkConfig};
use share_control_plane::quota::{QuotaConfig, QuotaEngine};
use share_control_plane::{
    ControlPlaneMetrics, Envelope, Error, HostStateRegistry, ManagerDeps, Result, ShareManager,
};

pub const HOST: &str = "host-a";
pub const PROJECT: &str = "project-1";
pub const USER: &str = "user-1";

// =============================================================================
// Scripted Driver
// =============================================================================

/// Memory driver with injectable failures and a call log
pub struct ScriptedDriver {
    inner: MemoryDriver,
    failures: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<String>>,
    busy_snapshots: AtomicBool,
    empty_export: AtomicBool,
}

impl ScriptedDriver {
    pub fn new(network_allocations: u32) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryDriver::new(MemoryDriverConfig {
                network_allocations,
                ..Default::default()
            }),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            busy_snapshots: AtomicBool::new(false),
            empty_export: AtomicBool::new(false),
        })
    }

    /// Make every later call of `operation` fail with a driver error
    pub fn fail(&self, operation: &str, reason: &str) {
        self.failures
            .lock()
            .insert(operation.to_string(), reason.to_string());
    }

    pub fn heal(&self, operation: &str) {
        self.failures.lock().remove(operation);
    }

    pub fn report_busy_snapshots(&self) {
        self.busy_snapshots.store(true, Ordering::SeqCst);
    }

    pub fn return_empty_export(&self) {
        self.empty_export.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == operation).count()
    }

    pub fn backend(&self) -> &MemoryDriver {
        &self.inner
    }

    fn enter(&self, operation: &str) -> Result<()> {
        self.calls.lock().push(operation.to_string());
        match self.failures.lock().get(operation) {
            Some(reason) => Err(Error::driver("scripted", operation, reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ShareDriver for ScriptedDriver {
    fn backend_name(&self) -> &str {
        "scripted"
    }

    async fn do_setup(&self, ctx: &RequestContext) -> Result<()> {
        self.enter("do_setup")?;
        self.inner.do_setup(ctx).await
    }

    async fn check_for_setup_error(&self) -> Result<()> {
        self.enter("check_for_setup_error")?;
        self.inner.check_for_setup_error().await
    }

    async fn ensure_share(&self, ctx: &RequestContext, share: &Share) -> Result<()> {
        self.enter("ensure_share")?;
        self.inner.ensure_share(ctx, share).await
    }

    async fn create_share(
        &self,
        ctx: &RequestContext,
        share: &Share,
        share_network: Option<&ShareNetwork>,
    ) -> Result<String> {
        self.enter("create_share")?;
        let location = self.inner.create_share(ctx, share, share_network).await?;
        if self.empty_export.load(Ordering::SeqCst) {
            return Ok(String::new());
        }
        Ok(location)
    }

    async fn create_share_from_snapshot(
        &self,
        ctx: &RequestContext,
        share: &Share,
        snapshot: &Snapshot,
        share_network: Option<&ShareNetwork>,
    ) -> Result<String> {
        self.enter("create_share_from_snapshot")?;
        self.inner
            .create_share_from_snapshot(ctx, share, snapshot, share_network)
            .await
    }

    async fn delete_share(&self, ctx: &RequestContext, share: &Share) -> Result<()> {
        self.enter("delete_share")?;
        self.inner.delete_share(ctx, share).await
    }

    async fn create_snapshot(
        &self,
        ctx: &RequestContext,
        snapshot: &Snapshot,
    ) -> Result<Option<SnapshotUpdate>> {
        self.enter("create_snapshot")?;
        self.inner.create_snapshot(ctx, snapshot).await
    }

    async fn delete_snapshot(&self, ctx: &RequestContext, snapshot: &Snapshot) -> Result<()> {
        self.enter("delete_snapshot")?;
        if self.busy_snapshots.load(Ordering::SeqCst) {
            return Err(Error::SnapshotIsBusy {
                snapshot_id: snapshot.id.clone(),
            });
        }
        self.inner.delete_snapshot(ctx, snapshot).await
    }

    async fn allow_access(
        &self,
        ctx: &RequestContext,
        share: &Share,
        access: &AccessRule,
    ) -> Result<()> {
        self.enter("allow_access")?;
        self.inner.allow_access(ctx, share, access).await
    }

    async fn deny_access(
        &self,
        ctx: &RequestContext,
        share: &Share,
        access: &AccessRule,
    ) -> Result<()> {
        self.enter("deny_access")?;
        self.inner.deny_access(ctx, share, access).await
    }

    async fn setup_network(
        &self,
        share_network: &ShareNetwork,
        metadata: &NetworkMetadata,
    ) -> Result<()> {
        self.enter("setup_network")?;
        self.inner.setup_network(share_network, metadata).await
    }

    async fn teardown_network(&self, share_network: &ShareNetwork) -> Result<()> {
        self.enter("teardown_network")?;
        self.inner.teardown_network(share_network).await
    }

    fn get_network_allocations_number(&self) -> u32 {
        self.inner.get_network_allocations_number()
    }

    async fn get_share_stats(&self, refresh: bool) -> Result<ShareStats> {
        self.enter("get_share_stats")?;
        self.inner.get_share_stats(refresh).await
    }
}

// =============================================================================
// Recording Collaborators
// =============================================================================

/// Dispatch sink that keeps every cast
#[derive(Default)]
pub struct RecordingRpc {
    casts: Mutex<Vec<(String, Envelope)>>,
}

impl RecordingRpc {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn casts(&self) -> Vec<(String, Envelope)> {
        self.casts.lock().clone()
    }
}

#[async_trait]
impl ShareRpc for RecordingRpc {
    async fn cast(&self, host: &str, envelope: Envelope) -> Result<()> {
        self.casts.lock().push((host.to_string(), envelope));
        Ok(())
    }
}

/// CIDR allocator that counts allocation rounds
pub struct CountingAllocator {
    inner: Arc<CidrAllocator>,
    pub allocations: AtomicUsize,
    pub deallocations: AtomicUsize,
}

impl CountingAllocator {
    pub fn new(ledger: StatusLedgerRef) -> Arc<Self> {
        Arc::new(Self {
            inner: CidrAllocator::new(NetworkConfig::default(), ledger).unwrap(),
            allocations: AtomicUsize::new(0),
            deallocations: AtomicUsize::new(0),
        })
    }

    pub fn allocated(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    pub fn deallocated(&self) -> usize {
        self.deallocations.load(Ordering::SeqCst)
    }

    pub fn addresses_in_use(&self) -> usize {
        self.inner.used_count(&NetworkConfig::default().cidr)
    }
}

#[async_trait]
impl NetworkAllocator for CountingAllocator {
    async fn allocate_network(
        &self,
        ctx: &RequestContext,
        share_network: &ShareNetwork,
        count: u32,
    ) -> Result<ShareNetwork> {
        self.allocations.fetch_add(1, Ordering::SeqCst);
        self.inner.allocate_network(ctx, share_network, count).await
    }

    async fn deallocate_network(
        &self,
        ctx: &RequestContext,
        share_network: &ShareNetwork,
    ) -> Result<()> {
        self.deallocations.fetch_add(1, Ordering::SeqCst);
        self.inner.deallocate_network(ctx, share_network).await
    }
}

/// Quota ledger whose reservations always fail
#[derive(Default)]
pub struct RejectingQuota {
    pub reserve_attempts: AtomicUsize,
    pub commits: AtomicUsize,
}

#[async_trait]
impl QuotaLedger for RejectingQuota {
    async fn reserve(
        &self,
        _ctx: &RequestContext,
        project_id: &str,
        _deltas: QuotaDeltas,
    ) -> Result<Reservation> {
        self.reserve_attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::QuotaExceeded {
            project_id: project_id.to_string(),
            resource: "gigabytes".to_string(),
            requested: 0,
            in_use: 0,
            reserved: 0,
            limit: 0,
        })
    }

    async fn commit(&self, _ctx: &RequestContext, _reservation: &Reservation) -> Result<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self, _ctx: &RequestContext, _reservation: &Reservation) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Manager Harness
// =============================================================================

/// A share manager for `HOST` wired to in-process collaborators
pub struct Harness {
    pub ctx: RequestContext,
    pub ledger: Arc<MemoryLedger>,
    pub quota: Arc<QuotaEngine>,
    pub allocator: Arc<CountingAllocator>,
    pub driver: Arc<ScriptedDriver>,
    pub host_states: Arc<HostStateRegistry>,
    pub metrics: Arc<ControlPlaneMetrics>,
    pub manager: Arc<ShareManager>,
}

pub fn harness() -> Harness {
    harness_with(0, None)
}

/// Harness whose driver needs `network_allocations` addresses per share
/// network, optionally with a replacement quota ledger
pub fn harness_with(network_allocations: u32, quota_override: Option<QuotaLedgerRef>) -> Harness {
    let ledger = MemoryLedger::new("share");
    let quota = QuotaEngine::new(QuotaConfig::default());
    let allocator = CountingAllocator::new(ledger.clone());
    let driver = ScriptedDriver::new(network_allocations);
    let metrics = ControlPlaneMetrics::new().unwrap();
    let host_states = HostStateRegistry::with_metrics(metrics.clone());

    let quota_ledger: QuotaLedgerRef = match quota_override {
        Some(q) => q,
        None => quota.clone(),
    };
    let manager = ShareManager::new(
        HOST,
        ManagerDeps {
            ledger: ledger.clone(),
            quota: quota_ledger,
            network_allocator: allocator.clone(),
            driver: driver.clone(),
            publisher: host_states.clone(),
            metrics: metrics.clone(),
        },
    );

    Harness {
        ctx: RequestContext::new(USER, PROJECT),
        ledger,
        quota,
        allocator,
        driver,
        host_states,
        metrics,
        manager,
    }
}

impl Harness {
    /// A share record already placed on `HOST`
    pub async fn scheduled_share(&self, size: u64) -> Share {
        place_share(&self.ledger, &self.ctx, HOST, size).await
    }

    /// A share created on the backend through the manager
    pub async fn available_share(&self, size: u64) -> Share {
        let share = self.scheduled_share(size).await;
        self.manager
            .create_share(&self.ctx, &share.id, None, None, None)
            .await
            .unwrap();
        self.ledger.share_get(&self.ctx, &share.id).await.unwrap()
    }

    pub async fn access_rule(&self, share: &Share, address: &str) -> AccessRule {
        self.ledger
            .share_access_create(&self.ctx, NewAccessRule::ip(&share.id, address))
            .await
            .unwrap()
    }

    pub async fn share_network(&self) -> ShareNetwork {
        self.ledger
            .share_network_create(
                &self.ctx,
                NewShareNetwork {
                    project_id: PROJECT.to_string(),
                    name: Some("tenant-net".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
    }
}

// =============================================================================
// Fleet helpers
// =============================================================================

/// Create a share of `size` GB assigned to `host`
pub async fn place_share(
    ledger: &MemoryLedger,
    ctx: &RequestContext,
    host: &str,
    size: u64,
) -> Share {
    let share = ledger
        .share_create(ctx, NewShare::new(PROJECT, USER, size, ShareProtocol::Nfs))
        .await
        .unwrap();
    ledger
        .share_update(ctx, &share.id, ShareUpdate::scheduled_to(host))
        .await
        .unwrap()
}

/// Register a share service for `host` in `zone`
pub async fn register_service(ledger: &MemoryLedger, host: &str, zone: &str) -> ServiceRecord {
    ledger
        .service_create(
            &RequestContext::admin(),
            NewService {
                host: host.to_string(),
                topic: "share".to_string(),
                availability_zone: zone.to_string(),
            },
        )
        .await
        .unwrap()
}
