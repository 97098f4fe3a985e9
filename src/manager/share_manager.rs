//! Share Manager - lifecycle state machine of one share host
//!
//! Every operation re-reads its records from the status ledger, calls the
//! backend driver, and writes the resulting status last. A driver failure
//! forces the entity into its error status before the original error is
//! returned unchanged.

use crate::domain::*;
use crate::error::{Error, Result};
use crate::metrics::{outcome_label, ControlPlaneMetrics};
use crate::rpc::{Envelope, ShareMessage};
use chrono::Utc;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Run `cleanup` when `result` is an error, then hand back the original error.
///
/// A failing cleanup is logged; it never replaces the error being returned.
pub async fn save_and_reraise<T, F, Fut>(result: Result<T>, cleanup: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    match result {
        Ok(value) => Ok(value),
        Err(err) => {
            if let Err(cleanup_err) = cleanup().await {
                error!(error = %err, cleanup_error = %cleanup_err, "Failed to record error status");
            }
            Err(err)
        }
    }
}

// =============================================================================
// Share Manager
// =============================================================================

/// Collaborators of a share manager
#[derive(Clone)]
pub struct ManagerDeps {
    pub ledger: StatusLedgerRef,
    pub quota: QuotaLedgerRef,
    pub network_allocator: NetworkAllocatorRef,
    pub driver: ShareDriverRef,
    pub publisher: CapabilityPublisherRef,
    pub metrics: Arc<ControlPlaneMetrics>,
}

/// Share lifecycle manager bound to one host
pub struct ShareManager {
    host: String,
    ledger: StatusLedgerRef,
    quota: QuotaLedgerRef,
    network_allocator: NetworkAllocatorRef,
    driver: ShareDriverRef,
    publisher: CapabilityPublisherRef,
    metrics: Arc<ControlPlaneMetrics>,
    /// Serializes activation rounds per share network id
    network_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl ShareManager {
    pub fn new(host: impl Into<String>, deps: ManagerDeps) -> Arc<Self> {
        Arc::new(Self {
            host: host.into(),
            ledger: deps.ledger,
            quota: deps.quota,
            network_allocator: deps.network_allocator,
            driver: deps.driver,
            publisher: deps.publisher,
            metrics: deps.metrics,
            network_locks: DashMap::new(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn driver(&self) -> &ShareDriverRef {
        &self.driver
    }

    /// Route a dispatched message to its operation
    pub async fn handle(&self, envelope: Envelope) -> Result<()> {
        let Envelope { ctx, message, .. } = envelope;
        let operation = message.operation();
        debug!(operation, request_id = %ctx.request_id, "Handling share message");

        let result = match message {
            ShareMessage::CreateShare {
                share_id,
                request_spec,
                filter_properties,
                snapshot_id,
            } => {
                self.create_share(
                    &ctx,
                    &share_id,
                    request_spec,
                    filter_properties,
                    snapshot_id.as_deref(),
                )
                .await
            }
            ShareMessage::DeleteShare { share_id } => self.delete_share(&ctx, &share_id).await,
            ShareMessage::CreateSnapshot {
                share_id,
                snapshot_id,
            } => self.create_snapshot(&ctx, &share_id, &snapshot_id).await,
            ShareMessage::DeleteSnapshot { snapshot_id } => {
                self.delete_snapshot(&ctx, &snapshot_id).await
            }
            ShareMessage::AllowAccess { access_id } => self.allow_access(&ctx, &access_id).await,
            ShareMessage::DenyAccess { access_id } => self.deny_access(&ctx, &access_id).await,
            ShareMessage::ActivateNetwork {
                share_network_id,
                metadata,
            } => {
                self.activate_network(&ctx, &share_network_id, metadata)
                    .await
            }
            ShareMessage::DeactivateNetwork { share_network_id } => {
                self.deactivate_network(&ctx, &share_network_id).await
            }
        };

        self.metrics
            .record_operation(operation, outcome_label(&result));
        result
    }

    // =========================================================================
    // Startup and capabilities
    // =========================================================================

    /// Prepare the driver and re-export every exported share of this host
    #[instrument(skip(self), fields(host = %self.host))]
    pub async fn init_host(&self) -> Result<()> {
        let ctx = RequestContext::admin();

        self.driver.do_setup(&ctx).await?;
        self.driver.check_for_setup_error().await?;

        let shares = self.ledger.share_get_all_by_host(&ctx, &self.host).await?;
        debug!(count = shares.len(), "Re-exporting shares");

        for share in shares {
            if !share.status.is_exported() {
                info!(share_id = %share.id, status = %share.status, "Share is not exported, skipping");
                continue;
            }

            self.driver.ensure_share(&ctx, &share).await?;

            let rules = self
                .ledger
                .share_access_get_all_for_share(&ctx, &share.id)
                .await?;
            for rule in rules
                .iter()
                .filter(|r| r.state == AccessRuleState::Active)
            {
                match self.driver.allow_access(&ctx, &share, rule).await {
                    Ok(()) => {}
                    Err(Error::AccessRuleAlreadyExists { .. }) => {
                        debug!(share_id = %share.id, access_id = %rule.id, "Access rule already in place");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        self.report_capabilities().await?;
        info!("Share host initialized");
        Ok(())
    }

    /// Publish fresh driver stats to the scheduler
    pub async fn report_capabilities(&self) -> Result<()> {
        let stats = self.driver.get_share_stats(true).await?;
        debug!(
            backend = %stats.share_backend_name,
            free_gb = ?stats.free_capacity_gb,
            "Publishing share capabilities"
        );
        self.publisher
            .publish_capabilities(&self.host, stats)
            .await
    }

    // =========================================================================
    // Shares
    // =========================================================================

    /// Create a share on the backend, optionally seeded from a snapshot
    #[instrument(skip(self, ctx, _request_spec, _filter_properties), fields(host = %self.host))]
    pub async fn create_share(
        &self,
        ctx: &RequestContext,
        share_id: &str,
        _request_spec: Option<RequestSpec>,
        _filter_properties: Option<FilterProperties>,
        snapshot_id: Option<&str>,
    ) -> Result<()> {
        let ctx = ctx.elevated();
        let share = self.ledger.share_get(&ctx, share_id).await?;

        let snapshot = match snapshot_id {
            Some(snapshot_id) => {
                let snapshot = self.ledger.share_snapshot_get(&ctx, snapshot_id).await?;
                if snapshot.status != SnapshotStatus::Available {
                    warn!(snapshot_id, status = %snapshot.status, "Snapshot is not available");
                    self.set_share_status(&ctx, share_id, ShareStatus::Error)
                        .await?;
                    return Err(Error::InvalidSnapshot {
                        snapshot_id: snapshot_id.to_string(),
                        status: snapshot.status.to_string(),
                    });
                }
                Some(snapshot)
            }
            None => None,
        };

        let share_network = match &share.share_network_id {
            Some(id) => Some(self.ledger.share_network_get(&ctx, id).await?),
            None => None,
        };

        let created: Result<String> = async {
            let location = match &snapshot {
                Some(snapshot) => {
                    self.driver
                        .create_share_from_snapshot(&ctx, &share, snapshot, share_network.as_ref())
                        .await?
                }
                None => {
                    self.driver
                        .create_share(&ctx, &share, share_network.as_ref())
                        .await?
                }
            };
            if location.is_empty() {
                return Err(Error::driver(
                    self.driver.backend_name(),
                    "create_share",
                    "backend returned an empty export location",
                ));
            }
            Ok(location)
        }
        .await;

        let location = save_and_reraise(created, || {
            self.set_share_status(&ctx, share_id, ShareStatus::Error)
        })
        .await?;

        self.ledger
            .share_update(&ctx, share_id, ShareUpdate::export_location(location.clone()))
            .await?;
        self.ledger
            .share_update(
                &ctx,
                share_id,
                ShareUpdate::status(ShareStatus::Available).with_launched_at(Utc::now()),
            )
            .await?;

        info!(share_id, export_location = %location, "Share created");
        Ok(())
    }

    /// Revoke all access, remove the share from the backend and drop its record
    #[instrument(skip(self, ctx), fields(host = %self.host))]
    pub async fn delete_share(&self, ctx: &RequestContext, share_id: &str) -> Result<()> {
        let elevated = ctx.elevated();
        let share = self.ledger.share_get(&elevated, share_id).await?;
        let project_id = ctx.billing_project(&share.project_id);

        let removed: Result<()> = async {
            let rules = self
                .ledger
                .share_access_get_all_for_share(&elevated, share_id)
                .await?;
            for rule in &rules {
                self.revoke_access(&elevated, &share, rule).await?;
            }
            self.driver.delete_share(&elevated, &share).await
        }
        .await;

        save_and_reraise(removed, || {
            self.set_share_status(&elevated, share_id, ShareStatus::ErrorDeleting)
        })
        .await?;

        let reservation = match released_gigabytes("share", share_id, share.size) {
            Some(gigabytes) => {
                let deltas = QuotaDeltas::new().shares(-1).gigabytes(gigabytes);
                self.reserve_release(&elevated, &project_id, deltas).await
            }
            None => None,
        };

        self.ledger.share_delete(&elevated, share_id).await?;
        if let Some(reservation) = reservation {
            self.commit_release(&elevated, &reservation).await;
        }

        info!(share_id, "Share deleted");
        Ok(())
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Snapshot a share on the backend
    #[instrument(skip(self, ctx), fields(host = %self.host))]
    pub async fn create_snapshot(
        &self,
        ctx: &RequestContext,
        share_id: &str,
        snapshot_id: &str,
    ) -> Result<()> {
        let ctx = ctx.elevated();
        let snapshot = self.ledger.share_snapshot_get(&ctx, snapshot_id).await?;

        let created = self.driver.create_snapshot(&ctx, &snapshot).await;
        let model_update = save_and_reraise(created, || async {
            self.ledger
                .share_snapshot_update(
                    &ctx,
                    snapshot_id,
                    SnapshotUpdate::status(SnapshotStatus::Error),
                )
                .await
                .map(|_| ())
        })
        .await?;

        if let Some(model_update) = model_update {
            self.ledger
                .share_snapshot_update(&ctx, snapshot_id, model_update)
                .await?;
        }

        self.ledger
            .share_snapshot_update(
                &ctx,
                snapshot_id,
                SnapshotUpdate::status(SnapshotStatus::Available).with_progress("100%"),
            )
            .await?;

        info!(share_id, snapshot_id, "Snapshot created");
        Ok(())
    }

    /// Remove a snapshot from the backend and drop its record.
    ///
    /// A snapshot that still backs shares goes back to available.
    #[instrument(skip(self, ctx), fields(host = %self.host))]
    pub async fn delete_snapshot(&self, ctx: &RequestContext, snapshot_id: &str) -> Result<()> {
        let elevated = ctx.elevated();
        let snapshot = self.ledger.share_snapshot_get(&elevated, snapshot_id).await?;
        let project_id = ctx.billing_project(&snapshot.project_id);

        match self.driver.delete_snapshot(&elevated, &snapshot).await {
            Ok(()) => {}
            Err(Error::SnapshotIsBusy { .. }) => {
                info!(snapshot_id, "Snapshot is busy, keeping it available");
                self.ledger
                    .share_snapshot_update(
                        &elevated,
                        snapshot_id,
                        SnapshotUpdate::status(SnapshotStatus::Available),
                    )
                    .await?;
                return Ok(());
            }
            Err(e) => {
                return save_and_reraise(Err(e), || async {
                    self.ledger
                        .share_snapshot_update(
                            &elevated,
                            snapshot_id,
                            SnapshotUpdate::status(SnapshotStatus::ErrorDeleting),
                        )
                        .await
                        .map(|_| ())
                })
                .await;
            }
        }

        self.ledger
            .share_snapshot_destroy(&elevated, snapshot_id)
            .await?;

        if let Some(gigabytes) = released_gigabytes("snapshot", snapshot_id, snapshot.size) {
            let deltas = QuotaDeltas::new().snapshots(-1).gigabytes(gigabytes);
            if let Some(reservation) = self.reserve_release(&elevated, &project_id, deltas).await {
                self.commit_release(&elevated, &reservation).await;
            }
        }

        info!(snapshot_id, "Snapshot deleted");
        Ok(())
    }

    // =========================================================================
    // Access rules
    // =========================================================================

    /// Grant a new access rule on the backend
    #[instrument(skip(self, ctx), fields(host = %self.host))]
    pub async fn allow_access(&self, ctx: &RequestContext, access_id: &str) -> Result<()> {
        let rule = self.ledger.share_access_get(ctx, access_id).await?;
        let share = self.ledger.share_get(ctx, &rule.share_id).await?;

        if rule.state != AccessRuleState::New {
            debug!(access_id, state = %rule.state, "Access rule already processed");
            return Ok(());
        }

        let granted = self.driver.allow_access(ctx, &share, &rule).await;
        save_and_reraise(granted, || async {
            self.ledger
                .share_access_update(ctx, access_id, AccessRuleState::Error)
                .await
                .map(|_| ())
        })
        .await?;

        self.ledger
            .share_access_update(ctx, access_id, AccessRuleState::Active)
            .await?;
        info!(access_id, share_id = %share.id, "Access granted");
        Ok(())
    }

    /// Revoke an access rule on the backend and drop its record
    #[instrument(skip(self, ctx), fields(host = %self.host))]
    pub async fn deny_access(&self, ctx: &RequestContext, access_id: &str) -> Result<()> {
        let rule = self.ledger.share_access_get(ctx, access_id).await?;
        let share = self.ledger.share_get(ctx, &rule.share_id).await?;
        self.revoke_access(ctx, &share, &rule).await
    }

    async fn revoke_access(
        &self,
        ctx: &RequestContext,
        share: &Share,
        rule: &AccessRule,
    ) -> Result<()> {
        let revoked = self.driver.deny_access(ctx, share, rule).await;
        save_and_reraise(revoked, || async {
            self.ledger
                .share_access_update(ctx, &rule.id, AccessRuleState::Error)
                .await
                .map(|_| ())
        })
        .await?;

        self.ledger.share_access_delete(ctx, &rule.id).await?;
        debug!(access_id = %rule.id, share_id = %share.id, "Access revoked");
        Ok(())
    }

    // =========================================================================
    // Share networks
    // =========================================================================

    fn network_lock(&self, share_network_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.network_locks
            .entry(share_network_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry once no other round holds or awaits it
    fn release_network_lock(&self, share_network_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        drop(lock);
        self.network_locks
            .remove_if(share_network_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Allocate addresses for a share network and set it up on the backend
    #[instrument(skip(self, ctx, metadata), fields(host = %self.host))]
    pub async fn activate_network(
        &self,
        ctx: &RequestContext,
        share_network_id: &str,
        metadata: Option<NetworkMetadata>,
    ) -> Result<()> {
        let lock = self.network_lock(share_network_id);
        let result = {
            let _guard = lock.lock().await;
            self.activate_network_locked(ctx, share_network_id, metadata)
                .await
        };
        self.release_network_lock(share_network_id, lock);
        result
    }

    async fn activate_network_locked(
        &self,
        ctx: &RequestContext,
        share_network_id: &str,
        metadata: Option<NetworkMetadata>,
    ) -> Result<()> {
        let metadata = metadata.unwrap_or_default();
        let mut share_network = self.ledger.share_network_get(ctx, share_network_id).await?;
        if !matches!(
            share_network.status,
            ShareNetworkStatus::Inactive | ShareNetworkStatus::Error
        ) {
            return Err(Error::InvalidShareNetworkState {
                share_network_id: share_network_id.to_string(),
                operation: "activate".to_string(),
                status: share_network.status.to_string(),
            });
        }

        let allocation_count = self.driver.get_network_allocations_number();
        if allocation_count > 0 {
            share_network = self
                .network_allocator
                .allocate_network(ctx, &share_network, allocation_count)
                .await?;
        }

        let activated: Result<()> = async {
            let share_network = self
                .ledger
                .share_network_update(
                    ctx,
                    share_network_id,
                    ShareNetworkUpdate::status(ShareNetworkStatus::Activating),
                )
                .await?;
            self.driver.setup_network(&share_network, &metadata).await?;
            self.ledger
                .share_network_update(
                    ctx,
                    share_network_id,
                    ShareNetworkUpdate::status(ShareNetworkStatus::Active),
                )
                .await?;
            Ok(())
        }
        .await;

        save_and_reraise(activated, || async {
            self.ledger
                .share_network_update(
                    ctx,
                    share_network_id,
                    ShareNetworkUpdate::status(ShareNetworkStatus::Error),
                )
                .await?;
            self.network_allocator
                .deallocate_network(ctx, &share_network)
                .await
        })
        .await?;

        info!(share_network_id, allocations = allocation_count, "Share network activated");
        Ok(())
    }

    /// Tear a share network down on the backend and release its addresses
    #[instrument(skip(self, ctx), fields(host = %self.host))]
    pub async fn deactivate_network(
        &self,
        ctx: &RequestContext,
        share_network_id: &str,
    ) -> Result<()> {
        let lock = self.network_lock(share_network_id);
        let result = {
            let _guard = lock.lock().await;
            self.deactivate_network_locked(ctx, share_network_id).await
        };
        self.release_network_lock(share_network_id, lock);
        result
    }

    async fn deactivate_network_locked(
        &self,
        ctx: &RequestContext,
        share_network_id: &str,
    ) -> Result<()> {
        let share_network = self.ledger.share_network_get(ctx, share_network_id).await?;
        if !matches!(
            share_network.status,
            ShareNetworkStatus::Active | ShareNetworkStatus::Error
        ) {
            return Err(Error::InvalidShareNetworkState {
                share_network_id: share_network_id.to_string(),
                operation: "deactivate".to_string(),
                status: share_network.status.to_string(),
            });
        }
        let project_id = ctx.billing_project(&share_network.project_id);

        let share_network = self
            .ledger
            .share_network_update(
                ctx,
                share_network_id,
                ShareNetworkUpdate::status(ShareNetworkStatus::Deactivating),
            )
            .await?;

        let torn_down = self.driver.teardown_network(&share_network).await;
        save_and_reraise(torn_down, || async {
            self.ledger
                .share_network_update(
                    ctx,
                    share_network_id,
                    ShareNetworkUpdate::status(ShareNetworkStatus::Error),
                )
                .await
                .map(|_| ())
        })
        .await?;

        self.ledger
            .share_network_update(
                ctx,
                share_network_id,
                ShareNetworkUpdate::status(ShareNetworkStatus::Inactive),
            )
            .await?;
        self.network_allocator
            .deallocate_network(ctx, &share_network)
            .await?;

        let deltas = QuotaDeltas::new().share_networks(-1);
        if let Some(reservation) = self.reserve_release(ctx, &project_id, deltas).await {
            self.commit_release(ctx, &reservation).await;
        }

        info!(share_network_id, "Share network deactivated");
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn set_share_status(
        &self,
        ctx: &RequestContext,
        share_id: &str,
        status: ShareStatus,
    ) -> Result<()> {
        self.ledger
            .share_update(ctx, share_id, ShareUpdate::status(status))
            .await
            .map(|_| ())
    }

    /// Reserve a usage release; failures are logged and never block deletion
    async fn reserve_release(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        deltas: QuotaDeltas,
    ) -> Option<Reservation> {
        match self.quota.reserve(ctx, project_id, deltas).await {
            Ok(reservation) => Some(reservation),
            Err(e) => {
                warn!(project_id, error = %e, "Failed to update usages on release");
                None
            }
        }
    }

    async fn commit_release(&self, ctx: &RequestContext, reservation: &Reservation) {
        if let Err(e) = self.quota.commit(ctx, reservation).await {
            warn!(
                project_id = %reservation.project_id,
                reservation_id = %reservation.id,
                error = %e,
                "Failed to commit usage release"
            );
        }
    }
}

/// Negative gigabyte delta releasing `size`, or `None` when it does not fit a delta
fn released_gigabytes(kind: &str, id: &str, size: u64) -> Option<i64> {
    match i64::try_from(size) {
        Ok(size) => Some(-size),
        Err(_) => {
            warn!(kind, id, size, "Size out of quota range, usage not released");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryLedger, DEFAULT_SHARE_TOPIC};
    use crate::drivers::{MemoryDriver, MemoryDriverConfig};
    use crate::network::{CidrAllocator, NetworkConfig};
    use crate::quota::{QuotaConfig, QuotaEngine};
    use crate::scheduler::HostStateRegistry;
    use assert_matches::assert_matches;

    struct Fixture {
        ledger: Arc<MemoryLedger>,
        quota: Arc<QuotaEngine>,
        driver: Arc<MemoryDriver>,
        host_states: Arc<HostStateRegistry>,
        manager: Arc<ShareManager>,
    }

    fn fixture(network_allocations: u32) -> Fixture {
        let ledger = MemoryLedger::new(DEFAULT_SHARE_TOPIC);
        let quota = QuotaEngine::new(QuotaConfig::default());
        let allocator = CidrAllocator::new(NetworkConfig::default(), ledger.clone()).unwrap();
        let driver = Arc::new(MemoryDriver::new(MemoryDriverConfig {
            network_allocations,
            ..Default::default()
        }));
        let metrics = ControlPlaneMetrics::new().unwrap();
        let host_states = HostStateRegistry::with_metrics(metrics.clone());
        let manager = ShareManager::new(
            "host-a",
            ManagerDeps {
                ledger: ledger.clone(),
                quota: quota.clone(),
                network_allocator: allocator,
                driver: driver.clone(),
                publisher: host_states.clone(),
                metrics,
            },
        );
        Fixture {
            ledger,
            quota,
            driver,
            host_states,
            manager,
        }
    }

    async fn placed_share(f: &Fixture, ctx: &RequestContext) -> Share {
        let share = f
            .ledger
            .share_create(ctx, NewShare::new("p1", "u1", 5, ShareProtocol::Nfs))
            .await
            .unwrap();
        f.ledger
            .share_update(ctx, &share.id, ShareUpdate::scheduled_to("host-a"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_save_and_reraise_returns_original_error() {
        let result: Result<()> = save_and_reraise(
            Err(Error::driver("memory", "create_share", "boom")),
            || async { Err(Error::Internal("ledger down".into())) },
        )
        .await;
        assert_matches!(result, Err(Error::Driver { operation, .. }) if operation == "create_share");

        let ok: Result<u32> = save_and_reraise(Ok(7), || async {
            Err(Error::Internal("cleanup ran".into()))
        })
        .await;
        assert_eq!(ok.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_create_share_sets_export_location() {
        let f = fixture(0);
        let ctx = RequestContext::new("u1", "p1");
        let share = placed_share(&f, &ctx).await;

        f.manager
            .create_share(&ctx, &share.id, None, None, None)
            .await
            .unwrap();

        let share = f.ledger.share_get(&ctx, &share.id).await.unwrap();
        assert_eq!(share.status, ShareStatus::Available);
        assert_eq!(
            share.export_location.as_deref(),
            Some(format!("127.0.0.1:/shares/{}", share.name).as_str())
        );
        assert!(share.launched_at.is_some());
        assert!(f.driver.has_share(&share.id).await);
    }

    #[tokio::test]
    async fn test_create_share_from_unavailable_snapshot() {
        let f = fixture(0);
        let ctx = RequestContext::new("u1", "p1");
        let share = placed_share(&f, &ctx).await;
        let snapshot = f
            .ledger
            .share_snapshot_create(&ctx, NewSnapshot::of(&share))
            .await
            .unwrap();

        let result = f
            .manager
            .create_share(&ctx, &share.id, None, None, Some(&snapshot.id))
            .await;
        assert_matches!(result, Err(Error::InvalidSnapshot { .. }));

        let share = f.ledger.share_get(&ctx, &share.id).await.unwrap();
        assert_eq!(share.status, ShareStatus::Error);
    }

    #[tokio::test]
    async fn test_snapshot_lifecycle_and_busy_snapshot() {
        let f = fixture(0);
        let ctx = RequestContext::new("u1", "p1");
        let share = placed_share(&f, &ctx).await;
        f.manager
            .create_share(&ctx, &share.id, None, None, None)
            .await
            .unwrap();

        let snapshot = f
            .ledger
            .share_snapshot_create(&ctx, NewSnapshot::of(&share))
            .await
            .unwrap();
        f.manager
            .create_snapshot(&ctx, &share.id, &snapshot.id)
            .await
            .unwrap();
        let snapshot = f.ledger.share_snapshot_get(&ctx, &snapshot.id).await.unwrap();
        assert_eq!(snapshot.status, SnapshotStatus::Available);
        assert_eq!(snapshot.progress, "100%");
        assert!(snapshot.provider_location.is_some());

        // A clone keeps the snapshot busy
        let mut clone = NewShare::new("p1", "u1", 5, ShareProtocol::Nfs);
        clone.snapshot_id = Some(snapshot.id.clone());
        let clone = f.ledger.share_create(&ctx, clone).await.unwrap();
        f.manager
            .create_share(&ctx, &clone.id, None, None, Some(&snapshot.id))
            .await
            .unwrap();

        f.manager.delete_snapshot(&ctx, &snapshot.id).await.unwrap();
        let snapshot = f.ledger.share_snapshot_get(&ctx, &snapshot.id).await.unwrap();
        assert_eq!(snapshot.status, SnapshotStatus::Available);

        f.manager.delete_share(&ctx, &clone.id).await.unwrap();
        f.manager.delete_snapshot(&ctx, &snapshot.id).await.unwrap();
        assert_matches!(
            f.ledger.share_snapshot_get(&ctx, &snapshot.id).await,
            Err(Error::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn test_allow_access_only_from_new() {
        let f = fixture(0);
        let ctx = RequestContext::new("u1", "p1");
        let share = placed_share(&f, &ctx).await;
        f.manager
            .create_share(&ctx, &share.id, None, None, None)
            .await
            .unwrap();
        let rule = f
            .ledger
            .share_access_create(&ctx, NewAccessRule::ip(&share.id, "10.0.0.7"))
            .await
            .unwrap();

        f.manager.allow_access(&ctx, &rule.id).await.unwrap();
        // Second grant is a no-op instead of a duplicate driver call
        f.manager.allow_access(&ctx, &rule.id).await.unwrap();

        let rule = f.ledger.share_access_get(&ctx, &rule.id).await.unwrap();
        assert_eq!(rule.state, AccessRuleState::Active);
        assert_eq!(f.driver.access_entries(&share.id).await, vec!["ip:10.0.0.7"]);

        f.manager.deny_access(&ctx, &rule.id).await.unwrap();
        assert_matches!(
            f.ledger.share_access_get(&ctx, &rule.id).await,
            Err(Error::NotFound { .. })
        );
        assert!(f.driver.access_entries(&share.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_share_releases_quota() {
        let f = fixture(0);
        let ctx = RequestContext::new("u1", "p1");
        f.quota.set_in_use("p1", QuotaResource::Shares, 1);
        f.quota.set_in_use("p1", QuotaResource::Gigabytes, 5);
        let share = placed_share(&f, &ctx).await;
        f.manager
            .create_share(&ctx, &share.id, None, None, None)
            .await
            .unwrap();

        f.manager.delete_share(&ctx, &share.id).await.unwrap();

        assert_eq!(f.ledger.share_count(), 0);
        let usage = f.quota.usage("p1");
        assert_eq!(usage[&QuotaResource::Shares].in_use, 0);
        assert_eq!(usage[&QuotaResource::Gigabytes].in_use, 0);
        assert_eq!(f.quota.reservation_count(), 0);
    }

    #[tokio::test]
    async fn test_network_state_guards() {
        let f = fixture(1);
        let ctx = RequestContext::new("u1", "p1");
        let network = f
            .ledger
            .share_network_create(
                &ctx,
                NewShareNetwork {
                    project_id: "p1".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_matches!(
            f.manager.deactivate_network(&ctx, &network.id).await,
            Err(Error::InvalidShareNetworkState { operation, .. }) if operation == "deactivate"
        );

        f.manager
            .activate_network(&ctx, &network.id, None)
            .await
            .unwrap();
        let active = f.ledger.share_network_get(&ctx, &network.id).await.unwrap();
        assert_eq!(active.status, ShareNetworkStatus::Active);
        assert_eq!(active.network_allocations.len(), 1);
        assert!(f.driver.has_network(&network.id).await);

        assert_matches!(
            f.manager.activate_network(&ctx, &network.id, None).await,
            Err(Error::InvalidShareNetworkState { operation, .. }) if operation == "activate"
        );

        f.manager.deactivate_network(&ctx, &network.id).await.unwrap();
        assert!(f.manager.network_locks.is_empty());
    }

    #[tokio::test]
    async fn test_network_lock_kept_while_contended() {
        let f = fixture(0);
        let lock = f.manager.network_lock("sn-1");
        let waiter = f.manager.network_lock("sn-1");

        f.manager.release_network_lock("sn-1", lock);
        assert_eq!(f.manager.network_locks.len(), 1);

        f.manager.release_network_lock("sn-1", waiter);
        assert!(f.manager.network_locks.is_empty());
    }

    #[test]
    fn test_released_gigabytes_range() {
        assert_eq!(released_gigabytes("share", "s1", 5), Some(-5));
        assert_eq!(released_gigabytes("share", "s1", 0), Some(0));
        assert_eq!(
            released_gigabytes("share", "s1", i64::MAX as u64),
            Some(-i64::MAX)
        );
        assert_eq!(released_gigabytes("share", "s1", u64::MAX), None);
    }

    #[tokio::test]
    async fn test_delete_oversized_share_skips_quota_release() {
        let f = fixture(0);
        let ctx = RequestContext::new("u1", "p1");
        f.quota.set_in_use("p1", QuotaResource::Shares, 1);
        let share = f
            .ledger
            .share_create(&ctx, NewShare::new("p1", "u1", u64::MAX, ShareProtocol::Nfs))
            .await
            .unwrap();
        f.ledger
            .share_update(&ctx, &share.id, ShareUpdate::scheduled_to("host-a"))
            .await
            .unwrap();

        f.manager.delete_share(&ctx, &share.id).await.unwrap();

        assert_eq!(f.ledger.share_count(), 0);
        assert_eq!(f.quota.usage("p1")[&QuotaResource::Shares].in_use, 1);
        assert_eq!(f.quota.reservation_count(), 0);
    }

    #[tokio::test]
    async fn test_init_host_publishes_capabilities() {
        let f = fixture(0);
        f.manager.init_host().await.unwrap();

        let state = f.host_states.get("host-a").unwrap();
        assert_eq!(state.stats.share_backend_name, "memory");
        assert!(state.stats.supports(ShareProtocol::Nfs));
    }

    #[tokio::test]
    async fn test_handle_records_operation_outcome() {
        let f = fixture(0);
        let ctx = RequestContext::new("u1", "p1");
        let envelope = Envelope::new(
            ctx,
            ShareMessage::DeleteShare {
                share_id: "missing".into(),
            },
        );

        assert_matches!(f.manager.handle(envelope).await, Err(Error::NotFound { .. }));
        assert_eq!(f.manager.metrics.operation_count("delete_share", "failure"), 1);
    }
}
