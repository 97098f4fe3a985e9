//! Periodic Tasks
//!
//! Service heartbeat, capability reports to the scheduler, reaping of expired
//! quota reservations and of stale host reports.

use crate::domain::{RequestContext, StatusLedgerRef};
use crate::manager::ShareManager;
use crate::quota::QuotaEngine;
use crate::scheduler::HostStateRegistry;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Intervals of the periodic tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodicConfig {
    /// Seconds between service heartbeats
    pub heartbeat_interval_secs: u64,
    /// Seconds between capability reports
    pub report_interval_secs: u64,
    /// Seconds between sweeps for expired quota reservations
    pub quota_sweep_interval_secs: u64,
    /// Host reports older than this are dropped from the scheduler view
    pub host_report_max_age_secs: i64,
}

impl Default for PeriodicConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 10,
            report_interval_secs: 60,
            quota_sweep_interval_secs: 300,
            host_report_max_age_secs: 600,
        }
    }
}

/// Periodic tasks of one share host
pub struct PeriodicTasks {
    config: PeriodicConfig,
    manager: Arc<ShareManager>,
    ledger: StatusLedgerRef,
    service_id: String,
    quota: Option<Arc<QuotaEngine>>,
    host_states: Option<Arc<HostStateRegistry>>,
}

impl PeriodicTasks {
    pub fn new(
        config: PeriodicConfig,
        manager: Arc<ShareManager>,
        ledger: StatusLedgerRef,
        service_id: impl Into<String>,
    ) -> Self {
        Self {
            config,
            manager,
            ledger,
            service_id: service_id.into(),
            quota: None,
            host_states: None,
        }
    }

    /// Also reap expired reservations of this quota engine
    pub fn with_quota(mut self, quota: Arc<QuotaEngine>) -> Self {
        self.quota = Some(quota);
        self
    }

    /// Also drop stale host reports from this registry
    pub fn with_host_states(mut self, host_states: Arc<HostStateRegistry>) -> Self {
        self.host_states = Some(host_states);
        self
    }

    /// Run until shutdown
    pub async fn run(self, shutdown: CancellationToken) {
        let mut heartbeat = interval(Duration::from_secs(self.config.heartbeat_interval_secs.max(1)));
        let mut report = interval(Duration::from_secs(self.config.report_interval_secs.max(1)));
        let mut sweep = interval(Duration::from_secs(self.config.quota_sweep_interval_secs.max(1)));
        for timer in [&mut heartbeat, &mut report, &mut sweep] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        info!(host = %self.manager.host(), "Periodic tasks started");
        let ctx = RequestContext::admin();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Periodic tasks stopping");
                    break;
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = self.ledger.service_heartbeat(&ctx, &self.service_id).await {
                        warn!(service_id = %self.service_id, error = %e, "Heartbeat failed");
                    }
                }
                _ = report.tick() => {
                    if let Err(e) = self.manager.report_capabilities().await {
                        warn!(error = %e, "Capability report failed");
                    }
                }
                _ = sweep.tick() => self.sweep(),
            }
        }
    }

    fn sweep(&self) {
        if let Some(quota) = &self.quota {
            let expired = quota.expire_reservations(Utc::now());
            debug!(expired, "Quota sweep finished");
        }
        if let Some(host_states) = &self.host_states {
            host_states.remove_stale(self.config.host_report_max_age_secs);
        }
    }
}
