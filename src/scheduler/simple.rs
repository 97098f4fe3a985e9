//! Simple Scheduler
//!
//! Greedy least-loaded placement. Share services are visited in ascending
//! order of allocated gigabytes (ties by host name). Hosts that are down,
//! disabled, or whose last capability report lacks the requested protocol are
//! skipped. The first remaining host either has headroom and gets the share,
//! or does not and fails the request with `InsufficientCapacity`.
//!
//! A host that has not published a capability report yet is treated as
//! supporting every protocol.
//!
//! An elevated caller may pin a host with `availability_zone = "zone:host"`;
//! ranking is then bypassed and only liveness is checked.

use crate::domain::*;
use crate::error::{Error, Result};
use crate::metrics::ControlPlaneMetrics;
use crate::rpc::{Envelope, ShareMessage};
use crate::scheduler::HostStateRegistry;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum share gigabytes allowed per host
    pub max_gigabytes: u64,
    /// Seconds without a heartbeat after which a service is down
    pub service_down_time_secs: u64,
    /// Topic share services register under
    pub share_topic: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_gigabytes: 10000,
            service_down_time_secs: 60,
            share_topic: crate::db::DEFAULT_SHARE_TOPIC.to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn service_down_time(&self) -> Duration {
        Duration::from_secs(self.service_down_time_secs)
    }
}

/// Split `"zone:host"` on the first colon. Empty halves are absent.
pub fn parse_availability_zone(availability_zone: Option<&str>) -> (Option<&str>, Option<&str>) {
    fn non_empty(s: &str) -> Option<&str> {
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    }

    match availability_zone {
        None | Some("") => (None, None),
        Some(az) => match az.split_once(':') {
            Some((zone, host)) => (non_empty(zone), non_empty(host)),
            None => (Some(az), None),
        },
    }
}

// =============================================================================
// Simple Scheduler
// =============================================================================

/// Least-loaded share scheduler
pub struct SimpleScheduler {
    config: SchedulerConfig,
    ledger: StatusLedgerRef,
    rpc: ShareRpcRef,
    host_states: Arc<HostStateRegistry>,
    metrics: Arc<ControlPlaneMetrics>,
}

impl SimpleScheduler {
    pub fn new(
        config: SchedulerConfig,
        ledger: StatusLedgerRef,
        rpc: ShareRpcRef,
        host_states: Arc<HostStateRegistry>,
        metrics: Arc<ControlPlaneMetrics>,
    ) -> Self {
        Self {
            config,
            ledger,
            rpc,
            host_states,
            metrics,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Pick a host for the share, record it and dispatch creation there.
    ///
    /// Returns the chosen host. On failure nothing is written or dispatched.
    #[instrument(
        skip(self, ctx, request_spec, filter_properties),
        fields(share_id = %request_spec.share_id, size = request_spec.share_properties.size)
    )]
    pub async fn schedule_create_share(
        &self,
        ctx: &RequestContext,
        request_spec: RequestSpec,
        filter_properties: FilterProperties,
    ) -> Result<String> {
        let result = self
            .pick_and_dispatch(ctx, request_spec, filter_properties)
            .await;

        let outcome = match &result {
            Ok(_) => "scheduled",
            Err(Error::HostUnavailable { .. }) => "host_unavailable",
            Err(Error::InsufficientCapacity { .. }) => "insufficient_capacity",
            Err(Error::NoEligibleHost { .. }) => "no_eligible_host",
            Err(_) => "error",
        };
        self.metrics.record_scheduling(outcome);
        result
    }

    async fn pick_and_dispatch(
        &self,
        ctx: &RequestContext,
        request_spec: RequestSpec,
        filter_properties: FilterProperties,
    ) -> Result<String> {
        let elevated = ctx.elevated();
        let properties = &request_spec.share_properties;
        let (zone, host) = parse_availability_zone(properties.availability_zone.as_deref());

        if let Some(host) = host.filter(|_| ctx.is_admin) {
            let service = match self
                .ledger
                .service_get_by_args(&elevated, host, &self.config.share_topic)
                .await
            {
                Ok(service) => service,
                Err(Error::NotFound { .. }) => {
                    return Err(Error::HostUnavailable {
                        host: host.to_string(),
                    })
                }
                Err(e) => return Err(e),
            };
            if !service.is_up(self.config.service_down_time(), Utc::now()) {
                warn!(host, "Requested host is down");
                return Err(Error::HostUnavailable {
                    host: host.to_string(),
                });
            }

            info!(host, "Scheduling to requested host");
            let host = host.to_string();
            self.assign_and_dispatch(ctx, &request_spec, filter_properties, &host)
                .await?;
            return Ok(host);
        }

        let candidates = self.ledger.service_get_all_share_sorted(&elevated).await?;
        let now = Utc::now();
        for (service, allocated_gb) in candidates {
            if let Some(zone) = zone {
                if service.availability_zone != zone {
                    continue;
                }
            }
            if !self.is_eligible(&service, properties.share_proto, now) {
                continue;
            }

            let fits = allocated_gb
                .checked_add(properties.size)
                .is_some_and(|total| total <= self.config.max_gigabytes);
            if !fits {
                warn!(
                    host = %service.host,
                    allocated_gb,
                    requested_gb = properties.size,
                    max_gb = self.config.max_gigabytes,
                    "Not enough allocatable share gigabytes remaining"
                );
                return Err(Error::InsufficientCapacity {
                    host: service.host,
                    requested_gb: properties.size,
                    allocated_gb,
                    max_gb: self.config.max_gigabytes,
                });
            }

            info!(host = %service.host, allocated_gb, "Scheduling to least loaded host");
            self.assign_and_dispatch(ctx, &request_spec, filter_properties, &service.host)
                .await?;
            return Ok(service.host);
        }

        Err(Error::NoEligibleHost {
            reason: "Is the appropriate service running?".to_string(),
        })
    }

    fn is_eligible(
        &self,
        service: &ServiceRecord,
        proto: Option<ShareProtocol>,
        now: chrono::DateTime<Utc>,
    ) -> bool {
        if service.disabled {
            debug!(host = %service.host, "Skipping disabled service");
            return false;
        }
        if !service.is_up(self.config.service_down_time(), now) {
            debug!(host = %service.host, "Skipping down service");
            return false;
        }
        if let Some(proto) = proto {
            if !self.host_states.host_supports(&service.host, proto) {
                debug!(host = %service.host, %proto, "Skipping host without protocol support");
                return false;
            }
        }
        true
    }

    async fn assign_and_dispatch(
        &self,
        ctx: &RequestContext,
        request_spec: &RequestSpec,
        filter_properties: FilterProperties,
        host: &str,
    ) -> Result<()> {
        self.ledger
            .share_update(ctx, &request_spec.share_id, ShareUpdate::scheduled_to(host))
            .await?;

        let message = ShareMessage::CreateShare {
            share_id: request_spec.share_id.clone(),
            request_spec: Some(request_spec.clone()),
            filter_properties: Some(filter_properties),
            snapshot_id: request_spec.snapshot_id.clone(),
        };
        if let Err(e) = self.rpc.cast(host, Envelope::new(ctx.clone(), message)).await {
            warn!(host, error = %e, "Dispatch failed, releasing host assignment");
            if let Err(rollback) = self
                .ledger
                .share_update(ctx, &request_spec.share_id, ShareUpdate::unscheduled())
                .await
            {
                warn!(host, error = %rollback, "Failed to release host assignment");
            }
            return Err(e);
        }
        Ok(())
    }
}
