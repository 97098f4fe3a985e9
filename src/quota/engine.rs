//! Quota Engine
//!
//! Per-project limits, in-use counters and outstanding reservations. Positive
//! deltas are checked against `in_use + reserved + delta <= limit`; negative
//! deltas always reserve and only take effect on commit. Reservations that are
//! never committed or rolled back expire and are reaped by
//! [`QuotaEngine::expire_reservations`].

use crate::domain::{QuotaDeltas, QuotaLedger, QuotaResource, RequestContext, Reservation};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Every resource the engine tracks
pub const RESOURCES: [QuotaResource; 4] = [
    QuotaResource::Shares,
    QuotaResource::Snapshots,
    QuotaResource::Gigabytes,
    QuotaResource::ShareNetworks,
];

// =============================================================================
// Configuration
// =============================================================================

/// Default limits and reservation lifetime. A negative limit is unlimited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub shares: i64,
    pub snapshots: i64,
    pub gigabytes: i64,
    pub share_networks: i64,
    /// Seconds until an uncommitted reservation expires
    pub reservation_expire_secs: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            shares: 50,
            snapshots: 50,
            gigabytes: 1000,
            share_networks: 10,
            reservation_expire_secs: 86400,
        }
    }
}

impl QuotaConfig {
    /// Default limit for a resource
    pub fn default_limit(&self, resource: QuotaResource) -> i64 {
        match resource {
            QuotaResource::Shares => self.shares,
            QuotaResource::Snapshots => self.snapshots,
            QuotaResource::Gigabytes => self.gigabytes,
            QuotaResource::ShareNetworks => self.share_networks,
        }
    }
}

// =============================================================================
// Usage
// =============================================================================

/// Usage of one resource by one project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub in_use: i64,
    pub reserved: i64,
    pub limit: i64,
}

#[derive(Debug, Default)]
struct ProjectUsage {
    in_use: BTreeMap<QuotaResource, i64>,
    reserved: BTreeMap<QuotaResource, i64>,
    limits: BTreeMap<QuotaResource, i64>,
}

impl ProjectUsage {
    fn in_use(&self, resource: QuotaResource) -> i64 {
        self.in_use.get(&resource).copied().unwrap_or(0)
    }

    fn reserved(&self, resource: QuotaResource) -> i64 {
        self.reserved.get(&resource).copied().unwrap_or(0)
    }

    fn release(&mut self, deltas: &QuotaDeltas) {
        for (resource, delta) in deltas.iter().filter(|(_, d)| *d > 0) {
            let reserved = self.reserved.entry(resource).or_insert(0);
            *reserved = (*reserved - delta).max(0);
        }
    }
}

// =============================================================================
// Quota Engine
// =============================================================================

/// In-process quota ledger
pub struct QuotaEngine {
    config: QuotaConfig,
    projects: DashMap<String, ProjectUsage>,
    reservations: DashMap<String, Reservation>,
}

impl QuotaEngine {
    pub fn new(config: QuotaConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            projects: DashMap::new(),
            reservations: DashMap::new(),
        })
    }

    /// Override a project's limit for one resource
    pub fn set_limit(&self, project_id: &str, resource: QuotaResource, limit: i64) {
        self.projects
            .entry(project_id.to_string())
            .or_default()
            .limits
            .insert(resource, limit);
    }

    /// Seed in-use counters, e.g. when rebuilding from the status ledger
    pub fn set_in_use(&self, project_id: &str, resource: QuotaResource, in_use: i64) {
        self.projects
            .entry(project_id.to_string())
            .or_default()
            .in_use
            .insert(resource, in_use.max(0));
    }

    /// Usage of every resource for a project
    pub fn usage(&self, project_id: &str) -> BTreeMap<QuotaResource, ResourceUsage> {
        let project = self.projects.get(project_id);
        RESOURCES
            .iter()
            .map(|&resource| {
                let (in_use, reserved, limit) = match &project {
                    Some(p) => (
                        p.in_use(resource),
                        p.reserved(resource),
                        self.limit_for(p, resource),
                    ),
                    None => (0, 0, self.config.default_limit(resource)),
                };
                (
                    resource,
                    ResourceUsage {
                        in_use,
                        reserved,
                        limit,
                    },
                )
            })
            .collect()
    }

    /// Number of outstanding reservations
    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    /// Drop reservations that expired at or before `now`; returns how many
    pub fn expire_reservations(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .reservations
            .iter()
            .filter(|r| r.expires_at <= now)
            .map(|r| r.key().clone())
            .collect();

        let mut count = 0;
        for id in expired {
            if let Some((_, reservation)) = self.reservations.remove(&id) {
                if let Some(mut project) = self.projects.get_mut(&reservation.project_id) {
                    project.release(&reservation.deltas);
                }
                count += 1;
            }
        }

        if count > 0 {
            info!(count, "Expired quota reservations");
        }
        count
    }

    fn limit_for(&self, project: &ProjectUsage, resource: QuotaResource) -> i64 {
        project
            .limits
            .get(&resource)
            .copied()
            .unwrap_or_else(|| self.config.default_limit(resource))
    }

    fn take_reservation(&self, reservation: &Reservation) -> Result<Reservation> {
        self.reservations
            .remove(&reservation.id)
            .map(|(_, r)| r)
            .ok_or_else(|| Error::ReservationNotFound {
                reservation_id: reservation.id.clone(),
            })
    }
}

#[async_trait]
impl QuotaLedger for QuotaEngine {
    async fn reserve(
        &self,
        _ctx: &RequestContext,
        project_id: &str,
        deltas: QuotaDeltas,
    ) -> Result<Reservation> {
        {
            let mut project = self.projects.entry(project_id.to_string()).or_default();

            for (resource, delta) in deltas.iter().filter(|(_, d)| *d > 0) {
                let limit = self.limit_for(&project, resource);
                if limit < 0 {
                    continue;
                }
                let in_use = project.in_use(resource);
                let reserved = project.reserved(resource);
                if in_use + reserved + delta > limit {
                    warn!(project_id, %resource, delta, in_use, reserved, limit, "Quota exceeded");
                    return Err(Error::QuotaExceeded {
                        project_id: project_id.to_string(),
                        resource: resource.to_string(),
                        requested: delta,
                        in_use,
                        reserved,
                        limit,
                    });
                }
            }

            for (resource, delta) in deltas.iter().filter(|(_, d)| *d > 0) {
                *project.reserved.entry(resource).or_insert(0) += delta;
            }
        }

        let expire = ChronoDuration::seconds(self.config.reservation_expire_secs as i64);
        let reservation = Reservation {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            deltas,
            expires_at: Utc::now() + expire,
        };
        self.reservations
            .insert(reservation.id.clone(), reservation.clone());

        debug!(project_id, reservation_id = %reservation.id, "Reserved quota");
        Ok(reservation)
    }

    async fn commit(&self, _ctx: &RequestContext, reservation: &Reservation) -> Result<()> {
        let reservation = self.take_reservation(reservation)?;
        let mut project = self
            .projects
            .entry(reservation.project_id.clone())
            .or_default();

        project.release(&reservation.deltas);
        for (resource, delta) in reservation.deltas.iter() {
            let in_use = project.in_use.entry(resource).or_insert(0);
            *in_use = (*in_use + delta).max(0);
        }

        debug!(project_id = %reservation.project_id, reservation_id = %reservation.id, "Committed quota");
        Ok(())
    }

    async fn rollback(&self, _ctx: &RequestContext, reservation: &Reservation) -> Result<()> {
        let reservation = self.take_reservation(reservation)?;
        if let Some(mut project) = self.projects.get_mut(&reservation.project_id) {
            project.release(&reservation.deltas);
        }
        debug!(project_id = %reservation.project_id, reservation_id = %reservation.id, "Rolled back quota");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn ctx() -> RequestContext {
        RequestContext::admin()
    }

    fn engine() -> Arc<QuotaEngine> {
        QuotaEngine::new(QuotaConfig {
            shares: 2,
            gigabytes: 10,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_positive_delta_over_limit() {
        let quota = engine();
        let first = quota
            .reserve(&ctx(), "p1", QuotaDeltas::new().shares(1).gigabytes(8))
            .await
            .unwrap();
        quota.commit(&ctx(), &first).await.unwrap();

        let result = quota
            .reserve(&ctx(), "p1", QuotaDeltas::new().shares(1).gigabytes(3))
            .await;
        assert_matches!(
            result,
            Err(Error::QuotaExceeded { resource, in_use: 8, limit: 10, .. }) if resource == "gigabytes"
        );
        // Failed reservation leaves nothing behind
        assert_eq!(quota.usage("p1")[&QuotaResource::Shares].reserved, 0);
    }

    #[tokio::test]
    async fn test_reserved_counts_against_limit() {
        let quota = engine();
        quota
            .reserve(&ctx(), "p1", QuotaDeltas::new().gigabytes(6))
            .await
            .unwrap();
        let result = quota
            .reserve(&ctx(), "p1", QuotaDeltas::new().gigabytes(6))
            .await;
        assert_matches!(result, Err(Error::QuotaExceeded { reserved: 6, .. }));
    }

    #[tokio::test]
    async fn test_negative_delta_always_reserves_and_clamps() {
        let quota = engine();
        quota.set_in_use("p1", QuotaResource::Shares, 1);

        let reservation = quota
            .reserve(&ctx(), "p1", QuotaDeltas::new().shares(-3).gigabytes(-5))
            .await
            .unwrap();
        quota.commit(&ctx(), &reservation).await.unwrap();

        let usage = quota.usage("p1");
        assert_eq!(usage[&QuotaResource::Shares].in_use, 0);
        assert_eq!(usage[&QuotaResource::Gigabytes].in_use, 0);
    }

    #[tokio::test]
    async fn test_rollback_releases_reserved() {
        let quota = engine();
        let reservation = quota
            .reserve(&ctx(), "p1", QuotaDeltas::new().shares(2))
            .await
            .unwrap();
        assert_eq!(quota.usage("p1")[&QuotaResource::Shares].reserved, 2);

        quota.rollback(&ctx(), &reservation).await.unwrap();
        let usage = quota.usage("p1")[&QuotaResource::Shares];
        assert_eq!(usage.reserved, 0);
        assert_eq!(usage.in_use, 0);

        assert_matches!(
            quota.commit(&ctx(), &reservation).await,
            Err(Error::ReservationNotFound { .. })
        );
    }

    #[tokio::test]
    async fn test_expired_reservations_reaped() {
        let quota = engine();
        quota
            .reserve(&ctx(), "p1", QuotaDeltas::new().shares(1))
            .await
            .unwrap();
        assert_eq!(quota.expire_reservations(Utc::now()), 0);

        let later = Utc::now() + ChronoDuration::seconds(86401);
        assert_eq!(quota.expire_reservations(later), 1);
        assert_eq!(quota.reservation_count(), 0);
        assert_eq!(quota.usage("p1")[&QuotaResource::Shares].reserved, 0);
    }

    #[tokio::test]
    async fn test_unlimited_and_overrides() {
        let quota = engine();
        quota.set_limit("p1", QuotaResource::Gigabytes, -1);
        quota
            .reserve(&ctx(), "p1", QuotaDeltas::new().gigabytes(100_000))
            .await
            .unwrap();

        quota.set_limit("p2", QuotaResource::Shares, 0);
        assert_matches!(
            quota.reserve(&ctx(), "p2", QuotaDeltas::new().shares(1)).await,
            Err(Error::QuotaExceeded { limit: 0, .. })
        );
    }

    #[test]
    fn test_usage_reports_default_limits() {
        let quota = engine();
        tokio_test::block_on(quota.reserve(&ctx(), "p3", QuotaDeltas::new().snapshots(2)))
            .unwrap();

        let usage = quota.usage("p3");
        assert_eq!(usage[&QuotaResource::Shares].limit, 2);
        assert_eq!(usage[&QuotaResource::Snapshots].reserved, 2);
        assert_eq!(usage[&QuotaResource::Snapshots].limit, 50);
    }
}
