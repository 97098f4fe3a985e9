//! In-memory Status Ledger
//!
//! Concurrent maps keyed by record id. Access rules and network allocations
//! carry an insertion sequence so listings come back in creation order.

use crate::domain::*;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Record plus its insertion sequence
#[derive(Debug, Clone)]
struct Sequenced<T> {
    seq: u64,
    record: T,
}

/// Status ledger held in process memory
pub struct MemoryLedger {
    share_topic: String,
    seq: AtomicU64,
    shares: DashMap<String, Share>,
    snapshots: DashMap<String, Snapshot>,
    access_rules: DashMap<String, Sequenced<AccessRule>>,
    share_networks: DashMap<String, ShareNetwork>,
    security_services: DashMap<String, SecurityService>,
    /// share network id -> associated security service ids, in association order
    network_security: DashMap<String, Vec<String>>,
    allocations: DashMap<String, Sequenced<NetworkAllocation>>,
    services: DashMap<String, ServiceRecord>,
}

impl MemoryLedger {
    /// Create a ledger whose share services register under `share_topic`
    pub fn new(share_topic: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            share_topic: share_topic.into(),
            seq: AtomicU64::new(0),
            shares: DashMap::new(),
            snapshots: DashMap::new(),
            access_rules: DashMap::new(),
            share_networks: DashMap::new(),
            security_services: DashMap::new(),
            network_security: DashMap::new(),
            allocations: DashMap::new(),
            services: DashMap::new(),
        })
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Overwrite the last heartbeat of a service.
    ///
    /// Used by operators replaying state and by tests simulating down hosts.
    pub fn set_service_updated_at(&self, service_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut entry = self
            .services
            .get_mut(service_id)
            .ok_or_else(|| Error::not_found("service", service_id))?;
        entry.updated_at = Some(at);
        Ok(())
    }

    /// Gigabytes allocated to shares on `host`
    pub fn allocated_gigabytes(&self, host: &str) -> u64 {
        self.shares
            .iter()
            .filter(|s| s.host.as_deref() == Some(host))
            .fold(0u64, |total, s| total.saturating_add(s.size))
    }

    /// Number of share records
    pub fn share_count(&self) -> usize {
        self.shares.len()
    }

    fn check_project(ctx: &RequestContext, kind: &str, id: &str, project_id: &str) -> Result<()> {
        if ctx.can_access(project_id) {
            Ok(())
        } else {
            Err(Error::not_found(kind, id))
        }
    }

    fn joined_network(&self, mut network: ShareNetwork) -> ShareNetwork {
        let mut allocations: Vec<Sequenced<NetworkAllocation>> = self
            .allocations
            .iter()
            .filter(|a| a.record.share_network_id == network.id)
            .map(|a| a.value().clone())
            .collect();
        allocations.sort_by_key(|a| a.seq);
        network.network_allocations = allocations.into_iter().map(|a| a.record).collect();

        let service_ids = self
            .network_security
            .get(&network.id)
            .map(|ids| ids.value().clone())
            .unwrap_or_default();
        network.security_services = service_ids
            .iter()
            .filter_map(|id| self.security_services.get(id).map(|s| s.value().clone()))
            .collect();
        network
    }

    fn share_project(&self, share_id: &str) -> Option<String> {
        self.shares.get(share_id).map(|s| s.project_id.clone())
    }
}

#[async_trait]
impl StatusLedger for MemoryLedger {
    // =========================================================================
    // Shares
    // =========================================================================

    async fn share_create(&self, _ctx: &RequestContext, new: NewShare) -> Result<Share> {
        let id = Self::new_id();
        let share = Share {
            name: format!("share-{}", id),
            id: id.clone(),
            project_id: new.project_id,
            user_id: new.user_id,
            size: new.size,
            share_proto: new.share_proto,
            status: ShareStatus::Creating,
            export_location: None,
            share_network_id: new.share_network_id,
            snapshot_id: new.snapshot_id,
            host: None,
            availability_zone: new.availability_zone,
            created_at: Utc::now(),
            scheduled_at: None,
            launched_at: None,
        };
        self.shares.insert(id, share.clone());
        debug!(share_id = %share.id, size = share.size, "Created share record");
        Ok(share)
    }

    async fn share_get(&self, ctx: &RequestContext, share_id: &str) -> Result<Share> {
        let share = self
            .shares
            .get(share_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| Error::not_found("share", share_id))?;
        Self::check_project(ctx, "share", share_id, &share.project_id)?;
        Ok(share)
    }

    async fn share_update(
        &self,
        ctx: &RequestContext,
        share_id: &str,
        update: ShareUpdate,
    ) -> Result<Share> {
        let mut entry = self
            .shares
            .get_mut(share_id)
            .ok_or_else(|| Error::not_found("share", share_id))?;
        Self::check_project(ctx, "share", share_id, &entry.project_id)?;

        if let Some(next) = update.status {
            if !entry.status.can_transition_to(next) {
                warn!(share_id, from = %entry.status, to = %next, "Unexpected share status transition");
            }
        }
        update.apply(&mut entry);
        Ok(entry.clone())
    }

    async fn share_delete(&self, ctx: &RequestContext, share_id: &str) -> Result<()> {
        let share = self.share_get(ctx, share_id).await?;
        self.shares.remove(&share.id);
        self.access_rules.retain(|_, r| r.record.share_id != share.id);
        debug!(share_id, "Deleted share record");
        Ok(())
    }

    async fn share_get_all_by_host(&self, _ctx: &RequestContext, host: &str) -> Result<Vec<Share>> {
        let mut shares: Vec<Share> = self
            .shares
            .iter()
            .filter(|s| s.host.as_deref() == Some(host))
            .map(|s| s.value().clone())
            .collect();
        shares.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(shares)
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    async fn share_snapshot_create(
        &self,
        _ctx: &RequestContext,
        new: NewSnapshot,
    ) -> Result<Snapshot> {
        let id = Self::new_id();
        let snapshot = Snapshot {
            name: format!("share-snapshot-{}", id),
            id: id.clone(),
            share_id: new.share_id,
            project_id: new.project_id,
            user_id: new.user_id,
            size: new.size,
            share_size: new.share_size,
            share_proto: new.share_proto,
            status: SnapshotStatus::Creating,
            progress: "0%".to_string(),
            export_location: None,
            provider_location: None,
            metadata: Default::default(),
            created_at: Utc::now(),
        };
        self.snapshots.insert(id, snapshot.clone());
        Ok(snapshot)
    }

    async fn share_snapshot_get(&self, ctx: &RequestContext, snapshot_id: &str) -> Result<Snapshot> {
        let snapshot = self
            .snapshots
            .get(snapshot_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| Error::not_found("snapshot", snapshot_id))?;
        Self::check_project(ctx, "snapshot", snapshot_id, &snapshot.project_id)?;
        Ok(snapshot)
    }

    async fn share_snapshot_update(
        &self,
        ctx: &RequestContext,
        snapshot_id: &str,
        update: SnapshotUpdate,
    ) -> Result<Snapshot> {
        let mut entry = self
            .snapshots
            .get_mut(snapshot_id)
            .ok_or_else(|| Error::not_found("snapshot", snapshot_id))?;
        Self::check_project(ctx, "snapshot", snapshot_id, &entry.project_id)?;

        if let Some(next) = update.status {
            if !entry.status.can_transition_to(next) {
                warn!(snapshot_id, from = %entry.status, to = %next, "Unexpected snapshot status transition");
            }
        }
        update.apply(&mut entry);
        Ok(entry.clone())
    }

    async fn share_snapshot_destroy(&self, ctx: &RequestContext, snapshot_id: &str) -> Result<()> {
        let snapshot = self.share_snapshot_get(ctx, snapshot_id).await?;
        self.snapshots.remove(&snapshot.id);
        Ok(())
    }

    // =========================================================================
    // Access Rules
    // =========================================================================

    async fn share_access_create(
        &self,
        _ctx: &RequestContext,
        new: NewAccessRule,
    ) -> Result<AccessRule> {
        let rule = AccessRule {
            id: Self::new_id(),
            share_id: new.share_id,
            access_type: new.access_type,
            access_to: new.access_to,
            state: AccessRuleState::New,
            created_at: Utc::now(),
        };
        self.access_rules.insert(
            rule.id.clone(),
            Sequenced {
                seq: self.next_seq(),
                record: rule.clone(),
            },
        );
        Ok(rule)
    }

    async fn share_access_get(&self, ctx: &RequestContext, access_id: &str) -> Result<AccessRule> {
        let rule = self
            .access_rules
            .get(access_id)
            .map(|r| r.record.clone())
            .ok_or_else(|| Error::not_found("access_rule", access_id))?;
        if let Some(project_id) = self.share_project(&rule.share_id) {
            Self::check_project(ctx, "access_rule", access_id, &project_id)?;
        }
        Ok(rule)
    }

    async fn share_access_update(
        &self,
        ctx: &RequestContext,
        access_id: &str,
        state: AccessRuleState,
    ) -> Result<AccessRule> {
        // Scope check first; it reads the shares map
        self.share_access_get(ctx, access_id).await?;

        let mut entry = self
            .access_rules
            .get_mut(access_id)
            .ok_or_else(|| Error::not_found("access_rule", access_id))?;
        if !entry.record.state.can_transition_to(state) {
            warn!(access_id, from = %entry.record.state, to = %state, "Unexpected access rule transition");
        }
        entry.record.state = state;
        Ok(entry.record.clone())
    }

    async fn share_access_delete(&self, ctx: &RequestContext, access_id: &str) -> Result<()> {
        self.share_access_get(ctx, access_id).await?;
        self.access_rules.remove(access_id);
        Ok(())
    }

    async fn share_access_get_all_for_share(
        &self,
        _ctx: &RequestContext,
        share_id: &str,
    ) -> Result<Vec<AccessRule>> {
        let mut rules: Vec<Sequenced<AccessRule>> = self
            .access_rules
            .iter()
            .filter(|r| r.record.share_id == share_id)
            .map(|r| r.value().clone())
            .collect();
        rules.sort_by_key(|r| r.seq);
        Ok(rules.into_iter().map(|r| r.record).collect())
    }

    // =========================================================================
    // Share Networks
    // =========================================================================

    async fn share_network_create(
        &self,
        _ctx: &RequestContext,
        new: NewShareNetwork,
    ) -> Result<ShareNetwork> {
        let network = ShareNetwork {
            id: Self::new_id(),
            project_id: new.project_id,
            name: new.name,
            neutron_net_id: new.neutron_net_id,
            neutron_subnet_id: new.neutron_subnet_id,
            network_type: None,
            segmentation_id: None,
            cidr: new.cidr,
            ip_version: None,
            status: ShareNetworkStatus::Inactive,
            network_allocations: Vec::new(),
            security_services: Vec::new(),
            created_at: Utc::now(),
        };
        self.share_networks.insert(network.id.clone(), network.clone());
        Ok(network)
    }

    async fn share_network_get(
        &self,
        ctx: &RequestContext,
        share_network_id: &str,
    ) -> Result<ShareNetwork> {
        let network = self
            .share_networks
            .get(share_network_id)
            .map(|n| n.value().clone())
            .ok_or_else(|| Error::not_found("share_network", share_network_id))?;
        Self::check_project(ctx, "share_network", share_network_id, &network.project_id)?;
        Ok(self.joined_network(network))
    }

    async fn share_network_update(
        &self,
        ctx: &RequestContext,
        share_network_id: &str,
        update: ShareNetworkUpdate,
    ) -> Result<ShareNetwork> {
        let updated = {
            let mut entry = self
                .share_networks
                .get_mut(share_network_id)
                .ok_or_else(|| Error::not_found("share_network", share_network_id))?;
            Self::check_project(ctx, "share_network", share_network_id, &entry.project_id)?;
            if let Some(next) = update.status {
                if !entry.status.can_transition_to(next) {
                    warn!(share_network_id, from = %entry.status, to = %next, "Unexpected share network transition");
                }
            }
            update.apply(&mut entry);
            entry.clone()
        };
        Ok(self.joined_network(updated))
    }

    async fn share_network_delete(
        &self,
        ctx: &RequestContext,
        share_network_id: &str,
    ) -> Result<()> {
        let network = self.share_network_get(ctx, share_network_id).await?;
        if network.status != ShareNetworkStatus::Inactive {
            return Err(Error::InvalidShareNetworkState {
                share_network_id: share_network_id.to_string(),
                operation: "delete".to_string(),
                status: network.status.to_string(),
            });
        }
        self.share_networks.remove(share_network_id);
        self.network_security.remove(share_network_id);
        self.allocations
            .retain(|_, a| a.record.share_network_id != share_network_id);
        Ok(())
    }

    async fn share_network_add_security_service(
        &self,
        ctx: &RequestContext,
        share_network_id: &str,
        security_service_id: &str,
    ) -> Result<()> {
        self.share_network_get(ctx, share_network_id).await?;
        self.security_service_get(ctx, security_service_id).await?;

        let mut ids = self
            .network_security
            .entry(share_network_id.to_string())
            .or_default();
        if !ids.iter().any(|id| id == security_service_id) {
            ids.push(security_service_id.to_string());
        }
        Ok(())
    }

    async fn share_network_remove_security_service(
        &self,
        ctx: &RequestContext,
        share_network_id: &str,
        security_service_id: &str,
    ) -> Result<()> {
        self.share_network_get(ctx, share_network_id).await?;

        let mut ids = self
            .network_security
            .get_mut(share_network_id)
            .ok_or_else(|| Error::not_found("security_service", security_service_id))?;
        let before = ids.len();
        ids.retain(|id| id != security_service_id);
        if ids.len() == before {
            return Err(Error::not_found("security_service", security_service_id));
        }
        Ok(())
    }

    // =========================================================================
    // Security Services
    // =========================================================================

    async fn security_service_create(
        &self,
        _ctx: &RequestContext,
        new: NewSecurityService,
    ) -> Result<SecurityService> {
        let service = SecurityService {
            id: Self::new_id(),
            project_id: new.project_id,
            service_type: new.service_type,
            name: new.name,
            dns_ip: new.dns_ip,
            server: new.server,
            domain: new.domain,
            user: new.user,
            password: new.password,
            created_at: Utc::now(),
        };
        self.security_services
            .insert(service.id.clone(), service.clone());
        Ok(service)
    }

    async fn security_service_get(
        &self,
        ctx: &RequestContext,
        security_service_id: &str,
    ) -> Result<SecurityService> {
        let service = self
            .security_services
            .get(security_service_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| Error::not_found("security_service", security_service_id))?;
        Self::check_project(ctx, "security_service", security_service_id, &service.project_id)?;
        Ok(service)
    }

    async fn security_service_delete(
        &self,
        ctx: &RequestContext,
        security_service_id: &str,
    ) -> Result<()> {
        self.security_service_get(ctx, security_service_id).await?;
        self.security_services.remove(security_service_id);
        for mut ids in self.network_security.iter_mut() {
            ids.retain(|id| id != security_service_id);
        }
        Ok(())
    }

    // =========================================================================
    // Network Allocations
    // =========================================================================

    async fn network_allocation_create(
        &self,
        _ctx: &RequestContext,
        share_network_id: &str,
        ip_address: &str,
    ) -> Result<NetworkAllocation> {
        if !self.share_networks.contains_key(share_network_id) {
            return Err(Error::not_found("share_network", share_network_id));
        }
        let allocation = NetworkAllocation {
            id: Self::new_id(),
            share_network_id: share_network_id.to_string(),
            ip_address: ip_address.to_string(),
            created_at: Utc::now(),
        };
        self.allocations.insert(
            allocation.id.clone(),
            Sequenced {
                seq: self.next_seq(),
                record: allocation.clone(),
            },
        );
        Ok(allocation)
    }

    async fn network_allocations_get_for_share_network(
        &self,
        _ctx: &RequestContext,
        share_network_id: &str,
    ) -> Result<Vec<NetworkAllocation>> {
        let mut allocations: Vec<Sequenced<NetworkAllocation>> = self
            .allocations
            .iter()
            .filter(|a| a.record.share_network_id == share_network_id)
            .map(|a| a.value().clone())
            .collect();
        allocations.sort_by_key(|a| a.seq);
        Ok(allocations.into_iter().map(|a| a.record).collect())
    }

    async fn network_allocation_delete(
        &self,
        _ctx: &RequestContext,
        allocation_id: &str,
    ) -> Result<()> {
        self.allocations
            .remove(allocation_id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("network_allocation", allocation_id))
    }

    // =========================================================================
    // Services
    // =========================================================================

    async fn service_create(&self, _ctx: &RequestContext, new: NewService) -> Result<ServiceRecord> {
        let service = ServiceRecord {
            id: Self::new_id(),
            host: new.host,
            topic: new.topic,
            availability_zone: new.availability_zone,
            disabled: false,
            report_count: 0,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.services.insert(service.id.clone(), service.clone());
        debug!(host = %service.host, topic = %service.topic, "Registered service");
        Ok(service)
    }

    async fn service_get_by_args(
        &self,
        _ctx: &RequestContext,
        host: &str,
        topic: &str,
    ) -> Result<ServiceRecord> {
        self.services
            .iter()
            .find(|s| s.host == host && s.topic == topic)
            .map(|s| s.value().clone())
            .ok_or_else(|| Error::not_found("service", format!("{}@{}", topic, host)))
    }

    async fn service_get_all_share_sorted(
        &self,
        _ctx: &RequestContext,
    ) -> Result<Vec<(ServiceRecord, u64)>> {
        let mut services: Vec<(ServiceRecord, u64)> = self
            .services
            .iter()
            .filter(|s| s.topic == self.share_topic)
            .map(|s| s.value().clone())
            .collect::<Vec<_>>()
            .into_iter()
            .map(|s| {
                let allocated = self.allocated_gigabytes(&s.host);
                (s, allocated)
            })
            .collect();
        services.sort_by(|(a, a_gb), (b, b_gb)| a_gb.cmp(b_gb).then_with(|| a.host.cmp(&b.host)));
        Ok(services)
    }

    async fn service_heartbeat(
        &self,
        _ctx: &RequestContext,
        service_id: &str,
    ) -> Result<ServiceRecord> {
        let mut entry = self
            .services
            .get_mut(service_id)
            .ok_or_else(|| Error::not_found("service", service_id))?;
        entry.report_count += 1;
        entry.updated_at = Some(Utc::now());
        Ok(entry.clone())
    }

    async fn service_set_disabled(
        &self,
        _ctx: &RequestContext,
        service_id: &str,
        disabled: bool,
    ) -> Result<ServiceRecord> {
        let mut entry = self
            .services
            .get_mut(service_id)
            .ok_or_else(|| Error::not_found("service", service_id))?;
        entry.disabled = disabled;
        Ok(entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn admin() -> RequestContext {
        RequestContext::admin()
    }

    async fn share_on(ledger: &MemoryLedger, host: &str, size: u64) -> Share {
        let share = ledger
            .share_create(&admin(), NewShare::new("p1", "u1", size, ShareProtocol::Nfs))
            .await
            .unwrap();
        ledger
            .share_update(&admin(), &share.id, ShareUpdate::scheduled_to(host))
            .await
            .unwrap()
    }

    async fn service(ledger: &MemoryLedger, host: &str) -> ServiceRecord {
        ledger
            .service_create(
                &admin(),
                NewService {
                    host: host.into(),
                    topic: "share".into(),
                    availability_zone: "nova".into(),
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_share_lifecycle_records() {
        let ledger = MemoryLedger::new("share");
        let share = share_on(&ledger, "host-a", 5).await;

        assert_eq!(share.name, format!("share-{}", share.id));
        assert_eq!(share.status, ShareStatus::Creating);
        assert!(share.scheduled_at.is_some());

        ledger.share_delete(&admin(), &share.id).await.unwrap();
        assert_matches!(
            ledger.share_get(&admin(), &share.id).await,
            Err(Error::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn test_project_scoping() {
        let ledger = MemoryLedger::new("share");
        let share = share_on(&ledger, "host-a", 1).await;

        let owner = RequestContext::new("u1", "p1");
        let other = RequestContext::new("u2", "p2");
        assert!(ledger.share_get(&owner, &share.id).await.is_ok());
        assert_matches!(
            ledger.share_get(&other, &share.id).await,
            Err(Error::NotFound { .. })
        );
        assert!(ledger.share_get(&other.elevated(), &share.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_access_rules_in_creation_order() {
        let ledger = MemoryLedger::new("share");
        let share = share_on(&ledger, "host-a", 1).await;

        for ip in ["10.0.0.3", "10.0.0.1", "10.0.0.2"] {
            ledger
                .share_access_create(&admin(), NewAccessRule::ip(&share.id, ip))
                .await
                .unwrap();
        }

        let rules = ledger
            .share_access_get_all_for_share(&admin(), &share.id)
            .await
            .unwrap();
        let order: Vec<&str> = rules.iter().map(|r| r.access_to.as_str()).collect();
        assert_eq!(order, vec!["10.0.0.3", "10.0.0.1", "10.0.0.2"]);
        assert!(rules.iter().all(|r| r.state == AccessRuleState::New));
    }

    #[tokio::test]
    async fn test_services_sorted_by_load_then_host() {
        let ledger = MemoryLedger::new("share");
        service(&ledger, "host-c").await;
        service(&ledger, "host-b").await;
        service(&ledger, "host-a").await;
        share_on(&ledger, "host-a", 8).await;
        share_on(&ledger, "host-c", 2).await;

        let sorted = ledger.service_get_all_share_sorted(&admin()).await.unwrap();
        let order: Vec<(&str, u64)> = sorted.iter().map(|(s, gb)| (s.host.as_str(), *gb)).collect();
        assert_eq!(order, vec![("host-b", 0), ("host-c", 2), ("host-a", 8)]);
    }

    #[tokio::test]
    async fn test_service_heartbeat() {
        let ledger = MemoryLedger::new("share");
        let svc = service(&ledger, "host-a").await;
        assert!(svc.updated_at.is_none());

        let svc = ledger.service_heartbeat(&admin(), &svc.id).await.unwrap();
        assert_eq!(svc.report_count, 1);
        assert!(svc.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_share_network_join_and_delete_guard() {
        let ledger = MemoryLedger::new("share");
        let network = ledger
            .share_network_create(
                &admin(),
                NewShareNetwork {
                    project_id: "p1".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let ldap = ledger
            .security_service_create(
                &admin(),
                NewSecurityService {
                    project_id: "p1".into(),
                    service_type: SecurityServiceType::Ldap,
                    name: Some("ldap".into()),
                    dns_ip: None,
                    server: Some("ldap.example.com".into()),
                    domain: None,
                    user: None,
                    password: Some("secret".into()),
                },
            )
            .await
            .unwrap();

        ledger
            .share_network_add_security_service(&admin(), &network.id, &ldap.id)
            .await
            .unwrap();
        ledger
            .network_allocation_create(&admin(), &network.id, "10.0.0.2")
            .await
            .unwrap();

        let joined = ledger.share_network_get(&admin(), &network.id).await.unwrap();
        assert_eq!(joined.security_services.len(), 1);
        assert_eq!(joined.network_allocations.len(), 1);

        ledger
            .share_network_update(
                &admin(),
                &network.id,
                ShareNetworkUpdate::status(ShareNetworkStatus::Activating),
            )
            .await
            .unwrap();
        assert_matches!(
            ledger.share_network_delete(&admin(), &network.id).await,
            Err(Error::InvalidShareNetworkState { .. })
        );
    }
}
