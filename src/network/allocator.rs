//! CIDR Network Allocator
//!
//! Allocates IPv4 host addresses from the share network's CIDR (or the
//! configured default) and writes one allocation record per address. The
//! network address, the broadcast address and the first host (gateway) are
//! never handed out.

use crate::domain::{NetworkAllocator, RequestContext, ShareNetwork, ShareNetworkUpdate, StatusLedgerRef};
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info};

// =============================================================================
// Configuration
// =============================================================================

/// Default topology applied to share networks that carry none
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub cidr: String,
    pub network_type: String,
    pub segmentation_id: Option<u32>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr: "10.254.0.0/24".to_string(),
            network_type: "flat".to_string(),
            segmentation_id: None,
        }
    }
}

// =============================================================================
// CIDR
// =============================================================================

/// Parsed IPv4 network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    network: u32,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn parse(cidr: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::Configuration(format!("invalid CIDR '{}': {}", cidr, reason));

        let (addr, prefix) = cidr.split_once('/').ok_or_else(|| invalid("missing prefix length"))?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid("bad address"))?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid("bad prefix length"))?;
        if prefix > 30 {
            return Err(invalid("prefix leaves no usable hosts"));
        }

        let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
        Ok(Self {
            network: u32::from(addr) & mask,
            prefix,
        })
    }

    /// Host addresses available for allocation, in ascending order
    pub fn allocatable(&self) -> impl Iterator<Item = Ipv4Addr> {
        let size = 1u64 << (32 - self.prefix);
        let first = self.network as u64 + 2;
        let last = self.network as u64 + size - 2;
        (first..=last).map(|a| Ipv4Addr::from(a as u32))
    }
}

impl std::fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", Ipv4Addr::from(self.network), self.prefix)
    }
}

// =============================================================================
// Allocator
// =============================================================================

/// Address allocator over IPv4 CIDR pools
pub struct CidrAllocator {
    config: NetworkConfig,
    ledger: StatusLedgerRef,
    /// Pool (normalized CIDR) -> addresses in use
    in_use: DashMap<String, BTreeSet<Ipv4Addr>>,
}

impl CidrAllocator {
    pub fn new(config: NetworkConfig, ledger: StatusLedgerRef) -> Result<Arc<Self>> {
        Ipv4Cidr::parse(&config.cidr)?;
        Ok(Arc::new(Self {
            config,
            ledger,
            in_use: DashMap::new(),
        }))
    }

    /// Addresses currently held in a pool
    pub fn used_count(&self, cidr: &str) -> usize {
        Ipv4Cidr::parse(cidr)
            .ok()
            .and_then(|c| self.in_use.get(&c.to_string()).map(|s| s.len()))
            .unwrap_or(0)
    }

    fn pool_for(&self, share_network: &ShareNetwork) -> Result<Ipv4Cidr> {
        Ipv4Cidr::parse(share_network.cidr.as_deref().unwrap_or(&self.config.cidr))
    }

    /// Take `count` free addresses from the pool, all or nothing
    fn reserve_addresses(&self, share_network_id: &str, pool: &Ipv4Cidr, count: u32) -> Result<Vec<Ipv4Addr>> {
        let mut used = self.in_use.entry(pool.to_string()).or_default();
        let picked: Vec<Ipv4Addr> = pool
            .allocatable()
            .filter(|a| !used.contains(a))
            .take(count as usize)
            .collect();

        if picked.len() < count as usize {
            return Err(Error::NetworkAllocation {
                share_network_id: share_network_id.to_string(),
                reason: format!(
                    "pool {} exhausted: needed {}, {} free",
                    pool,
                    count,
                    picked.len()
                ),
            });
        }
        used.extend(picked.iter().copied());
        Ok(picked)
    }

    fn release_address(&self, pool: &Ipv4Cidr, address: &str) {
        if let (Ok(addr), Some(mut used)) = (address.parse::<Ipv4Addr>(), self.in_use.get_mut(&pool.to_string())) {
            used.remove(&addr);
        }
    }
}

#[async_trait]
impl NetworkAllocator for CidrAllocator {
    async fn allocate_network(
        &self,
        ctx: &RequestContext,
        share_network: &ShareNetwork,
        count: u32,
    ) -> Result<ShareNetwork> {
        let pool = self.pool_for(share_network)?;
        let addresses = self.reserve_addresses(&share_network.id, &pool, count)?;

        for (i, address) in addresses.iter().enumerate() {
            if let Err(e) = self
                .ledger
                .network_allocation_create(ctx, &share_network.id, &address.to_string())
                .await
            {
                // Give back what was not recorded; recorded ones are
                // released by deallocate_network
                for unrecorded in &addresses[i..] {
                    self.release_address(&pool, &unrecorded.to_string());
                }
                return Err(e);
            }
        }

        let update = ShareNetworkUpdate {
            network_type: Some(
                share_network
                    .network_type
                    .clone()
                    .unwrap_or_else(|| self.config.network_type.clone()),
            ),
            segmentation_id: share_network.segmentation_id.or(self.config.segmentation_id),
            cidr: Some(pool.to_string()),
            ip_version: Some(4),
            ..Default::default()
        };
        let network = self
            .ledger
            .share_network_update(ctx, &share_network.id, update)
            .await?;

        info!(
            share_network_id = %share_network.id,
            pool = %pool,
            count,
            "Allocated network addresses"
        );
        Ok(network)
    }

    async fn deallocate_network(&self, ctx: &RequestContext, share_network: &ShareNetwork) -> Result<()> {
        let pool = self.pool_for(share_network)?;
        let allocations = self
            .ledger
            .network_allocations_get_for_share_network(ctx, &share_network.id)
            .await?;

        for allocation in &allocations {
            match self.ledger.network_allocation_delete(ctx, &allocation.id).await {
                Ok(()) | Err(Error::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
            self.release_address(&pool, &allocation.ip_address);
        }

        if allocations.is_empty() {
            debug!(share_network_id = %share_network.id, "No network allocations to release");
        } else {
            info!(
                share_network_id = %share_network.id,
                count = allocations.len(),
                "Released network addresses"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryLedger;
    use crate::domain::{NewShareNetwork, StatusLedger};
    use assert_matches::assert_matches;

    async fn setup(cidr: Option<&str>) -> (Arc<MemoryLedger>, Arc<CidrAllocator>, ShareNetwork) {
        let ledger = MemoryLedger::new("share");
        let allocator = CidrAllocator::new(NetworkConfig::default(), ledger.clone()).unwrap();
        let network = ledger
            .share_network_create(
                &RequestContext::admin(),
                NewShareNetwork {
                    project_id: "p1".into(),
                    cidr: cidr.map(String::from),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        (ledger, allocator, network)
    }

    #[test]
    fn test_cidr_parse() {
        let cidr = Ipv4Cidr::parse("192.168.1.77/24").unwrap();
        assert_eq!(cidr.to_string(), "192.168.1.0/24");

        let hosts: Vec<Ipv4Addr> = Ipv4Cidr::parse("10.0.0.0/30").unwrap().allocatable().collect();
        assert_eq!(hosts, vec![Ipv4Addr::new(10, 0, 0, 2)]);

        assert!(Ipv4Cidr::parse("10.0.0.0").is_err());
        assert!(Ipv4Cidr::parse("10.0.0.0/31").is_err());
        assert!(Ipv4Cidr::parse("nope/24").is_err());
    }

    #[tokio::test]
    async fn test_allocate_and_deallocate() {
        let ctx = RequestContext::admin();
        let (ledger, allocator, network) = setup(None).await;

        let network = allocator.allocate_network(&ctx, &network, 2).await.unwrap();
        let ips: Vec<&str> = network
            .network_allocations
            .iter()
            .map(|a| a.ip_address.as_str())
            .collect();
        assert_eq!(ips, vec!["10.254.0.2", "10.254.0.3"]);
        assert_eq!(network.cidr.as_deref(), Some("10.254.0.0/24"));
        assert_eq!(network.network_type.as_deref(), Some("flat"));
        assert_eq!(network.ip_version, Some(4));
        assert_eq!(allocator.used_count("10.254.0.0/24"), 2);

        allocator.deallocate_network(&ctx, &network).await.unwrap();
        let remaining = ledger
            .network_allocations_get_for_share_network(&ctx, &network.id)
            .await
            .unwrap();
        assert!(remaining.is_empty());
        assert_eq!(allocator.used_count("10.254.0.0/24"), 0);
    }

    #[tokio::test]
    async fn test_pool_exhaustion_is_all_or_nothing() {
        let ctx = RequestContext::admin();
        let (_ledger, allocator, network) = setup(Some("10.1.0.0/29")).await;

        // /29 has 5 allocatable hosts
        let result = allocator.allocate_network(&ctx, &network, 6).await;
        assert_matches!(result, Err(Error::NetworkAllocation { .. }));
        assert_eq!(allocator.used_count("10.1.0.0/29"), 0);

        allocator.allocate_network(&ctx, &network, 5).await.unwrap();
        assert_eq!(allocator.used_count("10.1.0.0/29"), 5);
    }
}
