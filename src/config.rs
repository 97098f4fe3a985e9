//! Service configuration
//!
//! Everything a share host process needs, loadable from a YAML file. Every
//! section has defaults, so an empty file is a valid standalone setup.

use crate::drivers::DriverConfig;
use crate::error::Result;
use crate::manager::PeriodicConfig;
use crate::network::NetworkConfig;
use crate::quota::QuotaConfig;
use crate::rpc::bus::DEFAULT_QUEUE_CAPACITY;
use crate::scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration of one control plane process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Host name the share service registers under
    pub host: String,
    /// Availability zone of this host
    pub availability_zone: String,
    /// Capacity of each host's dispatch queue
    pub queue_capacity: usize,
    pub scheduler: SchedulerConfig,
    pub periodic: PeriodicConfig,
    pub quota: QuotaConfig,
    pub network: NetworkConfig,
    pub driver: DriverConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            availability_zone: "nova".to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            scheduler: SchedulerConfig::default(),
            periodic: PeriodicConfig::default(),
            quota: QuotaConfig::default(),
            network: NetworkConfig::default(),
            driver: DriverConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Parse a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }
}
