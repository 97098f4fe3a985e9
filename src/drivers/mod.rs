//! Share Backend Drivers
//!
//! Provides drivers for different storage backends:
//! - Memory: simulated backend for standalone mode
//! - GlusterFS: directories on a mounted GlusterFS volume, exported over NFS

pub mod executor;
pub mod glusterfs;
pub mod memory;

pub use executor::{Command, CommandExecutor, CommandOutput, ProcessExecutor, ScriptedExecutor};
pub use glusterfs::{GlusterAddress, GlusterfsConfig, GlusterfsDriver};
pub use memory::{MemoryDriver, MemoryDriverConfig};

use crate::domain::ShareDriverRef;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Combined driver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Driver to load: `memory` or `glusterfs`
    pub backend: String,
    pub memory: MemoryDriverConfig,
    pub glusterfs: GlusterfsConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            memory: MemoryDriverConfig::default(),
            glusterfs: GlusterfsConfig::default(),
        }
    }
}

/// Factory for creating share drivers
pub struct DriverFactory;

impl DriverFactory {
    /// Create the driver named by the configuration
    pub fn create(config: &DriverConfig) -> Result<ShareDriverRef> {
        match config.backend.to_lowercase().as_str() {
            "memory" | "standalone" => Ok(Arc::new(MemoryDriver::new(config.memory.clone()))),
            "glusterfs" | "gluster" => {
                let executor = Arc::new(ProcessExecutor::new(config.glusterfs.root_helper.clone()));
                Ok(Arc::new(GlusterfsDriver::new(config.glusterfs.clone(), executor)?))
            }
            other => Err(Error::Configuration(format!("unknown share driver: {}", other))),
        }
    }
}
