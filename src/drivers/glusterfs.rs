//! GlusterFS Share Driver
//!
//! Serves NFS shares as directories under one mounted GlusterFS volume.
//! Access is managed through the volume's `nfs.export-dir` option, whose
//! entries look like `/<share-name>(<ip>)`. Volume commands run locally, or
//! through ssh when the configured address names a remote user.

use crate::domain::*;
use crate::drivers::executor::{shell_quote, Command, CommandExecutorRef};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const EXPORT_DIR_OPTION: &str = "nfs.export-dir";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the GlusterFS driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlusterfsConfig {
    /// Volume address, `[remote_user@]host:/volume`
    pub target: String,
    /// Directory under which the volume is mounted
    pub mount_point_base: String,
    /// Helper that runs privileged commands, e.g. `sudo`
    pub root_helper: Option<String>,
    /// Name reported in capability reports
    pub backend_name: String,
}

impl Default for GlusterfsConfig {
    fn default() -> Self {
        Self {
            target: "127.0.0.1:/shares".to_string(),
            mount_point_base: "/var/lib/share-control-plane/mnt".to_string(),
            root_helper: Some("sudo".to_string()),
            backend_name: "GlusterFS".to_string(),
        }
    }
}

// =============================================================================
// Gluster Address
// =============================================================================

/// Parsed `[remote_user@]host:/volume`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlusterAddress {
    pub remote_user: Option<String>,
    pub host: String,
    pub volume: String,
}

impl GlusterAddress {
    pub fn parse(address: &str) -> Result<Self> {
        let invalid = || Error::Glusterfs(format!("Invalid gluster address {}", address));

        let (remote_user, rest) = match address.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
            Some(_) => return Err(invalid()),
            None => (None, address),
        };
        let (host, volume) = rest.split_once(":/").ok_or_else(invalid)?;
        if host.is_empty() || host.contains(['/', '@', ':']) || volume.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            remote_user,
            host: host.to_string(),
            volume: volume.to_string(),
        })
    }

    /// `host:/volume`, the mount source
    pub fn export(&self) -> String {
        format!("{}:/{}", self.host, self.volume)
    }

    /// Export prefixed with the remote user, when there is one
    pub fn qualified(&self) -> String {
        match &self.remote_user {
            Some(user) => format!("{}@{}", user, self.export()),
            None => self.export(),
        }
    }

    /// Build a `gluster` CLI invocation, wrapped in ssh for remote volumes
    pub fn make_gluster_args<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        match &self.remote_user {
            None => Command::new("gluster").args(args).as_root(),
            Some(user) => {
                let mut remote = String::from("gluster");
                for arg in &args {
                    remote.push(' ');
                    remote.push_str(&shell_quote(arg));
                }
                Command::new("ssh")
                    .arg(format!("{}@{}", user, self.host))
                    .arg(remote)
            }
        }
    }
}

// =============================================================================
// Volume info
// =============================================================================

/// Pull the `nfs.export-dir` entries out of `gluster volume info --xml`
fn parse_export_dir_list(volinfo: &str) -> Result<Vec<String>> {
    if volinfo.trim().is_empty() {
        return Err(Error::Glusterfs("Empty answer from gluster volume info".to_string()));
    }

    let count = element_text(volinfo, "count")
        .and_then(|c| c.trim().parse::<u32>().ok())
        .ok_or_else(|| Error::Glusterfs("Malformed gluster volume info".to_string()))?;
    if count != 1 {
        return Err(Error::InvalidShareAccess {
            reason: format!("gluster volume info reports {} volumes, expected 1", count),
        });
    }

    // Options are <option><name>..</name><value>..</value></option>
    let mut rest = volinfo;
    while let Some(start) = rest.find("<option>") {
        let after = &rest[start + "<option>".len()..];
        let end = after.find("</option>").unwrap_or(after.len());
        let option = &after[..end];
        if element_text(option, "name").map(str::trim) == Some(EXPORT_DIR_OPTION) {
            let value = element_text(option, "value").unwrap_or("").trim();
            return Ok(value
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(String::from)
                .collect());
        }
        rest = &after[end..];
    }
    Ok(Vec::new())
}

fn element_text<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(&xml[start..end])
}

// =============================================================================
// Driver
// =============================================================================

/// Share driver for a single GlusterFS volume
pub struct GlusterfsDriver {
    config: GlusterfsConfig,
    address: GlusterAddress,
    executor: CommandExecutorRef,
    stats: RwLock<Option<ShareStats>>,
}

impl GlusterfsDriver {
    pub fn new(config: GlusterfsConfig, executor: CommandExecutorRef) -> Result<Self> {
        let address = GlusterAddress::parse(&config.target)?;
        Ok(Self {
            config,
            address,
            executor,
            stats: RwLock::new(None),
        })
    }

    pub fn address(&self) -> &GlusterAddress {
        &self.address
    }

    /// Local mount point of the volume
    pub fn mount_path(&self) -> String {
        format!(
            "{}/{}",
            self.config.mount_point_base.trim_end_matches('/'),
            self.address.volume
        )
    }

    fn local_share_path(&self, share: &Share) -> String {
        format!("{}/{}", self.mount_path(), share.name)
    }

    async fn do_mount(&self, command: Command, ensure: bool) -> Result<()> {
        match self.executor.execute(&command).await {
            Ok(_) => Ok(()),
            Err(Error::ProcessExecution { stderr, .. })
                if ensure && stderr.contains("already mounted") =>
            {
                warn!(export = %self.address.export(), "Volume is already mounted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn ensure_volume_mounted(&self) -> Result<()> {
        let mount_path = self.mount_path();
        let result = async {
            self.executor
                .execute(&Command::new("mkdir").args(["-p", mount_path.as_str()]).as_root())
                .await?;
            let mount = Command::new("mount")
                .args(["-t", "glusterfs"])
                .arg(self.address.export())
                .arg(mount_path.clone())
                .as_root();
            self.do_mount(mount, true).await
        }
        .await;

        result.map_err(|e| {
            Error::Glusterfs(format!(
                "Could not mount {} at {}: {}",
                self.address.export(),
                mount_path,
                e
            ))
        })
    }

    async fn export_dir_list(&self) -> Result<Vec<String>> {
        let command = self.address.make_gluster_args([
            "--xml",
            "volume",
            "info",
            self.address.volume.as_str(),
        ]);
        let output = self.executor.execute(&command).await?;
        parse_export_dir_list(&output.stdout)
    }

    /// Read the export list, let `change` edit it, and write it back when it
    /// reports a modification
    async fn manage_access<F>(&self, share: &Share, access: &AccessRule, change: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<String>, String) -> bool + Send,
    {
        if access.access_type != AccessType::Ip {
            return Err(Error::InvalidShareAccess {
                reason: format!("only ip access type allowed, got {}", access.access_type),
            });
        }

        let mut exports = self.export_dir_list().await?;
        let entry = format!("/{}({})", share.name, access.access_to);
        if !change(&mut exports, entry) {
            debug!(share_id = %share.id, access_to = %access.access_to, "Export list unchanged");
            return Ok(());
        }

        let volume = self.address.volume.as_str();
        let command = if exports.is_empty() {
            self.address
                .make_gluster_args(["volume", "reset", volume, EXPORT_DIR_OPTION])
        } else {
            let joined = exports.join(",");
            self.address
                .make_gluster_args(["volume", "set", volume, EXPORT_DIR_OPTION, joined.as_str()])
        };
        self.executor.execute(&command).await?;
        Ok(())
    }

    async fn refresh_stats(&self) -> ShareStats {
        let (total, free) = match self.volume_capacity_gb().await {
            Ok(capacity) => capacity,
            Err(e) => {
                warn!(error = %e, "Could not read GlusterFS capacity");
                (None, None)
            }
        };
        ShareStats {
            share_backend_name: self.config.backend_name.clone(),
            vendor_name: "Red Hat".to_string(),
            driver_version: "1.0".to_string(),
            storage_protocol: "NFS".to_string(),
            total_capacity_gb: total,
            free_capacity_gb: free,
            reserved_percentage: 0,
            qos_support: false,
        }
    }

    async fn volume_capacity_gb(&self) -> Result<(Option<u64>, Option<u64>)> {
        let output = self
            .executor
            .execute(&Command::new("df").args(["-P", "-k"]).arg(self.mount_path()))
            .await?;
        // Filesystem 1024-blocks Used Available Capacity Mounted-on
        let fields: Vec<&str> = output
            .stdout
            .lines()
            .nth(1)
            .map(|l| l.split_whitespace().collect())
            .unwrap_or_default();
        let kib = |i: usize| fields.get(i).and_then(|v| v.parse::<u64>().ok());
        let to_gb = |k: u64| k / (1024 * 1024);
        Ok((kib(1).map(to_gb), kib(3).map(to_gb)))
    }
}

#[async_trait]
impl ShareDriver for GlusterfsDriver {
    fn backend_name(&self) -> &str {
        "glusterfs"
    }

    async fn do_setup(&self, _ctx: &RequestContext) -> Result<()> {
        match self.executor.execute(&Command::new("mount.glusterfs")).await {
            // Without arguments the helper exits non-zero; only presence matters
            Ok(_) | Err(Error::ProcessExecution { .. }) => {}
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::Glusterfs(
                    "mount.glusterfs is not installed".to_string(),
                ));
            }
            Err(e) => return Err(e),
        }

        self.ensure_volume_mounted().await?;
        info!(export = %self.address.export(), mount_path = %self.mount_path(), "GlusterFS volume mounted");
        Ok(())
    }

    async fn check_for_setup_error(&self) -> Result<()> {
        Ok(())
    }

    async fn ensure_share(&self, _ctx: &RequestContext, _share: &Share) -> Result<()> {
        Ok(())
    }

    async fn create_share(
        &self,
        _ctx: &RequestContext,
        share: &Share,
        _share_network: Option<&ShareNetwork>,
    ) -> Result<String> {
        let path = self.local_share_path(share);
        self.executor
            .execute(&Command::new("mkdir").arg(path).as_root())
            .await?;
        Ok(format!("{}/{}", self.address.qualified(), share.name))
    }

    async fn create_share_from_snapshot(
        &self,
        _ctx: &RequestContext,
        _share: &Share,
        _snapshot: &Snapshot,
        _share_network: Option<&ShareNetwork>,
    ) -> Result<String> {
        Err(Error::driver(
            self.backend_name(),
            "create_share_from_snapshot",
            "snapshots are not supported",
        ))
    }

    async fn delete_share(&self, _ctx: &RequestContext, share: &Share) -> Result<()> {
        let path = self.local_share_path(share);
        self.executor
            .execute(&Command::new("rm").args(["-rf", path.as_str()]).as_root())
            .await?;
        Ok(())
    }

    async fn create_snapshot(
        &self,
        _ctx: &RequestContext,
        _snapshot: &Snapshot,
    ) -> Result<Option<SnapshotUpdate>> {
        Err(Error::driver(
            self.backend_name(),
            "create_snapshot",
            "snapshots are not supported",
        ))
    }

    async fn delete_snapshot(&self, _ctx: &RequestContext, _snapshot: &Snapshot) -> Result<()> {
        Err(Error::driver(
            self.backend_name(),
            "delete_snapshot",
            "snapshots are not supported",
        ))
    }

    async fn allow_access(
        &self,
        _ctx: &RequestContext,
        share: &Share,
        access: &AccessRule,
    ) -> Result<()> {
        self.manage_access(share, access, |exports, entry| {
            if exports.contains(&entry) {
                false
            } else {
                exports.push(entry);
                true
            }
        })
        .await
    }

    async fn deny_access(&self, _ctx: &RequestContext, share: &Share, access: &AccessRule) -> Result<()> {
        self.manage_access(share, access, |exports, entry| {
            let before = exports.len();
            exports.retain(|e| *e != entry);
            exports.len() != before
        })
        .await
    }

    async fn setup_network(&self, _share_network: &ShareNetwork, _metadata: &NetworkMetadata) -> Result<()> {
        Ok(())
    }

    async fn teardown_network(&self, _share_network: &ShareNetwork) -> Result<()> {
        Ok(())
    }

    fn get_network_allocations_number(&self) -> u32 {
        0
    }

    async fn get_share_stats(&self, refresh: bool) -> Result<ShareStats> {
        if !refresh {
            if let Some(stats) = self.stats.read().clone() {
                return Ok(stats);
            }
        }
        let stats = self.refresh_stats().await;
        *self.stats.write() = Some(stats.clone());
        Ok(stats)
    }
}
