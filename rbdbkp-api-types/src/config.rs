use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `log_level` as accepted in the global config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl std::str::FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            other => anyhow::bail!("unknown log_level {other:?}, expected DEBUG|INFO|WARN|ERROR"),
        }
    }
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

/// The `[global]` section of `rbd-backup.conf` (see `rbdbkp-config` for the
/// ini-style loader that produces this from text).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Source-cluster hosts; the first is primary, the rest are fallbacks
    /// for the hypervisor API connection.
    pub proxmox_servers: Vec<String>,
    /// User for the source-cluster shell transport (ssh).
    pub proxmox_ssh_user: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
    pub ceph_backup_pool: String,
    #[serde(default)]
    pub snapshot_name_prefix: String,
    pub vm_metadata_image_size: String,
    #[serde(default)]
    pub ceph_backup_disable_rbd_image_features_for_metadata: Vec<String>,
    #[serde(default)]
    pub enable_transport_compression_initial: bool,
    #[serde(default)]
    pub enable_transport_compression_incremental: bool,
    #[serde(default = "default_true")]
    pub enable_intra_object_delta_transfer: bool,
    pub wait_for_snapshot_tries: u32,
    #[serde(default)]
    pub ignore_storages: Vec<String>,
    #[serde(default)]
    pub log_level: LogLevel,
}

fn default_true() -> bool {
    true
}

/// A per-VM section, keyed by VM uuid in the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VmSectionConfig {
    #[serde(default)]
    pub ignore: bool,
    #[serde(default)]
    pub ignore_disks: Vec<String>,
}

/// The fully parsed configuration file: one global section plus zero or
/// more per-VM sections keyed by the VM's uuid.
#[derive(Debug, Clone)]
pub struct Config {
    pub global: GlobalConfig,
    pub vms: BTreeMap<String, VmSectionConfig>,
}

impl Config {
    /// uuids of VMs whose section has `ignore = true`.
    pub fn ignored_vm_uuids(&self) -> Vec<&str> {
        self.vms
            .iter()
            .filter(|(_, cfg)| cfg.ignore)
            .map(|(uuid, _)| uuid.as_str())
            .collect()
    }

    pub fn vm_section(&self, uuid: &str) -> Option<&VmSectionConfig> {
        self.vms.get(uuid)
    }
}
