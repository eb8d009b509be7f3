use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Error};

use rbdbkp_api_types::{Config, GlobalConfig, LogLevel, VmSectionConfig};

use crate::ini::{parse_bool, parse_ini, split_csv};

/// Load and validate `rbd-backup.conf`. Fails with a descriptive
/// *ConfigError* (a plain [`anyhow::Error`] here, since this is a startup-time
/// fatal condition with no recovery path) if a required global key is
/// missing or malformed.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, Error> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    parse_config(&content).with_context(|| format!("invalid config file {}", path.display()))
}

fn parse_config(content: &str) -> Result<Config, Error> {
    let mut sections = parse_ini(content)?;

    let global_raw = sections
        .remove("global")
        .context("config is missing a [global] section")?;
    let global = parse_global(&global_raw)?;

    sections.remove("");

    let mut vms = BTreeMap::new();
    for (uuid, raw) in sections {
        if !rbdbkp_api_types::is_guid(&uuid) {
            bail!("config section {uuid:?} is not a VM uuid (and is not [global])");
        }
        vms.insert(uuid, parse_vm_section(&raw)?);
    }

    Ok(Config { global, vms })
}

fn required<'a>(section: &'a BTreeMap<String, String>, key: &str) -> Result<&'a str, Error> {
    section
        .get(key)
        .map(String::as_str)
        .with_context(|| format!("missing required global config key {key:?}"))
}

fn parse_global(section: &BTreeMap<String, String>) -> Result<GlobalConfig, Error> {
    let proxmox_servers = split_csv(required(section, "proxmox_servers")?);
    if proxmox_servers.is_empty() {
        bail!("proxmox_servers must list at least one host");
    }

    let verify_ssl = match section.get("verify_ssl") {
        Some(v) => parse_bool(v).context("verify_ssl")?,
        None => true,
    };
    let enable_transport_compression_initial = match section.get("enable_transport_compression_initial") {
        Some(v) => parse_bool(v).context("enable_transport_compression_initial")?,
        None => false,
    };
    let enable_transport_compression_incremental =
        match section.get("enable_transport_compression_incremental") {
            Some(v) => parse_bool(v).context("enable_transport_compression_incremental")?,
            None => false,
        };
    let enable_intra_object_delta_transfer = match section.get("enable_intra_object_delta_transfer") {
        Some(v) => parse_bool(v).context("enable_intra_object_delta_transfer")?,
        None => true,
    };
    let wait_for_snapshot_tries: u32 = required(section, "wait_for_snapshot_tries")?
        .parse()
        .context("wait_for_snapshot_tries must be an integer")?;
    let log_level = match section.get("log_level") {
        Some(v) => v.parse()?,
        None => LogLevel::Info,
    };

    Ok(GlobalConfig {
        proxmox_servers,
        proxmox_ssh_user: required(section, "proxmox_ssh_user")?.to_string(),
        user: required(section, "user")?.to_string(),
        password: required(section, "password")?.to_string(),
        verify_ssl,
        ceph_backup_pool: required(section, "ceph_backup_pool")?.to_string(),
        snapshot_name_prefix: section
            .get("snapshot_name_prefix")
            .cloned()
            .unwrap_or_default(),
        vm_metadata_image_size: required(section, "vm_metadata_image_size")?.to_string(),
        ceph_backup_disable_rbd_image_features_for_metadata: section
            .get("ceph_backup_disable_rbd_image_features_for_metadata")
            .map(|v| split_csv(v))
            .unwrap_or_default(),
        enable_transport_compression_initial,
        enable_transport_compression_incremental,
        enable_intra_object_delta_transfer,
        wait_for_snapshot_tries,
        ignore_storages: section
            .get("ignore_storages")
            .map(|v| split_csv(v))
            .unwrap_or_default(),
        log_level,
    })
}

fn parse_vm_section(section: &BTreeMap<String, String>) -> Result<VmSectionConfig, Error> {
    let ignore = match section.get("ignore") {
        Some(v) => parse_bool(v).context("ignore")?,
        None => false,
    };
    let ignore_disks = section
        .get("ignore_disks")
        .map(|v| split_csv(v))
        .unwrap_or_default();
    Ok(VmSectionConfig {
        ignore,
        ignore_disks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
[global]
proxmox_servers = pve1.example.invalid, pve2.example.invalid
proxmox_ssh_user = root
user = backup@pve
password = secret
verify_ssl = false
ceph_backup_pool = backup
vm_metadata_image_size = 100M
wait_for_snapshot_tries = 500
ignore_storages = local

[11111111-1111-1111-1111-111111111111]
ignore_disks = local-rbd/vm-200-disk-1
";

    #[test]
    fn parses_sample_config() {
        let config = parse_config(SAMPLE).unwrap();
        assert_eq!(config.global.proxmox_servers.len(), 2);
        assert!(!config.global.verify_ssl);
        assert_eq!(config.global.wait_for_snapshot_tries, 500);
        assert_eq!(config.global.ignore_storages, vec!["local".to_string()]);
        let vm = config
            .vms
            .get("11111111-1111-1111-1111-111111111111")
            .unwrap();
        assert_eq!(vm.ignore_disks, vec!["local-rbd/vm-200-disk-1".to_string()]);
        assert!(!vm.ignore);
    }

    #[test]
    fn rejects_missing_global_section() {
        assert!(parse_config("[11111111-1111-1111-1111-111111111111]\nignore = true\n").is_err());
    }

    #[test]
    fn rejects_non_guid_section() {
        let bad = SAMPLE.replace(
            "11111111-1111-1111-1111-111111111111",
            "not-a-uuid",
        );
        assert!(parse_config(&bad).is_err());
    }
}
