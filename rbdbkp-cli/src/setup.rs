//! Shared startup plumbing for every subcommand: load the config file,
//! initialize logging from it, and assemble the drivers a [`Context`] needs.

use anyhow::{bail, Context as _, Error};
use serde_json::Value;

use rbdbkp_core::Context;
use rbdbkp_pve::HypervisorDriver;
use rbdbkp_rbd::{BlockStoreDriver, Shell};

/// Reads `param["config"]` (falling back to the well-known config path),
/// loads it, and initializes `env_logger` from `global.log_level`, bumped
/// to `debug` if `param["verbose"]` is set. Safe to call more than once per
/// process: the logger only installs on the first call.
pub fn build_context(param: &Value, snapshot_name_prefix_override: Option<String>) -> Result<Context, Error> {
    let config_path = param["config"]
        .as_str()
        .unwrap_or(rbdbkp_config::DEFAULT_CONFIG_FILE);
    let config = rbdbkp_config::load_config(config_path)?;

    let mut level: log::LevelFilter = config.global.log_level.into();
    if param["verbose"].as_bool().unwrap_or(false) {
        level = log::LevelFilter::Debug;
    }
    let _ = env_logger::Builder::new().filter_level(level).try_init();

    let primary_host = config
        .global
        .proxmox_servers
        .first()
        .context("proxmox_servers must list at least one host")?
        .clone();

    if config.global.proxmox_servers.len() > 1 {
        log::debug!(
            "using {primary_host} as the primary hypervisor API host ({} configured as fallback)",
            config.global.proxmox_servers.len() - 1
        );
    }

    let client = rbdbkp_pve::Client::new(
        &primary_host,
        8006,
        &config.global.user,
        &config.global.password,
        config.global.verify_ssl,
    )?;
    let hypervisor = HypervisorDriver::new(client, config.global.wait_for_snapshot_tries);

    let backup = BlockStoreDriver::new(Shell::Local);
    let source_shell = Shell::remote(config.global.proxmox_ssh_user.clone(), primary_host);
    let source = BlockStoreDriver::new(source_shell.clone());

    if config.global.ceph_backup_pool.is_empty() {
        bail!("ceph_backup_pool must not be empty");
    }

    Ok(Context::new(
        config,
        backup,
        source,
        source_shell,
        hypervisor,
        snapshot_name_prefix_override,
    ))
}
