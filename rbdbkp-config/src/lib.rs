//! Loading of `rbd-backup.conf`: a `[global]` section plus zero or more
//! per-VM sections keyed by the VM's uuid (see `rbdbkp_api_types::config`
//! for the parsed shape).

mod ini;
mod loader;

pub use loader::load_config;

pub use rbdbkp_buildcfg::RBD_BACKUP_CONFIG_FN as DEFAULT_CONFIG_FILE;
