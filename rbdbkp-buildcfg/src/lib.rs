//! Build-time constants shared by the rbd-backup crates: package version
//! and the well-known filesystem paths the orchestrator reads and writes.

pub const PKG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION_MAJOR"),
    ".",
    env!("CARGO_PKG_VERSION_MINOR"),
);
pub const PKG_RELEASE: &str = env!("CARGO_PKG_VERSION_PATCH");
pub const PKG_REPOID: &str = env!("REPOID");

/// Directory holding `rbd-backup.conf`.
pub const CONFIGDIR: &str = "/etc/rbd-backup";

#[macro_export]
macro_rules! RBD_BACKUP_RUN_DIR_M {
    () => {
        "/run/rbd-backup"
    };
}

#[macro_export]
macro_rules! RBD_BACKUP_STATE_DIR_M {
    () => {
        "/var/lib/rbd-backup"
    };
}

/// namespaced directory for in-memory (tmpfs) run state, e.g. process locks.
pub const RBD_BACKUP_RUN_DIR: &str = RBD_BACKUP_RUN_DIR_M!();

/// namespaced directory for persistent state.
pub const RBD_BACKUP_STATE_DIR: &str = RBD_BACKUP_STATE_DIR_M!();

/// Mount point prefix for a mapped metadata image, `{MOUNT_DIR_PREFIX}{image_name}`.
///
/// Matches the original tool's `/tmp/{image}` convention so operators upgrading
/// from it find the same layout.
pub const METADATA_MOUNT_DIR_PREFIX: &str = "/tmp/";

/// Prepend the configuration directory to a file name.
///
/// ```
/// use rbdbkp_buildcfg::configdir;
/// let cfg_path = configdir!("/rbd-backup.conf");
/// ```
#[macro_export]
macro_rules! configdir {
    ($subdir:expr) => {
        concat!("/etc/rbd-backup", $subdir)
    };
}

/// Prepend the run directory to a file name.
#[macro_export]
macro_rules! rundir {
    ($subdir:expr) => {
        concat!($crate::RBD_BACKUP_RUN_DIR_M!(), $subdir)
    };
}

pub const RBD_BACKUP_CONFIG_FN: &str = configdir!("/rbd-backup.conf");
pub const RBD_BACKUP_LOCKFILE_FN: &str = rundir!("/rbd-backup.lck");
