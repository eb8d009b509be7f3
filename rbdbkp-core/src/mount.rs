use anyhow::{Context as _, Error};
use tokio::process::Command;

use rbdbkp_buildcfg::METADATA_MOUNT_DIR_PREFIX;
use rbdbkp_tools::run_command_async;

/// Mount point for a mapped metadata image: `/tmp/{image_name}`, matching
/// the original tool's convention exactly (spec §4.3/§9).
pub fn mount_point(image_name: &str) -> String {
    format!("{METADATA_MOUNT_DIR_PREFIX}{image_name}")
}

/// `mkfs.ext4 -L {label} {device}`. `label` is truncated by the caller to
/// ext4's 16-byte limit (the first 16 chars of the image name, spec §4.3).
pub async fn format_ext4(device: &str, label: &str) -> Result<(), Error> {
    let mut cmd = Command::new("mkfs.ext4");
    cmd.args(["-L", label, device]);
    run_command_async(cmd, None)
        .await
        .with_context(|| format!("formatting {device} as ext4"))?;
    Ok(())
}

async fn mount(device: &str, mount_point: &str) -> Result<(), Error> {
    let mut mkdir = Command::new("mkdir");
    mkdir.args(["-p", mount_point]);
    run_command_async(mkdir, None)
        .await
        .with_context(|| format!("creating mount point {mount_point}"))?;

    let mut mount = Command::new("mount");
    mount.args([device, mount_point]);
    run_command_async(mount, None)
        .await
        .with_context(|| format!("mounting {device} at {mount_point}"))?;
    Ok(())
}

async fn unmount(mount_point: &str) -> Result<(), Error> {
    let mut umount = Command::new("umount");
    umount.arg(mount_point);
    run_command_async(umount, None)
        .await
        .with_context(|| format!("unmounting {mount_point}"))?;

    let mut rmdir = Command::new("rmdir");
    rmdir.arg(mount_point);
    run_command_async(rmdir, None)
        .await
        .with_context(|| format!("removing mount point {mount_point}"))?;
    Ok(())
}

/// Scoped acquire/release of a mapped-and-mounted metadata image (spec §9,
/// "implicit scoped mounts/maps" design note). `acquire` performs
/// mkdir+mount; the guard's async `release` performs umount+rmdir, logging
/// rather than propagating failures so the caller's own error (if any) from
/// whatever happened while the guard was held is not masked.
///
/// This is a manual (not `Drop`-based) guard: unmounting is fallible and
/// async, and `Drop` cannot run async code. Callers MUST call `release` on
/// every exit path, success or failure — the backup engine's METADATA step
/// does so in a `finally`-style block (see `metadata.rs`).
pub struct MountGuard {
    mount_point: String,
}

impl MountGuard {
    pub async fn acquire(device: &str, image_name: &str) -> Result<Self, Error> {
        let mount_point = mount_point(image_name);
        mount(device, &mount_point).await?;
        Ok(Self { mount_point })
    }

    pub fn path(&self) -> &str {
        &self.mount_point
    }

    /// Release the mount, logging (not propagating) any failure. Safe to
    /// call even if the mount step itself never completed successfully
    /// is not applicable here since `acquire` only returns once mounted.
    pub async fn release(self) {
        if let Err(err) = unmount(&self.mount_point).await {
            log::error!("failed to release metadata mount {}: {err:#}", self.mount_point);
        }
    }
}
