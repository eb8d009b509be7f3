use anyhow::{Context as _, Error};
use tokio::fs;

use rbdbkp_api_types::Vm;
use rbdbkp_rbd::BlockStoreDriver;

use crate::context::Context;
use crate::mount::{format_ext4, MountGuard};

/// Name of the metadata image for a VM: `{vm.uuid}_vm_metadata` (spec §3).
pub fn metadata_image_name(vm_uuid: &str) -> String {
    format!("{vm_uuid}_vm_metadata")
}

/// Lifecycle of the per-VM metadata image (spec §4.3): create/format on
/// first use, map+mount, write the VM's current config, unmount+unmap
/// (always), tag with identifying image-meta, and snapshot.
///
/// Returns once the metadata snapshot `snapshot_name` has been created —
/// the point of commit for this restore point's metadata (spec §4.3).
pub async fn refresh_metadata_image(
    ctx: &Context,
    vm: &Vm,
    snapshot_name: &str,
) -> Result<(), Error> {
    let backup_pool = ctx.backup_pool();
    let image = metadata_image_name(&vm.uuid);

    if !ctx.backup.image_exists(backup_pool, &image).await? {
        create_metadata_image(&ctx.backup, backup_pool, &image, ctx).await?;
    }

    let device = ctx.backup.map_image(backup_pool, &image).await?;

    let write_result = write_config(&device, &image, vm).await;

    // Unmap/unmount must happen on every exit path, even if the write
    // failed (spec §4.3 failure policy), so the device lock is never held
    // past this function regardless of outcome.
    if let Err(err) = ctx.backup.unmap_image(backup_pool, &image).await {
        log::error!("failed to unmap metadata image {backup_pool}/{image}: {err:#}");
    }

    write_result?;

    ctx.backup
        .image_meta_set(backup_pool, &image, "vm.id", &vm.id.to_string())
        .await?;
    ctx.backup
        .image_meta_set(backup_pool, &image, "vm.uuid", &vm.uuid)
        .await?;
    ctx.backup
        .image_meta_set(backup_pool, &image, "vm.name", &vm.name)
        .await?;
    ctx.backup
        .image_meta_set(backup_pool, &image, "vm.running", if vm.running { "1" } else { "0" })
        .await?;
    let last_updated = proxmox_time::epoch_to_rfc3339_utc(proxmox_time::epoch_i64())?;
    ctx.backup
        .image_meta_set(backup_pool, &image, "last_updated", &last_updated)
        .await?;

    ctx.backup
        .create_snapshot(backup_pool, &image, &ctx.snapshot_name_prefix, Some(snapshot_name))
        .await?;

    Ok(())
}

async fn create_metadata_image(
    backup: &BlockStoreDriver,
    backup_pool: &str,
    image: &str,
    ctx: &Context,
) -> Result<(), Error> {
    backup
        .create_image(backup_pool, image, &ctx.config.global.vm_metadata_image_size)
        .await?;

    backup
        .disable_image_features(
            backup_pool,
            image,
            &ctx.config.global.ceph_backup_disable_rbd_image_features_for_metadata,
        )
        .await?;

    let device = backup.map_image(backup_pool, image).await?;
    let label = &image[..image.len().min(16)];
    let format_result = format_ext4(&device, label).await;
    if let Err(err) = backup.unmap_image(backup_pool, image).await {
        log::error!("failed to unmap freshly formatted metadata image {backup_pool}/{image}: {err:#}");
    }
    format_result
}

async fn write_config(device: &str, image_name: &str, vm: &Vm) -> Result<(), Error> {
    let guard = MountGuard::acquire(device, image_name).await?;
    let path = format!("{}/{}.conf", guard.path(), vm.id);
    let result = fs::write(&path, vm.config.as_bytes())
        .await
        .with_context(|| format!("writing {path}"));
    guard.release().await;
    result
}
