use regex::Regex;

use rbdbkp_api_types::restore_point::parse_rbd_timestamp;
use rbdbkp_api_types::{parse_duration, RestorePoint, RestorePointDetail, RestorePointImage};

use crate::context::Context;
use crate::error::BackupError;
use crate::metadata::metadata_image_name;

/// A VM on the hypervisor side, passed in only when the caller also wants
/// restore-point operations to touch the matching hypervisor snapshot
/// (spec §4.7: "hypervisor presence is looked up only if a backup
/// collaborator is available").
pub struct HypervisorVmRef<'a> {
    pub node: &'a str,
    pub vmid: u64,
}

/// `listRestorePoints`: every snapshot on the VM's metadata image, sorted
/// ascending by timestamp (spec §4.7).
pub async fn list_restore_points(ctx: &Context, vm_uuid: &str) -> Result<Vec<RestorePoint>, BackupError> {
    let backup_pool = ctx.backup_pool();
    let image = metadata_image_name(vm_uuid);
    let snapshots = ctx
        .backup
        .list_snapshots(backup_pool, &image)
        .await
        .map_err(BackupError::Other)?;

    let mut points = Vec::with_capacity(snapshots.len());
    for s in snapshots {
        let timestamp = parse_rbd_timestamp(&s.timestamp).map_err(BackupError::Other)?;
        points.push(RestorePoint {
            image: format!("{backup_pool}/{image}"),
            name: s.name,
            timestamp,
        });
    }
    points.sort_by_key(|p| p.timestamp);
    Ok(points)
}

/// `restorePointDetail`: the restore point's timestamp (from the metadata
/// image's snapshot), whether the hypervisor still carries a same-named
/// snapshot (only checked if `hypervisor_vm` is given), and every
/// backup-pool image (metadata or data) that carries this restore point.
pub async fn restore_point_detail(
    ctx: &Context,
    vm_uuid: &str,
    name: &str,
    hypervisor_vm: Option<HypervisorVmRef<'_>>,
) -> Result<RestorePointDetail, BackupError> {
    let backup_pool = ctx.backup_pool();
    let metadata_image = metadata_image_name(vm_uuid);

    let metadata_snapshots = ctx
        .backup
        .list_snapshots(backup_pool, &metadata_image)
        .await
        .map_err(BackupError::Other)?;
    let metadata_snapshot = metadata_snapshots
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| BackupError::Other(anyhow::anyhow!("restore point {name} not found for vm {vm_uuid}")))?;
    let timestamp = parse_rbd_timestamp(&metadata_snapshot.timestamp).map_err(BackupError::Other)?;

    let has_hypervisor_snapshot = match hypervisor_vm {
        Some(vm_ref) => ctx
            .hypervisor
            .list_snapshots(vm_ref.node, vm_ref.vmid)
            .await
            .map_err(BackupError::Other)?
            .iter()
            .any(|s| s.name == name),
        None => false,
    };

    let mut images = Vec::new();
    for image in ctx.backup.list_images(backup_pool).await.map_err(BackupError::Other)? {
        if !image.contains(vm_uuid) {
            continue;
        }
        let snapshots = ctx
            .backup
            .list_snapshots(backup_pool, &image)
            .await
            .map_err(BackupError::Other)?;
        if snapshots.iter().any(|s| s.name == name) {
            images.push(RestorePointImage {
                image,
                name: name.to_string(),
            });
        }
    }

    Ok(RestorePointDetail {
        timestamp,
        has_hypervisor_snapshot,
        images,
    })
}

/// Filter set for `removeRestorePoint` (spec §4.7). At least one field must
/// be set; if `vm_uuid` is set, at least one of `name`/`age`/`regex` must
/// accompany it. Multiple set filters compose by AND.
#[derive(Debug, Default, Clone)]
pub struct RemoveRestorePointFilter {
    pub vm_uuid: Option<String>,
    pub name: Option<String>,
    pub age: Option<String>,
    pub regex: Option<String>,
}

impl RemoveRestorePointFilter {
    fn validate(&self) -> Result<(), BackupError> {
        if self.vm_uuid.is_none() && self.name.is_none() && self.age.is_none() && self.regex.is_none() {
            return Err(BackupError::Argument(
                "removeRestorePoint requires at least one of vm_uuid/name/age/regex".to_string(),
            ));
        }
        if self.vm_uuid.is_some() && self.name.is_none() && self.age.is_none() && self.regex.is_none() {
            return Err(BackupError::Argument(
                "vm_uuid alone is not enough to remove a restore point; supply name, age or regex too"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// `removeRestorePoint`: iterate backup-pool images (optionally restricted
/// to those naming `vm_uuid`), select snapshots matching every supplied
/// filter, and remove them. If a hypervisor VM reference is supplied and
/// `vm_uuid` is set, also best-effort remove the matching hypervisor
/// snapshot. Returns the number of block-store snapshots removed.
pub async fn remove_restore_points(
    ctx: &Context,
    filter: &RemoveRestorePointFilter,
    hypervisor_vm: Option<HypervisorVmRef<'_>>,
) -> Result<usize, BackupError> {
    filter.validate()?;

    let now = proxmox_time::epoch_i64();
    let max_age = filter
        .age
        .as_deref()
        .map(parse_duration)
        .transpose()
        .map_err(BackupError::Other)?;
    let regex = filter
        .regex
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| BackupError::Argument(format!("invalid regex: {e}")))?;

    let backup_pool = ctx.backup_pool();
    let mut removed = 0usize;
    let mut removed_names = Vec::new();

    for image in ctx.backup.list_images(backup_pool).await.map_err(BackupError::Other)? {
        if let Some(vm_uuid) = &filter.vm_uuid {
            if !image.contains(vm_uuid.as_str()) {
                continue;
            }
        }

        let snapshots = ctx
            .backup
            .list_snapshots(backup_pool, &image)
            .await
            .map_err(BackupError::Other)?;

        for snapshot in snapshots {
            if let Some(name) = &filter.name {
                if &snapshot.name != name {
                    continue;
                }
            }
            if let Some(max_age) = max_age {
                let snap_time = parse_rbd_timestamp(&snapshot.timestamp).map_err(BackupError::Other)?;
                if snap_time >= now - max_age {
                    continue;
                }
            }
            if let Some(regex) = &regex {
                if !regex.is_match(&snapshot.name) {
                    continue;
                }
            }

            ctx.backup
                .remove_snapshot(backup_pool, &image, &snapshot.name)
                .await
                .map_err(BackupError::Other)?;
            removed += 1;
            removed_names.push(snapshot.name);
        }
    }

    if let (Some(_), Some(vm_ref)) = (&filter.vm_uuid, hypervisor_vm) {
        let vmid = vm_ref.vmid;
        for name in &removed_names {
            if let Err(err) = ctx.hypervisor.remove_snapshot(vm_ref.node, vmid, name).await {
                log::error!("failed to remove hypervisor snapshot {name} for vm {vmid}: {err:#}");
            }
        }
    }

    Ok(removed)
}

/// `removeBackup`: delete every backup-pool image (metadata and data) whose
/// name contains `vm_uuid`.
pub async fn remove_backup(ctx: &Context, vm_uuid: &str) -> Result<usize, BackupError> {
    let backup_pool = ctx.backup_pool();
    let mut removed = 0usize;
    for image in ctx.backup.list_images(backup_pool).await.map_err(BackupError::Other)? {
        if !image.contains(vm_uuid) {
            continue;
        }
        ctx.backup
            .remove_image(backup_pool, &image)
            .await
            .map_err(BackupError::Other)?;
        removed += 1;
    }
    Ok(removed)
}
