use rbdbkp_api_types::snapshot::generate_snapshot_name;
use rbdbkp_api_types::{HypervisorSnapshot, Vm, VmSummary};
use rbdbkp_rbd::{run_stream, StreamRequest};

use crate::context::Context;
use crate::error::BackupError;
use crate::metadata::refresh_metadata_image;
use crate::vm_resolver::resolve_vm;

/// Fixed, human-recognizable marker for automated hypervisor snapshots
/// (spec §4.6 step 5 / SPEC_FULL §4.6 addendum).
pub const SNAPSHOT_DESCRIPTION_MARKER: &str =
    "!!!DO NOT REMOVE!!!automated snapshot by rbd-backup. !!!DO NOT REMOVE!!!";

const SYNTHETIC_CURRENT: &str = "current";

/// Result of running the state machine for one VM.
#[derive(Debug)]
pub enum VmOutcome {
    Done { vm_uuid: String, snapshot_name: String },
    Skipped { vm_uuid: String, reason: String },
    Failed { vm_uuid: String, error: BackupError },
}

/// Aggregate result of a `backup run` invocation (spec §4.6, run-level
/// failure handling): per-VM failures never abort the run, but if any VM
/// failed, the caller sees the most recent failure once all VMs are done.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<VmOutcome>,
}

impl RunReport {
    pub fn push(&mut self, outcome: VmOutcome) {
        self.outcomes.push(outcome);
    }

    /// Re-raises the most recent per-VM failure, matching "at the end of
    /// the run re-raise the most recent failure" (spec §4.6).
    pub fn into_result(self) -> Result<Self, BackupError> {
        let last_failure = self
            .outcomes
            .iter()
            .rev()
            .find_map(|o| match o {
                VmOutcome::Failed { error, .. } => Some(error.to_string()),
                _ => None,
            });
        match last_failure {
            Some(message) => Err(BackupError::Other(anyhow::anyhow!(message))),
            None => Ok(self),
        }
    }
}

enum BackupMode {
    Initial,
    Incremental { anchor: String, anchor_matches_prefix: bool },
}

/// Runs the full per-VM state machine (spec §4.6) for one VM summary,
/// resolving it fresh from the hypervisor's current pending config.
pub async fn run_vm_backup(
    ctx: &Context,
    node: &str,
    summary: &VmSummary,
    ignore_disks: &[String],
    allow_using_any_existing_snapshot: bool,
) -> VmOutcome {
    match run_vm_backup_inner(ctx, node, summary, ignore_disks, allow_using_any_existing_snapshot).await {
        Ok(Some((vm_uuid, snapshot_name))) => VmOutcome::Done { vm_uuid, snapshot_name },
        Ok(None) => VmOutcome::Skipped {
            vm_uuid: summary.id.to_string(),
            reason: "snapshot feature unavailable".to_string(),
        },
        Err(error) => VmOutcome::Failed {
            vm_uuid: summary.id.to_string(),
            error,
        },
    }
}

async fn run_vm_backup_inner(
    ctx: &Context,
    node: &str,
    summary: &VmSummary,
    ignore_disks: &[String],
    allow_using_any_existing_snapshot: bool,
) -> Result<Option<(String, String)>, BackupError> {
    // RESOLVE
    let pending_config = ctx.hypervisor.pending_config(node, summary.id).await?;
    let storages: Vec<_> = ctx
        .hypervisor
        .list_storages(Some("rbd"))
        .await?
        .into_iter()
        .filter(|s| s.storage_type.is_rbd() && s.holds_disk_images())
        .filter(|s| !ctx.config.global.ignore_storages.iter().any(|i| i == &s.name))
        .collect();
    let vm = resolve_vm(summary, node, &pending_config, &storages, ignore_disks)?;
    log::info!("resolved {vm}");

    // FEATURE_CHECK (performed before the metadata refresh and anchor
    // inspection, since there is no point writing metadata for a VM we
    // are about to skip).
    if !ctx.hypervisor.feature_available("snapshot", node, vm.id).await? {
        log::warn!("{}", BackupError::FeatureUnavailable { vm: vm.to_string() });
        return Ok(None);
    }

    // ANCHOR
    let hypervisor_snapshots = ctx.hypervisor.list_snapshots(node, vm.id).await?;
    let mode = select_anchor(&hypervisor_snapshots, &ctx.snapshot_name_prefix, allow_using_any_existing_snapshot);
    if let BackupMode::Incremental { ref anchor, .. } = mode {
        log::info!("{vm}: incremental backup, anchor snapshot {anchor}");
    } else {
        log::info!("{vm}: no usable anchor snapshot, initial (full) backup");
    }

    // METADATA
    let snapshot_name = generate_snapshot_name(&ctx.snapshot_name_prefix);
    refresh_metadata_image(ctx, &vm, &snapshot_name).await?;

    // SNAPSHOT (+ coordinator convergence wait)
    crate::coordinator::create_and_converge(ctx, &vm, &snapshot_name, SNAPSHOT_DESCRIPTION_MARKER).await?;

    // STREAM + VERIFY
    let backup_pool = ctx.backup_pool().to_string();
    for disk in &vm.rbd_disks {
        let source_image = disk.to_block_image();
        let backup_image = format!("{}-{}-{}", vm.uuid, source_image.pool, source_image.image);

        let (incremental_from, compress) = match &mode {
            BackupMode::Initial => (None, ctx.config.global.enable_transport_compression_initial),
            BackupMode::Incremental { anchor, .. } => {
                // The hypervisor side resolved `anchor` from its own
                // snapshot list; confirm it is also still present on this
                // disk's backup image before handing it to `export-diff`,
                // since a restore point removed from the backup pool out of
                // band would otherwise only surface as an opaque transport
                // failure.
                let found = ctx
                    .backup
                    .list_snapshots_by_prefix(&backup_pool, &backup_image, anchor, None)
                    .await
                    .map_err(BackupError::Other)?;
                if !found.iter().any(|s| s.name == *anchor) {
                    return Err(BackupError::MissingAnchor { vm: vm.to_string() });
                }
                (Some(anchor.as_str()), ctx.config.global.enable_transport_compression_incremental)
            }
        };

        let request = StreamRequest {
            source_pool: &source_image.pool,
            source_image: &source_image.image,
            snapshot_name: &snapshot_name,
            backup_pool: &backup_pool,
            backup_image: &backup_image,
            incremental_from,
            compress,
            whole_object: !ctx.config.global.enable_intra_object_delta_transfer,
        };
        run_stream(&ctx.backup, &ctx.source_shell, &request)
            .await
            .map_err(|e| BackupError::TransportFailure(e.to_string()))?;

        // `rbd import-diff` creates the backup snapshot implicitly as part
        // of applying the diff; a full `rbd import` does not, so the
        // initial-backup image needs it created explicitly here before
        // VERIFY looks for it (spec §4.6 step 6).
        if matches!(mode, BackupMode::Initial) {
            ctx.backup
                .create_snapshot(&backup_pool, &backup_image, &ctx.snapshot_name_prefix, Some(&snapshot_name))
                .await
                .map_err(BackupError::Other)?;
        }

        verify(ctx, &backup_pool, &backup_image, &snapshot_name).await?;
    }

    // PRUNE
    if let BackupMode::Incremental { anchor, anchor_matches_prefix: true } = mode {
        prune_anchor(ctx, node, &vm, &anchor).await;
    }

    log::info!("{vm}: backup complete, restore point {snapshot_name}");
    Ok(Some((vm.uuid, snapshot_name)))
}

/// Selects the backup mode per spec §4.6 step 3: the candidate set is
/// *matching* (names starting with the active prefix) unless
/// `allow_using_any_existing_snapshot` widens it to *any* non-synthetic
/// snapshot. The most recent entry (by `snaptime`) in that set becomes the
/// anchor; `anchor_matches_prefix` is remembered independent of which set
/// was searched, since PRUNE only ever removes a prefix-matching anchor.
///
/// *InconsistentState* (spec §7): if more than one snapshot matches the
/// candidate set, that is ambiguous — this engine resolves it the way
/// later revisions of the original tool do, by logging the ambiguity and
/// silently continuing with the most recent entry as anchor (DESIGN.md,
/// Open Question i), rather than raising and demanding manual repair.
fn select_anchor(
    snapshots: &[HypervisorSnapshot],
    prefix: &str,
    allow_using_any_existing_snapshot: bool,
) -> BackupMode {
    let real: Vec<&HypervisorSnapshot> =
        snapshots.iter().filter(|s| !s.is_synthetic_current()).collect();

    let candidates: Vec<&&HypervisorSnapshot> = real
        .iter()
        .filter(|s| allow_using_any_existing_snapshot || s.name.starts_with(prefix))
        .collect();

    if candidates.len() > 1 {
        log::warn!(
            "{} candidate anchor snapshots found (ambiguous); using the most recent",
            candidates.len()
        );
    }

    match candidates
        .into_iter()
        .max_by_key(|s| s.snaptime.unwrap_or(i64::MIN))
    {
        None => BackupMode::Initial,
        Some(anchor) => BackupMode::Incremental {
            anchor: anchor.name.clone(),
            anchor_matches_prefix: anchor.name.starts_with(prefix),
        },
    }
}

async fn verify(
    ctx: &Context,
    backup_pool: &str,
    backup_image: &str,
    snapshot_name: &str,
) -> Result<(), BackupError> {
    let snapshots = ctx
        .backup
        .list_snapshots_by_prefix(backup_pool, backup_image, snapshot_name, None)
        .await
        .map_err(BackupError::Other)?;
    if snapshots.iter().any(|s| s.name == snapshot_name) {
        Ok(())
    } else {
        Err(BackupError::Other(anyhow::anyhow!(
            "verification failed: {backup_pool}/{backup_image}@{snapshot_name} not found after transfer"
        )))
    }
}

async fn prune_anchor(ctx: &Context, node: &str, vm: &Vm, anchor: &str) {
    log::info!("{vm}: pruning superseded anchor snapshot {anchor}");
    if let Err(err) = ctx.hypervisor.remove_snapshot(node, vm.id, anchor).await {
        log::error!("failed to prune anchor snapshot {anchor} for {vm}: {err:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(name: &str, snaptime: Option<i64>) -> HypervisorSnapshot {
        HypervisorSnapshot {
            name: name.to_string(),
            parent: None,
            snaptime,
            description: String::new(),
        }
    }

    #[test]
    fn no_snapshots_is_initial() {
        assert!(matches!(select_anchor(&[], "bkp_", false), BackupMode::Initial));
    }

    #[test]
    fn picks_most_recent_matching_prefix() {
        let snapshots = vec![
            snap(SYNTHETIC_CURRENT, None),
            snap("bkp_aaaa", Some(100)),
            snap("bkp_bbbb", Some(200)),
            snap("manual-snap", Some(300)),
        ];
        match select_anchor(&snapshots, "bkp_", false) {
            BackupMode::Incremental { anchor, anchor_matches_prefix } => {
                assert_eq!(anchor, "bkp_bbbb");
                assert!(anchor_matches_prefix);
            }
            BackupMode::Initial => panic!("expected incremental"),
        }
    }

    #[test]
    fn allow_any_widens_to_non_matching_snapshot() {
        let snapshots = vec![snap(SYNTHETIC_CURRENT, None), snap("manual-snap", Some(300))];
        match select_anchor(&snapshots, "bkp_", true) {
            BackupMode::Incremental { anchor, anchor_matches_prefix } => {
                assert_eq!(anchor, "manual-snap");
                assert!(!anchor_matches_prefix);
            }
            BackupMode::Initial => panic!("expected incremental"),
        }
    }
}
