//! `backup run|list|remove`.

use anyhow::Error;
use serde_json::{json, Value};

use proxmox_router::cli::{
    format_and_print_result, get_output_format, CliCommand, CliCommandMap, CommandLineInterface,
    OUTPUT_FORMAT,
};
use proxmox_schema::api;

use rbdbkp_api_types::is_guid;
use rbdbkp_core::{RunReport, VmOutcome};

use crate::setup::build_context;
use crate::target::{enumerate_all_vms, filter_targets};

#[api(
    input: {
        properties: {
            vm_uuid: {
                type: Array,
                description: "Restrict the run to these VM uuids.",
                optional: true,
                items: {
                    type: String,
                    description: "VM uuid.",
                },
            },
            "match": {
                type: String,
                description: "Only back up VMs whose name matches this regex.",
                optional: true,
            },
            snapshot_name_prefix: {
                type: String,
                description: "Override the configured snapshot name prefix for this run.",
                optional: true,
            },
            allow_using_any_existing_snapshot: {
                type: Boolean,
                description: "Accept any existing hypervisor snapshot as the incremental anchor, not just ones this tool created.",
                optional: true,
                default: false,
            },
            config: {
                type: String,
                description: "Path to rbd-backup.conf (defaults to the installed config).",
                optional: true,
            },
            verbose: {
                type: Boolean,
                description: "Enable debug logging regardless of the configured log_level.",
                optional: true,
                default: false,
            },
            "output-format": {
                schema: OUTPUT_FORMAT,
                optional: true,
            },
        }
    }
)]
/// Back up every matching VM: resolve its disks, snapshot, stream full or
/// incremental into the backup pool, verify, and prune the prior anchor.
async fn backup_run(param: Value, allow_using_any_existing_snapshot: bool) -> Result<Value, Error> {
    let output_format = get_output_format(&param);
    let prefix = param["snapshot_name_prefix"].as_str().map(str::to_string);
    let ctx = build_context(&param, prefix)?;

    let vm_uuids = string_array(&param, "vm_uuid");
    let pattern = param["match"].as_str();

    let all = enumerate_all_vms(&ctx).await?;
    let targets = filter_targets(&ctx, all, &vm_uuids, pattern)?;

    let mut report = RunReport::default();
    for target in &targets {
        let outcome = rbdbkp_core::run_vm_backup(
            &ctx,
            &target.node,
            &target.summary,
            &target.ignore_disks,
            allow_using_any_existing_snapshot,
        )
        .await;
        log_outcome(&outcome);
        report.push(outcome);
    }

    let rows: Vec<Value> = report
        .outcomes
        .iter()
        .map(outcome_to_json)
        .collect();
    let result = Value::Array(rows);

    report.into_result()?;

    if output_format == "text" {
        for row in result.as_array().unwrap_or(&Vec::new()) {
            println!(
                "{}: {} {}",
                row["vm_uuid"].as_str().unwrap_or("?"),
                row["status"].as_str().unwrap_or("?"),
                row["detail"].as_str().unwrap_or("")
            );
        }
    } else {
        format_and_print_result(&result, &output_format);
    }

    Ok(Value::Null)
}

fn log_outcome(outcome: &VmOutcome) {
    match outcome {
        VmOutcome::Done { vm_uuid, snapshot_name } => {
            log::info!("vm {vm_uuid}: backed up as {snapshot_name}")
        }
        VmOutcome::Skipped { vm_uuid, reason } => log::warn!("vm {vm_uuid}: skipped ({reason})"),
        VmOutcome::Failed { vm_uuid, error } => log::error!("vm {vm_uuid}: failed: {error:#}"),
    }
}

fn outcome_to_json(outcome: &VmOutcome) -> Value {
    match outcome {
        VmOutcome::Done { vm_uuid, snapshot_name } => json!({
            "vm_uuid": vm_uuid,
            "status": "done",
            "detail": snapshot_name,
        }),
        VmOutcome::Skipped { vm_uuid, reason } => json!({
            "vm_uuid": vm_uuid,
            "status": "skipped",
            "detail": reason,
        }),
        VmOutcome::Failed { vm_uuid, error } => json!({
            "vm_uuid": vm_uuid,
            "status": "failed",
            "detail": error.to_string(),
        }),
    }
}

#[api(
    input: {
        properties: {
            config: {
                type: String,
                description: "Path to rbd-backup.conf (defaults to the installed config).",
                optional: true,
            },
            verbose: {
                type: Boolean,
                optional: true,
                default: false,
            },
            "output-format": {
                schema: OUTPUT_FORMAT,
                optional: true,
            },
        }
    }
)]
/// Tabular list of VMs with known backups (one row per metadata image in
/// the backup pool).
async fn backup_list(param: Value) -> Result<Value, Error> {
    let output_format = get_output_format(&param);
    let ctx = build_context(&param, None)?;
    let pool = ctx.backup_pool();

    let mut rows = Vec::new();
    for image in ctx.backup.list_images(pool).await? {
        let Some(uuid) = image.strip_suffix("_vm_metadata") else {
            continue;
        };
        if !is_guid(uuid) {
            continue;
        }

        let tags = ctx.backup.image_meta_list(pool, &image).await?;
        let restore_points = ctx.backup.list_snapshots(pool, &image).await?.len();

        rows.push(json!({
            "vm_uuid": uuid,
            "vm_id": tags.get("vm.id").cloned().unwrap_or_default(),
            "vm_name": tags.get("vm.name").cloned().unwrap_or_default(),
            "last_updated": tags.get("last_updated").cloned().unwrap_or_default(),
            "restore_points": restore_points,
        }));
    }

    let result = Value::Array(rows);
    if output_format == "text" {
        for row in result.as_array().unwrap_or(&Vec::new()) {
            println!(
                "{} {} ({} restore points, last updated {})",
                row["vm_uuid"].as_str().unwrap_or("?"),
                row["vm_name"].as_str().unwrap_or(""),
                row["restore_points"],
                row["last_updated"].as_str().unwrap_or("never"),
            );
        }
    } else {
        format_and_print_result(&result, &output_format);
    }

    Ok(Value::Null)
}

#[api(
    input: {
        properties: {
            vm_uuid: {
                type: Array,
                description: "Restrict removal to these VM uuids.",
                optional: true,
                items: {
                    type: String,
                    description: "VM uuid.",
                },
            },
            "match": {
                type: String,
                description: "Only remove VMs whose name matches this regex.",
                optional: true,
            },
            force: {
                type: Boolean,
                description: "Actually remove the matched backups (metadata image, data images and every restore point). Without this flag the command only reports what it would remove.",
                optional: true,
                default: false,
            },
            config: {
                type: String,
                description: "Path to rbd-backup.conf (defaults to the installed config).",
                optional: true,
            },
            verbose: {
                type: Boolean,
                optional: true,
                default: false,
            },
            "output-format": {
                schema: OUTPUT_FORMAT,
                optional: true,
            },
        }
    }
)]
/// Remove the entire backup (metadata and data images, every restore
/// point) of every matched VM still known to the hypervisor.
async fn backup_remove(param: Value, force: bool) -> Result<Value, Error> {
    let output_format = get_output_format(&param);
    let ctx = build_context(&param, None)?;

    let vm_uuids = string_array(&param, "vm_uuid");
    let pattern = param["match"].as_str();

    // Open question (ii): sources disagree on whether a bare `backup
    // remove` (no --vm_uuid, no --match) should be a no-op or an error.
    // We treat it as an error, since silently matching every VM known to
    // the hypervisor is too dangerous a default for a removal command.
    if vm_uuids.is_empty() && pattern.is_none() {
        anyhow::bail!("backup remove requires --vm_uuid and/or --match; refusing to match every VM");
    }

    let all = enumerate_all_vms(&ctx).await?;
    let targets = filter_targets(&ctx, all, &vm_uuids, pattern)?;

    if targets.is_empty() {
        anyhow::bail!("no VM matched the given vm_uuid/match selection");
    }

    let pool = ctx.backup_pool();
    let mut rows = Vec::new();
    for target in &targets {
        let image_count = ctx
            .backup
            .list_images(pool)
            .await?
            .into_iter()
            .filter(|i| i.contains(&target.vm_uuid))
            .count();

        if force {
            let removed = rbdbkp_core::restore_point::remove_backup(&ctx, &target.vm_uuid).await?;
            log::info!("vm {}: removed {removed} backup-pool images", target.vm_uuid);
            rows.push(json!({ "vm_uuid": target.vm_uuid, "removed_images": removed }));
        } else {
            log::info!(
                "vm {}: would remove {image_count} backup-pool images (pass --force)",
                target.vm_uuid
            );
            rows.push(json!({ "vm_uuid": target.vm_uuid, "would_remove_images": image_count }));
        }
    }

    let result = Value::Array(rows);
    if output_format != "text" {
        format_and_print_result(&result, &output_format);
    }

    Ok(Value::Null)
}

fn string_array(param: &Value, key: &str) -> Vec<String> {
    param[key]
        .as_array()
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

pub fn backup_commands() -> CommandLineInterface {
    CliCommandMap::new()
        .insert("run", CliCommand::new(&API_METHOD_BACKUP_RUN))
        .insert("list", CliCommand::new(&API_METHOD_BACKUP_LIST))
        .insert("remove", CliCommand::new(&API_METHOD_BACKUP_REMOVE))
        .into()
}
