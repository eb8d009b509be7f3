//! `restore-point list|info|remove`.

use anyhow::Error;
use serde_json::{json, Value};

use proxmox_router::cli::{
    format_and_print_result, get_output_format, CliCommand, CliCommandMap, CommandLineInterface,
    OUTPUT_FORMAT,
};
use proxmox_schema::api;

use rbdbkp_core::restore_point::{
    list_restore_points, remove_restore_points, restore_point_detail, HypervisorVmRef,
    RemoveRestorePointFilter,
};

use crate::setup::build_context;
use crate::target::enumerate_all_vms;

/// Looks up the hypervisor node/vmid for `vm_uuid`, if that VM still
/// exists there. `restore_point_detail`/`remove_restore_points` only
/// touch the hypervisor-side snapshot when this is `Some`.
async fn hypervisor_ref(
    ctx: &rbdbkp_core::Context,
    vm_uuid: &str,
) -> Result<Option<(String, u64)>, Error> {
    let targets = enumerate_all_vms(ctx).await?;
    Ok(targets
        .into_iter()
        .find(|t| t.vm_uuid == vm_uuid)
        .map(|t| (t.node, t.summary.id)))
}

#[api(
    input: {
        properties: {
            "vm-uuid": {
                type: String,
                description: "VM uuid.",
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
/// List every restore point of a VM, ascending by timestamp.
async fn restore_point_list(param: Value) -> Result<Value, Error> {
    let output_format = get_output_format(&param);
    let ctx = build_context(&param, None)?;
    let vm_uuid = param["vm-uuid"].as_str().unwrap_or_default();

    let points = list_restore_points(&ctx, vm_uuid).await?;
    let rows: Vec<Value> = points
        .iter()
        .map(|p| json!({ "name": p.name, "timestamp": p.timestamp, "image": p.image }))
        .collect();
    let result = Value::Array(rows);

    if output_format == "text" {
        for point in &points {
            let when = proxmox_time::strftime_local("%c", point.timestamp)
                .unwrap_or_else(|_| point.timestamp.to_string());
            println!("{} {}", point.name, when);
        }
    } else {
        format_and_print_result(&result, &output_format);
    }

    Ok(Value::Null)
}

#[api(
    input: {
        properties: {
            "vm-uuid": {
                type: String,
                description: "VM uuid.",
            },
            name: {
                type: String,
                description: "Restore point name.",
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
/// Describe one restore point: its timestamp, whether the hypervisor
/// still carries a matching snapshot, and every backup-pool image it
/// touches.
async fn restore_point_info(param: Value) -> Result<Value, Error> {
    let output_format = get_output_format(&param);
    let ctx = build_context(&param, None)?;
    let vm_uuid = param["vm-uuid"].as_str().unwrap_or_default();
    let name = param["name"].as_str().unwrap_or_default();

    let hv = hypervisor_ref(&ctx, vm_uuid).await?;
    let hypervisor_vm = hv.as_ref().map(|(node, vmid)| HypervisorVmRef {
        node: node.as_str(),
        vmid: *vmid,
    });

    let detail = restore_point_detail(&ctx, vm_uuid, name, hypervisor_vm).await?;
    let result = json!({
        "timestamp": detail.timestamp,
        "has_hypervisor_snapshot": detail.has_hypervisor_snapshot,
        "images": detail.images.iter().map(|i| &i.image).collect::<Vec<_>>(),
    });

    if output_format == "text" {
        let when = proxmox_time::strftime_local("%c", detail.timestamp)
            .unwrap_or_else(|_| detail.timestamp.to_string());
        println!("timestamp: {when}");
        println!("hypervisor snapshot present: {}", detail.has_hypervisor_snapshot);
        println!("images:");
        for image in &detail.images {
            println!("  {}", image.image);
        }
    } else {
        format_and_print_result(&result, &output_format);
    }

    Ok(Value::Null)
}

#[api(
    input: {
        properties: {
            "vm-uuid": {
                type: String,
                description: "Restrict removal to this VM uuid.",
                optional: true,
            },
            "restore-point": {
                type: Array,
                description: "Restore point name(s) to remove.",
                optional: true,
                items: {
                    type: String,
                    description: "Restore point name.",
                },
            },
            age: {
                type: String,
                description: "Remove restore points older than this duration (e.g. 30d, 1y).",
                optional: true,
            },
            "match": {
                type: String,
                description: "Remove restore points whose name matches this regex.",
                optional: true,
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
/// Remove restore points matching every supplied filter (vm uuid, name(s),
/// age, regex compose by AND). At least one filter beyond `vm-uuid` alone
/// is required.
async fn restore_point_remove(param: Value) -> Result<Value, Error> {
    let output_format = get_output_format(&param);
    let ctx = build_context(&param, None)?;

    let vm_uuid = param["vm-uuid"].as_str().map(str::to_string);
    let age = param["age"].as_str().map(str::to_string);
    let regex = param["match"].as_str().map(str::to_string);
    let names: Vec<String> = param["restore-point"]
        .as_array()
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let hv = match &vm_uuid {
        Some(uuid) => hypervisor_ref(&ctx, uuid).await?,
        None => None,
    };

    let mut removed = 0usize;
    if names.is_empty() {
        let filter = RemoveRestorePointFilter {
            vm_uuid: vm_uuid.clone(),
            name: None,
            age: age.clone(),
            regex: regex.clone(),
        };
        let hypervisor_vm = hv
            .as_ref()
            .map(|(node, vmid)| HypervisorVmRef { node: node.as_str(), vmid: *vmid });
        removed += remove_restore_points(&ctx, &filter, hypervisor_vm).await?;
    } else {
        for name in &names {
            let filter = RemoveRestorePointFilter {
                vm_uuid: vm_uuid.clone(),
                name: Some(name.clone()),
                age: age.clone(),
                regex: regex.clone(),
            };
            let hypervisor_vm = hv
                .as_ref()
                .map(|(node, vmid)| HypervisorVmRef { node: node.as_str(), vmid: *vmid });
            removed += remove_restore_points(&ctx, &filter, hypervisor_vm).await?;
        }
    }

    let result = json!({ "removed": removed });
    if output_format == "text" {
        println!("removed {removed} restore point snapshot(s)");
    } else {
        format_and_print_result(&result, &output_format);
    }

    Ok(Value::Null)
}

pub fn restore_point_commands() -> CommandLineInterface {
    CliCommandMap::new()
        .insert(
            "list",
            CliCommand::new(&API_METHOD_RESTORE_POINT_LIST).arg_param(&["vm-uuid"]),
        )
        .insert(
            "info",
            CliCommand::new(&API_METHOD_RESTORE_POINT_INFO).arg_param(&["vm-uuid", "name"]),
        )
        .insert("remove", CliCommand::new(&API_METHOD_RESTORE_POINT_REMOVE))
        .into()
}
