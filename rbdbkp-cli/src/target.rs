//! Turns the hypervisor's VM inventory into the set of targets a `backup`
//! or `restore-point` subcommand should act on, applying the
//! `--vm_uuid`/`--match` selection the CLI surface offers on top of the
//! config file's per-VM ignore list.

use anyhow::Error;
use regex::Regex;

use rbdbkp_api_types::VmSummary;
use rbdbkp_core::vm_resolver::resolve_vm;
use rbdbkp_core::Context;

/// One VM resolved well enough to either run a backup against or list in
/// `backup list`: its node, hypervisor summary, uuid and effective
/// disk-ignore list.
pub struct ResolvedTarget {
    pub node: String,
    pub summary: VmSummary,
    pub vm_uuid: String,
    pub ignore_disks: Vec<String>,
}

/// Every VM on every node, resolved enough to know its uuid. VMs that fail
/// to resolve (missing SMBIOS uuid) are logged and skipped rather than
/// aborting the enumeration; `backup run` will hit the same error per-VM
/// and report it there if the caller didn't already filter it out.
pub async fn enumerate_all_vms(ctx: &Context) -> Result<Vec<ResolvedTarget>, Error> {
    let mut targets = Vec::new();

    for node in ctx.hypervisor.list_nodes().await? {
        let storages: Vec<_> = ctx
            .hypervisor
            .list_storages(Some("rbd"))
            .await?
            .into_iter()
            .filter(|s| s.storage_type.is_rbd() && s.holds_disk_images())
            .filter(|s| !ctx.config.global.ignore_storages.iter().any(|i| i == &s.name))
            .collect();

        for summary in ctx.hypervisor.list_vms(&node.id).await? {
            let pending_config = ctx.hypervisor.pending_config(&node.id, summary.id).await?;
            let ignore_disks = ctx
                .config
                .vm_section(&extract_uuid_hint(&pending_config))
                .map(|vm| vm.ignore_disks.clone())
                .unwrap_or_default();

            match resolve_vm(&summary, &node.id, &pending_config, &storages, &ignore_disks) {
                Ok(vm) => targets.push(ResolvedTarget {
                    node: node.id.clone(),
                    summary: summary.clone(),
                    vm_uuid: vm.uuid,
                    ignore_disks,
                }),
                Err(err) => {
                    log::warn!("skipping vm {} on node {}: {err:#}", summary.id, node.id);
                }
            }
        }
    }

    Ok(targets)
}

/// `ignore_disks` is keyed by uuid in the config, but the uuid is only
/// known after the resolve this very function feeds into; pull it out of
/// the raw `smbios1` line up front so the per-VM ignore list can be looked
/// up before calling [`resolve_vm`].
fn extract_uuid_hint(pending_config: &[(String, String)]) -> String {
    pending_config
        .iter()
        .find(|(k, _)| k == "smbios1")
        .and_then(|(_, v)| v.split(',').find_map(|p| p.strip_prefix("uuid=")))
        .unwrap_or_default()
        .to_string()
}

/// Applies the config file's `ignore = true` VMs, then an explicit
/// `--vm_uuid` allowlist (if non-empty), then a `--match` regex against the
/// VM name (if given).
pub fn filter_targets(
    ctx: &Context,
    all: Vec<ResolvedTarget>,
    vm_uuids: &[String],
    pattern: Option<&str>,
) -> Result<Vec<ResolvedTarget>, Error> {
    let ignored = ctx.config.ignored_vm_uuids();
    let name_re = pattern.map(Regex::new).transpose()?;

    Ok(all
        .into_iter()
        .filter(|t| !ignored.iter().any(|u| *u == t.vm_uuid))
        .filter(|t| vm_uuids.is_empty() || vm_uuids.iter().any(|u| u == &t.vm_uuid))
        .filter(|t| match &name_re {
            Some(re) => re.is_match(&t.summary.name),
            None => true,
        })
        .collect())
}
