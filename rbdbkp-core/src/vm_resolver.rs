use std::collections::BTreeSet;

use regex::Regex;

use rbdbkp_api_types::{Disk, Storage, Vm, VmSummary};

use crate::error::BackupError;

/// `(scsi|sata|ide|virtio|efidisk)<digit>`. Deliberately does not match
/// `unused<digit>`, which names a `storage:image` pair too but is never a
/// backup target (spec §4.4).
fn disk_key_regex() -> Regex {
    Regex::new(r"^(scsi|sata|ide|virtio|efidisk)\d+$").unwrap()
}

/// Extract the GUID out of a `smbios1=uuid=...,...` config value.
fn extract_smbios_uuid(value: &str) -> Option<String> {
    value
        .split(',')
        .find_map(|part| part.strip_prefix("uuid="))
        .map(|s| s.to_string())
}

/// Parse a `storage_name:image[,opt=val,...]` disk value against the
/// caller-supplied (already RBD-filtered) storage list.
fn parse_disk_value(value: &str, storages: &[Storage]) -> Option<Disk> {
    let spec = value.split(',').next()?;
    let (storage_name, image) = spec.split_once(':')?;
    let storage = storages.iter().find(|s| s.name == storage_name)?;
    Some(Disk::new(storage.clone(), image))
}

/// Build a fully resolved [`Vm`] from the hypervisor's pending-config list
/// (spec §4.4). `storages` must already be filtered to RBD storages that
/// advertise disk images (spec §3); disks on any other storage are not
/// backup candidates and are silently skipped, matching the original's
/// per-storage prefix match.
///
/// Requires `vm.uuid` to be present in `smbios1`; returns
/// [`BackupError::MissingUuid`] before any disk walk if it is not, per the
/// invariant in spec §3/§4.4.
pub fn resolve_vm(
    summary: &VmSummary,
    node: &str,
    pending_config: &[(String, String)],
    storages: &[Storage],
    ignore_disks: &[String],
) -> Result<Vm, BackupError> {
    let disk_key = disk_key_regex();

    let mut uuid = None;
    let mut disks = BTreeSet::new();
    for (key, value) in pending_config {
        if key == "digest" {
            continue;
        }
        if key == "smbios1" {
            uuid = extract_smbios_uuid(value);
        } else if disk_key.is_match(key) {
            if let Some(disk) = parse_disk_value(value, storages) {
                disks.insert(disk);
            }
        }
    }

    let uuid = uuid.ok_or(BackupError::MissingUuid { vmid: summary.id })?;

    for ignore in ignore_disks {
        disks.retain(|d| &d.ignore_key() != ignore);
    }

    let config = serialize_config(pending_config);

    Ok(Vm {
        id: summary.id,
        uuid,
        name: summary.name.clone(),
        node: node.to_string(),
        running: summary.status == "running",
        config,
        rbd_disks: disks,
    })
}

/// `#`-prefixed description header block, then `key: value\n` lines
/// key-sorted, `digest` excluded — the exact text written into the
/// metadata image's `.conf` file (spec §4.4).
fn serialize_config(pending_config: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> =
        pending_config.iter().filter(|(k, _)| k != "digest").collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut description = String::new();
    let mut body = String::new();
    for (key, value) in sorted {
        if key == "description" {
            for line in value.split('\n') {
                description.push('#');
                description.push_str(line);
                description.push('\n');
            }
        } else {
            body.push_str(key);
            body.push_str(": ");
            body.push_str(value);
            body.push('\n');
        }
    }
    format!("{description}{body}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbdbkp_api_types::StorageType;

    fn rbd_storage(name: &str, pool: &str) -> Storage {
        Storage {
            name: name.to_string(),
            storage_type: StorageType::Rbd,
            pool: pool.to_string(),
            shared: true,
            krbd: false,
            content: "images".to_string(),
            digest: String::new(),
        }
    }

    fn summary() -> VmSummary {
        VmSummary {
            id: 100,
            name: "test".to_string(),
            status: "running".to_string(),
        }
    }

    #[test]
    fn resolves_disks_and_uuid() {
        let storages = vec![rbd_storage("local-rbd", "rbd")];
        let config = vec![
            ("digest".to_string(), "abc123".to_string()),
            (
                "smbios1".to_string(),
                "uuid=351df712-e9ab-4457-8178-0f663d218e97,base64=1".to_string(),
            ),
            (
                "scsi0".to_string(),
                "local-rbd:vm-100-disk-0,size=32G".to_string(),
            ),
            ("unused0".to_string(), "local-rbd:vm-100-disk-1".to_string()),
            ("description".to_string(), "hello\nworld".to_string()),
        ];

        let vm = resolve_vm(&summary(), "pve1", &config, &storages, &[]).unwrap();
        assert_eq!(vm.uuid, "351df712-e9ab-4457-8178-0f663d218e97");
        assert_eq!(vm.rbd_disks.len(), 1);
        assert!(vm.config.starts_with("#hello\n#world\n"));
        assert!(!vm.config.contains("digest"));
        assert!(vm.config.contains("scsi0: local-rbd:vm-100-disk-0,size=32G\n"));
    }

    #[test]
    fn ignore_disks_removes_matching_disk() {
        let storages = vec![rbd_storage("local-rbd", "rbd")];
        let config = vec![
            ("smbios1".to_string(), "uuid=351df712-e9ab-4457-8178-0f663d218e97".to_string()),
            ("scsi0".to_string(), "local-rbd:vm-100-disk-0".to_string()),
            ("scsi1".to_string(), "local-rbd:vm-100-disk-1".to_string()),
        ];
        let vm = resolve_vm(
            &summary(),
            "pve1",
            &config,
            &storages,
            &["local-rbd/vm-100-disk-1".to_string()],
        )
        .unwrap();
        assert_eq!(vm.rbd_disks.len(), 1);
        assert_eq!(vm.rbd_disks.iter().next().unwrap().image, "vm-100-disk-0");
    }

    #[test]
    fn missing_uuid_is_an_error() {
        let config = vec![("scsi0".to_string(), "local-rbd:vm-100-disk-0".to_string())];
        let err = resolve_vm(&summary(), "pve1", &config, &[], &[]).unwrap_err();
        assert!(matches!(err, BackupError::MissingUuid { vmid: 100 }));
    }
}
