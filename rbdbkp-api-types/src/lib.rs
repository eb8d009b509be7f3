//! Data model and wire/config schemas shared between the rbd-backup
//! driver crates, the orchestration engine and the CLI.

pub mod config;
pub mod disk;
pub mod duration;
pub mod node;
pub mod restore_point;
pub mod snapshot;
pub mod storage;
pub mod vm;

pub use config::{Config, GlobalConfig, LogLevel, VmSectionConfig};
pub use disk::{BlockImage, Disk};
pub use duration::parse_duration;
pub use node::Node;
pub use restore_point::{RestorePoint, RestorePointDetail, RestorePointImage};
pub use snapshot::{generate_snapshot_name, HypervisorSnapshot, SnapshotInfo};
pub use storage::{Storage, StorageType};
pub use vm::{Vm, VmSummary};

use proxmox_schema::{const_regex, ApiStringFormat, Schema, StringSchema};

const_regex! {
    /// SMBIOS system-uuid / VM UUID, also used as the per-VM config section id.
    pub GUID_REGEX = r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$";
}

pub const GUID_FORMAT: ApiStringFormat = ApiStringFormat::Pattern(&GUID_REGEX);

/// Plain (non-schema) GUID matcher, used for filtering image names returned
/// by the block-store driver (e.g. `{uuid}_vm_metadata`).
pub fn is_guid(value: &str) -> bool {
    GUID_REGEX.is_match(value)
}

pub const VM_UUID_SCHEMA: Schema = StringSchema::new("VM UUID (SMBIOS system-uuid).")
    .format(&GUID_FORMAT)
    .min_length(36)
    .max_length(36)
    .schema();

pub const SNAPSHOT_NAME_SCHEMA: Schema = StringSchema::new("Snapshot / restore point name.")
    .min_length(1)
    .max_length(255)
    .schema();
