//! Orchestration engine: resolves VMs and their disks, manages the per-VM
//! metadata image, coordinates hypervisor and source-cluster snapshots, and
//! runs the backup state machine and restore-point maintenance.

pub mod context;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod mount;
pub mod restore_point;
pub mod vm_resolver;

pub use context::Context;
pub use engine::{run_vm_backup, RunReport, VmOutcome, SNAPSHOT_DESCRIPTION_MARKER};
pub use error::BackupError;
