use rbdbkp_api_types::Config;
use rbdbkp_pve::HypervisorDriver;
use rbdbkp_rbd::{BlockStoreDriver, Shell};

/// Everything one CLI invocation needs, bundled by reference so
/// [`crate::engine::BackupEngine`] and [`crate::restore_point::RestorePointManager`]
/// can both borrow it without holding a reference to each other (see the
/// "cyclic references" design note: both are stateless services over a
/// shared context, not objects that pass `self` to one another).
pub struct Context {
    pub config: Config,
    /// Block-store driver for the backup host (local `rbd`/`ceph` shell).
    pub backup: BlockStoreDriver,
    /// Block-store driver for the source cluster, reached over the ssh
    /// transport; used by the snapshot coordinator's convergence poll and
    /// by the STREAM step's export side.
    pub source: BlockStoreDriver,
    /// The bare shell to the source cluster, for the streaming pipeline
    /// which builds its own `bash -c` script rather than going through
    /// `BlockStoreDriver`.
    pub source_shell: Shell,
    pub hypervisor: HypervisorDriver,
    /// Effective snapshot-name prefix for this run: the CLI's
    /// `--snapshot_name_prefix` override if given, else
    /// `config.global.snapshot_name_prefix`.
    pub snapshot_name_prefix: String,
}

impl Context {
    pub fn new(
        config: Config,
        backup: BlockStoreDriver,
        source: BlockStoreDriver,
        source_shell: Shell,
        hypervisor: HypervisorDriver,
        snapshot_name_prefix_override: Option<String>,
    ) -> Self {
        let snapshot_name_prefix = snapshot_name_prefix_override
            .unwrap_or_else(|| config.global.snapshot_name_prefix.clone());
        Self {
            config,
            backup,
            source,
            source_shell,
            hypervisor,
            snapshot_name_prefix,
        }
    }

    pub fn backup_pool(&self) -> &str {
        &self.config.global.ceph_backup_pool
    }
}
