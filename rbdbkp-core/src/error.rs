use thiserror::Error;

use rbdbkp_pve::HypervisorError;

/// The closed set of behavioral error kinds the orchestration engine
/// distinguishes (see the error taxonomy). Everything else (a plain `rbd`
/// invocation failing, a malformed JSON response, ...) surfaces as a wrapped
/// [`anyhow::Error`] via [`BackupError::Other`] rather than being forced
/// into one of these shapes.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Precondition on CLI/API inputs; fatal at entry, never per-VM.
    #[error("{0}")]
    Argument(String),

    /// Missing or malformed required configuration; fatal at startup.
    #[error("{0}")]
    Config(String),

    /// A bounded poll for snapshot appearance/disappearance ran out of
    /// tries. Fatal for the VM whose backup triggered it, not for the run.
    #[error("timed out waiting for {what} after {tries} tries")]
    ConvergenceTimeout { what: String, tries: u32 },

    /// A stage of the export/compress/import streaming pipeline exited
    /// non-zero. Fatal for the VM.
    #[error("transport pipeline failed: {0}")]
    TransportFailure(String),

    /// The hypervisor reports the `snapshot` feature unavailable for this
    /// VM right now. Not fatal: the VM is skipped with a warning.
    #[error("snapshot feature unavailable for vm {vm}")]
    FeatureUnavailable { vm: String },

    /// INCREMENTAL mode was selected but no anchor snapshot could be found.
    #[error("incremental backup selected for vm {vm} but no anchor snapshot exists")]
    MissingAnchor { vm: String },

    /// The VM's `smbios1` config line is present but has no `uuid=...`
    /// fragment, so the VM cannot be identified. Fatal for the VM.
    #[error("vm {vmid} has no uuid in its smbios1 config")]
    MissingUuid { vmid: u64 },

    /// Re-authenticated once after a session-expiry signal, but the retried
    /// request still failed.
    #[error("hypervisor session expired and could not be renewed: {0}")]
    SessionExpired(String),

    /// Any other failure, already carrying its own context.
    #[error(transparent)]
    Other(anyhow::Error),
}

impl From<anyhow::Error> for BackupError {
    /// A session that is still expired after the client's own one-shot
    /// renewal-and-retry (spec §4.2) surfaces here as a plain `anyhow::Error`
    /// wrapping `rbdbkp_pve::HypervisorError::SessionExpired`; this is
    /// recognized and re-tagged rather than falling into [`BackupError::Other`],
    /// so callers can distinguish it from an arbitrary failure.
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<HypervisorError>() {
            Ok(HypervisorError::SessionExpired) => BackupError::SessionExpired(
                "re-authenticated once but the retried request failed again".to_string(),
            ),
            Ok(other) => BackupError::Other(other.into()),
            Err(err) => BackupError::Other(err),
        }
    }
}

impl BackupError {
    /// True for kinds that should only skip one VM and let the run continue
    /// (as opposed to being a whole-run precondition failure).
    pub fn is_per_vm(&self) -> bool {
        !matches!(self, BackupError::Argument(_) | BackupError::Config(_))
    }
}
