use thiserror::Error;

#[derive(Debug, Error)]
pub enum HypervisorError {
    /// The REST API answered 401; the caller should re-authenticate and
    /// retry the original request exactly once (spec §4.2).
    #[error("hypervisor session expired")]
    SessionExpired,

    /// A bounded poll (snapshot create/remove convergence) ran out of
    /// tries.
    #[error("timed out waiting for {what} after {tries} tries")]
    PollTimeout { what: String, tries: u32 },

    /// The server accepted a request that should start an async task but
    /// the response carried no task identifier (spec §4.2).
    #[error("hypervisor accepted {what} but returned no task id")]
    MissingTaskId { what: String },
}
