//! Typed client for the hypervisor's REST API (spec §4.2): node/storage/VM
//! enumeration, pending-config fetch, and snapshot create/remove/list with
//! bounded convergence polling and transparent session renewal.

mod client;
mod driver;
mod error;

pub use client::Client;
pub use driver::HypervisorDriver;
pub use error::HypervisorError;
