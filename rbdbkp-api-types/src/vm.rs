use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::disk::Disk;

/// A VM as enumerated by `listVMs`, before its pending config has been
/// fetched and parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmSummary {
    pub id: u64,
    pub name: String,
    pub status: String,
}

/// A fully resolved VM: config parsed, UUID extracted, disks resolved and
/// ignore-filtered. See the disk resolver in `rbdbkp-core` for how this is
/// built from a [`VmSummary`] plus its pending config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vm {
    pub id: u64,
    pub uuid: String,
    pub name: String,
    pub node: String,
    pub running: bool,
    /// Serialized textual config (key-sorted `key: value` lines, `#`-prefixed
    /// description header, `digest` excluded) as written into the metadata
    /// image's `.conf` file.
    pub config: String,
    pub rbd_disks: BTreeSet<Disk>,
}

impl std::fmt::Display for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} (id={}, uuid={})", self.name, self.id, self.uuid)
    }
}
