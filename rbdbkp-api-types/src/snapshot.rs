use rand::Rng;
use serde::{Deserialize, Serialize};

/// One entry of `rbd snap ls --format json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub id: u64,
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub protected: bool,
    /// `rbd`'s textual timestamp, e.g. `Tue Jul 28 10:08:00 2026`.
    pub timestamp: String,
}

/// One entry of the hypervisor's `GET /nodes/{node}/qemu/{vmid}/snapshot`
/// listing. The synthetic `current` pseudo-snapshot has no `snaptime` and
/// its `parent` (when present) names the latest real snapshot (spec §4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypervisorSnapshot {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub snaptime: Option<i64>,
    #[serde(default)]
    pub description: String,
}

impl HypervisorSnapshot {
    pub fn is_synthetic_current(&self) -> bool {
        self.name == "current"
    }
}

/// Generate a `{prefix}{16 hex chars}` snapshot name. The 16 hex characters
/// come from a cryptographically uninteresting PRNG: uniqueness within a
/// run is all that's required (see the concurrency model's note on
/// per-VM-per-run snapshot name uniqueness).
pub fn generate_snapshot_name(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..16)
        .map(|_| {
            let n: u8 = rng.gen_range(0..16);
            std::char::from_digit(n as u32, 16).unwrap()
        })
        .collect();
    format!("{prefix}{suffix}")
}
