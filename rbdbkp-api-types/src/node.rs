use serde::{Deserialize, Serialize};

/// A hypervisor cluster node, as returned by `listNodes`.
///
/// Nodes are discovered at the start of a run and are otherwise read-only;
/// the orchestration engine never mutates a [`Node`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}
