use std::time::Duration;

use anyhow::{Context as _, Error};
use serde::Deserialize;
use serde_json::json;

use rbdbkp_api_types::{HypervisorSnapshot, Node, Storage, VmSummary};

use crate::client::Client;
use crate::error::HypervisorError;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Deserialize)]
struct NodeEntry {
    node: String,
}

#[derive(Deserialize)]
struct QemuEntry {
    vmid: u64,
    name: String,
    status: String,
}

#[derive(Deserialize)]
struct PendingEntry {
    key: String,
    value: Option<String>,
    pending: Option<String>,
}

/// The hypervisor-side driver (spec §4.2): node/storage/VM enumeration,
/// pending-config fetch, and snapshot create/remove/list with bounded
/// convergence polling.
pub struct HypervisorDriver {
    client: Client,
    wait_for_snapshot_tries: u32,
}

impl HypervisorDriver {
    pub fn new(client: Client, wait_for_snapshot_tries: u32) -> Self {
        Self {
            client,
            wait_for_snapshot_tries,
        }
    }

    pub async fn list_nodes(&self) -> Result<Vec<Node>, Error> {
        let body = self.client.get("nodes", None).await?;
        let entries: Vec<NodeEntry> =
            serde_json::from_value(body["data"].clone()).context("parsing node list")?;
        Ok(entries.into_iter().map(|e| Node { id: e.node }).collect())
    }

    pub async fn list_storages(&self, type_filter: Option<&str>) -> Result<Vec<Storage>, Error> {
        let params = type_filter.map(|t| json!({ "type": t }));
        let body = self.client.get("storage", params).await?;
        serde_json::from_value(body["data"].clone()).context("parsing storage list")
    }

    pub async fn list_vms(&self, node: &str) -> Result<Vec<VmSummary>, Error> {
        let body = self.client.get(&format!("nodes/{node}/qemu"), None).await?;
        let entries: Vec<QemuEntry> =
            serde_json::from_value(body["data"].clone()).context("parsing vm list")?;
        Ok(entries
            .into_iter()
            .map(|e| VmSummary {
                id: e.vmid,
                name: e.name,
                status: e.status,
            })
            .collect())
    }

    /// Ordered `(key, value)` pairs from the VM's pending configuration.
    /// A `pending` value (an edit not yet applied) takes precedence over
    /// `value` (the currently active one) for that key, matching what
    /// "pending config" means on the wire.
    pub async fn pending_config(&self, node: &str, vmid: u64) -> Result<Vec<(String, String)>, Error> {
        let body = self
            .client
            .get(&format!("nodes/{node}/qemu/{vmid}/pending"), None)
            .await?;
        let entries: Vec<PendingEntry> =
            serde_json::from_value(body["data"].clone()).context("parsing pending config")?;
        Ok(entries
            .into_iter()
            .filter_map(|e| e.pending.or(e.value).map(|v| (e.key, v)))
            .collect())
    }

    /// Filters out the synthetic `current` pseudo-snapshot (spec §4.2):
    /// callers only ever want real, named snapshots.
    pub async fn list_snapshots(&self, node: &str, vmid: u64) -> Result<Vec<HypervisorSnapshot>, Error> {
        let body = self
            .client
            .get(&format!("nodes/{node}/qemu/{vmid}/snapshot"), None)
            .await?;
        let snapshots: Vec<HypervisorSnapshot> =
            serde_json::from_value(body["data"].clone()).context("parsing snapshot list")?;
        Ok(snapshots.into_iter().filter(|s| !s.is_synthetic_current()).collect())
    }

    pub async fn feature_available(&self, feature: &str, node: &str, vmid: u64) -> Result<bool, Error> {
        let body = self
            .client
            .get(
                &format!("nodes/{node}/qemu/{vmid}/feature"),
                Some(json!({ "feature": feature })),
            )
            .await?;
        Ok(body["data"]["hasFeature"].as_i64().unwrap_or(0) != 0)
    }

    /// Creates `name` and polls [`Self::list_snapshots`] at 1s cadence
    /// until it is observed, up to `wait_for_snapshot_tries` (spec §4.2).
    pub async fn create_snapshot(
        &self,
        node: &str,
        vmid: u64,
        name: &str,
        description: &str,
    ) -> Result<(), Error> {
        let what = format!("snapshot create {name} on vm {vmid}");
        let body = self
            .client
            .post(
                &format!("nodes/{node}/qemu/{vmid}/snapshot"),
                Some(json!({ "snapname": name, "description": description, "vmstate": 0 })),
            )
            .await?;
        let upid = body["data"].as_str().filter(|s| !s.is_empty());
        if upid.is_none() {
            return Err(HypervisorError::MissingTaskId { what }.into());
        }

        self.poll_until(node, vmid, |snapshots| snapshots.iter().any(|s| s.name == name))
            .await
            .with_context(|| format!("waiting for snapshot {name} to appear on vm {vmid}"))
    }

    /// No-ops if `name` is already absent; otherwise deletes it and polls
    /// until it disappears, same cadence/bound (spec §4.2).
    pub async fn remove_snapshot(&self, node: &str, vmid: u64, name: &str) -> Result<(), Error> {
        let exists = self
            .list_snapshots(node, vmid)
            .await?
            .iter()
            .any(|s| s.name == name);
        if !exists {
            return Ok(());
        }

        self.client
            .delete(&format!("nodes/{node}/qemu/{vmid}/snapshot/{name}"), None)
            .await?;

        self.poll_until(node, vmid, |snapshots| !snapshots.iter().any(|s| s.name == name))
            .await
            .with_context(|| format!("waiting for snapshot {name} to disappear on vm {vmid}"))
    }

    async fn poll_until(
        &self,
        node: &str,
        vmid: u64,
        mut condition: impl FnMut(&[HypervisorSnapshot]) -> bool,
    ) -> Result<(), Error> {
        for attempt in 0..self.wait_for_snapshot_tries {
            let snapshots = self.list_snapshots(node, vmid).await?;
            if condition(&snapshots) {
                return Ok(());
            }
            if attempt + 1 < self.wait_for_snapshot_tries {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
        Err(HypervisorError::PollTimeout {
            what: format!("vm {vmid} snapshot list"),
            tries: self.wait_for_snapshot_tries,
        }
        .into())
    }
}
