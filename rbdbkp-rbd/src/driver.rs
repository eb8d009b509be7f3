use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Error};
use serde::Deserialize;

use rbdbkp_api_types::snapshot::generate_snapshot_name;
use rbdbkp_api_types::SnapshotInfo;

use crate::error::BlockStoreError;
use crate::shell::Shell;

const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct MappedDevice {
    pool: String,
    #[serde(default)]
    image: String,
    device: String,
}

#[derive(Debug, Deserialize)]
pub struct ImageInfo {
    pub size: u64,
}

/// Typed operations on RBD images and snapshots (§4.1). Each method is one
/// transactional primitive from the caller's view: it shells out to `rbd`
/// or `ceph`, parses the result, and surfaces any failure rather than
/// swallowing it.
pub struct BlockStoreDriver {
    shell: Shell,
}

impl BlockStoreDriver {
    pub fn new(shell: Shell) -> Self {
        Self { shell }
    }

    /// The shell this driver issues commands through, so the snapshot
    /// coordinator can borrow it for the source-cluster convergence poll.
    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    fn rbd(&self, args: &[&str]) -> Vec<String> {
        let mut argv = vec!["rbd".to_string()];
        argv.extend(args.iter().map(|s| s.to_string()));
        argv
    }

    pub async fn list_images(&self, pool: &str) -> Result<Vec<String>, Error> {
        let argv = self.rbd(&["-p", pool, "ls", "--format", "json"]);
        self.shell
            .run_json(&argv)
            .await
            .and_then(|v| serde_json::from_value(v).context("parsing `rbd ls` output"))
    }

    pub async fn image_exists(&self, pool: &str, image: &str) -> Result<bool, Error> {
        Ok(self.list_images(pool).await?.iter().any(|i| i == image))
    }

    /// `size` is a string with unit suffix `M|G|T` or raw bytes; passed
    /// through to `rbd create -s` verbatim.
    pub async fn create_image(&self, pool: &str, image: &str, size: &str) -> Result<(), Error> {
        log::info!("creating rbd image {pool}/{image} (size {size})");
        let argv = self.rbd(&["create", &format!("{pool}/{image}"), "-s", size]);
        self.shell.run(&argv).await?;
        Ok(())
    }

    pub async fn remove_image(&self, pool: &str, image: &str) -> Result<(), Error> {
        let argv = self.rbd(&["-p", pool, "rm", image]);
        self.shell.run(&argv).await?;
        Ok(())
    }

    /// Maps the image and looks the device path up in `rbd device list`.
    /// Fails with [`BlockStoreError::MapLookupFailed`] if the lookup comes
    /// up empty, since a successful `map` invocation that doesn't show up
    /// afterward means we cannot trust the mapping.
    pub async fn map_image(&self, pool: &str, image: &str) -> Result<String, Error> {
        log::info!("mapping rbd image {pool}/{image}");
        let argv = self.rbd(&["-p", pool, "device", "map", image]);
        self.shell.run(&argv).await?;

        let devices = self.list_mapped_devices().await?;
        devices
            .into_iter()
            .find(|d| d.pool == pool && d.image == image)
            .map(|d| d.device)
            .ok_or_else(|| {
                BlockStoreError::MapLookupFailed {
                    pool: pool.to_string(),
                    image: image.to_string(),
                }
                .into()
            })
    }

    pub async fn unmap_image(&self, pool: &str, image: &str) -> Result<(), Error> {
        log::info!("unmapping rbd image {pool}/{image}");
        let argv = self.rbd(&["-p", pool, "device", "unmap", image]);
        self.shell.run(&argv).await?;
        Ok(())
    }

    async fn list_mapped_devices(&self) -> Result<Vec<MappedDevice>, Error> {
        let argv = self.rbd(&["device", "list", "--format", "json"]);
        let value = self.shell.run_json(&argv).await?;
        serde_json::from_value(value).context("parsing `rbd device list` output")
    }

    /// Tolerates a non-existent image by returning an empty list, so the
    /// first backup of a VM (before its backup image exists) doesn't need
    /// special-casing by callers.
    pub async fn list_snapshots(&self, pool: &str, image: &str) -> Result<Vec<SnapshotInfo>, Error> {
        if !self.image_exists(pool, image).await? {
            return Ok(Vec::new());
        }
        let argv = self.rbd(&["-p", pool, "snap", "ls", "--format", "json", image]);
        let value = self.shell.run_json(&argv).await?;
        serde_json::from_value(value).context("parsing `rbd snap ls` output")
    }

    /// If `remote` is set, the listing runs through that shell (the
    /// source-cluster ssh transport) instead of locally.
    pub async fn list_snapshots_by_prefix(
        &self,
        pool: &str,
        image: &str,
        prefix: &str,
        remote: Option<&Shell>,
    ) -> Result<Vec<SnapshotInfo>, Error> {
        let shell = remote.unwrap_or(&self.shell);
        let argv = self.rbd(&["-p", pool, "snap", "ls", "--format", "json", image]);
        // `list_snapshots`'s "tolerate missing image" rule only makes sense
        // for the local shell; the remote source-cluster image is assumed
        // existing by construction (the VM's disk was already resolved).
        let exists = if remote.is_some() {
            true
        } else {
            self.image_exists(pool, image).await?
        };
        if !exists {
            return Ok(Vec::new());
        }
        let value = shell.run_json(&argv).await?;
        let all: Vec<SnapshotInfo> =
            serde_json::from_value(value).context("parsing `rbd snap ls` output")?;
        Ok(all
            .into_iter()
            .filter(|s| s.name.starts_with(prefix))
            .collect())
    }

    /// Generates `{prefix}{16 hex}` when `explicit_name` is empty, mirroring
    /// the 64-bit-random-suffix uniqueness guarantee from the concurrency
    /// model.
    pub async fn create_snapshot(
        &self,
        pool: &str,
        image: &str,
        prefix: &str,
        explicit_name: Option<&str>,
    ) -> Result<String, Error> {
        let name = match explicit_name {
            Some(n) if !n.trim().is_empty() => n.to_string(),
            _ => generate_snapshot_name(prefix),
        };
        log::info!("creating rbd snapshot {pool}/{image}@{name}");
        let argv = self.rbd(&["-p", pool, "snap", "create", &format!("{image}@{name}")]);
        self.shell.run(&argv).await?;
        Ok(name)
    }

    pub async fn remove_snapshot(&self, pool: &str, image: &str, name: &str) -> Result<(), Error> {
        let argv = self.rbd(&["-p", pool, "snap", "rm", &format!("{image}@{name}")]);
        self.shell.run(&argv).await?;
        Ok(())
    }

    pub async fn image_meta_set(
        &self,
        pool: &str,
        image: &str,
        key: &str,
        value: &str,
    ) -> Result<(), Error> {
        let argv = self.rbd(&["image-meta", "set", &format!("{pool}/{image}"), key, value]);
        self.shell.run(&argv).await?;
        Ok(())
    }

    pub async fn image_meta_get(
        &self,
        pool: &str,
        image: &str,
        key: &str,
    ) -> Result<Option<String>, Error> {
        let argv = self.rbd(&["image-meta", "get", &format!("{pool}/{image}"), key]);
        match self.shell.run(&argv).await {
            Ok(value) => Ok(Some(value.trim().to_string())),
            Err(_) => Ok(None),
        }
    }

    /// Returns an empty map for an image with no tags rather than a
    /// malformed-output error.
    pub async fn image_meta_list(
        &self,
        pool: &str,
        image: &str,
    ) -> Result<BTreeMap<String, String>, Error> {
        let argv = self.rbd(&[
            "image-meta",
            "list",
            "--format",
            "json",
            &format!("{pool}/{image}"),
        ]);
        let raw = self.shell.run(&argv).await?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(trimmed).context("parsing `rbd image-meta list` output")
    }

    pub async fn image_meta_remove(&self, pool: &str, image: &str, key: &str) -> Result<(), Error> {
        let argv = self.rbd(&["image-meta", "remove", &format!("{pool}/{image}"), key]);
        self.shell.run(&argv).await?;
        Ok(())
    }

    pub async fn disable_image_features(
        &self,
        pool: &str,
        image: &str,
        features: &[String],
    ) -> Result<(), Error> {
        if features.is_empty() {
            return Ok(());
        }
        let mut argv = self.rbd(&["feature", "disable", &format!("{pool}/{image}")]);
        for feature in features {
            argv.push(feature.clone());
        }
        self.shell.run(&argv).await?;
        Ok(())
    }

    pub async fn image_info(&self, pool: &str, image: &str) -> Result<ImageInfo, Error> {
        let argv = self.rbd(&["-p", pool, "--format", "json", "info", image]);
        let value = self.shell.run_json(&argv).await?;
        serde_json::from_value(value).context("parsing `rbd info` output")
    }

    fn ceph(&self, args: &[&str]) -> Vec<String> {
        let mut argv = vec!["ceph".to_string()];
        argv.extend(args.iter().map(|s| s.to_string()));
        argv
    }

    pub async fn set_scrubbing(&self, enable: bool) -> Result<(), Error> {
        let action = if enable { "set" } else { "unset" };
        log::info!("{} ceph scrubbing", if enable { "enable" } else { "disable" });
        self.shell.run(&self.ceph(&["osd", action, "nodeep-scrub"])).await?;
        self.shell.run(&self.ceph(&["osd", action, "noscrub"])).await?;
        Ok(())
    }

    pub async fn wait_for_cluster_healthy(&self) -> Result<(), Error> {
        log::info!("waiting for ceph cluster to become healthy");
        loop {
            let status = self.shell.run(&self.ceph(&["health", "detail"])).await?;
            if !status.trim_start().starts_with("HEALTH_ERR") {
                return Ok(());
            }
            tokio::time::sleep(HEALTH_POLL_INTERVAL).await;
        }
    }

    pub async fn wait_for_scrub_complete(&self) -> Result<(), Error> {
        log::info!("waiting for ceph cluster to complete scrubbing");
        loop {
            let status = self.shell.run(&self.ceph(&["status"])).await?;
            if !status.contains("scrubbing") {
                return Ok(());
            }
            tokio::time::sleep(HEALTH_POLL_INTERVAL).await;
        }
    }
}
