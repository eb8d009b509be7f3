use serde::{Deserialize, Serialize};

/// The hypervisor-side storage backend type. Only [`StorageType::Rbd`]
/// storages are ever candidates for disk resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Rbd,
    Dir,
    Lvm,
    LvmThin,
    Zfs,
    Nfs,
    Other,
}

impl StorageType {
    pub fn is_rbd(self) -> bool {
        matches!(self, StorageType::Rbd)
    }
}

impl From<&str> for StorageType {
    fn from(s: &str) -> Self {
        match s {
            "rbd" => StorageType::Rbd,
            "dir" => StorageType::Dir,
            "lvm" => StorageType::Lvm,
            "lvmthin" => StorageType::LvmThin,
            "zfspool" => StorageType::Zfs,
            "nfs" => StorageType::Nfs,
            _ => StorageType::Other,
        }
    }
}

/// A hypervisor storage definition, as returned by `listStorages`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Storage {
    pub name: String,
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    pub pool: String,
    pub shared: bool,
    pub krbd: bool,
    /// Raw, comma separated `content` advertisement (e.g. `images,rootdir`).
    pub content: String,
    pub digest: String,
}

impl Storage {
    /// Only storages advertising disk images are candidates for backup.
    pub fn holds_disk_images(&self) -> bool {
        self.content.split(',').any(|c| c == "images")
    }
}

impl std::fmt::Display for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
