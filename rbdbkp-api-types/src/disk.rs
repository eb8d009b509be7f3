use serde::{Deserialize, Serialize};

use crate::storage::Storage;

/// A block-store image identified by `(pool, image_name)`. This is the
/// shape the block-store driver (`rbdbkp-rbd`) operates on; it carries no
/// notion of the hypervisor storage a [`Disk`] was resolved from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockImage {
    pub pool: String,
    pub image: String,
}

impl BlockImage {
    pub fn new(pool: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            pool: pool.into(),
            image: image.into(),
        }
    }
}

impl std::fmt::Display for BlockImage {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}/{}", self.pool, self.image)
    }
}

/// A VM disk as resolved from the pending config: a storage reference plus
/// the image name on it. Printable as `storage:image_name`, matching the
/// config line syntax it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Disk {
    pub storage: Storage,
    pub image: String,
}

impl Disk {
    pub fn new(storage: Storage, image: impl Into<String>) -> Self {
        Self {
            storage,
            image: image.into(),
        }
    }

    /// Convert to the block-store image this disk actually lives at,
    /// substituting the storage's `pool` for its `name`.
    pub fn to_block_image(&self) -> BlockImage {
        BlockImage::new(self.storage.pool.clone(), self.image.clone())
    }

    /// `storage_name/image_name`, the syntax used by `ignore_disks`.
    pub fn ignore_key(&self) -> String {
        format!("{}/{}", self.storage.name, self.image)
    }
}

impl std::fmt::Display for Disk {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.storage.name, self.image)
    }
}
