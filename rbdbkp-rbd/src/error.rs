use thiserror::Error;

/// Failure shapes specific to the block-store driver; everything else
/// surfaces as a plain [`anyhow::Error`] from the underlying command.
#[derive(Debug, Error)]
pub enum BlockStoreError {
    /// `mapImage` succeeded (exit 0) but the image did not show up in
    /// `rbd device list` afterwards.
    #[error("mapped {pool}/{image} but could not find its device path afterwards")]
    MapLookupFailed { pool: String, image: String },
}
