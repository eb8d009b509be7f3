use std::ffi::CString;
use std::mem::MaybeUninit;

use anyhow::{bail, Error};
use serde::{Deserialize, Serialize};

/// One restore point of a VM: the tuple of snapshots sharing `name` across
/// the metadata image and every non-ignored backup image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestorePoint {
    /// `{backup_pool}/{uuid}_vm_metadata`
    pub image: String,
    pub name: String,
    /// UTC timestamp, as parsed from the metadata image snapshot.
    pub timestamp: i64,
}

/// One image participating in a restore point, as returned by
/// `restore_point_detail`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestorePointImage {
    pub image: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestorePointDetail {
    pub timestamp: i64,
    pub has_hypervisor_snapshot: bool,
    pub images: Vec<RestorePointImage>,
}

/// Parse `rbd snap ls`'s ctime(3)-style timestamp, e.g.
/// `Tue Jul 28 10:08:00 2026`, into a UTC unix timestamp.
///
/// Mirrors `ASN1_TIME_to_tm` + `proxmox_time::timegm` elsewhere in this
/// codebase: hand the format string to libc's `strptime` and let
/// `timegm` do the (locale- and DST-free) conversion to epoch seconds.
pub fn parse_rbd_timestamp(raw: &str) -> Result<i64, Error> {
    let format = CString::new("%a %b %e %H:%M:%S %Y").unwrap();
    let input = CString::new(raw).map_err(|_| anyhow::anyhow!("timestamp contains NUL byte"))?;

    let mut c_tm = MaybeUninit::<libc::tm>::zeroed();
    let rc = unsafe { libc::strptime(input.as_ptr(), format.as_ptr(), c_tm.as_mut_ptr()) };
    if rc.is_null() {
        bail!("unrecognized rbd timestamp format: {raw:?}");
    }
    let mut c_tm = unsafe { c_tm.assume_init() };
    proxmox_time::timegm(&mut c_tm)
}
