use anyhow::Error;
use serde_json::Value;

use proxmox_human_byte::HumanByte;

/// Render a byte count (e.g. source image size for progress accounting) the
/// way the CLI's table output renders any other byte-valued field.
pub fn render_bytes_human_readable(value: &Value, _record: &Value) -> Result<String, Error> {
    if value.is_null() {
        return Ok(String::new());
    }
    let text = match value.as_u64() {
        Some(bytes) => HumanByte::from(bytes).to_string(),
        None => value.to_string(),
    };
    Ok(text)
}

/// Render a unix timestamp (restore point / snapshot creation time) as a
/// local-time string for table output.
pub fn render_epoch(value: &Value, _record: &Value) -> Result<String, Error> {
    if value.is_null() {
        return Ok(String::new());
    }
    let text = match value.as_i64() {
        Some(epoch) => {
            proxmox_time::strftime_local("%c", epoch).unwrap_or_else(|_| epoch.to_string())
        }
        None => value.to_string(),
    };
    Ok(text)
}
