//! lsblk JSON parsing for filesystem and topology details

use anyhow::{Context, Result};
use serde_json::Value;

pub const ESP_GUID: &str = "c12a7328-f81f-11d2-ba4b-00a0c93ec93b";
pub const MSR_GUID: &str = "e3c9e316-0b5c-4db8-817d-f92df00215ae";

/// What lsblk knows about one block device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockProbe {
    pub path: String,
    pub kind: String,
    pub fstype: Option<String>,
    pub label: Option<String>,
    pub partlabel: Option<String>,
    pub parttype: Option<String>,
    pub size_bytes: u64,
    pub mountpoint: Option<String>,
    /// Parent kernel name, e.g. "sda" for sda1
    pub pkname: Option<String>,
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// lsblk prints sizes as numbers with `-b` on recent releases and as strings on older ones
fn size_field(value: &Value) -> u64 {
    match value.get("size") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// lsblk 2.37+ reports "mountpoints" as an array, older releases a single "mountpoint"
fn mountpoint_field(value: &Value) -> Option<String> {
    if let Some(mp) = string_field(value, "mountpoint") {
        return Some(mp);
    }
    value
        .get("mountpoints")
        .and_then(|v| v.as_array())
        .and_then(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .find(|s| !s.is_empty())
                .map(|s| s.to_string())
        })
}

fn parse_device(value: &Value, out: &mut Vec<BlockProbe>) {
    let Some(name) = string_field(value, "name") else {
        return;
    };
    let path = string_field(value, "path").unwrap_or_else(|| format!("/dev/{}", name));

    out.push(BlockProbe {
        path,
        kind: string_field(value, "type").unwrap_or_default(),
        fstype: string_field(value, "fstype"),
        label: string_field(value, "label"),
        partlabel: string_field(value, "partlabel"),
        parttype: string_field(value, "parttype"),
        size_bytes: size_field(value),
        mountpoint: mountpoint_field(value),
        pkname: string_field(value, "pkname"),
    });

    if let Some(children) = value.get("children").and_then(|v| v.as_array()) {
        for child in children {
            parse_device(child, out);
        }
    }
}

/// Flatten `lsblk -J -b` output into one probe per device, parents first
pub fn parse_block_devices(json: &str) -> Result<Vec<BlockProbe>> {
    let root: Value = serde_json::from_str(json).context("Failed to parse lsblk JSON output")?;
    let devices = root
        .get("blockdevices")
        .and_then(|v| v.as_array())
        .context("lsblk output has no blockdevices array")?;

    let mut out = Vec::new();
    for device in devices {
        parse_device(device, &mut out);
    }
    Ok(out)
}

/// Check if partition type indicates EFI System Partition
pub fn is_efi_partition(parttype: &str) -> bool {
    let pt = parttype.trim().to_lowercase();
    // MBR type 0xef or ef
    pt == "0xef" || pt == "ef" || pt == ESP_GUID
}

/// Check if partition type is the Microsoft reserved partition GUID
pub fn is_msr_partition(parttype: &str) -> bool {
    parttype.trim().eq_ignore_ascii_case(MSR_GUID)
}
