//! Device paths, underlying-disk resolution and geometry queries

use anyhow::{Context, Result};
use std::collections::HashMap;

use super::parsing::BlockProbe;
use super::services::DeviceInfoService;
use super::types::{DiskGeometry, PartitionTable};

/// A user-supplied device path after canonicalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDevice {
    /// Canonical node, e.g. /dev/nvme0n1p3
    pub path: String,
    /// Whole disk the node lives on, e.g. /dev/nvme0n1
    pub disk: String,
    /// Set when `path` is a partition of `disk`
    pub partition_number: Option<u32>,
}

impl ResolvedDevice {
    pub fn is_partition(&self) -> bool {
        self.partition_number.is_some()
    }
}

pub fn get_part_path(disk: &str, part_num: u32) -> String {
    if disk.chars().last().unwrap_or(' ').is_numeric() {
        format!("{}p{}", disk, part_num)
    } else {
        format!("{}{}", disk, part_num)
    }
}

pub fn parse_partition_number(disk_path: &str, partition_path: &str) -> Result<u32> {
    let disk_name = disk_path.strip_prefix("/dev/").unwrap_or(disk_path);
    let part_name = partition_path
        .strip_prefix("/dev/")
        .unwrap_or(partition_path);

    if !part_name.starts_with(disk_name) {
        anyhow::bail!(
            "Partition {} does not belong to disk {}",
            partition_path,
            disk_path
        );
    }

    let suffix = &part_name[disk_name.len()..];
    let suffix = suffix.strip_prefix('p').unwrap_or(suffix);
    suffix
        .parse::<u32>()
        .context("Failed to parse partition number")
}

/// Kernel name of a device node, e.g. "nvme0n1" for /dev/nvme0n1
pub fn kernel_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Parse one line of `lsblk -P` output (`NAME="sda1" PKNAME="sda" TYPE="part"`)
pub fn parse_lsblk_pairs(line: &str) -> Result<HashMap<String, String>> {
    let words = shell_words::split(line.trim())
        .with_context(|| format!("Malformed lsblk pairs: {}", line))?;
    Ok(words
        .into_iter()
        .filter_map(|word| {
            word.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect())
}

/// Work out the whole disk behind `path` from its lsblk NAME/PKNAME/TYPE pairs
pub fn resolve_from_pairs(path: &str, pairs: &HashMap<String, String>) -> Result<ResolvedDevice> {
    let kind = pairs.get("TYPE").map(String::as_str).unwrap_or("");
    match kind {
        "disk" | "loop" => Ok(ResolvedDevice {
            path: path.to_string(),
            disk: path.to_string(),
            partition_number: None,
        }),
        "part" => {
            let parent = pairs
                .get("PKNAME")
                .filter(|p| !p.is_empty())
                .with_context(|| format!("lsblk reports no parent disk for {}", path))?;
            let disk = format!("/dev/{}", parent);
            let number = parse_partition_number(&disk, path)?;
            Ok(ResolvedDevice {
                path: path.to_string(),
                disk,
                partition_number: Some(number),
            })
        }
        other => anyhow::bail!(
            "{} is a '{}' device; expected a disk or a partition",
            path,
            other
        ),
    }
}

/// Total sectors, sector size and current label of a whole disk
pub fn read_geometry(info: &dyn DeviceInfoService, disk: &str) -> Result<DiskGeometry> {
    let sector_size = info.sector_size(disk)?;
    if sector_size == 0 {
        anyhow::bail!("{} reports a logical sector size of 0", disk);
    }
    let size_bytes = info.size_bytes(disk)?;
    let label = info.label_type(disk)?;
    Ok(DiskGeometry::new(size_bytes / sector_size, sector_size, label))
}

/// Merge filesystem details from lsblk into a table read from sfdisk
pub fn enrich_partitions(table: &mut PartitionTable, probes: &[BlockProbe]) {
    for partition in &mut table.partitions {
        let Some(probe) = probes.iter().find(|p| p.path == partition.device) else {
            continue;
        };
        if let Some(fstype) = &probe.fstype {
            partition.filesystem_hint = fstype.to_lowercase();
        }
        if let Some(label) = &probe.label {
            partition.fs_label = label.clone();
        }
        if partition.name.is_empty()
            && let Some(partlabel) = &probe.partlabel
        {
            partition.name = partlabel.clone();
        }
        if partition.type_code.is_none() {
            partition.type_code = probe.parttype.clone();
        }
    }
}

/// Current mountpoint of a device, if lsblk reported one
pub fn mountpoint_of<'a>(probes: &'a [BlockProbe], device: &str) -> Option<&'a str> {
    probes
        .iter()
        .find(|p| p.path == device)
        .and_then(|p| p.mountpoint.as_deref())
}
