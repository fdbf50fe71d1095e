//! sfdisk JSON parsing for reading partition tables

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;

use crate::clone::device::parse_partition_number;
use crate::clone::types::{LabelType, Partition, PartitionFlag, PartitionTable, Role};

#[derive(Debug, Deserialize)]
pub struct SfdiskOutput {
    pub partitiontable: SfdiskPartitionTable,
}

#[derive(Debug, Deserialize)]
pub struct SfdiskPartitionTable {
    pub label: String,
    pub sectorsize: Option<u64>,
    pub partitions: Option<Vec<SfdiskPartition>>,
}

#[derive(Debug, Deserialize)]
pub struct SfdiskPartition {
    pub node: String,
    pub start: u64,
    pub size: u64,
    #[serde(rename = "type")]
    pub part_type: Option<String>,
    pub name: Option<String>,
    pub bootable: Option<bool>,
}

/// Parse `sfdisk -J <disk>` output into an ordered partition table.
///
/// Filesystem details are not part of sfdisk's view; they are merged in later
/// from lsblk. Roles start as [`Role::Other`] until classification.
pub fn parse_partition_table(json: &str, disk: &str) -> Result<PartitionTable> {
    let output: SfdiskOutput =
        serde_json::from_str(json).context("Failed to parse sfdisk JSON output")?;

    let pt = output.partitiontable;
    let label_type = LabelType::from_sfdisk(&pt.label);
    // Older sfdisk releases omit sectorsize; it was always 512 there
    let sector_size = pt.sectorsize.unwrap_or(512);

    let mut raw = pt.partitions.unwrap_or_default();
    raw.sort_by_key(|p| p.start);

    let mut partitions = Vec::with_capacity(raw.len());
    for (index, entry) in raw.into_iter().enumerate() {
        if entry.size == 0 {
            continue;
        }

        let number = parse_partition_number(disk, &entry.node).unwrap_or(index as u32 + 1);

        let type_code = entry
            .part_type
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let mut flags = BTreeSet::new();
        if entry.bootable.unwrap_or(false) {
            flags.insert(PartitionFlag::Boot);
        }
        if type_code
            .as_deref()
            .is_some_and(super::lsblk::is_efi_partition)
        {
            flags.insert(PartitionFlag::Esp);
        }

        partitions.push(Partition {
            number,
            device: entry.node,
            start_sector: entry.start,
            end_sector: entry.start + entry.size - 1,
            filesystem_hint: String::new(),
            name: entry.name.unwrap_or_default(),
            fs_label: String::new(),
            type_code,
            flags,
            role: Role::Other,
        });
    }

    Ok(PartitionTable {
        label_type,
        sector_size,
        partitions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOWS_GPT: &str = r#"{
   "partitiontable": {
      "label": "gpt",
      "id": "5C2A4E9B-1D7F-4C39-9A0E-3B8F1C2D4E5F",
      "device": "/dev/nvme0n1",
      "unit": "sectors",
      "firstlba": 34,
      "lastlba": 500118158,
      "sectorsize": 512,
      "partitions": [
         {
            "node": "/dev/nvme0n1p1",
            "start": 2048,
            "size": 204800,
            "type": "C12A7328-F81F-11D2-BA4B-00A0C93EC93B",
            "uuid": "0A4F1C2E-3B5D-4E6F-8A9B-0C1D2E3F4A5B",
            "name": "EFI system partition",
            "attrs": "GUID:63"
         },
         {
            "node": "/dev/nvme0n1p2",
            "start": 206848,
            "size": 32768,
            "type": "E3C9E316-0B5C-4DB8-817D-F92DF00215AE",
            "uuid": "1B5F2D3E-4C6E-5F70-9BAC-1D2E3F4A5B6C",
            "name": "Microsoft reserved partition"
         },
         {
            "node": "/dev/nvme0n1p3",
            "start": 239616,
            "size": 498069504,
            "type": "EBD0A0A2-B9E5-4433-87C0-68B6B72699C7",
            "uuid": "2C6A3E4F-5D7F-6081-ACBD-2E3F4A5B6C7D",
            "name": "Basic data partition"
         },
         {
            "node": "/dev/nvme0n1p4",
            "start": 498311168,
            "size": 1804288,
            "type": "DE94BBA4-06D1-4D40-A16A-BFD50179D6AC",
            "uuid": "3D7B4F50-6E80-7192-BDCE-3F4A5B6C7D8E",
            "attrs": "RequiredPartition GUID:63"
         }
      ]
   }
}"#;

    #[test]
    fn test_parse_gpt_table() {
        let table = parse_partition_table(WINDOWS_GPT, "/dev/nvme0n1").unwrap();
        assert_eq!(table.label_type, LabelType::Gpt);
        assert_eq!(table.sector_size, 512);
        assert_eq!(table.partitions.len(), 4);

        let esp = &table.partitions[0];
        assert_eq!(esp.number, 1);
        assert_eq!(esp.start_sector, 2048);
        assert_eq!(esp.end_sector, 2048 + 204800 - 1);
        assert_eq!(esp.size_sectors(), 204800);
        assert!(esp.flags.contains(&PartitionFlag::Esp));
        assert_eq!(esp.name, "EFI system partition");

        let recovery = &table.partitions[3];
        assert_eq!(recovery.number, 4);
        assert_eq!(recovery.name, "");
        assert_eq!(
            recovery.type_code.as_deref(),
            Some("DE94BBA4-06D1-4D40-A16A-BFD50179D6AC")
        );
    }

    #[test]
    fn test_parse_dos_table_sorts_and_reads_boot_flag() {
        let json = r#"{
    "partitiontable": {
        "label": "dos",
        "id": "0x1234abcd",
        "device": "/dev/sda",
        "unit": "sectors",
        "sectorsize": 512,
        "partitions": [
            {"node": "/dev/sda2", "start": 1026048, "size": 20971520, "type": "7"},
            {"node": "/dev/sda1", "start": 2048, "size": 1024000, "type": "7", "bootable": true}
        ]
    }
}"#;
        let table = parse_partition_table(json, "/dev/sda").unwrap();
        assert_eq!(table.label_type, LabelType::Dos);
        assert_eq!(table.partitions[0].number, 1);
        assert!(table.partitions[0].flags.contains(&PartitionFlag::Boot));
        assert_eq!(table.partitions[1].number, 2);
        assert_eq!(table.partitions[1].type_code.as_deref(), Some("7"));
    }

    #[test]
    fn test_parse_missing_sector_size_defaults_to_512() {
        let json = r#"{"partitiontable": {"label": "dos", "partitions": []}}"#;
        let table = parse_partition_table(json, "/dev/sdb").unwrap();
        assert_eq!(table.sector_size, 512);
        assert!(table.partitions.is_empty());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_partition_table("not json", "/dev/sda").is_err());
    }
}
