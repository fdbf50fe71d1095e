//! Role classification and growable partition selection

use super::error::PlanningError;
use super::parsing::lsblk::{is_efi_partition, is_msr_partition};
use super::types::{GIB, GROWABLE_FS, LabelType, Partition, PartitionFlag, PartitionTable, Role};

pub const GPT_ESP: &str = "C12A7328-F81F-11D2-BA4B-00A0C93EC93B";
pub const GPT_MSR: &str = "E3C9E316-0B5C-4DB8-817D-F92DF00215AE";
pub const GPT_BASIC_DATA: &str = "EBD0A0A2-B9E5-4433-87C0-68B6B72699C7";
pub const GPT_LINUX: &str = "0FC63DAF-8483-4772-8E79-3D69D8477DE4";

const FAT_FAMILY: &[&str] = &["vfat", "fat", "fat12", "fat16", "fat32", "msdos"];
const BOOT_WORDS: &[&str] = &["efi", "esp", "boot"];
const RESERVED_WORDS: &[&str] = &["reserved", "msr"];

fn label_matches(partition: &Partition, words: &[&str]) -> bool {
    [&partition.name, &partition.fs_label].iter().any(|text| {
        let lower = text.to_lowercase();
        words.iter().any(|w| lower.contains(w))
    })
}

/// Infer what a partition is for. Never fails: unknown partitions are [`Role::Other`].
pub fn classify(partition: &Partition, sector_size: u64) -> Role {
    let type_code = partition.type_code.as_deref().unwrap_or("");

    if is_efi_partition(type_code) || partition.flags.contains(&PartitionFlag::Esp) {
        return Role::SystemBoot;
    }

    let fs = partition.filesystem_hint.to_lowercase();
    if FAT_FAMILY.contains(&fs.as_str()) {
        return Role::SystemBoot;
    }
    if fs == GROWABLE_FS {
        return Role::GrowableFilesystem;
    }

    if label_matches(partition, BOOT_WORDS) {
        return Role::SystemBoot;
    }
    if label_matches(partition, RESERVED_WORDS) || is_msr_partition(type_code) {
        return Role::Reserved;
    }

    if partition.size_bytes(sector_size) <= GIB {
        Role::Reserved
    } else {
        Role::Other
    }
}

pub fn classify_table(table: &mut PartitionTable) {
    let sector_size = table.sector_size;
    for partition in &mut table.partitions {
        partition.role = classify(partition, sector_size);
    }
}

/// Index of the partition to grow.
///
/// An explicit number wins but must carry the growable filesystem; otherwise the
/// largest partition of that filesystem type is chosen.
pub fn select_growable(
    table: &PartitionTable,
    device: &str,
    explicit: Option<u32>,
) -> Result<usize, PlanningError> {
    if let Some(number) = explicit {
        let index = table
            .partitions
            .iter()
            .position(|p| p.number == number)
            .ok_or_else(|| PlanningError::GrowableNotFound {
                device: device.to_string(),
                number,
            })?;
        let found = &table.partitions[index].filesystem_hint;
        if !found.eq_ignore_ascii_case(GROWABLE_FS) {
            return Err(PlanningError::NotGrowableType {
                number,
                found: if found.is_empty() {
                    "unknown".to_string()
                } else {
                    found.clone()
                },
                expected: GROWABLE_FS,
            });
        }
        return Ok(index);
    }

    table
        .partitions
        .iter()
        .enumerate()
        .filter(|(_, p)| p.filesystem_hint.eq_ignore_ascii_case(GROWABLE_FS))
        .max_by_key(|(_, p)| p.size_sectors())
        .map(|(index, _)| index)
        .ok_or_else(|| PlanningError::NoGrowablePartition {
            device: device.to_string(),
            fs: GROWABLE_FS,
        })
}

/// Type code for a destination partition.
///
/// The source code is kept when the label type is unchanged; across label types
/// the code is derived from the role.
pub fn type_code_for(
    role: Role,
    dest_label: LabelType,
    source_code: Option<&str>,
    source_label: LabelType,
) -> String {
    if dest_label == source_label
        && let Some(code) = source_code.filter(|c| !c.trim().is_empty())
    {
        return code.to_string();
    }

    match (dest_label, role) {
        (LabelType::Gpt, Role::SystemBoot) => GPT_ESP,
        (LabelType::Gpt, Role::Reserved) => GPT_MSR,
        (LabelType::Gpt, Role::GrowableFilesystem) => GPT_BASIC_DATA,
        (LabelType::Gpt, Role::Other) => GPT_LINUX,
        (_, Role::SystemBoot) => "ef",
        (_, Role::Reserved) | (_, Role::GrowableFilesystem) => "7",
        (_, Role::Other) => "83",
    }
    .to_string()
}
