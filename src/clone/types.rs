//! Core data structures for cloning a partition table onto another disk

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::error::EstimationError;

pub const KIB: u64 = 1024;
pub const MIB: u64 = KIB * 1024;
pub const GIB: u64 = MIB * 1024;
pub const TIB: u64 = GIB * 1024;

/// Start alignment for repositioned partitions (1 MiB at 512-byte sectors)
pub const ALIGNMENT_SECTORS: u64 = 2048;

/// Free sectors kept between the growable partition and the first trailing one
pub const GUARD_GAP_SECTORS: u64 = 2048;

/// Filesystem type the clone and resize services understand
pub const GROWABLE_FS: &str = "ntfs";

/// Bytes taken by a GPT partition entry array (128 entries of 128 bytes)
const GPT_ENTRY_ARRAY_BYTES: u64 = 128 * 128;

/// Highest sector number an MBR entry can address
pub const MBR_MAX_SECTOR: u64 = u32::MAX as u64;

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    if bytes >= TIB {
        format!("{:.1} TiB", bytes as f64 / TIB as f64)
    } else if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

pub fn align_down(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    value - (value % alignment)
}

/// Partition table type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LabelType {
    Gpt,
    #[value(alias = "mbr")]
    Dos,
    #[value(skip)]
    Unknown,
}

impl LabelType {
    pub fn from_sfdisk(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "gpt" => LabelType::Gpt,
            "dos" | "mbr" | "msdos" => LabelType::Dos,
            _ => LabelType::Unknown,
        }
    }

    /// Name accepted by `sfdisk` in a `label:` header
    pub fn sfdisk_name(&self) -> &'static str {
        match self {
            LabelType::Gpt => "gpt",
            LabelType::Dos | LabelType::Unknown => "dos",
        }
    }

    /// Sectors the label keeps free at the end of the disk (GPT backup header + entries)
    pub fn reserved_trailing_sectors(&self, sector_size: u64) -> u64 {
        match self {
            LabelType::Gpt if sector_size > 0 => 1 + GPT_ENTRY_ARRAY_BYTES.div_ceil(sector_size),
            _ => 0,
        }
    }

    /// Last sector an entry of this label type can reference, if bounded
    pub fn max_addressable_sector(&self) -> Option<u64> {
        match self {
            LabelType::Dos => Some(MBR_MAX_SECTOR),
            LabelType::Gpt | LabelType::Unknown => None,
        }
    }
}

impl std::fmt::Display for LabelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LabelType::Gpt => write!(f, "GPT"),
            LabelType::Dos => write!(f, "MBR"),
            LabelType::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Physical/logical shape of a device
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiskGeometry {
    pub total_sectors: u64,
    pub sector_size_bytes: u64,
    pub label_type: LabelType,
    pub reserved_trailing_sectors: u64,
}

impl DiskGeometry {
    pub fn new(total_sectors: u64, sector_size_bytes: u64, label_type: LabelType) -> Self {
        Self {
            total_sectors,
            sector_size_bytes,
            label_type,
            reserved_trailing_sectors: label_type.reserved_trailing_sectors(sector_size_bytes),
        }
    }

    /// Same device viewed through another label type
    pub fn with_label(&self, label_type: LabelType) -> Self {
        Self::new(self.total_sectors, self.sector_size_bytes, label_type)
    }

    pub fn size_bytes(&self) -> u64 {
        self.total_sectors.saturating_mul(self.sector_size_bytes)
    }

    pub fn is_valid(&self) -> bool {
        self.sector_size_bytes > 0 && self.total_sectors > self.reserved_trailing_sectors
    }

    /// Last sector a partition may end on, or `None` for a degenerate geometry
    pub fn usable_last_sector(&self) -> Option<u64> {
        if !self.is_valid() {
            return None;
        }
        let last = self.total_sectors - 1 - self.reserved_trailing_sectors;
        Some(match self.label_type.max_addressable_sector() {
            Some(max) => last.min(max),
            None => last,
        })
    }

    pub fn size_human(&self) -> String {
        format_size(self.size_bytes())
    }
}

/// Semantic purpose of a partition, driving how it is recreated on the destination
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// EFI-style boot partition, recreated as FAT32
    SystemBoot,
    /// Small auxiliary partition left unformatted
    Reserved,
    /// Filesystem of the resizable type, copied with the clone service
    GrowableFilesystem,
    /// Anything else, copied block for block
    Other,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::SystemBoot => write!(f, "boot"),
            Role::Reserved => write!(f, "reserved"),
            Role::GrowableFilesystem => write!(f, "ntfs"),
            Role::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PartitionFlag {
    Boot,
    Esp,
}

/// One entry of a partition table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Partition {
    /// Number in the table (sda3 -> 3)
    pub number: u32,
    /// Device node, e.g. /dev/nvme0n1p3
    pub device: String,
    pub start_sector: u64,
    /// Inclusive
    pub end_sector: u64,
    /// Reported filesystem type, empty when unknown
    pub filesystem_hint: String,
    /// Partition label (GPT name)
    pub name: String,
    /// Filesystem label
    pub fs_label: String,
    /// GPT type GUID or MBR type id as reported by sfdisk
    pub type_code: Option<String>,
    pub flags: BTreeSet<PartitionFlag>,
    pub role: Role,
}

impl Partition {
    pub fn size_sectors(&self) -> u64 {
        self.end_sector - self.start_sector + 1
    }

    pub fn size_bytes(&self, sector_size: u64) -> u64 {
        self.size_sectors() * sector_size
    }
}

/// Partition table as read from a device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartitionTable {
    pub label_type: LabelType,
    pub sector_size: u64,
    /// Ordered by start sector
    pub partitions: Vec<Partition>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EstimateSource {
    ParsedDiagnostic,
    MeasuredUsedSpace,
}

impl std::fmt::Display for EstimateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EstimateSource::ParsedDiagnostic => write!(f, "resize diagnostic"),
            EstimateSource::MeasuredUsedSpace => write!(f, "measured used space"),
        }
    }
}

/// Required space for the growable filesystem, plus the safety margin on top
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SizeEstimate {
    pub required_bytes: u64,
    pub source: EstimateSource,
    pub margin_bytes: u64,
}

impl SizeEstimate {
    pub fn new(required_bytes: u64, source: EstimateSource) -> Result<Self, EstimationError> {
        if required_bytes == 0 {
            return Err(EstimationError::ZeroEstimate { strategy: source });
        }
        Ok(Self {
            required_bytes,
            source,
            margin_bytes: Self::margin_for(required_bytes),
        })
    }

    /// max(5% of required, 1 GiB)
    pub fn margin_for(required_bytes: u64) -> u64 {
        required_bytes.div_ceil(20).max(GIB)
    }

    pub fn total_bytes(&self) -> u64 {
        self.required_bytes.saturating_add(self.margin_bytes)
    }

    /// Whole GiB to recommend to a human
    pub fn recommended_gib(&self) -> u64 {
        self.total_bytes().div_ceil(GIB)
    }
}

/// How the growable partition's new size is chosen
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SizingPolicy {
    /// Keep the source partition's size
    Preserve,
    /// Required bytes plus margin
    Estimated,
    /// Exact byte count requested by the user
    Explicit(u64),
    /// Everything up to the trailing partitions, minus a reserve
    Fill { reserve_bytes: u64 },
}

impl std::fmt::Display for SizingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SizingPolicy::Preserve => write!(f, "preserve source size"),
            SizingPolicy::Estimated => write!(f, "estimated minimum + margin"),
            SizingPolicy::Explicit(bytes) => write!(f, "explicit {}", format_size(*bytes)),
            SizingPolicy::Fill { reserve_bytes } => {
                write!(f, "fill, reserve {}", format_size(*reserve_bytes))
            }
        }
    }
}

/// A destination partition together with the source entry it was derived from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlannedPartition {
    /// Position in the new table, 1-based
    pub number: u32,
    pub start_sector: u64,
    pub end_sector: u64,
    pub source: Partition,
    pub growable: bool,
}

impl PlannedPartition {
    pub fn size_sectors(&self) -> u64 {
        self.end_sector - self.start_sector + 1
    }

    pub fn size_bytes(&self, sector_size: u64) -> u64 {
        self.size_sectors() * sector_size
    }

    pub fn role(&self) -> Role {
        self.source.role
    }

    pub fn moved(&self) -> bool {
        self.start_sector != self.source.start_sector || self.end_sector != self.source.end_sector
    }
}

/// The destination table the orchestrator intends to create
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LayoutPlan {
    pub partitions: Vec<PlannedPartition>,
    pub label_type: LabelType,
    pub growable_index: usize,
    pub geometry: DiskGeometry,
    pub usable_last_sector: u64,
    pub first_trailing_start: Option<u64>,
    pub guard_gap_sectors: u64,
    /// Sectors the sizing policy asked for before clamping
    pub needed_sectors: u64,
    /// True when the source table was reproduced verbatim
    pub mirrored: bool,
}

impl LayoutPlan {
    pub fn growable(&self) -> &PlannedPartition {
        &self.partitions[self.growable_index]
    }

    pub fn last_used_sector(&self) -> u64 {
        self.partitions
            .iter()
            .map(|p| p.end_sector)
            .max()
            .unwrap_or(0)
    }

    pub fn sector_size(&self) -> u64 {
        self.geometry.sector_size_bytes
    }

    pub fn unallocated_tail_sectors(&self) -> u64 {
        self.usable_last_sector.saturating_sub(self.last_used_sector())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(100 * MIB), "100.0 MiB");
        assert_eq!(format_size(47 * GIB + GIB / 2), "47.5 GiB");
        assert_eq!(format_size(2 * TIB), "2.0 TiB");
    }

    #[test]
    fn test_alignment_helpers() {
        assert_eq!(align_up(0, 2048), 0);
        assert_eq!(align_up(1, 2048), 2048);
        assert_eq!(align_up(4096, 2048), 4096);
        assert_eq!(align_down(4097, 2048), 4096);
        assert_eq!(align_down(2047, 2048), 0);
        assert_eq!(align_up(17, 0), 17);
    }

    #[test]
    fn test_gpt_reserves_backup_structures() {
        assert_eq!(LabelType::Gpt.reserved_trailing_sectors(512), 33);
        assert_eq!(LabelType::Gpt.reserved_trailing_sectors(4096), 5);
        assert_eq!(LabelType::Dos.reserved_trailing_sectors(512), 0);
    }

    #[test]
    fn test_usable_last_sector_caps_mbr() {
        let gpt = DiskGeometry::new(1_000_000, 512, LabelType::Gpt);
        assert_eq!(gpt.usable_last_sector(), Some(1_000_000 - 1 - 33));

        let huge_dos = DiskGeometry::new(8_000_000_000, 512, LabelType::Dos);
        assert_eq!(huge_dos.usable_last_sector(), Some(MBR_MAX_SECTOR));

        let degenerate = DiskGeometry::new(33, 512, LabelType::Gpt);
        assert_eq!(degenerate.usable_last_sector(), None);
    }

    #[test]
    fn test_margin_is_at_least_one_gib_and_five_percent() {
        for required in [1, 10 * MIB, 5 * GIB, 20 * GIB, 45 * GIB, 3 * TIB + 7] {
            let margin = SizeEstimate::margin_for(required);
            assert!(margin >= GIB);
            assert!(margin as f64 >= 0.05 * required as f64);
        }
    }

    #[test]
    fn test_estimate_rejects_zero() {
        assert!(SizeEstimate::new(0, EstimateSource::ParsedDiagnostic).is_err());
    }

    #[test]
    fn test_recommended_gib_rounds_up() {
        let estimate = SizeEstimate::new(45 * GIB, EstimateSource::ParsedDiagnostic).unwrap();
        assert_eq!(estimate.margin_bytes, 45 * GIB / 20);
        assert_eq!(estimate.recommended_gib(), 48);
    }

    #[test]
    fn test_label_parsing() {
        assert_eq!(LabelType::from_sfdisk("gpt"), LabelType::Gpt);
        assert_eq!(LabelType::from_sfdisk("dos"), LabelType::Dos);
        assert_eq!(LabelType::from_sfdisk("sun"), LabelType::Unknown);
    }
}
