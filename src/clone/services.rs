//! External tool seams and their production implementation
//!
//! Every trait here maps to one command-line tool family. Read-only queries always
//! execute; mutating calls go through [`CommandExecutor`] and only print in a dry run.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

use super::device::{ResolvedDevice, parse_lsblk_pairs, resolve_from_pairs};
use super::parsing::lsblk::ESP_GUID;
use super::parsing::{BlockProbe, parse_block_devices, parse_partition_table};
use super::types::{LabelType, PartitionTable};
use crate::common::CommandExecutor;
use crate::common::executor::{capture, capture_combined};

const LSBLK_COLUMNS: &str = "NAME,PATH,TYPE,FSTYPE,LABEL,PARTLABEL,PARTTYPE,SIZE,PKNAME,MOUNTPOINT";

pub trait DeviceInfoService {
    fn sector_size(&self, device: &str) -> Result<u64>;
    fn size_bytes(&self, device: &str) -> Result<u64>;
    fn label_type(&self, disk: &str) -> Result<LabelType>;
    fn block_devices(&self, device: &str) -> Result<Vec<BlockProbe>>;
    fn resolve(&self, device: &str) -> Result<ResolvedDevice>;
    fn node_exists(&self, node: &str) -> bool;
}

pub trait PartitionTableService {
    fn read(&self, disk: &str) -> Result<PartitionTable>;
    /// Text dump suitable for `sfdisk <disk> < dump`
    fn dump(&self, disk: &str) -> Result<String>;
    fn write_label(&self, disk: &str, label: LabelType) -> Result<()>;
    /// New entry with the label's default type; codes are assigned afterwards
    fn create_partition(&self, disk: &str, start_sector: u64, size_sectors: u64) -> Result<()>;
    fn set_type_code(&self, disk: &str, number: u32, code: &str) -> Result<()>;
    fn set_name(&self, disk: &str, number: u32, name: &str) -> Result<()>;
    /// GPT: ESP type code. DOS: active flag.
    fn set_boot_marker(&self, disk: &str, number: u32, label: LabelType) -> Result<()>;
    fn resize_entry(
        &self,
        disk: &str,
        number: u32,
        start_sector: u64,
        size_sectors: u64,
    ) -> Result<()>;
    /// Ask the kernel to re-read the table and wait for udev
    fn reprobe(&self, disk: &str, settle_timeout_secs: u64) -> Result<()>;
}

/// Filesystem-aware copy for the growable filesystem type
pub trait CloneService {
    fn available(&self) -> bool;
    fn clone_filesystem(&self, dest: &str, src: &str) -> Result<()>;
}

pub trait RawCopyService {
    fn copy(&self, dest: &str, src: &str, offset_bytes: u64, length_bytes: u64) -> Result<()>;
}

pub trait ResizeService {
    /// Diagnostic report and whether the tool exited successfully
    fn info(&self, partition: &str) -> Result<(bool, String)>;
    /// Grow or shrink the filesystem to fill its partition
    fn resize(&self, partition: &str) -> Result<()>;
}

pub trait FormatService {
    fn format_boot(&self, partition: &str, label: Option<&str>) -> Result<()>;
}

pub trait UsedSpaceMeter {
    fn used_bytes(&self, partition: &str, mountpoint: Option<&str>) -> Result<u64>;
}

/// Borrowed bundle of every service the orchestrator drives
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub device_info: &'a dyn DeviceInfoService,
    pub table: &'a dyn PartitionTableService,
    pub clone: &'a dyn CloneService,
    pub raw_copy: &'a dyn RawCopyService,
    pub resize: &'a dyn ResizeService,
    pub format: &'a dyn FormatService,
    pub meter: &'a dyn UsedSpaceMeter,
}

/// util-linux, ntfs-3g, dosfstools and coreutils
pub struct SystemTools {
    executor: CommandExecutor,
    dd_block_size: String,
}

impl SystemTools {
    pub fn new(executor: CommandExecutor, dd_block_size: impl Into<String>) -> Self {
        Self {
            executor,
            dd_block_size: dd_block_size.into(),
        }
    }

    fn blockdev(&self, flag: &str, device: &str) -> Result<u64> {
        let out = capture(Command::new("blockdev").args([flag, device]))?;
        out.trim()
            .parse()
            .with_context(|| format!("Unexpected blockdev {} output for {}: {}", flag, device, out.trim()))
    }
}

impl DeviceInfoService for SystemTools {
    fn sector_size(&self, device: &str) -> Result<u64> {
        self.blockdev("--getss", device)
    }

    fn size_bytes(&self, device: &str) -> Result<u64> {
        self.blockdev("--getsize64", device)
    }

    fn label_type(&self, disk: &str) -> Result<LabelType> {
        let out = capture(Command::new("lsblk").args(["-n", "-d", "-o", "PTTYPE", disk]))?;
        Ok(LabelType::from_sfdisk(out.trim()))
    }

    fn block_devices(&self, device: &str) -> Result<Vec<BlockProbe>> {
        let out = capture(Command::new("lsblk").args(["-J", "-b", "-o", LSBLK_COLUMNS, device]))?;
        parse_block_devices(&out)
    }

    fn resolve(&self, device: &str) -> Result<ResolvedDevice> {
        let canonical = std::fs::canonicalize(device)
            .with_context(|| format!("Device {} does not exist", device))?;
        let path = canonical.to_string_lossy().into_owned();
        let out = capture(Command::new("lsblk").args([
            "-n",
            "-d",
            "-P",
            "-o",
            "NAME,PKNAME,TYPE",
            path.as_str(),
        ]))?;
        let line = out
            .lines()
            .find(|l| !l.trim().is_empty())
            .with_context(|| format!("lsblk printed nothing for {}", path))?;
        resolve_from_pairs(&path, &parse_lsblk_pairs(line)?)
    }

    fn node_exists(&self, node: &str) -> bool {
        Path::new(node).exists()
    }
}

impl PartitionTableService for SystemTools {
    fn read(&self, disk: &str) -> Result<PartitionTable> {
        let out = capture(Command::new("sfdisk").args(["-J", disk]))
            .with_context(|| format!("Failed to read partition table of {}", disk))?;
        parse_partition_table(&out, disk)
    }

    fn dump(&self, disk: &str) -> Result<String> {
        capture(Command::new("sfdisk").args(["-d", disk]))
    }

    fn write_label(&self, disk: &str, label: LabelType) -> Result<()> {
        self.executor.run_with_input(
            Command::new("sfdisk").args(["--wipe", "always", "--no-reread", disk]),
            &format!("label: {}\n", label.sfdisk_name()),
        )
    }

    fn create_partition(&self, disk: &str, start_sector: u64, size_sectors: u64) -> Result<()> {
        self.executor.run_with_input(
            Command::new("sfdisk").args(["--append", "--no-reread", disk]),
            &format!("start={}, size={}\n", start_sector, size_sectors),
        )
    }

    fn set_type_code(&self, disk: &str, number: u32, code: &str) -> Result<()> {
        let number = number.to_string();
        self.executor.run(Command::new("sfdisk").args([
            "--no-reread",
            "--part-type",
            disk,
            number.as_str(),
            code,
        ]))
    }

    fn set_name(&self, disk: &str, number: u32, name: &str) -> Result<()> {
        let number = number.to_string();
        self.executor.run(Command::new("sfdisk").args([
            "--no-reread",
            "--part-label",
            disk,
            number.as_str(),
            name,
        ]))
    }

    fn set_boot_marker(&self, disk: &str, number: u32, label: LabelType) -> Result<()> {
        match label {
            LabelType::Gpt => self.set_type_code(disk, number, ESP_GUID),
            LabelType::Dos | LabelType::Unknown => {
                let number = number.to_string();
                self.executor.run(Command::new("sfdisk").args([
                    "--no-reread",
                    "--activate",
                    disk,
                    number.as_str(),
                ]))
            }
        }
    }

    fn resize_entry(
        &self,
        disk: &str,
        number: u32,
        start_sector: u64,
        size_sectors: u64,
    ) -> Result<()> {
        let number = number.to_string();
        self.executor.run_with_input(
            Command::new("sfdisk").args(["--no-reread", "-N", number.as_str(), disk]),
            &format!("{}, {}\n", start_sector, size_sectors),
        )
    }

    fn reprobe(&self, disk: &str, settle_timeout_secs: u64) -> Result<()> {
        self.executor.run(Command::new("partprobe").arg(disk))?;
        self.executor.run(
            Command::new("udevadm")
                .arg("settle")
                .arg(format!("--timeout={}", settle_timeout_secs)),
        )
    }
}

impl CloneService for SystemTools {
    fn available(&self) -> bool {
        which::which("ntfsclone").is_ok()
    }

    fn clone_filesystem(&self, dest: &str, src: &str) -> Result<()> {
        self.executor
            .run_with_output(Command::new("ntfsclone").args(["--overwrite", dest, src]))?;
        Ok(())
    }
}

impl RawCopyService for SystemTools {
    fn copy(&self, dest: &str, src: &str, offset_bytes: u64, length_bytes: u64) -> Result<()> {
        self.executor.run_with_output(Command::new("dd").args([
            format!("if={}", src),
            format!("of={}", dest),
            format!("bs={}", self.dd_block_size),
            format!("skip={}", offset_bytes),
            format!("count={}", length_bytes),
            "iflag=skip_bytes,count_bytes".to_string(),
            "conv=fsync".to_string(),
            "status=none".to_string(),
        ]))?;
        Ok(())
    }
}

impl ResizeService for SystemTools {
    fn info(&self, partition: &str) -> Result<(bool, String)> {
        capture_combined(Command::new("ntfsresize").args(["--info", "--force", partition]))
    }

    fn resize(&self, partition: &str) -> Result<()> {
        // ntfsresize asks for confirmation on stdin
        self.executor
            .run_with_input(Command::new("ntfsresize").args(["--force", partition]), "y\n")
    }
}

impl FormatService for SystemTools {
    fn format_boot(&self, partition: &str, label: Option<&str>) -> Result<()> {
        let mut cmd = Command::new("mkfs.fat");
        cmd.arg("-F32");
        if let Some(label) = label {
            cmd.args(["-n", label]);
        }
        cmd.arg(partition);
        self.executor.run_with_output(&mut cmd)?;
        Ok(())
    }
}
