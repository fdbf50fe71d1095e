//! Recording stand-in for every external service

use anyhow::{Result, anyhow};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

use super::device::ResolvedDevice;
use super::parsing::BlockProbe;
use super::services::{
    CloneService, DeviceInfoService, FormatService, PartitionTableService, RawCopyService,
    ResizeService, Services, UsedSpaceMeter,
};
use super::types::{GIB, LabelType, MIB, Partition, PartitionFlag, PartitionTable, Role};

pub struct FakeSystem {
    pub calls: RefCell<Vec<String>>,
    pub resolved: HashMap<String, ResolvedDevice>,
    pub sector_size: u64,
    /// Device node to size in bytes
    pub sizes: HashMap<String, u64>,
    pub labels: HashMap<String, LabelType>,
    pub tables: HashMap<String, PartitionTable>,
    pub probes: Vec<BlockProbe>,
    pub diagnostic: Option<(bool, String)>,
    pub used_bytes: Option<u64>,
    pub clone_available: bool,
    pub nodes_appear: bool,
    /// Sector counts of partitions created on /dev/sdb, by number
    pub created: RefCell<Vec<u64>>,
    /// Calls starting with this prefix fail
    pub fail_on: Option<String>,
}

fn part(number: u32, start: u64, sectors: u64, fs: &str, name: &str) -> Partition {
    Partition {
        number,
        device: format!("/dev/sda{}", number),
        start_sector: start,
        end_sector: start + sectors - 1,
        filesystem_hint: fs.into(),
        name: name.into(),
        fs_label: String::new(),
        type_code: None,
        flags: BTreeSet::new(),
        role: Role::Other,
    }
}

impl FakeSystem {
    /// /dev/sda: 256 GB GPT disk with ESP, MSR, 100 GiB NTFS and a 16 MiB recovery
    /// partition. /dev/sdb: blank 1 TB disk.
    pub fn windows_to_larger_disk() -> Self {
        let esp = part(1, 2048, 100 * MIB / 512, "vfat", "EFI system partition");
        let msr = part(2, 206848, 16 * MIB / 512, "", "Microsoft reserved partition");
        let data = part(3, 239616, 100 * GIB / 512, "ntfs", "Basic data partition");
        let recovery = part(4, 209_954_816, 16 * MIB / 512, "ntfs", "");

        let mut sizes = HashMap::new();
        sizes.insert("/dev/sda".to_string(), 500_118_192 * 512);
        sizes.insert("/dev/sdb".to_string(), 1_953_525_168 * 512);
        for p in [&esp, &msr, &data, &recovery] {
            sizes.insert(p.device.clone(), p.size_bytes(512));
        }

        let mut labels = HashMap::new();
        labels.insert("/dev/sda".to_string(), LabelType::Gpt);
        labels.insert("/dev/sdb".to_string(), LabelType::Unknown);

        let mut resolved = HashMap::new();
        for (path, disk, number) in [
            ("/dev/sda", "/dev/sda", None),
            ("/dev/sda3", "/dev/sda", Some(3)),
            ("/dev/sdb", "/dev/sdb", None),
            ("/dev/sdb2", "/dev/sdb", Some(2)),
        ] {
            resolved.insert(
                path.to_string(),
                ResolvedDevice {
                    path: path.to_string(),
                    disk: disk.to_string(),
                    partition_number: number,
                },
            );
        }

        let mut tables = HashMap::new();
        tables.insert(
            "/dev/sda".to_string(),
            PartitionTable {
                label_type: LabelType::Gpt,
                sector_size: 512,
                partitions: vec![esp, msr, data, recovery],
            },
        );

        Self {
            calls: RefCell::new(Vec::new()),
            resolved,
            sector_size: 512,
            sizes,
            labels,
            tables,
            probes: Vec::new(),
            diagnostic: Some((
                true,
                "You might resize at 48318382080 bytes or 48319 MB (freeing 54000 MB).".into(),
            )),
            used_bytes: None,
            clone_available: true,
            nodes_appear: true,
            created: RefCell::new(Vec::new()),
            fail_on: None,
        }
    }

    /// /dev/sda: 256 GB MBR disk with an active 100 MiB "System Reserved" NTFS partition
    /// and a 100 GiB NTFS partition. /dev/sdb: blank 1 TB disk.
    pub fn legacy_windows_to_larger_disk() -> Self {
        let mut reserved = part(1, 2048, 100 * MIB / 512, "ntfs", "");
        reserved.fs_label = "System Reserved".into();
        reserved.flags.insert(PartitionFlag::Boot);
        let data = part(2, 206848, 100 * GIB / 512, "ntfs", "");

        let mut fake = Self::windows_to_larger_disk();
        for p in [&reserved, &data] {
            fake.sizes.insert(p.device.clone(), p.size_bytes(512));
        }
        fake.labels.insert("/dev/sda".to_string(), LabelType::Dos);
        fake.tables.insert(
            "/dev/sda".to_string(),
            PartitionTable {
                label_type: LabelType::Dos,
                sector_size: 512,
                partitions: vec![reserved, data],
            },
        );
        fake
    }

    pub fn services(&self) -> Services<'_> {
        Services {
            device_info: self,
            table: self,
            clone: self,
            raw_copy: self,
            resize: self,
            format: self,
            meter: self,
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Calls that change a device
    pub fn mutations(&self) -> Vec<String> {
        const READS: &[&str] = &["dump", "info", "used_bytes"];
        self.calls()
            .into_iter()
            .filter(|c| !READS.iter().any(|r| c.starts_with(r)))
            .collect()
    }

    fn record(&self, call: String) -> Result<()> {
        let fails = self.fail_on.as_deref().is_some_and(|f| call.starts_with(f));
        self.calls.borrow_mut().push(call.clone());
        if fails {
            return Err(anyhow!("simulated failure: {}", call));
        }
        Ok(())
    }

    fn size_of(&self, device: &str) -> Result<u64> {
        if let Some(size) = self.sizes.get(device) {
            return Ok(*size);
        }
        device
            .strip_prefix("/dev/sdb")
            .and_then(|n| n.parse::<usize>().ok())
            .and_then(|n| self.created.borrow().get(n.wrapping_sub(1)).copied())
            .map(|sectors| sectors * self.sector_size)
            .ok_or_else(|| anyhow!("no such device {}", device))
    }
}

impl DeviceInfoService for FakeSystem {
    fn sector_size(&self, _device: &str) -> Result<u64> {
        Ok(self.sector_size)
    }

    fn size_bytes(&self, device: &str) -> Result<u64> {
        self.size_of(device)
    }

    fn label_type(&self, disk: &str) -> Result<LabelType> {
        Ok(self.labels.get(disk).copied().unwrap_or(LabelType::Unknown))
    }

    fn block_devices(&self, _device: &str) -> Result<Vec<BlockProbe>> {
        Ok(self.probes.clone())
    }

    fn resolve(&self, device: &str) -> Result<ResolvedDevice> {
        self.resolved
            .get(device)
            .cloned()
            .ok_or_else(|| anyhow!("Device {} does not exist", device))
    }

    fn node_exists(&self, _node: &str) -> bool {
        self.nodes_appear
    }
}

impl PartitionTableService for FakeSystem {
    fn read(&self, disk: &str) -> Result<PartitionTable> {
        self.tables
            .get(disk)
            .cloned()
            .ok_or_else(|| anyhow!("{} does not contain a recognized partition table", disk))
    }

    fn dump(&self, disk: &str) -> Result<String> {
        self.record(format!("dump {}", disk))?;
        match self.tables.get(disk) {
            Some(table) => Ok(format!("label: {}\n", table.label_type.sfdisk_name())),
            None => Err(anyhow!("{} does not contain a recognized partition table", disk)),
        }
    }

    fn write_label(&self, disk: &str, label: LabelType) -> Result<()> {
        self.record(format!("write_label {} {}", disk, label.sfdisk_name()))
    }

    fn create_partition(&self, disk: &str, start_sector: u64, size_sectors: u64) -> Result<()> {
        self.record(format!("create {} {} {}", disk, start_sector, size_sectors))?;
        self.created.borrow_mut().push(size_sectors);
        Ok(())
    }

    fn set_type_code(&self, disk: &str, number: u32, code: &str) -> Result<()> {
        self.record(format!("type {} {} {}", disk, number, code))
    }

    fn set_name(&self, disk: &str, number: u32, name: &str) -> Result<()> {
        self.record(format!("name {} {} {}", disk, number, name))
    }

    fn set_boot_marker(&self, disk: &str, number: u32, label: LabelType) -> Result<()> {
        self.record(format!("boot {} {} {}", disk, number, label.sfdisk_name()))
    }

    fn resize_entry(&self, disk: &str, number: u32, start: u64, size: u64) -> Result<()> {
        self.record(format!("resize_entry {} {} {} {}", disk, number, start, size))?;
        if let Some(entry) = self.created.borrow_mut().get_mut(number as usize - 1) {
            *entry = size;
        }
        Ok(())
    }

    fn reprobe(&self, disk: &str, _settle_timeout_secs: u64) -> Result<()> {
        self.record(format!("reprobe {}", disk))
    }
}

impl CloneService for FakeSystem {
    fn available(&self) -> bool {
        self.clone_available
    }

    fn clone_filesystem(&self, dest: &str, src: &str) -> Result<()> {
        self.record(format!("clone {} {}", dest, src))
    }
}

impl RawCopyService for FakeSystem {
    fn copy(&self, dest: &str, src: &str, offset: u64, length: u64) -> Result<()> {
        self.record(format!("copy {} {} {} {}", dest, src, offset, length))
    }
}

impl ResizeService for FakeSystem {
    fn info(&self, partition: &str) -> Result<(bool, String)> {
        self.record(format!("info {}", partition))?;
        self.diagnostic
            .clone()
            .ok_or_else(|| anyhow!("ntfsresize: command not found"))
    }

    fn resize(&self, partition: &str) -> Result<()> {
        self.record(format!("resize_fs {}", partition))
    }
}

impl FormatService for FakeSystem {
    fn format_boot(&self, partition: &str, label: Option<&str>) -> Result<()> {
        self.record(format!("format {} {}", partition, label.unwrap_or("-")))
    }
}

impl UsedSpaceMeter for FakeSystem {
    fn used_bytes(&self, partition: &str, _mountpoint: Option<&str>) -> Result<u64> {
        self.record(format!("used_bytes {}", partition))?;
        self.used_bytes
            .ok_or_else(|| anyhow!("mount: {}: target is busy", partition))
    }
}
