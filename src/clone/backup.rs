//! Recovery artifacts written before the destination table is replaced

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};

use super::device::kernel_name;
use super::services::{PartitionTableService, RawCopyService};
use crate::ui::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPaths {
    /// `sfdisk -d` dump, restorable with `sfdisk <disk> < file`
    pub table: PathBuf,
    /// Raw copy of the leading region
    pub head: PathBuf,
}

pub fn backup_paths(dir: &Path, disk: &str, at: DateTime<Local>) -> BackupPaths {
    let stem = format!(
        "growclone-{}-{}",
        kernel_name(disk),
        at.format("%Y%m%d-%H%M%S")
    );
    BackupPaths {
        table: dir.join(format!("{}.sfdisk", stem)),
        head: dir.join(format!("{}.head.img", stem)),
    }
}

/// What was actually saved; the table dump is absent when the disk had no table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOutcome {
    pub table: Option<PathBuf>,
    pub head: PathBuf,
}

pub fn write_backup(
    table: &dyn PartitionTableService,
    raw_copy: &dyn RawCopyService,
    disk: &str,
    dir: &Path,
    head_bytes: u64,
    dry_run: bool,
) -> Result<BackupOutcome> {
    let paths = backup_paths(dir, disk, Local::now());
    if !dry_run {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating backup directory {}", dir.display()))?;
    }

    let saved_table = match table.dump(disk) {
        Ok(dump) if dry_run => {
            emit(
                Level::Info,
                "exec.dry_run",
                &format!("[DRY RUN] sfdisk -d {} > {}", disk, paths.table.display()),
                None,
            );
            emit(
                Level::Debug,
                "clone.backup.dump",
                &format!("Current table of {}:\n{}", disk, dump.trim_end()),
                None,
            );
            Some(paths.table.clone())
        }
        Ok(dump) => {
            fs::write(&paths.table, dump)
                .with_context(|| format!("writing {}", paths.table.display()))?;
            Some(paths.table.clone())
        }
        Err(e) => {
            emit(
                Level::Info,
                "clone.backup.no_table",
                &format!(
                    "{} No partition table to dump on {} ({:#})",
                    char::from(NerdFont::Info),
                    disk,
                    e
                ),
                None,
            );
            None
        }
    };

    let head = paths.head.to_string_lossy().into_owned();
    raw_copy
        .copy(&head, disk, 0, head_bytes)
        .with_context(|| format!("copying the first {} bytes of {}", head_bytes, disk))?;

    Ok(BackupOutcome {
        table: saved_table,
        head: paths.head,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clone::testing::FakeSystem;
    use chrono::TimeZone;

    #[test]
    fn test_backup_paths_are_timestamped() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let paths = backup_paths(Path::new("/var/backups"), "/dev/nvme0n1", at);
        assert_eq!(
            paths.table,
            PathBuf::from("/var/backups/growclone-nvme0n1-20240309-140507.sfdisk")
        );
        assert_eq!(
            paths.head,
            PathBuf::from("/var/backups/growclone-nvme0n1-20240309-140507.head.img")
        );
    }

    #[test]
    fn test_backup_writes_dump_and_copies_head() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeSystem::windows_to_larger_disk();
        let outcome = write_backup(&fake, &fake, "/dev/sda", dir.path(), 1024 * 1024, false).unwrap();

        let table = outcome.table.unwrap();
        assert_eq!(fs::read_to_string(&table).unwrap(), "label: gpt\n");

        let copies: Vec<String> = fake
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("copy"))
            .collect();
        assert_eq!(copies.len(), 1);
        assert!(copies[0].contains(".head.img /dev/sda 0 1048576"));
    }

    #[test]
    fn test_blank_disk_still_gets_head_copy() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeSystem::windows_to_larger_disk();
        let outcome = write_backup(&fake, &fake, "/dev/sdb", dir.path(), 512, false).unwrap();
        assert!(outcome.table.is_none());
        assert!(fake.calls().iter().any(|c| c.starts_with("copy")));
    }

    #[test]
    fn test_dry_run_writes_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeSystem::windows_to_larger_disk();
        let outcome = write_backup(&fake, &fake, "/dev/sda", dir.path(), 512, true).unwrap();
        assert!(outcome.table.is_some());
        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
