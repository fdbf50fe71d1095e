//! Used-space accounting for a filesystem, mounted read-only when needed

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use walkdir::WalkDir;

use super::services::UsedSpaceMeter;
use crate::common::executor::capture;
use crate::ui::prelude::*;

/// Measures used bytes by walking the directory tree.
///
/// The mount is never routed through the dry-run executor: a dry run still has to
/// report real numbers, and a read-only mount changes nothing on the device.
pub struct MountingMeter {
    mount_options: String,
}

impl MountingMeter {
    pub fn new(mount_options: &str) -> Self {
        Self {
            mount_options: read_only_options(mount_options),
        }
    }
}

/// Make sure `ro` is part of the mount options
pub fn read_only_options(options: &str) -> String {
    let mut parts: Vec<&str> = options
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty() && *o != "rw")
        .collect();
    if !parts.contains(&"ro") {
        parts.insert(0, "ro");
    }
    parts.join(",")
}

/// Unmounts on drop, including on early return
struct MountGuard {
    dir: PathBuf,
}

impl Drop for MountGuard {
    fn drop(&mut self) {
        if let Err(e) = capture(Command::new("umount").arg(&self.dir)) {
            emit(
                Level::Warn,
                "clone.measure.umount_failed",
                &format!(
                    "{} Failed to unmount {}: {}",
                    char::from(NerdFont::Warning),
                    self.dir.display(),
                    e
                ),
                None,
            );
        }
    }
}

/// Sum of regular file sizes below `root`, staying on one filesystem
pub fn sum_tree(root: &Path) -> Result<u64> {
    let mut total: u64 = 0;
    for entry in WalkDir::new(root)
        .follow_links(false)
        .same_file_system(true)
    {
        let entry = match entry {
            Ok(entry) => entry,
            // Unreadable entries are skipped; the margin absorbs them
            Err(_) => continue,
        };
        if entry.file_type().is_file()
            && let Ok(metadata) = entry.metadata()
        {
            total = total.saturating_add(metadata.len());
        }
    }
    Ok(total)
}

impl UsedSpaceMeter for MountingMeter {
    fn used_bytes(&self, partition: &str, mountpoint: Option<&str>) -> Result<u64> {
        if let Some(mountpoint) = mountpoint {
            emit(
                Level::Debug,
                "clone.measure.reuse_mount",
                &format!("Measuring {} at existing mountpoint {}", partition, mountpoint),
                None,
            );
            return sum_tree(Path::new(mountpoint));
        }

        let dir = tempfile::Builder::new()
            .prefix("growclone-")
            .tempdir()
            .context("Failed to create a temporary mountpoint")?;

        capture(
            Command::new("mount")
                .args(["-o", self.mount_options.as_str(), partition])
                .arg(dir.path()),
        )
        .with_context(|| format!("Failed to mount {} read-only (is it in use?)", partition))?;

        let guard = MountGuard {
            dir: dir.path().to_path_buf(),
        };
        let used = sum_tree(&guard.dir);
        drop(guard);
        used
    }
}
