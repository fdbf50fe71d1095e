//! Checks that must pass before anything is written, and the confirmation gates

use std::io::IsTerminal;

use super::device::ResolvedDevice;
use super::error::SafetyError;
use super::types::LayoutPlan;
use crate::ui::NerdFont;

/// Validate source/destination identity and destination capacity against a plan
pub fn validate(
    source: &ResolvedDevice,
    dest: &ResolvedDevice,
    plan: &LayoutPlan,
) -> Result<(), SafetyError> {
    check_identity(source, dest)?;
    check_capacity(&dest.disk, plan.geometry.total_sectors, plan.last_used_sector())
}

/// The planned growable partition must hold the whole source growable device.
///
/// `source_growable_bytes` is the device size of the source growable partition.
pub fn check_growable_fits(plan: &LayoutPlan, source_growable_bytes: u64) -> Result<(), SafetyError> {
    let growable = plan.growable();
    check_clone_capacity(
        growable.number,
        growable.size_bytes(plan.sector_size()),
        source_growable_bytes,
    )
}

/// Source and destination must be different disks, and the destination a whole disk
pub fn check_identity(source: &ResolvedDevice, dest: &ResolvedDevice) -> Result<(), SafetyError> {
    if source.path == dest.path {
        return Err(SafetyError::SameDevice {
            path: source.path.clone(),
        });
    }
    if source.disk == dest.disk {
        return Err(SafetyError::SameDisk {
            source_path: source.path.clone(),
            dest_path: dest.path.clone(),
            disk: dest.disk.clone(),
        });
    }
    if dest.is_partition() {
        return Err(SafetyError::DestinationNotDisk {
            path: dest.path.clone(),
            disk: dest.disk.clone(),
        });
    }
    Ok(())
}

/// The destination must hold every planned sector
pub fn check_capacity(device: &str, total_sectors: u64, last_used: u64) -> Result<(), SafetyError> {
    if last_used >= total_sectors {
        return Err(SafetyError::InsufficientCapacity {
            device: device.to_string(),
            total_sectors,
            last_used,
        });
    }
    Ok(())
}

/// A filesystem clone must never be pointed at a smaller partition than its source
pub fn check_clone_capacity(
    number: u32,
    dest_bytes: u64,
    source_bytes: u64,
) -> Result<(), SafetyError> {
    if dest_bytes < source_bytes {
        return Err(SafetyError::CloneTargetTooSmall {
            number,
            dest_bytes,
            source_bytes,
        });
    }
    Ok(())
}

/// Yes/no gate in front of destructive steps
pub trait Confirmer {
    fn confirm(&self, prompt: &str) -> Result<bool, SafetyError>;
}

/// `--yes`: every gate passes
pub struct AutoConfirm;

impl Confirmer for AutoConfirm {
    fn confirm(&self, _prompt: &str) -> Result<bool, SafetyError> {
        Ok(true)
    }
}

/// Interactive prompt, defaulting to "no"
pub struct PromptConfirm;

impl Confirmer for PromptConfirm {
    fn confirm(&self, prompt: &str) -> Result<bool, SafetyError> {
        if !std::io::stdin().is_terminal() {
            return Err(SafetyError::ConfirmationUnavailable(
                "standard input is not a terminal".to_string(),
            ));
        }
        dialoguer::Confirm::new()
            .with_prompt(format!("{} {}", NerdFont::Question, prompt))
            .default(false)
            .interact()
            .map_err(|e| SafetyError::ConfirmationUnavailable(e.to_string()))
    }
}
