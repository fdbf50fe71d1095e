//! The clone state machine
//!
//! States run in a fixed order. Fatal steps map their failure to an [`ExecutionError`];
//! best-effort steps warn and continue.

use serde::Serialize;
use std::thread;
use std::time::{Duration, Instant};

use super::backup;
use super::classify::{classify_table, select_growable, type_code_for};
use super::config::CloneConfig;
use super::device::{ResolvedDevice, enrich_partitions, get_part_path, mountpoint_of, read_geometry};
use super::error::{CloneError, ExecutionError, SafetyError};
use super::estimate::SizeEstimator;
use super::layout::{self, PlanningContext};
use super::report;
use super::safety::{self, Confirmer};
use super::services::Services;
use super::types::{
    LabelType, LayoutPlan, PartitionFlag, PartitionTable, PlannedPartition, Role, SizeEstimate,
    SizingPolicy, format_size,
};
use crate::common::progress::{create_spinner, finish_spinner_with_failure, finish_spinner_with_success};
use crate::ui::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloneState {
    Start,
    ReadSourceGeometryAndTable,
    EstimateSize,
    ClassifyRoles,
    ComputeLayoutPlan,
    ValidateSafety,
    PresentPlan,
    AwaitConfirmation,
    BackupDestinationTable,
    WriteDestinationLabel,
    CreateDestinationPartitions,
    AssignTypeCodes,
    ReprobeKernelView,
    PerFilesystemAction,
    ResizeGrowablePartitionEntry,
    ResizeGrowableFilesystem,
    Done,
    Aborted,
}

impl std::fmt::Display for CloneState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CloneState::Start => "start",
            CloneState::ReadSourceGeometryAndTable => "read source geometry and table",
            CloneState::EstimateSize => "estimate size",
            CloneState::ClassifyRoles => "classify roles",
            CloneState::ComputeLayoutPlan => "compute layout plan",
            CloneState::ValidateSafety => "validate safety",
            CloneState::PresentPlan => "present plan",
            CloneState::AwaitConfirmation => "await confirmation",
            CloneState::BackupDestinationTable => "back up destination table",
            CloneState::WriteDestinationLabel => "write destination label",
            CloneState::CreateDestinationPartitions => "create destination partitions",
            CloneState::AssignTypeCodes => "assign type codes",
            CloneState::ReprobeKernelView => "re-read partition table",
            CloneState::PerFilesystemAction => "copy partition contents",
            CloneState::ResizeGrowablePartitionEntry => "resize growable partition entry",
            CloneState::ResizeGrowableFilesystem => "resize growable filesystem",
            CloneState::Done => "done",
            CloneState::Aborted => "aborted",
        };
        write!(f, "{}", name)
    }
}

/// What the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Print the size estimate and stop
    CalcOnly,
    /// Recreate the source layout on the destination
    Recreate(SizingPolicy),
}

#[derive(Debug, Clone)]
pub struct CloneRequest {
    pub source: String,
    pub destination: Option<String>,
    pub mode: Mode,
    pub growable: Option<u32>,
    pub label: Option<LabelType>,
    pub dry_run: bool,
}

#[derive(Debug)]
pub enum Outcome {
    Estimated,
    /// Dry run finished; nothing was written
    Planned,
    Completed,
    /// A confirmation was declined; the trace ends in the declined state
    Aborted,
}

pub struct CloneOrchestrator<'a> {
    services: Services<'a>,
    confirmer: &'a dyn Confirmer,
    config: &'a CloneConfig,
    trace: Vec<CloneState>,
    poll_interval: Duration,
}

/// Source side after reading
struct SourceView {
    device: ResolvedDevice,
    table: PartitionTable,
    growable_index: usize,
    estimate: SizeEstimate,
}

impl<'a> CloneOrchestrator<'a> {
    pub fn new(services: Services<'a>, confirmer: &'a dyn Confirmer, config: &'a CloneConfig) -> Self {
        Self {
            services,
            confirmer,
            config,
            trace: Vec::new(),
            poll_interval: Duration::from_millis(200),
        }
    }

    /// Every state entered so far, in order
    #[cfg(test)]
    pub fn trace(&self) -> &[CloneState] {
        &self.trace
    }

    fn enter(&mut self, state: CloneState) {
        emit(
            Level::Debug,
            "clone.state.enter",
            &format!("{} {}", char::from(NerdFont::ArrowRight), state),
            serde_json::to_value(state).ok(),
        );
        self.trace.push(state);
    }

    fn abort(&mut self, at: CloneState) -> Outcome {
        self.enter(CloneState::Aborted);
        emit(
            Level::Warn,
            "clone.aborted",
            &format!(
                "{} Aborted at '{}' by user; {}",
                char::from(NerdFont::Stop),
                at,
                if self.trace.contains(&CloneState::WriteDestinationLabel) {
                    "the destination is partially written"
                } else {
                    "nothing was written"
                }
            ),
            None,
        );
        Outcome::Aborted
    }

    fn confirm(&self, dry_run: bool, prompt: &str) -> Result<bool, SafetyError> {
        if dry_run {
            return Ok(true);
        }
        self.confirmer.confirm(prompt)
    }

    pub fn run(&mut self, request: &CloneRequest) -> Result<Outcome, CloneError> {
        self.enter(CloneState::Start);

        let mut source = self.read_source(request)?;
        let policy = match request.mode {
            Mode::CalcOnly => {
                self.enter(CloneState::Done);
                return Ok(Outcome::Estimated);
            }
            Mode::Recreate(policy) => policy,
        };

        let destination = request
            .destination
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("a destination device is required unless --calc-only is set"))?;

        self.enter(CloneState::ClassifyRoles);
        classify_table(&mut source.table);
        for p in &source.table.partitions {
            emit(
                Level::Debug,
                "clone.classify.role",
                &format!(
                    "{} ({}, '{}', {}) -> {}",
                    p.device,
                    if p.filesystem_hint.is_empty() { "?" } else { p.filesystem_hint.as_str() },
                    p.name,
                    format_size(p.size_bytes(source.table.sector_size)),
                    p.role
                ),
                None,
            );
        }

        self.enter(CloneState::ComputeLayoutPlan);
        let svc = self.services;
        let dest = svc.device_info.resolve(destination)?;
        safety::check_identity(&source.device, &dest)?;
        let dest_geometry = read_geometry(svc.device_info, &dest.path)?;
        let source_geometry = read_geometry(svc.device_info, &source.device.disk)?;

        if let SizingPolicy::Explicit(bytes) = policy
            && bytes < source.estimate.total_bytes()
        {
            emit(
                Level::Warn,
                "clone.plan.below_margin",
                &format!(
                    "{} Requested {} is below the recommended {} GiB",
                    char::from(NerdFont::Warning),
                    format_size(bytes),
                    source.estimate.recommended_gib()
                ),
                None,
            );
        }

        let ctx = PlanningContext {
            source_table: source.table.clone(),
            source_geometry,
            growable_index: source.growable_index,
            dest_geometry,
            estimate: source.estimate,
            policy,
            forced_label: request.label,
            alignment_sectors: self.config.alignment_sectors,
            guard_gap_sectors: self.config.guard_gap_sectors,
        };
        let plan = layout::plan(&ctx)?;

        self.enter(CloneState::ValidateSafety);
        let growable_src = &plan.growable().source.device;
        let source_growable_bytes = svc.device_info.size_bytes(growable_src)?;
        safety::validate(&source.device, &dest, &plan)?;
        // A dry run still shows a plan that cannot be cloned, then fails
        let too_small = match safety::check_growable_fits(&plan, source_growable_bytes) {
            Err(e) if request.dry_run => Some(e),
            result => {
                result?;
                None
            }
        };

        self.enter(CloneState::PresentPlan);
        report::present_plan(
            &source.device.disk,
            &dest.disk,
            policy,
            &source.estimate,
            &plan,
            source.table.label_type,
        );
        if let Some(e) = too_small {
            return Err(e.into());
        }

        self.enter(CloneState::AwaitConfirmation);
        if request.dry_run {
            emit(
                Level::Info,
                "clone.dry_run",
                &format!(
                    "{} Dry run: the commands below are printed, not executed",
                    char::from(NerdFont::Info)
                ),
                None,
            );
        } else if !self.confirm(false, &format!("Proceed with this plan for {}?", dest.disk))? {
            return Ok(self.abort(CloneState::AwaitConfirmation));
        }

        if let Some(at) = self.execute(&source, &dest, &plan, request.dry_run)? {
            return Ok(self.abort(at));
        }

        self.enter(CloneState::Done);
        emit(
            Level::Success,
            "clone.done",
            &format!(
                "{} {} {}",
                char::from(NerdFont::Check),
                if request.dry_run { "Dry run complete for" } else { "Cloned onto" },
                dest.disk
            ),
            None,
        );
        Ok(if request.dry_run {
            Outcome::Planned
        } else {
            Outcome::Completed
        })
    }

    fn read_source(&mut self, request: &CloneRequest) -> Result<SourceView, CloneError> {
        let svc = self.services;

        self.enter(CloneState::ReadSourceGeometryAndTable);
        let device = svc.device_info.resolve(&request.source)?;
        let mut table = svc.table.read(&device.disk)?;
        let probes = svc.device_info.block_devices(&device.disk)?;
        enrich_partitions(&mut table, &probes);
        if table.partitions.is_empty() {
            return Err(anyhow::anyhow!("{} has no partitions to clone", device.disk).into());
        }
        emit(
            Level::Info,
            "clone.source.read",
            &format!(
                "{} {}: {} table, {} partitions, {}-byte sectors",
                char::from(NerdFont::HardDrive),
                device.disk,
                table.label_type,
                table.partitions.len(),
                table.sector_size
            ),
            None,
        );

        self.enter(CloneState::EstimateSize);
        let explicit = request.growable.or(device.partition_number);
        let growable_index = select_growable(&table, &device.disk, explicit)?;
        let growable = &table.partitions[growable_index];
        let estimate = SizeEstimator::new(svc.resize, svc.meter).estimate(
            growable,
            table.sector_size,
            mountpoint_of(&probes, &growable.device),
        )?;
        report::print_estimate(&growable.device, &estimate);

        Ok(SourceView {
            device,
            table,
            growable_index,
            estimate,
        })
    }

    /// Runs every writing state. Returns the state a declined confirmation stopped in.
    fn execute(
        &mut self,
        source: &SourceView,
        dest: &ResolvedDevice,
        plan: &LayoutPlan,
        dry_run: bool,
    ) -> Result<Option<CloneState>, CloneError> {
        let svc = self.services;
        let disk = dest.disk.as_str();
        let ss = plan.sector_size();

        self.enter(CloneState::BackupDestinationTable);
        match backup::write_backup(
            svc.table,
            svc.raw_copy,
            disk,
            &self.config.backup_dir,
            self.config.backup_head_bytes,
            dry_run,
        ) {
            Ok(outcome) => emit(
                Level::Success,
                "clone.backup.saved",
                &format!(
                    "{} Backup: {}{}",
                    char::from(NerdFont::Save),
                    outcome.head.display(),
                    outcome
                        .table
                        .map(|t| format!(", {}", t.display()))
                        .unwrap_or_default()
                ),
                None,
            ),
            Err(e) => emit(
                Level::Warn,
                "clone.backup.failed",
                &format!("{} Backup of {} failed: {:#}", char::from(NerdFont::Warning), disk, e),
                None,
            ),
        }

        if !self.confirm(
            dry_run,
            &format!(
                "Erase the partition table on {} and write a new {} table?",
                disk, plan.label_type
            ),
        )? {
            return Ok(Some(CloneState::BackupDestinationTable));
        }

        self.enter(CloneState::WriteDestinationLabel);
        svc.table
            .write_label(disk, plan.label_type)
            .map_err(|e| ExecutionError::step(CloneState::WriteDestinationLabel, disk, e))?;

        self.enter(CloneState::CreateDestinationPartitions);
        for p in &plan.partitions {
            svc.table
                .create_partition(disk, p.start_sector, initial_size(p))
                .map_err(|e| ExecutionError::step(CloneState::CreateDestinationPartitions, disk, e))?;
        }

        self.enter(CloneState::AssignTypeCodes);
        for p in &plan.partitions {
            let code = type_code_for(
                p.role(),
                plan.label_type,
                p.source.type_code.as_deref(),
                source.table.label_type,
            );
            if let Err(e) = svc.table.set_type_code(disk, p.number, &code) {
                warn_best_effort("clone.type_code.failed", &format!("type code of partition {}", p.number), &e);
            }
            if plan.label_type == LabelType::Gpt
                && !p.source.name.is_empty()
                && let Err(e) = svc.table.set_name(disk, p.number, &p.source.name)
            {
                warn_best_effort("clone.name.failed", &format!("name of partition {}", p.number), &e);
            }
        }
        let active = active_partition(plan);
        if let Some(number) = active
            && let Err(e) = svc.table.set_boot_marker(disk, number, plan.label_type)
        {
            warn_best_effort("clone.boot_marker.failed", &format!("active flag on partition {}", number), &e);
        }

        self.enter(CloneState::ReprobeKernelView);
        self.reprobe(disk, plan, dry_run)?;

        // On MBR only one partition may be active
        let boot_marker = active.is_none().then_some(plan.label_type);

        self.enter(CloneState::PerFilesystemAction);
        for p in &plan.partitions {
            let node = get_part_path(disk, p.number);
            if !self.copy_partition(p, &node, disk, boot_marker, ss, dry_run)? {
                return Ok(Some(CloneState::PerFilesystemAction));
            }
        }

        let growable = plan.growable();
        let node = get_part_path(disk, growable.number);

        self.enter(CloneState::ResizeGrowablePartitionEntry);
        svc.table
            .resize_entry(disk, growable.number, growable.start_sector, growable.size_sectors())
            .map_err(|e| ExecutionError::step(CloneState::ResizeGrowablePartitionEntry, disk, e))?;
        if let Err(e) = svc.table.reprobe(disk, self.config.settle_timeout_secs) {
            warn_best_effort("clone.reprobe.failed", "re-reading the resized table", &e);
        }

        self.enter(CloneState::ResizeGrowableFilesystem);
        emit(
            Level::Info,
            "clone.resize.start",
            &format!("{} Growing the filesystem on {}", char::from(NerdFont::Wrench), node),
            None,
        );
        match svc.resize.resize(&node) {
            Ok(()) => emit(
                Level::Success,
                "clone.resize.done",
                &format!(
                    "{} {} resized to {}",
                    char::from(NerdFont::Check),
                    node,
                    format_size(growable.size_bytes(ss))
                ),
                None,
            ),
            Err(e) => warn_best_effort(
                "clone.resize.failed",
                &format!("growing the filesystem on {} (run ntfsresize manually)", node),
                &e,
            ),
        }
        Ok(None)
    }

    fn reprobe(&self, disk: &str, plan: &LayoutPlan, dry_run: bool) -> Result<(), CloneError> {
        let svc = self.services;
        let timeout = self.config.settle_timeout_secs;
        emit(
            Level::Info,
            "clone.reprobe",
            &format!("{} Re-reading the partition table of {}", char::from(NerdFont::Refresh), disk),
            None,
        );
        if let Err(e) = svc.table.reprobe(disk, timeout) {
            warn_best_effort("clone.reprobe.failed", "re-reading the partition table", &e);
        }
        if dry_run {
            return Ok(());
        }

        let nodes: Vec<String> = plan
            .partitions
            .iter()
            .map(|p| get_part_path(disk, p.number))
            .collect();
        let deadline = Instant::now() + Duration::from_secs(timeout);
        loop {
            let missing = nodes.iter().find(|n| !svc.device_info.node_exists(n));
            match missing {
                None => return Ok(()),
                Some(node) if Instant::now() >= deadline => {
                    return Err(ExecutionError::PartitionNodeMissing {
                        node: node.clone(),
                        timeout_secs: timeout,
                    }
                    .into());
                }
                Some(_) => thread::sleep(self.poll_interval),
            }
        }
    }

    /// Returns `false` when the user declined this step
    fn copy_partition(
        &self,
        p: &PlannedPartition,
        node: &str,
        disk: &str,
        boot_marker: Option<LabelType>,
        ss: u64,
        dry_run: bool,
    ) -> Result<bool, CloneError> {
        let svc = self.services;
        let src = p.source.device.as_str();
        let state = CloneState::PerFilesystemAction;

        let prompt = match p.role() {
            Role::Reserved => {
                emit(
                    Level::Info,
                    "clone.partition.skip",
                    &format!("  {} left unformatted ({})", node, p.role()),
                    None,
                );
                return Ok(true);
            }
            Role::SystemBoot => format!("Format {} as FAT32?", node),
            Role::GrowableFilesystem => format!("Clone NTFS {} to {}?", src, node),
            Role::Other => format!("Copy {} to {} block by block?", src, node),
        };
        if !self.confirm(dry_run, &prompt)? {
            return Ok(false);
        }

        match p.role() {
            Role::SystemBoot => {
                svc.format
                    .format_boot(node, fat_label(&p.source.fs_label))
                    .map_err(|e| ExecutionError::step(state, node, e))?;
                if let Some(label) = boot_marker
                    && let Err(e) = svc.table.set_boot_marker(disk, p.number, label)
                {
                    warn_best_effort("clone.boot_marker.failed", &format!("boot marker on {}", node), &e);
                }
            }
            Role::GrowableFilesystem => {
                let source_bytes = svc.device_info.size_bytes(src)?;
                let dest_bytes = if dry_run {
                    initial_size(p) * ss
                } else {
                    svc.device_info.size_bytes(node)?
                };
                safety::check_clone_capacity(p.number, dest_bytes, source_bytes)?;

                let pb = create_spinner(format!("Cloning {} to {}", src, node));
                let result = if svc.clone.available() {
                    svc.clone.clone_filesystem(node, src)
                } else {
                    emit(
                        Level::Warn,
                        "clone.ntfsclone.missing",
                        &format!(
                            "{} ntfsclone not found; copying {} block by block",
                            char::from(NerdFont::Warning),
                            src
                        ),
                        None,
                    );
                    svc.raw_copy.copy(node, src, 0, source_bytes)
                };
                match result {
                    Ok(()) => finish_spinner_with_success(pb, format!("Cloned {} to {}", src, node)),
                    Err(e) => {
                        finish_spinner_with_failure(pb);
                        return Err(ExecutionError::step(state, node, e).into());
                    }
                }
            }
            Role::Other => {
                let length = p.source.size_bytes(ss);
                let pb = create_spinner(format!("Copying {} to {}", src, node));
                match svc.raw_copy.copy(node, src, 0, length) {
                    Ok(()) => finish_spinner_with_success(pb, format!("Copied {} to {}", src, node)),
                    Err(e) => {
                        finish_spinner_with_failure(pb);
                        return Err(ExecutionError::step(state, node, e).into());
                    }
                }
            }
            Role::Reserved => {}
        }
        Ok(true)
    }
}

/// The growable entry starts at the source size and is grown after the clone
fn initial_size(p: &PlannedPartition) -> u64 {
    if p.growable {
        p.size_sectors().min(p.source.size_sectors())
    } else {
        p.size_sectors()
    }
}

/// The partition to mark active on an MBR destination: the one active on the source
fn active_partition(plan: &LayoutPlan) -> Option<u32> {
    if plan.label_type != LabelType::Dos {
        return None;
    }
    plan.partitions
        .iter()
        .find(|p| p.source.flags.contains(&PartitionFlag::Boot))
        .map(|p| p.number)
}

/// FAT labels are at most 11 characters
fn fat_label(label: &str) -> Option<&str> {
    let label = label.trim();
    (!label.is_empty() && label.len() <= 11 && label.is_ascii()).then_some(label)
}

fn warn_best_effort(code: &str, what: &str, err: &anyhow::Error) {
    emit(
        Level::Warn,
        code,
        &format!("{} {} failed, continuing: {:#}", char::from(NerdFont::Warning), what, err),
        None,
    );
}
