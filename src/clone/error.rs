use thiserror::Error;

use super::orchestrator::CloneState;
use super::types::EstimateSource;

#[derive(Debug, Error)]
pub enum EstimationError {
    #[error("no estimation strategy produced a usable size for {device}: {reasons}")]
    NoUsableEstimate { device: String, reasons: String },

    #[error("{strategy} reported a required size of zero bytes")]
    ZeroEstimate { strategy: EstimateSource },
}

#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("no {fs} partition found on {device}; pass --growable to pick one")]
    NoGrowablePartition { device: String, fs: &'static str },

    #[error("partition {number} does not exist on {device}")]
    GrowableNotFound { device: String, number: u32 },

    #[error("partition {number} has filesystem '{found}', only {expected} can be resized")]
    NotGrowableType {
        number: u32,
        found: String,
        expected: &'static str,
    },

    #[error(
        "source uses {source_sector_size}-byte sectors but destination uses {dest_sector_size}-byte sectors"
    )]
    SectorSizeMismatch {
        source_sector_size: u64,
        dest_sector_size: u64,
    },

    #[error("destination geometry of {total_sectors} sectors leaves no room after {reserved} reserved sectors")]
    DegenerateGeometry { total_sectors: u64, reserved: u64 },

    #[error(
        "partition {number} needs sectors {start}..={candidate_end} but only fits up to sector {limit_end}"
    )]
    InsufficientSpace {
        number: u32,
        start: u64,
        candidate_end: u64,
        limit_end: u64,
    },

    #[error("partition {number} would end at sector {end}, before its start {start}")]
    EndBeforeStart { number: u32, start: u64, end: u64 },

    #[error(
        "trailing partitions span {span_sectors} sectors, more than the {usable_sectors} usable sectors of the destination"
    )]
    TrailingOverflow {
        span_sectors: u64,
        usable_sectors: u64,
    },

    #[error("partition {number} ends at sector {end}, past the usable last sector {usable_last}")]
    ExceedsUsable {
        number: u32,
        end: u64,
        usable_last: u64,
    },

    #[error("partition {first} (ends {first_end}) overlaps partition {second} (starts {second_start})")]
    Overlap {
        first: u32,
        first_end: u64,
        second: u32,
        second_start: u64,
    },

    #[error("an MBR label holds {max} primary partitions, the source has {count}")]
    TooManyPartitions { count: usize, max: usize },

    #[error(
        "partition {number} would hold {planned_bytes} bytes, less than the {required_bytes} bytes its data needs"
    )]
    BelowRequired {
        number: u32,
        planned_bytes: u64,
        required_bytes: u64,
    },
}

#[derive(Debug, Error)]
pub enum SafetyError {
    #[error("source and destination are the same device: {path}")]
    SameDevice { path: String },

    #[error("source {source_path} and destination {dest_path} are both on disk {disk}")]
    SameDisk {
        source_path: String,
        dest_path: String,
        disk: String,
    },

    #[error("destination {path} is a partition; pass the whole disk {disk} instead")]
    DestinationNotDisk { path: String, disk: String },

    #[error("destination {device} has {total_sectors} sectors, plan uses up to sector {last_used}")]
    InsufficientCapacity {
        device: String,
        total_sectors: u64,
        last_used: u64,
    },

    #[error(
        "destination partition {number} holds {dest_bytes} bytes, smaller than the {source_bytes}-byte source device; shrink the source filesystem first"
    )]
    CloneTargetTooSmall {
        number: u32,
        dest_bytes: u64,
        source_bytes: u64,
    },

    #[error("confirmation required but unavailable: {0}; rerun with --yes to confirm non-interactively")]
    ConfirmationUnavailable(String),
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("{state} failed on {device}: {detail}")]
    StepFailed {
        state: CloneState,
        device: String,
        detail: String,
    },

    #[error("partition node {node} did not appear within {timeout_secs}s after re-reading the table")]
    PartitionNodeMissing { node: String, timeout_secs: u64 },
}

impl ExecutionError {
    pub fn step(state: CloneState, device: &str, err: anyhow::Error) -> Self {
        ExecutionError::StepFailed {
            state,
            device: device.to_string(),
            detail: format!("{:#}", err),
        }
    }
}

#[derive(Debug, Error)]
pub enum CloneError {
    #[error(transparent)]
    Estimation(#[from] EstimationError),

    #[error(transparent)]
    Planning(#[from] PlanningError),

    #[error(transparent)]
    Safety(#[from] SafetyError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CloneError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CloneError::Estimation(_) => 2,
            CloneError::Planning(_) => 3,
            CloneError::Safety(_) => 4,
            CloneError::Execution(_) => 5,
            CloneError::Other(_) => 1,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CloneError::Estimation(_) => "clone.error.estimation",
            CloneError::Planning(_) => "clone.error.planning",
            CloneError::Safety(_) => "clone.error.safety",
            CloneError::Execution(_) => "clone.error.execution",
            CloneError::Other(_) => "clone.error",
        }
    }
}
