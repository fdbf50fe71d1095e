//! Parsing utilities for sfdisk, lsblk and ntfsresize output

pub mod diagnostic;
pub mod lsblk;
pub mod sfdisk;
pub mod size;

pub use lsblk::{BlockProbe, parse_block_devices};
pub use sfdisk::parse_partition_table;
pub use size::{parse_reserve_arg, parse_size_arg};
