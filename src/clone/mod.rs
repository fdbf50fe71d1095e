//! Disk cloning with one growable NTFS partition

pub mod backup;
pub mod classify;
pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod estimate;
pub mod layout;
pub mod measure;
pub mod orchestrator;
pub mod parsing;
pub mod report;
pub mod safety;
pub mod services;
#[cfg(test)]
pub mod testing;
pub mod types;

use std::path::Path;

use crate::common::CommandExecutor;
use config::CloneConfig;
use measure::MountingMeter;
use orchestrator::CloneOrchestrator;
use safety::{AutoConfirm, Confirmer, PromptConfirm};
use services::{Services, SystemTools};

pub use cli::CloneArgs;
pub use error::CloneError;
pub use orchestrator::Outcome;

/// Run one request against the real system tools
pub fn run(args: &CloneArgs, config_path: Option<&Path>) -> Result<Outcome, CloneError> {
    let config = CloneConfig::load(config_path)?;
    let request = args.to_request(&config);

    let tools = SystemTools::new(
        CommandExecutor::new(request.dry_run),
        config.dd_block_size.clone(),
    );
    let meter = MountingMeter::new(&config.mount_options);
    let services = Services {
        device_info: &tools,
        table: &tools,
        clone: &tools,
        raw_copy: &tools,
        resize: &tools,
        format: &tools,
        meter: &meter,
    };
    let confirmer: &dyn Confirmer = if args.yes { &AutoConfirm } else { &PromptConfirm };

    CloneOrchestrator::new(services, confirmer, &config).run(&request)
}
