mod clone;
mod common;
mod ui;

use clap::{Parser, ValueHint};
use std::path::PathBuf;

use crate::clone::{CloneArgs, Outcome};
use crate::ui::prelude::*;

/// Exit code when the user declines a confirmation
const EXIT_DECLINED: i32 = 6;

/// Clone a disk onto a differently sized one, growing or shrinking its NTFS partition
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Activate debug mode
    #[arg(short, long)]
    debug: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Configuration file (default: ~/.config/growclone/config.toml)
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    #[command(flatten)]
    args: CloneArgs,
}

fn main() {
    let cli = Cli::parse();

    ui::init(cli.output, !cli.no_color);
    ui::set_debug_mode(cli.debug);

    if let Err(e) = common::privileges::ensure_root() {
        emit(
            Level::Error,
            "privileges.escalation_failed",
            &format!("{} {:#}", char::from(NerdFont::Cross), e),
            None,
        );
        std::process::exit(1);
    }

    let code = match clone::run(&cli.args, cli.config.as_deref()) {
        Ok(Outcome::Aborted) => EXIT_DECLINED,
        Ok(_) => 0,
        Err(e) => {
            emit(
                Level::Error,
                e.code(),
                &format!("{} {:#}", char::from(NerdFont::Cross), e),
                None,
            );
            e.exit_code()
        }
    };
    std::process::exit(code);
}
