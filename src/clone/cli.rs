use clap::{ArgGroup, Args, ValueHint};

use super::config::CloneConfig;
use super::orchestrator::{CloneRequest, Mode};
use super::parsing::{parse_reserve_arg, parse_size_arg};
use super::types::{GIB, LabelType, SizingPolicy};

#[derive(Args, Debug, Clone)]
#[command(group(
    ArgGroup::new("mode")
        .args(["calc_only", "auto", "size", "fill"])
        .multiple(false)
))]
pub struct CloneArgs {
    /// Source disk, or the NTFS partition to grow
    #[arg(value_hint = ValueHint::FilePath)]
    pub source: String,

    /// Destination disk; its partition table is replaced
    #[arg(value_hint = ValueHint::FilePath, required_unless_present = "calc_only")]
    pub destination: Option<String>,

    /// Only estimate the space the NTFS filesystem needs
    #[arg(long)]
    pub calc_only: bool,

    /// Size the NTFS partition to the estimate plus a safety margin
    #[arg(long)]
    pub auto: bool,

    /// Explicit NTFS partition size (120G, 500M, 2T; bare numbers are GiB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size_arg)]
    pub size: Option<u64>,

    /// Grow the NTFS partition up to the partitions that follow it
    #[arg(long)]
    pub fill: bool,

    /// Space left free after the NTFS partition with --fill
    #[arg(long, value_name = "SIZE", value_parser = parse_reserve_arg, requires = "fill")]
    pub reserve: Option<u64>,

    /// Number of the partition to grow
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub growable: Option<u32>,

    /// Partition table type for the destination (default: same as the source)
    #[arg(long, value_enum)]
    pub label: Option<LabelType>,

    /// Print the plan and the commands it would run without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Answer yes to every confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

impl CloneArgs {
    /// Flags win over the configuration file
    pub fn mode(&self, config: &CloneConfig) -> Mode {
        if self.calc_only {
            return Mode::CalcOnly;
        }
        let policy = if self.auto {
            SizingPolicy::Estimated
        } else if let Some(bytes) = self.size {
            SizingPolicy::Explicit(bytes)
        } else if self.fill {
            let reserve_bytes = self
                .reserve
                .unwrap_or_else(|| (config.fill_reserve_gib * GIB as f64).round() as u64);
            SizingPolicy::Fill { reserve_bytes }
        } else {
            SizingPolicy::Preserve
        };
        Mode::Recreate(policy)
    }

    pub fn to_request(&self, config: &CloneConfig) -> CloneRequest {
        CloneRequest {
            source: self.source.clone(),
            destination: self.destination.clone(),
            mode: self.mode(config),
            growable: self.growable,
            label: self.label,
            dry_run: self.dry_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use clap::error::ErrorKind;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        args: CloneArgs,
    }

    fn parse(args: &[&str]) -> Result<CloneArgs, clap::Error> {
        TestCli::try_parse_from(std::iter::once("growclone").chain(args.iter().copied()))
            .map(|cli| cli.args)
    }

    #[test]
    fn test_default_mode_preserves_size() {
        let args = parse(&["/dev/sda", "/dev/sdb"]).unwrap();
        assert_eq!(
            args.mode(&CloneConfig::default()),
            Mode::Recreate(SizingPolicy::Preserve)
        );
    }

    #[test]
    fn test_modes_resolve_to_policies() {
        let config = CloneConfig::default();
        let auto = parse(&["--auto", "/dev/sda", "/dev/sdb"]).unwrap();
        assert_eq!(auto.mode(&config), Mode::Recreate(SizingPolicy::Estimated));

        let size = parse(&["--size", "120G", "/dev/sda", "/dev/sdb"]).unwrap();
        assert_eq!(
            size.mode(&config),
            Mode::Recreate(SizingPolicy::Explicit(120 * GIB))
        );

        let fill = parse(&["--fill", "--reserve", "8G", "/dev/sda", "/dev/sdb"]).unwrap();
        assert_eq!(
            fill.mode(&config),
            Mode::Recreate(SizingPolicy::Fill {
                reserve_bytes: 8 * GIB
            })
        );
    }

    #[test]
    fn test_fill_reserve_falls_back_to_config() {
        let config = CloneConfig {
            fill_reserve_gib: 1.5,
            ..CloneConfig::default()
        };
        let fill = parse(&["--fill", "/dev/sda", "/dev/sdb"]).unwrap();
        assert_eq!(
            fill.mode(&config),
            Mode::Recreate(SizingPolicy::Fill {
                reserve_bytes: GIB + GIB / 2
            })
        );
    }

    #[test]
    fn test_calc_only_needs_no_destination() {
        let args = parse(&["--calc-only", "/dev/sda3"]).unwrap();
        let request = args.to_request(&CloneConfig::default());
        assert_eq!(request.mode, Mode::CalcOnly);
        assert!(request.destination.is_none());
    }

    #[test]
    fn test_destination_required_otherwise() {
        let err = parse(&["/dev/sda"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_sizing_modes_conflict() {
        let err = parse(&["--auto", "--fill", "/dev/sda", "/dev/sdb"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
        let err = parse(&["--calc-only", "--size", "40G", "/dev/sda"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_reserve_requires_fill() {
        let err = parse(&["--reserve", "1G", "/dev/sda", "/dev/sdb"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_label_and_growable() {
        let args = parse(&["--label", "mbr", "--growable", "3", "-y", "/dev/sda", "/dev/sdb"]).unwrap();
        let request = args.to_request(&CloneConfig::default());
        assert_eq!(request.label, Some(LabelType::Dos));
        assert_eq!(request.growable, Some(3));
        assert!(args.yes);
        assert!(parse(&["--growable", "0", "/dev/sda", "/dev/sdb"]).is_err());
    }
}
