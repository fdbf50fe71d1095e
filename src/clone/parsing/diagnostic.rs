//! Parser for `ntfsresize --info` reports

use regex::Regex;
use std::sync::LazyLock;

use crate::clone::types::{GIB, KIB, MIB};

/// Phrases that introduce a suggested minimum size
const SUGGESTION_MARKERS: &[&str] = &[
    "might resize at",
    "resize at",
    "minimum size",
    "min size",
    "smallest",
    "shrink to",
];

/// Markers that make a report untrustworthy even if it contains numbers
const FAILURE_MARKERS: &[&str] = &["ERROR", "hibernat", "inconsistent"];

static BYTES_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*bytes\b").expect("valid regex"));

static UNIT_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*(KiB|MiB|GiB|kB|KB|MB|GB|sectors?)\b").expect("valid regex")
});

/// Which reading of the report produced the byte count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticMatch {
    /// An explicit suggested-minimum statement
    SuggestedMinimum(u64),
    /// The largest bare number in the report
    LargestNumber(u64),
}

impl DiagnosticMatch {
    pub fn bytes(&self) -> u64 {
        match self {
            DiagnosticMatch::SuggestedMinimum(b) | DiagnosticMatch::LargestNumber(b) => *b,
        }
    }
}

/// Why a report cannot be used, or `None` when it can
pub fn unusable_reason(succeeded: bool, text: &str) -> Option<String> {
    if !succeeded {
        let first = text.lines().map(str::trim).find(|l| !l.is_empty());
        return Some(format!(
            "diagnostic command failed{}",
            first.map(|l| format!(": {}", l)).unwrap_or_default()
        ));
    }
    if let Some(marker) = FAILURE_MARKERS.iter().find(|m| text.contains(**m)) {
        return Some(format!("diagnostic report mentions '{}'", marker));
    }
    if !text.chars().any(|c| c.is_ascii_digit()) {
        return Some("diagnostic report contains no numbers".to_string());
    }
    None
}

fn unit_to_bytes(value: f64, unit: &str, sector_size: u64) -> Option<u64> {
    let multiplier = match unit {
        "kB" | "KB" => 1_000.0,
        "MB" => 1_000_000.0,
        "GB" => 1_000_000_000.0,
        "KiB" => KIB as f64,
        "MiB" => MIB as f64,
        "GiB" => GIB as f64,
        "sector" | "sectors" => sector_size as f64,
        _ => return None,
    };
    let bytes = (value * multiplier).ceil();
    (bytes.is_finite() && bytes >= 0.0 && bytes <= u64::MAX as f64).then_some(bytes as u64)
}

/// Look for a suggested-minimum line and read its size.
///
/// A `<N> bytes` token on the line wins; otherwise the first number+unit token is converted.
pub fn parse_suggested_minimum(text: &str, sector_size: u64) -> Option<u64> {
    for line in text.lines() {
        let lower = line.to_lowercase();
        if !SUGGESTION_MARKERS.iter().any(|m| lower.contains(m)) {
            continue;
        }

        if let Some(caps) = BYTES_TOKEN.captures(line)
            && let Ok(bytes) = caps[1].parse::<u64>()
        {
            return Some(bytes);
        }

        if let Some(caps) = UNIT_TOKEN.captures(line)
            && let Ok(value) = caps[1].parse::<f64>()
            && let Some(bytes) = unit_to_bytes(value, &caps[2], sector_size)
        {
            return Some(bytes);
        }
    }
    None
}

/// Largest whitespace-separated integer in the report, read as bytes when at
/// least 1 GiB and as sectors otherwise
pub fn parse_largest_number(text: &str, sector_size: u64) -> Option<u64> {
    let largest = text
        .split_whitespace()
        .map(|token| {
            token
                .trim_end_matches('.')
                .trim_matches(|c| matches!(c, '(' | ')' | '[' | ']' | ',' | ':' | ';'))
        })
        .filter(|token| !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|token| token.parse::<u64>().ok())
        .max()?;

    if largest >= GIB {
        Some(largest)
    } else {
        Some(largest.saturating_mul(sector_size))
    }
}

/// Run both readings in priority order
pub fn parse_report(text: &str, sector_size: u64) -> Option<DiagnosticMatch> {
    if let Some(bytes) = parse_suggested_minimum(text, sector_size) {
        return Some(DiagnosticMatch::SuggestedMinimum(bytes));
    }
    parse_largest_number(text, sector_size).map(DiagnosticMatch::LargestNumber)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NTFSRESIZE_INFO: &str = "\
ntfsresize v2022.10.3 (libntfs-3g)
Device name        : /dev/nvme0n1p3
NTFS volume version: 3.1
Cluster size       : 4096 bytes
Current volume size: 255011581440 bytes (255012 MB)
Current device size: 255011586048 bytes (255012 MB)
Checking filesystem consistency ...
100.00 percent completed
Accounting clusters ...
Space in use       : 45123 MB (17.7%)
Collecting resizing constraints ...
You might resize at 45122871296 bytes or 45123 MB (freeing 209889 MB).
Please make a test run using both the -n and -s options before real resizing!
";

    const HIBERNATED: &str = "\
ntfsresize v2022.10.3 (libntfs-3g)
Device name        : /dev/sda3
The NTFS partition is hibernated. Windows must be resumed and turned off
properly, so resizing could be done safely.
";

    #[test]
    fn test_suggested_minimum_bytes_token() {
        assert_eq!(
            parse_suggested_minimum(NTFSRESIZE_INFO, 512),
            Some(45122871296)
        );
        assert_eq!(
            parse_report(NTFSRESIZE_INFO, 512),
            Some(DiagnosticMatch::SuggestedMinimum(45122871296))
        );
    }

    #[test]
    fn test_suggested_minimum_unit_tokens() {
        assert_eq!(
            parse_suggested_minimum("Minimum size: 45123 MB", 512),
            Some(45_123_000_000)
        );
        assert_eq!(
            parse_suggested_minimum("smallest possible: 2 GiB", 512),
            Some(2 * GIB)
        );
        assert_eq!(
            parse_suggested_minimum("shrink to 1000 sectors", 4096),
            Some(4_096_000)
        );
        assert_eq!(
            parse_suggested_minimum("min size 1.5 kB", 512),
            Some(1500)
        );
    }

    #[test]
    fn test_lines_without_marker_are_ignored() {
        assert_eq!(parse_suggested_minimum("Space in use : 45123 MB", 512), None);
    }

    #[test]
    fn test_largest_number_fallback_bytes() {
        let text = "Current volume size: 255011581440 bytes\nSpace in use: (45123) MB";
        assert_eq!(parse_largest_number(text, 512), Some(255011581440));
    }

    #[test]
    fn test_largest_number_fallback_sectors() {
        let text = "used clusters: 1000, free: [250].";
        assert_eq!(parse_largest_number(text, 512), Some(512_000));
        assert_eq!(
            parse_report(text, 512),
            Some(DiagnosticMatch::LargestNumber(512_000))
        );
    }

    #[test]
    fn test_largest_number_skips_decimals() {
        assert_eq!(parse_largest_number("100.00 percent", 512), None);
    }

    #[test]
    fn test_unusable_reports() {
        assert!(unusable_reason(true, NTFSRESIZE_INFO).is_none());
        assert!(unusable_reason(true, HIBERNATED).unwrap().contains("hibernat"));
        assert!(unusable_reason(true, "ERROR(5): Opening '/dev/sda3' failed").is_some());
        assert!(unusable_reason(true, "NTFS is inconsistent. Run chkdsk").is_some());
        assert!(unusable_reason(true, "nothing here").is_some());
        assert!(
            unusable_reason(false, "\nntfsresize: command failed\n")
                .unwrap()
                .contains("command failed")
        );
    }
}
