use anyhow::{Context, Result, bail};

use crate::clone::types::{GIB, KIB, MIB, TIB};

/// Parse a size argument such as `120G`, `500M`, `1.5T` or `64GiB`.
///
/// Suffixes are binary. A bare number is taken as GiB.
pub fn parse_size(input: &str) -> Result<u64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        bail!("empty size");
    }

    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(split);

    let value: f64 = number
        .parse()
        .with_context(|| format!("invalid size '{}'", input))?;

    let multiplier = match suffix.trim().to_ascii_lowercase().as_str() {
        "" | "g" | "gb" | "gib" => GIB,
        "b" => 1,
        "k" | "kb" | "kib" => KIB,
        "m" | "mb" | "mib" => MIB,
        "t" | "tb" | "tib" => TIB,
        other => bail!("unknown size suffix '{}' in '{}'", other, input),
    };

    let bytes = (value * multiplier as f64).round();
    if !bytes.is_finite() || bytes <= 0.0 || bytes > u64::MAX as f64 {
        bail!("size '{}' is out of range", input);
    }
    Ok(bytes as u64)
}

/// clap value parser wrapper
pub fn parse_size_arg(input: &str) -> std::result::Result<u64, String> {
    parse_size(input).map_err(|e| e.to_string())
}

/// Like [`parse_size_arg`], but zero is a valid reserve
pub fn parse_reserve_arg(input: &str) -> std::result::Result<u64, String> {
    match input.trim().parse::<f64>() {
        Ok(value) if value == 0.0 => Ok(0),
        _ => parse_size_arg(input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_suffixes() {
        assert_eq!(parse_size("120G").unwrap(), 120 * GIB);
        assert_eq!(parse_size("500M").unwrap(), 500 * MIB);
        assert_eq!(parse_size("1.5T").unwrap(), TIB + TIB / 2);
        assert_eq!(parse_size("64GiB").unwrap(), 64 * GIB);
        assert_eq!(parse_size("4096b").unwrap(), 4096);
        assert_eq!(parse_size(" 16 mib ").unwrap(), 16 * MIB);
    }

    #[test]
    fn test_reserve_accepts_zero() {
        assert_eq!(parse_reserve_arg("0"), Ok(0));
        assert_eq!(parse_reserve_arg("2G"), Ok(2 * GIB));
        assert!(parse_reserve_arg("-1").is_err());
    }

    #[test]
    fn test_bare_number_is_gib() {
        assert_eq!(parse_size("45").unwrap(), 45 * GIB);
    }

    #[test]
    fn test_parse_size_rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("abc").is_err());
        assert!(parse_size("12X").is_err());
        assert!(parse_size("0").is_err());
        assert!(parse_size("1.2.3G").is_err());
    }
}
