//! Required-size estimation for the growable filesystem

use super::error::EstimationError;
use super::parsing::diagnostic::{self, DiagnosticMatch};
use super::services::{ResizeService, UsedSpaceMeter};
use super::types::{EstimateSource, Partition, SizeEstimate, format_size};
use crate::ui::prelude::*;

pub struct SizeEstimator<'a> {
    resize: &'a dyn ResizeService,
    meter: &'a dyn UsedSpaceMeter,
}

impl<'a> SizeEstimator<'a> {
    pub fn new(resize: &'a dyn ResizeService, meter: &'a dyn UsedSpaceMeter) -> Self {
        Self { resize, meter }
    }

    /// Try the resize diagnostic first, then fall back to measuring used space.
    ///
    /// `mountpoint` is the partition's current mountpoint, reused by the measurement.
    pub fn estimate(
        &self,
        partition: &Partition,
        sector_size: u64,
        mountpoint: Option<&str>,
    ) -> Result<SizeEstimate, EstimationError> {
        let mut reasons = Vec::new();

        match self.from_diagnostic(&partition.device, sector_size) {
            Ok(bytes) => return SizeEstimate::new(bytes, EstimateSource::ParsedDiagnostic),
            Err(reason) => {
                emit(
                    Level::Warn,
                    "clone.estimate.diagnostic_unusable",
                    &format!(
                        "{} Resize diagnostic for {} unusable ({}); measuring used space instead",
                        char::from(NerdFont::Warning),
                        partition.device,
                        reason
                    ),
                    None,
                );
                reasons.push(reason);
            }
        }

        match self.meter.used_bytes(&partition.device, mountpoint) {
            Ok(0) => reasons.push("measured used space is zero".to_string()),
            Ok(bytes) => {
                emit(
                    Level::Debug,
                    "clone.estimate.measured",
                    &format!("Measured {} bytes in use on {}", bytes, partition.device),
                    None,
                );
                return SizeEstimate::new(bytes, EstimateSource::MeasuredUsedSpace);
            }
            Err(e) => reasons.push(format!("measurement failed: {:#}", e)),
        }

        Err(EstimationError::NoUsableEstimate {
            device: partition.device.clone(),
            reasons: reasons.join("; "),
        })
    }

    fn from_diagnostic(&self, device: &str, sector_size: u64) -> Result<u64, String> {
        let (succeeded, text) = self
            .resize
            .info(device)
            .map_err(|e| format!("diagnostic unavailable: {:#}", e))?;

        emit(
            Level::Debug,
            "clone.estimate.diagnostic",
            &format!("Resize diagnostic for {}:\n{}", device, text.trim_end()),
            None,
        );

        if let Some(reason) = diagnostic::unusable_reason(succeeded, &text) {
            return Err(reason);
        }

        match diagnostic::parse_report(&text, sector_size) {
            Some(DiagnosticMatch::SuggestedMinimum(0)) | Some(DiagnosticMatch::LargestNumber(0)) => {
                Err("diagnostic reported zero bytes".to_string())
            }
            Some(found) => {
                let how = match found {
                    DiagnosticMatch::SuggestedMinimum(_) => "suggested minimum",
                    DiagnosticMatch::LargestNumber(_) => "largest number",
                };
                emit(
                    Level::Debug,
                    "clone.estimate.parsed",
                    &format!("Read {} ({}) from the {}", format_size(found.bytes()), found.bytes(), how),
                    None,
                );
                Ok(found.bytes())
            }
            None => Err("no size found in diagnostic report".to_string()),
        }
    }
}
