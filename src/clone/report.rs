//! Human and machine readable plan reports

use comfy_table::{Cell, Table, presets::UTF8_FULL};
use serde::Serialize;

use super::classify::type_code_for;
use super::types::{LabelType, LayoutPlan, SizeEstimate, SizingPolicy, format_size};
use crate::ui::prelude::*;

#[derive(Debug, Serialize)]
pub struct EstimateReport {
    pub device: String,
    pub required_bytes: u64,
    pub margin_bytes: u64,
    pub total_bytes: u64,
    pub recommended_gib: u64,
    pub source: String,
}

impl EstimateReport {
    pub fn new(device: &str, estimate: &SizeEstimate) -> Self {
        Self {
            device: device.to_string(),
            required_bytes: estimate.required_bytes,
            margin_bytes: estimate.margin_bytes,
            total_bytes: estimate.total_bytes(),
            recommended_gib: estimate.recommended_gib(),
            source: estimate.source.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlanReport<'a> {
    pub source: &'a str,
    pub destination: &'a str,
    pub policy: String,
    pub estimate: EstimateReport,
    pub label_type: LabelType,
    pub sector_size: u64,
    pub total_sectors: u64,
    pub reserved_trailing_sectors: u64,
    pub usable_last_sector: u64,
    pub first_trailing_start: Option<u64>,
    pub guard_gap_sectors: u64,
    pub needed_sectors: u64,
    pub unallocated_tail_sectors: u64,
    pub mirrored: bool,
    pub plan: &'a LayoutPlan,
}

pub fn print_estimate(device: &str, estimate: &SizeEstimate) {
    let report = EstimateReport::new(device, estimate);
    let data = serde_json::to_value(&report).ok();
    emit(
        Level::Success,
        "clone.estimate.result",
        &format!(
            "{} {}: requires {} ({}), margin {}, recommended size {} GiB",
            char::from(NerdFont::Search),
            device,
            format_size(estimate.required_bytes),
            estimate.source,
            format_size(estimate.margin_bytes),
            estimate.recommended_gib()
        ),
        data,
    );
}

pub fn render_table(plan: &LayoutPlan) -> String {
    let ss = plan.sector_size();
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec![
            "#", "Role", "FS", "Name", "Src start", "Src end", "Dst start", "Dst end", "Size",
        ]);

    for p in &plan.partitions {
        let role = if p.growable {
            format!("{} (grow)", p.role())
        } else {
            p.role().to_string()
        };
        let name = if p.source.name.is_empty() {
            p.source.fs_label.clone()
        } else {
            p.source.name.clone()
        };
        let marker = if p.moved() { "*" } else { "" };
        table.add_row(vec![
            Cell::new(p.number),
            Cell::new(role),
            Cell::new(&p.source.filesystem_hint),
            Cell::new(name),
            Cell::new(p.source.start_sector),
            Cell::new(p.source.end_sector),
            Cell::new(format!("{}{}", p.start_sector, marker)),
            Cell::new(p.end_sector),
            Cell::new(format_size(p.size_bytes(ss))),
        ]);
    }
    table.to_string()
}

/// sfdisk input equivalent to the plan, for review
pub fn sfdisk_script(plan: &LayoutPlan, source_label: LabelType) -> String {
    let mut script = format!("label: {}\nunit: sectors\n", plan.label_type.sfdisk_name());
    if plan.geometry.sector_size_bytes != 512 {
        script.push_str(&format!("sector-size: {}\n", plan.geometry.sector_size_bytes));
    }
    script.push('\n');
    for p in &plan.partitions {
        let code = type_code_for(
            p.role(),
            plan.label_type,
            p.source.type_code.as_deref(),
            source_label,
        );
        script.push_str(&format!(
            "start={}, size={}, type={}",
            p.start_sector,
            p.size_sectors(),
            code
        ));
        if plan.label_type == LabelType::Gpt && !p.source.name.is_empty() {
            script.push_str(&format!(", name=\"{}\"", p.source.name.replace('"', "")));
        }
        script.push('\n');
    }
    script
}

pub fn present_plan(
    source: &str,
    destination: &str,
    policy: SizingPolicy,
    estimate: &SizeEstimate,
    plan: &LayoutPlan,
    source_label: LabelType,
) {
    let geometry = &plan.geometry;
    let report = PlanReport {
        source,
        destination,
        policy: policy.to_string(),
        estimate: EstimateReport::new(&plan.growable().source.device, estimate),
        label_type: plan.label_type,
        sector_size: geometry.sector_size_bytes,
        total_sectors: geometry.total_sectors,
        reserved_trailing_sectors: geometry.reserved_trailing_sectors,
        usable_last_sector: plan.usable_last_sector,
        first_trailing_start: plan.first_trailing_start,
        guard_gap_sectors: plan.guard_gap_sectors,
        needed_sectors: plan.needed_sectors,
        unallocated_tail_sectors: plan.unallocated_tail_sectors(),
        mirrored: plan.mirrored,
        plan,
    };

    separator(false);
    emit(
        Level::Info,
        "clone.plan.summary",
        &format!(
            "{} {} {} {} ({} {}, {} sectors of {} bytes)",
            char::from(NerdFont::HardDrive),
            source,
            char::from(NerdFont::ArrowRight),
            destination,
            geometry.size_human(),
            plan.label_type,
            geometry.total_sectors,
            geometry.sector_size_bytes
        ),
        serde_json::to_value(&report).ok(),
    );
    emit(
        Level::Info,
        "clone.plan.sizing",
        &format!(
            "{} Sizing: {}; required {} + margin {} = {} (recommended {} GiB)",
            char::from(NerdFont::Partition),
            policy,
            format_size(estimate.required_bytes),
            format_size(estimate.margin_bytes),
            format_size(estimate.total_bytes()),
            estimate.recommended_gib()
        ),
        None,
    );
    emit(
        Level::Info,
        "clone.plan.geometry",
        &format!(
            "  Usable last sector {}, {} reserved trailing sectors, first trailing start {}, guard gap {}, {} sectors left unallocated",
            plan.usable_last_sector,
            geometry.reserved_trailing_sectors,
            plan.first_trailing_start
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
            plan.guard_gap_sectors,
            plan.unallocated_tail_sectors()
        ),
        None,
    );
    if plan.mirrored {
        emit(
            Level::Info,
            "clone.plan.mirrored",
            "  Destination matches the source geometry; the table is reproduced unchanged",
            None,
        );
    }
    block(&render_table(plan));
    emit(
        Level::Debug,
        "clone.plan.script",
        &format!("sfdisk script:\n{}", sfdisk_script(plan, source_label).trim_end()),
        None,
    );
    separator(true);
}
