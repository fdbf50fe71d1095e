//! Destination layout planning
//!
//! Partitions before the growable one keep their sectors. Partitions after it keep
//! their sizes and are packed against the end of the destination, aligned, in their
//! original order. The growable partition keeps its start and takes the space in
//! between according to the sizing policy.

use super::error::PlanningError;
use super::types::{
    DiskGeometry, LabelType, LayoutPlan, PartitionTable, PlannedPartition, SizeEstimate,
    SizingPolicy, align_down, align_up,
};

/// Highest sector count an MBR label can describe
const MBR_SECTOR_LIMIT: u64 = 1 << 32;

/// Primary entries an MBR label holds
const MBR_MAX_PARTITIONS: usize = 4;

/// Everything the planner needs, gathered once and never mutated
#[derive(Debug, Clone)]
pub struct PlanningContext {
    pub source_table: PartitionTable,
    pub source_geometry: DiskGeometry,
    pub growable_index: usize,
    /// Destination as currently labeled (often [`LabelType::Unknown`])
    pub dest_geometry: DiskGeometry,
    pub estimate: SizeEstimate,
    pub policy: SizingPolicy,
    pub forced_label: Option<LabelType>,
    pub alignment_sectors: u64,
    pub guard_gap_sectors: u64,
}

impl PlanningContext {
    /// Label written to the destination: forced, else mirrored, else by capacity
    pub fn destination_label(&self) -> LabelType {
        if let Some(label) = self.forced_label {
            return label;
        }
        match self.source_table.label_type {
            LabelType::Gpt | LabelType::Dos => self.source_table.label_type,
            LabelType::Unknown if self.dest_geometry.total_sectors > MBR_SECTOR_LIMIT => {
                LabelType::Gpt
            }
            LabelType::Unknown => LabelType::Dos,
        }
    }
}

struct Placement {
    start: u64,
    end: u64,
}

pub fn plan(ctx: &PlanningContext) -> Result<LayoutPlan, PlanningError> {
    let source = &ctx.source_table;
    let ss = ctx.dest_geometry.sector_size_bytes;
    if source.sector_size != ss {
        return Err(PlanningError::SectorSizeMismatch {
            source_sector_size: source.sector_size,
            dest_sector_size: ss,
        });
    }

    let label = ctx.destination_label();
    let geometry = ctx.dest_geometry.with_label(label);
    let usable_last = geometry
        .usable_last_sector()
        .ok_or(PlanningError::DegenerateGeometry {
            total_sectors: geometry.total_sectors,
            reserved: geometry.reserved_trailing_sectors,
        })?;

    let gi = ctx.growable_index;
    let growable = &source.partitions[gi];

    if label == LabelType::Dos && source.partitions.len() > MBR_MAX_PARTITIONS {
        return Err(PlanningError::TooManyPartitions {
            count: source.partitions.len(),
            max: MBR_MAX_PARTITIONS,
        });
    }

    let mirrored = ctx.policy == SizingPolicy::Preserve
        && ctx.source_geometry.total_sectors == geometry.total_sectors
        && source.label_type == label;

    let (placements, first_trailing_start, needed_sectors) = if mirrored {
        let placements = source
            .partitions
            .iter()
            .map(|p| Placement {
                start: p.start_sector,
                end: p.end_sector,
            })
            .collect::<Vec<_>>();
        let first_trailing = source.partitions.get(gi + 1).map(|p| p.start_sector);
        (placements, first_trailing, growable.size_sectors())
    } else {
        place_partitions(ctx, usable_last)?
    };

    let partitions: Vec<PlannedPartition> = source
        .partitions
        .iter()
        .zip(placements)
        .enumerate()
        .map(|(index, (src, placement))| PlannedPartition {
            number: index as u32 + 1,
            start_sector: placement.start,
            end_sector: placement.end,
            source: src.clone(),
            growable: index == gi,
        })
        .collect();

    let plan = LayoutPlan {
        partitions,
        label_type: label,
        growable_index: gi,
        geometry,
        usable_last_sector: usable_last,
        first_trailing_start,
        guard_gap_sectors: ctx.guard_gap_sectors,
        needed_sectors,
        mirrored,
    };

    validate_plan(&plan)?;

    let planned = plan.growable();
    let planned_bytes = planned.size_bytes(ss);
    if planned_bytes < ctx.estimate.required_bytes {
        return Err(PlanningError::BelowRequired {
            number: planned.number,
            planned_bytes,
            required_bytes: ctx.estimate.required_bytes,
        });
    }

    Ok(plan)
}

/// Sectors the sizing policy asks for, before clamping
fn needed_sectors(ctx: &PlanningContext) -> u64 {
    let ss = ctx.dest_geometry.sector_size_bytes;
    let growable = &ctx.source_table.partitions[ctx.growable_index];
    match ctx.policy {
        SizingPolicy::Preserve => growable.size_sectors(),
        SizingPolicy::Estimated => ctx.estimate.total_bytes().div_ceil(ss),
        SizingPolicy::Explicit(bytes) => bytes.div_ceil(ss),
        // Fill ends at the limit; the request is informational
        SizingPolicy::Fill { .. } => 0,
    }
}

fn place_partitions(
    ctx: &PlanningContext,
    usable_last: u64,
) -> Result<(Vec<Placement>, Option<u64>, u64), PlanningError> {
    let source = &ctx.source_table;
    let gi = ctx.growable_index;
    let growable = &source.partitions[gi];
    let align = ctx.alignment_sectors;
    let mut placements = Vec::with_capacity(source.partitions.len());

    for p in &source.partitions[..gi] {
        if p.end_sector > usable_last {
            return Err(PlanningError::ExceedsUsable {
                number: p.number,
                end: p.end_sector,
                usable_last,
            });
        }
        placements.push(Placement {
            start: p.start_sector,
            end: p.end_sector,
        });
    }

    // Trailing offsets relative to the first trailing start
    let trailing = &source.partitions[gi + 1..];
    let mut relative = Vec::with_capacity(trailing.len());
    let mut cursor = 0u64;
    for p in trailing {
        let start = align_up(cursor, align);
        let end = start + p.size_sectors() - 1;
        relative.push((start, end));
        cursor = end + 1;
    }

    let first_trailing_start = match relative.last() {
        Some(&(_, span_end)) => {
            let latest = usable_last.checked_sub(span_end).ok_or(
                PlanningError::TrailingOverflow {
                    span_sectors: span_end + 1,
                    usable_sectors: usable_last + 1,
                },
            )?;
            Some(align_down(latest, align))
        }
        None => None,
    };

    let start = growable.start_sector;
    let limit = match first_trailing_start {
        Some(first) => first.saturating_sub(ctx.guard_gap_sectors + 1),
        None => usable_last,
    };

    let needed = needed_sectors(ctx);
    let end = match ctx.policy {
        SizingPolicy::Fill { reserve_bytes } => {
            let reserve = reserve_bytes.div_ceil(ctx.dest_geometry.sector_size_bytes);
            limit.checked_sub(reserve)
        }
        _ => {
            let candidate = start + needed.max(1) - 1;
            if candidate > limit && limit >= start {
                return Err(PlanningError::InsufficientSpace {
                    number: growable.number,
                    start,
                    candidate_end: candidate,
                    limit_end: limit,
                });
            }
            Some(candidate.min(limit))
        }
    };

    let end = match end {
        Some(end) if end >= start => end,
        other => {
            return Err(PlanningError::EndBeforeStart {
                number: growable.number,
                start,
                end: other.unwrap_or(0),
            });
        }
    };
    placements.push(Placement { start, end });

    if let Some(first) = first_trailing_start {
        placements.extend(relative.iter().map(|&(s, e)| Placement {
            start: first + s,
            end: first + e,
        }));
    }

    let needed = match ctx.policy {
        SizingPolicy::Fill { .. } => end - start + 1,
        _ => needed,
    };
    Ok((placements, first_trailing_start, needed))
}

fn validate_plan(plan: &LayoutPlan) -> Result<(), PlanningError> {
    for p in &plan.partitions {
        if p.end_sector > plan.usable_last_sector {
            return Err(PlanningError::ExceedsUsable {
                number: p.number,
                end: p.end_sector,
                usable_last: plan.usable_last_sector,
            });
        }
    }
    for pair in plan.partitions.windows(2) {
        if pair[1].start_sector <= pair[0].end_sector {
            return Err(PlanningError::Overlap {
                first: pair[0].number,
                first_end: pair[0].end_sector,
                second: pair[1].number,
                second_start: pair[1].start_sector,
            });
        }
    }
    Ok(())
}
