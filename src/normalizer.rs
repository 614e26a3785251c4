//! Timetable normalization.
//!
//! Turns any raw extraction output into a fully-shaped timetable: canonical
//! times, title-cased subjects, clamped confidences, blocks sorted and
//! deduplicated, gaps in end times filled, days in week order. Blocks whose
//! times cannot be read are dropped and reported, never raised.

use std::collections::HashSet;

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::TimeFormatError;
use crate::schema::{
    default_confidence, DaySchedule, RawBlock, RawDay, RawTimetable, TimeBlock, Timetable, Weekday,
};
use crate::time_format::{normalize_time, ClockTime};

/// End time that extractors emit when they don't know the real one.
const PLACEHOLDER_END: &str = "00:00";

/// Minutes added to a trailing block's start when its end is missing.
const DEFAULT_BLOCK_MINUTES: u32 = 60;

/// Why a raw block did not survive normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    MissingStart,
    MissingSubject,
    InvalidStart(TimeFormatError),
    InvalidEnd(TimeFormatError),
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::MissingStart => f.write_str("missing start time"),
            DropReason::MissingSubject => f.write_str("missing subject"),
            DropReason::InvalidStart(e) => write!(f, "start: {}", e),
            DropReason::InvalidEnd(e) => write!(f, "end: {}", e),
        }
    }
}

/// Result of normalizing a single block.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockOutcome {
    Kept(PendingBlock),
    Dropped(DropReason),
}

/// A block with a canonical start whose end may still need filling.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingBlock {
    pub start: ClockTime,
    pub end: Option<ClockTime>,
    pub subject: String,
    pub notes: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DroppedBlock {
    pub day: String,
    pub index: usize,
    pub reason: DropReason,
}

#[derive(Debug, Clone)]
pub struct NormalizationReport {
    pub timetable: Timetable,
    pub dropped: Vec<DroppedBlock>,
}

/// Normalize a raw timetable, discarding the drop report.
pub fn normalize(raw: RawTimetable) -> Timetable {
    normalize_with_report(raw).timetable
}

pub fn normalize_with_report(raw: RawTimetable) -> NormalizationReport {
    info!("Starting timetable normalization...");

    let timetable_id = raw
        .timetable_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut dropped = Vec::new();
    let mut days: Vec<DaySchedule> = raw
        .days
        .into_iter()
        .map(|day| normalize_day(day, &mut dropped))
        .collect();

    // Unknown labels sort to the front (position -1).
    days.sort_by_key(|d| Weekday::week_position(&d.day));

    if !dropped.is_empty() {
        warn!("Dropped {} invalid time blocks", dropped.len());
    }
    info!("Normalization complete. Processed {} days", days.len());

    NormalizationReport {
        timetable: Timetable { timetable_id, days },
        dropped,
    }
}

fn normalize_day(day: RawDay, dropped: &mut Vec<DroppedBlock>) -> DaySchedule {
    let name = normalize_day_name(day.day.as_deref().unwrap_or_default());

    let mut pending: Vec<PendingBlock> = Vec::with_capacity(day.blocks.len());
    for (index, block) in day.blocks.into_iter().enumerate() {
        match normalize_block(block) {
            BlockOutcome::Kept(b) => pending.push(b),
            BlockOutcome::Dropped(reason) => {
                warn!("Invalid time block on {} (#{}), skipping: {}", name, index, reason);
                dropped.push(DroppedBlock {
                    day: name.clone(),
                    index,
                    reason,
                });
            }
        }
    }

    pending.sort_by_key(|b| b.start.minutes_since_midnight());

    let blocks = dedup_blocks(fill_end_times(pending));

    DaySchedule { day: name, blocks }
}

/// Normalize one block's fields. Missing or placeholder end times are kept as
/// `None` for [`fill_end_times`].
pub fn normalize_block(block: RawBlock) -> BlockOutcome {
    let start = match block.start.as_deref() {
        None => return BlockOutcome::Dropped(DropReason::MissingStart),
        Some(raw) => match normalize_time(raw) {
            Ok(t) => t,
            Err(e) => return BlockOutcome::Dropped(DropReason::InvalidStart(e)),
        },
    };

    let end = match block.end.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match normalize_time(raw) {
            Ok(t) if t.to_string() == PLACEHOLDER_END => None,
            Ok(t) => Some(t),
            Err(e) => return BlockOutcome::Dropped(DropReason::InvalidEnd(e)),
        },
    };

    let Some(subject) = block.subject.as_deref() else {
        return BlockOutcome::Dropped(DropReason::MissingSubject);
    };

    let confidence = block
        .confidence
        .filter(|c| !c.is_nan())
        .unwrap_or_else(default_confidence)
        .clamp(0.0, 1.0);

    BlockOutcome::Kept(PendingBlock {
        start,
        end,
        subject: normalize_subject(subject),
        notes: block.notes.unwrap_or_default(),
        confidence,
    })
}

/// Blocks must already be sorted by start. A missing end takes the next
/// block's start, or start + 60 minutes for the last block of the day.
fn fill_end_times(blocks: Vec<PendingBlock>) -> Vec<TimeBlock> {
    let next_starts: Vec<Option<ClockTime>> = blocks
        .iter()
        .skip(1)
        .map(|b| Some(b.start))
        .chain(std::iter::once(None))
        .collect();

    blocks
        .into_iter()
        .zip(next_starts)
        .map(|(block, next_start)| {
            let end = block
                .end
                .or(next_start)
                .unwrap_or_else(|| block.start.plus_minutes(DEFAULT_BLOCK_MINUTES));
            TimeBlock {
                start: block.start.to_string(),
                end: end.to_string(),
                subject: block.subject,
                notes: block.notes,
                confidence: block.confidence,
            }
        })
        .collect()
}

/// Keep the first of any blocks sharing `(start, end, subject)`.
fn dedup_blocks(blocks: Vec<TimeBlock>) -> Vec<TimeBlock> {
    let mut seen = HashSet::new();
    blocks
        .into_iter()
        .filter(|b| seen.insert((b.start.clone(), b.end.clone(), b.subject.clone())))
        .collect()
}

/// Trim, collapse whitespace runs, and title-case every word.
pub fn normalize_subject(subject: &str) -> String {
    subject
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Map a day label to its canonical name via its first three letters.
/// Unrecognised labels pass through unchanged.
pub fn normalize_day_name(day: &str) -> String {
    let prefix: String = day.to_lowercase().chars().take(3).collect();
    match Weekday::from_abbreviation(&prefix) {
        Some(weekday) => weekday.as_str().to_string(),
        None => day.to_string(),
    }
}
