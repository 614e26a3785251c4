//! Heuristic timetable parsing from free-form text (OCR output, PDF or DOCX text).
//!
//! Pure functions, no async. Finds day names, scans a small window of lines
//! after each for time ranges and known subject keywords, and pairs them up.
//! Never fails: unusable text yields the fixed demo timetable.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::schema::{RawBlock, RawDay, RawTimetable, Weekday};

/// Text shorter than this (after trimming) is not worth parsing.
const MIN_TEXT_CHARS: usize = 20;

/// Lines scanned after the line naming the day.
const LINES_AFTER_DAY: usize = 4;

/// First synthetic slot when no time ranges are found.
const ESTIMATED_START_HOUR: usize = 9;

const OCR_CONFIDENCE: f64 = 0.6;
const ESTIMATED_CONFIDENCE: f64 = 0.5;

pub const DEMO_NOTE: &str = "Demo data";

/// Subject keywords, in detection order. Overlapping variants are intentional.
pub const SUBJECT_KEYWORDS: &[&str] = &[
    "Maths",
    "Math",
    "Mathematics",
    "English",
    "Literacy",
    "Science",
    "Physics",
    "Chemistry",
    "Biology",
    "History",
    "Geography",
    "Art",
    "Music",
    "PE",
    "Physical Education",
    "PHSE",
    "Computing",
    "ICT",
    "RWI",
    "Reading",
];

static TIME_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([0-9]{1,2})[:.]([0-9]{2})\s*[-–]\s*([0-9]{1,2})[:.]([0-9]{2})").expect("valid time range regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
struct TimeSlot {
    start: String,
    end: String,
}

/// Parse raw text into a best-guess raw timetable.
pub fn parse_text(text: &str) -> RawTimetable {
    info!("Parsing text into timetable structure ({} chars)", text.len());
    debug!(
        "Text to parse: {}...",
        text.chars().take(200).collect::<String>()
    );

    if text.trim().chars().count() < MIN_TEXT_CHARS {
        warn!("Text too short, returning demo timetable");
        return demo_timetable();
    }

    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    debug!("Processing {} lines of text", lines.len());

    let mut days = Vec::new();

    for weekday in Weekday::ALL {
        let needle = weekday.as_str().to_lowercase();
        let Some(day_index) = lines
            .iter()
            .position(|l| l.to_lowercase().contains(&needle))
        else {
            debug!("Day {} not found", weekday);
            continue;
        };

        info!("Found day line for {}: {}", weekday, lines[day_index]);

        let window_end = (day_index + 1 + LINES_AFTER_DAY).min(lines.len());
        let window = &lines[day_index..window_end];

        let slots = find_time_slots(window);
        let subjects = find_subjects(window);
        info!(
            "Found {} subjects for {}: {}",
            subjects.len(),
            weekday,
            subjects.join(", ")
        );

        if subjects.is_empty() {
            continue;
        }

        let blocks = build_blocks(&subjects, &slots);
        info!("Added {} blocks for {}", blocks.len(), weekday);
        days.push(RawDay {
            day: Some(weekday.as_str().to_string()),
            blocks,
        });
    }

    info!(
        "Parsed {} days with {} total blocks",
        days.len(),
        days.iter().map(|d| d.blocks.len()).sum::<usize>()
    );

    if days.is_empty() {
        warn!("No days parsed from text, returning demo timetable");
        return demo_timetable();
    }

    RawTimetable {
        timetable_id: None,
        days,
    }
}

/// All `H:MM - H:MM` ranges in the window, hours zero-padded, in order found.
fn find_time_slots(window: &[&str]) -> Vec<TimeSlot> {
    let mut slots = Vec::new();
    for line in window {
        for caps in TIME_RANGE.captures_iter(line) {
            let slot = TimeSlot {
                start: format!("{:0>2}:{}", &caps[1], &caps[2]),
                end: format!("{:0>2}:{}", &caps[3], &caps[4]),
            };
            debug!("Found time slot: {} - {}", slot.start, slot.end);
            slots.push(slot);
        }
    }
    slots
}

/// Subject keywords present in the window, each recorded once, line by line
/// and in keyword-list order within a line.
fn find_subjects(window: &[&str]) -> Vec<&'static str> {
    let mut found: Vec<&'static str> = Vec::new();
    for line in window {
        let lower = line.to_lowercase();
        for keyword in SUBJECT_KEYWORDS {
            if lower.contains(&keyword.to_lowercase()) && !found.contains(keyword) {
                debug!("Found subject: {}", keyword);
                found.push(*keyword);
            }
        }
    }
    found
}

fn build_blocks(subjects: &[&str], slots: &[TimeSlot]) -> Vec<RawBlock> {
    if let Some(first) = slots.first() {
        subjects
            .iter()
            .enumerate()
            .map(|(i, subject)| {
                let slot = slots.get(i).unwrap_or(first);
                RawBlock::new(&slot.start, &slot.end, subject, "Extracted from OCR", OCR_CONFIDENCE)
            })
            .collect()
    } else {
        subjects
            .iter()
            .enumerate()
            .map(|(i, subject)| {
                let hour = ESTIMATED_START_HOUR + i;
                RawBlock::new(
                    &format!("{:02}:00", hour),
                    &format!("{:02}:00", hour + 1),
                    subject,
                    "Time estimated",
                    ESTIMATED_CONFIDENCE,
                )
            })
            .collect()
    }
}

/// Fixed three-day schedule returned when text yields nothing usable.
pub fn demo_timetable() -> RawTimetable {
    let day = |weekday: Weekday, subjects: [&str; 3]| RawDay {
        day: Some(weekday.as_str().to_string()),
        blocks: [("09:00", "10:00"), ("10:15", "11:15"), ("11:30", "12:30")]
            .iter()
            .zip(subjects)
            .map(|((start, end), subject)| RawBlock::new(start, end, subject, DEMO_NOTE, 0.5))
            .collect(),
    };

    RawTimetable {
        timetable_id: None,
        days: vec![
            day(Weekday::Monday, ["Mathematics", "English", "Science"]),
            day(Weekday::Tuesday, ["History", "Geography", "Physical Education"]),
            day(Weekday::Wednesday, ["Chemistry", "Physics", "Biology"]),
        ],
    }
}
