//! Registry of known demonstration files and their reference timetables.

use tracing::{error, info};

use crate::schema::Timetable;

/// Note attached to upload metadata when a sample is returned.
pub const SAMPLE_NOTE: &str = "This is hardcoded sample data from the example file";

struct SampleEntry {
    /// Filename fragment, lowercase, with the space separator.
    key: &'static str,
    label: &'static str,
    json: &'static str,
}

// Checked in order; "example 1.1" must precede any shorter overlapping key.
const SAMPLES: &[SampleEntry] = &[
    SampleEntry {
        key: "example 1.1",
        label: "Teacher Timetable Example 1.1",
        json: include_str!("../samples/sample-1.1.json"),
    },
    SampleEntry {
        key: "example 1.2",
        label: "Teacher Timetable Example 1.2",
        json: include_str!("../samples/sample-1.2.json"),
    },
    SampleEntry {
        key: "example 2",
        label: "Teacher Timetable Example 2 (PDF)",
        json: include_str!("../samples/sample-2.json"),
    },
    SampleEntry {
        key: "example 3",
        label: "Teacher Timetable Example 3",
        json: include_str!("../samples/sample-3.json"),
    },
    SampleEntry {
        key: "example 4",
        label: "Teacher Timetable Example 4",
        json: include_str!("../samples/sample-4.json"),
    },
];

#[derive(Debug, Clone, Copy, Default)]
pub struct SampleRegistry;

impl SampleRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Case-insensitive substring match on the original filename. The key
    /// may use a space or an underscore as separator.
    pub fn lookup_by_filename(&self, filename: &str) -> Option<Timetable> {
        let lower = filename.to_lowercase();

        let entry = SAMPLES.iter().find(|entry| {
            lower.contains(entry.key) || lower.contains(&entry.key.replace(' ', "_"))
        })?;

        info!("Recognized sample file: {}", entry.label);

        match serde_json::from_str::<Timetable>(entry.json) {
            Ok(timetable) => Some(timetable),
            Err(e) => {
                error!("Sample data for {} is malformed: {}", entry.label, e);
                None
            }
        }
    }
}
