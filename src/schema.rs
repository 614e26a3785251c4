//! Timetable wire types.
//!
//! `Timetable` is the normalized shape returned to clients and persisted by the
//! store. `RawTimetable` is whatever an extraction strategy produced: every
//! field optional, times possibly numeric, unknown fields ignored.

use serde::{Deserialize, Deserializer, Serialize};

/// Canonical day of the week, in timetable order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
            Weekday::Saturday => "Saturday",
            Weekday::Sunday => "Sunday",
        }
    }

    /// Exact, case-sensitive match against the canonical English name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == name)
    }

    /// Match a lowercase three-letter abbreviation (`mon`, `tue`, ...).
    pub fn from_abbreviation(abbr: &str) -> Option<Self> {
        match abbr {
            "mon" => Some(Weekday::Monday),
            "tue" => Some(Weekday::Tuesday),
            "wed" => Some(Weekday::Wednesday),
            "thu" => Some(Weekday::Thursday),
            "fri" => Some(Weekday::Friday),
            "sat" => Some(Weekday::Saturday),
            "sun" => Some(Weekday::Sunday),
            _ => None,
        }
    }

    /// Position in the week, or -1 for a label that is not a canonical name.
    pub fn week_position(name: &str) -> i32 {
        Self::ALL
            .iter()
            .position(|d| d.as_str() == name)
            .map(|p| p as i32)
            .unwrap_or(-1)
    }
}

impl std::fmt::Display for Weekday {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root timetable record, keyed by `timetable_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timetable {
    pub timetable_id: String,
    pub days: Vec<DaySchedule>,
}

/// One day of the week and its blocks.
///
/// `day` stays a string: normalization passes unrecognised labels through and
/// leaves rejecting them to the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub day: String,
    pub blocks: Vec<TimeBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBlock {
    pub start: String,
    pub end: String,
    pub subject: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

#[cfg(test)]
impl TimeBlock {
    pub fn new(
        start: impl Into<String>,
        end: impl Into<String>,
        subject: impl Into<String>,
        notes: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            subject: subject.into(),
            notes: notes.into(),
            confidence,
        }
    }
}

pub fn default_confidence() -> f64 {
    0.5
}

// ============================================================================
// Raw (pre-normalization) types
// ============================================================================

/// Extraction output before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTimetable {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub timetable_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub days: Vec<RawDay>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDay {
    #[serde(default, deserialize_with = "lenient_string")]
    pub day: Option<String>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub blocks: Vec<RawBlock>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBlock {
    #[serde(default, deserialize_with = "lenient_string")]
    pub start: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub end: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub subject: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub confidence: Option<f64>,
}

impl RawBlock {
    pub fn new(start: &str, end: &str, subject: &str, notes: &str, confidence: f64) -> Self {
        Self {
            start: Some(start.to_string()),
            end: Some(end.to_string()),
            subject: Some(subject.to_string()),
            notes: Some(notes.to_string()),
            confidence: Some(confidence),
        }
    }
}

impl From<Timetable> for RawTimetable {
    fn from(t: Timetable) -> Self {
        Self {
            timetable_id: Some(t.timetable_id),
            days: t
                .days
                .into_iter()
                .map(|d| RawDay {
                    day: Some(d.day),
                    blocks: d
                        .blocks
                        .into_iter()
                        .map(|b| RawBlock {
                            start: Some(b.start),
                            end: Some(b.end),
                            subject: Some(b.subject),
                            notes: Some(b.notes),
                            confidence: Some(b.confidence),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Accepts a string or a number; anything else (including null) becomes `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Null or a non-array value becomes an empty list; malformed elements are skipped.
fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

// ============================================================================
// Upload response metadata
// ============================================================================

/// Which strategy produced the timetable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMethod {
    SampleData,
    Llm,
    Ocr,
    TextParser,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::SampleData => "sample-data",
            ExtractionMethod::Llm => "llm",
            ExtractionMethod::Ocr => "ocr",
            ExtractionMethod::TextParser => "text-parser",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    pub extraction_method: ExtractionMethod,
    /// Milliseconds from upload receipt to terminal state.
    pub processing_time: u64,
    pub original_filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repaired: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}
