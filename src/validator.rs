//! Structural validation of timetable candidates.
//!
//! Checks shape and field formats only. Time ordering (`start < end`) and
//! overlaps between blocks are not checked, so overnight blocks pass.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::schema::{default_confidence, DaySchedule, TimeBlock, Timetable, Weekday};

static HH_MM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{2}:[0-9]{2}$").expect("valid HH:MM regex"));

/// One failed rule, located by a JSON path such as `days[0].blocks[2].end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError {
            path: path.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|e| format!("{}: {}", e.path, e.message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

/// Validate an already-typed timetable (e.g. normalization output).
pub fn validate_timetable(timetable: &Timetable) -> Result<Timetable, ValidationErrors> {
    match serde_json::to_value(timetable) {
        Ok(value) => validate(&value),
        Err(e) => {
            let mut errors = ValidationErrors::default();
            errors.push("", format!("Not serializable: {}", e));
            Err(errors)
        }
    }
}

/// Validate an arbitrary JSON candidate, filling `notes` and `confidence`
/// defaults on success.
pub fn validate(candidate: &Value) -> Result<Timetable, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let Some(root) = candidate.as_object() else {
        errors.push("", "Expected object");
        return Err(errors);
    };

    let timetable_id = match root.get("timetableId") {
        Some(Value::String(id)) if is_uuid(id) => id.clone(),
        Some(Value::String(_)) => {
            errors.push("timetableId", "Invalid uuid");
            String::new()
        }
        Some(_) => {
            errors.push("timetableId", "Expected string");
            String::new()
        }
        None => {
            errors.push("timetableId", "Required");
            String::new()
        }
    };

    let mut days = Vec::new();
    match root.get("days") {
        Some(Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                if let Some(day) = validate_day(item, &format!("days[{}]", i), &mut errors) {
                    days.push(day);
                }
            }
        }
        Some(_) => errors.push("days", "Expected array"),
        None => errors.push("days", "Required"),
    }

    if errors.is_empty() {
        Ok(Timetable { timetable_id, days })
    } else {
        Err(errors)
    }
}

/// Hyphenated 8-4-4-4-12 form only.
fn is_uuid(s: &str) -> bool {
    s.len() == 36 && Uuid::parse_str(s).is_ok()
}

fn validate_day(value: &Value, path: &str, errors: &mut ValidationErrors) -> Option<DaySchedule> {
    let Some(obj) = value.as_object() else {
        errors.push(path, "Expected object");
        return None;
    };

    let day = match obj.get("day") {
        Some(Value::String(name)) if Weekday::from_name(name).is_some() => Some(name.clone()),
        Some(Value::String(name)) => {
            errors.push(
                format!("{}.day", path),
                format!(
                    "Invalid enum value. Expected Monday | Tuesday | Wednesday | Thursday | Friday | Saturday | Sunday, received '{}'",
                    name
                ),
            );
            None
        }
        Some(_) => {
            errors.push(format!("{}.day", path), "Expected string");
            None
        }
        None => {
            errors.push(format!("{}.day", path), "Required");
            None
        }
    };

    let mut blocks = Vec::new();
    match obj.get("blocks") {
        Some(Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                if let Some(block) = validate_block(item, &format!("{}.blocks[{}]", path, i), errors) {
                    blocks.push(block);
                }
            }
        }
        Some(_) => errors.push(format!("{}.blocks", path), "Expected array"),
        None => errors.push(format!("{}.blocks", path), "Required"),
    }

    day.map(|day| DaySchedule { day, blocks })
}

fn validate_block(value: &Value, path: &str, errors: &mut ValidationErrors) -> Option<TimeBlock> {
    let Some(obj) = value.as_object() else {
        errors.push(path, "Expected object");
        return None;
    };
    let before = errors.len();

    let start = time_field(obj, "start", path, errors);
    let end = time_field(obj, "end", path, errors);

    let subject = match obj.get("subject") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::String(_)) => {
            errors.push(format!("{}.subject", path), "Subject cannot be empty");
            String::new()
        }
        Some(_) => {
            errors.push(format!("{}.subject", path), "Expected string");
            String::new()
        }
        None => {
            errors.push(format!("{}.subject", path), "Required");
            String::new()
        }
    };

    let notes = match obj.get("notes") {
        None => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            errors.push(format!("{}.notes", path), "Expected string");
            String::new()
        }
    };

    let confidence = match obj.get("confidence") {
        None => default_confidence(),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(c) if (0.0..=1.0).contains(&c) => c,
            Some(c) if c < 0.0 => {
                errors.push(format!("{}.confidence", path), "Number must be greater than or equal to 0");
                c
            }
            Some(c) => {
                errors.push(format!("{}.confidence", path), "Number must be less than or equal to 1");
                c
            }
            None => {
                errors.push(format!("{}.confidence", path), "Expected number");
                0.0
            }
        },
        Some(_) => {
            errors.push(format!("{}.confidence", path), "Expected number");
            0.0
        }
    };

    (errors.len() == before).then(|| TimeBlock {
        start,
        end,
        subject,
        notes,
        confidence,
    })
}

fn time_field(obj: &Map<String, Value>, field: &str, path: &str, errors: &mut ValidationErrors) -> String {
    match obj.get(field) {
        Some(Value::String(s)) if HH_MM.is_match(s) => s.clone(),
        Some(Value::String(_)) => {
            let label = if field == "start" { "Start" } else { "End" };
            errors.push(
                format!("{}.{}", path, field),
                format!("{} time must be in HH:MM format", label),
            );
            String::new()
        }
        Some(_) => {
            errors.push(format!("{}.{}", path, field), "Expected string");
            String::new()
        }
        None => {
            errors.push(format!("{}.{}", path, field), "Required");
            String::new()
        }
    }
}
