//! Clock time parsing.
//!
//! Turns the time strings that show up in scanned timetables (`9:00 AM`,
//! `1.30pm`, `1430`, `9.00`) into canonical zero-padded 24-hour `HH:MM`.

use std::fmt;

use crate::error::TimeFormatError;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// A valid time of day (00:00 to 23:59).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime {
    hours: u8,
    minutes: u8,
}

impl ClockTime {
    pub fn new(hours: u8, minutes: u8) -> Option<Self> {
        (hours < 24 && minutes < 60).then_some(Self { hours, minutes })
    }

    /// Wraps around midnight.
    pub fn from_minutes(total: u32) -> Self {
        let total = total % MINUTES_PER_DAY;
        Self {
            hours: (total / 60) as u8,
            minutes: (total % 60) as u8,
        }
    }

    pub fn minutes_since_midnight(&self) -> u32 {
        self.hours as u32 * 60 + self.minutes as u32
    }

    pub fn plus_minutes(&self, minutes: u32) -> Self {
        Self::from_minutes(self.minutes_since_midnight() + minutes)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hours, self.minutes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Meridiem {
    Am,
    Pm,
}

/// Normalize an arbitrary time string to a canonical clock time.
///
/// Without an AM/PM marker the hour is taken as 24-hour, so a bare `12:30`
/// stays `12:30` rather than becoming `00:30`. This keeps `normalize_time`
/// a fixed point on its own output. `12 AM` maps to midnight, `12 PM` stays
/// noon.
pub fn normalize_time(raw: &str) -> Result<ClockTime, TimeFormatError> {
    let lower = raw.trim().to_lowercase();

    let (meridiem, rest) = if lower.contains("pm") {
        (Some(Meridiem::Pm), lower.replacen("pm", "", 1))
    } else if lower.contains("am") {
        (Some(Meridiem::Am), lower.replacen("am", "", 1))
    } else {
        (None, lower)
    };

    let time = rest.trim().replacen('.', ":", 1);

    let (hours, minutes) = if time.contains(':') {
        let mut parts = time.split(':');
        let hours = parts.next().and_then(leading_int);
        let minutes = parts.next().and_then(leading_int);
        match (hours, minutes) {
            (Some(h), Some(m)) => (h, m),
            _ => return Err(TimeFormatError::InvalidFormat(raw.to_string())),
        }
    } else if (time.len() == 3 || time.len() == 4) && time.bytes().all(|b| b.is_ascii_digit()) {
        let split = time.len() - 2;
        let hours = time[..split].parse::<i64>();
        let minutes = time[split..].parse::<i64>();
        match (hours, minutes) {
            (Ok(h), Ok(m)) => (h, m),
            _ => return Err(TimeFormatError::InvalidFormat(raw.to_string())),
        }
    } else {
        return Err(TimeFormatError::InvalidFormat(raw.to_string()));
    };

    let hours = match meridiem {
        Some(Meridiem::Pm) if hours < 12 => hours + 12,
        Some(Meridiem::Am) if hours == 12 => 0,
        _ => hours,
    };

    if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
        return Err(TimeFormatError::OutOfRange { hours, minutes });
    }

    ClockTime::new(hours as u8, minutes as u8).ok_or(TimeFormatError::OutOfRange { hours, minutes })
}

/// Leading-digits integer parse: `" 30"` and `"30 "` read as 30, `"x"` fails.
fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}
