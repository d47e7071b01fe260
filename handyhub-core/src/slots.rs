use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{CoreError, CoreResult};

const TIME_FORMAT: &str = "%H:%M";

/// Longest service a provider may list, in minutes
pub const MAX_DURATION_MINUTES: i32 = 24 * 60;

/// Window in which slots may start and must end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl BusinessHours {
    pub fn new(open: NaiveTime, close: NaiveTime) -> CoreResult<Self> {
        if open >= close {
            return Err(CoreError::ValidationError(format!(
                "business hours must open before they close ({} >= {})",
                open.format(TIME_FORMAT),
                close.format(TIME_FORMAT)
            )));
        }
        Ok(Self { open, close })
    }

    /// Parse `HH:MM` bounds, as found in configuration
    pub fn parse(open: &str, close: &str) -> CoreResult<Self> {
        Self::new(parse_time(open)?, parse_time(close)?)
    }

    pub fn length_minutes(&self) -> i64 {
        (self.close - self.open).num_minutes()
    }
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            close: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default(),
        }
    }
}

/// A half-open `[start, end)` interval within one day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl Slot {
    pub fn overlaps(&self, other: &Slot) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start.format(TIME_FORMAT), self.end.format(TIME_FORMAT))
    }
}

/// What a booking records as its time: an exact window or a coarse label ("Morning")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeSlot {
    Window(Slot),
    Label(String),
}

impl TimeSlot {
    pub fn window(&self) -> Option<&Slot> {
        match self {
            TimeSlot::Window(slot) => Some(slot),
            TimeSlot::Label(_) => None,
        }
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSlot::Window(slot) => fmt::Display::fmt(slot, f),
            TimeSlot::Label(label) => f.write_str(label),
        }
    }
}

impl FromStr for TimeSlot {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(CoreError::ValidationError("time slot is required".to_string()));
        }

        if let Some((start, end)) = raw.split_once('-') {
            if let (Ok(start), Ok(end)) = (
                NaiveTime::parse_from_str(start.trim(), TIME_FORMAT),
                NaiveTime::parse_from_str(end.trim(), TIME_FORMAT),
            ) {
                if start >= end {
                    return Err(CoreError::ValidationError(format!("slot '{}' ends before it starts", raw)));
                }
                return Ok(TimeSlot::Window(Slot { start, end }));
            }
        }

        Ok(TimeSlot::Label(raw.to_string()))
    }
}

impl TryFrom<String> for TimeSlot {
    type Error = CoreError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<TimeSlot> for String {
    fn from(slot: TimeSlot) -> Self {
        slot.to_string()
    }
}

pub fn parse_time(raw: &str) -> CoreResult<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), TIME_FORMAT)
        .map_err(|_| CoreError::ValidationError(format!("'{}' is not a HH:MM time", raw)))
}

/// Parse a service duration entered as free text: `"60"`, `"45 min"`, `"90 minutes"`.
pub fn parse_duration(raw: &str) -> CoreResult<i32> {
    let normalized = raw.trim().to_ascii_lowercase();
    let number = ["minutes", "mins", "min"]
        .iter()
        .find_map(|suffix| normalized.strip_suffix(suffix))
        .unwrap_or(normalized.as_str())
        .trim();

    let minutes: i64 = number
        .parse()
        .map_err(|_| CoreError::ValidationError(format!("duration '{}' is not a whole number of minutes", raw.trim())))?;

    if minutes <= 0 {
        return Err(CoreError::ValidationError("duration must be a positive number of minutes".to_string()));
    }
    if minutes > MAX_DURATION_MINUTES as i64 {
        return Err(CoreError::ValidationError(format!(
            "duration must not exceed {} minutes",
            MAX_DURATION_MINUTES
        )));
    }

    Ok(minutes as i32)
}

/// Every back-to-back slot of `duration_minutes` that fits inside `hours`, earliest first.
/// A trailing remainder shorter than the duration produces no slot.
pub fn generate_slots(duration_minutes: i64, hours: &BusinessHours) -> CoreResult<Vec<Slot>> {
    if duration_minutes <= 0 {
        return Err(CoreError::ValidationError("duration must be a positive number of minutes".to_string()));
    }
    if duration_minutes > hours.length_minutes() {
        return Ok(Vec::new());
    }

    let step = Duration::minutes(duration_minutes);
    let mut slots = Vec::new();
    let mut start = hours.open;

    loop {
        let (end, wrapped) = start.overflowing_add_signed(step);
        if wrapped != 0 || end > hours.close {
            break;
        }
        slots.push(Slot { start, end });
        start = end;
    }

    Ok(slots)
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(super::TIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, super::TIME_FORMAT).map_err(serde::de::Error::custom)
    }
}
