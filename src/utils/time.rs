use std::str::FromStr;

use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

/// Input rejected at the command boundary. Nothing that fails here ever reaches the store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid time \"{0}\": expected HHhMM, e.g. 20h30")]
    Time(String),
    #[error("Invalid date \"{0}\": expected DD/MM/YYYY, e.g. 24/12/2026")]
    Date(String),
    #[error("Invalid duration \"{0}\": expected NNmin, e.g. 90min")]
    Duration(String),
    #[error("{0} does not exist in the configured timezone")]
    NonexistentLocalTime(NaiveDateTime),
    #[error("The start time {0} is in the past")]
    StartInPast(DateTime<Utc>),
    #[error("The name cannot be empty")]
    EmptyName,
    #[error("The duration must be at least one minute")]
    ZeroDuration,
    #[error("The maximum number of participants must be at least one")]
    ZeroCapacity,
    #[error("The minimum number of participants ({min}) is above the maximum ({max})")]
    MinAboveMax { min: u32, max: u32 },
}

fn all_digits(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_digit())
}

/// A time of day written as `HHhMM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay(pub NaiveTime);

impl FromStr for TimeOfDay {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::Time(s.to_string());
        let (hour, minute) = s.trim().split_once(['h', 'H']).ok_or_else(invalid)?;
        if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
            return Err(invalid());
        }
        if !all_digits(hour) || !all_digits(minute) {
            return Err(invalid());
        }
        let hour: u32 = hour.parse().map_err(|_| invalid())?;
        let minute: u32 = minute.parse().map_err(|_| invalid())?;
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(TimeOfDay)
            .ok_or_else(invalid)
    }
}

/// A calendar date written as `DD/MM/YYYY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventDate(pub NaiveDate);

impl FromStr for EventDate {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || ValidationError::Date(s.to_string());
        let parts: Vec<&str> = trimmed.split('/').collect();
        let [day, month, year] = parts[..] else {
            return Err(invalid());
        };
        if day.len() != 2 || month.len() != 2 || year.len() != 4 {
            return Err(invalid());
        }
        if !all_digits(day) || !all_digits(month) || !all_digits(year) {
            return Err(invalid());
        }
        let day: u32 = day.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        NaiveDate::from_ymd_opt(year, month, day)
            .map(EventDate)
            .ok_or_else(invalid)
    }
}

/// A positive duration written as `NNmin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationMinutes(pub u32);

impl FromStr for DurationMinutes {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::Duration(s.to_string());
        let digits = s.trim().strip_suffix("min").ok_or_else(invalid)?;
        if digits.is_empty() || !all_digits(digits) {
            return Err(invalid());
        }
        match digits.parse::<u32>() {
            Ok(0) => Err(ValidationError::ZeroDuration),
            Ok(minutes) => Ok(DurationMinutes(minutes)),
            Err(_) => Err(invalid()),
        }
    }
}

/// Converts a wall-clock date and time in `timezone` to UTC.
///
/// Ambiguous local times (DST fall-back) resolve to the earlier instant.
pub fn to_utc(
    date: EventDate,
    time: TimeOfDay,
    timezone: Tz,
) -> Result<DateTime<Utc>, ValidationError> {
    let naive = date.0.and_time(time.0);
    match timezone.from_local_datetime(&naive) {
        LocalResult::Single(local) | LocalResult::Ambiguous(local, _) => {
            Ok(local.with_timezone(&Utc))
        }
        LocalResult::None => Err(ValidationError::NonexistentLocalTime(naive)),
    }
}
