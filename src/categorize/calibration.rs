use chrono::{NaiveDate, NaiveDateTime};

use crate::models::CalibrationStatus;

/// Days at or below which an upcoming calibration is flagged.
pub const WARNING_WINDOW_DAYS: i64 = 10;

const SECONDS_PER_DAY: i64 = 86_400;

/// Tried in order; the first format that parses wins.
const DATE_TIME_FORMATS: &[&str] = &[
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d",
    "%d/%m/%Y %I:%M %p",
    "%d/%m/%Y",
    "%m-%d-%Y",
];

pub fn parse_calibration_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    DATE_TIME_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(raw, format)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(raw, format)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })
    })
}

/// Whole days from `now` until `due`, rounded towards negative infinity.
pub fn days_until(due: NaiveDateTime, now: NaiveDateTime) -> i64 {
    (due - now).num_seconds().div_euclid(SECONDS_PER_DAY)
}

pub fn classify(days: i64) -> CalibrationStatus {
    if days < 0 {
        CalibrationStatus::Danger
    } else if days <= WARNING_WINDOW_DAYS {
        CalibrationStatus::Warning
    } else {
        CalibrationStatus::Ok
    }
}

/// `None` when the text matches none of the known formats.
pub fn assess(raw: &str, now: NaiveDateTime) -> Option<(i64, CalibrationStatus)> {
    let due = parse_calibration_date(raw)?;
    let days = days_until(due, now);
    Some((days, classify(days)))
}
