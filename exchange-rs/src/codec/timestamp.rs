//! ISO-8601 local date-time formatting (no zone)
//!
//! Seconds are omitted when zero, the fraction when zero, so
//! `2024-05-01T10:30` and `2024-05-01T10:30:15.250` are both canonical.

use crate::error::{ExchangeError, Result};
use chrono::{NaiveDateTime, Timelike};

const WITH_SECONDS: &str = "%Y-%m-%dT%H:%M:%S%.f";
const WITHOUT_SECONDS: &str = "%Y-%m-%dT%H:%M";

pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, WITH_SECONDS)
        .or_else(|_| NaiveDateTime::parse_from_str(text, WITHOUT_SECONDS))
        .map_err(|_| ExchangeError::InvalidDate(text.to_string()))
}

pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    if timestamp.second() == 0 && timestamp.nanosecond() == 0 {
        timestamp.format(WITHOUT_SECONDS).to_string()
    } else {
        timestamp.format(WITH_SECONDS).to_string()
    }
}
