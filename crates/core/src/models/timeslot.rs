//! Timeslot labels and booking dates
//!
//! Timeslots are written `H:MM-H:MM` (a leading zero on the hour is
//! accepted). Dates are ISO `YYYY-MM-DD`.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Date format used on the wire and in messages
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A validated time range within a room and date
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeslot {
    /// Minutes since midnight
    start: u16,
    end: u16,
}

impl Timeslot {
    pub fn new(start_hour: u8, start_minute: u8, end_hour: u8, end_minute: u8) -> Result<Self> {
        let start = minutes(start_hour, start_minute)?;
        let end = minutes(end_hour, end_minute)?;
        if start >= end {
            return Err(Error::InvalidArgument(format!(
                "Timeslot must end after it starts ({}:{:02}-{}:{:02})",
                start_hour, start_minute, end_hour, end_minute
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse a comma separated list such as `9:30-10:00, 11:15-11:30`
    pub fn parse_list(list: &str) -> Result<Vec<Timeslot>> {
        let slots = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<Timeslot>>>()?;
        if slots.is_empty() {
            return Err(Error::InvalidArgument("Empty list of timeslots".into()));
        }
        Ok(slots)
    }
}

fn minutes(hour: u8, minute: u8) -> Result<u16> {
    if hour > 23 || minute > 59 {
        return Err(Error::InvalidArgument(format!(
            "Invalid time {}:{:02}",
            hour, minute
        )));
    }
    Ok(hour as u16 * 60 + minute as u16)
}

fn parse_clock(s: &str) -> Option<(u8, u8)> {
    let (hour, minute) = s.split_once(':')?;
    let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if hour.is_empty() || hour.len() > 2 || minute.len() != 2 || !digits(hour) || !digits(minute) {
        return None;
    }
    Some((hour.parse().ok()?, minute.parse().ok()?))
}

impl FromStr for Timeslot {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            Error::InvalidArgument(format!(
                "Invalid timeslot '{}', must look like 9:30-10:00",
                s
            ))
        };
        let (from, to) = s.trim().split_once('-').ok_or_else(invalid)?;
        let (sh, sm) = parse_clock(from.trim()).ok_or_else(invalid)?;
        let (eh, em) = parse_clock(to.trim()).ok_or_else(invalid)?;
        Timeslot::new(sh, sm, eh, em)
    }
}

impl fmt::Display for Timeslot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{:02}-{}:{:02}",
            self.start / 60,
            self.start % 60,
            self.end / 60,
            self.end % 60
        )
    }
}

impl TryFrom<String> for Timeslot {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Timeslot> for String {
    fn from(slot: Timeslot) -> Self {
        slot.to_string()
    }
}

/// Parse an ISO date
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|_| {
        Error::InvalidArgument(format!("Invalid date '{}', must look like 2021-01-01", s))
    })
}

/// First date (inclusive) of the week window ending at `anchor`
pub fn week_start(anchor: NaiveDate) -> NaiveDate {
    anchor - Duration::days(6)
}
