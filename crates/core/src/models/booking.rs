//! Booking identifiers and records

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Campus, Timeslot, UserId};
use crate::error::Error;

/// Globally unique booking id, prefixed with its owning campus (`DVL:<uuid>`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BookingId {
    campus: Campus,
    id: Uuid,
}

impl BookingId {
    /// Fresh id owned by `campus`
    pub fn generate(campus: Campus) -> Self {
        Self {
            campus,
            id: Uuid::new_v4(),
        }
    }

    /// Campus that owns the booked slot
    pub fn campus(&self) -> Campus {
        self.campus
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.campus, self.id)
    }
}

impl FromStr for BookingId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            Error::InvalidArgument(format!(
                "Invalid booking ID '{}' (ie. KKL:ce612356-db1f-4523-8c8b-c35bff35ebd0)",
                s
            ))
        };
        let (campus, id) = s.trim().split_once(':').ok_or_else(invalid)?;
        let campus = campus.parse().map_err(|_| invalid())?;
        let id = Uuid::parse_str(id).map_err(|_| invalid())?;
        Ok(Self { campus, id })
    }
}

impl TryFrom<String> for BookingId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BookingId> for String {
    fn from(id: BookingId) -> Self {
        id.to_string()
    }
}

/// State held by a booked timeslot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub student_id: UserId,
    pub booking_id: BookingId,
}

/// Full address of a slot on a campus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotRef {
    pub campus: Campus,
    pub room: u16,
    pub date: NaiveDate,
    pub slot: Timeslot,
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} room {} on {} at {}",
            self.campus, self.room, self.date, self.slot
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_id_carries_campus() {
        let id = BookingId::generate(Campus::Wst);
        let text = id.to_string();
        assert!(text.starts_with("WST:"));
        let parsed: BookingId = text.parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(parsed.campus(), Campus::Wst);
    }

    #[test]
    fn test_booking_id_rejects_garbage() {
        assert!("WST".parse::<BookingId>().is_err());
        assert!("XYZ:ce612356-db1f-4523-8c8b-c35bff35ebd0".parse::<BookingId>().is_err());
        assert!("KKL:not-a-uuid".parse::<BookingId>().is_err());
        assert!("kkl:ce612356-db1f-4523-8c8b-c35bff35ebd0".parse::<BookingId>().is_ok());
    }
}
