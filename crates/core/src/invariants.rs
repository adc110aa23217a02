//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use chrono::NaiveDate;

use crate::models::{BookingId, Campus, UserId};

/// A weekly counter is only decremented for a booking that counted toward it
pub fn assert_counter_positive(student: &UserId, date: NaiveDate, current: u32) {
    debug_assert!(
        current > 0,
        "Weekly counter for {} on {} would drop below zero",
        student,
        date
    );
}

/// Bookings stored on a campus must carry that campus's prefix
pub fn assert_booking_owned(booking_id: &BookingId, campus: Campus) {
    debug_assert!(
        booking_id.campus() == campus,
        "Booking {} stored on campus {}",
        booking_id,
        campus
    );
}

/// The booking index and the slot it points at must agree
pub fn assert_index_consistent(indexed: Option<&BookingId>, stored: &BookingId) {
    debug_assert!(
        indexed == Some(stored),
        "Booking index entry {:?} does not match stored booking {}",
        indexed,
        stored
    );
}
