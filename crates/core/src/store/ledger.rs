//! Per-student weekly booking counters
//!
//! Counts are recorded against the booking date; a week query sums the
//! seven days ending at the anchor date.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::invariants::assert_counter_positive;
use crate::models::{week_start, UserId};

#[derive(Debug, Default)]
pub struct WeeklyLedger {
    counts: HashMap<UserId, BTreeMap<NaiveDate, u32>>,
}

impl WeeklyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, student: UserId, date: NaiveDate) {
        *self
            .counts
            .entry(student)
            .or_default()
            .entry(date)
            .or_insert(0) += 1;
    }

    /// Returns false if there was nothing to decrement
    pub fn decrement(&mut self, student: UserId, date: NaiveDate) -> bool {
        let Some(dates) = self.counts.get_mut(&student) else {
            assert_counter_positive(&student, date, 0);
            return false;
        };
        let current = dates.get(&date).copied().unwrap_or(0);
        assert_counter_positive(&student, date, current);
        match current {
            0 => return false,
            1 => {
                dates.remove(&date);
            }
            n => {
                dates.insert(date, n - 1);
            }
        }
        if dates.is_empty() {
            self.counts.remove(&student);
        }
        true
    }

    /// Bookings made by `student` in the week ending at `anchor`
    pub fn weekly_count(&self, student: &UserId, anchor: NaiveDate) -> u32 {
        self.counts
            .get(student)
            .map(|dates| dates.range(week_start(anchor)..=anchor).map(|(_, n)| n).sum())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_date;

    fn student() -> UserId {
        "dvls1234".parse().unwrap()
    }

    #[test]
    fn test_counts_within_week() {
        let mut ledger = WeeklyLedger::new();
        ledger.increment(student(), parse_date("2021-01-01").unwrap());
        ledger.increment(student(), parse_date("2021-01-05").unwrap());
        ledger.increment(student(), parse_date("2021-01-09").unwrap());

        assert_eq!(ledger.weekly_count(&student(), parse_date("2021-01-07").unwrap()), 2);
        assert_eq!(ledger.weekly_count(&student(), parse_date("2021-01-09").unwrap()), 2);
        assert_eq!(ledger.weekly_count(&student(), parse_date("2021-01-20").unwrap()), 0);
    }

    #[test]
    fn test_decrement_removes_empty_entries() {
        let mut ledger = WeeklyLedger::new();
        let date = parse_date("2021-01-01").unwrap();
        ledger.increment(student(), date);
        assert!(ledger.decrement(student(), date));
        assert_eq!(ledger.weekly_count(&student(), date), 0);
        assert!(ledger.counts.is_empty());
    }
}
