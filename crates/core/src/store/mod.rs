//! In-memory reservation store for a single campus
//!
//! Rooms are held as nested maps `date -> room -> timeslot -> booking`.
//! Each `(date, room)` pair has its own mutex so bookings in different rooms
//! never contend; the outer map is only write-locked when a room is added.
//!
//! Lock order is fixed: room map, room, booking index, ledger. No lock is
//! ever held across an await point, so quota round-trips to other campuses
//! always happen before any of these locks is taken.

mod ledger;

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::NaiveDate;
use tracing::debug;

pub use ledger::WeeklyLedger;

use crate::error::{Error, Result};
use crate::invariants::{assert_booking_owned, assert_index_consistent};
use crate::models::{Booking, BookingId, Campus, SlotRef, Timeslot, UserId};

/// Result of adding slots to a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The room did not exist on that date and was created
    Created,
    /// The room existed and this many new slots were added
    Extended(usize),
    /// Every requested slot already existed
    Unchanged,
}

impl CreateOutcome {
    pub fn changed(self) -> bool {
        !matches!(self, CreateOutcome::Unchanged)
    }
}

#[derive(Debug, Default)]
struct Room {
    slots: BTreeMap<Timeslot, Option<Booking>>,
}

impl Room {
    fn free_count(&self) -> usize {
        self.slots.values().filter(|b| b.is_none()).count()
    }
}

type RoomMap = BTreeMap<NaiveDate, BTreeMap<u16, Arc<Mutex<Room>>>>;

/// Authoritative reservation state of one campus
#[derive(Debug)]
pub struct ReservationStore {
    campus: Campus,
    rooms: RwLock<RoomMap>,
    index: Mutex<HashMap<BookingId, (NaiveDate, u16, Timeslot)>>,
    ledger: Mutex<WeeklyLedger>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ReservationStore {
    pub fn new(campus: Campus) -> Self {
        Self {
            campus,
            rooms: RwLock::new(BTreeMap::new()),
            index: Mutex::new(HashMap::new()),
            ledger: Mutex::new(WeeklyLedger::new()),
        }
    }

    pub fn campus(&self) -> Campus {
        self.campus
    }

    fn room(&self, date: NaiveDate, room: u16) -> Option<Arc<Mutex<Room>>> {
        let rooms = self.rooms.read().unwrap_or_else(PoisonError::into_inner);
        rooms.get(&date).and_then(|r| r.get(&room)).cloned()
    }

    fn slot_not_found(&self, date: NaiveDate, slot: Timeslot) -> Error {
        Error::NotFound(format!("Timeslot ({}) does not exist on ({})", slot, date))
    }

    /// Ensure the room exists on `date` and add any missing slots as free
    pub fn create_room(&self, room: u16, date: NaiveDate, slots: &[Timeslot]) -> CreateOutcome {
        let (handle, created) = match self.room(date, room) {
            Some(handle) => (handle, false),
            None => {
                let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
                match rooms.entry(date).or_default().entry(room) {
                    // Lost a race with another creator
                    Entry::Occupied(e) => (e.get().clone(), false),
                    Entry::Vacant(e) => {
                        let handle = Arc::new(Mutex::new(Room::default()));
                        e.insert(handle.clone());
                        (handle, true)
                    }
                }
            }
        };

        let mut guard = lock(&handle);
        let mut added = 0;
        for slot in slots {
            if !guard.slots.contains_key(slot) {
                guard.slots.insert(*slot, None);
                added += 1;
            }
        }
        debug!(campus = %self.campus, room, %date, added, created, "Create room");

        if created {
            CreateOutcome::Created
        } else if added > 0 {
            CreateOutcome::Extended(added)
        } else {
            CreateOutcome::Unchanged
        }
    }

    /// Remove the requested slots, releasing any bookings they hold.
    /// Returns the number of slots removed.
    pub fn delete_room(&self, room: u16, date: NaiveDate, slots: &[Timeslot]) -> usize {
        let Some(handle) = self.room(date, room) else {
            return 0;
        };
        let mut guard = lock(&handle);
        let mut removed = 0;
        for slot in slots {
            match guard.slots.remove(slot) {
                Some(Some(booking)) => {
                    lock(&self.index).remove(&booking.booking_id);
                    lock(&self.ledger).decrement(booking.student_id, date);
                    removed += 1;
                }
                Some(None) => removed += 1,
                None => {}
            }
        }
        debug!(campus = %self.campus, room, %date, removed, "Delete room slots");
        removed
    }

    /// Fails unless the slot exists and is free. Takes no lock beyond the
    /// room's, so it is safe to call before a quota round-trip.
    pub fn check_bookable(&self, room: u16, date: NaiveDate, slot: Timeslot) -> Result<()> {
        let handle = self
            .room(date, room)
            .ok_or_else(|| self.slot_not_found(date, slot))?;
        let guard = lock(&handle);
        match guard.slots.get(&slot) {
            None => Err(self.slot_not_found(date, slot)),
            Some(Some(_)) => Err(Error::AlreadyBooked(slot.to_string())),
            Some(None) => Ok(()),
        }
    }

    /// Book a slot on this campus alone, with no bookings counted elsewhere
    pub fn book_local(
        &self,
        student: UserId,
        room: u16,
        date: NaiveDate,
        slot: Timeslot,
        limit: u32,
    ) -> Result<BookingId> {
        self.commit_booking(student, room, date, slot, 0, limit)
    }

    /// Commit a booking given the count already held on other campuses.
    ///
    /// The local weekly count is re-read here, under the room and ledger
    /// locks, so two bookings on this campus cannot both slip under the
    /// limit. Counts from other campuses are only as fresh as `peer_total`.
    pub fn commit_booking(
        &self,
        student: UserId,
        room: u16,
        date: NaiveDate,
        slot: Timeslot,
        peer_total: u32,
        limit: u32,
    ) -> Result<BookingId> {
        let handle = self
            .room(date, room)
            .ok_or_else(|| self.slot_not_found(date, slot))?;
        let mut guard = lock(&handle);
        let state = guard
            .slots
            .get_mut(&slot)
            .ok_or_else(|| self.slot_not_found(date, slot))?;
        if state.is_some() {
            return Err(Error::AlreadyBooked(slot.to_string()));
        }

        let mut index = lock(&self.index);
        let mut ledger = lock(&self.ledger);
        let local = ledger.weekly_count(&student, date);
        if peer_total + local >= limit {
            debug!(%student, local, peer_total, limit, "Quota reached");
            return Err(Error::QuotaExceeded { limit });
        }

        let booking_id = BookingId::generate(self.campus);
        assert_booking_owned(&booking_id, self.campus);
        ledger.increment(student, date);
        index.insert(booking_id, (date, room, slot));
        *state = Some(Booking {
            student_id: student,
            booking_id,
        });
        Ok(booking_id)
    }

    /// Cancel a booking owned by `student`, returning the released slot
    pub fn cancel_local(&self, student: UserId, booking_id: BookingId) -> Result<SlotRef> {
        let not_found = || Error::NotFound(format!("Booking ({}) does not exist", booking_id));
        let (date, room, slot) = lock(&self.index)
            .get(&booking_id)
            .copied()
            .ok_or_else(not_found)?;
        let handle = self.room(date, room).ok_or_else(not_found)?;
        let mut guard = lock(&handle);
        let state = guard.slots.get_mut(&slot).ok_or_else(not_found)?;
        let booking = match state {
            Some(booking) if booking.booking_id == booking_id => booking,
            // Cancelled or deleted between the index read and the room lock
            _ => return Err(not_found()),
        };
        if booking.student_id != student {
            return Err(Error::OwnerMismatch(booking_id.to_string()));
        }

        let mut index = lock(&self.index);
        assert_index_consistent(index.get_key_value(&booking_id).map(|(k, _)| k), &booking.booking_id);
        index.remove(&booking_id);
        lock(&self.ledger).decrement(student, date);
        *state = None;

        Ok(SlotRef {
            campus: self.campus,
            room,
            date,
            slot,
        })
    }

    /// Number of free slots across all rooms on `date`
    pub fn available_count(&self, date: NaiveDate) -> usize {
        let handles: Vec<_> = {
            let rooms = self.rooms.read().unwrap_or_else(PoisonError::into_inner);
            rooms
                .get(&date)
                .map(|r| r.values().cloned().collect())
                .unwrap_or_default()
        };
        handles.iter().map(|h| lock(h).free_count()).sum()
    }

    /// Bookings made on this campus by `student` in the week ending at `anchor`
    pub fn weekly_count(&self, student: &UserId, anchor: NaiveDate) -> u32 {
        lock(&self.ledger).weekly_count(student, anchor)
    }

    /// Current state of a slot: `None` if absent, `Some(None)` if free
    pub fn slot(&self, room: u16, date: NaiveDate, slot: Timeslot) -> Option<Option<Booking>> {
        let handle = self.room(date, room)?;
        let guard = lock(&handle);
        guard.slots.get(&slot).cloned()
    }

    /// All slots of a room on a date, in time order
    pub fn slots(&self, room: u16, date: NaiveDate) -> Vec<Timeslot> {
        self.room(date, room)
            .map(|h| lock(&h).slots.keys().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_date;

    const LIMIT: u32 = 3;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    fn slots(list: &str) -> Vec<Timeslot> {
        Timeslot::parse_list(list).unwrap()
    }

    fn student(id: &str) -> UserId {
        id.parse().unwrap()
    }

    #[test]
    fn test_create_room_outcomes() {
        let store = ReservationStore::new(Campus::Dvl);
        let d = date("2021-01-01");

        assert_eq!(store.create_room(201, d, &slots("9:30-10:00")), CreateOutcome::Created);
        assert_eq!(store.create_room(201, d, &slots("9:30-10:00")), CreateOutcome::Unchanged);
        assert_eq!(
            store.create_room(201, d, &slots("9:30-10:00, 10:00-10:30, 11:00-11:30")),
            CreateOutcome::Extended(2)
        );
    }

    #[test]
    fn test_overlapping_creates_yield_union() {
        let store = ReservationStore::new(Campus::Kkl);
        let d = date("2021-01-01");
        store.create_room(201, d, &slots("9:00-9:30, 9:30-10:00"));
        store.create_room(201, d, &slots("9:30-10:00, 10:00-10:30"));
        let outcome = store.create_room(201, d, &slots("9:00-9:30, 10:00-10:30"));

        assert!(!outcome.changed());
        assert_eq!(store.slots(201, d), slots("9:00-9:30, 9:30-10:00, 10:00-10:30"));
    }

    #[test]
    fn test_create_does_not_touch_booked_slot() {
        let store = ReservationStore::new(Campus::Dvl);
        let d = date("2021-01-01");
        let slot = slots("9:30-10:00")[0];
        store.create_room(201, d, &[slot]);
        let id = store.book_local(student("dvls1234"), 201, d, slot, LIMIT).unwrap();

        store.create_room(201, d, &[slot]);
        let booking = store.slot(201, d, slot).unwrap().unwrap();
        assert_eq!(booking.booking_id, id);
    }

    #[test]
    fn test_book_and_rebook() {
        let store = ReservationStore::new(Campus::Dvl);
        let d = date("2021-01-01");
        let slot = slots("9:30-10:00")[0];
        let x = student("dvls1234");
        store.create_room(201, d, &[slot]);

        let id = store.book_local(x, 201, d, slot, LIMIT).unwrap();
        assert_eq!(id.campus(), Campus::Dvl);
        assert_eq!(store.weekly_count(&x, d), 1);

        let again = store.book_local(student("dvls9999"), 201, d, slot, LIMIT);
        assert!(matches!(again, Err(Error::AlreadyBooked(_))));
        assert_eq!(store.weekly_count(&x, d), 1);
        assert_eq!(store.weekly_count(&student("dvls9999"), d), 0);
    }

    #[test]
    fn test_book_missing_slot() {
        let store = ReservationStore::new(Campus::Dvl);
        let d = date("2021-01-01");
        let slot = slots("9:30-10:00")[0];
        let result = store.book_local(student("dvls1234"), 201, d, slot, LIMIT);
        assert!(matches!(result, Err(Error::NotFound(_))));

        store.create_room(201, d, &slots("10:00-10:30"));
        let result = store.book_local(student("dvls1234"), 201, d, slot, LIMIT);
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_cancel_requires_owner() {
        let store = ReservationStore::new(Campus::Wst);
        let d = date("2021-01-01");
        let slot = slots("9:30-10:00")[0];
        store.create_room(201, d, &[slot]);
        let owner = student("wsts0001");
        let id = store.book_local(owner, 201, d, slot, LIMIT).unwrap();

        let result = store.cancel_local(student("wsts0002"), id);
        assert!(matches!(result, Err(Error::OwnerMismatch(_))));
        assert!(store.slot(201, d, slot).unwrap().is_some());
        assert_eq!(store.weekly_count(&owner, d), 1);

        let released = store.cancel_local(owner, id).unwrap();
        assert_eq!(released.room, 201);
        assert_eq!(released.slot, slot);
        assert_eq!(store.slot(201, d, slot), Some(None));
        assert_eq!(store.weekly_count(&owner, d), 0);
    }

    #[test]
    fn test_cancel_unknown_booking() {
        let store = ReservationStore::new(Campus::Wst);
        let result = store.cancel_local(student("wsts0001"), BookingId::generate(Campus::Wst));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_slot_reusable_after_cancel() {
        let store = ReservationStore::new(Campus::Dvl);
        let d = date("2021-01-01");
        let slot = slots("9:30-10:00")[0];
        let x = student("dvls1234");
        store.create_room(201, d, &[slot]);

        let first = store.book_local(x, 201, d, slot, LIMIT).unwrap();
        store.cancel_local(x, first).unwrap();
        let second = store.book_local(x, 201, d, slot, LIMIT).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_quota_on_single_campus() {
        let store = ReservationStore::new(Campus::Dvl);
        let d = date("2021-01-01");
        let x = student("dvls1234");
        for room in 201..=204 {
            store.create_room(room, d, &slots("9:30-10:00"));
        }
        let slot = slots("9:30-10:00")[0];
        for room in 201..=203 {
            store.book_local(x, room, d, slot, LIMIT).unwrap();
        }

        let fourth = store.book_local(x, 204, d, slot, LIMIT);
        assert!(matches!(fourth, Err(Error::QuotaExceeded { limit: 3 })));
        assert_eq!(store.slot(204, d, slot), Some(None));
        assert_eq!(store.weekly_count(&x, d), 3);
    }

    #[test]
    fn test_peer_total_counts_toward_quota() {
        let store = ReservationStore::new(Campus::Dvl);
        let d = date("2021-01-01");
        let slot = slots("9:30-10:00")[0];
        store.create_room(201, d, &[slot]);

        let result = store.commit_booking(student("dvls1234"), 201, d, slot, 3, LIMIT);
        assert!(matches!(result, Err(Error::QuotaExceeded { .. })));
        assert!(store
            .commit_booking(student("dvls1234"), 201, d, slot, 2, LIMIT)
            .is_ok());
    }

    #[test]
    fn test_delete_releases_booking() {
        let store = ReservationStore::new(Campus::Dvl);
        let d = date("2021-01-01");
        let x = student("dvls1234");
        store.create_room(201, d, &slots("9:30-10:00, 10:00-10:30"));
        let id = store.book_local(x, 201, d, slots("9:30-10:00")[0], LIMIT).unwrap();

        assert_eq!(store.delete_room(201, d, &slots("9:30-10:00")), 1);
        assert_eq!(store.weekly_count(&x, d), 0);
        assert!(matches!(store.cancel_local(x, id), Err(Error::NotFound(_))));
        assert_eq!(store.slots(201, d), slots("10:00-10:30"));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = ReservationStore::new(Campus::Dvl);
        let d = date("2021-01-01");
        store.create_room(201, d, &slots("9:30-10:00"));

        assert_eq!(store.delete_room(201, d, &slots("9:30-10:00")), 1);
        assert_eq!(store.delete_room(201, d, &slots("9:30-10:00")), 0);
        assert_eq!(store.delete_room(999, d, &slots("9:30-10:00")), 0);
        // The emptied room still exists; re-adding is a partial add
        assert_eq!(
            store.create_room(201, d, &slots("9:30-10:00")),
            CreateOutcome::Extended(1)
        );
    }

    #[test]
    fn test_available_count() {
        let store = ReservationStore::new(Campus::Kkl);
        let d = date("2021-01-01");
        store.create_room(201, d, &slots("9:00-9:30, 9:30-10:00"));
        store.create_room(202, d, &slots("9:00-9:30"));
        store.create_room(203, date("2021-01-02"), &slots("9:00-9:30"));
        store
            .book_local(student("kkls0001"), 201, d, slots("9:00-9:30")[0], LIMIT)
            .unwrap();

        assert_eq!(store.available_count(d), 2);
        assert_eq!(store.available_count(date("2021-01-02")), 1);
        assert_eq!(store.available_count(date("2021-01-03")), 0);
    }

    #[test]
    fn test_concurrent_bookings_respect_local_quota() {
        let store = Arc::new(ReservationStore::new(Campus::Dvl));
        let d = date("2021-01-01");
        let slot = slots("9:30-10:00")[0];
        for room in 200..210 {
            store.create_room(room, d, &[slot]);
        }
        let x = student("dvls1234");

        let handles: Vec<_> = (200..210)
            .map(|room| {
                let store = store.clone();
                std::thread::spawn(move || store.book_local(x, room, d, slot, LIMIT).is_ok())
            })
            .collect();
        let booked = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(booked, 3);
        assert_eq!(store.weekly_count(&x, d), 3);
    }
}
