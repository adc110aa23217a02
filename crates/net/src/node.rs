//! Campus node: request routing over the local store and peer campuses
//!
//! Requests for this campus are served from the local [`ReservationStore`].
//! Requests naming another campus are forwarded once, over the inter-node
//! channel, and the peer's response is returned as-is.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{info, warn};

use campus_core::{BookingId, Campus, CreateOutcome, ReservationStore, Timeslot, UserId};

use crate::aggregator::Aggregator;
use crate::error::Error;
use crate::peer::PeerLink;
use crate::protocol::{Action, ErrorKind, Request, Response};

/// Headroom on top of the owner's own worst case when forwarding. A booking
/// can spend a full peer timeout on the owner's quota fan-out before it
/// commits, so forwarded calls wait twice the peer timeout plus this margin.
const FORWARD_MARGIN: Duration = Duration::from_millis(250);

/// Endpoint a request arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Client,
    InterNode,
}

pub struct CampusNode {
    campus: Campus,
    store: Arc<ReservationStore>,
    aggregator: Aggregator,
    forward_timeout: Duration,
    weekly_quota: u32,
}

fn ok(action: Action, message: impl Into<String>) -> Response {
    Response::ok(action, message, String::new())
}

fn fail(action: Action, kind: ErrorKind, message: impl Into<String>) -> Response {
    Response::fail(action, kind, message, String::new())
}

/// Failure response for a store error, worded for the end user
fn store_failure(action: Action, err: &campus_core::Error) -> Response {
    use campus_core::Error as E;
    let message = match err {
        E::NotFound(detail) => detail.clone(),
        E::AlreadyBooked(slot) => {
            format!("Unable to book room, timeslot ({}) has already been booked", slot)
        }
        E::QuotaExceeded { .. } => "Unable to book room, maximum booking limit is reached".into(),
        other => other.to_string(),
    };
    fail(action, err.into(), message)
}

impl CampusNode {
    pub fn new(
        store: Arc<ReservationStore>,
        link: Arc<dyn PeerLink>,
        peer_timeout: Duration,
        weekly_quota: u32,
    ) -> Self {
        Self {
            campus: store.campus(),
            store,
            aggregator: Aggregator::new(link, peer_timeout),
            forward_timeout: peer_timeout * 2 + FORWARD_MARGIN,
            weekly_quota,
        }
    }

    pub fn campus(&self) -> Campus {
        self.campus
    }

    pub fn store(&self) -> &Arc<ReservationStore> {
        &self.store
    }

    /// Serve one request. Every outcome, including routing and peer
    /// failures, comes back as a response.
    pub async fn handle(&self, channel: Channel, request: Request) -> Response {
        let action = request.action();
        let parameters = request.parameters();
        let mut response = match (channel, request) {
            (Channel::Client, Request::CreateRoom { room, date, slots }) => {
                self.create_room(room, date, &slots)
            }
            (Channel::Client, Request::DeleteRoom { room, date, slots }) => {
                self.delete_room(room, date, &slots)
            }
            (Channel::InterNode, Request::CreateRoom { .. }) => fail(
                action,
                ErrorKind::Unsupported,
                "Create Room not supported through inter-node channel",
            ),
            (Channel::InterNode, Request::DeleteRoom { .. }) => fail(
                action,
                ErrorKind::Unsupported,
                "Delete Room not supported through inter-node channel",
            ),
            (
                channel,
                Request::BookRoom {
                    student_id,
                    campus,
                    room,
                    date,
                    slot,
                },
            ) => match self.require_student(action, channel, student_id) {
                Some(rejected) => rejected,
                None => {
                    self.book_room(channel, student_id, campus, room, date, slot)
                        .await
                }
            },
            (
                channel,
                Request::CancelBooking {
                    student_id,
                    booking_id,
                },
            ) => match self.require_student(action, channel, student_id) {
                Some(rejected) => rejected,
                None => self.cancel_booking(channel, student_id, booking_id).await,
            },
            (
                Channel::Client,
                Request::ChangeReservation {
                    student_id,
                    booking_id,
                    new_campus,
                    new_room,
                    new_date,
                    new_slot,
                },
            ) => match self.require_student(action, Channel::Client, student_id) {
                Some(rejected) => rejected,
                None => {
                    self.change_reservation(
                        student_id, booking_id, new_campus, new_room, new_date, new_slot,
                    )
                    .await
                }
            },
            (Channel::Client, Request::GetAvailableTimeSlot { date }) => {
                self.available_time_slots(date).await
            }
            (Channel::InterNode, Request::GetAvailableTimeslots { date }) => {
                self.available_count_local(date)
            }
            (Channel::InterNode, Request::GetBookingCount { student_id, date }) => {
                self.booking_count(student_id, date)
            }
            (_, Request::Unrecognized) => {
                fail(action, ErrorKind::Unsupported, "Unrecognized action")
            }
            (channel, _) => fail(
                action,
                ErrorKind::Unsupported,
                format!("{:?} not supported through {:?} channel", action, channel),
            ),
        };
        response.action = action;
        response.parameters = parameters;
        response
    }

    /// Client requests acting for a student must carry a student identifier
    fn require_student(&self, action: Action, channel: Channel, user: UserId) -> Option<Response> {
        if channel == Channel::Client && !user.is_student() {
            return Some(fail(
                action,
                ErrorKind::InvalidArgument,
                format!("Identifier ({}) is not a student", user),
            ));
        }
        None
    }

    fn create_room(&self, room: u16, date: NaiveDate, slots: &[Timeslot]) -> Response {
        let action = Action::CreateRoom;
        if slots.is_empty() {
            return fail(action, ErrorKind::InvalidArgument, "List of timeslots is empty");
        }
        match self.store.create_room(room, date, slots) {
            CreateOutcome::Created => {
                info!(campus = %self.campus, room, %date, "Room created");
                ok(action, format!("Created room ({})", room))
            }
            CreateOutcome::Extended(added) => {
                info!(campus = %self.campus, room, %date, added, "Timeslots added");
                ok(action, format!("Added timeslots to room ({})", room))
            }
            CreateOutcome::Unchanged => fail(
                action,
                ErrorKind::AlreadyExists,
                "Room already exists with the specified timeslots",
            ),
        }
    }

    fn delete_room(&self, room: u16, date: NaiveDate, slots: &[Timeslot]) -> Response {
        let action = Action::DeleteRoom;
        match self.store.delete_room(room, date, slots) {
            0 => fail(
                action,
                ErrorKind::NotFound,
                format!("No timeslots to delete on ({})", date),
            ),
            removed => {
                info!(campus = %self.campus, room, %date, removed, "Timeslots removed");
                ok(action, format!("Removed timeslots from room ({})", room))
            }
        }
    }

    async fn book_room(
        &self,
        channel: Channel,
        student: UserId,
        campus: Campus,
        room: u16,
        date: NaiveDate,
        slot: Timeslot,
    ) -> Response {
        if campus == self.campus {
            return self.book_here(student, room, date, slot).await;
        }
        let request = Request::BookRoom {
            student_id: student,
            campus,
            room,
            date,
            slot,
        };
        self.forward(channel, campus, request).await
    }

    /// Book on this campus after checking the student's weekly total
    async fn book_here(&self, student: UserId, room: u16, date: NaiveDate, slot: Timeslot) -> Response {
        let action = Action::BookRoom;
        if let Err(e) = self.store.check_bookable(room, date, slot) {
            return store_failure(action, &e);
        }

        // No store lock is held across the peer round-trip
        let peers = self
            .aggregator
            .peer_booking_total(self.campus, student, date)
            .await;
        match self
            .store
            .commit_booking(student, room, date, slot, peers.total(), self.weekly_quota)
        {
            Ok(booking_id) => {
                info!(%student, %booking_id, room, %date, %slot, "Booked");
                ok(
                    action,
                    format!("Timeslot ({}) has been booked | Booking ID: {}", slot, booking_id),
                )
                .with_booking_id(booking_id)
            }
            Err(e) => store_failure(action, &e),
        }
    }

    async fn cancel_booking(&self, channel: Channel, student: UserId, booking_id: BookingId) -> Response {
        let action = Action::CancelBooking;
        let owner = booking_id.campus();
        if owner != self.campus {
            let request = Request::CancelBooking {
                student_id: student,
                booking_id,
            };
            return self.forward(channel, owner, request).await;
        }
        match self.store.cancel_local(student, booking_id) {
            Ok(released) => {
                info!(%student, %booking_id, "Booking cancelled");
                ok(action, format!("Cancelled booking ({})", booking_id)).with_released(released)
            }
            Err(e) => store_failure(action, &e),
        }
    }

    /// Send a request to the campus that owns it. Requests that already
    /// crossed a campus boundary are not forwarded again.
    async fn forward(&self, channel: Channel, campus: Campus, request: Request) -> Response {
        let action = request.action();
        if channel == Channel::InterNode {
            return fail(
                action,
                ErrorKind::Unsupported,
                format!("{} does not serve campus {}", self.campus, campus),
            );
        }
        match self
            .aggregator
            .link()
            .send(campus, &request, self.forward_timeout)
            .await
        {
            Ok(response) => response,
            Err(Error::Timeout(waited)) => {
                warn!(%campus, ?waited, "Forwarded request timed out");
                fail(
                    action,
                    ErrorKind::OutcomeUnknown,
                    format!(
                        "No reply from {} server within {:?}, the request may have been applied",
                        campus, waited
                    ),
                )
            }
            Err(e) => {
                warn!(%campus, error = %e, "Forwarding failed");
                fail(
                    action,
                    ErrorKind::PeerUnreachable,
                    format!("Unable to reach {} server: {}", campus, e),
                )
            }
        }
    }

    /// Cancel then book; if the booking fails, try to restore the original
    /// slot before reporting. A booking whose outcome is unknown is never
    /// followed by a restore, since the student may already hold the new slot.
    async fn change_reservation(
        &self,
        student: UserId,
        old_booking: BookingId,
        new_campus: Campus,
        new_room: u16,
        new_date: NaiveDate,
        new_slot: Timeslot,
    ) -> Response {
        let action = Action::ChangeReservation;
        let cancelled = self
            .cancel_booking(Channel::Client, student, old_booking)
            .await;
        if !cancelled.success {
            return fail(
                action,
                cancelled.error.unwrap_or(ErrorKind::PeerUnreachable),
                cancelled.message,
            );
        }

        let booked = self
            .book_room(Channel::Client, student, new_campus, new_room, new_date, new_slot)
            .await;
        if let (true, Some(booking_id)) = (booked.success, booked.booking_id) {
            return ok(
                action,
                format!(
                    "Cancelled booking ({}) and booked timeslot ({}) | Booking ID: {}",
                    old_booking, new_slot, booking_id
                ),
            )
            .with_booking_id(booking_id);
        }

        if booked.error == Some(ErrorKind::OutcomeUnknown) {
            warn!(%student, %old_booking, "New booking outcome unknown, not restoring");
            return fail(
                action,
                ErrorKind::PartiallyFailed,
                format!(
                    "Cancelled booking ({}) but the new booking could not be confirmed: {}",
                    old_booking, booked.message
                ),
            );
        }

        let Some(original) = cancelled.released else {
            warn!(%student, %old_booking, "Cancelled booking has no slot to restore");
            return fail(
                action,
                ErrorKind::PartiallyFailed,
                format!(
                    "Cancelled booking ({}) but unable to book new timeslot: {}",
                    old_booking, booked.message
                ),
            );
        };
        let restored = self
            .book_room(
                Channel::Client,
                student,
                original.campus,
                original.room,
                original.date,
                original.slot,
            )
            .await;
        match (restored.success, restored.booking_id) {
            (true, Some(restored_id)) => {
                info!(%student, %old_booking, %restored_id, "Original slot restored");
                fail(
                    action,
                    booked.error.unwrap_or(ErrorKind::PeerUnreachable),
                    format!(
                        "Unable to change reservation: {} | Original timeslot restored | Booking ID: {}",
                        booked.message, restored_id
                    ),
                )
                .with_booking_id(restored_id)
            }
            _ => {
                warn!(%student, %old_booking, reason = %restored.message, "Original slot lost");
                fail(
                    action,
                    ErrorKind::PartiallyFailed,
                    format!(
                        "Unable to change reservation: {} | Booking ({}) was cancelled and could not be restored: {}",
                        booked.message, old_booking, restored.message
                    ),
                )
            }
        }
    }

    /// Free slots on every campus. Succeeds even when no peer answers.
    async fn available_time_slots(&self, date: NaiveDate) -> Response {
        let local = self.store.available_count(date) as u32;
        let tally = self.aggregator.availability(self.campus, local, date).await;
        ok(Action::GetAvailableTimeSlot, tally.to_string())
    }

    fn available_count_local(&self, date: NaiveDate) -> Response {
        let count = self.store.available_count(date) as u32;
        ok(Action::GetAvailableTimeslots, count.to_string()).with_count(count)
    }

    fn booking_count(&self, student: UserId, date: NaiveDate) -> Response {
        let count = self.store.weekly_count(&student, date);
        ok(Action::GetBookingCount, count.to_string()).with_count(count)
    }
}
