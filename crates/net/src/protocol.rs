//! Wire protocol message types
//!
//! Every message is a single JSON datagram. Requests carry an `action`
//! tag; all replies share the [`Response`] envelope.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use campus_core::{BookingId, Campus, ServiceKind, SlotRef, Timeslot, UserId};

/// Action discriminator echoed in every response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Register,
    Lookup,
    GetAvailablePort,
    /// Free slot count on one campus (inter-node)
    GetAvailableTimeslots,
    BookRoom,
    CancelBooking,
    GetBookingCount,
    CreateRoom,
    DeleteRoom,
    /// Free slot summary across all campuses (client-facing)
    GetAvailableTimeSlot,
    ChangeReservation,
    Unrecognized,
}

/// Typed failure reason carried by unsuccessful responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    AlreadyBooked,
    OwnerMismatch,
    QuotaExceeded,
    PeerUnreachable,
    Unsupported,
    Malformed,
    InvalidArgument,
    /// A multi-step operation failed after an earlier step took effect
    PartiallyFailed,
    /// A forwarded request got no reply in time; it may still have been applied
    OutcomeUnknown,
}

impl From<&campus_core::Error> for ErrorKind {
    fn from(err: &campus_core::Error) -> Self {
        use campus_core::Error as E;
        match err {
            E::NotFound(_) => ErrorKind::NotFound,
            E::AlreadyExists(_) => ErrorKind::AlreadyExists,
            E::AlreadyBooked(_) => ErrorKind::AlreadyBooked,
            E::OwnerMismatch(_) => ErrorKind::OwnerMismatch,
            E::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            E::InvalidArgument(_) | E::Config(_) | E::Io(_) | E::Toml(_) => {
                ErrorKind::InvalidArgument
            }
        }
    }
}

impl From<&crate::Error> for ErrorKind {
    fn from(err: &crate::Error) -> Self {
        use crate::Error as E;
        match err {
            E::Core(inner) => inner.into(),
            E::Malformed(_) | E::PayloadTooLarge { .. } => ErrorKind::Malformed,
            E::Io(_) | E::Timeout(_) | E::PeerUnreachable(_) | E::Registry(_) => {
                ErrorKind::PeerUnreachable
            }
        }
    }
}

/// A published endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub service_kind: ServiceKind,
    pub campus: Campus,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl RegistryEntry {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Registry actions. Anything unrecognized is handled as a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryAction {
    Lookup,
    GetAvailablePort,
    #[serde(other)]
    Register,
}

impl From<RegistryAction> for Action {
    fn from(action: RegistryAction) -> Self {
        match action {
            RegistryAction::Register => Action::Register,
            RegistryAction::Lookup => Action::Lookup,
            RegistryAction::GetAvailablePort => Action::GetAvailablePort,
        }
    }
}

/// Registry request. Fields not used by an action may be omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryRequest {
    pub action: RegistryAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_kind: Option<ServiceKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campus: Option<Campus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl RegistryRequest {
    pub fn register(entry: &RegistryEntry) -> Self {
        Self {
            action: RegistryAction::Register,
            service_kind: Some(entry.service_kind),
            campus: Some(entry.campus),
            host: Some(entry.host.clone()),
            port: Some(entry.port),
            path: Some(entry.path.clone()),
        }
    }

    pub fn lookup(service_kind: ServiceKind, campus: Campus) -> Self {
        Self {
            action: RegistryAction::Lookup,
            service_kind: Some(service_kind),
            campus: Some(campus),
            host: None,
            port: None,
            path: None,
        }
    }

    pub fn available_port() -> Self {
        Self {
            action: RegistryAction::GetAvailablePort,
            service_kind: None,
            campus: None,
            host: None,
            port: None,
            path: None,
        }
    }

    /// The entry described by a registration, if every field is present
    pub fn entry(&self) -> Option<RegistryEntry> {
        Some(RegistryEntry {
            service_kind: self.service_kind?,
            campus: self.campus?,
            host: self.host.clone()?,
            port: self.port?,
            path: self.path.clone().unwrap_or_default(),
        })
    }

    pub fn parameters(&self) -> String {
        let show = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
        format!(
            "Type: {} | Campus: {} | Host: {} | Port: {} | Path: {}",
            show(self.service_kind.map(|k| k.to_string())),
            show(self.campus.map(|c| c.to_string())),
            show(self.host.clone()),
            show(self.port.map(|p| p.to_string())),
            show(self.path.clone()),
        )
    }
}

/// Campus requests, over either the client or the inter-node channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum Request {
    CreateRoom {
        room: u16,
        date: NaiveDate,
        slots: Vec<Timeslot>,
    },
    DeleteRoom {
        room: u16,
        date: NaiveDate,
        slots: Vec<Timeslot>,
    },
    BookRoom {
        student_id: UserId,
        campus: Campus,
        room: u16,
        date: NaiveDate,
        slot: Timeslot,
    },
    GetAvailableTimeSlot {
        date: NaiveDate,
    },
    GetAvailableTimeslots {
        date: NaiveDate,
    },
    CancelBooking {
        student_id: UserId,
        booking_id: BookingId,
    },
    ChangeReservation {
        student_id: UserId,
        booking_id: BookingId,
        new_campus: Campus,
        new_room: u16,
        new_date: NaiveDate,
        new_slot: Timeslot,
    },
    GetBookingCount {
        student_id: UserId,
        date: NaiveDate,
    },
    #[serde(other)]
    Unrecognized,
}

fn slot_list(slots: &[Timeslot]) -> String {
    let labels: Vec<String> = slots.iter().map(|s| s.to_string()).collect();
    format!("[{}]", labels.join(", "))
}

impl Request {
    pub fn action(&self) -> Action {
        match self {
            Request::CreateRoom { .. } => Action::CreateRoom,
            Request::DeleteRoom { .. } => Action::DeleteRoom,
            Request::BookRoom { .. } => Action::BookRoom,
            Request::GetAvailableTimeSlot { .. } => Action::GetAvailableTimeSlot,
            Request::GetAvailableTimeslots { .. } => Action::GetAvailableTimeslots,
            Request::CancelBooking { .. } => Action::CancelBooking,
            Request::ChangeReservation { .. } => Action::ChangeReservation,
            Request::GetBookingCount { .. } => Action::GetBookingCount,
            Request::Unrecognized => Action::Unrecognized,
        }
    }

    /// Human-readable echo of the request parameters for the audit trail
    pub fn parameters(&self) -> String {
        match self {
            Request::CreateRoom { room, date, slots } | Request::DeleteRoom { room, date, slots } => {
                format!(
                    "Room number: {} | Date: {} | List of Timeslots: {}",
                    room,
                    date,
                    slot_list(slots)
                )
            }
            Request::BookRoom {
                student_id,
                campus,
                room,
                date,
                slot,
            } => format!(
                "Identifier: {} | Campus: {} | Room Number: {} | Date: {} | Timeslot: {}",
                student_id, campus, room, date, slot
            ),
            Request::GetAvailableTimeSlot { date } | Request::GetAvailableTimeslots { date } => {
                format!("Date: {}", date)
            }
            Request::CancelBooking {
                student_id,
                booking_id,
            } => format!("Identifier: {} | Booking Id: {}", student_id, booking_id),
            Request::ChangeReservation {
                student_id,
                booking_id,
                new_campus,
                new_room,
                new_date,
                new_slot,
            } => format!(
                "Identifier: {} | Booking Id: {} | New Campus: {} | New Room Number: {} | New Date: {} | New Timeslot: {}",
                student_id, booking_id, new_campus, new_room, new_date, new_slot
            ),
            Request::GetBookingCount { student_id, date } => {
                format!("Identifier: {} | Date: {}", student_id, date)
            }
            Request::Unrecognized => "None".to_string(),
        }
    }
}

/// Common response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub action: Action,
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Echo of the request parameters
    pub parameters: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<BookingId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Slot freed by a successful cancellation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released: Option<SlotRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<RegistryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Response {
    pub fn ok(action: Action, message: impl Into<String>, parameters: impl Into<String>) -> Self {
        Self {
            action,
            success: true,
            message: message.into(),
            timestamp: Utc::now(),
            parameters: parameters.into(),
            error: None,
            booking_id: None,
            count: None,
            released: None,
            entry: None,
            port: None,
        }
    }

    pub fn fail(
        action: Action,
        kind: ErrorKind,
        message: impl Into<String>,
        parameters: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            error: Some(kind),
            ..Self::ok(action, message, parameters)
        }
    }

    pub fn with_booking_id(mut self, booking_id: BookingId) -> Self {
        self.booking_id = Some(booking_id);
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_released(mut self, released: SlotRef) -> Self {
        self.released = Some(released);
        self
    }

    pub fn with_entry(mut self, entry: RegistryEntry) -> Self {
        self.entry = Some(entry);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
