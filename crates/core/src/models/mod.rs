//! Data models for campus reservations

mod booking;
mod campus;
mod timeslot;
mod user;

pub use booking::*;
pub use campus::*;
pub use timeslot::*;
pub use user::*;
