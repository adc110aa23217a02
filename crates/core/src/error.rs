//! Error types for the campus core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Timeslot ({0}) has already been booked")]
    AlreadyBooked(String),

    #[error("Booking ({0}) is reserved to another student")]
    OwnerMismatch(String),

    #[error("Maximum booking limit of {limit} per week is reached")]
    QuotaExceeded { limit: u32 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
