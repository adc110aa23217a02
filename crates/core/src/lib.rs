//! Campus Core Library
//!
//! Domain models, the per-campus reservation store, and configuration for
//! the campus room reservation system.

pub mod config;
pub mod error;
pub mod invariants;
pub mod models;
pub mod store;

pub use config::{Config, NodeConfig, RegistryConfig};
pub use error::{Error, Result};
pub use models::*;
pub use store::{CreateOutcome, ReservationStore, WeeklyLedger};
