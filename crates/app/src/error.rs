//! Startup errors. Any of these ends the process.

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] campus_core::Error),

    #[error(transparent)]
    Net(#[from] campus_net::Error),

    #[error("No campus configured; pass --campus or set [node] campus")]
    MissingCampus,

    #[error("Invalid address {0}")]
    Address(String),
}
