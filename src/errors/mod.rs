//! Error taxonomy for the scheduling pipeline.

mod types;

pub use types::{AppError, ConfigError, SolvePhase};

pub type AppResult<T> = Result<T, AppError>;
