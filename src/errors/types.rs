//! Error type definitions for the loopcast scheduler
//!
//! This module defines the error taxonomy used throughout the application:
//! one enum per layer, composed under a top-level `AppError` so the CLI
//! can map any failure to a process exit code without losing structure.

use thiserror::Error;

use crate::verify::VerifyFinding;

/// Top-level application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Structural or semantic problem in the channel config.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The config contains zero items to schedule.
    #[error("no content to schedule")]
    NoContent,

    /// The CP solver returned neither OPTIMAL nor FEASIBLE within the time limit.
    #[error("solver could not find a schedule in phase {phase}: {message}")]
    Infeasible { phase: SolvePhase, message: String },

    /// The verifier produced one or more ERROR-level findings.
    #[error("verification failed with {error_count} error(s)")]
    VerifyFailure {
        findings: Vec<VerifyFinding>,
        error_count: usize,
    },

    /// Failure reading the config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which solver phase raised an `Infeasible` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolvePhase {
    /// Phase 1: minimal block count.
    MinimizeBlocks,
    /// Phase 2: waste/repeat/diversity optimization under a fixed block count.
    OptimizeQuality,
}

impl std::fmt::Display for SolvePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolvePhase::MinimizeBlocks => write!(f, "minimize-blocks"),
            SolvePhase::OptimizeQuality => write!(f, "optimize-quality"),
        }
    }
}

/// Configuration-layer errors: any structural or semantic problem in the inputs.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required key {key:?} in {where_}")]
    MissingKey { key: String, where_: String },

    #[error("{where_}: {message}")]
    Invalid { where_: String, message: String },

    #[error("duplicate item paths found in config (base items must be unique): {0:?}")]
    DuplicatePaths(Vec<String>),

    #[error("{where_} is in a sequential pool but does not contain an SxxExx pattern: {path}")]
    MissingSequenceId { where_: String, path: String },

    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn verify_failure(findings: Vec<VerifyFinding>) -> Self {
        let error_count = findings
            .iter()
            .filter(|f| f.level == crate::verify::Level::Error)
            .count();
        Self::VerifyFailure {
            findings,
            error_count,
        }
    }
}

impl ConfigError {
    pub fn invalid<W: Into<String>, M: Into<String>>(where_: W, message: M) -> Self {
        Self::Invalid {
            where_: where_.into(),
            message: message.into(),
        }
    }

    pub fn missing<K: Into<String>, W: Into<String>>(key: K, where_: W) -> Self {
        Self::MissingKey {
            key: key.into(),
            where_: where_.into(),
        }
    }
}
