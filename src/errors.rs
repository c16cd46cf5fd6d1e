// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Processor spec error in '{spec}': {reason}")]
    SpecError { spec: String, reason: String },

    #[error("Selection error for input '{slot}': {reason}")]
    SelectionError { slot: String, reason: String },

    #[error("Invalid status transition for task {task}: {from} -> {to}")]
    InvalidTransition {
        task: String,
        from: String,
        to: String,
    },

    #[error("Phase '{phase}' is already running (lock file {path})")]
    LockHeld { phase: String, path: String },

    #[error("Batch submission failed for task {task}: {reason}")]
    SubmissionFailed { task: String, reason: String },

    #[error("Batch scheduler error: {0}")]
    BatchError(String),

    #[error("Task store error: {0}")]
    StoreError(String),

    #[error("Artefact repository error: {0}")]
    RepositoryError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SchedError {
    pub fn spec(spec: impl Into<String>, reason: impl Into<String>) -> Self {
        SchedError::SpecError {
            spec: spec.into(),
            reason: reason.into(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SchedError>;
