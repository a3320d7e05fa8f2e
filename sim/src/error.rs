//! Setup-time errors.
//!
//! Nothing in the per-tick path returns these. Ticks degrade through
//! `Option`/`bool` sentinels instead; errors only surface while loading
//! configuration and content tables.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid content table: {0}")]
    InvalidContent(String),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
