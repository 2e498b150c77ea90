//! Error types for the resolution oracle
//!
//! Individual source failures are not errors: they are recorded on the
//! failed [`aletheia_core::Observation`] and flow into the confidence
//! math. The variants here are collaborator and configuration failures -
//! the things that abandon a market (or the whole cycle), not a single
//! fetch.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("market source error: {0}")]
    MarketSource(String),

    #[error("resolution sink error: {0}")]
    ResolutionSink(String),

    #[error("extraction error: {0}")]
    Extraction(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OracleError>;
