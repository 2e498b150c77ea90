//! # Aletheia Core
//!
//! Data models and decision logic for the Aletheia multi-source consensus
//! resolution engine.
//!
//! This crate turns N independent observations of the world into one
//! accepted or rejected market verdict: question categorization, median +
//! spread consensus for numeric questions, agreement-count consensus for
//! everything else, and the confidence gate that decides whether a
//! resolution is accepted. All I/O lives in the crates that consume this
//! one; everything here is pure and deterministic.

pub mod categorize;
pub mod consensus;
pub mod error;
pub mod gate;
pub mod models;

pub use categorize::*;
pub use consensus::*;
pub use error::*;
pub use gate::*;
pub use models::*;
