//! Error types for the consensus core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("insufficient data: {succeeded} of {dispatched} sources succeeded, {required} required")]
    InsufficientData {
        succeeded: usize,
        dispatched: usize,
        required: usize,
    },

    #[error("no observations were dispatched")]
    NoObservations,
}

pub type ConsensusResultOf<T> = Result<T, ConsensusError>;
