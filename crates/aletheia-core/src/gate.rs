//! Resolution acceptance gate
//!
//! A rejection is an expected outcome, not an error: the market stays
//! pending and the external scheduler re-runs the whole pipeline on its
//! next cycle. No retries happen here.

use crate::models::{ConsensusResult, Verdict};

/// Default acceptance threshold: 80% confidence, the four-of-five
/// equivalent.
pub const DEFAULT_ACCEPTANCE_THRESHOLD: u8 = 80;

/// Accept iff the aggregated confidence meets the threshold.
pub fn decide(result: &ConsensusResult, threshold: u8) -> Verdict {
    if result.confidence >= threshold {
        Verdict::Accepted
    } else {
        Verdict::Rejected {
            confidence: result.confidence,
            threshold,
        }
    }
}
