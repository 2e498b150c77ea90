//! Consensus aggregation
//!
//! Turns the observations from one fan-out into a single
//! [`ConsensusResult`]. Two modes: numeric (median + spread over scalar
//! observations, used for price questions) and agreement (majority vote
//! over boolean claims, used for everything else).
//!
//! Both modes enforce the minimum-observations rule: fewer than
//! `min_successful` usable observations yields
//! [`ConsensusError::InsufficientData`], never a fabricated outcome.

use crate::error::ConsensusError;
use crate::models::{ConsensusResult, ObservedValue, Observation};

/// How many sources a resolution fans out to.
pub const TARGET_SOURCES: usize = 5;

/// Minimum successful observations out of the dispatched set before any
/// consensus is produced.
pub const MIN_SUCCESSFUL_SOURCES: usize = 3;

/// Median of a sample. Callers guarantee `values` is non-empty.
pub fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Percentage spread `(max - min) / median * 100`.
///
/// 0.0 with fewer than two values, and 0.0 when the median is not a
/// usable divisor (zero, negative, or non-finite).
pub fn spread_pct(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let max = values.iter().cloned().fold(f64::MIN, f64::max);
    let min = values.iter().cloned().fold(f64::MAX, f64::min);
    let mid = median(values);
    if mid > 0.0 && mid.is_finite() {
        (max - min) / mid * 100.0
    } else {
        0.0
    }
}

/// Step function from spread to confidence: tight agreement between
/// sources maps to high confidence.
pub fn confidence_from_spread(spread: f64) -> u8 {
    if spread < 1.0 {
        95
    } else if spread < 2.0 {
        85
    } else if spread < 5.0 {
        75
    } else {
        50
    }
}

/// Numeric consensus: median of the successful numeric observations
/// compared against `threshold`.
///
/// `dispatched` is the size of the fan-out including failed sources.
pub fn aggregate_numeric(
    observations: &[Observation],
    dispatched: usize,
    threshold: f64,
    min_successful: usize,
) -> Result<ConsensusResult, ConsensusError> {
    if dispatched == 0 {
        return Err(ConsensusError::NoObservations);
    }

    let succeeded: Vec<(&str, f64)> = observations
        .iter()
        .filter_map(|o| match (&o.value, o.succeeded()) {
            (Some(ObservedValue::Numeric(v)), true) => Some((o.source.as_str(), *v)),
            _ => None,
        })
        .collect();

    if succeeded.len() < min_successful {
        return Err(ConsensusError::InsufficientData {
            succeeded: succeeded.len(),
            dispatched,
            required: min_successful,
        });
    }

    let values: Vec<f64> = succeeded.iter().map(|(_, v)| *v).collect();
    let mid = median(&values);
    let spread = spread_pct(&values);
    let confidence = confidence_from_spread(spread);

    Ok(ConsensusResult {
        outcome: mid > threshold,
        confidence,
        sources: succeeded.iter().map(|(name, _)| name.to_string()).collect(),
        evidence: succeeded
            .iter()
            .map(|(name, v)| format!("{}: {:.2}", name, v))
            .collect(),
        median: Some(mid),
        spread_pct: Some(spread),
    })
}

/// Agreement consensus: majority boolean among the successful claims.
///
/// Confidence is `agreeing / dispatched * 100` - a failed source always
/// counts against confidence, never out of the denominator. A tie yields
/// `false` (no majority for true).
pub fn aggregate_agreement(
    observations: &[Observation],
    dispatched: usize,
    min_successful: usize,
) -> Result<ConsensusResult, ConsensusError> {
    if dispatched == 0 {
        return Err(ConsensusError::NoObservations);
    }

    let claims: Vec<(&str, bool)> = observations
        .iter()
        .filter_map(|o| match (&o.value, o.succeeded()) {
            (Some(ObservedValue::Claim(b)), true) => Some((o.source.as_str(), *b)),
            _ => None,
        })
        .collect();

    if claims.len() < min_successful {
        return Err(ConsensusError::InsufficientData {
            succeeded: claims.len(),
            dispatched,
            required: min_successful,
        });
    }

    let yes = claims.iter().filter(|(_, b)| *b).count();
    let no = claims.len() - yes;
    let outcome = yes > no;
    let agreeing = if outcome { yes } else { no };
    let confidence = (agreeing as f64 / dispatched as f64 * 100.0).round() as u8;

    Ok(ConsensusResult {
        outcome,
        confidence,
        sources: claims.iter().map(|(name, _)| name.to_string()).collect(),
        evidence: claims
            .iter()
            .map(|(name, b)| format!("{}: {}", name, if *b { "yes" } else { "no" }))
            .collect(),
        median: None,
        spread_pct: None,
    })
}
