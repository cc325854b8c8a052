//! Deciding when a year's sequence is exhausted
//!
//! The registry gives no "last code of the year" signal, so the crawl stops
//! on validation misses. The rule is pluggable because registries can have
//! gaps in their numbering.

use crate::state::CandidateCode;

/// Decides whether a validation miss ends the current year
pub trait TerminationPolicy: Send {
    /// Called before the first candidate of a year
    fn reset(&mut self);

    /// Called when a candidate validated successfully
    fn record_hit(&mut self, code: &CandidateCode);

    /// Called on a validation miss; returns true to stop the year
    fn record_miss(&mut self, code: &CandidateCode) -> bool;
}

/// Stops after a run of consecutive misses
///
/// With a limit of one this is the classic rule: the first code that does
/// not validate ends the year.
#[derive(Debug, Clone)]
pub struct ConsecutiveMisses {
    limit: u32,
    misses: u32,
}

impl ConsecutiveMisses {
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            misses: 0,
        }
    }

    /// Stop on the first miss
    pub fn first_miss() -> Self {
        Self::new(1)
    }

    pub fn misses(&self) -> u32 {
        self.misses
    }
}

impl Default for ConsecutiveMisses {
    fn default() -> Self {
        Self::first_miss()
    }
}

impl TerminationPolicy for ConsecutiveMisses {
    fn reset(&mut self) {
        self.misses = 0;
    }

    fn record_hit(&mut self, _code: &CandidateCode) {
        self.misses = 0;
    }

    fn record_miss(&mut self, code: &CandidateCode) -> bool {
        self.misses += 1;
        if self.misses >= self.limit {
            tracing::debug!(
                "{} consecutive miss(es) ending at {}, year exhausted",
                self.misses,
                code
            );
            true
        } else {
            false
        }
    }
}
