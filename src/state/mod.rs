//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CandidateCode`: the deterministic key probed against the registry
//! - `CrawlOutcome`: what happened to one validate or fetch attempt

mod candidate;
mod outcome;

// Re-export main types
pub use candidate::{CandidateCode, DEFAULT_CODE_PREFIX};
pub use outcome::{CrawlOutcome, OutcomeKind, Phase};
