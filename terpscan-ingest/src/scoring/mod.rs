//! Preference scoring
//!
//! `profile_aggregator` turns liked strains into an ideal vector;
//! `similarity_engine` ranks strains against it.

pub mod profile_aggregator;
pub mod similarity_engine;

use thiserror::Error;

pub use profile_aggregator::{build_ideal_profile, UserProfile};
pub use similarity_engine::{rank, score};

/// Scoring failure
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ScoringError {
    /// Ideal vector is all zero (no liked strains, or none with terpene data)
    #[error("No preference profile: like at least one strain with terpene data")]
    NoProfile,
}
