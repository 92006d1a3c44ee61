//! Menu ingestion workflow
//!
//! Sequences fetch → extract → dedupe → resolve → score into one cold,
//! cancellable stream of [`PipelineStatus`] events.
//!
//! # States
//! `Fetching → FetchComplete → ProductsFound → ResolvingTerpenes… → Complete`,
//! with `Error` reachable from any point. `Complete` and `Error` are
//! terminal. A cancelled run simply ends without a terminal event.

pub mod fetch;
pub mod pipeline;

use crate::error::PipelineError;
use crate::types::{SimilarityResult, Strain};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use fetch::{FetchedMenu, MenuSource};
pub use pipeline::{PipelineConfig, PipelineOrchestrator};

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMenu {
    pub run_id: Uuid,
    /// Human-readable description of the menu source
    pub source: String,
    pub generated_at: DateTime<Utc>,
    /// Resolved flower strains, menu order
    pub strains: Vec<Strain>,
    /// Present when an ideal profile was supplied; best match first
    pub ranked: Option<Vec<SimilarityResult>>,
}

/// Pipeline progress events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineStatus {
    /// Menu download / file read started
    Fetching {
        run_id: Uuid,
        source: String,
    },

    /// Menu payload available
    FetchComplete {
        /// Payload size in bytes
        size: usize,
    },

    /// Extraction and deduplication finished
    ProductsFound {
        /// Deduplicated products
        total: usize,
        /// Flower subset (the only products resolved)
        flower_count: usize,
    },

    /// One more strain resolved
    ResolvingTerpenes {
        current: usize,
        total: usize,
    },

    /// Terminal: run succeeded
    Complete {
        menu: ResultMenu,
    },

    /// Terminal: run failed
    Error {
        /// See [`PipelineError::kind`]
        kind: String,
        message: String,
        user_message: String,
    },
}

impl PipelineStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStatus::Complete { .. } | PipelineStatus::Error { .. })
    }
}

impl From<&PipelineError> for PipelineStatus {
    fn from(err: &PipelineError) -> Self {
        PipelineStatus::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
            user_message: err.user_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_with_type_tag() {
        let json = serde_json::to_value(PipelineStatus::ProductsFound {
            total: 12,
            flower_count: 9,
        })
        .unwrap();
        assert_eq!(json["type"], "ProductsFound");
        assert_eq!(json["flower_count"], 9);
    }

    #[test]
    fn test_error_status_from_pipeline_error() {
        let status = PipelineStatus::from(&PipelineError::NoFlowersFound);
        assert!(status.is_terminal());
        match status {
            PipelineStatus::Error { kind, user_message, .. } => {
                assert_eq!(kind, "no_flowers_found");
                assert!(user_message.contains("Retake the photo"));
            }
            other => panic!("expected Error, got {:?}", other),
        }
    }

    #[test]
    fn test_progress_is_not_terminal() {
        assert!(!PipelineStatus::ResolvingTerpenes { current: 1, total: 3 }.is_terminal());
        assert!(!PipelineStatus::FetchComplete { size: 10 }.is_terminal());
    }
}
