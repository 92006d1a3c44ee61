//! Error types for terpscan-ingest
//!
//! `PipelineError` is what the orchestrator surfaces in its terminal
//! `Error` state. Per-source failures (model calls, chemical lookups) are
//! recovered inside their stage and only reach this type once every
//! fallback for that stage is exhausted.

use crate::types::ModelCallError;
use thiserror::Error;

/// Pipeline result type
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Terminal pipeline failure
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Transport-level failure reaching a model or data API
    #[error("Network error: {0}")]
    Network(String),

    /// Model call succeeded but its content was unusable
    #[error("Model error: {0}")]
    Model(String),

    /// Response could not be recovered into strain records
    #[error("Could not parse model response: {message}")]
    ParseFailure {
        /// What failed
        message: String,
        /// Raw model output, kept for diagnostics
        raw_response: String,
    },

    /// Extraction succeeded but found zero flower products
    #[error("No flower products found on the menu")]
    NoFlowersFound,

    /// IO error (reading a menu file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// terpscan-common error
    #[error("Common error: {0}")]
    Common(#[from] terpscan_common::Error),
}

impl PipelineError {
    /// Stable machine-readable error kind (snake_case)
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Network(_) => "network_error",
            PipelineError::Model(_) => "model_error",
            PipelineError::ParseFailure { .. } => "parse_failure",
            PipelineError::NoFlowersFound => "no_flowers_found",
            PipelineError::Io(_) => "io_error",
            PipelineError::Config(_) => "config_error",
            PipelineError::Common(_) => "common_error",
        }
    }

    /// Short actionable text for the person running the scan
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Network(_) => {
                "Could not reach the menu or model service. Check your connection and try again."
                    .to_string()
            }
            PipelineError::Model(_) => {
                "The model returned an unusable answer. Try again, or use a clearer menu image."
                    .to_string()
            }
            PipelineError::ParseFailure { .. } => {
                "The menu could not be read. Try a sharper photo or a smaller section of the menu."
                    .to_string()
            }
            PipelineError::NoFlowersFound => {
                "No flower products were found. Retake the photo and make sure the flower section of the menu is visible."
                    .to_string()
            }
            PipelineError::Io(e) => format!("Could not read the menu file: {}", e),
            PipelineError::Config(msg) => msg.clone(),
            PipelineError::Common(e) => e.to_string(),
        }
    }
}

impl From<ModelCallError> for PipelineError {
    fn from(err: ModelCallError) -> Self {
        match err {
            ModelCallError::Network(msg) => PipelineError::Network(msg),
            other => PipelineError::Model(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        PipelineError::Network(err.to_string())
    }
}
