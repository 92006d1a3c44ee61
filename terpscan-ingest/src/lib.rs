//! terpscan-ingest library interface
//!
//! Menu ingestion (image or HTML → strains with terpene vectors) and
//! preference scoring. The `terpscan` binary is a thin CLI over this.

pub mod chunker;
pub mod config;
pub mod error;
pub mod extractors;
pub mod fusion;
pub mod llm;
pub mod resolvers;
pub mod scoring;
pub mod types;
pub mod workflow;

pub use crate::error::{PipelineError, PipelineResult};
pub use crate::types::{
    ExtractionCandidate, MatchRating, SimilarityResult, Strain, StrainType, TerpeneSource,
};
pub use crate::workflow::{MenuSource, PipelineOrchestrator, PipelineStatus, ResultMenu};
