//! Terpene resolution
//!
//! - `reference_set`: bundled / file-backed curated strains
//! - `cannlytics_client`: external chemical-profile API
//! - `model_estimator`: text-model estimates
//! - `terpene_resolver`: the prioritized chain over all three

pub mod cannlytics_client;
pub mod model_estimator;
pub mod reference_set;
pub mod terpene_resolver;

pub use cannlytics_client::CannlyticsClient;
pub use reference_set::{ReferenceSet, ReferenceStrain};
pub use terpene_resolver::{TerpeneResolver, DEFAULT_CONCURRENCY_WINDOW};
