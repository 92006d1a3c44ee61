//! Menu extraction
//!
//! Image or HTML menu in, `ExtractionCandidate` lists out.

pub mod html_menu;
pub mod response_recovery;
pub mod vision_extractor;

pub use response_recovery::RecoveryStrategy;
pub use vision_extractor::{Extraction, PromptConfig, VisionExtractor, EXTRACTION_PROMPT};
