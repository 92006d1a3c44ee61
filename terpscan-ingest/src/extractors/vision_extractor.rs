//! Vision extractor
//!
//! Sends a menu image (or one band of it) to the vision model and turns the
//! free-text answer into `ExtractionCandidate`s via the recovery chain in
//! [`super::response_recovery`]. When no structural stage yields anything,
//! a text-model cleanup pass re-extracts names from the raw answer.
//!
//! Segments are independent: no state is shared between segment calls.

use super::response_recovery::{self, Recovered, RecoveryStrategy};
use crate::error::{PipelineError, PipelineResult};
use crate::types::{ExtractionCandidate, ImageSegment, TextModel, VisionModel};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Instruction sent with every menu image / menu text
pub const EXTRACTION_PROMPT: &str = r#"You are reading a cannabis dispensary menu.
List every cannabis product you can see. Respond with ONLY a JSON object, no prose, in exactly this shape:
{"strains": [{"name": "Blue Dream", "type": "hybrid", "thc": "18-24%", "cbd": null, "price": "$45/8th", "product_type": "flower"}]}
Rules:
- "type" is one of "indica", "sativa", "hybrid", or null when the menu does not say.
- "product_type" is one of "flower", "pre-roll", "vape", "concentrate", "edible", "other".
- Use null for anything not shown. Do not invent strains or values.
- Copy strain names exactly as printed, without brand prefixes or weights."#;

/// System instruction for the cleanup pass
const CLEANUP_PROMPT: &str = "The following text is a malformed answer from another model that was asked to list \
cannabis strains on a dispensary menu. Extract only the strain names it mentions. \
Respond with ONLY a JSON object: {\"strains\": [{\"name\": \"...\"}]}. \
Respond with {\"strains\": []} if there are none.";

/// Prompt configuration for an extraction call
#[derive(Debug, Clone)]
pub struct PromptConfig {
    /// Instruction sent alongside the image or menu text
    pub instruction: String,
    /// Temperature for text-model extraction and cleanup
    pub temperature: f32,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            instruction: EXTRACTION_PROMPT.to_string(),
            temperature: 0.0,
        }
    }
}

/// Extraction outcome for one segment or one menu text
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub candidates: Vec<ExtractionCandidate>,
    pub strategy: RecoveryStrategy,
}

impl From<Recovered> for Extraction {
    fn from(recovered: Recovered) -> Self {
        Self {
            candidates: recovered.candidates,
            strategy: recovered.strategy,
        }
    }
}

/// Model-backed menu extractor
pub struct VisionExtractor {
    vision: Arc<dyn VisionModel>,
    text: Arc<dyn TextModel>,
}

impl VisionExtractor {
    pub fn new(vision: Arc<dyn VisionModel>, text: Arc<dyn TextModel>) -> Self {
        Self { vision, text }
    }

    /// Extract candidates from one image segment
    ///
    /// # Errors
    /// - `Network` / `Model` when the vision call itself fails
    /// - `ParseFailure` (with the raw answer) when every recovery stage fails
    pub async fn extract(
        &self,
        segment: &ImageSegment,
        prompt: &PromptConfig,
    ) -> PipelineResult<Extraction> {
        debug!(
            offset_y = segment.offset_y,
            height = segment.height,
            bytes = segment.bytes.len(),
            "Sending segment to vision model"
        );

        let raw = self.vision.describe_image(segment, &prompt.instruction).await?;
        self.recover(&raw, prompt).await
    }

    /// Extract candidates from plain menu text (HTML path)
    pub async fn extract_text(
        &self,
        menu_text: &str,
        prompt: &PromptConfig,
    ) -> PipelineResult<Extraction> {
        debug!(chars = menu_text.len(), "Sending menu text to text model");

        let raw = self
            .text
            .complete(&prompt.instruction, menu_text, prompt.temperature)
            .await?;
        self.recover(&raw, prompt).await
    }

    /// Extract every segment independently, one list per segment
    ///
    /// Failed segments are logged and skipped. Only when every segment fails
    /// is the first error returned.
    pub async fn extract_segments(
        &self,
        segments: &[ImageSegment],
        prompt: &PromptConfig,
    ) -> PipelineResult<Vec<Vec<ExtractionCandidate>>> {
        let mut lists = Vec::with_capacity(segments.len());
        let mut first_error = None;

        for (index, segment) in segments.iter().enumerate() {
            match self.extract(segment, prompt).await {
                Ok(extraction) => {
                    debug!(
                        segment = index,
                        count = extraction.candidates.len(),
                        strategy = ?extraction.strategy,
                        "Segment extracted"
                    );
                    lists.push(extraction.candidates);
                }
                Err(e) => {
                    warn!(segment = index, error = %e, "Segment extraction failed, continuing");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if lists.is_empty() => Err(e),
            _ => Ok(lists),
        }
    }

    /// Run the recovery chain over a raw model answer
    async fn recover(&self, raw: &str, prompt: &PromptConfig) -> PipelineResult<Extraction> {
        if let Some(recovered) = response_recovery::recover_structured(raw) {
            if recovered.strategy != RecoveryStrategy::FullJson {
                info!(strategy = ?recovered.strategy, "Recovered partial model response");
            }
            return Ok(recovered.into());
        }

        warn!(chars = raw.len(), "No structured data in model response, trying cleanup pass");

        if !raw.trim().is_empty() {
            match self.text.complete(CLEANUP_PROMPT, raw, prompt.temperature).await {
                Ok(cleaned) => {
                    let candidates = response_recovery::parse_cleanup_response(&cleaned);
                    if !candidates.is_empty() {
                        info!(count = candidates.len(), "Cleanup pass recovered strain names");
                        return Ok(Extraction {
                            candidates,
                            strategy: RecoveryStrategy::ModelCleanup,
                        });
                    }
                }
                Err(e) => warn!(error = %e, "Cleanup pass failed"),
            }
        }

        Err(PipelineError::ParseFailure {
            message: "no strain records could be recovered from the model response".to_string(),
            raw_response: raw.to_string(),
        })
    }
}
