//! Terpene resolver
//!
//! Fills in the terpene vector for each extracted candidate using a
//! prioritized chain; each step runs only if the previous one missed:
//!
//! 1. Local reference set (exact, then edit-distance fuzzy)
//! 2. External chemical-profile source (first returned match)
//! 3. Text-model estimate, clamped to [0, 1]
//!
//! Resolution always yields a `Strain`. Source failures are logged and
//! treated as a miss; when every step misses the strain comes back with an
//! all-zero vector tagged `TerpeneSource::Unresolved`.
//!
//! # Batches
//! `resolve_all` runs fixed-size windows of concurrent resolutions, waiting
//! for a window to finish before starting the next one, so third-party rate
//! limits see at most `window` requests in flight.

use super::model_estimator::ModelEstimator;
use super::reference_set::{ReferenceSet, ReferenceStrain};
use crate::types::{
    ChemicalProfileSource, ChemicalRecord, ExtractionCandidate, Strain, TerpeneSource, TextModel,
};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default number of concurrent resolutions per window
pub const DEFAULT_CONCURRENCY_WINDOW: usize = 5;

/// Prioritized terpene resolution chain
pub struct TerpeneResolver {
    reference: Arc<ReferenceSet>,
    chemical: Option<Arc<dyn ChemicalProfileSource>>,
    estimator: Option<ModelEstimator>,
}

impl TerpeneResolver {
    /// Resolver backed by the local reference set only
    pub fn new(reference: Arc<ReferenceSet>) -> Self {
        Self {
            reference,
            chemical: None,
            estimator: None,
        }
    }

    /// Add the external chemical-profile step
    pub fn with_chemical_source(mut self, source: Arc<dyn ChemicalProfileSource>) -> Self {
        self.chemical = Some(source);
        self
    }

    /// Add the text-model estimate step
    pub fn with_estimator(mut self, text: Arc<dyn TextModel>) -> Self {
        self.estimator = Some(ModelEstimator::new(text));
        self
    }

    /// Resolve one candidate; never fails
    pub async fn resolve(&self, candidate: &ExtractionCandidate) -> Strain {
        let partial = Strain::from_candidate(candidate);

        if let Some(strain) = self.from_reference(&partial) {
            return strain;
        }
        if let Some(strain) = self.from_chemical_source(&partial).await {
            return strain;
        }
        if let Some(strain) = self.from_estimate(&partial).await {
            return strain;
        }

        warn!(strain = %partial.name, "No terpene data from any source");
        partial.with_terpenes(partial.terpenes, TerpeneSource::Unresolved)
    }

    /// Resolve a batch in windows of `window` concurrent resolutions
    ///
    /// `on_progress(completed, total)` is called once per completion, in
    /// completion order. The returned strains keep input order.
    pub async fn resolve_all<F>(
        &self,
        candidates: &[ExtractionCandidate],
        window: usize,
        mut on_progress: F,
    ) -> Vec<Strain>
    where
        F: FnMut(usize, usize),
    {
        let total = candidates.len();
        let window = window.max(1);
        let mut resolved: Vec<Option<Strain>> = vec![None; total];
        let mut completed = 0usize;

        info!(total, window, "Resolving terpene profiles");

        for (window_index, batch) in candidates.chunks(window).enumerate() {
            let offset = window_index * window;
            let mut in_flight: FuturesUnordered<_> = batch
                .iter()
                .enumerate()
                .map(|(i, candidate)| async move { (offset + i, self.resolve(candidate).await) })
                .collect();

            while let Some((index, strain)) = in_flight.next().await {
                resolved[index] = Some(strain);
                completed += 1;
                on_progress(completed, total);
            }
        }

        resolved.into_iter().flatten().collect()
    }

    fn from_reference(&self, partial: &Strain) -> Option<Strain> {
        let hit = self.reference.lookup(&partial.name)?;
        debug!(
            strain = %partial.name,
            matched = %hit.strain.name,
            distance = hit.distance,
            "Resolved from reference set"
        );
        Some(merge_reference(partial, hit.strain))
    }

    async fn from_chemical_source(&self, partial: &Strain) -> Option<Strain> {
        let source = self.chemical.as_ref()?;
        match source.lookup(&partial.name).await {
            Ok(Some(record)) => {
                debug!(
                    strain = %partial.name,
                    source = source.name(),
                    "Resolved from chemical database"
                );
                Some(merge_record(partial, record))
            }
            Ok(None) => None,
            Err(e) => {
                warn!(
                    strain = %partial.name,
                    source = source.name(),
                    error = %e,
                    "Chemical lookup failed"
                );
                None
            }
        }
    }

    async fn from_estimate(&self, partial: &Strain) -> Option<Strain> {
        let estimator = self.estimator.as_ref()?;
        match estimator.estimate(&partial.name, partial.strain_type).await {
            Ok(Some(profile)) => {
                debug!(strain = %partial.name, "Resolved from model estimate");
                Some(partial.with_terpenes(profile, TerpeneSource::ModelEstimate))
            }
            Ok(None) => None,
            Err(e) => {
                warn!(strain = %partial.name, error = %e, "Terpene estimate failed");
                None
            }
        }
    }
}

/// Menu fields win; reference data fills the gaps
fn merge_reference(partial: &Strain, reference: &ReferenceStrain) -> Strain {
    let mut strain = partial.with_terpenes(reference.terpenes, TerpeneSource::LocalReference);
    if !strain.strain_type.is_known() {
        strain.strain_type = reference.strain_type;
    }
    strain.thc = strain.thc.or(reference.thc);
    strain.cbd = strain.cbd.or(reference.cbd);
    strain.description = strain.description.or_else(|| reference.description.clone());
    strain.effects = reference.effects.clone();
    strain.flavors = reference.flavors.clone();
    strain
}

fn merge_record(partial: &Strain, record: ChemicalRecord) -> Strain {
    let mut strain = partial.with_terpenes(record.terpenes, TerpeneSource::ChemicalDatabase);
    if !strain.strain_type.is_known() {
        strain.strain_type = record.strain_type.unwrap_or_default();
    }
    strain.thc = strain.thc.or(record.thc);
    strain.cbd = strain.cbd.or(record.cbd);
    strain.description = strain.description.or(record.description);
    strain.effects = record.effects;
    strain.flavors = record.flavors;
    strain
}
