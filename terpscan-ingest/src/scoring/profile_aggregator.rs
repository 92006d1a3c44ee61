//! Profile aggregator
//!
//! Builds the user's ideal terpene vector from the strains they liked by
//! max-pooling each dimension independently. A terpene that peaks in only
//! one liked strain keeps its peak in the ideal vector.

use crate::types::Strain;
use serde::Serialize;
use terpscan_common::{TerpeneProfile, TERPENE_COUNT};
use tracing::debug;

/// Element-wise maximum over the liked strains' vectors
///
/// An empty liked set gives the all-zero vector; scoring treats that as
/// "no profile".
pub fn build_ideal_profile(liked: &[Strain]) -> TerpeneProfile {
    max_pool(liked.iter().map(|s| &s.terpenes))
}

/// Element-wise maximum over arbitrary vectors
pub fn max_pool<'a, I>(profiles: I) -> TerpeneProfile
where
    I: IntoIterator<Item = &'a TerpeneProfile>,
{
    let mut ideal = [0.0f64; TERPENE_COUNT];
    for profile in profiles {
        for (slot, value) in ideal.iter_mut().zip(profile.values()) {
            *slot = slot.max(*value);
        }
    }
    TerpeneProfile::from_values(ideal)
}

/// Liked strain names plus the ideal vector derived from them
///
/// The ideal vector has no life of its own: every change to the liked set
/// recomputes it from scratch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserProfile {
    liked: Vec<Strain>,
    ideal: TerpeneProfile,
}

impl UserProfile {
    pub fn from_liked(liked: Vec<Strain>) -> Self {
        let ideal = build_ideal_profile(&liked);
        debug!(liked = liked.len(), "Built ideal terpene profile");
        Self { liked, ideal }
    }

    /// Replace the liked set
    pub fn set_liked(&mut self, liked: Vec<Strain>) {
        *self = Self::from_liked(liked);
    }

    /// Add one liked strain
    pub fn like(&mut self, strain: Strain) {
        let mut liked = std::mem::take(&mut self.liked);
        liked.push(strain);
        self.set_liked(liked);
    }

    /// Remove liked strains by name (case-insensitive)
    pub fn unlike(&mut self, name: &str) {
        let liked = std::mem::take(&mut self.liked)
            .into_iter()
            .filter(|s| !s.name.eq_ignore_ascii_case(name))
            .collect();
        self.set_liked(liked);
    }

    pub fn liked(&self) -> &[Strain] {
        &self.liked
    }

    pub fn liked_names(&self) -> Vec<&str> {
        self.liked.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn ideal(&self) -> &TerpeneProfile {
        &self.ideal
    }

    /// False when there is nothing to compare against
    pub fn has_profile(&self) -> bool {
        !self.ideal.is_zero()
    }
}
