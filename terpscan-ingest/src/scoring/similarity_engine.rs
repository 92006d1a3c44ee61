//! Similarity engine
//!
//! Scores a strain's terpene vector against the ideal vector.
//!
//! # Components
//! - **Cosine** on z-scored vectors, mapped [-1, 1] → [0, 1]
//! - **Euclidean** on z-scored vectors, `1 / (1 + distance)`
//! - **Pearson** on raw vectors, mapped [-1, 1] → [0, 1]
//!
//! Overall = 0.50 × cosine + 0.25 × euclidean + 0.25 × pearson, clamped to
//! [0, 1]. Z-scoring keeps a dominant terpene from swamping the comparison
//! so the relative shape of the profile drives cosine and euclidean.

use super::ScoringError;
use crate::types::{MatchRating, SimilarityResult, Strain, TerpeneDifference};
use terpscan_common::{Terpene, TerpeneProfile, TERPENE_COUNT};
use tracing::debug;

/// Component weights
pub const COSINE_WEIGHT: f64 = 0.50;
pub const EUCLIDEAN_WEIGHT: f64 = 0.25;
pub const PEARSON_WEIGHT: f64 = 0.25;

/// Magnitudes and deviations at or below this count as zero
const EPSILON: f64 = 1e-12;

type Vector = [f64; TERPENE_COUNT];

/// The three component scores and their blend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentScores {
    pub cosine: f64,
    pub euclidean: f64,
    pub pearson: f64,
    pub overall: f64,
}

fn mean(v: &Vector) -> f64 {
    v.iter().sum::<f64>() / v.len() as f64
}

/// Population standard deviation
fn std_dev(v: &Vector) -> f64 {
    let m = mean(v);
    (v.iter().map(|x| (x - m).powi(2)).sum::<f64>() / v.len() as f64).sqrt()
}

/// Subtract the mean, divide by the population standard deviation
///
/// A constant vector maps to all zeros.
pub fn z_score(v: &Vector) -> Vector {
    let m = mean(v);
    let sd = std_dev(v);
    if sd <= EPSILON {
        return [0.0; TERPENE_COUNT];
    }
    let mut out = [0.0f64; TERPENE_COUNT];
    for (o, x) in out.iter_mut().zip(v) {
        *o = (x - m) / sd;
    }
    out
}

fn dot(a: &Vector, b: &Vector) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(v: &Vector) -> f64 {
    dot(v, v).sqrt()
}

/// Cosine mapped to [0, 1]; 0 when either vector has no magnitude
pub fn cosine_similarity(a: &Vector, b: &Vector) -> f64 {
    let (na, nb) = (norm(a), norm(b));
    if na <= EPSILON || nb <= EPSILON {
        return 0.0;
    }
    let cosine = (dot(a, b) / (na * nb)).clamp(-1.0, 1.0);
    (cosine + 1.0) / 2.0
}

/// `1 / (1 + ‖a − b‖)`
pub fn euclidean_similarity(a: &Vector, b: &Vector) -> f64 {
    let distance = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt();
    1.0 / (1.0 + distance)
}

/// Pearson correlation mapped to [0, 1]; 0 when either vector is constant
pub fn pearson_similarity(a: &Vector, b: &Vector) -> f64 {
    let (ma, mb) = (mean(a), mean(b));
    let mut covariance = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let (dx, dy) = (x - ma, y - mb);
        covariance += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a <= EPSILON || var_b <= EPSILON {
        return 0.0;
    }
    let r = (covariance / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0);
    (r + 1.0) / 2.0
}

/// All three components and the weighted blend
pub fn score_vectors(candidate: &TerpeneProfile, ideal: &TerpeneProfile) -> ComponentScores {
    let (raw_c, raw_i) = (candidate.values(), ideal.values());
    let (zc, zi) = (z_score(raw_c), z_score(raw_i));

    let cosine = cosine_similarity(&zc, &zi);
    let euclidean = euclidean_similarity(&zc, &zi);
    let pearson = pearson_similarity(raw_c, raw_i);
    let overall = (COSINE_WEIGHT * cosine + EUCLIDEAN_WEIGHT * euclidean + PEARSON_WEIGHT * pearson)
        .clamp(0.0, 1.0);

    ComponentScores {
        cosine,
        euclidean,
        pearson,
        overall,
    }
}

/// Per-terpene differences, largest absolute gap first
pub fn terpene_differences(
    candidate: &TerpeneProfile,
    ideal: &TerpeneProfile,
) -> Vec<TerpeneDifference> {
    let mut differences: Vec<TerpeneDifference> = Terpene::ALL
        .iter()
        .map(|&terpene| {
            let (c, i) = (candidate.get(terpene), ideal.get(terpene));
            TerpeneDifference {
                terpene,
                candidate: c,
                ideal: i,
                difference: c - i,
            }
        })
        .collect();
    differences.sort_by(|a, b| {
        b.difference
            .abs()
            .partial_cmp(&a.difference.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    differences
}

/// Score one strain against the ideal vector
pub fn score(candidate: &Strain, ideal: &TerpeneProfile) -> SimilarityResult {
    let scores = score_vectors(&candidate.terpenes, ideal);
    SimilarityResult {
        strain: candidate.clone(),
        overall: scores.overall,
        cosine: scores.cosine,
        euclidean: scores.euclidean,
        pearson: scores.pearson,
        match_rating: MatchRating::from_score(scores.overall),
        differences: terpene_differences(&candidate.terpenes, ideal),
    }
}

/// Score and sort strains, best match first (ties keep input order)
///
/// # Errors
/// `ScoringError::NoProfile` when the ideal vector is all zero.
pub fn rank(
    strains: &[Strain],
    ideal: &TerpeneProfile,
) -> Result<Vec<SimilarityResult>, ScoringError> {
    if ideal.is_zero() {
        return Err(ScoringError::NoProfile);
    }

    let mut results: Vec<SimilarityResult> = strains.iter().map(|s| score(s, ideal)).collect();
    results.sort_by(|a, b| {
        b.overall
            .partial_cmp(&a.overall)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    if let Some(best) = results.first() {
        debug!(
            strains = results.len(),
            best = %best.strain.name,
            score = best.overall,
            "Ranked strains"
        );
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExtractionCandidate, TerpeneSource};

    const EPS: f64 = 1e-9;

    fn profile(values: Vector) -> TerpeneProfile {
        TerpeneProfile::from_values(values)
    }

    fn strain(name: &str, values: Vector) -> Strain {
        Strain::from_candidate(&ExtractionCandidate::named(name))
            .with_terpenes(profile(values), TerpeneSource::LocalReference)
    }

    const BLUE_DREAM: Vector = [0.55, 0.60, 0.45, 0.70, 0.30, 0.25, 0.20, 0.05, 0.02, 0.02, 0.01];
    const OG_KUSH: Vector = [0.75, 0.45, 0.60, 0.35, 0.30, 0.25, 0.15, 0.03, 0.02, 0.02, 0.01];
    const JACK_HERER: Vector = [0.35, 0.65, 0.45, 0.85, 0.25, 0.20, 0.30, 0.07, 0.02, 0.01, 0.03];

    #[test]
    fn test_z_score_mean_and_std() {
        let z = z_score(&BLUE_DREAM);
        assert!(mean(&z).abs() < EPS);
        assert!((std_dev(&z) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_z_score_constant_vector_is_zero() {
        assert_eq!(z_score(&[0.3; TERPENE_COUNT]), [0.0; TERPENE_COUNT]);
        assert_eq!(z_score(&[0.0; TERPENE_COUNT]), [0.0; TERPENE_COUNT]);
    }

    #[test]
    fn test_self_similarity() {
        let scores = score_vectors(&profile(BLUE_DREAM), &profile(BLUE_DREAM));
        assert!((scores.cosine - 1.0).abs() < EPS);
        assert!((scores.euclidean - 1.0).abs() < EPS);
        assert!((scores.pearson - 1.0).abs() < EPS);
        assert!(scores.overall > 0.95);
    }

    #[test]
    fn test_components_in_unit_interval() {
        let vectors = [
            BLUE_DREAM,
            OG_KUSH,
            JACK_HERER,
            [0.0; TERPENE_COUNT],
            [0.5; TERPENE_COUNT],
            [1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0],
            [0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0],
        ];
        for a in &vectors {
            for b in &vectors {
                let s = score_vectors(&profile(*a), &profile(*b));
                for value in [s.cosine, s.euclidean, s.pearson, s.overall] {
                    assert!((0.0..=1.0).contains(&value), "{:?} vs {:?}: {:?}", a, b, s);
                }
            }
        }
    }

    #[test]
    fn test_opposite_patterns_score_low() {
        let a = [1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        let b = [0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        let s = score_vectors(&profile(a), &profile(b));
        assert!(s.cosine < EPS);
        assert!(s.pearson < EPS);
        assert!(s.overall < 0.3);
    }

    #[test]
    fn test_zero_variance_guards() {
        let s = score_vectors(&profile([0.4; TERPENE_COUNT]), &profile(BLUE_DREAM));
        assert_eq!(s.cosine, 0.0);
        assert_eq!(s.pearson, 0.0);
    }

    #[test]
    fn test_ranking_orders_by_overall() {
        let ideal = profile(BLUE_DREAM);
        let strains = vec![
            strain("OG Kush", OG_KUSH),
            strain("Blue Dream", BLUE_DREAM),
            strain("Jack Herer", JACK_HERER),
        ];
        let ranked = rank(&strains, &ideal).unwrap();
        assert_eq!(ranked[0].strain.name, "Blue Dream");
        assert_eq!(ranked[0].match_rating, MatchRating::Perfect);
        assert!(ranked.windows(2).all(|w| w[0].overall >= w[1].overall));
    }

    #[test]
    fn test_rank_without_profile() {
        let strains = vec![strain("OG Kush", OG_KUSH)];
        assert_eq!(
            rank(&strains, &TerpeneProfile::zeros()).unwrap_err(),
            ScoringError::NoProfile
        );
    }

    #[test]
    fn test_differences_sorted_by_magnitude() {
        let differences = terpene_differences(&profile(OG_KUSH), &profile(BLUE_DREAM));
        assert_eq!(differences.len(), TERPENE_COUNT);
        assert_eq!(differences[0].terpene, Terpene::Pinene);
        assert!((differences[0].difference + 0.35).abs() < EPS);
        assert!(differences
            .windows(2)
            .all(|w| w[0].difference.abs() >= w[1].difference.abs()));
    }
}
