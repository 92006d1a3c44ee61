//! Fixed terpene schema
//!
//! Every strain vector in terpscan has the same 11 dimensions in the same
//! order, so z-scoring, cosine and correlation are comparable across strains
//! regardless of which source produced them.
//!
//! Values are non-negative concentrations, typically in [0, 1].

use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Number of dimensions in a terpene vector
pub const TERPENE_COUNT: usize = 11;

/// The tracked terpenes, in vector order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terpene {
    Myrcene,
    Limonene,
    Caryophyllene,
    Pinene,
    Linalool,
    Humulene,
    Terpinolene,
    Ocimene,
    Nerolidol,
    Bisabolol,
    Eucalyptol,
}

impl Terpene {
    /// All terpenes in vector order
    pub const ALL: [Terpene; TERPENE_COUNT] = [
        Terpene::Myrcene,
        Terpene::Limonene,
        Terpene::Caryophyllene,
        Terpene::Pinene,
        Terpene::Linalool,
        Terpene::Humulene,
        Terpene::Terpinolene,
        Terpene::Ocimene,
        Terpene::Nerolidol,
        Terpene::Bisabolol,
        Terpene::Eucalyptol,
    ];

    /// Position of this terpene in a vector
    pub fn index(self) -> usize {
        self as usize
    }

    /// Canonical lowercase key (as used in JSON)
    pub fn key(self) -> &'static str {
        match self {
            Terpene::Myrcene => "myrcene",
            Terpene::Limonene => "limonene",
            Terpene::Caryophyllene => "caryophyllene",
            Terpene::Pinene => "pinene",
            Terpene::Linalool => "linalool",
            Terpene::Humulene => "humulene",
            Terpene::Terpinolene => "terpinolene",
            Terpene::Ocimene => "ocimene",
            Terpene::Nerolidol => "nerolidol",
            Terpene::Bisabolol => "bisabolol",
            Terpene::Eucalyptol => "eucalyptol",
        }
    }

    /// Resolve a canonical key or a lab-report alias
    ///
    /// Accepts e.g. `beta_myrcene`, `d-limonene`, `Alpha Pinene`, `beta_pinene`.
    pub fn from_alias(name: &str) -> Option<Terpene> {
        let normalized: String = name
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();

        let base = normalized
            .strip_prefix("alpha_")
            .or_else(|| normalized.strip_prefix("beta_"))
            .or_else(|| normalized.strip_prefix("trans_"))
            .or_else(|| normalized.strip_prefix("d_"))
            .or_else(|| normalized.strip_prefix("a_"))
            .or_else(|| normalized.strip_prefix("b_"))
            .unwrap_or(&normalized);

        Terpene::ALL.iter().copied().find(|t| t.key() == base)
    }

    /// Static descriptive notes for display
    pub fn notes(self) -> &'static TerpeneNotes {
        &TERPENE_NOTES[self.index()]
    }
}

impl fmt::Display for Terpene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.notes().display_name)
    }
}

/// Display information for a terpene
#[derive(Debug)]
pub struct TerpeneNotes {
    pub display_name: &'static str,
    pub aroma: &'static str,
    pub effects: &'static [&'static str],
}

static TERPENE_NOTES: [TerpeneNotes; TERPENE_COUNT] = [
    TerpeneNotes {
        display_name: "Myrcene",
        aroma: "Earthy, musky, clove-like",
        effects: &["relaxation", "sedation", "muscle relaxation", "pain relief"],
    },
    TerpeneNotes {
        display_name: "Limonene",
        aroma: "Citrus, lemon, orange",
        effects: &["mood elevation", "stress relief", "anxiety reduction"],
    },
    TerpeneNotes {
        display_name: "Caryophyllene",
        aroma: "Spicy, peppery, woody",
        effects: &["anti-inflammatory", "pain relief", "stress relief"],
    },
    TerpeneNotes {
        display_name: "Pinene",
        aroma: "Pine, fresh, woody",
        effects: &["alertness", "memory retention", "bronchodilator"],
    },
    TerpeneNotes {
        display_name: "Linalool",
        aroma: "Floral, lavender, sweet",
        effects: &["calming", "sedation", "anxiety relief"],
    },
    TerpeneNotes {
        display_name: "Humulene",
        aroma: "Earthy, woody, hoppy",
        effects: &["appetite suppression", "anti-inflammatory"],
    },
    TerpeneNotes {
        display_name: "Terpinolene",
        aroma: "Floral, herbal, citrus",
        effects: &["uplifting", "energizing", "creativity"],
    },
    TerpeneNotes {
        display_name: "Ocimene",
        aroma: "Sweet, herbal, woody",
        effects: &["uplifting", "energizing", "decongestant"],
    },
    TerpeneNotes {
        display_name: "Nerolidol",
        aroma: "Woody, floral, citrus peel",
        effects: &["sedation", "relaxation"],
    },
    TerpeneNotes {
        display_name: "Bisabolol",
        aroma: "Floral, honey, chamomile",
        effects: &["anti-inflammatory", "soothing"],
    },
    TerpeneNotes {
        display_name: "Eucalyptol",
        aroma: "Minty, cooling, camphor",
        effects: &["respiratory relief", "clarity"],
    },
];

/// An 11-dimensional terpene concentration vector
///
/// Serializes as a `{ "myrcene": 0.4, ... }` map in schema order.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(from = "HashMap<String, f64>")]
pub struct TerpeneProfile {
    values: [f64; TERPENE_COUNT],
}

impl TerpeneProfile {
    /// All-zero vector
    pub fn zeros() -> Self {
        Self::default()
    }

    /// Build from raw values in schema order
    ///
    /// Negative and non-finite values are stored as 0.
    pub fn from_values(values: [f64; TERPENE_COUNT]) -> Self {
        let mut sanitized = values;
        for v in sanitized.iter_mut() {
            *v = sanitize(*v);
        }
        Self { values: sanitized }
    }

    /// Build from `(name, value)` pairs
    ///
    /// Names go through [`Terpene::from_alias`]; unknown names are ignored and
    /// aliases mapping to the same terpene (alpha/beta pinene) combine by max.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let mut values = [0.0f64; TERPENE_COUNT];
        for (name, value) in pairs {
            if let Some(terpene) = Terpene::from_alias(name.as_ref()) {
                let slot = &mut values[terpene.index()];
                *slot = slot.max(sanitize(value));
            }
        }
        Self { values }
    }

    /// Raw values in schema order
    pub fn values(&self) -> &[f64; TERPENE_COUNT] {
        &self.values
    }

    /// Value for one terpene
    pub fn get(&self, terpene: Terpene) -> f64 {
        self.values[terpene.index()]
    }

    /// Copy with one value replaced
    pub fn with(mut self, terpene: Terpene, value: f64) -> Self {
        self.values[terpene.index()] = sanitize(value);
        self
    }

    /// `(terpene, value)` pairs in schema order
    pub fn iter(&self) -> impl Iterator<Item = (Terpene, f64)> + '_ {
        Terpene::ALL.iter().map(move |t| (*t, self.values[t.index()]))
    }

    /// True when every dimension is zero
    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0)
    }

    /// Copy with every value clamped to [0, 1]
    pub fn clamped_unit(&self) -> Self {
        let mut values = self.values;
        for v in values.iter_mut() {
            *v = v.clamp(0.0, 1.0);
        }
        Self { values }
    }

    /// Top `n` non-zero terpenes by value, descending (ties in schema order)
    pub fn dominant(&self, n: usize) -> Vec<(Terpene, f64)> {
        let mut ranked: Vec<(Terpene, f64)> = self.iter().filter(|(_, v)| *v > 0.0).collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        ranked.truncate(n);
        ranked
    }
}

impl From<HashMap<String, f64>> for TerpeneProfile {
    fn from(map: HashMap<String, f64>) -> Self {
        TerpeneProfile::from_pairs(map)
    }
}

impl Serialize for TerpeneProfile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(TERPENE_COUNT))?;
        for (terpene, value) in self.iter() {
            map.serialize_entry(terpene.key(), &value)?;
        }
        map.end()
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_order_is_fixed() {
        let keys: Vec<&str> = Terpene::ALL.iter().map(|t| t.key()).collect();
        assert_eq!(
            keys,
            vec![
                "myrcene",
                "limonene",
                "caryophyllene",
                "pinene",
                "linalool",
                "humulene",
                "terpinolene",
                "ocimene",
                "nerolidol",
                "bisabolol",
                "eucalyptol"
            ]
        );
        for (i, t) in Terpene::ALL.iter().enumerate() {
            assert_eq!(t.index(), i);
        }
    }

    #[test]
    fn test_alias_resolution() {
        assert_eq!(Terpene::from_alias("beta_myrcene"), Some(Terpene::Myrcene));
        assert_eq!(Terpene::from_alias("d-limonene"), Some(Terpene::Limonene));
        assert_eq!(Terpene::from_alias("Alpha Pinene"), Some(Terpene::Pinene));
        assert_eq!(Terpene::from_alias("beta_caryophyllene"), Some(Terpene::Caryophyllene));
        assert_eq!(Terpene::from_alias("alpha_bisabolol"), Some(Terpene::Bisabolol));
        assert_eq!(Terpene::from_alias(" EUCALYPTOL "), Some(Terpene::Eucalyptol));
        assert_eq!(Terpene::from_alias("geraniol"), None);
    }

    #[test]
    fn test_from_pairs_combines_aliases_by_max() {
        let profile = TerpeneProfile::from_pairs(vec![
            ("alpha_pinene", 0.12),
            ("beta_pinene", 0.30),
            ("myrcene", 0.4),
            ("camphene", 0.9),
        ]);
        assert_eq!(profile.get(Terpene::Pinene), 0.30);
        assert_eq!(profile.get(Terpene::Myrcene), 0.4);
        assert_eq!(profile.get(Terpene::Limonene), 0.0);
    }

    #[test]
    fn test_invalid_values_become_zero() {
        let mut raw = [0.1; TERPENE_COUNT];
        raw[0] = -0.5;
        raw[1] = f64::NAN;
        raw[2] = f64::INFINITY;
        let profile = TerpeneProfile::from_values(raw);
        assert_eq!(profile.get(Terpene::Myrcene), 0.0);
        assert_eq!(profile.get(Terpene::Limonene), 0.0);
        assert_eq!(profile.get(Terpene::Caryophyllene), 0.0);
        assert_eq!(profile.get(Terpene::Pinene), 0.1);
    }

    #[test]
    fn test_dominant_ordering() {
        let profile = TerpeneProfile::zeros()
            .with(Terpene::Limonene, 0.5)
            .with(Terpene::Myrcene, 0.2)
            .with(Terpene::Pinene, 0.5);
        let dominant = profile.dominant(5);
        assert_eq!(dominant.len(), 3);
        assert_eq!(dominant[0].0, Terpene::Limonene);
        assert_eq!(dominant[1].0, Terpene::Pinene);
        assert_eq!(dominant[2].0, Terpene::Myrcene);
    }

    #[test]
    fn test_serde_map_shape() {
        let profile = TerpeneProfile::zeros().with(Terpene::Linalool, 0.25);
        let json = serde_json::to_value(profile).unwrap();
        assert_eq!(json["linalool"], 0.25);
        assert_eq!(json["myrcene"], 0.0);

        let back: TerpeneProfile = serde_json::from_value(json).unwrap();
        assert_eq!(back, profile);
    }

    #[test]
    fn test_clamped_unit() {
        let profile = TerpeneProfile::zeros().with(Terpene::Myrcene, 3.5);
        assert_eq!(profile.clamped_unit().get(Terpene::Myrcene), 1.0);
    }
}
