//! Brand name normalization and exact-key matching.
//!
//! All brand comparisons happen in [`BrandKey`] space. Matching is equality on
//! the normalized form only; there is no fuzzy or prefix matching.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Characters removed from brand names before tokenizing.
const STRIPPED_CHARS: [char; 5] = ['-', '_', '.', ',', '&'];

/// Canonical identifier for a brand.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BrandKey(String);

impl BrandKey {
    /// Wraps an already-normalized key, e.g. one read back from a ledger row.
    #[must_use]
    pub fn from_normalized(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for BrandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize a free-text brand name into a [`BrandKey`].
///
/// Lowercases, turns `- _ . , &` into separators, drops standalone `and`
/// tokens, and concatenates the remaining tokens. `"Coca-Cola"`,
/// `"coca cola"` and `"COCA_COLA"` all become `cocacola`.
#[must_use]
pub fn normalize(name: &str) -> BrandKey {
    let lowered = name.to_lowercase();
    let spaced: String = lowered
        .chars()
        .map(|c| if STRIPPED_CHARS.contains(&c) { ' ' } else { c })
        .collect();

    let key = spaced
        .split_whitespace()
        .filter(|token| *token != "and")
        .collect::<String>();

    BrandKey(key)
}

/// Return the configured key equal to the normalized `analysis_brand_name`.
///
/// An empty normalized name never matches.
pub fn match_brand<'a, I>(analysis_brand_name: &str, configured: I) -> Option<BrandKey>
where
    I: IntoIterator<Item = &'a BrandKey>,
{
    let candidate = normalize(analysis_brand_name);
    if candidate.is_empty() {
        return None;
    }
    configured.into_iter().find(|key| **key == candidate).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn punctuation_and_case_variants_share_a_key() {
        let expected = BrandKey::from_normalized("cocacola");
        assert_eq!(normalize("Coca-Cola"), expected);
        assert_eq!(normalize("coca cola"), expected);
        assert_eq!(normalize("COCA_COLA"), expected);
        assert_eq!(normalize("  Coca.Cola, "), expected);
    }

    #[test]
    fn and_token_and_ampersand_are_equivalent() {
        assert_eq!(normalize("Procter & Gamble"), normalize("Procter and Gamble"));
        assert_eq!(normalize("Johnson-and-Johnson"), normalize("Johnson & Johnson"));
        assert_eq!(normalize("Procter & Gamble").as_str(), "proctergamble");
    }

    #[test]
    fn and_inside_a_word_is_kept() {
        assert_eq!(normalize("Brandywine").as_str(), "brandywine");
        assert_eq!(normalize("Sandisk").as_str(), "sandisk");
    }

    #[test]
    fn blank_names_normalize_to_empty() {
        assert!(normalize("").is_empty());
        assert!(normalize(" - & and _ ").is_empty());
    }

    #[test]
    fn match_requires_exact_normalized_equality() {
        let configured = [normalize("Nike"), normalize("Coca-Cola")];
        assert_eq!(
            match_brand("NIKE", &configured),
            Some(BrandKey::from_normalized("nike"))
        );
        assert_eq!(
            match_brand("coca cola", &configured),
            Some(BrandKey::from_normalized("cocacola"))
        );
        assert_eq!(match_brand("Nike Inc", &configured), None);
        assert_eq!(match_brand("Nik", &configured), None);
    }

    #[test]
    fn empty_analysis_name_never_matches() {
        let configured = [normalize("Nike")];
        assert_eq!(match_brand("", &configured), None);
        assert_eq!(match_brand("&", &configured), None);
    }
}
