//! Optional content-based category suggestions.
//!
//! The suggester is a seam for an external analyzer. The crate ships only
//! the trait, the no-op implementation, and the override policy; network
//! clients live in the embedding application.

use crate::config::schema::UNCATEGORIZED;
use crate::metadata::PhotoRecord;

/// Categories confident content analysis may override directly.
const HIGH_TRUST_CATEGORIES: &[&str] = &["Portrait", "Macro", "Wildlife"];

/// Minimum confidence (0..=10) to override a scored assignment.
const OVERRIDE_CONFIDENCE: u8 = 8;

/// Minimum confidence to fill in an Uncategorized assignment with a
/// category outside the high-trust set.
const FALLBACK_CONFIDENCE: u8 = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub category: String,
    /// 0..=10 scale reported by the analyzer.
    pub confidence: u8,
}

pub trait CategorySuggester: Send + Sync {
    /// Returns a suggestion for the record, or `None` when the analyzer has
    /// nothing confident to say.
    fn suggest(&self, record: &PhotoRecord) -> Option<Suggestion>;
}

/// Default suggester: never suggests anything.
pub struct NoopSuggester;

impl CategorySuggester for NoopSuggester {
    fn suggest(&self, _record: &PhotoRecord) -> Option<Suggestion> {
        None
    }
}

/// Whether a suggestion is strong enough to replace the current assignment.
pub fn should_override(current_category: &str, suggestion: &Suggestion) -> bool {
    if suggestion.category == current_category {
        return false;
    }

    if HIGH_TRUST_CATEGORIES.contains(&suggestion.category.as_str())
        && suggestion.confidence >= OVERRIDE_CONFIDENCE
    {
        return true;
    }

    current_category == UNCATEGORIZED && suggestion.confidence >= FALLBACK_CONFIDENCE
}
