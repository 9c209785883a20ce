//! Suspicious phrase extraction from ranked token saliency.

use super::attribution::TokenSaliency;
use serde::{Deserialize, Serialize};

/// Default fraction of the peak importance a token must reach.
pub const DEFAULT_RELATIVE_THRESHOLD: f64 = 0.5;
/// Default maximum number of phrases.
pub const DEFAULT_MAX_PHRASES: usize = 5;

/// Groups consecutive high-saliency tokens into phrases.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhraseExtractor {
    pub relative_threshold: f64,
    pub max_phrases: usize,
}

impl Default for PhraseExtractor {
    fn default() -> Self {
        Self {
            relative_threshold: DEFAULT_RELATIVE_THRESHOLD,
            max_phrases: DEFAULT_MAX_PHRASES,
        }
    }
}

impl PhraseExtractor {
    pub fn new(relative_threshold: f64, max_phrases: usize) -> Self {
        Self {
            relative_threshold,
            max_phrases,
        }
    }

    /// Extract phrases in sequence order.
    ///
    /// Input order does not matter: tokens are put back in sequence order
    /// first. A token joins the current phrase when its importance reaches
    /// `relative_threshold * max(importance)`; only a below-cutoff token or
    /// the end of the sequence ends a phrase. Positions missing from the
    /// input (specials, zero gradient) do not split a phrase.
    pub fn extract(&self, saliencies: &[TokenSaliency]) -> Vec<String> {
        let peak = saliencies
            .iter()
            .map(|s| s.importance)
            .fold(0.0_f64, f64::max);
        if !(peak > 0.0 && peak.is_finite()) {
            return Vec::new();
        }
        let cutoff = self.relative_threshold * peak;

        let mut in_order: Vec<&TokenSaliency> = saliencies.iter().collect();
        in_order.sort_by_key(|s| s.position);

        let mut phrases = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for item in in_order {
            if item.importance >= cutoff {
                current.push(item.token.as_str());
            } else if !current.is_empty() {
                phrases.push(current.join(" "));
                current.clear();
            }
        }
        if !current.is_empty() {
            phrases.push(current.join(" "));
        }

        phrases.truncate(self.max_phrases);
        phrases
    }
}

/// Extract up to [`DEFAULT_MAX_PHRASES`] phrases at the given threshold.
pub fn extract_phrases(saliencies: &[TokenSaliency], relative_threshold: f64) -> Vec<String> {
    PhraseExtractor::new(relative_threshold, DEFAULT_MAX_PHRASES).extract(saliencies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sal(token: &str, importance: f64, position: usize) -> TokenSaliency {
        TokenSaliency {
            token: token.to_string(),
            importance,
            position,
        }
    }

    #[test]
    fn test_below_cutoff_token_breaks_phrase() {
        // ranked order, as produced by attribution
        let ranked = vec![
            sal("sky", 0.9, 2),
            sal("green", 0.8, 4),
            sal("is", 0.2, 3),
            sal("The", 0.1, 1),
            sal("!", 0.05, 5),
        ];
        assert_eq!(extract_phrases(&ranked, 0.5), vec!["sky", "green"]);
    }

    #[test]
    fn test_adjacent_tokens_are_joined() {
        let ranked = vec![
            sal("miracle", 1.0, 3),
            sal("shocking", 0.9, 1),
            sal("cure", 0.8, 4),
            sal("new", 0.7, 2),
            sal("found", 0.1, 5),
        ];
        assert_eq!(
            extract_phrases(&ranked, 0.5),
            vec!["shocking new miracle cure"]
        );
    }

    #[test]
    fn test_position_gap_keeps_phrase() {
        // position 2 had zero gradient and never reached the saliency list
        let ranked = vec![sal("miracle", 1.0, 1), sal("cure", 0.9, 3)];
        assert_eq!(extract_phrases(&ranked, 0.5), vec!["miracle cure"]);
    }

    #[test]
    fn test_empty_and_zero_inputs() {
        assert!(extract_phrases(&[], 0.5).is_empty());
        let zeros = vec![sal("a", 0.0, 1), sal("b", 0.0, 2)];
        assert!(extract_phrases(&zeros, 0.5).is_empty());
    }

    #[test]
    fn test_truncates_to_max_phrases() {
        let ranked: Vec<TokenSaliency> = (0..10)
            .map(|i| sal(&format!("t{i}"), if i % 2 == 0 { 1.0 } else { 0.1 }, i))
            .collect();
        let phrases = extract_phrases(&ranked, 0.5);
        assert_eq!(phrases, vec!["t0", "t2", "t4", "t6", "t8"]);

        let limited = PhraseExtractor::new(0.5, 2).extract(&ranked);
        assert_eq!(limited, vec!["t0", "t2"]);
    }

    #[test]
    fn test_all_above_threshold_single_phrase() {
        let ranked = vec![sal("c", 0.9, 3), sal("a", 1.0, 1), sal("b", 0.95, 2)];
        assert_eq!(extract_phrases(&ranked, 0.5), vec!["a b c"]);
    }
}
