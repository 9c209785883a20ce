//! Natural-language rationale from the prediction, phrases and text signals.

use crate::prediction::Verdict;
use crate::signals::WritingQuality;
use serde::{Deserialize, Serialize};

/// Which rule produced a reason. Variants are declared in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonKind {
    Confidence,
    SuspiciousPhrases,
    Sentiment,
    Punctuation,
    Capitalization,
}

/// A single rationale line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reason {
    pub kind: ReasonKind,
    pub text: String,
}

impl Reason {
    fn new(kind: ReasonKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// Fixed-order rule table; every matching rule contributes one reason.
#[derive(Debug, Clone, Copy)]
pub struct RationaleSynthesizer {
    pub max_quoted_phrases: usize,
}

impl Default for RationaleSynthesizer {
    fn default() -> Self {
        Self {
            max_quoted_phrases: 3,
        }
    }
}

impl RationaleSynthesizer {
    pub fn new(max_quoted_phrases: usize) -> Self {
        Self { max_quoted_phrases }
    }

    pub fn synthesize(
        &self,
        verdict: Verdict,
        confidence: f64,
        suspicious_phrases: &[String],
        sentiment_score: Option<f64>,
        writing_quality: Option<&WritingQuality>,
    ) -> Vec<Reason> {
        let mut reasons = Vec::new();

        if verdict == Verdict::Fake {
            let text = if confidence > 0.9 {
                "Very high confidence in fake news detection"
            } else if confidence > 0.7 {
                "Strong indicators of misinformation detected"
            } else {
                "Multiple suspicious patterns found"
            };
            reasons.push(Reason::new(ReasonKind::Confidence, text));
        }

        if !suspicious_phrases.is_empty() {
            let quoted: Vec<String> = suspicious_phrases
                .iter()
                .take(self.max_quoted_phrases)
                .map(|p| format!("\"{p}\""))
                .collect();
            reasons.push(Reason::new(
                ReasonKind::SuspiciousPhrases,
                format!("Suspicious phrases detected: {}", quoted.join(", ")),
            ));
        }

        if let Some(score) = sentiment_score {
            if score < -0.5 {
                reasons.push(Reason::new(
                    ReasonKind::Sentiment,
                    "Highly negative emotional tone detected",
                ));
            } else if score > 0.8 {
                reasons.push(Reason::new(
                    ReasonKind::Sentiment,
                    "Unusually positive framing may indicate bias",
                ));
            }
        }

        if let Some(wq) = writing_quality {
            if wq.exclamation_count > 3 {
                reasons.push(Reason::new(
                    ReasonKind::Punctuation,
                    format!(
                        "Excessive punctuation usage ({} exclamation marks)",
                        wq.exclamation_count
                    ),
                ));
            }
            if wq.caps_ratio > 0.3 {
                reasons.push(Reason::new(
                    ReasonKind::Capitalization,
                    "Excessive capitalization detected (clickbait indicator)",
                ));
            }
        }

        reasons
    }
}

/// Rationale lines with the default settings.
pub fn synthesize(
    verdict: Verdict,
    confidence: f64,
    suspicious_phrases: &[String],
    sentiment_score: Option<f64>,
    writing_quality: Option<&WritingQuality>,
) -> Vec<String> {
    RationaleSynthesizer::default()
        .synthesize(
            verdict,
            confidence,
            suspicious_phrases,
            sentiment_score,
            writing_quality,
        )
        .into_iter()
        .map(|r| r.text)
        .collect()
}
