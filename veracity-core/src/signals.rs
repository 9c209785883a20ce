//! Heuristic text-quality signals: sentiment, writing quality, claims, risk.
//!
//! These are cheap lexical features computed alongside the model. They feed
//! the rationale synthesizer and the risk tier; none of them touch the model.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

const POSITIVE_WORDS: &[&str] = &[
    "amazing",
    "excellent",
    "wonderful",
    "great",
    "fantastic",
    "perfect",
    "love",
    "best",
    "awesome",
    "brilliant",
];

const NEGATIVE_WORDS: &[&str] = &[
    "terrible",
    "awful",
    "horrible",
    "worst",
    "hate",
    "disaster",
    "fail",
    "poor",
    "bad",
    "disappointing",
];

static CLICKBAIT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bshock(?:ing)?\b",
        r"(?i)\bamazing\b",
        r"(?i)\bunbelievable\b",
        r"(?i)\byou won't believe\b",
        r"(?i)\bwhat happens next\b",
        r"(?i)\bclick here\b",
        r"(?i)\bbreaking\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static CLAIM_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(?:prove[sd]?|confirm[sd]?|show[sn]?)\b",
        r"(?i)\b(?:research|study|report) (?:shows?|reveals?|finds?)\b",
        r"(?i)\b(?:scientists?|experts?|doctors?) (?:say|claim|believe)\b",
        r"\d+%",
        r"(?i)\b(?:always|never|all|none|every)\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Maximum number of extracted claim sentences.
pub const MAX_CLAIMS: usize = 5;

/// Lexicon sentiment in `[-1, 1]`: `(pos - neg) / (pos + neg)`, 0 if neither.
pub fn sentiment_score(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let pos = POSITIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    let neg = NEGATIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    let total = pos + neg;
    if total == 0 {
        return 0.0;
    }
    (pos as f64 - neg as f64) / total as f64
}

/// Writing-quality indicators consumed by the rationale synthesizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WritingQuality {
    pub exclamation_count: usize,
    pub question_count: usize,
    /// Fraction of whitespace-separated words written in all caps.
    pub caps_ratio: f64,
    /// Number of distinct clickbait patterns present.
    pub clickbait_score: usize,
    /// Characters per period.
    pub avg_sentence_length: f64,
}

impl WritingQuality {
    pub fn analyze(text: &str) -> Self {
        let words: Vec<&str> = text.split_whitespace().collect();
        let caps_words = words.iter().filter(|w| is_shouted(w)).count();
        let caps_ratio = if words.is_empty() {
            0.0
        } else {
            caps_words as f64 / words.len() as f64
        };
        let clickbait_score = CLICKBAIT_PATTERNS
            .iter()
            .filter(|re| re.is_match(text))
            .count();
        let periods = text.matches('.').count().max(1);

        Self {
            exclamation_count: text.matches('!').count(),
            question_count: text.matches('?').count(),
            caps_ratio,
            clickbait_score,
            avg_sentence_length: text.chars().count() as f64 / periods as f64,
        }
    }
}

/// A word of more than one character with letters, none of them lowercase.
fn is_shouted(word: &str) -> bool {
    word.chars().count() > 1
        && word.chars().any(char::is_alphabetic)
        && !word.chars().any(char::is_lowercase)
}

/// Sentences that look like factual claims, at most [`MAX_CLAIMS`].
pub fn extract_claims(text: &str) -> Vec<String> {
    text.split('.')
        .map(str::trim)
        .filter(|s| s.chars().count() >= 10)
        .filter(|s| CLAIM_PATTERNS.iter().any(|re| re.is_match(s)))
        .take(MAX_CLAIMS)
        .map(String::from)
        .collect()
}

/// Coarse misinformation risk tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    High,
    Medium,
    Low,
    Safe,
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskTier::High => write!(f, "HIGH"),
            RiskTier::Medium => write!(f, "MEDIUM"),
            RiskTier::Low => write!(f, "LOW"),
            RiskTier::Safe => write!(f, "SAFE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLevel {
    pub level: RiskTier,
    pub description: String,
}

/// Tier from the fake-class probability; heavy clickbait lifts `Safe` to `Low`.
pub fn risk_level(fake_probability: f64, writing: &WritingQuality) -> RiskLevel {
    let mut level = if fake_probability > 0.9 {
        RiskTier::High
    } else if fake_probability > 0.7 {
        RiskTier::Medium
    } else if fake_probability > 0.5 {
        RiskTier::Low
    } else {
        RiskTier::Safe
    };
    if writing.clickbait_score >= 3 && level == RiskTier::Safe {
        level = RiskTier::Low;
    }
    RiskLevel {
        level,
        description: format!("{level} risk of misinformation"),
    }
}

/// All heuristic signals for one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSignals {
    pub sentiment_score: f64,
    pub writing_quality: WritingQuality,
    pub extracted_claims: Vec<String>,
}

impl TextSignals {
    pub fn analyze(text: &str) -> Self {
        Self {
            sentiment_score: sentiment_score(text),
            writing_quality: WritingQuality::analyze(text),
            extracted_claims: extract_claims(text),
        }
    }
}
