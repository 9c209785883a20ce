//! Decoding raw class scores into a verdict.

use crate::error::{ExplainError, Result};
use crate::numeric;
use serde::{Deserialize, Serialize};

/// Index of the "fake" class in the classifier output.
pub const FAKE_CLASS: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Real,
    Fake,
}

impl Verdict {
    pub fn from_class(class_index: usize) -> Self {
        if class_index == FAKE_CLASS {
            Verdict::Fake
        } else {
            Verdict::Real
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Real => write!(f, "REAL"),
            Verdict::Fake => write!(f, "FAKE"),
        }
    }
}

/// A decoded deterministic prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub verdict: Verdict,
    pub class_index: usize,
    /// Probability of the predicted class.
    pub confidence: f64,
    /// `1 - p(fake)`.
    pub credibility_score: f64,
    pub probabilities: Vec<f64>,
}

impl Prediction {
    /// Softmax the raw scores and pick the argmax class.
    pub fn from_scores(scores: &[f32]) -> Result<Self> {
        let probabilities = numeric::softmax(scores);
        let class_index = numeric::argmax(&probabilities)
            .ok_or_else(|| ExplainError::model("classifier returned no class scores"))?;
        let fake_probability = probabilities.get(FAKE_CLASS).copied().unwrap_or(0.0);
        Ok(Self {
            verdict: Verdict::from_class(class_index),
            class_index,
            confidence: probabilities[class_index],
            credibility_score: 1.0 - fake_probability,
            probabilities,
        })
    }

    pub fn fake_probability(&self) -> f64 {
        1.0 - self.credibility_score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_fake() {
        let prediction = Prediction::from_scores(&[-1.0, 1.0]).unwrap();
        assert_eq!(prediction.verdict, Verdict::Fake);
        assert_eq!(prediction.class_index, 1);
        assert!(prediction.confidence > 0.85);
        assert!((prediction.credibility_score + prediction.confidence - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_decode_real() {
        let prediction = Prediction::from_scores(&[2.0, 0.0]).unwrap();
        assert_eq!(prediction.verdict, Verdict::Real);
        assert!(prediction.credibility_score > 0.8);
        assert_eq!(prediction.verdict.to_string(), "REAL");
    }

    #[test]
    fn test_empty_scores_rejected() {
        assert!(Prediction::from_scores(&[]).is_err());
    }
}
