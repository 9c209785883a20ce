//! # veracity-core: prediction explanation and uncertainty for text classifiers
//!
//! Given a classifier that produces class scores, a pooled vector and
//! per-layer attention, this crate computes:
//! 1. **Attribution**: gradient saliency per input token, ranked
//! 2. **Phrases**: runs of adjacent high-saliency tokens
//! 3. **Attention**: the tokens the classification position attends to most
//! 4. **Uncertainty**: entropy plus dropout-resampled variance and interval
//! 5. **Rationale**: ordered natural-language reasons
//!
//! The classifier and tokenizer are collaborators behind the traits in
//! [`model`]; [`reference`] provides a runtime-free implementation.

// Foundation
pub mod config;
pub mod error;
pub mod model;
pub mod numeric;
pub mod tokens;

// Decoding and heuristics
pub mod prediction;
pub mod signals;

// Explanation stages
pub mod interpretability;
pub mod uncertainty;

// Orchestration
pub mod analyzer;
pub mod reference;

// Re-exports
pub use analyzer::{AnalysisReport, Analyzer};
pub use config::{ExplainConfig, load_config};
pub use error::{ExplainError, Result};
pub use interpretability::{
    AttentionHighlight, TokenSaliency, attribute, extract_phrases, summarize_attention, synthesize,
};
pub use model::{
    Capabilities, Classifier, Encoding, GradientOutput, InferenceOutput, LayerAttention,
    SharedClassifier, StochasticSession, Tokenizer,
};
pub use prediction::{Prediction, Verdict};
pub use signals::{RiskLevel, RiskTier, TextSignals, WritingQuality};
pub use uncertainty::{UncertaintyEngine, UncertaintyEstimate, quantify_uncertainty};
