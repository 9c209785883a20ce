//! Per-request orchestration.
//!
//! One deterministic pass feeds the verdict, the attention summary and (via
//! a second, differentiable pass) the gradient saliency. Uncertainty runs
//! its own stochastic passes. Each optional stage is gated on the model's
//! advertised capability and failures are logged once and leave the
//! corresponding report field empty.

use crate::config::ExplainConfig;
use crate::error::{ExplainError, Result};
use crate::interpretability::{
    AttentionAnalyzer, AttentionHighlight, PhraseExtractor, RationaleSynthesizer, TokenSaliency,
    attribute,
};
use crate::model::{Classifier, Encoding, InferenceOutput, SharedClassifier, Tokenizer};
use crate::prediction::{Prediction, Verdict};
use crate::signals::{RiskLevel, TextSignals, WritingQuality, risk_level};
use crate::uncertainty::{UncertaintyEngine, UncertaintyEstimate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Full analysis result for one input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub id: Uuid,
    pub prediction: Verdict,
    pub confidence: f64,
    pub credibility_score: f64,
    pub probabilities: Vec<f64>,
    /// Highest-saliency tokens; absent when attribution was unavailable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_tokens: Option<Vec<TokenSaliency>>,
    /// Absent when attribution was unavailable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspicious_phrases: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attention_highlights: Option<Vec<AttentionHighlight>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<UncertaintyEstimate>,
    pub key_reasons: Vec<String>,
    pub sentiment_score: f64,
    pub writing_quality: WritingQuality,
    pub extracted_claims: Vec<String>,
    pub risk_level: RiskLevel,
    pub processing_time_ms: f64,
    pub timestamp: DateTime<Utc>,
}

impl AnalysisReport {
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs every analysis stage against one shared model and tokenizer.
pub struct Analyzer<M, T: ?Sized> {
    model: SharedClassifier<M>,
    tokenizer: Arc<T>,
    config: ExplainConfig,
}

impl<M, T> Analyzer<M, T>
where
    M: Classifier,
    T: Tokenizer + ?Sized,
{
    pub fn new(model: M, tokenizer: Arc<T>, config: ExplainConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            model: SharedClassifier::new(model),
            tokenizer,
            config,
        })
    }

    pub fn model(&self) -> &SharedClassifier<M> {
        &self.model
    }

    pub fn config(&self) -> &ExplainConfig {
        &self.config
    }

    /// Analyze an article given its title and body.
    pub fn analyze(&self, title: &str, text: &str) -> Result<AnalysisReport> {
        let full_text = if title.trim().is_empty() {
            text.to_string()
        } else {
            format!("{}. {}", title.trim(), text)
        };
        self.analyze_text(&full_text)
    }

    /// Analyze a single piece of text.
    ///
    /// Returns `EmptyInput` when the text is blank or has no eligible tokens for
    /// attribution; every other stage failure only removes its field.
    pub fn analyze_text(&self, text: &str) -> Result<AnalysisReport> {
        let started = Instant::now();
        let id = Uuid::new_v4();
        let _span = tracing::info_span!("analyze", %id).entered();

        if text.trim().is_empty() {
            return Err(ExplainError::empty_input("text is empty"));
        }

        let encoding = self.tokenizer.encode(text)?;
        debug!(tokens = encoding.len(), "Encoded input");

        let output = self
            .model
            .infer(&encoding.token_ids, &encoding.attention_mask)?;
        let prediction = Prediction::from_scores(&output.scores)?;

        let saliencies = self.attribution_stage(&encoding, prediction.class_index)?;
        let suspicious_phrases = saliencies.as_ref().map(|s| {
            PhraseExtractor::new(
                self.config.phrases.relative_threshold,
                self.config.phrases.max_phrases,
            )
            .extract(s)
        });
        let top_tokens = saliencies.map(|mut s| {
            s.truncate(self.config.attribution.top_tokens);
            s
        });

        let attention_highlights = self.attention_stage(&output, &encoding);
        let uncertainty = self.uncertainty_stage(&encoding, &prediction.probabilities);

        let signals = TextSignals::analyze(text);
        let risk = risk_level(prediction.fake_probability(), &signals.writing_quality);
        let key_reasons = RationaleSynthesizer::new(self.config.rationale.max_quoted_phrases)
            .synthesize(
                prediction.verdict,
                prediction.confidence,
                suspicious_phrases.as_deref().unwrap_or_default(),
                Some(signals.sentiment_score),
                Some(&signals.writing_quality),
            )
            .into_iter()
            .map(|r| r.text)
            .collect();

        let processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        info!(
            prediction = %prediction.verdict,
            confidence = prediction.confidence,
            elapsed_ms = processing_time_ms,
            "Analysis complete"
        );

        Ok(AnalysisReport {
            id,
            prediction: prediction.verdict,
            confidence: prediction.confidence,
            credibility_score: prediction.credibility_score,
            probabilities: prediction.probabilities,
            top_tokens,
            suspicious_phrases,
            attention_highlights,
            uncertainty,
            key_reasons,
            sentiment_score: signals.sentiment_score,
            writing_quality: signals.writing_quality,
            extracted_claims: signals.extracted_claims,
            risk_level: risk,
            processing_time_ms,
            timestamp: Utc::now(),
        })
    }

    fn attribution_stage(
        &self,
        encoding: &Encoding,
        target_class: usize,
    ) -> Result<Option<Vec<TokenSaliency>>> {
        if !self.config.attribution.enabled {
            debug!("Attribution disabled by configuration");
            return Ok(None);
        }
        if !self.model.capabilities().supports_gradient {
            debug!("Model has no gradient path, skipping attribution");
            return Ok(None);
        }
        match attribute(&self.model, self.tokenizer.as_ref(), encoding, target_class) {
            Ok(saliencies) => Ok(Some(saliencies)),
            Err(e @ ExplainError::EmptyInput(_)) => Err(e),
            Err(e) => {
                warn!(error = %e, "Attribution failed, omitting token importance");
                Ok(None)
            }
        }
    }

    fn attention_stage(
        &self,
        output: &InferenceOutput,
        encoding: &Encoding,
    ) -> Option<Vec<AttentionHighlight>> {
        if !self.config.attention.enabled
            || !self.model.capabilities().supports_attention_output
        {
            return None;
        }
        let Some(layers) = output.attentions.as_deref() else {
            warn!("Model advertised attention output but returned none");
            return None;
        };
        AttentionAnalyzer::new(self.config.attention.top_k)
            .summarize(layers, &encoding.token_ids, self.tokenizer.as_ref())
            .inspect_err(|e| warn!(error = %e, "Attention summary failed"))
            .ok()
    }

    fn uncertainty_stage(
        &self,
        encoding: &Encoding,
        base_probabilities: &[f64],
    ) -> Option<UncertaintyEstimate> {
        if !self.config.uncertainty.enabled
            || !self.model.capabilities().supports_stochastic_resampling
        {
            return None;
        }
        UncertaintyEngine::new(self.config.uncertainty.clone())
            .quantify(&self.model, encoding, base_probabilities)
            .inspect_err(|e| warn!(error = %e, "Uncertainty estimation failed"))
            .ok()
    }
}
