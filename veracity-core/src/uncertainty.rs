//! Uncertainty quantification by dropout resampling.
//!
//! Entropy comes from the single deterministic pass. Variance, standard
//! deviation and the confidence interval come from `sample_count` forward
//! passes with the model's dropout left active. The stochastic region is a
//! [`StochasticSession`](crate::model::StochasticSession): it holds the
//! model lock for the whole loop and restores deterministic mode when it
//! drops, whether the loop finished or failed.

use crate::config::UncertaintyConfig;
use crate::error::{ExplainError, Result};
use crate::model::{Classifier, Encoding, SharedClassifier};
use crate::numeric;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Calibrated uncertainty for one prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyEstimate {
    /// Normalized predictive entropy of the deterministic pass, in `[0, 1]`.
    pub entropy: f64,
    /// Variance of the class-of-interest probability across samples.
    pub variance: f64,
    pub std_dev: f64,
    /// Mean class-of-interest probability across samples.
    pub mean: f64,
    /// Empirical `[lower, upper]` quantiles of the class-of-interest probability.
    pub confidence_interval: [f64; 2],
    /// Coverage of `confidence_interval`, e.g. 0.95.
    pub confidence_level: f64,
    pub sample_count: usize,
    /// Class whose probability spread is reported.
    pub class_index: usize,
}

/// Probability vectors from repeated stochastic passes, `[samples][classes]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSet {
    rows: Vec<Vec<f64>>,
}

impl SampleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let mut set = Self::new();
        for row in rows {
            set.push(row)?;
        }
        Ok(set)
    }

    /// Append one probability vector; its length must match earlier rows.
    pub fn push(&mut self, probabilities: Vec<f64>) -> Result<()> {
        if let Some(first) = self.rows.first() {
            if first.len() != probabilities.len() {
                return Err(ExplainError::shape(
                    format!("{} classes per sample", first.len()),
                    probabilities.len(),
                ));
            }
        }
        self.rows.push(probabilities);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// Probability of `class` in every sample.
    pub fn column(&self, class: usize) -> Vec<f64> {
        self.rows.iter().filter_map(|r| r.get(class).copied()).collect()
    }
}

/// Reduces stochastic samples to an [`UncertaintyEstimate`].
#[derive(Debug, Clone)]
pub struct UncertaintyEngine {
    config: UncertaintyConfig,
}

impl Default for UncertaintyEngine {
    fn default() -> Self {
        Self::new(UncertaintyConfig::default())
    }
}

impl UncertaintyEngine {
    pub fn new(config: UncertaintyConfig) -> Self {
        Self { config }
    }

    pub fn with_sample_count(mut self, sample_count: usize) -> Self {
        self.config.sample_count = sample_count;
        self
    }

    pub fn config(&self) -> &UncertaintyConfig {
        &self.config
    }

    /// Run the full resampling procedure against a shared model.
    pub fn quantify<M: Classifier>(
        &self,
        model: &SharedClassifier<M>,
        encoding: &Encoding,
        base_probabilities: &[f64],
    ) -> Result<UncertaintyEstimate> {
        if self.config.sample_count == 0 {
            return Err(ExplainError::invalid_input("sample_count must be >= 1"));
        }
        if encoding.is_empty() {
            return Err(ExplainError::empty_input("no tokens to resample over"));
        }

        let samples = self.collect_samples(model, encoding)?;
        self.estimate(base_probabilities, &samples)
    }

    fn collect_samples<M: Classifier>(
        &self,
        model: &SharedClassifier<M>,
        encoding: &Encoding,
    ) -> Result<SampleSet> {
        let session = model.stochastic_session()?;
        let num_classes = session.num_classes();

        let mut samples = SampleSet::new();
        for i in 0..self.config.sample_count {
            let output = session
                .infer(&encoding.token_ids, &encoding.attention_mask)
                .map_err(|e| {
                    ExplainError::uncertainty(format!("stochastic pass {i} failed: {e}"))
                })?;
            if output.scores.len() != num_classes {
                return Err(ExplainError::uncertainty(format!(
                    "stochastic pass {i} returned {} scores for {num_classes} classes",
                    output.scores.len()
                )));
            }
            samples.push(numeric::softmax(&output.scores))?;
        }
        drop(session);

        debug!(samples = samples.len(), num_classes, "Collected stochastic samples");
        Ok(samples)
    }

    /// Reduce a base distribution and a sample set to an estimate.
    pub fn estimate(
        &self,
        base_probabilities: &[f64],
        samples: &SampleSet,
    ) -> Result<UncertaintyEstimate> {
        if base_probabilities.is_empty() {
            return Err(ExplainError::invalid_input("empty base probability vector"));
        }
        if samples.is_empty() {
            return Err(ExplainError::uncertainty("no stochastic samples"));
        }
        if samples.num_classes() != base_probabilities.len() {
            return Err(ExplainError::shape(
                format!("{} classes per sample", base_probabilities.len()),
                samples.num_classes(),
            ));
        }

        let entropy = numeric::normalized_entropy(base_probabilities, self.config.epsilon);
        let class_index = self.class_of_interest(base_probabilities)?;
        let values = samples.column(class_index);

        let variance = numeric::variance(&values);
        let tail = (1.0 - self.config.confidence_level) / 2.0;
        let lower = numeric::percentile(&values, tail)
            .ok_or_else(|| ExplainError::uncertainty("samples contain NaN"))?;
        let upper = numeric::percentile(&values, 1.0 - tail)
            .ok_or_else(|| ExplainError::uncertainty("samples contain NaN"))?;

        Ok(UncertaintyEstimate {
            entropy,
            variance,
            std_dev: variance.sqrt(),
            mean: numeric::mean(&values),
            confidence_interval: [lower.clamp(0.0, 1.0), upper.clamp(0.0, 1.0)],
            confidence_level: self.config.confidence_level,
            sample_count: samples.len(),
            class_index,
        })
    }

    /// The configured positive class for two-class models; the predicted
    /// class otherwise.
    fn class_of_interest(&self, base_probabilities: &[f64]) -> Result<usize> {
        let num_classes = base_probabilities.len();
        if num_classes == 2 {
            let positive = self.config.positive_class;
            if positive >= num_classes {
                return Err(ExplainError::invalid_input(format!(
                    "positive class {positive} out of range for {num_classes} classes"
                )));
            }
            return Ok(positive);
        }
        numeric::argmax(base_probabilities)
            .ok_or_else(|| ExplainError::invalid_input("empty base probability vector"))
    }
}

/// Resample with default settings and the given sample count.
pub fn quantify_uncertainty<M: Classifier>(
    model: &SharedClassifier<M>,
    encoding: &Encoding,
    base_probabilities: &[f64],
    sample_count: usize,
) -> Result<UncertaintyEstimate> {
    UncertaintyEngine::default()
        .with_sample_count(sample_count)
        .quantify(model, encoding, base_probabilities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Capabilities, InferenceOutput};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns scripted logits in stochastic mode, fixed logits otherwise.
    struct ScriptedModel {
        script: Vec<[f32; 2]>,
        cursor: AtomicUsize,
        stochastic: bool,
        fail_at: Option<usize>,
        supports_dropout: bool,
    }

    impl ScriptedModel {
        fn new(script: Vec<[f32; 2]>) -> Self {
            Self {
                script,
                cursor: AtomicUsize::new(0),
                stochastic: false,
                fail_at: None,
                supports_dropout: true,
            }
        }
    }

    impl Classifier for ScriptedModel {
        fn num_classes(&self) -> usize {
            2
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities {
                supports_stochastic_resampling: self.supports_dropout,
                ..Capabilities::none()
            }
        }

        fn infer(&self, _ids: &[u32], _mask: &[u8]) -> Result<InferenceOutput> {
            let scores = if self.stochastic {
                let i = self.cursor.fetch_add(1, Ordering::SeqCst);
                if self.fail_at == Some(i) {
                    return Err(ExplainError::model("device lost"));
                }
                self.script[i % self.script.len()].to_vec()
            } else {
                vec![0.0, 0.0]
            };
            Ok(InferenceOutput {
                scores,
                pooled: Vec::new(),
                attentions: None,
            })
        }

        fn set_stochastic_mode(&mut self, enabled: bool) -> Result<()> {
            self.stochastic = enabled;
            Ok(())
        }

        fn is_stochastic(&self) -> bool {
            self.stochastic
        }
    }

    fn encoding() -> Encoding {
        Encoding {
            token_ids: vec![0, 5, 6, 1],
            attention_mask: vec![1, 1, 1, 1],
        }
    }

    #[test]
    fn test_single_sample_has_zero_spread() {
        let shared = SharedClassifier::new(ScriptedModel::new(vec![[0.0, 1.0]]));
        let estimate = quantify_uncertainty(&shared, &encoding(), &[0.3, 0.7], 1).unwrap();
        assert_eq!(estimate.sample_count, 1);
        assert_eq!(estimate.variance, 0.0);
        assert_eq!(estimate.std_dev, 0.0);
        let [lower, upper] = estimate.confidence_interval;
        assert!((lower - upper).abs() < 1e-12);
        assert_eq!(estimate.class_index, 1);
    }

    #[test]
    fn test_mode_restored_after_success_and_failure() {
        let shared = SharedClassifier::new(ScriptedModel::new(vec![[0.0, 1.0], [1.0, 0.0]]));
        assert!(!shared.lock().is_stochastic());
        quantify_uncertainty(&shared, &encoding(), &[0.5, 0.5], 20).unwrap();
        assert!(!shared.lock().is_stochastic());

        let mut failing = ScriptedModel::new(vec![[0.0, 1.0]]);
        failing.fail_at = Some(7);
        let shared = SharedClassifier::new(failing);
        let err = quantify_uncertainty(&shared, &encoding(), &[0.5, 0.5], 20).unwrap_err();
        assert!(matches!(err, ExplainError::UncertaintyUnavailable(_)));
        assert!(!shared.lock().is_stochastic());
    }

    #[test]
    fn test_unsupported_model_is_unavailable() {
        let mut model = ScriptedModel::new(vec![[0.0, 1.0]]);
        model.supports_dropout = false;
        let shared = SharedClassifier::new(model);
        let err = quantify_uncertainty(&shared, &encoding(), &[0.5, 0.5], 5).unwrap_err();
        assert!(matches!(err, ExplainError::UncertaintyUnavailable(_)));
    }

    #[test]
    fn test_interval_within_sample_range() {
        // 20 samples evenly spread over [0.40, 0.60]
        let rows: Vec<Vec<f64>> = (0..20)
            .map(|i| {
                let p = 0.40 + 0.20 * i as f64 / 19.0;
                vec![1.0 - p, p]
            })
            .collect();
        let samples = SampleSet::from_rows(rows).unwrap();
        let estimate = UncertaintyEngine::default()
            .estimate(&[0.5, 0.5], &samples)
            .unwrap();

        let [lower, upper] = estimate.confidence_interval;
        assert!(lower >= 0.40 - 1e-12 && upper <= 0.60 + 1e-12);
        assert!(lower > 0.40 && upper < 0.60, "interpolated, not the extremes");
        assert!(lower <= upper);
        assert!((estimate.mean - 0.5).abs() < 1e-9);
        assert!((estimate.entropy - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_entropy_of_certain_prediction() {
        let samples = SampleSet::from_rows(vec![vec![0.0, 1.0]]).unwrap();
        let estimate = UncertaintyEngine::default()
            .estimate(&[0.0, 1.0], &samples)
            .unwrap();
        assert!(estimate.entropy < 1e-6);
    }

    #[test]
    fn test_multiclass_tracks_predicted_class() {
        let samples =
            SampleSet::from_rows(vec![vec![0.1, 0.2, 0.7], vec![0.2, 0.2, 0.6]]).unwrap();
        let estimate = UncertaintyEngine::default()
            .estimate(&[0.1, 0.2, 0.7], &samples)
            .unwrap();
        assert_eq!(estimate.class_index, 2);
        assert!((estimate.mean - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_estimate_carries_configured_level() {
        let rows: Vec<Vec<f64>> = (0..20)
            .map(|i| {
                let p = 0.40 + 0.20 * i as f64 / 19.0;
                vec![1.0 - p, p]
            })
            .collect();
        let samples = SampleSet::from_rows(rows).unwrap();
        let wide = UncertaintyEngine::default()
            .estimate(&[0.5, 0.5], &samples)
            .unwrap();
        let narrow = UncertaintyEngine::new(UncertaintyConfig {
            confidence_level: 0.8,
            ..UncertaintyConfig::default()
        })
        .estimate(&[0.5, 0.5], &samples)
        .unwrap();

        assert_eq!(wide.confidence_level, 0.95);
        assert_eq!(narrow.confidence_level, 0.8);
        assert!(narrow.confidence_interval[0] > wide.confidence_interval[0]);
        assert!(narrow.confidence_interval[1] < wide.confidence_interval[1]);
    }

    #[test]
    fn test_sample_set_rejects_ragged_rows() {
        let err = SampleSet::from_rows(vec![vec![0.5, 0.5], vec![1.0]]).unwrap_err();
        assert!(matches!(err, ExplainError::InvalidShape { .. }));
    }
}
