//! Collaborator interfaces: the classifier, the tokenizer, and the shared
//! model handle that serializes access to the inference-mode flag.
//!
//! The classifier network itself is opaque. It advertises what it can do
//! through [`Capabilities`]; every optional analysis stage checks the flag
//! before calling the matching method.

use crate::error::{ExplainError, Result};
use crate::tokens::SpecialTokens;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

/// Optional capabilities a classifier may expose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// `infer_with_gradient` is implemented.
    pub supports_gradient: bool,
    /// `infer` returns per-layer attention tensors.
    pub supports_attention_output: bool,
    /// `set_stochastic_mode(true)` keeps dropout active during inference.
    pub supports_stochastic_resampling: bool,
}

impl Capabilities {
    pub fn all() -> Self {
        Self {
            supports_gradient: true,
            supports_attention_output: true,
            supports_stochastic_resampling: true,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

/// Attention weights of one encoder layer, laid out `[heads][seq_len][seq_len]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerAttention {
    pub heads: Vec<Vec<Vec<f32>>>,
}

impl LayerAttention {
    pub fn new(heads: Vec<Vec<Vec<f32>>>) -> Self {
        Self { heads }
    }

    pub fn num_heads(&self) -> usize {
        self.heads.len()
    }

    /// Sequence length of the first head, or 0 when the layer is empty.
    pub fn seq_len(&self) -> usize {
        self.heads.first().map_or(0, Vec::len)
    }
}

/// Result of a single forward pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceOutput {
    /// Raw per-class scores (logits).
    pub scores: Vec<f32>,
    /// Pooled sequence representation.
    pub pooled: Vec<f32>,
    /// Per-layer attention, present only when the model exposes it.
    pub attentions: Option<Vec<LayerAttention>>,
}

/// Result of a differentiable forward pass followed by back-propagation of
/// one class score to the input representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientOutput {
    pub scores: Vec<f32>,
    /// One gradient component per input position (same length as the ids).
    pub input_gradient: Vec<f32>,
}

/// Text classifier consumed by the explanation stages.
pub trait Classifier: Send {
    /// Number of output classes.
    fn num_classes(&self) -> usize;

    fn capabilities(&self) -> Capabilities;

    /// Deterministic (or, in stochastic mode, dropout-active) forward pass.
    fn infer(&self, token_ids: &[u32], attention_mask: &[u8]) -> Result<InferenceOutput>;

    /// Forward pass with gradient tracking on the input representation;
    /// back-propagates the score of `target_class`.
    fn infer_with_gradient(
        &self,
        _token_ids: &[u32],
        _attention_mask: &[u8],
        _target_class: usize,
    ) -> Result<GradientOutput> {
        Err(ExplainError::attribution(
            "model does not expose a differentiable path",
        ))
    }

    /// Toggle dropout-active inference.
    fn set_stochastic_mode(&mut self, _enabled: bool) -> Result<()> {
        Err(ExplainError::uncertainty(
            "model does not support stochastic resampling",
        ))
    }

    fn is_stochastic(&self) -> bool {
        false
    }
}

/// Token ids and mask produced by a tokenizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encoding {
    pub token_ids: Vec<u32>,
    pub attention_mask: Vec<u8>,
}

impl Encoding {
    pub fn len(&self) -> usize {
        self.token_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_ids.is_empty()
    }
}

/// Tokenizer consumed by the explanation stages.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Result<Encoding>;

    fn ids_to_tokens(&self, token_ids: &[u32]) -> Vec<String>;

    fn special_tokens(&self) -> SpecialTokens {
        SpecialTokens::default()
    }
}

/// A classifier shared between concurrent requests.
///
/// All model access goes through one mutex so that no request can observe
/// the model while another holds it in stochastic mode.
pub struct SharedClassifier<M> {
    inner: Mutex<M>,
}

impl<M: Classifier> SharedClassifier<M> {
    pub fn new(model: M) -> Self {
        Self {
            inner: Mutex::new(model),
        }
    }

    /// Lock the model for deterministic use.
    ///
    /// A poisoned lock is recovered: the stochastic session restores the
    /// mode while unwinding, so the model is still in a usable state.
    pub fn lock(&self) -> MutexGuard<'_, M> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn capabilities(&self) -> Capabilities {
        self.lock().capabilities()
    }

    pub fn num_classes(&self) -> usize {
        self.lock().num_classes()
    }

    pub fn infer(&self, token_ids: &[u32], attention_mask: &[u8]) -> Result<InferenceOutput> {
        self.lock().infer(token_ids, attention_mask)
    }

    pub fn infer_with_gradient(
        &self,
        token_ids: &[u32],
        attention_mask: &[u8],
        target_class: usize,
    ) -> Result<GradientOutput> {
        self.lock()
            .infer_with_gradient(token_ids, attention_mask, target_class)
    }

    /// Hold the model in stochastic mode until the returned session drops.
    pub fn stochastic_session(&self) -> Result<StochasticSession<'_, M>> {
        let mut guard = self.lock();
        if !guard.capabilities().supports_stochastic_resampling {
            return Err(ExplainError::uncertainty(
                "model does not advertise stochastic resampling",
            ));
        }
        guard.set_stochastic_mode(true)?;
        Ok(StochasticSession { guard })
    }

    pub fn into_inner(self) -> M {
        self.inner
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Exclusive stochastic-mode region over a [`SharedClassifier`].
///
/// Dropping the session switches the model back to deterministic mode on
/// every exit path, including `?` returns and panics.
pub struct StochasticSession<'a, M: Classifier> {
    guard: MutexGuard<'a, M>,
}

impl<M: Classifier> StochasticSession<'_, M> {
    pub fn infer(&self, token_ids: &[u32], attention_mask: &[u8]) -> Result<InferenceOutput> {
        self.guard.infer(token_ids, attention_mask)
    }

    pub fn num_classes(&self) -> usize {
        self.guard.num_classes()
    }
}

impl<M: Classifier> Drop for StochasticSession<'_, M> {
    fn drop(&mut self) {
        if let Err(e) = self.guard.set_stochastic_mode(false) {
            tracing::error!(error = %e, "Failed to restore deterministic inference mode");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlagModel {
        stochastic: bool,
        calls: AtomicUsize,
        fail_on_call: Option<usize>,
    }

    impl Classifier for FlagModel {
        fn num_classes(&self) -> usize {
            2
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities {
                supports_stochastic_resampling: true,
                ..Capabilities::none()
            }
        }

        fn infer(&self, _ids: &[u32], _mask: &[u8]) -> Result<InferenceOutput> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_call == Some(n) {
                return Err(ExplainError::model("forward pass failed"));
            }
            Ok(InferenceOutput {
                scores: vec![0.0, 0.0],
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

    fn flag_model(fail_on_call: Option<usize>) -> FlagModel {
        FlagModel {
            stochastic: false,
            calls: AtomicUsize::new(0),
            fail_on_call,
        }
    }

    #[test]
    fn test_session_restores_mode_on_drop() {
        let shared = SharedClassifier::new(flag_model(None));
        {
            let session = shared.stochastic_session().unwrap();
            assert!(session.guard.is_stochastic());
            session.infer(&[1], &[1]).unwrap();
        }
        assert!(!shared.lock().is_stochastic());
    }

    #[test]
    fn test_session_restores_mode_after_error() {
        let shared = SharedClassifier::new(flag_model(Some(2)));
        let run = || -> Result<()> {
            let session = shared.stochastic_session()?;
            for _ in 0..5 {
                session.infer(&[1], &[1])?;
            }
            Ok(())
        };
        assert!(run().is_err());
        assert!(!shared.lock().is_stochastic());
    }

    #[test]
    fn test_default_methods_report_unavailable() {
        struct Plain;
        impl Classifier for Plain {
            fn num_classes(&self) -> usize {
                2
            }
            fn capabilities(&self) -> Capabilities {
                Capabilities::none()
            }
            fn infer(&self, _ids: &[u32], _mask: &[u8]) -> Result<InferenceOutput> {
                Ok(InferenceOutput {
                    scores: vec![0.0, 0.0],
                    pooled: Vec::new(),
                    attentions: None,
                })
            }
        }

        let shared = SharedClassifier::new(Plain);
        assert!(matches!(
            shared.infer_with_gradient(&[1], &[1], 0),
            Err(ExplainError::AttributionUnavailable(_))
        ));
        assert!(matches!(
            shared.stochastic_session(),
            Err(ExplainError::UncertaintyUnavailable(_))
        ));
    }
}
