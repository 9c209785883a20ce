//! Token-level importance scoring from input gradients.

use crate::error::{ExplainError, Result};
use crate::model::{Classifier, Encoding, SharedClassifier, Tokenizer};
use crate::tokens::{SpecialTokens, clean_token};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Importance of one input token for the predicted class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSaliency {
    /// Token text with sub-word markers removed.
    pub token: String,
    /// Absolute gradient magnitude; always > 0.
    pub importance: f64,
    /// Position in the encoded sequence.
    pub position: usize,
}

/// Gradient saliency for `target_class` over the encoded input.
///
/// Returns tokens sorted by descending importance, ties kept in sequence
/// order. Special, padded and zero-gradient positions are left out.
pub fn attribute<M, T>(
    model: &SharedClassifier<M>,
    tokenizer: &T,
    encoding: &Encoding,
    target_class: usize,
) -> Result<Vec<TokenSaliency>>
where
    M: Classifier,
    T: Tokenizer + ?Sized,
{
    let (capabilities, num_classes) = {
        let guard = model.lock();
        (guard.capabilities(), guard.num_classes())
    };
    if !capabilities.supports_gradient {
        return Err(ExplainError::attribution(
            "model does not advertise gradient support",
        ));
    }
    if target_class >= num_classes {
        return Err(ExplainError::invalid_input(format!(
            "target class {target_class} out of range for {num_classes} classes"
        )));
    }
    if encoding.attention_mask.len() != encoding.token_ids.len() {
        return Err(ExplainError::shape(
            format!("{} mask entries", encoding.token_ids.len()),
            encoding.attention_mask.len(),
        ));
    }

    let output =
        model.infer_with_gradient(&encoding.token_ids, &encoding.attention_mask, target_class)?;
    if output.input_gradient.len() != encoding.token_ids.len() {
        return Err(ExplainError::attribution(format!(
            "gradient has {} components for {} positions",
            output.input_gradient.len(),
            encoding.token_ids.len()
        )));
    }
    if output.input_gradient.iter().any(|g| !g.is_finite()) {
        return Err(ExplainError::attribution("gradient contains non-finite values"));
    }

    let tokens = tokenizer.ids_to_tokens(&encoding.token_ids);
    rank_saliency(
        &tokens,
        &output.input_gradient,
        &encoding.attention_mask,
        &tokenizer.special_tokens(),
    )
}

/// Turn raw per-position gradients into a ranked saliency list.
pub fn rank_saliency(
    tokens: &[String],
    gradient: &[f32],
    attention_mask: &[u8],
    specials: &SpecialTokens,
) -> Result<Vec<TokenSaliency>> {
    if tokens.len() != gradient.len() || attention_mask.len() != gradient.len() {
        return Err(ExplainError::shape(
            format!("{} tokens, gradients and mask entries", gradient.len()),
            format!(
                "{} tokens, {} mask entries",
                tokens.len(),
                attention_mask.len()
            ),
        ));
    }

    let mut eligible = 0usize;
    let mut saliencies = Vec::with_capacity(tokens.len());
    for (position, ((raw, &grad), &mask)) in tokens
        .iter()
        .zip(gradient)
        .zip(attention_mask)
        .enumerate()
    {
        if mask == 0 || specials.contains(raw) {
            continue;
        }
        let token = clean_token(raw);
        if token.is_empty() {
            continue;
        }
        eligible += 1;

        let importance = (grad as f64).abs();
        if importance > 0.0 {
            saliencies.push(TokenSaliency {
                token,
                importance,
                position,
            });
        }
    }

    if eligible == 0 {
        return Err(ExplainError::empty_input(
            "no eligible non-special tokens for attribution",
        ));
    }

    // stable: equal importances keep left-to-right order
    saliencies.sort_by(|a, b| b.importance.total_cmp(&a.importance));

    debug!(
        eligible,
        ranked = saliencies.len(),
        "Computed gradient saliency"
    );
    Ok(saliencies)
}
