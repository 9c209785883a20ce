//! Attention extraction and analysis.

use crate::error::{ExplainError, Result};
use crate::model::{LayerAttention, Tokenizer};
use crate::tokens::clean_token;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default number of highlighted tokens.
pub const DEFAULT_TOP_K: usize = 10;

/// A token that the classification position attends to strongly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionHighlight {
    pub token: String,
    /// Head-averaged attention weight from the classification position.
    pub attention_score: f64,
    pub position: usize,
}

/// Summarizes the last encoder layer's attention from the classification
/// position (row 0).
#[derive(Debug, Clone, Copy)]
pub struct AttentionAnalyzer {
    pub top_k: usize,
}

impl Default for AttentionAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_K)
    }
}

impl AttentionAnalyzer {
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    /// Rank the tokens attended to by position 0 in the last layer.
    ///
    /// Position 0 itself and special tokens are never highlighted. Ties keep
    /// sequence order.
    pub fn summarize<T: Tokenizer + ?Sized>(
        &self,
        attentions: &[LayerAttention],
        token_ids: &[u32],
        tokenizer: &T,
    ) -> Result<Vec<AttentionHighlight>> {
        let last = attentions
            .last()
            .ok_or_else(|| ExplainError::attention("model returned no attention layers"))?;
        let row = cls_attention_row(last, token_ids.len())?;

        let tokens = tokenizer.ids_to_tokens(token_ids);
        if tokens.len() != row.len() {
            return Err(ExplainError::shape(
                format!("{} token strings", row.len()),
                tokens.len(),
            ));
        }
        let specials = tokenizer.special_tokens();
        let mut highlights: Vec<AttentionHighlight> = row
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(pos, _)| !specials.contains(&tokens[*pos]))
            .filter_map(|(pos, &score)| {
                let token = clean_token(&tokens[pos]);
                (!token.is_empty()).then(|| AttentionHighlight {
                    token,
                    attention_score: score.clamp(0.0, 1.0),
                    position: pos,
                })
            })
            .collect();

        highlights.sort_by(|a, b| b.attention_score.total_cmp(&a.attention_score));
        highlights.truncate(self.top_k);

        debug!(
            layers = attentions.len(),
            heads = last.num_heads(),
            highlighted = highlights.len(),
            "Summarized attention"
        );
        Ok(highlights)
    }
}

/// Head-averaged attention row of position 0, validated against `seq_len`.
pub fn cls_attention_row(layer: &LayerAttention, seq_len: usize) -> Result<Vec<f64>> {
    if layer.heads.is_empty() {
        return Err(ExplainError::attention("attention layer has no heads"));
    }
    if seq_len == 0 {
        return Err(ExplainError::empty_input("no tokens to attend over"));
    }

    let mut row = vec![0.0_f64; seq_len];
    for (h, head) in layer.heads.iter().enumerate() {
        if head.len() != seq_len {
            return Err(ExplainError::shape(
                format!("{seq_len} rows in head {h}"),
                head.len(),
            ));
        }
        let first = &head[0];
        if first.len() != seq_len {
            return Err(ExplainError::shape(
                format!("{seq_len} columns in head {h}"),
                first.len(),
            ));
        }
        for (acc, &w) in row.iter_mut().zip(first) {
            if !w.is_finite() {
                return Err(ExplainError::attention(format!(
                    "non-finite attention weight in head {h}"
                )));
            }
            *acc += w as f64;
        }
    }

    let heads = layer.heads.len() as f64;
    row.iter_mut().for_each(|v| *v /= heads);
    Ok(row)
}

/// Summarize with the default top-k.
pub fn summarize_attention<T: Tokenizer + ?Sized>(
    attentions: &[LayerAttention],
    token_ids: &[u32],
    tokenizer: &T,
) -> Result<Vec<AttentionHighlight>> {
    AttentionAnalyzer::default().summarize(attentions, token_ids, tokenizer)
}
