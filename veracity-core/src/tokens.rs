//! Special-token handling and sub-word marker cleanup.

use serde::{Deserialize, Serialize};

/// Leading-space marker used by byte-level BPE vocabularies (RoBERTa, GPT-2).
pub const BPE_SPACE_MARKER: char = '\u{0120}';
/// Leading-space marker used by SentencePiece vocabularies.
pub const SENTENCEPIECE_SPACE_MARKER: char = '\u{2581}';
/// Continuation prefix used by WordPiece vocabularies.
pub const WORDPIECE_CONTINUATION: &str = "##";

/// Literal special tokens excluded from attribution and highlighting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialTokens {
    pub bos: String,
    pub eos: String,
    pub pad: String,
    pub unk: String,
}

impl Default for SpecialTokens {
    fn default() -> Self {
        Self {
            bos: "<s>".into(),
            eos: "</s>".into(),
            pad: "<pad>".into(),
            unk: "<unk>".into(),
        }
    }
}

impl SpecialTokens {
    /// BERT-style literals.
    pub fn wordpiece() -> Self {
        Self {
            bos: "[CLS]".into(),
            eos: "[SEP]".into(),
            pad: "[PAD]".into(),
            unk: "[UNK]".into(),
        }
    }

    pub fn contains(&self, token: &str) -> bool {
        token == self.bos || token == self.eos || token == self.pad || token == self.unk
    }
}

/// Strip tokenizer-specific space and continuation markers from a raw token.
pub fn clean_token(raw: &str) -> String {
    let stripped = raw
        .trim_start_matches(BPE_SPACE_MARKER)
        .trim_start_matches(SENTENCEPIECE_SPACE_MARKER);
    let stripped = stripped
        .strip_prefix(WORDPIECE_CONTINUATION)
        .filter(|rest| !rest.is_empty())
        .unwrap_or(stripped);
    stripped.trim().to_string()
}
