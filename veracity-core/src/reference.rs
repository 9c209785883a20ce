//! Reference collaborators: a whitespace/punctuation tokenizer and a lexicon
//! classifier with an analytic input gradient, synthetic attention and
//! inverted dropout.
//!
//! They implement every optional capability without an ML runtime, which is
//! what the CLI and the integration tests run against.

use crate::error::{ExplainError, Result};
use crate::model::{
    Capabilities, Classifier, Encoding, GradientOutput, InferenceOutput, LayerAttention, Tokenizer,
};
use crate::tokens::{BPE_SPACE_MARKER, SpecialTokens, clean_token};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, RwLock};

static WORD_OR_PUNCT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[\w']+|[^\w\s]").ok());

const BOS_ID: u32 = 0;
const PAD_ID: u32 = 1;
const EOS_ID: u32 = 2;
const UNK_ID: u32 = 3;

/// Vocabulary size bound, RoBERTa-sized.
pub const DEFAULT_VOCAB_CAPACITY: usize = 50_265;

#[derive(Debug)]
struct Vocab {
    ids: HashMap<String, u32>,
    tokens: Vec<String>,
    capacity: usize,
}

impl Vocab {
    fn with_specials(specials: &SpecialTokens, capacity: usize) -> Self {
        let mut vocab = Self {
            ids: HashMap::new(),
            tokens: Vec::new(),
            capacity: usize::MAX,
        };
        // RoBERTa layout: <s>=0, <pad>=1, </s>=2, <unk>=3
        for token in [&specials.bos, &specials.pad, &specials.eos, &specials.unk] {
            vocab.intern(token);
        }
        vocab.capacity = capacity.max(vocab.tokens.len());
        vocab
    }

    /// Id for `token`, adding it while there is room; `<unk>` once full.
    fn intern(&mut self, token: &str) -> u32 {
        if let Some(&id) = self.ids.get(token) {
            return id;
        }
        if self.tokens.len() >= self.capacity {
            return UNK_ID;
        }
        let id = self.tokens.len() as u32;
        self.ids.insert(token.to_string(), id);
        self.tokens.push(token.to_string());
        id
    }
}

/// Splits text into words and punctuation, marking word-initial tokens with
/// the byte-level BPE space marker. The vocabulary grows as text is encoded,
/// up to a fixed capacity; later unseen tokens encode as `<unk>`.
#[derive(Debug)]
pub struct WhitespaceTokenizer {
    vocab: RwLock<Vocab>,
    specials: SpecialTokens,
    max_length: Option<usize>,
}

impl Default for WhitespaceTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl WhitespaceTokenizer {
    pub fn new() -> Self {
        let specials = SpecialTokens::default();
        Self {
            vocab: RwLock::new(Vocab::with_specials(&specials, DEFAULT_VOCAB_CAPACITY)),
            specials,
            max_length: None,
        }
    }

    /// Bound the vocabulary to `capacity` entries, special tokens included.
    pub fn with_vocab_capacity(self, capacity: usize) -> Self {
        Self {
            vocab: RwLock::new(Vocab::with_specials(&self.specials, capacity)),
            ..self
        }
    }

    /// Number of interned tokens, special tokens included.
    pub fn vocab_len(&self) -> usize {
        self.vocab
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .tokens
            .len()
    }

    /// Truncate or pad every encoding to exactly `max_length` positions.
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length.max(2));
        self
    }

    /// Token string for an id, if the id is known.
    pub fn token(&self, id: u32) -> Option<String> {
        self.vocab
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .tokens
            .get(id as usize)
            .cloned()
    }

    fn split(text: &str) -> Vec<String> {
        let Some(re) = WORD_OR_PUNCT.as_ref() else {
            return Vec::new();
        };
        let mut pieces = Vec::new();
        for m in re.find_iter(text) {
            let spaced = text[..m.start()]
                .chars()
                .next_back()
                .is_some_and(char::is_whitespace);
            if spaced && !pieces.is_empty() {
                pieces.push(format!("{BPE_SPACE_MARKER}{}", m.as_str()));
            } else {
                pieces.push(m.as_str().to_string());
            }
        }
        pieces
    }
}

impl Tokenizer for WhitespaceTokenizer {
    fn encode(&self, text: &str) -> Result<Encoding> {
        let mut pieces = Self::split(text);
        if let Some(max) = self.max_length {
            pieces.truncate(max - 2);
        }

        let mut vocab = self
            .vocab
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut token_ids = Vec::with_capacity(pieces.len() + 2);
        token_ids.push(BOS_ID);
        token_ids.extend(pieces.iter().map(|p| vocab.intern(p)));
        token_ids.push(EOS_ID);
        drop(vocab);

        let mut attention_mask = vec![1u8; token_ids.len()];
        if let Some(max) = self.max_length {
            let padding = max.saturating_sub(token_ids.len());
            token_ids.extend(std::iter::repeat_n(PAD_ID, padding));
            attention_mask.extend(std::iter::repeat_n(0u8, padding));
        }

        Ok(Encoding {
            token_ids,
            attention_mask,
        })
    }

    fn ids_to_tokens(&self, token_ids: &[u32]) -> Vec<String> {
        let vocab = self
            .vocab
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        token_ids
            .iter()
            .map(|&id| {
                vocab
                    .tokens
                    .get(id as usize)
                    .unwrap_or(&vocab.tokens[UNK_ID as usize])
                    .clone()
            })
            .collect()
    }

    fn special_tokens(&self) -> SpecialTokens {
        self.specials.clone()
    }
}

/// Default fake-leaning (positive) and credible-leaning (negative) weights.
pub fn default_lexicon() -> HashMap<String, f32> {
    [
        ("shocking", 2.0),
        ("shock", 1.6),
        ("breaking", 1.2),
        ("miracle", 2.2),
        ("cure", 1.4),
        ("secret", 1.6),
        ("exposed", 1.5),
        ("hoax", 2.0),
        ("conspiracy", 2.0),
        ("unbelievable", 1.8),
        ("banned", 1.3),
        ("hidden", 1.2),
        ("truth", 0.9),
        ("they", 0.4),
        ("won't", 0.8),
        ("!", 0.9),
        ("according", -1.2),
        ("officials", -1.0),
        ("reported", -0.9),
        ("said", -0.7),
        ("study", -0.6),
        ("published", -0.9),
        ("data", -0.6),
        ("percent", -0.4),
        ("university", -0.8),
        ("researchers", -0.8),
    ]
    .into_iter()
    .map(|(w, s)| (w.to_string(), s))
    .collect()
}

/// Two-class (real, fake) linear lexicon model over gated token weights.
///
/// `fake_logit = bias + sum_i g_i * w_i * m_i / sqrt(n)` with every gate
/// `g_i = 1`, `real_logit = -fake_logit`. The input gradient is taken with
/// respect to the gates.
pub struct LexiconClassifier {
    tokenizer: Arc<WhitespaceTokenizer>,
    lexicon: HashMap<String, f32>,
    bias: f32,
    dropout: f64,
    stochastic: bool,
    rng: Mutex<StdRng>,
    capabilities: Capabilities,
}

impl LexiconClassifier {
    pub fn new(tokenizer: Arc<WhitespaceTokenizer>) -> Self {
        Self {
            tokenizer,
            lexicon: default_lexicon(),
            bias: 0.0,
            dropout: 0.3,
            stochastic: false,
            rng: Mutex::new(StdRng::seed_from_u64(0x5eed)),
            capabilities: Capabilities::all(),
        }
    }

    pub fn with_lexicon(mut self, lexicon: HashMap<String, f32>) -> Self {
        self.lexicon = lexicon
            .into_iter()
            .map(|(w, s)| (w.to_lowercase(), s))
            .collect();
        self
    }

    pub fn with_bias(mut self, bias: f32) -> Self {
        self.bias = bias;
        self
    }

    /// Dropout rate used in stochastic mode, clamped to `[0, 0.95]`.
    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout.clamp(0.0, 0.95);
        self
    }

    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    /// Advertise a subset of capabilities; unadvertised ones behave as
    /// unsupported.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    fn weights(&self, token_ids: &[u32]) -> Vec<f32> {
        let specials = self.tokenizer.special_tokens();
        self.tokenizer
            .ids_to_tokens(token_ids)
            .iter()
            .map(|raw| {
                if specials.contains(raw) {
                    return 0.0;
                }
                self.lexicon
                    .get(&clean_token(raw).to_lowercase())
                    .copied()
                    .unwrap_or(0.0)
            })
            .collect()
    }

    fn check_lengths(token_ids: &[u32], attention_mask: &[u8]) -> Result<()> {
        if token_ids.len() != attention_mask.len() {
            return Err(ExplainError::shape(
                format!("{} mask entries", token_ids.len()),
                attention_mask.len(),
            ));
        }
        Ok(())
    }

    fn norm(attention_mask: &[u8]) -> f32 {
        let active = attention_mask.iter().filter(|&&m| m != 0).count().max(1);
        (active as f32).sqrt()
    }

    /// Per-position inverted-dropout keep factors (all 1.0 when deterministic).
    fn keep_factors(&self, len: usize) -> Vec<f32> {
        if !self.stochastic || self.dropout == 0.0 {
            return vec![1.0; len];
        }
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let scale = (1.0 / (1.0 - self.dropout)) as f32;
        (0..len)
            .map(|_| {
                if rng.gen_bool(self.dropout) {
                    0.0
                } else {
                    scale
                }
            })
            .collect()
    }

    fn attention(weights: &[f32], attention_mask: &[u8]) -> Vec<LayerAttention> {
        let n = weights.len();
        let logits: Vec<f32> = weights.iter().map(|w| 2.0 * w.abs()).collect();
        let max = logits
            .iter()
            .zip(attention_mask)
            .filter(|&(_, &m)| m != 0)
            .map(|(&l, _)| l)
            .fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = logits
            .iter()
            .zip(attention_mask)
            .map(|(&l, &m)| if m != 0 { (l - max).exp() } else { 0.0 })
            .collect();
        let total: f32 = exps.iter().sum();
        let active = attention_mask.iter().filter(|&&m| m != 0).count().max(1) as f32;

        let lexical: Vec<f32> = if total > 0.0 {
            exps.iter().map(|e| e / total).collect()
        } else {
            vec![0.0; n]
        };
        let uniform: Vec<f32> = attention_mask
            .iter()
            .map(|&m| if m != 0 { 1.0 / active } else { 0.0 })
            .collect();

        let layer = LayerAttention::new(vec![vec![lexical; n], vec![uniform; n]]);
        vec![layer]
    }
}

impl Classifier for LexiconClassifier {
    fn num_classes(&self) -> usize {
        2
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn infer(&self, token_ids: &[u32], attention_mask: &[u8]) -> Result<InferenceOutput> {
        Self::check_lengths(token_ids, attention_mask)?;
        let weights = self.weights(token_ids);
        let keep = self.keep_factors(weights.len());
        let norm = Self::norm(attention_mask);

        let contribution: f32 = weights
            .iter()
            .zip(attention_mask)
            .zip(&keep)
            .map(|((&w, &m), &k)| w * f32::from(m) * k)
            .sum();
        let fake_logit = self.bias + contribution / norm;

        let peak = weights.iter().fold(0.0_f32, |acc, w| acc.max(w.abs()));
        let attentions = self
            .capabilities
            .supports_attention_output
            .then(|| Self::attention(&weights, attention_mask));

        Ok(InferenceOutput {
            scores: vec![-fake_logit, fake_logit],
            pooled: vec![contribution / norm, peak],
            attentions,
        })
    }

    fn infer_with_gradient(
        &self,
        token_ids: &[u32],
        attention_mask: &[u8],
        target_class: usize,
    ) -> Result<GradientOutput> {
        if !self.capabilities.supports_gradient {
            return Err(ExplainError::attribution("gradient path disabled"));
        }
        if target_class >= 2 {
            return Err(ExplainError::invalid_input(format!(
                "target class {target_class} out of range"
            )));
        }
        let output = self.infer(token_ids, attention_mask)?;
        let weights = self.weights(token_ids);
        let norm = Self::norm(attention_mask);
        let sign = if target_class == 1 { 1.0 } else { -1.0 };

        let input_gradient = weights
            .iter()
            .zip(attention_mask)
            .map(|(&w, &m)| sign * w * f32::from(m) / norm)
            .collect();

        Ok(GradientOutput {
            scores: output.scores,
            input_gradient,
        })
    }

    fn set_stochastic_mode(&mut self, enabled: bool) -> Result<()> {
        if enabled && !self.capabilities.supports_stochastic_resampling {
            return Err(ExplainError::uncertainty("dropout resampling disabled"));
        }
        self.stochastic = enabled;
        Ok(())
    }

    fn is_stochastic(&self) -> bool {
        self.stochastic
    }
}

/// Build a tokenizer/classifier pair sharing one vocabulary.
pub fn reference_pair() -> (Arc<WhitespaceTokenizer>, LexiconClassifier) {
    let tokenizer = Arc::new(WhitespaceTokenizer::new());
    let model = LexiconClassifier::new(Arc::clone(&tokenizer));
    (tokenizer, model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_marks_spaces_and_wraps() {
        let tok = WhitespaceTokenizer::new();
        let enc = tok.encode("The sky is green!").unwrap();
        let tokens = tok.ids_to_tokens(&enc.token_ids);
        assert_eq!(
            tokens,
            vec!["<s>", "The", "\u{0120}sky", "\u{0120}is", "\u{0120}green", "!", "</s>"]
        );
        assert!(enc.attention_mask.iter().all(|&m| m == 1));
    }

    #[test]
    fn test_encode_pads_and_truncates() {
        let tok = WhitespaceTokenizer::new().with_max_length(6);
        let short = tok.encode("one two").unwrap();
        assert_eq!(short.len(), 6);
        assert_eq!(short.attention_mask, vec![1, 1, 1, 1, 0, 0]);
        assert_eq!(tok.token(short.token_ids[5]).as_deref(), Some("<pad>"));

        let long = tok.encode("a b c d e f g h").unwrap();
        assert_eq!(long.len(), 6);
        assert_eq!(tok.token(long.token_ids[5]).as_deref(), Some("</s>"));
    }

    #[test]
    fn test_ids_are_stable() {
        let tok = WhitespaceTokenizer::new();
        let a = tok.encode("hoax hoax").unwrap();
        let b = tok.encode("hoax").unwrap();
        assert_eq!(a.token_ids[1], b.token_ids[1]);
        assert_eq!(tok.ids_to_tokens(&[999]), vec!["<unk>"]);
    }

    #[test]
    fn test_vocab_is_bounded() {
        let tok = WhitespaceTokenizer::new().with_vocab_capacity(6);
        let enc = tok.encode("alpha beta gamma").unwrap();
        assert_eq!(
            tok.ids_to_tokens(&enc.token_ids),
            vec!["<s>", "alpha", "\u{0120}beta", "<unk>", "</s>"]
        );

        let again = tok.encode("delta alpha").unwrap();
        assert_eq!(again.token_ids[1], UNK_ID);
        assert_eq!(again.token_ids[2], UNK_ID);
        assert_eq!(tok.vocab_len(), 6);
    }

    #[test]
    fn test_gradient_matches_lexicon() {
        let (tok, model) = reference_pair();
        let enc = tok.encode("shocking news according to officials").unwrap();
        let grad = model
            .infer_with_gradient(&enc.token_ids, &enc.attention_mask, 1)
            .unwrap();
        assert_eq!(grad.input_gradient.len(), enc.len());
        assert!(grad.input_gradient[1] > 0.0); // shocking
        assert_eq!(grad.input_gradient[2], 0.0); // news
        assert!(grad.input_gradient[3] < 0.0); // according
        assert_eq!(grad.input_gradient[0], 0.0); // <s>
    }

    #[test]
    fn test_deterministic_inference_is_repeatable() {
        let (tok, model) = reference_pair();
        let enc = tok.encode("miracle cure exposed").unwrap();
        let a = model.infer(&enc.token_ids, &enc.attention_mask).unwrap();
        let b = model.infer(&enc.token_ids, &enc.attention_mask).unwrap();
        assert_eq!(a.scores, b.scores);
        assert!(a.scores[1] > a.scores[0]);
    }

    #[test]
    fn test_stochastic_mode_varies_output() {
        let (tok, mut model) = reference_pair();
        let enc = tok.encode("miracle cure exposed by secret hoax").unwrap();
        model.set_stochastic_mode(true).unwrap();
        let outputs: Vec<f32> = (0..20)
            .map(|_| model.infer(&enc.token_ids, &enc.attention_mask).unwrap().scores[1])
            .collect();
        assert!(outputs.iter().any(|&s| (s - outputs[0]).abs() > 1e-6));
        model.set_stochastic_mode(false).unwrap();
        assert!(!model.is_stochastic());
    }

    #[test]
    fn test_attention_rows_are_normalized() {
        let (tok, model) = reference_pair();
        let enc = tok.encode("secret truth revealed").unwrap();
        let out = model.infer(&enc.token_ids, &enc.attention_mask).unwrap();
        let layers = out.attentions.unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].num_heads(), 2);
        for head in &layers[0].heads {
            let total: f32 = head[0].iter().sum();
            assert!((total - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_disabled_capabilities() {
        let (tok, model) = reference_pair();
        let mut model = model.with_capabilities(Capabilities::none());
        let enc = tok.encode("hoax").unwrap();
        assert!(model.infer(&enc.token_ids, &enc.attention_mask).unwrap().attentions.is_none());
        assert!(model.infer_with_gradient(&enc.token_ids, &enc.attention_mask, 1).is_err());
        assert!(model.set_stochastic_mode(true).is_err());
    }
}
