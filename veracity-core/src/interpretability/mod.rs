//! Interpretability: gradient saliency, phrases, attention, rationale.

pub mod attention;
pub mod attribution;
pub mod phrases;
pub mod rationale;

pub use attention::{AttentionAnalyzer, AttentionHighlight, summarize_attention};
pub use attribution::{TokenSaliency, attribute};
pub use phrases::{PhraseExtractor, extract_phrases};
pub use rationale::{RationaleSynthesizer, Reason, ReasonKind, synthesize};
