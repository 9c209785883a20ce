//! Configuration system for veracity.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> explicit file -> environment -> overrides.
//! Configuration is loaded from `~/.config/veracity/config.toml` and/or
//! `.veracity/config.toml` in the workspace directory.

use crate::error::ExplainError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for an explanation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExplainConfig {
    /// Gradient attribution settings.
    #[serde(default)]
    pub attribution: AttributionConfig,
    /// Suspicious phrase extraction settings.
    #[serde(default)]
    pub phrases: PhraseConfig,
    /// Attention summary settings.
    #[serde(default)]
    pub attention: AttentionConfig,
    /// Dropout resampling settings.
    #[serde(default)]
    pub uncertainty: UncertaintyConfig,
    /// Rationale wording settings.
    #[serde(default)]
    pub rationale: RationaleConfig,
    /// Log output settings (used by the CLI).
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Gradient attribution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionConfig {
    /// Enable gradient saliency when the model supports it.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Number of tokens reported in the analysis report.
    #[serde(default = "default_top_tokens")]
    pub top_tokens: usize,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_tokens: default_top_tokens(),
        }
    }
}

fn default_top_tokens() -> usize {
    20
}

/// Suspicious phrase extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhraseConfig {
    /// Fraction of the maximum importance a token must reach (0.0-1.0].
    #[serde(default = "default_relative_threshold")]
    pub relative_threshold: f64,
    /// Maximum number of phrases returned.
    #[serde(default = "default_max_phrases")]
    pub max_phrases: usize,
}

impl Default for PhraseConfig {
    fn default() -> Self {
        Self {
            relative_threshold: default_relative_threshold(),
            max_phrases: default_max_phrases(),
        }
    }
}

fn default_relative_threshold() -> f64 {
    0.5
}

fn default_max_phrases() -> usize {
    5
}

/// Attention summary settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttentionConfig {
    /// Summarize attention when the model exposes it.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Number of highlighted tokens.
    #[serde(default = "default_attention_top_k")]
    pub top_k: usize,
}

impl Default for AttentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: default_attention_top_k(),
        }
    }
}

fn default_attention_top_k() -> usize {
    10
}

/// Dropout resampling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UncertaintyConfig {
    /// Run stochastic resampling when the model supports it.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Number of stochastic forward passes.
    #[serde(default = "default_sample_count")]
    pub sample_count: usize,
    /// Probability floor applied before taking logarithms.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Two-sided confidence level of the reported interval (0.0-1.0).
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
    /// Class whose probability spread is reported in a binary setup.
    #[serde(default = "default_positive_class")]
    pub positive_class: usize,
}

impl Default for UncertaintyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_count: default_sample_count(),
            epsilon: default_epsilon(),
            confidence_level: default_confidence_level(),
            positive_class: default_positive_class(),
        }
    }
}

fn default_sample_count() -> usize {
    20
}

fn default_epsilon() -> f64 {
    1e-10
}

fn default_confidence_level() -> f64 {
    0.95
}

fn default_positive_class() -> usize {
    1
}

/// Rationale wording settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RationaleConfig {
    /// Number of suspicious phrases quoted in the phrase reason.
    #[serde(default = "default_max_quoted")]
    pub max_quoted_phrases: usize,
}

impl Default for RationaleConfig {
    fn default() -> Self {
        Self {
            max_quoted_phrases: default_max_quoted(),
        }
    }
}

fn default_max_quoted() -> usize {
    3
}

/// Log output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for the daily-rotated JSON log file. When unset the CLI
    /// writes to `logs/` under the platform data directory.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl ExplainConfig {
    /// Reject values outside the ranges the numeric stages can handle.
    pub fn validate(&self) -> Result<(), ExplainError> {
        let threshold = self.phrases.relative_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ExplainError::config(format!(
                "phrases.relative_threshold must be in (0, 1], got {threshold}"
            )));
        }
        if self.phrases.max_phrases == 0 {
            return Err(ExplainError::config("phrases.max_phrases must be >= 1"));
        }
        if self.attribution.top_tokens == 0 {
            return Err(ExplainError::config("attribution.top_tokens must be >= 1"));
        }
        if self.attention.top_k == 0 {
            return Err(ExplainError::config("attention.top_k must be >= 1"));
        }
        if self.uncertainty.sample_count == 0 {
            return Err(ExplainError::config(
                "uncertainty.sample_count must be >= 1",
            ));
        }
        let eps = self.uncertainty.epsilon;
        if !(eps > 0.0 && eps < 1.0) {
            return Err(ExplainError::config(format!(
                "uncertainty.epsilon must be in (0, 1), got {eps}"
            )));
        }
        let level = self.uncertainty.confidence_level;
        if !(level > 0.0 && level < 1.0) {
            return Err(ExplainError::config(format!(
                "uncertainty.confidence_level must be in (0, 1), got {level}"
            )));
        }
        Ok(())
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `VERACITY_`)
/// 3. Explicit config file (`--config`)
/// 4. Workspace-local config (`.veracity/config.toml`)
/// 5. User config (`~/.config/veracity/config.toml`)
/// 6. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
    overrides: Option<&ExplainConfig>,
) -> Result<ExplainConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(ExplainConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "veracity", "veracity") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".veracity").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }

    // VERACITY_UNCERTAINTY__SAMPLE_COUNT, VERACITY_PHRASES__RELATIVE_THRESHOLD, etc.
    figment = figment.merge(Env::prefixed("VERACITY_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}
