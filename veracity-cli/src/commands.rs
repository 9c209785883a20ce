//! CLI subcommand handlers.

use crate::AnalyzeArgs;
use crate::Commands;
use crate::ConfigAction;
use std::fmt::Write as _;
use std::path::Path;
use veracity_core::reference::reference_pair;
use veracity_core::{AnalysisReport, Analyzer, ExplainConfig};

/// Handle a CLI subcommand.
pub fn handle_command(
    command: Commands,
    config: ExplainConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    match command {
        Commands::Analyze(args) => handle_analyze(args, config),
        Commands::Config { action } => handle_config(action, &config, workspace),
    }
}

fn handle_analyze(args: AnalyzeArgs, mut config: ExplainConfig) -> anyhow::Result<()> {
    let text = match (&args.text, &args.file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?,
        (None, None) => anyhow::bail!("Provide the article body with --text or --file"),
    };
    apply_overrides(&mut config, &args);

    let report = run_analysis(&args.title, &text, config)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }
    Ok(())
}

fn apply_overrides(config: &mut ExplainConfig, args: &AnalyzeArgs) {
    if let Some(samples) = args.samples {
        config.uncertainty.sample_count = samples;
    }
    if let Some(threshold) = args.threshold {
        config.phrases.relative_threshold = threshold;
    }
    if args.no_uncertainty {
        config.uncertainty.enabled = false;
    }
    if args.no_attention {
        config.attention.enabled = false;
    }
}

fn run_analysis(title: &str, text: &str, config: ExplainConfig) -> anyhow::Result<AnalysisReport> {
    let (tokenizer, model) = reference_pair();
    let analyzer = Analyzer::new(model, tokenizer, config)
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    analyzer
        .analyze(title, text)
        .map_err(|e| anyhow::anyhow!("Analysis failed: {}", e))
}

/// Human-readable summary of a report.
fn render_report(report: &AnalysisReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Verdict: {} ({:.1}% confidence, credibility {:.2})",
        report.prediction,
        report.confidence * 100.0,
        report.credibility_score
    );
    let _ = writeln!(out, "Risk: {}", report.risk_level.description);

    if let Some(tokens) = &report.top_tokens {
        let _ = writeln!(out, "\nMost influential tokens:");
        for t in tokens.iter().take(10) {
            let _ = writeln!(out, "  {:<20} {:.4}", t.token, t.importance);
        }
    }

    if let Some(phrases) = report.suspicious_phrases.as_ref().filter(|p| !p.is_empty()) {
        let _ = writeln!(out, "\nSuspicious phrases:");
        for phrase in phrases {
            let _ = writeln!(out, "  \"{}\"", phrase);
        }
    }

    if let Some(highlights) = &report.attention_highlights {
        let _ = writeln!(out, "\nAttention:");
        for h in highlights {
            let _ = writeln!(out, "  {:<20} {:.4}", h.token, h.attention_score);
        }
    }

    if let Some(u) = &report.uncertainty {
        let _ = writeln!(
            out,
            "\nUncertainty: entropy {:.3}, std dev {:.4}, {:.0}% interval [{:.3}, {:.3}] over {} samples",
            u.entropy,
            u.std_dev,
            u.confidence_level * 100.0,
            u.confidence_interval[0],
            u.confidence_interval[1],
            u.sample_count
        );
    }

    if !report.key_reasons.is_empty() {
        let _ = writeln!(out, "\nReasons:");
        for reason in &report.key_reasons {
            let _ = writeln!(out, "  - {}", reason);
        }
    }

    if !report.extracted_claims.is_empty() {
        let _ = writeln!(out, "\nClaims to verify:");
        for claim in &report.extracted_claims {
            let _ = writeln!(out, "  - {}", claim);
        }
    }
    out
}

fn handle_config(
    action: ConfigAction,
    config: &ExplainConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".veracity");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&ExplainConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}
