use anyhow::{Context, Result};
use bricksmith_core::config::BricksmithConfig;
use bricksmith_core::orchestrator::{Pipeline, PipelineOptions};
use bricksmith_core::report::{PipelineOutcome, PipelineReport};
use bricksmith_core::verifier::SmokeVerifier;
use std::path::Path;

use crate::adapter::ClaudeCompletion;

pub async fn run(
    root: &Path,
    module: &str,
    contract: &Path,
    spec: &Path,
    force: bool,
    refresh_plan: bool,
    json: bool,
) -> Result<bool> {
    let mut config = BricksmithConfig::load(root).context("failed to load config")?;
    config.layout = config.layout.resolved(root);
    warn_config(&config);

    let contract_text = std::fs::read_to_string(contract)
        .with_context(|| format!("failed to read contract: {}", contract.display()))?;
    let spec_text = std::fs::read_to_string(spec)
        .with_context(|| format!("failed to read spec: {}", spec.display()))?;

    let client = ClaudeCompletion::new(&config.llm);
    let verifier = SmokeVerifier::new(config.verify.clone(), config.layout.output_root.clone());
    let pipeline = Pipeline::new(&client, &verifier, &config);

    let options = PipelineOptions {
        force,
        refresh_plan,
        ..Default::default()
    };

    let report = pipeline
        .run(module, &contract_text, &spec_text, &options)
        .await
        .with_context(|| format!("pipeline failed for module '{module}'"))?;

    print_report(&report, json);
    Ok(report.is_full_success())
}

fn warn_config(config: &BricksmithConfig) {
    for warning in config.validate() {
        tracing::warn!("config: {}", warning.message);
    }
}

pub fn print_report(report: &PipelineReport, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
        );
        return;
    }

    println!("module: {}", report.module_name);
    for result in &report.results {
        match result.status {
            bricksmith_core::report::ExecStatus::Success => {
                println!(
                    "  ✓ {} ({} attempt{}, {} file{})",
                    result.brick_name,
                    result.attempts,
                    plural(result.attempts as usize),
                    result.generated_files.len(),
                    plural(result.generated_files.len()),
                );
            }
            bricksmith_core::report::ExecStatus::Failed => {
                println!("  ✗ {} ({} attempts)", result.brick_name, result.attempts);
            }
            bricksmith_core::report::ExecStatus::Skipped => {
                println!("  - {} (skipped)", result.brick_name);
            }
        }
    }

    match report.outcome() {
        PipelineOutcome::FullSuccess => println!("\nall bricks succeeded"),
        PipelineOutcome::PartialFailure => {
            eprintln!("\npartial failure:");
            print_failures(report);
        }
        PipelineOutcome::NothingProduced => {
            eprintln!("\nnothing produced:");
            print_failures(report);
        }
    }
}

fn print_failures(report: &PipelineReport) {
    for failed in report.failed() {
        eprintln!(
            "  {}: {}",
            failed.brick_name,
            failed.error_summary.as_deref().unwrap_or("<no diagnostic>")
        );
    }
    for skipped in report.skipped() {
        eprintln!(
            "  {}: {}",
            skipped.brick_name,
            skipped.error_summary.as_deref().unwrap_or("skipped")
        );
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
