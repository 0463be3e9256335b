use anyhow::{bail, Context, Result};
use bricksmith_core::config::BricksmithConfig;
use bricksmith_core::plan::Plan;
use bricksmith_core::plan_store::PlanStore;
use bricksmith_core::planner::Planner;
use std::path::Path;

use crate::adapter::ClaudeCompletion;

pub async fn run(
    root: &Path,
    module: &str,
    contract: &Path,
    spec: &Path,
    force: bool,
    json: bool,
) -> Result<()> {
    let mut config = BricksmithConfig::load(root).context("failed to load config")?;
    config.layout = config.layout.resolved(root);

    let store = PlanStore::new(config.layout.plans_dir.clone());
    if store.plan_exists(module) && !force {
        bail!("a plan for '{module}' already exists — pass --force to regenerate");
    }

    let contract_text = std::fs::read_to_string(contract)
        .with_context(|| format!("failed to read contract: {}", contract.display()))?;
    let spec_text = std::fs::read_to_string(spec)
        .with_context(|| format!("failed to read spec: {}", spec.display()))?;

    let client = ClaudeCompletion::new(&config.llm);
    let planner = Planner::new(&client, &store, &config.llm, config.layout.module_root.clone());

    let plan = planner
        .generate_plan(module, &contract_text, &spec_text)
        .await
        .with_context(|| format!("plan generation failed for module '{module}'"))?;

    print_plan(&plan, json);
    Ok(())
}

pub fn print_plan(plan: &Plan, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(plan).unwrap_or_else(|_| "{}".to_string())
        );
        return;
    }

    println!("module: {}", plan.module_name);
    println!("created: {}", plan.created_at.to_rfc3339());
    println!("session: {}", plan.generation_session_id);
    println!("bricks:");
    for brick in &plan.bricks {
        println!(
            "  {} → {} ({})",
            brick.name, brick.target_directory, brick.kind
        );
        println!("      {}", brick.description);
    }
}
