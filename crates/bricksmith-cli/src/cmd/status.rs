use anyhow::{Context, Result};
use bricksmith_core::config::BricksmithConfig;
use bricksmith_core::plan_store::PlanStore;
use std::path::Path;

use crate::cmd::plan::print_plan;

pub fn run(
    root: &Path,
    module: &str,
    contract: Option<&Path>,
    spec: Option<&Path>,
    json: bool,
) -> Result<()> {
    let mut config = BricksmithConfig::load(root).context("failed to load config")?;
    config.layout = config.layout.resolved(root);

    let store = PlanStore::new(config.layout.plans_dir.clone());
    let plan = store
        .load_plan(module)
        .with_context(|| format!("no usable plan for module '{module}'"))?;

    print_plan(&plan, json);

    // Staleness check when the current inputs are supplied
    if let (Some(contract), Some(spec)) = (contract, spec) {
        let contract_text = std::fs::read_to_string(contract)
            .with_context(|| format!("failed to read contract: {}", contract.display()))?;
        let spec_text = std::fs::read_to_string(spec)
            .with_context(|| format!("failed to read spec: {}", spec.display()))?;
        if plan.matches_inputs(&contract_text, &spec_text) {
            println!("\nplan is current with the given contract and spec");
        } else {
            println!("\nplan is STALE: contract/spec content has changed since generation");
        }
    }

    Ok(())
}
