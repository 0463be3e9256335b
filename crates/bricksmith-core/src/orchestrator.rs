use crate::client::CompletionClient;
use crate::config::BricksmithConfig;
use crate::error::{BricksmithError, Result};
use crate::executor::BrickExecutor;
use crate::io::read_nonempty;
use crate::paths;
use crate::plan::Plan;
use crate::plan_store::PlanStore;
use crate::planner::Planner;
use crate::report::{ExecutionResult, PipelineReport};
use crate::resolver::SpecResolver;
use crate::verifier::BrickVerifier;

// ---------------------------------------------------------------------------
// PipelineOptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Regenerate the plan even if a stored one exists.
    pub force: bool,
    /// Delete the stored plan before running.
    pub refresh_plan: bool,
    /// Bound on nested generator invocations. A run at `depth >= max_depth`
    /// is refused rather than guessed at.
    pub max_depth: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            force: false,
            refresh_plan: false,
            max_depth: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Walks a module's plan brick-by-brick: resolve specs → execute → verify,
/// halting on the first terminal brick failure and recording every
/// remaining brick as skipped. Pure coordination — the pipeline itself
/// performs no LLM calls.
///
/// `config.layout` paths must already be resolved against the project root.
pub struct Pipeline<'a> {
    client: &'a dyn CompletionClient,
    verifier: &'a dyn BrickVerifier,
    config: &'a BricksmithConfig,
    store: PlanStore,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        client: &'a dyn CompletionClient,
        verifier: &'a dyn BrickVerifier,
        config: &'a BricksmithConfig,
    ) -> Self {
        let store = PlanStore::new(config.layout.plans_dir.clone());
        Self {
            client,
            verifier,
            config,
            store,
        }
    }

    pub async fn run(
        &self,
        module_name: &str,
        contract_text: &str,
        spec_text: &str,
        options: &PipelineOptions,
    ) -> Result<PipelineReport> {
        self.run_at_depth(module_name, contract_text, spec_text, options, 0)
            .await
    }

    /// Entry point for nested generator invocations. Refuses to recurse past
    /// `options.max_depth`.
    pub async fn run_at_depth(
        &self,
        module_name: &str,
        contract_text: &str,
        spec_text: &str,
        options: &PipelineOptions,
        depth: u32,
    ) -> Result<PipelineReport> {
        if depth >= options.max_depth {
            return Err(BricksmithError::MaxDepthExceeded(options.max_depth));
        }
        paths::validate_module_name(module_name)?;

        let run_id = uuid::Uuid::new_v4();
        tracing::info!(%run_id, module = module_name, depth, "pipeline run starting");

        let plan = self
            .load_or_generate_plan(module_name, contract_text, spec_text, options)
            .await?;

        let resolver = SpecResolver::new(self.client, &self.config.llm);
        let executor = BrickExecutor::new(
            self.client,
            self.verifier,
            &self.config.llm,
            self.config.layout.output_root.clone(),
        );

        let mut results = Vec::with_capacity(plan.bricks.len());
        let mut halted_on: Option<String> = None;

        for brick in &plan.bricks {
            // Bricks after a terminal failure may depend on it (dependency =
            // earlier in list order), so they are skipped, never omitted.
            if let Some(failed) = &halted_on {
                results.push(ExecutionResult::skipped(
                    &brick.name,
                    format!("skipped: brick '{failed}' failed earlier in the plan"),
                ));
                continue;
            }

            tracing::info!(module = module_name, brick = %brick.name, "processing brick");

            let (contract_path, spec_path) = match resolver.resolve_brick_specs(brick).await {
                Ok(paths) => paths,
                Err(e @ BricksmithError::SpecSynthesis { .. }) => {
                    results.push(ExecutionResult::failed(&brick.name, 0, e.to_string()));
                    halted_on = Some(brick.name.clone());
                    continue;
                }
                Err(e) => return Err(e),
            };

            let Some(brick_contract) = read_nonempty(&contract_path) else {
                results.push(ExecutionResult::failed(
                    &brick.name,
                    0,
                    format!("contract unreadable after resolution: {}", contract_path.display()),
                ));
                halted_on = Some(brick.name.clone());
                continue;
            };
            let Some(brick_spec) = read_nonempty(&spec_path) else {
                results.push(ExecutionResult::failed(
                    &brick.name,
                    0,
                    format!("spec unreadable after resolution: {}", spec_path.display()),
                ));
                halted_on = Some(brick.name.clone());
                continue;
            };

            let result = executor
                .execute_brick(brick, &brick_contract, &brick_spec)
                .await?;

            if result.status == crate::report::ExecStatus::Failed {
                halted_on = Some(brick.name.clone());
            }
            results.push(result);
        }

        Ok(PipelineReport::new(module_name, results))
    }

    async fn load_or_generate_plan(
        &self,
        module_name: &str,
        contract_text: &str,
        spec_text: &str,
        options: &PipelineOptions,
    ) -> Result<Plan> {
        if options.refresh_plan {
            self.store.delete_plan(module_name)?;
        }

        if !options.force && self.store.plan_exists(module_name) {
            let plan = self.store.load_plan(module_name)?;
            if !plan.matches_inputs(contract_text, spec_text) {
                tracing::warn!(
                    module = module_name,
                    "stored plan was generated from different contract/spec content \
                     — pass --force to regenerate"
                );
            }
            return Ok(plan);
        }

        let planner = Planner::new(
            self.client,
            &self.store,
            &self.config.llm,
            self.config.layout.module_root.clone(),
        );
        planner
            .generate_plan(module_name, contract_text, spec_text)
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
