use crate::client::{CompletionClient, Prompt};
use crate::config::LlmConfig;
use crate::error::{BricksmithError, Result};
use crate::extract::{extract_structured_payload, isolate_untrusted_content};
use crate::paths;
use crate::plan::Plan;
use crate::plan_store::PlanStore;
use crate::retry::{retry_with_feedback, AttemptError, BackoffPolicy, RetryContext};
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Produces a module's decomposition plan via one LLM round-trip, validated
/// against the plan schema, and persists it through the plan store.
pub struct Planner<'a> {
    client: &'a dyn CompletionClient,
    store: &'a PlanStore,
    llm: &'a LlmConfig,
    module_root: PathBuf,
}

impl<'a> Planner<'a> {
    pub fn new(
        client: &'a dyn CompletionClient,
        store: &'a PlanStore,
        llm: &'a LlmConfig,
        module_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            store,
            llm,
            module_root: module_root.into(),
        }
    }

    /// Generate, validate, and persist a plan for `module_name`.
    ///
    /// Parse failures and schema violations are treated identically: the
    /// diagnostic becomes corrective feedback for the next attempt. After
    /// retry exhaustion this fails with [`BricksmithError::PlanGeneration`] —
    /// it never substitutes a default or empty plan.
    pub async fn generate_plan(
        &self,
        module_name: &str,
        contract_text: &str,
        spec_text: &str,
    ) -> Result<Plan> {
        paths::validate_module_name(module_name)?;

        let backoff = BackoffPolicy {
            initial: std::time::Duration::from_millis(self.llm.backoff_initial_ms),
            multiplier: self.llm.backoff_multiplier,
            cap: std::time::Duration::from_millis(self.llm.backoff_cap_ms),
        };

        let result = retry_with_feedback(
            |ctx| self.attempt(module_name, contract_text, spec_text, ctx),
            self.llm.plan_max_attempts,
            &backoff,
        )
        .await;

        let plan = match result {
            Ok(plan) => plan,
            Err(BricksmithError::RetryExhausted { attempts, history }) => {
                return Err(BricksmithError::PlanGeneration {
                    module: module_name.to_string(),
                    reason: format!(
                        "exhausted {attempts} attempts; last error: {}",
                        history.last().map(String::as_str).unwrap_or("<none>")
                    ),
                });
            }
            Err(e) => return Err(e),
        };

        self.store.save_plan(&plan)?;
        tracing::info!(
            module = module_name,
            bricks = plan.bricks.len(),
            session = %plan.generation_session_id,
            "plan generated"
        );
        Ok(plan)
    }

    async fn attempt(
        &self,
        module_name: &str,
        contract_text: &str,
        spec_text: &str,
        ctx: RetryContext,
    ) -> std::result::Result<Plan, AttemptError> {
        let prompt = Prompt::new(build_prompt(module_name, contract_text, spec_text, &ctx))
            .with_system(PLANNER_SYSTEM_PROMPT.to_string());

        let completion = match self.client.complete(&prompt).await {
            Ok(c) => c,
            Err(BricksmithError::Io(e)) => return Err(AttemptError::Fatal(e.into())),
            Err(e) => return Err(AttemptError::retryable(format!("completion failed: {e}"))),
        };

        let payload = extract_structured_payload(&completion.text)
            .map_err(|e| AttemptError::retryable(e.to_string()))?;

        Plan::from_payload(
            &payload,
            module_name,
            &completion.session_id,
            &self.module_root,
            contract_text,
            spec_text,
        )
        .map_err(|e| match e {
            BricksmithError::PlanInvalid { reason, .. } => AttemptError::retryable(reason),
            other => AttemptError::Fatal(other),
        })
    }
}

// ---------------------------------------------------------------------------
// Prompt builders
// ---------------------------------------------------------------------------

const PLANNER_SYSTEM_PROMPT: &str = "\
You are a software decomposition planner. Given a module contract and an \
implementation spec, split the module into independently buildable bricks.

Respond with a single JSON object and nothing else:
{\"bricks\": [{\"name\": \"<slug>\", \"description\": \"<one sentence>\", \
\"target_directory\": \"<relative path>\", \"kind\": \"python_module\"}]}

Rules:
- brick names are lowercase slugs, unique within the plan
- target_directory values are relative paths, unique within the plan
- order bricks so each depends only on bricks earlier in the list
- at least one brick";

fn build_prompt(
    module_name: &str,
    contract_text: &str,
    spec_text: &str,
    ctx: &RetryContext,
) -> String {
    format!(
        "Decompose module '{module_name}' into bricks.\n\n\
         Module contract:\n{contract}\n\n\
         Implementation spec:\n{spec}{feedback}",
        contract = isolate_untrusted_content(contract_text),
        spec = isolate_untrusted_content(spec_text),
        feedback = ctx.feedback_block(),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
