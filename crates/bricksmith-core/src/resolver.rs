use crate::client::{CompletionClient, Prompt};
use crate::config::LlmConfig;
use crate::error::{BricksmithError, Result};
use crate::extract::{extract_structured_payload, isolate_untrusted_content};
use crate::io::{read_nonempty, write_if_missing};
use crate::plan::BrickPlan;
use crate::retry::{retry_with_feedback, AttemptError, BackoffPolicy, RetryContext};
use serde::Deserialize;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// SpecResolver
// ---------------------------------------------------------------------------

/// Resolves each brick's contract and spec documents before execution:
/// existing files pass through unchanged, missing ones are synthesized via
/// an LLM round-trip.
pub struct SpecResolver<'a> {
    client: &'a dyn CompletionClient,
    llm: &'a LlmConfig,
}

/// The synthesis payload shape. `exports` is the brick's name-exact public
/// surface — downstream bricks and the smoke test depend on it.
#[derive(Debug, Deserialize)]
struct SynthesisPayload {
    contract: String,
    spec: String,
    exports: Vec<String>,
}

impl<'a> SpecResolver<'a> {
    pub fn new(client: &'a dyn CompletionClient, llm: &'a LlmConfig) -> Self {
        Self { client, llm }
    }

    /// Return the brick's contract and spec paths, synthesizing either
    /// document that is missing or empty.
    ///
    /// A synthesized contract that fails to enumerate one of its declared
    /// exports is a specification defect and is rejected here — catching it
    /// at verification time would waste a whole generation attempt.
    pub async fn resolve_brick_specs(&self, brick: &BrickPlan) -> Result<(PathBuf, PathBuf)> {
        let have_contract = read_nonempty(&brick.contract_path).is_some();
        let have_spec = read_nonempty(&brick.spec_path).is_some();

        if have_contract && have_spec {
            tracing::debug!(brick = %brick.name, "contract and spec already present");
            return Ok((brick.contract_path.clone(), brick.spec_path.clone()));
        }

        let backoff = BackoffPolicy {
            initial: std::time::Duration::from_millis(self.llm.backoff_initial_ms),
            multiplier: self.llm.backoff_multiplier,
            cap: std::time::Duration::from_millis(self.llm.backoff_cap_ms),
        };

        let payload = retry_with_feedback(
            |ctx| self.attempt(brick, ctx),
            self.llm.brick_max_attempts,
            &backoff,
        )
        .await
        .map_err(|e| match e {
            BricksmithError::RetryExhausted { attempts, history } => {
                BricksmithError::SpecSynthesis {
                    brick: brick.name.clone(),
                    reason: format!(
                        "exhausted {attempts} attempts; last error: {}",
                        history.last().map(String::as_str).unwrap_or("<none>")
                    ),
                }
            }
            other => other,
        })?;

        // Only fill the gaps — an existing document is never overwritten.
        write_if_missing(&brick.contract_path, payload.contract.as_bytes())?;
        write_if_missing(&brick.spec_path, payload.spec.as_bytes())?;

        tracing::info!(
            brick = %brick.name,
            exports = payload.exports.len(),
            "brick specs synthesized"
        );
        Ok((brick.contract_path.clone(), brick.spec_path.clone()))
    }

    async fn attempt(
        &self,
        brick: &BrickPlan,
        ctx: RetryContext,
    ) -> std::result::Result<SynthesisPayload, AttemptError> {
        let prompt = Prompt::new(build_prompt(brick, &ctx))
            .with_system(RESOLVER_SYSTEM_PROMPT.to_string());

        let completion = match self.client.complete(&prompt).await {
            Ok(c) => c,
            Err(BricksmithError::Io(e)) => return Err(AttemptError::Fatal(e.into())),
            Err(e) => return Err(AttemptError::retryable(format!("completion failed: {e}"))),
        };

        let value = extract_structured_payload(&completion.text)
            .map_err(|e| AttemptError::retryable(e.to_string()))?;

        let payload: SynthesisPayload = serde_json::from_value(value).map_err(|e| {
            AttemptError::retryable(format!("payload does not match synthesis schema: {e}"))
        })?;

        validate_payload(&payload)?;
        Ok(payload)
    }
}

fn validate_payload(payload: &SynthesisPayload) -> std::result::Result<(), AttemptError> {
    if payload.contract.trim().is_empty() {
        return Err(AttemptError::retryable("synthesized contract is empty"));
    }
    if payload.spec.trim().is_empty() {
        return Err(AttemptError::retryable("synthesized spec is empty"));
    }
    if payload.exports.is_empty() {
        return Err(AttemptError::retryable(
            "exports list is empty — the contract must enumerate the brick's public surface",
        ));
    }
    for export in &payload.exports {
        if export.trim().is_empty() {
            return Err(AttemptError::retryable("exports list contains an empty name"));
        }
        if !payload.contract.contains(export.as_str()) {
            return Err(AttemptError::retryable(format!(
                "contract does not mention declared export '{export}' — \
                 every public symbol must appear in the contract text"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Prompt builders
// ---------------------------------------------------------------------------

const RESOLVER_SYSTEM_PROMPT: &str = "\
You write contract and implementation-spec documents for one brick of a \
larger module.

Respond with a single JSON object and nothing else:
{\"contract\": \"<markdown>\", \"spec\": \"<markdown>\", \"exports\": [\"<symbol>\", …]}

Rules:
- exports lists every public function/class name the brick provides, exactly
  as consumers will import them
- the contract text must mention every export by name
- the spec describes algorithms and data flow, not prose philosophy";

fn build_prompt(brick: &BrickPlan, ctx: &RetryContext) -> String {
    format!(
        "Write the contract and implementation spec for brick '{name}'.\n\n\
         Brick description:\n{description}\n\n\
         Target directory: {target}\nKind: {kind}{feedback}",
        name = brick.name,
        description = isolate_untrusted_content(&brick.description),
        target = brick.target_directory,
        kind = brick.kind,
        feedback = ctx.feedback_block(),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Completion;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct ScriptedClient {
        responses: Vec<String>,
        calls: Mutex<usize>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: responses.into_iter().map(String::from).collect(),
                calls: Mutex::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, prompt: &Prompt) -> Result<Completion> {
            self.prompts.lock().unwrap().push(prompt.user.clone());
            let mut calls = self.calls.lock().unwrap();
            let idx = (*calls).min(self.responses.len() - 1);
            *calls += 1;
            Ok(Completion {
                session_id: "sess".into(),
                text: self.responses[idx].clone(),
            })
        }
    }

    fn brick_in(dir: &TempDir) -> BrickPlan {
        BrickPlan {
            name: "core".to_string(),
            description: "greeting core".to_string(),
            contract_path: dir.path().join("core.contract.md"),
            spec_path: dir.path().join("core.spec.md"),
            target_directory: "greeter/core".to_string(),
            kind: "python_module".to_string(),
        }
    }

    fn llm_config(max_attempts: u32) -> LlmConfig {
        LlmConfig {
            brick_max_attempts: max_attempts,
            backoff_initial_ms: 0,
            ..Default::default()
        }
    }

    const GOOD_SYNTHESIS: &str = r###"{
        "contract": "## core\nProvides `greet(name)` returning a greeting string.",
        "spec": "Implement greet with an f-string.",
        "exports": ["greet"]
    }"###;

    #[tokio::test]
    async fn existing_files_pass_through_without_llm_call() {
        let dir = TempDir::new().unwrap();
        let brick = brick_in(&dir);
        std::fs::write(&brick.contract_path, "existing contract").unwrap();
        std::fs::write(&brick.spec_path, "existing spec").unwrap();

        let client = ScriptedClient::new(vec![GOOD_SYNTHESIS]);
        let llm = llm_config(3);
        let resolver = SpecResolver::new(&client, &llm);

        let (c, s) = resolver.resolve_brick_specs(&brick).await.unwrap();
        assert_eq!(c, brick.contract_path);
        assert_eq!(s, brick.spec_path);
        assert_eq!(client.call_count(), 0);
        assert_eq!(
            std::fs::read_to_string(&brick.contract_path).unwrap(),
            "existing contract"
        );
    }

    #[tokio::test]
    async fn synthesizes_missing_documents() {
        let dir = TempDir::new().unwrap();
        let brick = brick_in(&dir);

        let client = ScriptedClient::new(vec![GOOD_SYNTHESIS]);
        let llm = llm_config(3);
        let resolver = SpecResolver::new(&client, &llm);

        resolver.resolve_brick_specs(&brick).await.unwrap();

        let contract = std::fs::read_to_string(&brick.contract_path).unwrap();
        assert!(contract.contains("greet"));
        assert!(std::fs::read_to_string(&brick.spec_path)
            .unwrap()
            .contains("f-string"));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn contract_omitting_export_is_rejected_then_retried() {
        let dir = TempDir::new().unwrap();
        let brick = brick_in(&dir);

        let missing_export = r###"{
            "contract": "## core\nDoes greeting things.",
            "spec": "spec body",
            "exports": ["greet"]
        }"###;
        let client = ScriptedClient::new(vec![missing_export, GOOD_SYNTHESIS]);
        let llm = llm_config(3);
        let resolver = SpecResolver::new(&client, &llm);

        resolver.resolve_brick_specs(&brick).await.unwrap();
        assert_eq!(client.call_count(), 2);

        let second_prompt = client.prompts.lock().unwrap()[1].clone();
        assert!(second_prompt.contains("does not mention declared export 'greet'"));
    }

    #[tokio::test]
    async fn empty_exports_rejected() {
        let dir = TempDir::new().unwrap();
        let brick = brick_in(&dir);

        let no_exports = r#"{"contract": "c", "spec": "s", "exports": []}"#;
        let client = ScriptedClient::new(vec![no_exports]);
        let llm = llm_config(2);
        let resolver = SpecResolver::new(&client, &llm);

        let err = resolver.resolve_brick_specs(&brick).await.unwrap_err();
        match err {
            BricksmithError::SpecSynthesis { brick, reason } => {
                assert_eq!(brick, "core");
                assert!(reason.contains("exports list is empty"));
            }
            other => panic!("expected SpecSynthesis, got {other:?}"),
        }
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn partial_existing_file_is_preserved() {
        let dir = TempDir::new().unwrap();
        let brick = brick_in(&dir);
        // Contract exists, spec missing — synthesis fills only the spec
        std::fs::write(&brick.contract_path, "hand-written contract").unwrap();

        let client = ScriptedClient::new(vec![GOOD_SYNTHESIS]);
        let llm = llm_config(3);
        let resolver = SpecResolver::new(&client, &llm);

        resolver.resolve_brick_specs(&brick).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&brick.contract_path).unwrap(),
            "hand-written contract"
        );
        assert!(brick.spec_path.exists());
    }
}
