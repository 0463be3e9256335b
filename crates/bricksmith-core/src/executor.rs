use crate::client::{CompletionClient, Prompt};
use crate::config::LlmConfig;
use crate::error::{BricksmithError, Result};
use crate::extract::{extract_structured_payload, isolate_untrusted_content};
use crate::io::atomic_write;
use crate::paths;
use crate::plan::BrickPlan;
use crate::report::ExecutionResult;
use crate::retry::{retry_with_feedback, AttemptError, BackoffPolicy, RetryContext};
use crate::verifier::BrickVerifier;
use serde::Deserialize;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// BrickExecutor
// ---------------------------------------------------------------------------

/// Drives one brick through `generating → writing → verifying`.
///
/// A verification failure feeds its diagnostic into the next generation
/// attempt's prompt — the defining feedback loop of the whole pipeline.
/// Terminal states are sticky: once a brick succeeds or fails it is not
/// retried within this run.
pub struct BrickExecutor<'a> {
    client: &'a dyn CompletionClient,
    verifier: &'a dyn BrickVerifier,
    llm: &'a LlmConfig,
    output_root: PathBuf,
}

/// The generation payload shape: the files to write, relative to the
/// brick's target directory.
#[derive(Debug, Deserialize)]
struct FilesPayload {
    files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    path: String,
    content: String,
}

impl<'a> BrickExecutor<'a> {
    pub fn new(
        client: &'a dyn CompletionClient,
        verifier: &'a dyn BrickVerifier,
        llm: &'a LlmConfig,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            verifier,
            llm,
            output_root: output_root.into(),
        }
    }

    /// Generate, write, and verify one brick.
    ///
    /// Per-brick failures (retries exhausted) are recorded in the returned
    /// [`ExecutionResult`], not raised; only environment errors (unwritable
    /// filesystem) propagate as `Err`.
    pub async fn execute_brick(
        &self,
        brick: &BrickPlan,
        contract_text: &str,
        spec_text: &str,
    ) -> Result<ExecutionResult> {
        let backoff = BackoffPolicy {
            initial: std::time::Duration::from_millis(self.llm.backoff_initial_ms),
            multiplier: self.llm.backoff_multiplier,
            cap: std::time::Duration::from_millis(self.llm.backoff_cap_ms),
        };

        let outcome = retry_with_feedback(
            |ctx| self.attempt(brick, contract_text, spec_text, ctx),
            self.llm.brick_max_attempts,
            &backoff,
        )
        .await;

        match outcome {
            Ok((attempts, files)) => {
                tracing::info!(brick = %brick.name, attempts, files = files.len(), "brick succeeded");
                Ok(ExecutionResult::success(&brick.name, attempts, files))
            }
            Err(BricksmithError::RetryExhausted { attempts, history }) => {
                let summary = history
                    .last()
                    .cloned()
                    .unwrap_or_else(|| "no diagnostic captured".to_string());
                tracing::warn!(brick = %brick.name, attempts, "brick failed terminally");
                Ok(ExecutionResult::failed(&brick.name, attempts, summary))
            }
            Err(e) => Err(e),
        }
    }

    /// One pass through the state machine: generating → writing → verifying.
    async fn attempt(
        &self,
        brick: &BrickPlan,
        contract_text: &str,
        spec_text: &str,
        ctx: RetryContext,
    ) -> std::result::Result<(u32, Vec<PathBuf>), AttemptError> {
        let attempt = ctx.attempt_number;

        // generating
        let payload = self.generate(brick, contract_text, spec_text, &ctx).await?;

        // writing
        let files = self.write_files(brick, &payload)?;

        // verifying
        let verdict = self
            .verifier
            .verify_brick(brick, &files)
            .await
            .map_err(AttemptError::Fatal)?;

        if verdict.ok {
            Ok((attempt, files))
        } else {
            let diagnostic = verdict
                .diagnostic
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| "verification failed without diagnostic".to_string());
            Err(AttemptError::Retryable(diagnostic))
        }
    }

    async fn generate(
        &self,
        brick: &BrickPlan,
        contract_text: &str,
        spec_text: &str,
        ctx: &RetryContext,
    ) -> std::result::Result<FilesPayload, AttemptError> {
        let prompt = Prompt::new(build_prompt(brick, contract_text, spec_text, ctx))
            .with_system(EXECUTOR_SYSTEM_PROMPT.to_string());

        let completion = match self.client.complete(&prompt).await {
            Ok(c) => c,
            Err(BricksmithError::Io(e)) => return Err(AttemptError::Fatal(e.into())),
            Err(e) => return Err(AttemptError::retryable(format!("completion failed: {e}"))),
        };

        let value = extract_structured_payload(&completion.text)
            .map_err(|e| AttemptError::retryable(e.to_string()))?;

        let payload: FilesPayload = serde_json::from_value(value).map_err(|e| {
            AttemptError::retryable(format!("payload does not match files schema: {e}"))
        })?;

        if payload.files.is_empty() {
            return Err(AttemptError::retryable("generation produced no files"));
        }
        Ok(payload)
    }

    /// Validate every entry, then write each file atomically under the
    /// brick's target directory. All-or-nothing at the validation level: a
    /// bad path or empty content rejects the whole attempt before any file
    /// is written, so a half-written brick is never visible at the final
    /// paths.
    fn write_files(
        &self,
        brick: &BrickPlan,
        payload: &FilesPayload,
    ) -> std::result::Result<Vec<PathBuf>, AttemptError> {
        let target_dir = paths::brick_target_dir(&self.output_root, &brick.target_directory);

        for entry in &payload.files {
            if !paths::is_safe_relative(&entry.path) {
                return Err(AttemptError::retryable(format!(
                    "generated file path '{}' escapes the target directory",
                    entry.path
                )));
            }
            if entry.content.trim().is_empty() {
                return Err(AttemptError::retryable(format!(
                    "generated file '{}' is empty",
                    entry.path
                )));
            }
        }

        let mut written = Vec::with_capacity(payload.files.len());
        for entry in &payload.files {
            let dest = target_dir.join(&entry.path);
            atomic_write(&dest, entry.content.as_bytes())
                .map_err(AttemptError::Fatal)?;
            written.push(dest);
        }
        Ok(written)
    }
}

// ---------------------------------------------------------------------------
// Prompt builders
// ---------------------------------------------------------------------------

const EXECUTOR_SYSTEM_PROMPT: &str = "\
You implement one brick of a larger module from its contract and spec.

Respond with a single JSON object and nothing else:
{\"files\": [{\"path\": \"<relative path>\", \"content\": \"<full file content>\"}]}

Rules:
- paths are relative to the brick's target directory
- every file is complete and non-empty; no placeholders or ellipses
- implement exactly the public surface the contract names";

fn build_prompt(
    brick: &BrickPlan,
    contract_text: &str,
    spec_text: &str,
    ctx: &RetryContext,
) -> String {
    format!(
        "Implement brick '{name}' ({kind}).\n\n\
         Contract:\n{contract}\n\n\
         Implementation spec:\n{spec}{feedback}",
        name = brick.name,
        kind = brick.kind,
        contract = isolate_untrusted_content(contract_text),
        spec = isolate_untrusted_content(spec_text),
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
    use crate::report::ExecStatus;
    use crate::verifier::VerificationResult;
    use async_trait::async_trait;
    use std::path::Path;
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

        fn prompt(&self, n: usize) -> String {
            self.prompts.lock().unwrap()[n].clone()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, prompt: &Prompt) -> crate::error::Result<Completion> {
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

    /// Returns each scripted verdict in turn; repeats the last one after.
    struct ScriptedVerifier {
        verdicts: Vec<VerificationResult>,
        calls: Mutex<usize>,
    }

    impl ScriptedVerifier {
        fn new(verdicts: Vec<VerificationResult>) -> Self {
            Self {
                verdicts,
                calls: Mutex::new(0),
            }
        }

        fn always_ok() -> Self {
            Self::new(vec![VerificationResult::passed()])
        }
    }

    #[async_trait]
    impl BrickVerifier for ScriptedVerifier {
        async fn verify_brick(
            &self,
            _brick: &BrickPlan,
            _files: &[PathBuf],
        ) -> crate::error::Result<VerificationResult> {
            let mut calls = self.calls.lock().unwrap();
            let idx = (*calls).min(self.verdicts.len() - 1);
            *calls += 1;
            Ok(self.verdicts[idx].clone())
        }
    }

    fn brick(dir: &Path) -> BrickPlan {
        BrickPlan {
            name: "core".to_string(),
            description: "greeting core".to_string(),
            contract_path: dir.join("core.contract.md"),
            spec_path: dir.join("core.spec.md"),
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

    const FILES_RESPONSE: &str = r#"{"files": [
        {"path": "greeter.py", "content": "def greet(name):\n    return f\"Hello, {name}!\"\n"}
    ]}"#;

    #[tokio::test]
    async fn success_writes_files_under_target_dir() {
        let dir = TempDir::new().unwrap();
        let client = ScriptedClient::new(vec![FILES_RESPONSE]);
        let verifier = ScriptedVerifier::always_ok();
        let llm = llm_config(3);
        let exec = BrickExecutor::new(&client, &verifier, &llm, dir.path().join("out"));

        let result = exec
            .execute_brick(&brick(dir.path()), "contract", "spec")
            .await
            .unwrap();

        assert_eq!(result.status, ExecStatus::Success);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.generated_files.len(), 1);
        let written = &result.generated_files[0];
        assert_eq!(
            written,
            &dir.path().join("out/greeter/core/greeter.py")
        );
        assert!(std::fs::read_to_string(written).unwrap().contains("def greet"));
    }

    #[tokio::test]
    async fn verification_diagnostic_feeds_next_attempt() {
        let dir = TempDir::new().unwrap();
        // First generation misses the export; verifier reports it; second fixes it
        let missing = r#"{"files": [
            {"path": "greeter.py", "content": "def hello():\n    pass\n"}
        ]}"#;
        let client = ScriptedClient::new(vec![missing, FILES_RESPONSE]);
        let verifier = ScriptedVerifier::new(vec![
            VerificationResult::failed("smoke run failed: module has no attribute 'greet'"),
            VerificationResult::passed(),
        ]);
        let llm = llm_config(3);
        let exec = BrickExecutor::new(&client, &verifier, &llm, dir.path().join("out"));

        let result = exec
            .execute_brick(&brick(dir.path()), "contract", "spec")
            .await
            .unwrap();

        assert_eq!(result.status, ExecStatus::Success);
        assert_eq!(result.attempts, 2);
        // The second prompt must carry the first verification diagnostic
        assert!(client.prompt(1).contains("no attribute 'greet'"));
    }

    #[tokio::test]
    async fn exhausted_retries_yield_failed_result_with_summary() {
        let dir = TempDir::new().unwrap();
        let client = ScriptedClient::new(vec![FILES_RESPONSE]);
        let verifier = ScriptedVerifier::new(vec![VerificationResult::failed(
            "syntax check failed for greeter.py: exit code 1",
        )]);
        let llm = llm_config(2);
        let exec = BrickExecutor::new(&client, &verifier, &llm, dir.path().join("out"));

        let result = exec
            .execute_brick(&brick(dir.path()), "contract", "spec")
            .await
            .unwrap();

        assert_eq!(result.status, ExecStatus::Failed);
        assert_eq!(result.attempts, 2);
        assert_eq!(client.call_count(), 2);
        let summary = result.error_summary.unwrap();
        assert!(summary.contains("syntax check failed"));
        assert!(result.generated_files.is_empty());
    }

    #[tokio::test]
    async fn path_escape_is_rejected_before_writing() {
        let dir = TempDir::new().unwrap();
        let evil = r#"{"files": [
            {"path": "../../outside.py", "content": "print('escaped')"}
        ]}"#;
        let client = ScriptedClient::new(vec![evil]);
        let verifier = ScriptedVerifier::always_ok();
        let llm = llm_config(1);
        let exec = BrickExecutor::new(&client, &verifier, &llm, dir.path().join("out"));

        let result = exec
            .execute_brick(&brick(dir.path()), "contract", "spec")
            .await
            .unwrap();

        assert_eq!(result.status, ExecStatus::Failed);
        assert!(result
            .error_summary
            .unwrap()
            .contains("escapes the target directory"));
        assert!(!dir.path().join("outside.py").exists());
    }

    #[tokio::test]
    async fn empty_file_content_rejects_whole_attempt() {
        let dir = TempDir::new().unwrap();
        let partial = r#"{"files": [
            {"path": "good.py", "content": "x = 1"},
            {"path": "bad.py", "content": "   "}
        ]}"#;
        let client = ScriptedClient::new(vec![partial]);
        let verifier = ScriptedVerifier::always_ok();
        let llm = llm_config(1);
        let exec = BrickExecutor::new(&client, &verifier, &llm, dir.path().join("out"));

        let result = exec
            .execute_brick(&brick(dir.path()), "contract", "spec")
            .await
            .unwrap();

        assert_eq!(result.status, ExecStatus::Failed);
        // Nothing written: validation rejects the set before any write
        assert!(!dir.path().join("out/greeter/core/good.py").exists());
    }

    #[tokio::test]
    async fn unparseable_generation_retries_with_extraction_error() {
        let dir = TempDir::new().unwrap();
        let client = ScriptedClient::new(vec!["I will not answer in JSON.", FILES_RESPONSE]);
        let verifier = ScriptedVerifier::always_ok();
        let llm = llm_config(3);
        let exec = BrickExecutor::new(&client, &verifier, &llm, dir.path().join("out"));

        let result = exec
            .execute_brick(&brick(dir.path()), "contract", "spec")
            .await
            .unwrap();

        assert_eq!(result.status, ExecStatus::Success);
        assert_eq!(result.attempts, 2);
        assert!(client.prompt(1).contains("no structured payload"));
    }

    #[tokio::test]
    async fn prompt_isolates_contract_and_carries_brick_name() {
        let dir = TempDir::new().unwrap();
        let client = ScriptedClient::new(vec![FILES_RESPONSE]);
        let verifier = ScriptedVerifier::always_ok();
        let llm = llm_config(1);
        let exec = BrickExecutor::new(&client, &verifier, &llm, dir.path().join("out"));

        exec.execute_brick(&brick(dir.path()), "contract body", "spec body")
            .await
            .unwrap();

        let prompt = client.prompt(0);
        assert!(prompt.contains("brick 'core'"));
        assert!(prompt.contains("BEGIN-UNTRUSTED"));
        assert!(prompt.contains("contract body"));
    }
}
