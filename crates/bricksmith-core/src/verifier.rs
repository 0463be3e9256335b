use crate::config::VerifyConfig;
use crate::error::Result;
use crate::plan::BrickPlan;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

// ---------------------------------------------------------------------------
// VerificationResult / BrickVerifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub ok: bool,
    /// Present iff `!ok`. Must carry enough text to be useful as LLM retry
    /// feedback — an empty or generic failure message defeats the whole
    /// self-correction design.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl VerificationResult {
    pub fn passed() -> Self {
        Self {
            ok: true,
            diagnostic: None,
        }
    }

    pub fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            ok: false,
            diagnostic: Some(diagnostic.into()),
        }
    }
}

/// The verification seam between the executor and the host toolchain.
/// Production uses [`SmokeVerifier`]; tests substitute scripted verdicts.
#[async_trait]
pub trait BrickVerifier: Send + Sync {
    async fn verify_brick(
        &self,
        brick: &BrickPlan,
        generated_files: &[PathBuf],
    ) -> Result<VerificationResult>;
}

// ---------------------------------------------------------------------------
// SmokeVerifier
// ---------------------------------------------------------------------------

/// Checks, in order, short-circuiting on first failure:
/// 1. every generated file exists and is non-empty;
/// 2. each file passes the syntax check configured for the brick's kind;
/// 3. if the module has a smoke entry point, it runs cleanly within the
///    timeout.
pub struct SmokeVerifier {
    config: VerifyConfig,
    /// Working directory for smoke runs (the output root).
    output_root: PathBuf,
}

impl SmokeVerifier {
    pub fn new(config: VerifyConfig, output_root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            output_root: output_root.into(),
        }
    }

    fn check_files_exist(&self, files: &[PathBuf]) -> Option<VerificationResult> {
        if files.is_empty() {
            return Some(VerificationResult::failed(
                "no files were generated for this brick",
            ));
        }
        for file in files {
            match std::fs::metadata(file) {
                Err(_) => {
                    return Some(VerificationResult::failed(format!(
                        "expected file missing: {}",
                        file.display()
                    )))
                }
                Ok(meta) if meta.len() == 0 => {
                    return Some(VerificationResult::failed(format!(
                        "generated file is empty: {}",
                        file.display()
                    )))
                }
                Ok(_) => {}
            }
        }
        None
    }

    async fn check_syntax(
        &self,
        brick: &BrickPlan,
        files: &[PathBuf],
    ) -> Result<Option<VerificationResult>> {
        let Some(cmd) = self.config.syntax_commands.get(&brick.kind) else {
            tracing::debug!(kind = %brick.kind, "no syntax check configured for kind");
            return Ok(None);
        };
        if cmd.is_empty() {
            return Ok(None);
        }
        if which::which(&cmd[0]).is_err() {
            // Environment limitation, not a brick defect — the generated
            // code still gets existence checks and the smoke run (if any).
            tracing::warn!(interpreter = %cmd[0], "syntax-check interpreter not on PATH, skipping");
            return Ok(None);
        }

        let timeout = Duration::from_secs(self.config.smoke_timeout_secs);
        for file in files {
            let mut command = Command::new(&cmd[0]);
            command.args(&cmd[1..]).arg(file);
            match run_bounded(command, timeout).await {
                RunOutcome::Clean => {}
                RunOutcome::Failed(diag) => {
                    return Ok(Some(VerificationResult::failed(format!(
                        "syntax check failed for {}: {diag}",
                        file.display()
                    ))));
                }
                RunOutcome::Spawn(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    async fn check_smoke(&self) -> Result<Option<VerificationResult>> {
        let Some(cmd) = &self.config.smoke_command else {
            return Ok(None);
        };
        if cmd.is_empty() {
            return Ok(None);
        }

        let timeout = Duration::from_secs(self.config.smoke_timeout_secs);
        let mut command = Command::new(&cmd[0]);
        command.args(&cmd[1..]).current_dir(&self.output_root);
        match run_bounded(command, timeout).await {
            RunOutcome::Clean => Ok(None),
            RunOutcome::Failed(diag) => Ok(Some(VerificationResult::failed(format!(
                "smoke run failed: {diag}"
            )))),
            RunOutcome::Spawn(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl BrickVerifier for SmokeVerifier {
    async fn verify_brick(
        &self,
        brick: &BrickPlan,
        generated_files: &[PathBuf],
    ) -> Result<VerificationResult> {
        if let Some(fail) = self.check_files_exist(generated_files) {
            return Ok(fail);
        }
        if let Some(fail) = self.check_syntax(brick, generated_files).await? {
            return Ok(fail);
        }
        if let Some(fail) = self.check_smoke().await? {
            return Ok(fail);
        }
        Ok(VerificationResult::passed())
    }
}

// ---------------------------------------------------------------------------
// Bounded subprocess execution
// ---------------------------------------------------------------------------

enum RunOutcome {
    Clean,
    /// Non-zero exit or timeout, with captured output as the diagnostic.
    Failed(String),
    Spawn(std::io::Error),
}

/// Run a command with captured output and a hard deadline.
///
/// `kill_on_drop` guarantees the child is terminated when the timeout fires
/// and the wait future is dropped — no orphaned processes.
async fn run_bounded(mut command: Command, timeout: Duration) -> RunOutcome {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = match command.spawn() {
        Ok(c) => c,
        Err(e) => return RunOutcome::Spawn(e),
    };

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Err(_) => RunOutcome::Failed(format!(
            "timed out after {}s (process killed)",
            timeout.as_secs()
        )),
        Ok(Err(e)) => RunOutcome::Spawn(e),
        Ok(Ok(output)) => {
            if output.status.success() {
                RunOutcome::Clean
            } else {
                RunOutcome::Failed(describe_failure(&output))
            }
        }
    }
}

fn describe_failure(output: &std::process::Output) -> String {
    let code = output
        .status
        .code()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut diag = format!("exit code {code}");
    if !stdout.trim().is_empty() {
        diag.push_str(&format!("\nstdout: {}", truncate(stdout.trim(), 2000)));
    }
    if !stderr.trim().is_empty() {
        diag.push_str(&format!("\nstderr: {}", truncate(stderr.trim(), 2000)));
    }
    diag
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn brick(dir: &TempDir, kind: &str) -> BrickPlan {
        BrickPlan {
            name: "core".to_string(),
            description: "core".to_string(),
            contract_path: dir.path().join("core.contract.md"),
            spec_path: dir.path().join("core.spec.md"),
            target_directory: "out/core".to_string(),
            kind: kind.to_string(),
        }
    }

    fn verifier(dir: &TempDir, config: VerifyConfig) -> SmokeVerifier {
        SmokeVerifier::new(config, dir.path())
    }

    #[tokio::test]
    async fn missing_file_fails_with_named_diagnostic() {
        let dir = TempDir::new().unwrap();
        let v = verifier(&dir, VerifyConfig::default());
        let missing = dir.path().join("nope.py");

        let result = v
            .verify_brick(&brick(&dir, "unchecked"), &[missing.clone()])
            .await
            .unwrap();

        assert!(!result.ok);
        let diag = result.diagnostic.unwrap();
        assert!(diag.contains("expected file missing"));
        assert!(diag.contains("nope.py"));
    }

    #[tokio::test]
    async fn empty_file_fails() {
        let dir = TempDir::new().unwrap();
        let v = verifier(&dir, VerifyConfig::default());
        let path = dir.path().join("empty.py");
        std::fs::write(&path, b"").unwrap();

        let result = v
            .verify_brick(&brick(&dir, "unchecked"), &[path])
            .await
            .unwrap();
        assert!(!result.ok);
        assert!(result.diagnostic.unwrap().contains("empty"));
    }

    #[tokio::test]
    async fn no_files_at_all_fails() {
        let dir = TempDir::new().unwrap();
        let v = verifier(&dir, VerifyConfig::default());
        let result = v.verify_brick(&brick(&dir, "unchecked"), &[]).await.unwrap();
        assert!(!result.ok);
        assert!(result.diagnostic.unwrap().contains("no files"));
    }

    #[tokio::test]
    async fn kind_without_syntax_command_passes_on_existence() {
        let dir = TempDir::new().unwrap();
        let v = verifier(&dir, VerifyConfig::default());
        let path = dir.path().join("data.txt");
        std::fs::write(&path, b"content").unwrap();

        let result = v
            .verify_brick(&brick(&dir, "unchecked"), &[path])
            .await
            .unwrap();
        assert!(result.ok);
        assert!(result.diagnostic.is_none());
    }

    #[tokio::test]
    async fn failing_smoke_command_captures_output() {
        let dir = TempDir::new().unwrap();
        let config = VerifyConfig {
            smoke_command: Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                "echo boom >&2; exit 3".to_string(),
            ]),
            ..Default::default()
        };
        let v = verifier(&dir, config);
        let path = dir.path().join("ok.txt");
        std::fs::write(&path, b"content").unwrap();

        let result = v
            .verify_brick(&brick(&dir, "unchecked"), &[path])
            .await
            .unwrap();
        assert!(!result.ok);
        let diag = result.diagnostic.unwrap();
        assert!(diag.contains("smoke run failed"));
        assert!(diag.contains("exit code 3"));
        assert!(diag.contains("boom"));
    }

    #[tokio::test]
    async fn passing_smoke_command_verifies() {
        let dir = TempDir::new().unwrap();
        let config = VerifyConfig {
            smoke_command: Some(vec!["true".to_string()]),
            ..Default::default()
        };
        let v = verifier(&dir, config);
        let path = dir.path().join("ok.txt");
        std::fs::write(&path, b"content").unwrap();

        let result = v
            .verify_brick(&brick(&dir, "unchecked"), &[path])
            .await
            .unwrap();
        assert!(result.ok);
    }

    #[tokio::test]
    async fn hung_smoke_command_times_out_with_diagnostic() {
        let dir = TempDir::new().unwrap();
        let config = VerifyConfig {
            smoke_timeout_secs: 1,
            smoke_command: Some(vec!["sleep".to_string(), "30".to_string()]),
            ..Default::default()
        };
        let v = verifier(&dir, config);
        let path = dir.path().join("ok.txt");
        std::fs::write(&path, b"content").unwrap();

        let result = v
            .verify_brick(&brick(&dir, "unchecked"), &[path])
            .await
            .unwrap();
        assert!(!result.ok);
        assert!(result.diagnostic.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn python_syntax_error_reported_when_interpreter_present() {
        if which::which("python3").is_err() {
            return; // environment without python — existence checks still covered elsewhere
        }
        let dir = TempDir::new().unwrap();
        let v = verifier(&dir, VerifyConfig::default());
        let path = dir.path().join("bad.py");
        std::fs::write(&path, b"def broken(:\n    pass\n").unwrap();

        let result = v
            .verify_brick(&brick(&dir, "python_module"), &[path])
            .await
            .unwrap();
        assert!(!result.ok);
        let diag = result.diagnostic.unwrap();
        assert!(diag.contains("syntax check failed"));
        assert!(diag.contains("bad.py"));
    }

    #[tokio::test]
    async fn valid_python_passes_when_interpreter_present() {
        if which::which("python3").is_err() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let v = verifier(&dir, VerifyConfig::default());
        let path = dir.path().join("good.py");
        std::fs::write(&path, b"def greet(name):\n    return f\"Hello, {name}!\"\n").unwrap();

        let result = v
            .verify_brick(&brick(&dir, "python_module"), &[path])
            .await
            .unwrap();
        assert!(result.ok, "diag: {:?}", result.diagnostic);
    }
}
