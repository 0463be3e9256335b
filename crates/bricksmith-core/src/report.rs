use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// ExecutionResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecStatus {
    Success,
    Failed,
    Skipped,
}

/// Outcome of running the executor for one brick. Created and discarded per
/// run; the final report aggregates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub brick_name: String,
    pub status: ExecStatus,
    /// Number of generation attempts consumed (0 for skipped bricks).
    pub attempts: u32,
    /// Present iff `status == Failed` (or skipped-with-reason).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_summary: Option<String>,
    /// Present iff `status == Success`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generated_files: Vec<PathBuf>,
}

impl ExecutionResult {
    pub fn success(brick_name: impl Into<String>, attempts: u32, files: Vec<PathBuf>) -> Self {
        Self {
            brick_name: brick_name.into(),
            status: ExecStatus::Success,
            attempts,
            error_summary: None,
            generated_files: files,
        }
    }

    pub fn failed(brick_name: impl Into<String>, attempts: u32, summary: impl Into<String>) -> Self {
        Self {
            brick_name: brick_name.into(),
            status: ExecStatus::Failed,
            attempts,
            error_summary: Some(summary.into()),
            generated_files: Vec::new(),
        }
    }

    pub fn skipped(brick_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            brick_name: brick_name.into(),
            status: ExecStatus::Skipped,
            attempts: 0,
            error_summary: Some(reason.into()),
            generated_files: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineReport
// ---------------------------------------------------------------------------

/// What a whole run produced. "Empty output" and "processing failed" are
/// distinct signals and must never collapse into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// Every brick succeeded.
    FullSuccess,
    /// Some bricks succeeded; the failures and skips are named.
    PartialFailure,
    /// No brick produced output.
    NothingProduced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub module_name: String,
    pub results: Vec<ExecutionResult>,
}

impl PipelineReport {
    pub fn new(module_name: impl Into<String>, results: Vec<ExecutionResult>) -> Self {
        Self {
            module_name: module_name.into(),
            results,
        }
    }

    pub fn succeeded(&self) -> Vec<&ExecutionResult> {
        self.by_status(ExecStatus::Success)
    }

    pub fn failed(&self) -> Vec<&ExecutionResult> {
        self.by_status(ExecStatus::Failed)
    }

    pub fn skipped(&self) -> Vec<&ExecutionResult> {
        self.by_status(ExecStatus::Skipped)
    }

    pub fn outcome(&self) -> PipelineOutcome {
        let successes = self.succeeded().len();
        if successes == self.results.len() && !self.results.is_empty() {
            PipelineOutcome::FullSuccess
        } else if successes > 0 {
            PipelineOutcome::PartialFailure
        } else {
            PipelineOutcome::NothingProduced
        }
    }

    pub fn is_full_success(&self) -> bool {
        self.outcome() == PipelineOutcome::FullSuccess
    }

    fn by_status(&self, status: ExecStatus) -> Vec<&ExecutionResult> {
        self.results.iter().filter(|r| r.status == status).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_full_success() {
        let report = PipelineReport::new(
            "m",
            vec![
                ExecutionResult::success("a", 1, vec!["a.py".into()]),
                ExecutionResult::success("b", 2, vec!["b.py".into()]),
            ],
        );
        assert_eq!(report.outcome(), PipelineOutcome::FullSuccess);
        assert!(report.is_full_success());
    }

    #[test]
    fn outcome_partial_failure() {
        let report = PipelineReport::new(
            "m",
            vec![
                ExecutionResult::success("a", 1, vec!["a.py".into()]),
                ExecutionResult::failed("b", 3, "verification failed"),
                ExecutionResult::skipped("c", "skipped: brick 'b' failed earlier"),
            ],
        );
        assert_eq!(report.outcome(), PipelineOutcome::PartialFailure);
        assert_eq!(report.succeeded().len(), 1);
        assert_eq!(report.failed().len(), 1);
        assert_eq!(report.skipped().len(), 1);
    }

    #[test]
    fn outcome_nothing_produced_differs_from_empty() {
        let failed = PipelineReport::new("m", vec![ExecutionResult::failed("a", 3, "boom")]);
        assert_eq!(failed.outcome(), PipelineOutcome::NothingProduced);
        // An empty report is also "nothing produced", never "full success"
        let empty = PipelineReport::new("m", vec![]);
        assert_eq!(empty.outcome(), PipelineOutcome::NothingProduced);
    }

    #[test]
    fn failed_carries_summary_success_carries_files() {
        let f = ExecutionResult::failed("b", 2, "missing symbol greet");
        assert_eq!(f.error_summary.as_deref(), Some("missing symbol greet"));
        assert!(f.generated_files.is_empty());

        let s = ExecutionResult::success("a", 1, vec!["x.py".into()]);
        assert!(s.error_summary.is_none());
        assert_eq!(s.generated_files.len(), 1);
    }

    #[test]
    fn json_roundtrip() {
        let report = PipelineReport::new(
            "m",
            vec![
                ExecutionResult::success("a", 1, vec!["a.py".into()]),
                ExecutionResult::skipped("b", "halted"),
            ],
        );
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"status\":\"success\""));
        assert!(json.contains("\"status\":\"skipped\""));
        let parsed: PipelineReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }
}
