use thiserror::Error;

#[derive(Debug, Error)]
pub enum BricksmithError {
    #[error("no structured payload found in response: {preview}")]
    PayloadNotFound { preview: String },

    #[error("all {attempts} attempts failed; last error: {}", .history.last().map(String::as_str).unwrap_or("<none>"))]
    RetryExhausted {
        attempts: u32,
        /// Error text from every attempt, in order.
        history: Vec<String>,
    },

    #[error("no plan found for module: {0}")]
    PlanNotFound(String),

    #[error("stored plan for module '{module}' is corrupt: {reason}")]
    PlanCorrupt { module: String, reason: String },

    #[error("plan for module '{module}' is invalid: {reason}")]
    PlanInvalid { module: String, reason: String },

    #[error("plan generation failed for module '{module}': {reason}")]
    PlanGeneration { module: String, reason: String },

    #[error("spec synthesis failed for brick '{brick}': {reason}")]
    SpecSynthesis { brick: String, reason: String },

    #[error("code generation failed for brick '{brick}': {reason}")]
    Generation { brick: String, reason: String },

    #[error("generated file escapes target directory: {0}")]
    UnsafeGeneratedPath(String),

    #[error("generated file is empty: {0}")]
    EmptyGeneratedFile(String),

    #[error("invalid module name '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidModuleName(String),

    #[error("maximum plan nesting depth {0} exceeded")]
    MaxDepthExceeded(u32),

    #[error("LLM completion failed: {0}")]
    Completion(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, BricksmithError>;
