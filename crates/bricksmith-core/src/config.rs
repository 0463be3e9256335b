use crate::error::Result;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// LlmConfig
// ---------------------------------------------------------------------------

/// Everything about talking to the completion capability: which model,
/// how long a single round-trip may take, and how often the planner and
/// the brick executor may retry with feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// Wall-clock bound for one completion. Generation can legitimately
    /// take minutes; a timeout shorter than the model's real response
    /// time is a correctness bug, not a safety feature.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_plan_attempts")]
    pub plan_max_attempts: u32,
    #[serde(default = "default_brick_attempts")]
    pub brick_max_attempts: u32,
    #[serde(default = "default_backoff_initial")]
    pub backoff_initial_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_ms: u64,
}

fn default_model() -> String {
    "claude-sonnet-4-6".to_string()
}

fn default_llm_timeout() -> u64 {
    600
}

fn default_plan_attempts() -> u32 {
    3
}

fn default_brick_attempts() -> u32 {
    3
}

fn default_backoff_initial() -> u64 {
    1_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_backoff_cap() -> u64 {
    30_000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            timeout_secs: default_llm_timeout(),
            plan_max_attempts: default_plan_attempts(),
            brick_max_attempts: default_brick_attempts(),
            backoff_initial_ms: default_backoff_initial(),
            backoff_multiplier: default_backoff_multiplier(),
            backoff_cap_ms: default_backoff_cap(),
        }
    }
}

// ---------------------------------------------------------------------------
// LayoutConfig
// ---------------------------------------------------------------------------

/// On-disk layout, all relative to the project root unless absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_plans_dir")]
    pub plans_dir: PathBuf,
    #[serde(default = "default_module_root")]
    pub module_root: PathBuf,
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
}

fn default_plans_dir() -> PathBuf {
    PathBuf::from(paths::PLANS_DIR)
}

fn default_module_root() -> PathBuf {
    PathBuf::from(paths::MODULES_DIR)
}

fn default_output_root() -> PathBuf {
    PathBuf::from(paths::OUTPUT_DIR)
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            plans_dir: default_plans_dir(),
            module_root: default_module_root(),
            output_root: default_output_root(),
        }
    }
}

impl LayoutConfig {
    /// Resolve all layout paths against `root` (absolute paths unchanged).
    pub fn resolved(&self, root: &Path) -> LayoutConfig {
        let join = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                root.join(p)
            }
        };
        LayoutConfig {
            plans_dir: join(&self.plans_dir),
            module_root: join(&self.module_root),
            output_root: join(&self.output_root),
        }
    }
}

// ---------------------------------------------------------------------------
// VerifyConfig
// ---------------------------------------------------------------------------

/// How generated bricks are checked. `syntax_commands` maps a brick `kind`
/// tag to a command that syntax-checks one file (the file path is appended
/// as the last argument). Kinds with no entry skip the syntax step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyConfig {
    #[serde(default = "default_syntax_commands")]
    pub syntax_commands: HashMap<String, Vec<String>>,
    #[serde(default = "default_smoke_timeout")]
    pub smoke_timeout_secs: u64,
    /// Optional end-to-end smoke entry point for the module, run from the
    /// output root after all files are in place (e.g. `["python3", "-m", "greeter.sample"]`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smoke_command: Option<Vec<String>>,
}

fn default_syntax_commands() -> HashMap<String, Vec<String>> {
    let mut m = HashMap::new();
    m.insert(
        "python_module".to_string(),
        vec!["python3".to_string(), "-m".to_string(), "py_compile".to_string()],
    );
    m
}

fn default_smoke_timeout() -> u64 {
    60
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            syntax_commands: default_syntax_commands(),
            smoke_timeout_secs: default_smoke_timeout(),
            smoke_command: None,
        }
    }
}

// ---------------------------------------------------------------------------
// BricksmithConfig (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BricksmithConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub verify: VerifyConfig,
}

impl BricksmithConfig {
    /// Load from `<root>/.bricksmith/config.yaml`; defaults if absent.
    /// Environment overrides are applied after the file so operators can
    /// tune timeouts without editing config.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        let mut cfg: Self = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            serde_yaml::from_str(&data)?
        } else {
            Self::default()
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_u64("BRICKSMITH_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = v;
        }
        if let Some(v) = env_u64("BRICKSMITH_PLAN_MAX_ATTEMPTS") {
            self.llm.plan_max_attempts = v as u32;
        }
        if let Some(v) = env_u64("BRICKSMITH_BRICK_MAX_ATTEMPTS") {
            self.llm.brick_max_attempts = v as u32;
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.llm.plan_max_attempts == 0 || self.llm.brick_max_attempts == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "max attempts must be at least 1".to_string(),
            });
        }

        if self.llm.timeout_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "llm.timeout_secs of 0 would kill every completion immediately"
                    .to_string(),
            });
        } else if self.llm.timeout_secs < 30 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "llm.timeout_secs={} is shorter than typical generation time \
                     — completions will be cut off mid-response",
                    self.llm.timeout_secs
                ),
            });
        }

        if self.llm.backoff_multiplier < 1.0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "llm.backoff_multiplier={} shrinks delays between retries",
                    self.llm.backoff_multiplier
                ),
            });
        }

        for (kind, cmd) in &self.verify.syntax_commands {
            if cmd.is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("syntax command for kind '{kind}' is empty"),
                });
            }
        }

        warnings
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
