use crate::error::{BricksmithError, Result};
use crate::paths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// The ordered decomposition of a module into bricks. Produced once by the
/// planner, regenerated (never patched) when the contract or spec changes,
/// and read repeatedly by the orchestrator.
///
/// Invariant: brick order is a valid topological order — a brick may only
/// depend on bricks earlier in the list or on collaborators outside the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub module_name: String,
    pub created_at: DateTime<Utc>,
    /// Opaque correlation id for the LLM session that produced this plan.
    pub generation_session_id: String,
    /// Content hash of the module contract the plan was generated from.
    pub contract_sha256: String,
    /// Content hash of the implementation spec the plan was generated from.
    pub spec_sha256: String,
    pub bricks: Vec<BrickPlan>,
}

/// One independently generatable/verifiable unit of a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrickPlan {
    /// Unique within the plan.
    pub name: String,
    pub description: String,
    pub contract_path: PathBuf,
    pub spec_path: PathBuf,
    /// Unique within the plan — no two bricks write the same location.
    pub target_directory: String,
    /// Free tag (e.g. `"python_module"`). Selects the verifier's syntax
    /// check; not an enforced type system.
    pub kind: String,
}

// ---------------------------------------------------------------------------
// Payload parsing (the LLM boundary)
// ---------------------------------------------------------------------------

/// The brick shape the planner asks the model for. Raw LLM output is
/// schema-checked here, at the parse boundary, and converted into a typed
/// [`Plan`] — it never travels deeper unchecked.
#[derive(Debug, Deserialize)]
struct BrickPayload {
    name: String,
    description: String,
    target_directory: String,
    #[serde(default = "default_kind")]
    kind: String,
    #[serde(default)]
    contract_path: Option<PathBuf>,
    #[serde(default)]
    spec_path: Option<PathBuf>,
}

fn default_kind() -> String {
    "python_module".to_string()
}

#[derive(Debug, Deserialize)]
struct PlanPayload {
    bricks: Vec<BrickPayload>,
}

impl Plan {
    /// Build a validated plan from an extracted LLM payload.
    ///
    /// Bricks without explicit contract/spec paths get the conventional
    /// `<module_root>/<brick>.contract.md` / `.spec.md` locations.
    pub fn from_payload(
        payload: &serde_json::Value,
        module_name: &str,
        generation_session_id: &str,
        module_root: &Path,
        contract_text: &str,
        spec_text: &str,
    ) -> Result<Plan> {
        let parsed: PlanPayload =
            serde_json::from_value(payload.clone()).map_err(|e| BricksmithError::PlanInvalid {
                module: module_name.to_string(),
                reason: format!("payload does not match plan schema: {e}"),
            })?;

        let bricks = parsed
            .bricks
            .into_iter()
            .map(|b| {
                let contract_path = b
                    .contract_path
                    .unwrap_or_else(|| paths::brick_contract_path(module_root, &b.name));
                let spec_path = b
                    .spec_path
                    .unwrap_or_else(|| paths::brick_spec_path(module_root, &b.name));
                BrickPlan {
                    name: b.name,
                    description: b.description,
                    contract_path,
                    spec_path,
                    target_directory: b.target_directory,
                    kind: b.kind,
                }
            })
            .collect();

        let plan = Plan {
            module_name: module_name.to_string(),
            created_at: Utc::now(),
            generation_session_id: generation_session_id.to_string(),
            contract_sha256: content_hash(contract_text),
            spec_sha256: content_hash(spec_text),
            bricks,
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Schema validation: required fields present, names and target
    /// directories unique, no self-referential brick, target directories
    /// stay inside the output root.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| BricksmithError::PlanInvalid {
            module: self.module_name.clone(),
            reason,
        };

        if self.bricks.is_empty() {
            return Err(invalid("plan has no bricks".to_string()));
        }

        let mut names = HashSet::new();
        let mut targets = HashSet::new();
        for brick in &self.bricks {
            paths::validate_module_name(&brick.name).map_err(|_| {
                invalid(format!("brick name '{}' is not a valid slug", brick.name))
            })?;

            if brick.name == self.module_name {
                // A flat plan's one expressible cycle: the generator invoking
                // itself under the same name.
                return Err(invalid(format!(
                    "brick '{}' references its own module",
                    brick.name
                )));
            }

            if !names.insert(brick.name.as_str()) {
                return Err(invalid(format!("duplicate brick name '{}'", brick.name)));
            }

            if brick.description.trim().is_empty() {
                return Err(invalid(format!(
                    "brick '{}' has an empty description",
                    brick.name
                )));
            }

            if brick.target_directory.trim().is_empty() {
                return Err(invalid(format!(
                    "brick '{}' has an empty target_directory",
                    brick.name
                )));
            }

            if !paths::is_safe_relative(&brick.target_directory) {
                return Err(invalid(format!(
                    "brick '{}' target_directory '{}' escapes the output root",
                    brick.name, brick.target_directory
                )));
            }

            if !targets.insert(brick.target_directory.as_str()) {
                return Err(invalid(format!(
                    "duplicate target_directory '{}'",
                    brick.target_directory
                )));
            }
        }

        Ok(())
    }

    /// True if `contract_text`/`spec_text` still match the inputs this plan
    /// was generated from.
    pub fn matches_inputs(&self, contract_text: &str, spec_text: &str) -> bool {
        self.contract_sha256 == content_hash(contract_text)
            && self.spec_sha256 == content_hash(spec_text)
    }
}

/// Hex SHA-256 of document text — the content-address half of
/// "identified by path + content hash".
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
