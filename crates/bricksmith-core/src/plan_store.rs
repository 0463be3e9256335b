use crate::error::{BricksmithError, Result};
use crate::io::atomic_write;
use crate::paths;
use crate::plan::Plan;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// PlanStore
// ---------------------------------------------------------------------------

/// Sole reader/writer of on-disk plan artifacts, one JSON document per
/// module name. Re-saving overwrites — regeneration replaces wholesale,
/// there is no versioning.
pub struct PlanStore {
    plans_dir: PathBuf,
}

impl PlanStore {
    pub fn new(plans_dir: impl Into<PathBuf>) -> Self {
        Self {
            plans_dir: plans_dir.into(),
        }
    }

    /// Serialize `plan` to `<plans_dir>/<module_name>.json`. The write is
    /// atomic (temp-then-rename): a crash mid-save leaves either the prior
    /// plan or nothing, never a half-written document.
    pub fn save_plan(&self, plan: &Plan) -> Result<()> {
        let path = self.path_for(&plan.module_name);
        let data = serde_json::to_vec_pretty(plan)?;
        atomic_write(&path, &data)?;
        tracing::debug!(module = %plan.module_name, path = %path.display(), "plan saved");
        Ok(())
    }

    /// Load the plan for `module_name`.
    ///
    /// A missing file is [`BricksmithError::PlanNotFound`]; a malformed one
    /// is [`BricksmithError::PlanCorrupt`] — never a silent empty plan.
    pub fn load_plan(&self, module_name: &str) -> Result<Plan> {
        let path = self.path_for(module_name);
        if !path.exists() {
            return Err(BricksmithError::PlanNotFound(module_name.to_string()));
        }
        let data = std::fs::read_to_string(&path)?;
        let plan: Plan =
            serde_json::from_str(&data).map_err(|e| BricksmithError::PlanCorrupt {
                module: module_name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(plan)
    }

    pub fn plan_exists(&self, module_name: &str) -> bool {
        self.path_for(module_name).exists()
    }

    /// Remove the stored plan (no-op if none exists). Used by
    /// `--refresh-plan`.
    pub fn delete_plan(&self, module_name: &str) -> Result<()> {
        let path = self.path_for(module_name);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn path_for(&self, module_name: &str) -> PathBuf {
        paths::plan_path(&self.plans_dir, module_name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
