use crate::error::{BricksmithError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const BRICKSMITH_DIR: &str = ".bricksmith";
pub const PLANS_DIR: &str = ".bricksmith/plans";
pub const MODULES_DIR: &str = ".bricksmith/modules";
pub const OUTPUT_DIR: &str = "generated";

pub const CONFIG_FILE: &str = ".bricksmith/config.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `<plans_dir>/<module_name>.json` — the persisted Plan artifact.
pub fn plan_path(plans_dir: &Path, module_name: &str) -> PathBuf {
    plans_dir.join(format!("{module_name}.json"))
}

/// `<module_root>/<brick_name>.contract.md`
pub fn brick_contract_path(module_root: &Path, brick_name: &str) -> PathBuf {
    module_root.join(format!("{brick_name}.contract.md"))
}

/// `<module_root>/<brick_name>.spec.md`
pub fn brick_spec_path(module_root: &Path, brick_name: &str) -> PathBuf {
    module_root.join(format!("{brick_name}.spec.md"))
}

/// `<output_root>/<target_directory>` — where a brick's generated files land.
pub fn brick_target_dir(output_root: &Path, target_directory: &str) -> PathBuf {
    output_root.join(target_directory)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn bricksmith_dir(root: &Path) -> PathBuf {
    root.join(BRICKSMITH_DIR)
}

// ---------------------------------------------------------------------------
// Path safety
// ---------------------------------------------------------------------------

/// Relative, and never traverses above its base. Generated paths and
/// target directories must satisfy this before anything is written.
pub fn is_safe_relative(path: &str) -> bool {
    let p = Path::new(path);
    if p.is_absolute() {
        return false;
    }
    let mut depth: i32 = 0;
    for comp in p.components() {
        match comp {
            std::path::Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            std::path::Component::Normal(_) => depth += 1,
            std::path::Component::CurDir => {}
            _ => return false,
        }
    }
    true
}

// ---------------------------------------------------------------------------
// Module name validation
// ---------------------------------------------------------------------------

static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9_\-]*[a-z0-9]$|^[a-z0-9]$").unwrap())
}

/// Module and brick names key plan files and directories, so they follow
/// the same slug rules.
pub fn validate_module_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 || !name_re().is_match(name) {
        return Err(BricksmithError::InvalidModuleName(name.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        for name in ["greeter", "a", "my-module-123", "parser_core", "x1"] {
            validate_module_name(name).unwrap_or_else(|_| panic!("expected valid: {name}"));
        }
    }

    #[test]
    fn invalid_names() {
        for name in [
            "",
            "-starts-with-dash",
            "ends-with-dash-",
            "has spaces",
            "UPPER",
            "a/b",
        ] {
            assert!(validate_module_name(name).is_err(), "expected invalid: {name}");
        }
    }

    #[test]
    fn path_helpers() {
        let plans = Path::new("/tmp/proj/.bricksmith/plans");
        assert_eq!(
            plan_path(plans, "greeter"),
            PathBuf::from("/tmp/proj/.bricksmith/plans/greeter.json")
        );
        let modules = Path::new("/tmp/proj/.bricksmith/modules");
        assert_eq!(
            brick_contract_path(modules, "greeting-core"),
            PathBuf::from("/tmp/proj/.bricksmith/modules/greeting-core.contract.md")
        );
        assert_eq!(
            brick_spec_path(modules, "greeting-core"),
            PathBuf::from("/tmp/proj/.bricksmith/modules/greeting-core.spec.md")
        );
    }
}
