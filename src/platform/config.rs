//! `rehearse.toml` config loading.

use serde::{Deserialize, Serialize};

use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Update modes enabled by default for `rehearse run` (CLI flags add to
    /// these). Accepts the same names as the `--update-*` flags, plus
    /// `result` (expands to stdout + exit) and `all`.
    #[serde(default)]
    pub update: Vec<String>,

    /// Widen `in` sets instead of downgrading them to literals on repair.
    #[serde(default)]
    pub promote_constraints: bool,

    /// Re-run a rewritten scenario to verify the repair reached a fixed point.
    #[serde(default = "default_verify_fixed_point")]
    pub verify_fixed_point: bool,

    /// Keep a `<scenario>.orig` copy before rewriting.
    #[serde(default)]
    pub backup: bool,

    /// Glob patterns used when `rehearse run` is given no scenario paths.
    #[serde(default = "default_scenario_globs")]
    pub scenario_globs: Vec<String>,
}

fn default_verify_fixed_point() -> bool {
    true
}

fn default_scenario_globs() -> Vec<String> {
    vec!["scenarios/**/*.yaml".to_string(), "scenarios/**/*.yml".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            update: Vec::new(),
            promote_constraints: false,
            verify_fixed_point: default_verify_fixed_point(),
            backup: false,
            scenario_globs: default_scenario_globs(),
        }
    }
}

impl Config {
    /// Missing configs are treated as "defaults"; malformed configs warn and
    /// fall back to defaults rather than aborting a test run.
    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<Config>(&s) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_uses_defaults() {
        let cfg = Config::load_optional(Path::new("/nonexistent/rehearse.toml"));
        assert!(cfg.update.is_empty());
        assert!(cfg.verify_fixed_point);
        assert!(!cfg.backup);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: Config = toml::from_str("update = [\"stdout\"]\n").expect("parse");
        assert_eq!(cfg.update, vec!["stdout".to_string()]);
        assert!(cfg.verify_fixed_point);
    }
}
