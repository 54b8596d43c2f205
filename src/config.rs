//! Configuration loaded from `pursuit.toml`.
//!
//! [`PursuitConfig`] holds every tunable parameter. Keys missing from the
//! file fall back to defaults, so an empty or absent file is valid.

use anyhow::Result;
use serde::Deserialize;
use std::path::Path;

use crate::workflow::model::{AutomationLevel, WorkflowConfig};

/// Top-level configuration loaded from `pursuit.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct PursuitConfig {
    /// Default automation level for new workflows.
    #[serde(default = "default_automation_level")]
    pub automation_level: AutomationLevel,

    /// Whether generated packages go through a review step.
    #[serde(default = "default_require_review")]
    pub require_review: bool,

    /// Whether submissions go out without a final confirmation.
    #[serde(default)]
    pub auto_submit: bool,

    /// Maximum workflows a single user may have in flight.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_applications: u32,

    /// Minimum predicted success score before proceeding is recommended.
    #[serde(default = "default_success_threshold")]
    pub success_probability_threshold: f64,

    /// Package quality above which fully automated review auto-approves.
    #[serde(default = "default_quality_threshold")]
    pub quality_auto_approve_threshold: f64,

    /// Whether failed stages are retried at all.
    #[serde(default = "default_retry_failed_stages")]
    pub retry_failed_stages: bool,

    /// Retries per stage after the initial attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries_per_stage: u32,

    /// Delay between retry attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Seconds between background status sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Seconds to wait before retrying after a failed sweep.
    #[serde(default = "default_sweep_error_backoff_secs")]
    pub sweep_error_backoff_secs: u64,

    /// Days without activity before an application is flagged stale.
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: i64,
}

fn default_automation_level() -> AutomationLevel {
    AutomationLevel::SemiAutomated
}

fn default_require_review() -> bool {
    true
}

fn default_max_concurrent() -> u32 {
    3
}

fn default_success_threshold() -> f64 {
    0.6
}

fn default_quality_threshold() -> f64 {
    0.7
}

fn default_retry_failed_stages() -> bool {
    true
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    30_000
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_sweep_error_backoff_secs() -> u64 {
    300
}

fn default_stale_after_days() -> i64 {
    30
}

impl Default for PursuitConfig {
    fn default() -> Self {
        Self {
            automation_level: default_automation_level(),
            require_review: default_require_review(),
            auto_submit: false,
            max_concurrent_applications: default_max_concurrent(),
            success_probability_threshold: default_success_threshold(),
            quality_auto_approve_threshold: default_quality_threshold(),
            retry_failed_stages: default_retry_failed_stages(),
            max_retries_per_stage: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            sweep_interval_secs: default_sweep_interval_secs(),
            sweep_error_backoff_secs: default_sweep_error_backoff_secs(),
            stale_after_days: default_stale_after_days(),
        }
    }
}

impl PursuitConfig {
    /// Load configuration from `pursuit.toml` in the current directory.
    /// Falls back to defaults when the file does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("pursuit.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(toml::from_str::<PursuitConfig>(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    /// The per-workflow config snapshot derived from this configuration.
    pub fn workflow_config(&self) -> WorkflowConfig {
        WorkflowConfig {
            automation_level: self.automation_level,
            require_review: self.require_review,
            auto_submit: self.auto_submit,
            max_concurrent_applications: self.max_concurrent_applications,
            success_probability_threshold: self.success_probability_threshold,
            quality_auto_approve_threshold: self.quality_auto_approve_threshold,
            retry_failed_stages: self.retry_failed_stages,
            max_retries_per_stage: self.max_retries_per_stage,
            retry_delay_ms: self.retry_delay_ms,
            ..WorkflowConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let config = PursuitConfig::default();
        assert_eq!(config.automation_level, AutomationLevel::SemiAutomated);
        assert!(config.require_review);
        assert!(!config.auto_submit);
        assert_eq!(config.max_retries_per_stage, 2);
        assert_eq!(config.sweep_interval_secs, 3600);
        assert_eq!(config.stale_after_days, 30);
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            automation_level = "fully_automated"
            auto_submit = true
            sweep_interval_secs = 60
        "#;
        let config: PursuitConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.automation_level, AutomationLevel::FullyAutomated);
        assert!(config.auto_submit);
        assert_eq!(config.sweep_interval_secs, 60);
        // Untouched keys keep their defaults.
        assert_eq!(config.max_retries_per_stage, 2);
        assert_eq!(config.success_probability_threshold, 0.6);
    }

    #[test]
    fn load_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PursuitConfig::load_from(&dir.path().join("pursuit.toml")).unwrap();
        assert_eq!(config.stale_after_days, 30);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pursuit.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "stale_after_days = 45").unwrap();

        let config = PursuitConfig::load_from(&path).unwrap();
        assert_eq!(config.stale_after_days, 45);
    }

    #[test]
    fn workflow_config_mirrors_settings() {
        let config = PursuitConfig {
            automation_level: AutomationLevel::FullyAutomated,
            auto_submit: true,
            max_retries_per_stage: 5,
            ..Default::default()
        };
        let wf = config.workflow_config();
        assert_eq!(wf.automation_level, AutomationLevel::FullyAutomated);
        assert!(wf.auto_submit);
        assert_eq!(wf.max_retries_per_stage, 5);
    }
}
