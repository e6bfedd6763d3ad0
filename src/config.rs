//! Monitor configuration

use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What to watch and when to alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// Access log to follow
    pub log_path: PathBuf,

    /// Moving average of hits per second above which an alert is raised
    pub alert_threshold: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("/tmp/access.log"),
            alert_threshold: 10.0,
        }
    }
}

impl MonitorConfig {
    /// Create a configuration builder
    pub fn builder() -> MonitorConfigBuilder {
        MonitorConfigBuilder::new()
    }

    /// Decode a YAML document and validate it
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and decode a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            MonitorError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&yaml)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.log_path.as_os_str().is_empty() {
            return Err(MonitorError::Config("log_path must not be empty".into()));
        }
        if !self.alert_threshold.is_finite() || self.alert_threshold < 0.0 {
            return Err(MonitorError::Config(format!(
                "alert_threshold must be a finite, non-negative number, got {}",
                self.alert_threshold
            )));
        }
        Ok(())
    }
}

/// Builder for MonitorConfig
#[derive(Debug, Default)]
pub struct MonitorConfigBuilder {
    config: MonitorConfig,
}

impl MonitorConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the access log path
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_path = path.into();
        self
    }

    /// Set the alert threshold in hits per second
    pub fn alert_threshold(mut self, threshold: f64) -> Self {
        self.config.alert_threshold = threshold;
        self
    }

    /// Build the configuration without validating it
    pub fn build(self) -> MonitorConfig {
        self.config
    }
}
