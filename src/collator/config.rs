use crate::error::{MonitorError, Result};
use std::time::Duration;

/// Upper bound on samples held by the moving window
pub const MAX_WINDOW_SAMPLES: usize = 1_000_000;

/// Timing and buffering for the collator
#[derive(Debug, Clone)]
pub struct CollatorConfig {
    /// How often a sample is pushed into the moving window and a status sent
    pub sample_interval: Duration,
    /// How often the site breakdown is sent
    pub report_interval: Duration,
    /// Span covered by the moving average
    pub window: Duration,
    /// Capacity of each output channel; 1 is a near-rendezvous handoff
    pub event_buffer: usize,
}

impl Default for CollatorConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(1),
            report_interval: Duration::from_secs(10),
            window: Duration::from_secs(2 * 60),
            event_buffer: 1,
        }
    }
}

impl CollatorConfig {
    /// Number of samples the moving window holds
    pub fn window_capacity(&self) -> usize {
        let samples = self.window.as_nanos() / self.sample_interval.as_nanos().max(1);
        usize::try_from(samples).unwrap_or(usize::MAX).max(1)
    }

    /// Check that the timers can run
    pub fn validate(&self) -> Result<()> {
        if self.sample_interval.is_zero() {
            return Err(MonitorError::Config("sample_interval must be non-zero".into()));
        }
        if self.report_interval.is_zero() {
            return Err(MonitorError::Config("report_interval must be non-zero".into()));
        }
        if self.window < self.sample_interval {
            return Err(MonitorError::Config(
                "window must span at least one sample_interval".into(),
            ));
        }
        if self.window_capacity() > MAX_WINDOW_SAMPLES {
            return Err(MonitorError::Config(format!(
                "window holds {} samples, at most {} are allowed",
                self.window_capacity(),
                MAX_WINDOW_SAMPLES
            )));
        }
        if self.event_buffer == 0 {
            return Err(MonitorError::Config("event_buffer must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_window_capacity() {
        assert_eq!(CollatorConfig::default().window_capacity(), 120);
        assert!(CollatorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_settings() {
        let config = CollatorConfig {
            sample_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CollatorConfig {
            window: Duration::from_millis(10),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CollatorConfig {
            event_buffer: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_window_rejected() {
        let config = CollatorConfig {
            sample_interval: Duration::from_nanos(1),
            window: Duration::from_secs(u64::MAX),
            ..Default::default()
        };
        assert_eq!(config.window_capacity(), usize::MAX);
        assert!(matches!(config.validate(), Err(MonitorError::Config(_))));

        let config = CollatorConfig {
            sample_interval: Duration::from_millis(1),
            window: Duration::from_secs(1000),
            ..Default::default()
        };
        assert_eq!(config.window_capacity(), MAX_WINDOW_SAMPLES);
        assert!(config.validate().is_ok());
    }
}
