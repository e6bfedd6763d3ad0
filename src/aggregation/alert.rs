use serde::{Deserialize, Serialize};

/// Whether traffic is currently considered high
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlertState {
    /// Average at or below the threshold
    #[default]
    Normal,
    /// Average went above the threshold and has not come back down
    Alerting,
}

/// Two-state hysteresis over the moving average
///
/// Enters `Alerting` when the average is strictly above the threshold and
/// returns to `Normal` once it is at or below it. Only edges are reported.
#[derive(Debug, Clone)]
pub struct AlertTracker {
    state: AlertState,
    threshold: f64,
}

impl AlertTracker {
    /// Create a tracker in the `Normal` state
    pub fn new(threshold: f64) -> Self {
        Self {
            state: AlertState::Normal,
            threshold,
        }
    }

    /// Feed the latest average. Returns the new state if it changed.
    pub fn evaluate(&mut self, average: f64) -> Option<AlertState> {
        let next = match self.state {
            AlertState::Normal if average > self.threshold => AlertState::Alerting,
            AlertState::Alerting if average <= self.threshold => AlertState::Normal,
            _ => return None,
        };
        self.state = next;
        Some(next)
    }

    /// Current state
    pub fn state(&self) -> AlertState {
        self.state
    }

    /// Threshold in hits per second
    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}
