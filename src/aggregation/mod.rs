//! Aggregate state owned by the collator: the moving average of hits, the
//! per-site counters and the alert hysteresis.

/// Fixed-capacity moving average
pub mod moving_window;
/// Per-site hit counting and ranking
pub mod site_counter;
/// Alert hysteresis
pub mod alert;

pub use alert::{AlertState, AlertTracker};
pub use moving_window::MovingWindow;
pub use site_counter::SiteCounter;
