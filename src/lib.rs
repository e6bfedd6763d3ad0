//! Live monitoring of HTTP access logs
//!
//! This library follows a Common Log Format file as it grows, keeps a
//! two-minute moving average of hits per second, ranks the most visited
//! sections of the site, and raises and clears high-traffic alerts.
//!
//! The work is split across three tokio tasks connected by channels:
//! a [`watcher`] that tails the file, a [`parser`] that turns lines into
//! [`AccessRecord`]s, and the [`collator`] that owns all statistics and emits
//! events.
//!
//! # Example
//!
//! ```no_run
//! use weblog_monitor::{Monitor, MonitorConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> weblog_monitor::Result<()> {
//! let config = MonitorConfig::builder()
//!     .log_path("/tmp/access.log")
//!     .alert_threshold(10.0)
//!     .build();
//!
//! let (monitor, mut events) = Monitor::start(&config, CancellationToken::new()).await?;
//!
//! // Every output must be drained: the collator waits for slow consumers
//! loop {
//!     tokio::select! {
//!         Some(status) = events.status.recv() => println!("{} hits", status.hits_last_interval),
//!         Some(sites) = events.sites.recv() => println!("{} sites", sites.sites.len()),
//!         Some(alert) = events.alerts.recv() => println!("alerting: {}", alert.in_alert),
//!         else => break,
//!     }
//! }
//! if let Some(err) = events.errors.recv().await {
//!     eprintln!("monitor stopped: {}", err);
//! }
//! monitor.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]

// Re-export commonly used items
pub use collator::{Alert, CollatorConfig, EventStreams, Site, Sites, Status};
pub use config::{MonitorConfig, MonitorConfigBuilder};
pub use error::{MonitorError, Result};
pub use monitor::{Monitor, PipelineSettings, ResetHandle};
pub use record::AccessRecord;

/// Error types
pub mod error;

/// Operator-facing configuration
pub mod config;

/// Parsed access records
pub mod record;

/// Following the log file
pub mod watcher;

/// Common Log Format parsing
pub mod parser;

/// Moving average, site counters and alert hysteresis
pub mod aggregation;

/// The collation engine
pub mod collator;

/// Stage lifecycle and shutdown
pub mod shutdown;

/// Pipeline assembly
pub mod monitor;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install a JSON tracing subscriber on stderr, keeping stdout free for
/// events. `RUST_LOG` overrides `default_level`.
pub fn init_tracing(default_level: tracing::Level) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::from_level(default_level).into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();
}
