//! Crate-level error type

use crate::parser::ParseError;
use crate::watcher::WatchError;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Errors surfaced by the monitoring pipeline
///
/// `Parse` and `Watch` are the two fatal upstream conditions; they are what a
/// consumer receives on the error channel before every output closes.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A log line did not match the Common Log Format
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// The watched file could not be read
    #[error("watch error: {0}")]
    Watch(#[from] WatchError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file could not be decoded
    #[error("configuration decode error: {0}")]
    ConfigDecode(#[from] serde_yaml::Error),

    /// The engine is no longer accepting commands
    #[error("collator is not running")]
    NotRunning,

    /// A pipeline stage did not stop in time
    #[error("shutdown timed out with {0} stage(s) still running")]
    ShutdownTimeout(usize),
}

impl MonitorError {
    /// Whether this error terminated the pipeline on its own
    pub fn is_fatal(&self) -> bool {
        matches!(self, MonitorError::Parse(_) | MonitorError::Watch(_))
    }
}

/// Hand a fatal error to the collator without waiting.
///
/// The fatal channel holds a single error; if it is already occupied the
/// pipeline is shutting down anyway and the later error is only logged.
pub(crate) fn report_fatal(tx: &tokio::sync::mpsc::Sender<MonitorError>, err: MonitorError) {
    if let Err(e) = tx.try_send(err) {
        tracing::debug!("Dropping secondary fatal error: {}", e.into_inner());
    }
}
