use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while following the monitored file
#[derive(Debug, Error)]
pub enum WatchError {
    /// The file could not be opened
    #[error("cannot open {path}: {source}")]
    Open {
        /// Watched path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Reading or inspecting the file failed (includes invalid UTF-8)
    #[error("cannot read {path}: {source}")]
    Read {
        /// Watched path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The file disappeared and nothing replaced it within the grace period
    #[error("{path} has been missing for more than {grace:?}")]
    Vanished {
        /// Watched path
        path: PathBuf,
        /// How long the watcher waited for a replacement
        grace: Duration,
    },
}
