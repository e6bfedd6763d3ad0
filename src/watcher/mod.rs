//! Following a growing log file
//!
//! [`FileWatcher`] behaves like `tail -F`: it starts at the current end of the
//! file, yields complete lines as they are appended, and keeps following the
//! path when the file is rotated, recreated or truncated.

/// Error types for watcher operations
pub mod error;

pub use error::WatchError;

use crate::error::{report_fatal, MonitorError, Result as MonitorResult};
use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Tuning for the polling watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// How long to sleep at end of file before looking again
    pub poll_interval: Duration,
    /// How long a missing file may stay missing before it is fatal
    pub reopen_grace: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            reopen_grace: Duration::from_secs(5),
        }
    }
}

impl WatcherConfig {
    /// Check that polling cannot spin
    pub fn validate(&self) -> MonitorResult<()> {
        if self.poll_interval.is_zero() {
            return Err(MonitorError::Config("poll_interval must be non-zero".into()));
        }
        Ok(())
    }
}

/// A live sequence of raw text lines
#[async_trait]
pub trait LineSource: Send + 'static {
    /// Wait for the next complete line. `Ok(None)` means the source is
    /// exhausted and will never produce another line.
    async fn next_line(&mut self) -> Result<Option<String>, WatchError>;
}

/// Device and inode of an open file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    dev: u64,
    ino: u64,
}

#[cfg(unix)]
fn identity(meta: &std::fs::Metadata) -> Option<FileIdentity> {
    use std::os::unix::fs::MetadataExt;
    Some(FileIdentity {
        dev: meta.dev(),
        ino: meta.ino(),
    })
}

#[cfg(not(unix))]
fn identity(_meta: &std::fs::Metadata) -> Option<FileIdentity> {
    None
}

/// Polling `tail -F` over a single path
#[derive(Debug)]
pub struct FileWatcher {
    path: PathBuf,
    config: WatcherConfig,
    reader: BufReader<File>,
    offset: u64,
    identity: Option<FileIdentity>,
    pending: Vec<u8>,
    missing_since: Option<Instant>,
}

impl FileWatcher {
    /// Open `path` and position at its current end
    pub async fn open(path: impl AsRef<Path>, config: WatcherConfig) -> Result<Self, WatchError> {
        let path = path.as_ref().to_path_buf();
        let open_err = |source| WatchError::Open {
            path: path.clone(),
            source,
        };

        let mut file = File::open(&path).await.map_err(open_err)?;
        let meta = file.metadata().await.map_err(open_err)?;
        let offset = file.seek(SeekFrom::End(0)).await.map_err(open_err)?;
        info!("Watching {} from offset {}", path.display(), offset);

        Ok(Self {
            identity: identity(&meta),
            reader: BufReader::new(file),
            path,
            config,
            offset,
            pending: Vec::new(),
            missing_since: None,
        })
    }

    /// Path being followed
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_error(&self, source: std::io::Error) -> WatchError {
        WatchError::Read {
            path: self.path.clone(),
            source,
        }
    }

    /// Look at the path after hitting end of file. Returns `true` when a new
    /// file was opened and reading should resume immediately.
    async fn check_rotation(&mut self) -> Result<bool, WatchError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => {
                self.missing_since = None;
                let replaced = match (identity(&meta), self.identity) {
                    (Some(current), Some(open)) => current != open,
                    _ => false,
                };
                let truncated = meta.len() < self.offset;
                if replaced || truncated {
                    info!(
                        "{} was {}, reopening",
                        self.path.display(),
                        if replaced { "replaced" } else { "truncated" }
                    );
                    return self.reopen().await;
                }
                Ok(false)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.note_missing(),
            Err(e) => Err(self.read_error(e)),
        }
    }

    fn note_missing(&mut self) -> Result<bool, WatchError> {
        let since = *self.missing_since.get_or_insert_with(|| {
            warn!("{} is missing, waiting for it to reappear", self.path.display());
            Instant::now()
        });
        if since.elapsed() >= self.config.reopen_grace {
            return Err(WatchError::Vanished {
                path: self.path.clone(),
                grace: self.config.reopen_grace,
            });
        }
        Ok(false)
    }

    async fn reopen(&mut self) -> Result<bool, WatchError> {
        let file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return self.note_missing(),
            Err(e) => return Err(self.read_error(e)),
        };
        let meta = file.metadata().await.map_err(|e| self.read_error(e))?;

        if !self.pending.is_empty() {
            debug!("Discarding {} bytes of unterminated line", self.pending.len());
            self.pending.clear();
        }
        self.identity = identity(&meta);
        self.reader = BufReader::new(file);
        self.offset = 0;
        Ok(true)
    }
}

#[async_trait]
impl LineSource for FileWatcher {
    async fn next_line(&mut self) -> Result<Option<String>, WatchError> {
        loop {
            // read_until keeps partial bytes in `pending` if this future is dropped
            let read = match self.reader.read_until(b'\n', &mut self.pending).await {
                Ok(read) => read,
                Err(e) => return Err(self.read_error(e)),
            };
            self.offset += read as u64;

            if self.pending.last() == Some(&b'\n') {
                let mut raw = std::mem::take(&mut self.pending);
                raw.pop();
                if raw.last() == Some(&b'\r') {
                    raw.pop();
                }
                return String::from_utf8(raw).map(Some).map_err(|e| {
                    self.read_error(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
                });
            }
            if read > 0 {
                continue;
            }

            if !self.check_rotation().await? {
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }
    }
}

/// Run the watch stage until the source is exhausted, fails, or the token is
/// cancelled. The source (and with it the file handle) is dropped on return.
pub async fn run_watch_stage<S: LineSource>(
    mut source: S,
    lines_tx: mpsc::Sender<String>,
    fatal_tx: mpsc::Sender<MonitorError>,
    cancel: CancellationToken,
) {
    debug!("Watch stage started");
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            next = source.next_line() => match next {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    error!("Watcher failed: {}", e);
                    report_fatal(&fatal_tx, e.into());
                    break;
                }
            },
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = lines_tx.send(line) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    drop(source);
    debug!("Watch stage stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use tokio::time::timeout;

    fn fast_config() -> WatcherConfig {
        WatcherConfig {
            poll_interval: Duration::from_millis(10),
            reopen_grace: Duration::from_millis(200),
        }
    }

    fn append(path: &Path, text: &str) {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file.flush().unwrap();
    }

    async fn next(watcher: &mut FileWatcher) -> Result<Option<String>, WatchError> {
        timeout(Duration::from_secs(5), watcher.next_line())
            .await
            .expect("watcher produced nothing within 5s")
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        assert!(WatcherConfig::default().validate().is_ok());
        let config = WatcherConfig {
            poll_interval: Duration::ZERO,
            ..fast_config()
        };
        assert!(matches!(config.validate(), Err(MonitorError::Config(_))));
    }

    #[tokio::test]
    async fn test_open_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let result = FileWatcher::open(dir.path().join("absent.log"), fast_config()).await;
        assert!(matches!(result, Err(WatchError::Open { .. })));
    }

    #[tokio::test]
    async fn test_starts_at_end_of_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("access.log");
        append(&path, "old line\n");

        let mut watcher = FileWatcher::open(&path, fast_config()).await.unwrap();
        append(&path, "new line\r\n");

        assert_eq!(next(&mut watcher).await.unwrap().as_deref(), Some("new line"));
    }

    #[tokio::test]
    async fn test_holds_partial_line_until_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("access.log");
        append(&path, "");

        let mut watcher = FileWatcher::open(&path, fast_config()).await.unwrap();
        append(&path, "first ha");

        let pending = timeout(Duration::from_millis(100), watcher.next_line()).await;
        assert!(pending.is_err(), "partial line must not be emitted");

        append(&path, "lf\nsecond\n");
        assert_eq!(next(&mut watcher).await.unwrap().as_deref(), Some("first half"));
        assert_eq!(next(&mut watcher).await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_follows_rotated_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("access.log");
        append(&path, "");

        let mut watcher = FileWatcher::open(&path, fast_config()).await.unwrap();
        append(&path, "before rotation\n");
        assert_eq!(
            next(&mut watcher).await.unwrap().as_deref(),
            Some("before rotation")
        );

        std::fs::rename(&path, dir.path().join("access.log.1")).unwrap();
        append(&path, "after rotation\n");

        assert_eq!(
            next(&mut watcher).await.unwrap().as_deref(),
            Some("after rotation")
        );
    }

    #[tokio::test]
    async fn test_follows_truncation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("access.log");
        append(&path, "some history that is long\n");

        let mut watcher = FileWatcher::open(&path, fast_config()).await.unwrap();
        std::fs::write(&path, "short\n").unwrap();

        assert_eq!(next(&mut watcher).await.unwrap().as_deref(), Some("short"));
    }

    #[tokio::test]
    async fn test_vanished_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("access.log");
        append(&path, "");

        let mut watcher = FileWatcher::open(&path, fast_config()).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(
            next(&mut watcher).await,
            Err(WatchError::Vanished { .. })
        ));
    }

    #[tokio::test]
    async fn test_watch_stage_stops_on_cancel() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("access.log");
        append(&path, "");

        let watcher = FileWatcher::open(&path, fast_config()).await.unwrap();
        let (lines_tx, mut lines_rx) = mpsc::channel(4);
        let (fatal_tx, mut fatal_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let stage = tokio::spawn(run_watch_stage(watcher, lines_tx, fatal_tx, cancel.clone()));

        append(&path, "one\n");
        assert_eq!(lines_rx.recv().await.as_deref(), Some("one"));

        cancel.cancel();
        timeout(Duration::from_secs(5), stage).await.unwrap().unwrap();
        assert!(lines_rx.recv().await.is_none());
        assert!(fatal_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_watch_stage_reports_vanished_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("access.log");
        append(&path, "");

        let watcher = FileWatcher::open(&path, fast_config()).await.unwrap();
        let (lines_tx, mut lines_rx) = mpsc::channel(4);
        let (fatal_tx, mut fatal_rx) = mpsc::channel(1);
        let stage = tokio::spawn(run_watch_stage(
            watcher,
            lines_tx,
            fatal_tx,
            CancellationToken::new(),
        ));

        std::fs::remove_file(&path).unwrap();

        let err = timeout(Duration::from_secs(5), fatal_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(err, MonitorError::Watch(WatchError::Vanished { .. })));
        assert!(lines_rx.recv().await.is_none());
        stage.await.unwrap();
    }
}
