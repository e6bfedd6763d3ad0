//! Common Log Format parsing
//!
//! The parse stage sits between the watcher and the collator. It converts each
//! raw line into an [`AccessRecord`]; the first line that fails to parse is
//! fatal for the whole pipeline.

/// Error types for parser operations
pub mod error;

pub use error::ParseError;

use crate::error::{report_fatal, MonitorError};
use crate::record::AccessRecord;
use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Timestamp layout used inside the brackets, e.g. `10/Oct/2000:13:55:36 -0700`
pub const CLF_TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// `host ident authuser [time] "method path protocol" status size`
static CLF_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(\S+) (\S+) (\S+) \[([^\]]+)\] "(\S+) (\S+)(?: (\S+))?" (\d{3}) (\d+|-)$"#,
    )
    .expect("Invalid common log format regex")
});

/// Converts one raw line into a structured record
pub trait LineParser: Send + Sync + 'static {
    /// Parse a single line, without its trailing newline
    fn parse(&self, line: &str) -> Result<AccessRecord, ParseError>;
}

/// Parser for the Common Log Format
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonLogParser;

impl LineParser for CommonLogParser {
    fn parse(&self, line: &str) -> Result<AccessRecord, ParseError> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let caps = CLF_LINE.captures(line).ok_or_else(|| ParseError::Malformed {
            line: line.to_string(),
        })?;

        let raw_time = &caps[4];
        let timestamp = DateTime::parse_from_str(raw_time, CLF_TIME_FORMAT).map_err(|e| {
            ParseError::InvalidTimestamp {
                value: raw_time.to_string(),
                reason: e.to_string(),
            }
        })?;

        let raw_status = &caps[8];
        let status = raw_status
            .parse::<u16>()
            .ok()
            .filter(|s| (100..=599).contains(s))
            .ok_or_else(|| ParseError::InvalidStatus(raw_status.to_string()))?;

        let size = match &caps[9] {
            "-" => None,
            raw => Some(
                raw.parse::<u64>()
                    .map_err(|_| ParseError::InvalidSize(raw.to_string()))?,
            ),
        };

        let target = &caps[6];
        let path = target.split_once('?').map_or(target, |(path, _)| path);

        Ok(AccessRecord {
            host: caps[1].to_string(),
            ident: caps[2].to_string(),
            auth_user: caps[3].to_string(),
            timestamp,
            method: caps[5].to_string(),
            path: path.to_string(),
            protocol: caps.get(7).map(|m| m.as_str().to_string()),
            status,
            size,
        })
    }
}

/// Run the parse stage until the line stream ends, a line fails to parse, or
/// the token is cancelled. Dropping `records_tx` on return closes the record
/// stream for the collator.
pub async fn run_parse_stage<P: LineParser>(
    parser: P,
    mut lines_rx: mpsc::Receiver<String>,
    records_tx: mpsc::Sender<AccessRecord>,
    fatal_tx: mpsc::Sender<MonitorError>,
    cancel: CancellationToken,
) {
    debug!("Parse stage started");
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines_rx.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        let record = match parser.parse(&line) {
            Ok(record) => record,
            Err(e) => {
                error!("Aborting pipeline on unparseable line: {}", e);
                report_fatal(&fatal_tx, e.into());
                break;
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = records_tx.send(record) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    debug!("Parse stage stopped");
}
