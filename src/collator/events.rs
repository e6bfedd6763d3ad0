//! Events emitted by the collator and the channels that carry them

use crate::error::MonitorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Sent once per sample interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// Requests seen during the interval that just ended
    pub hits_last_interval: u64,
    /// Moving average of hits per interval
    pub average_hits: f64,
}

/// Hits for a single site key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    /// Site key, e.g. `/api`
    pub site: String,
    /// Hits since start or the last reset
    pub total_hits: u64,
}

/// Sent once per report interval, most visited first
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Sites {
    /// Ranked sites
    pub sites: Vec<Site>,
}

/// Sent when traffic crosses the threshold in either direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// `true` when entering high traffic, `false` on recovery
    pub in_alert: bool,
    /// Moving average that caused the transition
    pub average_hits: f64,
    /// When the transition was detected
    pub time: DateTime<Utc>,
}

/// Receiving ends of the collator's outputs
///
/// Every channel closes when the collator stops. After that, `errors` holds
/// the fatal error that stopped it, if there was one.
#[derive(Debug)]
pub struct EventStreams {
    /// Per-interval status
    pub status: mpsc::Receiver<Status>,
    /// Periodic site breakdown
    pub sites: mpsc::Receiver<Sites>,
    /// Alert transitions
    pub alerts: mpsc::Receiver<Alert>,
    /// Terminal error, at most one
    pub errors: mpsc::Receiver<MonitorError>,
}

/// Sending ends, owned by the collator. A slot becomes `None` once its
/// receiver has been dropped.
#[derive(Debug)]
pub(crate) struct EventSenders {
    pub(crate) status: Option<mpsc::Sender<Status>>,
    pub(crate) sites: Option<mpsc::Sender<Sites>>,
    pub(crate) alerts: Option<mpsc::Sender<Alert>>,
    pub(crate) errors: mpsc::Sender<MonitorError>,
}

/// Create the output channels. Events use `buffer` slots each; the error
/// channel always has exactly one.
pub(crate) fn event_channels(buffer: usize) -> (EventSenders, EventStreams) {
    let buffer = buffer.max(1);
    let (status_tx, status_rx) = mpsc::channel(buffer);
    let (sites_tx, sites_rx) = mpsc::channel(buffer);
    let (alerts_tx, alerts_rx) = mpsc::channel(buffer);
    let (errors_tx, errors_rx) = mpsc::channel(1);

    (
        EventSenders {
            status: Some(status_tx),
            sites: Some(sites_tx),
            alerts: Some(alerts_tx),
            errors: errors_tx,
        },
        EventStreams {
            status: status_rx,
            sites: sites_rx,
            alerts: alerts_rx,
            errors: errors_rx,
        },
    )
}
