//! The collation engine
//!
//! A single task owns every piece of aggregate state and multiplexes its
//! inputs with `tokio::select!`, so nothing here needs a lock:
//!
//! - each [`AccessRecord`] bumps the interval hit counter and its site
//! - the sample timer pushes the counter into the [`MovingWindow`], sends a
//!   [`Status`] and runs the alert hysteresis
//! - the report timer sends the ranked [`Sites`]
//! - a reset command clears the site counters
//! - a fatal upstream error is forwarded and stops the engine
//!
//! Outputs are bounded channels. A consumer that stops reading stalls the
//! engine, and through it the whole pipeline. Every send also watches the
//! cancellation token, so a stalled engine can still be stopped.

/// Collator timing configuration
pub mod config;
/// Output events and channels
pub mod events;

pub use config::{CollatorConfig, MAX_WINDOW_SAMPLES};
pub use events::{Alert, EventStreams, Site, Sites, Status};

use crate::aggregation::{AlertState, AlertTracker, MovingWindow, SiteCounter};
use crate::error::MonitorError;
use crate::record::AccessRecord;
use chrono::Utc;
use events::{event_channels, EventSenders};
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Why the collator stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollatorExit {
    /// The cancellation token fired
    Cancelled,
    /// The record stream ended without an error
    UpstreamClosed,
    /// An upstream stage reported a fatal error
    Fatal,
}

/// Inputs multiplexed by the collator
#[derive(Debug)]
pub struct CollatorInputs {
    /// Parsed records from the parse stage
    pub records: mpsc::Receiver<AccessRecord>,
    /// Fatal errors from the watch and parse stages
    pub fatal: mpsc::Receiver<MonitorError>,
    /// Operator reset commands
    pub reset: mpsc::Receiver<()>,
}

/// Marker for "the token fired while an event was being handed off"
struct Stopped;

/// The collation engine state
#[derive(Debug)]
pub struct Collator {
    config: CollatorConfig,
    hits_this_interval: u64,
    ignored_paths: u64,
    sites: SiteCounter,
    window: MovingWindow,
    alert: AlertTracker,
    outputs: EventSenders,
}

impl Collator {
    /// Create a collator alerting above `alert_threshold` hits per sample
    /// interval, together with the receivers for its outputs. Fails if the
    /// configuration does not validate.
    pub fn new(config: CollatorConfig, alert_threshold: f64) -> crate::error::Result<(Self, EventStreams)> {
        config.validate()?;
        let (outputs, streams) = event_channels(config.event_buffer);
        let collator = Self {
            window: MovingWindow::new(config.window_capacity()),
            alert: AlertTracker::new(alert_threshold),
            sites: SiteCounter::new(),
            hits_this_interval: 0,
            ignored_paths: 0,
            config,
            outputs,
        };
        Ok((collator, streams))
    }

    /// Run until cancelled, until the record stream ends, or until a fatal
    /// error arrives.
    ///
    /// `cancel` is cancelled on return whatever the reason, which stops the
    /// other stages sharing it and releases the watched file. All output
    /// channels close when `self` is dropped at the end of this call.
    pub async fn run(mut self, mut inputs: CollatorInputs, cancel: CancellationToken) -> CollatorExit {
        let _stop_pipeline = cancel.clone().drop_guard();
        info!(
            "Collator started: threshold {}, window of {} samples",
            self.alert.threshold(),
            self.window.capacity()
        );

        let sample_timer = sleep(self.config.sample_interval);
        let report_timer = sleep(self.config.report_interval);
        tokio::pin!(sample_timer);
        tokio::pin!(report_timer);
        let mut reset_open = true;

        let exit = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break CollatorExit::Cancelled,

                Some(err) = inputs.fatal.recv() => {
                    error!("Stopping on fatal error: {}", err);
                    if let Err(e) = self.outputs.errors.try_send(err) {
                        warn!("Error channel unavailable: {}", e);
                    }
                    break CollatorExit::Fatal;
                }

                _ = &mut sample_timer => {
                    if self.on_sample_tick(&cancel).await.is_err() {
                        break CollatorExit::Cancelled;
                    }
                    sample_timer.as_mut().reset(Instant::now() + self.config.sample_interval);
                }

                _ = &mut report_timer => {
                    if self.on_report_tick(&cancel).await.is_err() {
                        break CollatorExit::Cancelled;
                    }
                    report_timer.as_mut().reset(Instant::now() + self.config.report_interval);
                }

                command = inputs.reset.recv(), if reset_open => match command {
                    Some(()) => {
                        debug!("Resetting {} site counters", self.sites.len());
                        self.sites.clear();
                    }
                    None => reset_open = false,
                },

                record = inputs.records.recv() => match record {
                    Some(record) => self.on_record(&record),
                    None => break CollatorExit::UpstreamClosed,
                },
            }
        };

        info!(
            "Collator stopped ({:?}); {} request(s) had no site key",
            exit, self.ignored_paths
        );
        exit
    }

    fn on_record(&mut self, record: &AccessRecord) {
        self.hits_this_interval += 1;
        if !self.sites.record(&record.path) {
            self.ignored_paths += 1;
        }
    }

    async fn on_sample_tick(&mut self, cancel: &CancellationToken) -> Result<(), Stopped> {
        let hits = std::mem::take(&mut self.hits_this_interval);
        self.window.push(hits);
        let average = self.window.average();
        debug!(hits, average, "Sample tick");

        let status = Status {
            hits_last_interval: hits,
            average_hits: average,
        };
        deliver(&mut self.outputs.status, status, cancel).await?;

        if let Some(state) = self.alert.evaluate(average) {
            let in_alert = state == AlertState::Alerting;
            if in_alert {
                warn!("High traffic: average {:.2} hits/s", average);
            } else {
                info!("Traffic recovered: average {:.2} hits/s", average);
            }
            let alert = Alert {
                in_alert,
                average_hits: average,
                time: Utc::now(),
            };
            deliver(&mut self.outputs.alerts, alert, cancel).await?;
        }
        Ok(())
    }

    async fn on_report_tick(&mut self, cancel: &CancellationToken) -> Result<(), Stopped> {
        let sites = Sites {
            sites: self
                .sites
                .ranked()
                .into_iter()
                .map(|(site, total_hits)| Site { site, total_hits })
                .collect(),
        };
        debug!(
            sites = sites.sites.len(),
            ignored = self.ignored_paths,
            "Report tick"
        );
        deliver(&mut self.outputs.sites, sites, cancel).await
    }
}

/// Hand `value` to the consumer behind `slot`, waiting for room.
///
/// A dropped receiver empties the slot so later events of that kind are
/// discarded. Fails only if `cancel` fires first.
async fn deliver<T>(
    slot: &mut Option<mpsc::Sender<T>>,
    value: T,
    cancel: &CancellationToken,
) -> Result<(), Stopped> {
    let Some(tx) = slot.as_ref() else {
        return Ok(());
    };
    let sent = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Stopped),
        sent = tx.send(value) => sent,
    };
    if sent.is_err() {
        debug!("Consumer went away, discarding further events of this kind");
        *slot = None;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::time::Duration;

    fn record(path: &str) -> AccessRecord {
        AccessRecord {
            host: "127.0.0.1".into(),
            ident: "-".into(),
            auth_user: "-".into(),
            timestamp: DateTime::parse_from_rfc3339("2018-05-09T16:00:39+00:00").unwrap(),
            method: "GET".into(),
            path: path.into(),
            protocol: Some("HTTP/1.0".into()),
            status: 200,
            size: Some(123),
        }
    }

    #[test]
    fn test_on_record_counts_hits_and_sites() {
        let (mut collator, _streams) = Collator::new(CollatorConfig::default(), 10.0).unwrap();
        collator.on_record(&record("/api/user"));
        collator.on_record(&record("/api/order"));
        collator.on_record(&record("/"));

        assert_eq!(collator.hits_this_interval, 3);
        assert_eq!(collator.ignored_paths, 1);
        assert_eq!(collator.sites.hits("/api"), 2);
    }

    #[test]
    fn test_new_rejects_unusable_config() {
        let zero_interval = CollatorConfig {
            sample_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            Collator::new(zero_interval, 10.0),
            Err(MonitorError::Config(_))
        ));

        let huge_window = CollatorConfig {
            sample_interval: Duration::from_nanos(1),
            window: Duration::from_secs(u64::MAX),
            ..Default::default()
        };
        assert!(matches!(
            Collator::new(huge_window, 10.0),
            Err(MonitorError::Config(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sample_tick_resets_counter() {
        let (mut collator, mut streams) = Collator::new(CollatorConfig::default(), 10.0).unwrap();
        let cancel = CancellationToken::new();
        for _ in 0..4 {
            collator.on_record(&record("/a/b"));
        }

        assert!(collator.on_sample_tick(&cancel).await.is_ok());
        assert_eq!(collator.hits_this_interval, 0);
        assert_eq!(
            streams.status.recv().await,
            Some(Status {
                hits_last_interval: 4,
                average_hits: 4.0
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deliver_gives_up_on_cancel() {
        let (tx, _rx) = mpsc::channel(1);
        let mut slot = Some(tx);
        let cancel = CancellationToken::new();
        assert!(deliver(&mut slot, 1u32, &cancel).await.is_ok());

        // The channel is full now, so this send would wait forever
        let pending = deliver(&mut slot, 2u32, &cancel);
        let canceller = async {
            sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        };
        let (result, ()) = tokio::join!(pending, canceller);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_deliver_drops_closed_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut slot = Some(tx);
        assert!(deliver(&mut slot, 1u32, &CancellationToken::new()).await.is_ok());
        assert!(slot.is_none());
    }
}
