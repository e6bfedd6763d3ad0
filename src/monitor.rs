//! Pipeline wiring: watcher → parser → collator

use crate::collator::{Collator, CollatorConfig, CollatorInputs, EventStreams};
use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::parser::{run_parse_stage, CommonLogParser, LineParser};
use crate::shutdown::{ShutdownCoordinator, ShutdownState};
use crate::watcher::{run_watch_stage, FileWatcher, LineSource, WatcherConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Tuning that is not part of the operator-facing configuration
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Collator timers and output buffering
    pub collator: CollatorConfig,
    /// File polling behaviour
    pub watcher: WatcherConfig,
    /// Capacity of the line and record channels between stages
    pub stage_buffer: usize,
    /// How long [`Monitor::shutdown`] waits for stages before aborting them
    pub shutdown_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            collator: CollatorConfig::default(),
            watcher: WatcherConfig::default(),
            stage_buffer: 1,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Sends reset commands to a running collator
#[derive(Debug, Clone)]
pub struct ResetHandle {
    tx: mpsc::Sender<()>,
}

impl ResetHandle {
    /// Ask the collator to clear its site counters
    pub async fn reset(&self) -> Result<()> {
        self.tx.send(()).await.map_err(|_| MonitorError::NotRunning)
    }
}

/// A running monitoring pipeline
///
/// The stages stop when the token passed to [`Monitor::start`] is cancelled,
/// when [`Monitor::cancel`] or [`Monitor::shutdown`] is called, or on their own
/// after a fatal error.
#[derive(Debug)]
pub struct Monitor {
    reset: ResetHandle,
    coordinator: ShutdownCoordinator,
}

impl Monitor {
    /// Start following `config.log_path` with default settings
    pub async fn start(config: &MonitorConfig, cancel: CancellationToken) -> Result<(Self, EventStreams)> {
        Self::start_with(config, PipelineSettings::default(), cancel).await
    }

    /// Start following `config.log_path`. Fails if the configuration is
    /// invalid or the file cannot be opened.
    pub async fn start_with(
        config: &MonitorConfig,
        settings: PipelineSettings,
        cancel: CancellationToken,
    ) -> Result<(Self, EventStreams)> {
        config.validate()?;
        settings.collator.validate()?;
        settings.watcher.validate()?;
        let watcher = FileWatcher::open(&config.log_path, settings.watcher.clone()).await?;
        info!(
            "Monitoring {} with alert threshold {}",
            config.log_path.display(),
            config.alert_threshold
        );
        Self::spawn(
            watcher,
            CommonLogParser,
            config.alert_threshold,
            settings,
            cancel,
        )
    }

    /// Wire an arbitrary line source and parser to a collator and spawn the
    /// three stages. Must be called from within a tokio runtime. Nothing is
    /// spawned if the collator settings do not validate.
    pub fn spawn<S, P>(
        source: S,
        parser: P,
        alert_threshold: f64,
        settings: PipelineSettings,
        cancel: CancellationToken,
    ) -> Result<(Self, EventStreams)>
    where
        S: LineSource,
        P: LineParser,
    {
        let (collator, streams) = Collator::new(settings.collator, alert_threshold)?;
        let stage_buffer = settings.stage_buffer.max(1);
        let (lines_tx, lines_rx) = mpsc::channel(stage_buffer);
        let (records_tx, records_rx) = mpsc::channel(stage_buffer);
        let (fatal_tx, fatal_rx) = mpsc::channel(1);
        let (reset_tx, reset_rx) = mpsc::channel(1);

        let inputs = CollatorInputs {
            records: records_rx,
            fatal: fatal_rx,
            reset: reset_rx,
        };

        let state = Arc::new(ShutdownState::new(cancel.child_token()));
        let token = state.token().clone();
        let mut coordinator = ShutdownCoordinator::new(state, settings.shutdown_timeout);

        coordinator.spawn(
            "watcher",
            run_watch_stage(source, lines_tx, fatal_tx.clone(), token.clone()),
        );
        coordinator.spawn(
            "parser",
            run_parse_stage(parser, lines_rx, records_tx, fatal_tx, token.clone()),
        );
        coordinator.spawn("collator", async move {
            collator.run(inputs, token).await;
        });

        let monitor = Self {
            reset: ResetHandle { tx: reset_tx },
            coordinator,
        };
        Ok((monitor, streams))
    }

    /// Clear the collator's site counters. The next site report reflects it.
    pub async fn reset(&self) -> Result<()> {
        self.reset.reset().await
    }

    /// A cloneable handle for sending resets from another task
    pub fn reset_handle(&self) -> ResetHandle {
        self.reset.clone()
    }

    /// Whether the pipeline is still running
    pub fn is_running(&self) -> bool {
        !self.coordinator.state().is_shutting_down()
    }

    /// Number of stages that have not exited yet
    pub fn running_stages(&self) -> usize {
        self.coordinator.state().running_stages()
    }

    /// Ask every stage to stop without waiting for them
    pub fn cancel(&self) {
        self.coordinator.state().begin_shutdown();
    }

    /// Stop every stage and wait for them, within the configured timeout
    pub async fn shutdown(self) -> Result<()> {
        self.coordinator.shutdown().await
    }

    /// Wait until the pipeline stops by itself (fatal error, cancellation of
    /// the parent token, or end of input)
    pub async fn wait(self) {
        self.coordinator.join().await
    }
}
