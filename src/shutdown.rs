//! Graceful shutdown management for the pipeline stages

use crate::error::{MonitorError, Result};
use futures::future::join_all;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shared view of the pipeline's shutdown progress
#[derive(Debug)]
pub struct ShutdownState {
    /// Token observed by every stage
    token: CancellationToken,
    /// Number of stages that have not exited yet
    running_stages: AtomicUsize,
    /// Shutdown initiated timestamp
    shutdown_start: Mutex<Option<Instant>>,
}

impl ShutdownState {
    /// Create a new shutdown state around the stages' token
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            running_stages: AtomicUsize::new(0),
            shutdown_start: Mutex::new(None),
        }
    }

    /// The token every stage watches
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Begin the shutdown process. Calling this more than once is harmless.
    pub fn begin_shutdown(&self) {
        let mut start = self.shutdown_start.lock();
        if start.is_none() {
            *start = Some(Instant::now());
            info!("Shutdown initiated");
        }
        self.token.cancel();
    }

    /// Check if shutdown is in progress, whoever started it
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Register a running stage; it counts as running until the guard drops
    pub fn stage_started(self: &Arc<Self>, name: &'static str) -> StageGuard {
        let count = self.running_stages.fetch_add(1, Ordering::AcqRel) + 1;
        debug!("Stage {} started ({} running)", name, count);
        StageGuard {
            state: Arc::clone(self),
            name,
        }
    }

    /// Number of stages still running
    pub fn running_stages(&self) -> usize {
        self.running_stages.load(Ordering::Acquire)
    }

    /// Get the duration since shutdown started
    pub fn shutdown_duration(&self) -> Option<Duration> {
        self.shutdown_start.lock().map(|start| start.elapsed())
    }
}

/// Marks a stage as running for as long as it is alive
#[derive(Debug)]
pub struct StageGuard {
    state: Arc<ShutdownState>,
    name: &'static str,
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let previous = self.state.running_stages.fetch_sub(1, Ordering::AcqRel);
        debug!(
            "Stage {} exited ({} running)",
            self.name,
            previous.saturating_sub(1)
        );
    }
}

/// Owns the stage tasks and stops them
#[derive(Debug)]
pub struct ShutdownCoordinator {
    /// Shutdown state
    state: Arc<ShutdownState>,
    /// Timeout for graceful shutdown
    timeout: Duration,
    /// Spawned stages
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new(state: Arc<ShutdownState>, timeout: Duration) -> Self {
        Self {
            state,
            timeout,
            tasks: Vec::new(),
        }
    }

    /// Shared shutdown state
    pub fn state(&self) -> &Arc<ShutdownState> {
        &self.state
    }

    /// Spawn a stage that counts as running until `stage` completes
    pub fn spawn<F>(&mut self, name: &'static str, stage: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.state.stage_started(name);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            stage.await;
        });
        self.tasks.push((name, handle));
    }

    /// Wait for every stage to finish on its own
    pub async fn join(self) {
        let (names, handles): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();
        for (name, result) in names.into_iter().zip(join_all(handles).await) {
            if let Err(e) = result {
                warn!("Stage {} ended abnormally: {}", name, e);
            }
        }
    }

    /// Execute graceful shutdown: cancel the token, then give the stages
    /// until the timeout to exit. Stages still running are aborted.
    pub async fn shutdown(self) -> Result<()> {
        self.state.begin_shutdown();
        let deadline = Instant::now() + self.timeout;
        let mut stragglers = 0;

        for (name, mut handle) in self.tasks {
            match timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => debug!("Stage {} shut down gracefully", name),
                Ok(Err(e)) => warn!("Stage {} ended abnormally during shutdown: {}", name, e),
                Err(_) => {
                    warn!("Stage {} did not stop within {:?}, aborting", name, self.timeout);
                    handle.abort();
                    stragglers += 1;
                }
            }
        }

        if let Some(elapsed) = self.state.shutdown_duration() {
            info!("Shutdown completed in {:?}", elapsed);
        }
        if stragglers > 0 {
            return Err(MonitorError::ShutdownTimeout(stragglers));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_state() {
        let state = Arc::new(ShutdownState::new(CancellationToken::new()));

        assert!(!state.is_shutting_down());
        assert!(state.shutdown_duration().is_none());

        let guard = state.stage_started("watcher");
        assert_eq!(state.running_stages(), 1);

        state.begin_shutdown();
        state.begin_shutdown();
        assert!(state.is_shutting_down());
        assert!(state.token().is_cancelled());
        assert!(state.shutdown_duration().is_some());

        drop(guard);
        assert_eq!(state.running_stages(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_coordinator() {
        let state = Arc::new(ShutdownState::new(CancellationToken::new()));
        let mut coordinator = ShutdownCoordinator::new(state.clone(), Duration::from_secs(1));

        let token = state.token().clone();
        coordinator.spawn("cooperative", async move {
            token.cancelled().await;
        });
        assert_eq!(state.running_stages(), 1);

        let result = coordinator.shutdown().await;
        assert!(result.is_ok());
        assert_eq!(state.running_stages(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_stuck_stage() {
        let state = Arc::new(ShutdownState::new(CancellationToken::new()));
        let mut coordinator = ShutdownCoordinator::new(state.clone(), Duration::from_millis(100));

        coordinator.spawn("stuck", std::future::pending());

        let result = coordinator.shutdown().await;
        assert!(matches!(result, Err(MonitorError::ShutdownTimeout(1))));
    }

    #[tokio::test]
    async fn test_parent_cancel_is_visible() {
        let parent = CancellationToken::new();
        let state = ShutdownState::new(parent.child_token());
        parent.cancel();
        assert!(state.is_shutting_down());
    }
}
