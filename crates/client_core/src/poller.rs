//! Background re-fetch of analysis tasks while any of them is still
//! pending or processing.

use std::{sync::Arc, time::Duration};

use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{store::Settlement, stores::AnalysisStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(2_000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 12,
        }
    }
}

impl PollSchedule {
    /// Delay before the zero-based `attempt`: doubled each time, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

pub struct TaskStatusPoller {
    schedule: PollSchedule,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TaskStatusPoller {
    pub fn new(schedule: PollSchedule) -> Self {
        Self {
            schedule,
            handle: Mutex::new(None),
        }
    }

    pub fn schedule(&self) -> PollSchedule {
        self.schedule
    }

    /// Spawns the poll loop unless one is already running. Returns whether a
    /// new loop was started.
    pub async fn ensure_running(&self, analysis: Arc<AnalysisStore>) -> bool {
        let mut guard = self.handle.lock().await;
        if guard.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("poller: already running");
            return false;
        }

        let schedule = self.schedule;
        *guard = Some(tokio::spawn(async move {
            poll_until_settled(analysis, schedule).await;
        }));
        info!(
            max_attempts = schedule.max_attempts,
            "poller: watching analysis task status"
        );
        true
    }

    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Waits for the current loop, if any, to finish on its own.
    pub async fn join(&self) {
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    warn!("poller: loop ended abnormally: {err}");
                }
            }
        }
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
            debug!("poller: stopped");
        }
    }
}

async fn poll_until_settled(analysis: Arc<AnalysisStore>, schedule: PollSchedule) {
    for attempt in 0..schedule.max_attempts {
        tokio::time::sleep(schedule.delay_for(attempt)).await;
        match analysis.fetch_tasks().await {
            Settlement::Applied(tasks) => {
                let pending = tasks
                    .iter()
                    .filter(|task| !task.status.is_terminal())
                    .count();
                debug!(attempt, pending, "poller: tasks refreshed");
                if pending == 0 {
                    info!(attempt, "poller: all analysis tasks settled");
                    return;
                }
            }
            Settlement::Failed(message) => {
                warn!(attempt, error = %message, "poller: refresh failed");
            }
            Settlement::Superseded => {
                debug!(attempt, "poller: refresh superseded");
            }
        }
    }
    info!(
        attempts = schedule.max_attempts,
        "poller: giving up with tasks still pending"
    );
}
