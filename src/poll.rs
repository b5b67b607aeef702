use crate::client::JobService;
use crate::error::{StepError, StepErrorKind};
use crate::job::{Run, RunId};
use crate::config::DEFAULT_POLL_INTERVAL_SECS;

use std::time::Duration;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// How long and how often to check a run's state.
#[derive(Clone, Debug, PartialEq)]
pub struct PollOptions {
    pub interval: Duration,
    /// `None` checks forever.
    pub max_attempts: Option<u32>,
    /// `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        PollOptions {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            max_attempts: None,
            timeout: None,
        }
    }
}

/// Check the run once right away, then once per interval, until its
/// lifecycle state is terminal.
///
/// Returns the last observed run. Stops with an error when a check fails,
/// when `options` limits are reached, or when `cancel` fires.
pub async fn wait_for_termination<J: JobService>(
    jobs: &J,
    run_id: RunId,
    options: &PollOptions,
    cancel: &CancellationToken,
) -> Result<Run, StepError> {
    let started = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        let run = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(StepError::new(StepErrorKind::PollCancelled { run_id }));
            }
            run = jobs.get_run(run_id) => run?,
        };
        attempts += 1;

        let state = &run.state.life_cycle_state;
        info!(%run_id, %state, attempt = attempts, "state of run {run_id} is {state}");

        if state.is_terminal() {
            return Ok(run);
        }

        if let Some(max_attempts) = options.max_attempts {
            if attempts >= max_attempts {
                return Err(StepError::new(StepErrorKind::PollAttemptsExhausted { run_id, attempts }));
            }
        }

        if let Some(timeout) = options.timeout {
            if started.elapsed() + options.interval > timeout {
                return Err(StepError::new(StepErrorKind::PollTimeout { run_id, timeout }));
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(StepError::new(StepErrorKind::PollCancelled { run_id }));
            }
            _ = sleep(options.interval) => {}
        }
    }
}
