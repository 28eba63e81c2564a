// src/services/monitor.rs

//! Generation progress monitor.
//!
//! Polls a [`ProgressSource`] until the job completes or fails. Progress
//! polls are spaced by the fixed interval; transient failures (network
//! errors, unreadable payloads) back off exponentially with jitter and are
//! capped by a consecutive-failure budget. The whole run is bounded by a
//! maximum duration and can be cancelled between and during polls.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{CompletedGeneration, GenerationHandle, PollingConfig, ProgressStatus};

/// Anything that can report the state of a generation job.
#[async_trait]
pub trait ProgressSource: Send + Sync {
    /// Ask once for the job's state.
    async fn poll_progress(&self, handle: &GenerationHandle) -> Result<ProgressStatus>;

    /// Whether results for `handle` are still wanted.
    fn is_current(&self, _handle: &GenerationHandle) -> bool {
        true
    }
}

/// Drives a generation job to a terminal state.
pub struct ProgressMonitor {
    policy: PollingConfig,
    cancel: CancellationToken,
}

impl ProgressMonitor {
    pub fn new(policy: PollingConfig, cancel: CancellationToken) -> Self {
        Self { policy, cancel }
    }

    /// Poll until the job completes.
    ///
    /// `observe` sees every status in the order it was reported, including
    /// the terminal one. Returns the completion token on success and
    /// [`AppError::GenerationFailed`] when the remote reports a failure.
    pub async fn run<S, F>(
        &self,
        source: &S,
        handle: &GenerationHandle,
        mut observe: F,
    ) -> Result<CompletedGeneration>
    where
        S: ProgressSource + ?Sized,
        F: FnMut(&ProgressStatus),
    {
        let started = Instant::now();
        let budget = self.policy.max_duration();
        let mut failures: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(self.cancelled(handle));
            }
            if started.elapsed() >= budget {
                return Err(self.timed_out(handle, started));
            }

            let polled = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.cancelled(handle)),
                polled = source.poll_progress(handle) => polled,
            };

            let wait = match polled {
                Ok(status) => {
                    if !source.is_current(handle) {
                        log::warn!("Discarding progress for superseded ref key {}", handle);
                        return Err(AppError::StaleHandle(handle.ref_key().to_string()));
                    }
                    failures = 0;
                    observe(&status);

                    match status {
                        ProgressStatus::Complete => {
                            log::info!("Generation {} complete", handle);
                            return Ok(CompletedGeneration::new(handle.clone()));
                        }
                        ProgressStatus::Failed(message) => {
                            log::error!("Generation {} failed: {}", handle, message);
                            return Err(AppError::GenerationFailed(message));
                        }
                        ProgressStatus::Pending(percent) => {
                            log::debug!("Generation {} at {}%", handle, percent);
                            self.policy.interval()
                        }
                    }
                }
                Err(e) if e.is_transient() => {
                    failures += 1;
                    if failures > self.policy.max_transient_failures {
                        return Err(AppError::upstream(
                            "generator",
                            format!(
                                "giving up on {} after {} consecutive failed polls: {}",
                                handle,
                                failures,
                                e
                            ),
                        ));
                    }
                    let delay = self.backoff(failures);
                    log::warn!(
                        "Progress poll for {} failed ({}/{}), retrying in {:?}: {}",
                        handle,
                        failures,
                        self.policy.max_transient_failures,
                        delay,
                        e
                    );
                    delay
                }
                Err(e) => return Err(e),
            };

            let remaining = budget.saturating_sub(started.elapsed());
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.cancelled(handle)),
                _ = tokio::time::sleep(wait.min(remaining)) => {}
            }
        }
    }

    /// Backoff for the given failure count, plus up to `jitter` of it again.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.policy.backoff(attempt);
        if self.policy.jitter <= 0.0 {
            return base;
        }
        let factor = rand::thread_rng().gen_range(0.0..=self.policy.jitter);
        base + base.mul_f64(factor)
    }

    fn cancelled(&self, handle: &GenerationHandle) -> AppError {
        log::info!("Stopped waiting for generation {}", handle);
        AppError::Cancelled(handle.ref_key().to_string())
    }

    fn timed_out(&self, handle: &GenerationHandle, started: Instant) -> AppError {
        AppError::PollTimeout {
            ref_key: handle.ref_key().to_string(),
            elapsed: started.elapsed(),
        }
    }
}
