//! The tick loop: sleep until due, dispatch, repeat.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use carillon_taskrunner::{RunnerError, TaskRunner};

use crate::observe;
use crate::retry::RetryInfo;
use crate::schedule::{Schedule, TickResults};

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Zone in which "now" is taken and fire times are interpreted.
    pub zone: Tz,
    /// Resume as if the previous tick happened at this instant; fires
    /// missed since then are caught up one per tick, immediately.
    pub resume_from: Option<DateTime<Tz>>,
    /// Start paused, waiting for a resume toggle.
    pub start_paused: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            zone: chrono_tz::UTC,
            resume_from: None,
            start_paused: false,
        }
    }
}

impl DriverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_zone(mut self, zone: Tz) -> Self {
        self.zone = zone;
        self
    }

    pub fn with_resume_from(mut self, prev_tick: DateTime<Tz>) -> Self {
        self.resume_from = Some(prev_tick);
        self
    }

    pub fn with_start_paused(mut self, paused: bool) -> Self {
        self.start_paused = paused;
        self
    }
}

/// Pause/resume control for a running [`TickDriver`].
///
/// Each toggle flips the driver between running and paused at its next
/// opportunity (mid-sleep, or immediately while paused).
#[derive(Debug, Clone)]
pub struct DriverHandle {
    control: mpsc::Sender<()>,
}

impl DriverHandle {
    pub async fn toggle_pause(&self) {
        let _ = self.control.send(()).await;
    }
}

/// Owns a schedule and a runner and turns fire times into dispatches.
///
/// Exactly one tick runs at a time; between ticks the driver sleeps until
/// the next fire, interruptible by pause toggles. Wall-clock jumps are
/// tolerated: a fire found in the past is logged as late and dispatched
/// immediately, one catch-up per loop iteration.
pub struct TickDriver<S, R> {
    schedule: S,
    runner: R,
    zone: Tz,
    prev_tick: DateTime<Tz>,
    paused: bool,
    control: mpsc::Receiver<()>,
}

impl<S, R> TickDriver<S, R>
where
    S: Schedule,
    R: TaskRunner,
{
    pub fn new(schedule: S, runner: R, config: DriverConfig) -> (Self, DriverHandle) {
        let (sender, receiver) = mpsc::channel(1);
        let prev_tick = config
            .resume_from
            .unwrap_or_else(|| Utc::now().with_timezone(&config.zone));

        (
            Self {
                schedule,
                runner,
                zone: config.zone,
                prev_tick,
                paused: config.start_paused,
                control: receiver,
            },
            DriverHandle { control: sender },
        )
    }

    /// Run until the schedule is exhausted or a transport error proves
    /// fatal.
    pub async fn run(mut self) -> Result<(), RunnerError> {
        loop {
            if self.paused {
                self.await_resume().await;
            }

            let Some(next_tick) = self.schedule.next(self.prev_tick) else {
                info!("schedule has no further fire times");
                return Ok(());
            };

            let pause = next_tick - Utc::now().with_timezone(&self.zone);
            if pause < Duration::zero() {
                let skipped = 1 + (-pause).num_minutes();
                warn!(skipped, "running late: firing a missed tick immediately");
                observe::record_lateness(skipped);
            } else {
                debug!(seconds = pause.num_seconds(), tick = %next_tick, "sleeping until next tick");
                tokio::select! {
                    _ = tokio::time::sleep(pause.to_std().unwrap_or_default()) => {}
                    Some(()) = self.control.recv() => {
                        info!("pause requested");
                        // prev_tick stays put: fires missed while paused
                        // catch up one at a time on resume.
                        self.paused = true;
                        continue;
                    }
                }
            }

            self.prev_tick = next_tick;
            let results = self.schedule.tick(&self.runner, next_tick).await?;
            observe::record_tick(results.len());
            log_results(next_tick, &results);
        }
    }

    async fn await_resume(&mut self) {
        while self.paused {
            match self.control.recv().await {
                Some(()) => {
                    info!("resume requested");
                    self.paused = false;
                }
                // Every handle is gone; nobody can ever resume us.
                None => self.paused = false,
            }
        }
    }
}

fn log_results(at: DateTime<Tz>, results: &TickResults) {
    for (task, status) in results {
        if let Some(info) = status.info.clone() {
            if let Ok(retry) = serde_json::from_value::<RetryInfo>(info) {
                info!(
                    task = %task,
                    attempt = retry.attempt,
                    max_retries = retry.max_retries,
                    "task was retried"
                );
            }
        }

        if status.ran {
            info!(task = %task, tick = %at, "task dispatched");
        } else if status.running {
            warn!(task = %task, "task skipped: previous instance still running");
        }

        for warning in &status.warnings {
            warn!(task = %task, "{warning}");
        }

        if let Some(err) = &status.error {
            error!(task = %task, "task failed: {err}");
        }
    }
}
