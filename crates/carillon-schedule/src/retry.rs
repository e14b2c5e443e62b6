//! Failure-driven re-fires layered over an inner schedule.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, DurationRound};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use carillon_taskrunner::{RunnerError, SuppressionTaskRunner, TaskRunner};

use crate::nexter::Nexter;
use crate::schedule::{Schedule, TickResults};

/// Attempt metadata attached to retry-dispatched statuses, so the caller
/// can log which attempt this was.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryInfo {
    pub attempt: i64,
    pub max_retries: i64,
}

#[derive(Debug)]
struct RetryStatus {
    attempts: i64,
    ok: bool,
}

/// Re-fires failed tasks on whole-minute boundaries until they succeed or
/// exhaust their budget.
///
/// `max_retries` counts re-dispatches after the original scheduled fire;
/// a negative value retries forever. A task is owed a retry while its
/// last dispatch did not run and its attempt count is within the budget.
pub struct RetrySchedule<S> {
    schedule: S,
    max_retries: i64,
    tasks: HashMap<String, RetryStatus>,
}

impl<S: Schedule> RetrySchedule<S> {
    pub fn new(schedule: S, max_retries: i64) -> Self {
        Self {
            schedule,
            max_retries,
            tasks: HashMap::new(),
        }
    }

    fn owed(&self, status: &RetryStatus) -> bool {
        !status.ok && (self.max_retries < 0 || status.attempts <= self.max_retries)
    }
}

impl<S: Schedule> Nexter for RetrySchedule<S> {
    fn next(&self, after: DateTime<Tz>) -> Option<DateTime<Tz>> {
        // Anything owed a retry fires at the start of the next whole
        // minute, in `after`'s zone.
        if self.tasks.values().any(|status| self.owed(status)) {
            let minute = after.duration_trunc(Duration::minutes(1)).unwrap_or(after);
            return Some(minute + Duration::minutes(1));
        }

        self.schedule.next(after)
    }
}

#[async_trait]
impl<S: Schedule> Schedule for RetrySchedule<S> {
    async fn tick(
        &mut self,
        runner: &dyn TaskRunner,
        at: DateTime<Tz>,
    ) -> Result<TickResults, RunnerError> {
        // The inner schedule fires through a suppressor, so a task retried
        // this tick cannot also fire at its scheduled time.
        let mut suppressor = SuppressionTaskRunner::new(runner);
        let mut results = TickResults::new();

        let owed: Vec<String> = self
            .tasks
            .iter()
            .filter(|(_, status)| self.owed(status))
            .map(|(task, _)| task.clone())
            .collect();

        for task in owed {
            suppressor.suppress(
                task.clone(),
                Some(format!(
                    "skipping scheduled run of '{task}': already retried this tick"
                )),
            );

            let Some(status) = self.tasks.get_mut(&task) else {
                continue;
            };
            status.attempts += 1;
            let attempt = status.attempts;

            // Retries go to the unwrapped runner. A transport error here
            // aborts the whole tick: the inner schedule is not consulted
            // for this instant at all.
            let mut outcome = runner.run_task(&task).await?;
            outcome.info = serde_json::to_value(RetryInfo {
                attempt,
                max_retries: self.max_retries,
            })
            .ok();

            if outcome.running {
                // Still running externally: transient, but not owed.
                self.tasks.remove(&task);
            } else if let Some(status) = self.tasks.get_mut(&task) {
                status.ok = outcome.ran;
            }

            results.insert(task, outcome);
        }

        let scheduled = self.schedule.tick(&suppressor, at).await?;
        for (task, status) in scheduled {
            // Results settled by a retry this tick stay settled.
            if results.contains_key(&task) {
                continue;
            }

            if !status.running {
                self.tasks.insert(
                    task.clone(),
                    RetryStatus {
                        attempts: 1,
                        ok: status.ran,
                    },
                );
            }

            results.insert(task, status);
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use chrono::TimeZone;
    use chrono_tz::UTC;

    use carillon_taskrunner::{FnTaskRunner, TaskStatus};

    use super::*;
    use crate::nexter::NextTime;
    use crate::schedule::BasicSchedule;

    fn utc(h: u32, m: u32, s: u32) -> DateTime<Tz> {
        UTC.with_ymd_and_hms(2006, 1, 2, h, m, s).unwrap()
    }

    fn failing_runner() -> FnTaskRunner<impl Fn(&str) -> carillon_taskrunner::Result<TaskStatus>>
    {
        FnTaskRunner(|_: &str| {
            Ok(TaskStatus {
                warnings: vec!["intentional failure to trigger retry".to_string()],
                ..TaskStatus::default()
            })
        })
    }

    #[test]
    fn next_initially_passes_to_the_inner_schedule() {
        let mut inner: BasicSchedule = BasicSchedule::new();
        let fire = utc(15, 5, 0);
        inner.set("test", Box::new(NextTime(fire)) as _);

        let schedule = RetrySchedule::new(inner, 1);
        assert_eq!(schedule.next(utc(15, 4, 0)), Some(fire));
    }

    #[tokio::test]
    async fn tick_initially_passes_to_the_inner_schedule() {
        let mut inner: BasicSchedule = BasicSchedule::new();
        let fire = utc(15, 4, 0);
        inner.set("test", Box::new(NextTime(fire)) as _);

        let passed = Mutex::new(String::new());
        let runner = FnTaskRunner(|task: &str| {
            *passed.lock().unwrap() = task.to_string();
            Ok(TaskStatus {
                ran: true,
                output: Some(serde_json::json!("testOutputInitial")),
                ..TaskStatus::default()
            })
        });

        let mut schedule = RetrySchedule::new(inner, 1);
        let results = schedule.tick(&runner, fire).await.unwrap();

        assert_eq!(*passed.lock().unwrap(), "test");
        assert!(results["test"].ran);
        assert_eq!(
            results["test"].output,
            Some(serde_json::json!("testOutputInitial"))
        );
    }

    #[tokio::test]
    async fn a_failure_schedules_a_whole_minute_retry() {
        let mut inner: BasicSchedule = BasicSchedule::new();
        let scheduled = utc(15, 7, 0);
        inner.set("test", Box::new(NextTime(scheduled)) as _);

        let mut schedule = RetrySchedule::new(inner, -1);
        schedule.tick(&failing_runner(), scheduled).await.unwrap();

        // The failed task is due at the next whole minute, not at the
        // inner schedule's (exhausted) next.
        assert_eq!(schedule.next(utc(15, 4, 30)), Some(utc(15, 5, 0)));
        assert_eq!(schedule.next(utc(15, 5, 0)), Some(utc(15, 6, 0)));

        // The retry dispatch carries attempt metadata and, once it
        // succeeds, no further retries fire.
        let did_run = AtomicBool::new(false);
        let tracking = FnTaskRunner(|_: &str| {
            did_run.store(true, Ordering::SeqCst);
            Ok(TaskStatus {
                ran: true,
                ..TaskStatus::default()
            })
        });

        let results = schedule.tick(&tracking, utc(15, 5, 0)).await.unwrap();
        assert!(did_run.load(Ordering::SeqCst));
        for status in results.values() {
            let info = status.info.clone().expect("retry result carries info");
            let retry: RetryInfo = serde_json::from_value(info).unwrap();
            assert_eq!(retry.attempt, 2);
        }

        did_run.store(false, Ordering::SeqCst);
        schedule.tick(&tracking, utc(15, 6, 0)).await.unwrap();
        assert!(!did_run.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn already_running_does_not_arm_a_retry() {
        let mut inner: BasicSchedule = BasicSchedule::new();
        let scheduled = utc(15, 7, 0);
        inner.set("test", Box::new(NextTime(scheduled)) as _);

        let running = FnTaskRunner(|_: &str| {
            Ok(TaskStatus {
                running: true,
                warnings: vec!["intentional already-running".to_string()],
                ..TaskStatus::default()
            })
        });

        let mut schedule = RetrySchedule::new(inner, -1);
        schedule.tick(&running, scheduled).await.unwrap();

        // No whole-minute injection: the inner schedule still decides.
        assert_eq!(schedule.next(utc(15, 4, 30)), Some(scheduled));
    }

    #[tokio::test]
    async fn retries_stop_at_the_budget() {
        let mut inner: BasicSchedule = BasicSchedule::new();
        let scheduled = utc(15, 4, 30);
        inner.set("test", Box::new(NextTime(scheduled)) as _);

        let runs = AtomicUsize::new(0);
        let failing = FnTaskRunner(|_: &str| {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(TaskStatus {
                warnings: vec!["intentional failure to trigger retry".to_string()],
                ..TaskStatus::default()
            })
        });

        let mut schedule = RetrySchedule::new(inner, 2);
        schedule.tick(&failing, scheduled).await.unwrap();

        // Two retries are owed after the original fire; further ticks
        // dispatch nothing.
        for at in [utc(15, 5, 0), utc(15, 6, 0), utc(15, 7, 0), utc(15, 8, 0)] {
            schedule.tick(&failing, at).await.unwrap();
        }

        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn transport_errors_pass_through_unmasked() {
        let mut inner: BasicSchedule = BasicSchedule::new();
        let scheduled = utc(15, 4, 30);
        inner.set("test", Box::new(NextTime(scheduled)) as _);

        let mut schedule = RetrySchedule::new(inner, -1);
        schedule.tick(&failing_runner(), scheduled).await.unwrap();

        let erroring = FnTaskRunner(|_: &str| {
            Err(RunnerError::Other("intentionalError".to_string()))
        });

        let err = schedule
            .tick(&erroring, utc(15, 5, 0))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "intentionalError");
    }
}
