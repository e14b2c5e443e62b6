//! Named schedules and the dispatch sweep.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;

use carillon_taskrunner::{RunnerError, TaskRunner, TaskStatus};

use crate::nexter::{earliest, one_tick, Nexter};

/// Statuses of every task dispatched in one tick, by task name.
pub type TickResults = HashMap<String, TaskStatus>;

/// When things run, and what runs at each tick.
///
/// A schedule is itself a [`Nexter`], so schedules nest: decorators such
/// as [`RetrySchedule`](crate::RetrySchedule) wrap an inner schedule and
/// reinterpret both when to fire and what to dispatch.
#[async_trait]
pub trait Schedule: Nexter {
    /// Dispatch every task due specifically at `at`, in practice the
    /// result of the previous `next` call.
    async fn tick(
        &mut self,
        runner: &dyn TaskRunner,
        at: DateTime<Tz>,
    ) -> Result<TickResults, RunnerError>;
}

#[async_trait]
impl<S: Schedule + ?Sized> Schedule for Box<S> {
    async fn tick(
        &mut self,
        runner: &dyn TaskRunner,
        at: DateTime<Tz>,
    ) -> Result<TickResults, RunnerError> {
        (**self).tick(runner, at).await
    }
}

/// A flat mapping from task name to its fire-time source.
pub struct BasicSchedule<N = Box<dyn Nexter>> {
    table: HashMap<String, N>,
}

impl<N: Nexter> BasicSchedule<N> {
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Insert or replace the source for `name`.
    pub fn set(&mut self, name: impl Into<String>, nexter: N) {
        self.table.insert(name.into(), nexter);
    }

    /// Mutable access to the source for `name`, inserting a default one
    /// on first touch.
    pub(crate) fn entry(&mut self, name: &str) -> &mut N
    where
        N: Default,
    {
        self.table.entry(name.to_string()).or_default()
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut N> {
        self.table.get_mut(name)
    }
}

impl<N: Nexter> Default for BasicSchedule<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Nexter> Nexter for BasicSchedule<N> {
    fn next(&self, after: DateTime<Tz>) -> Option<DateTime<Tz>> {
        earliest(self.table.values(), after)
    }
}

#[async_trait]
impl<N: Nexter> Schedule for BasicSchedule<N> {
    async fn tick(
        &mut self,
        runner: &dyn TaskRunner,
        at: DateTime<Tz>,
    ) -> Result<TickResults, RunnerError> {
        // A task is due iff `at` is its own next fire when asked from the
        // instant immediately before `at`. The due set is snapshotted
        // before dispatching so the sweep never observes its own effects.
        let after = at - one_tick();
        let due: Vec<String> = self
            .table
            .iter()
            .filter(|(_, nexter)| nexter.next(after) == Some(at))
            .map(|(name, _)| name.clone())
            .collect();

        let mut results = TickResults::new();
        for name in due {
            let status = runner.run_task(&name).await?;
            results.insert(name, status);
        }

        Ok(results)
    }
}
