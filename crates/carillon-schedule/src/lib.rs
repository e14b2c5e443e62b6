//! Carillon schedule core.
//!
//! A composable scheduling algebra for the carillon cron daemon.
//!
//! # Overview
//!
//! Two seams carry everything:
//!
//! 1. **[`Nexter`]**: "when is the next fire time strictly after `t`?"
//!    Concrete sources: a fixed instant ([`NextTime`]), a closure
//!    ([`NextFn`]), an earliest-of list ([`NextList`]), and the external
//!    cron evaluator (`cron::Schedule`).
//! 2. **[`Schedule`]**: a named collection of sources plus the dispatch
//!    sweep ([`Schedule::tick`]). [`BasicSchedule`] is the flat mapping;
//!    [`Crontab`] loads one from crontab text; [`RetrySchedule`] decorates
//!    any schedule with failure-driven whole-minute re-fires.
//!
//! The [`TickDriver`] turns a schedule plus a
//! [`TaskRunner`](carillon_taskrunner::TaskRunner) into a long-running
//! daemon loop, and [`dump`]/[`dump_json`] enumerate what would run in a
//! window without dispatching anything.
//!
//! # Example
//!
//! ```ignore
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! use carillon_schedule::{dump_json, Crontab, RetrySchedule};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut crontab = Crontab::new();
//!     crontab.load(BufReader::new(File::open("/etc/carillon.crontab")?))?;
//!
//!     // What would fire in the next day?
//!     let now = chrono::Utc::now().with_timezone(&chrono_tz::UTC);
//!     let mut out = std::io::stdout();
//!     dump_json(&mut out, crontab, now, now + chrono::Duration::days(1)).await?;
//!     Ok(())
//! }
//! ```

pub mod crontab;
pub mod driver;
pub mod dump;
pub mod error;
pub mod nexter;
pub mod observe;
pub mod retry;
pub mod schedule;

pub use crontab::Crontab;
pub use driver::{DriverConfig, DriverHandle, TickDriver};
pub use dump::{dump, dump_json, DumpEntry};
pub use error::{Result, ScheduleError};
pub use nexter::{NextFn, NextList, NextTime, Nexter};
pub use retry::{RetryInfo, RetrySchedule};
pub use schedule::{BasicSchedule, Schedule, TickResults};
