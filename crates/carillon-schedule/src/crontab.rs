//! Crontab parsing and loading.
//!
//! A crontab line is `<expression> <task-name>[ # comment]`. The
//! expression is matched against a coarse pre-filter first (enough to
//! tell an entry from garbage and to carve out the task name) and then
//! handed to the cron evaluator, which has the final word. The pre-filter
//! deliberately admits forms (`L`, `W`, `#`) the evaluator may refuse;
//! its rejection reason is surfaced as the parse error.

use std::io::BufRead;
use std::str::FromStr;
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use regex::Regex;

use carillon_taskrunner::{RunnerError, TaskRunner};

use crate::error::{Result, ScheduleError};
use crate::nexter::{NextList, Nexter};
use crate::schedule::{BasicSchedule, Schedule, TickResults};

fn ignored_line() -> &'static Regex {
    static IGNORED: OnceLock<Regex> = OnceLock::new();
    IGNORED.get_or_init(|| Regex::new(r"^\s*(?:#.*)?$").expect("ignored-line pattern"))
}

fn entry_line() -> &'static Regex {
    static ENTRY: OnceLock<Regex> = OnceLock::new();
    ENTRY.get_or_init(|| {
        Regex::new(concat!(
            r"^\s*(",
            r"@\S+",                // predefined
            r"|",
            r"[-0-9*/,]+\s+",       // seconds
            r"[-0-9*/,]+\s+",       // minutes
            r"[-0-9*/,]+\s+",       // hours
            r"[-0-9*/,LW]+\s+",     // day of month
            r"[-0-9A-Za-z*/,]+\s+", // month
            r"[-0-9A-Za-z*/,L#]+\s+", // day of week
            r"[-0-9*/,]+",          // year
            r"|",
            r"[-0-9*/,]+\s+",       // minutes
            r"[-0-9*/,]+\s+",       // hours
            r"[-0-9*/,LW]+\s+",     // day of month
            r"[-0-9A-Za-z*/,]+\s+", // month
            r"[-0-9A-Za-z*/,L#]+\s+", // day of week
            r"[-0-9*/,]+",          // year
            r"|",
            r"[-0-9*/,]+\s+",       // minutes
            r"[-0-9*/,]+\s+",       // hours
            r"[-0-9*/,LW]+\s+",     // day of month
            r"[-0-9A-Za-z*/,]+\s+", // month
            r"[-0-9A-Za-z*/,L#]+",  // day of week
            r")\s+(\S+)(?:\s+#.*)?\s*$",
        ))
        .expect("crontab entry pattern")
    })
}

/// Bridge the crontab field counts to the evaluator's
/// `sec min hour dom month dow [year]` shape: 5-field (standard cron) and
/// 6-field (with trailing year) expressions get their seconds pinned to 0.
fn normalize(expression: &str) -> String {
    match expression.split_whitespace().count() {
        5 | 6 => format!("0 {expression}"),
        _ => expression.to_string(),
    }
}

/// A parsed crontab.
///
/// Each task's fire times come from the list of cron expressions
/// registered under its name; a name appearing on several lines fires at
/// the earliest pending time across all of them.
#[derive(Default)]
pub struct Crontab {
    schedule: BasicSchedule<NextList>,
}

impl Crontab {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fire-time source for `task`.
    pub fn add(&mut self, task: &str, nexter: impl Nexter + 'static) {
        self.schedule.entry(task).add(nexter);
    }

    /// Drop every expression registered for `task`, keeping the entry.
    pub fn clear(&mut self, task: &str) {
        if let Some(list) = self.schedule.get_mut(task) {
            list.clear();
        }
    }

    /// Parse one crontab entry line and add it to the schedule.
    pub fn parse(&mut self, line: &str) -> Result<()> {
        let captures = entry_line()
            .captures(line)
            .ok_or_else(|| ScheduleError::UnknownLineFormat(line.to_string()))?;

        let (expression, task) = (&captures[1], &captures[2]);
        let schedule = cron::Schedule::from_str(&normalize(expression)).map_err(|source| {
            ScheduleError::CronExpr {
                line: line.to_string(),
                source,
            }
        })?;

        self.add(task, schedule);
        Ok(())
    }

    /// Load a whole crontab. Blank lines and `#` comments are ignored;
    /// every other line must parse for the load to succeed.
    pub fn load(&mut self, reader: impl BufRead) -> Result<()> {
        for line in reader.lines() {
            let line = line?;
            if ignored_line().is_match(&line) {
                continue;
            }

            self.parse(&line)?;
        }

        Ok(())
    }
}

impl Nexter for Crontab {
    fn next(&self, after: DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedule.next(after)
    }
}

#[async_trait]
impl Schedule for Crontab {
    async fn tick(
        &mut self,
        runner: &dyn TaskRunner,
        at: DateTime<Tz>,
    ) -> std::result::Result<TickResults, RunnerError> {
        self.schedule.tick(runner, at).await
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use chrono::TimeZone;
    use chrono_tz::UTC;

    use super::*;
    use crate::nexter::one_tick;

    fn utc(h: u32, m: u32, s: u32) -> DateTime<Tz> {
        UTC.with_ymd_and_hms(2006, 1, 2, h, m, s).unwrap()
    }

    #[test]
    fn empty_and_garbage_lines_do_not_parse() {
        let mut tab = Crontab::new();

        assert!(matches!(
            tab.parse(""),
            Err(ScheduleError::UnknownLineFormat(_))
        ));
        assert!(matches!(
            tab.parse("not a valid cron expression"),
            Err(ScheduleError::UnknownLineFormat(_))
        ));
        assert!(matches!(
            tab.parse("* * * * *"), // no task name
            Err(ScheduleError::UnknownLineFormat(_))
        ));
    }

    #[test]
    fn the_evaluator_rejects_what_the_prefilter_admits() {
        let mut tab = Crontab::new();

        // "x" passes the day-of-week character class but names no weekday.
        assert!(matches!(
            tab.parse("* * * * x Example"),
            Err(ScheduleError::CronExpr { .. })
        ));
    }

    #[test]
    fn a_valid_line_adds_to_the_schedule() {
        let mut tab = Crontab::new();
        tab.parse("* * * * * Example").unwrap();

        let fire = utc(15, 4, 0);
        assert_eq!(tab.next(fire - one_tick()), Some(fire));

        tab.clear("Example");
        assert_eq!(tab.next(fire - one_tick()), None);
    }

    #[tokio::test]
    async fn a_tick_dispatches_the_parsed_task() {
        use carillon_taskrunner::{FnTaskRunner, TaskStatus};

        let mut tab = Crontab::new();
        tab.parse("* * * * * Example").unwrap();

        let runner = FnTaskRunner(|task: &str| {
            assert_eq!(task, "Example");
            Ok(TaskStatus {
                ran: true,
                ..TaskStatus::default()
            })
        });

        let fire = utc(15, 4, 0);
        let results = tab.tick(&runner, fire).await.unwrap();

        assert_eq!(results.len(), 1);
        assert!(results["Example"].ran);
    }

    #[test]
    fn trailing_comments_and_aliases_parse() {
        let mut tab = Crontab::new();
        tab.parse("@hourly Example # on the hour").unwrap();

        assert_eq!(tab.next(utc(14, 0, 0)), Some(utc(15, 0, 0)));
    }

    #[test]
    fn seven_field_expressions_carry_seconds_and_year() {
        let mut tab = Crontab::new();
        tab.parse("30 4 15 2 1 * 2007 Later").unwrap();

        let expected = UTC.with_ymd_and_hms(2007, 1, 2, 15, 4, 30).unwrap();
        assert_eq!(tab.next(utc(15, 0, 0)), Some(expected));
    }

    #[test]
    fn load_ignores_blanks_and_comments() {
        let mut tab = Crontab::new();
        let crontab = "#ignored line\n\n  # also ignored\n* * * * * Example\n";
        tab.load(Cursor::new(crontab)).unwrap();

        let fire = utc(15, 4, 0);
        assert_eq!(tab.next(fire - one_tick()), Some(fire));
    }

    #[test]
    fn load_fails_on_the_first_bad_line() {
        let mut tab = Crontab::new();
        let crontab = "* * * * * Example\nnot a valid line\n";

        assert!(tab.load(Cursor::new(crontab)).is_err());
    }

    #[test]
    fn expressions_sharing_a_name_merge() {
        let mut tab = Crontab::new();
        tab.load(Cursor::new("0 * * * * J\n30 * * * * J\n")).unwrap();

        assert_eq!(tab.next(utc(14, 0, 0)), Some(utc(14, 30, 0)));
        assert_eq!(tab.next(utc(14, 30, 0)), Some(utc(15, 0, 0)));
    }
}
