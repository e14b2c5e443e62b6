//! Ahead-of-time schedule enumeration.

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::sync::mpsc;

use carillon_taskrunner::{RunnerError, TaskRunner, TaskStatus};

use crate::error::Result;
use crate::nexter::Nexter;
use crate::schedule::Schedule;

/// One step of a dump: everything scheduled at `when`.
#[derive(Debug, Clone)]
pub struct DumpEntry {
    pub when: DateTime<Tz>,
    pub tasks: Vec<String>,
}

/// Collects dispatched names instead of running anything.
///
/// Reports every task as externally running, so stateful decorators
/// (notably the retry layer) do not arm state for the synthetic fires.
#[derive(Default)]
struct RecordingRunner {
    tasks: Mutex<Vec<String>>,
}

impl RecordingRunner {
    fn take(&self) -> Vec<String> {
        std::mem::take(&mut self.tasks.lock().unwrap())
    }
}

#[async_trait]
impl TaskRunner for RecordingRunner {
    async fn run_task(&self, task: &str) -> std::result::Result<TaskStatus, RunnerError> {
        self.tasks.lock().unwrap().push(task.to_string());
        Ok(TaskStatus {
            running: true,
            ..TaskStatus::default()
        })
    }
}

/// Enumerate every fire in `(after, until]` without dispatching anything.
///
/// The schedule is driven through synthetic ticks in a background task
/// and entries stream through a bounded channel. The schedule is consumed:
/// ticking mutates decorator state, so enumeration must never share an
/// instance with a live driver. Names within an entry are sorted.
pub fn dump<S>(
    mut schedule: S,
    after: DateTime<Tz>,
    until: DateTime<Tz>,
) -> mpsc::Receiver<DumpEntry>
where
    S: Schedule + Send + 'static,
{
    let (entries, receiver) = mpsc::channel(1);

    tokio::spawn(async move {
        let recorder = RecordingRunner::default();
        let mut cursor = schedule.next(after);

        while let Some(at) = cursor {
            if at > until {
                break;
            }

            let _ = schedule.tick(&recorder, at).await;
            let mut tasks = recorder.take();
            tasks.sort();

            if !tasks.is_empty() && entries.send(DumpEntry { when: at, tasks }).await.is_err() {
                break;
            }

            cursor = schedule.next(at);
        }
    });

    receiver
}

#[derive(Serialize)]
struct JsonEntry<'a> {
    when: String,
    tasks: &'a [String],
}

/// Render the dump window as a compact JSON array, timestamps
/// UTC-normalized as `YYYY-MM-DD HH:MM:SS`, terminated by a newline.
/// Returns the number of bytes written.
pub async fn dump_json<S, W>(
    writer: &mut W,
    schedule: S,
    after: DateTime<Tz>,
    until: DateTime<Tz>,
) -> Result<usize>
where
    S: Schedule + Send + 'static,
    W: Write,
{
    let mut written = 0;
    writer.write_all(b"[")?;
    written += 1;

    let mut entries = dump(schedule, after, until);
    let mut glue: &[u8] = b"";

    while let Some(entry) = entries.recv().await {
        let json = serde_json::to_vec(&JsonEntry {
            when: entry
                .when
                .with_timezone(&Utc)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            tasks: &entry.tasks,
        })?;

        writer.write_all(glue)?;
        written += glue.len();
        writer.write_all(&json)?;
        written += json.len();
        glue = b",";
    }

    writer.write_all(b"]\n")?;
    written += 2;

    Ok(written)
}
