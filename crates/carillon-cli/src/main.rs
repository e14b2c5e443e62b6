//! Carillon - a crontab-driven task daemon for container orchestrators.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use chrono_tz::Tz;
use clap::Parser;
use tracing::info;

use carillon_schedule::{
    dump_json, Crontab, DriverConfig, RetrySchedule, Schedule, TickDriver,
};
use carillon_taskrunner::{
    FnTaskRunner, HttpOrchestratorClient, OrchestratorTaskRunner, SkipRunningTaskRunner,
    TaskRunner, TaskStatus, TweakTaskRunner,
};

#[derive(Parser)]
#[command(name = "carillon")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Time zone in which to evaluate cron expressions
    #[arg(long, default_value = "UTC")]
    timezone: String,

    /// The "last run" of cron (to resume after interruption)
    #[arg(long = "async", value_name = "YYYY-MM-DD HH:MM:SS")]
    resume_from: Option<String>,

    /// Start paused, awaiting a resume signal (SIGUSR1)
    #[arg(long)]
    pause: bool,

    /// Retry every failed run on the next whole minute (same as
    /// --retry-count=-1)
    #[arg(long)]
    retry: bool,

    /// Times to retry a failed run before giving up (-1 means forever)
    #[arg(long, default_value_t = 0)]
    retry_count: i64,

    /// Location of the crontab file to parse
    #[arg(long, default_value = "/etc/carillon.crontab")]
    crontab: PathBuf,

    /// Prefix to add to every task name in the crontab
    #[arg(long, default_value = "")]
    prefix: String,

    /// Suffix to add to every task name in the crontab
    #[arg(long, default_value = "")]
    suffix: String,

    /// Base URL of the orchestrator task API
    #[arg(long)]
    endpoint: Option<String>,

    /// Cluster on which to run tasks
    #[arg(long)]
    cluster: Option<String>,

    /// Don't dispatch anything, only log what would run
    #[arg(long)]
    simulate: bool,

    /// Debug level: 0 errors/warnings, 1 run info, 2 detail, 5 status
    #[arg(long, default_value_t = 0)]
    debug: u8,

    /// Enumerate upcoming fires instead of running
    #[arg(long)]
    dump: bool,

    /// Start of the dump window (defaults to now)
    #[arg(long, value_name = "YYYY-MM-DD HH:MM:SS")]
    dump_from: Option<String>,

    /// End of the dump window (defaults to now + 24h)
    #[arg(long, value_name = "YYYY-MM-DD HH:MM:SS")]
    dump_until: Option<String>,

    /// Dump output format (only "json")
    #[arg(long, default_value = "json")]
    dump_format: String,
}

fn init_tracing(debug: u8) {
    let level = match debug {
        0 => "warn",
        1 => "info",
        2..=4 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}

fn parse_instant(value: &str, zone: Tz) -> Result<DateTime<Tz>> {
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .with_context(|| format!("failed to parse instant '{value}'"))?;

    naive
        .and_local_timezone(zone)
        .single()
        .ok_or_else(|| anyhow!("instant '{value}' is ambiguous or invalid in {zone}"))
}

/// `--retry` is shorthand for unlimited retries unless an explicit count
/// was given.
fn effective_retry_count(retry: bool, retry_count: i64) -> i64 {
    if retry && retry_count == 0 {
        -1
    } else {
        retry_count
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let zone: Tz = cli
        .timezone
        .parse()
        .map_err(|err| anyhow!("failed to parse timezone: {err}"))?;

    let retry_count = effective_retry_count(cli.retry, cli.retry_count);

    let mut crontab = Crontab::new();
    let file = File::open(&cli.crontab)
        .with_context(|| format!("failed to open crontab {}", cli.crontab.display()))?;
    crontab
        .load(BufReader::new(file))
        .with_context(|| format!("failed to load crontab {}", cli.crontab.display()))?;

    if cli.dump {
        if cli.dump_format != "json" {
            bail!("unsupported dump format '{}'", cli.dump_format);
        }

        let now = Utc::now().with_timezone(&zone);
        let from = match cli.dump_from.as_deref() {
            Some(value) => parse_instant(value, zone)?,
            None => now,
        };
        let until = match cli.dump_until.as_deref() {
            Some(value) => parse_instant(value, zone)?,
            None => now + Duration::hours(24),
        };

        let mut stdout = std::io::stdout();
        dump_json(&mut stdout, crontab, from, until).await?;
        return Ok(());
    }

    let runner: Box<dyn TaskRunner> = if cli.simulate {
        Box::new(FnTaskRunner(|task: &str| {
            info!(task = %task, "simulate: would run");
            Ok(TaskStatus {
                ran: true,
                ..TaskStatus::default()
            })
        }))
    } else {
        let endpoint = cli
            .endpoint
            .clone()
            .context("--endpoint is required unless --simulate or --dump is set")?;

        let client = HttpOrchestratorClient::new(endpoint);
        let orchestrator = OrchestratorTaskRunner::new(client.clone(), cli.cluster.clone());
        Box::new(SkipRunningTaskRunner::new(
            client,
            cli.cluster.clone(),
            orchestrator,
        ))
    };

    let runner: Box<dyn TaskRunner> = if cli.prefix.is_empty() && cli.suffix.is_empty() {
        runner
    } else {
        let prefix = cli.prefix.clone();
        let suffix = cli.suffix.clone();
        Box::new(TweakTaskRunner::new(runner, move |task: &str| {
            format!("{prefix}{task}{suffix}")
        }))
    };

    let schedule: Box<dyn Schedule> = if retry_count != 0 {
        Box::new(RetrySchedule::new(crontab, retry_count))
    } else {
        Box::new(crontab)
    };

    let mut config = DriverConfig::new()
        .with_zone(zone)
        .with_start_paused(cli.pause);
    if let Some(resume) = cli.resume_from.as_deref() {
        config = config.with_resume_from(parse_instant(resume, zone)?);
    }

    let (driver, handle) = TickDriver::new(schedule, runner, config);

    // SIGUSR1 toggles pause/resume at the next tick boundary.
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let toggler = handle.clone();
        let mut usr1 =
            signal(SignalKind::user_defined1()).context("failed to install SIGUSR1 handler")?;
        tokio::spawn(async move {
            while usr1.recv().await.is_some() {
                toggler.toggle_pause().await;
            }
        });
    }

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = driver.run() => {
            result.context("fatal tick error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
        _ = terminate => {
            info!("received SIGTERM, shutting down");
        }
    }

    Ok(())
}
