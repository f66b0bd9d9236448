//! js - run the job scheduler demo from the command line

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use jobscheduler::cli::{Cli, Command, OutputFormat};
use jobscheduler::config::Config;
use jobscheduler::{JobEvent, JobManager, TokioClock, WorkerPool};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to install subscriber: {}", e))?;

    debug!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run { duration_secs, workers } => {
            if let Some(workers) = workers {
                config.pool.workers = workers;
            }
            cmd_run(&config, Duration::from_secs(duration_secs)).await
        }
        Command::Show { format } => cmd_show(&config, format),
    }
}

/// Submit the configured jobs, run for `duration`, then shut down gracefully
async fn cmd_run(config: &Config, duration: Duration) -> Result<()> {
    debug!(?duration, "cmd_run: called");
    config.validate()?;

    let pool = Arc::new(WorkerPool::with_config(config.pool.clone()).context("Failed to start worker pool")?);
    let events = pool.subscribe();
    let printer = tokio::spawn(print_events(events));

    let clock = Arc::new(TokioClock);
    let manager = JobManager::with_config(pool.clone(), clock, config.scheduler.clone())
        .context("Failed to start scheduler")?;

    let now = tokio::time::Instant::now();
    for spec in &config.jobs {
        let scheduled = spec
            .to_scheduled(config.scheduler.default_priority, now)
            .context(format!("Invalid job {}", spec.id))?;
        let id = manager.schedule(scheduled).context(format!("Failed to submit job {}", spec.id))?;
        let recurrence = if spec.recurring {
            format!("every {}s", spec.interval_secs)
        } else {
            "once".to_string()
        };
        println!(
            "{} Submitted job {} ({}) in {}s, priority {}, {}",
            "✓".green(),
            spec.id.to_string().cyan(),
            id.to_string().dimmed(),
            spec.delay_secs,
            spec.priority.unwrap_or(config.scheduler.default_priority),
            recurrence
        );
    }
    info!(jobs = config.jobs.len(), workers = config.pool.workers, "Running");

    tokio::select! {
        _ = tokio::time::sleep(duration) => {
            debug!("cmd_run: run duration elapsed");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for ctrl-c");
            }
            println!("{}", "Interrupted, shutting down".yellow());
        }
    }

    manager.shutdown().await;
    pool.shutdown().await;

    let scheduler_stats = manager.stats();
    let pool_stats = pool.stats();

    // Dropping the last pool handle closes the event bus and ends the printer
    drop(manager);
    drop(pool);
    if let Err(e) = printer.await {
        warn!(error = %e, "Event printer ended abnormally");
    }

    println!(
        "Dispatched {}, finished {} (completed {}, failed {}), discarded {}",
        scheduler_stats.total_dispatched,
        pool_stats.finished(),
        pool_stats.executed,
        pool_stats.failed + pool_stats.panicked,
        scheduler_stats.total_discarded
    );
    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<JobEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => print_event(&event),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "Event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_event(event: &JobEvent) {
    let stamp = chrono::Local::now().format("%H:%M:%S%.3f").to_string().dimmed();
    match event {
        JobEvent::Dispatched { id, name, priority } => {
            println!("{} {} {} {} (priority {})", stamp, "dispatch".blue(), name, id, priority)
        }
        JobEvent::Started { name, worker } => {
            println!("{} {} {} on worker {}", stamp, "start".cyan(), name, worker)
        }
        JobEvent::Completed { name, worker } => {
            println!("{} {} {} on worker {}", stamp, "done".green(), name, worker)
        }
        JobEvent::Failed { name, worker, error } => {
            println!("{} {} {} on worker {}: {}", stamp, "failed".red(), name, worker, error)
        }
        JobEvent::Panicked { name, worker, message } => {
            println!("{} {} {} on worker {}: {}", stamp, "panicked".red().bold(), name, worker, message)
        }
        JobEvent::Discarded { id, name } => {
            println!("{} {} {} {}", stamp, "discarded".yellow(), name, id)
        }
    }
}

/// Print the resolved configuration
fn cmd_show(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_show: called");
    let rendered = match format {
        OutputFormat::Yaml => serde_yaml::to_string(config).context("Failed to render config as YAML")?,
        OutputFormat::Json => serde_json::to_string_pretty(config).context("Failed to render config as JSON")?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}
