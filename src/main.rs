//! belfry - scheduled-job execution core.
//!
//! Usage:
//!   belfry run <jobs-dir>          Run the scheduler with jobs from the directory
//!   belfry validate <jobs-dir>     Validate job definitions without running
//!   belfry list <jobs-dir>         List job definitions and their next fires
//!   belfry trigger <jobs-dir> <id> Fire one job immediately and report the result
//!   belfry reclaim <jobs-dir>      Apply the retention policy to the audit logs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use belfry::config::load_definitions_from_directory;
use belfry::handlers::{FixedUserCount, UserCountHandler, USER_COUNT_HANDLER};
use belfry::logger::ExecutionStatus;
use belfry::reclaim::reclaim_with_policy;
use belfry::{AppConfig, AppContext, HandlerRegistry, JobId};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

/// belfry - scheduled-job execution core
#[derive(Parser)]
#[command(name = "belfry")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the global configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler with jobs from a directory
    Run {
        /// Path to the directory containing job YAML files
        #[arg(value_name = "JOBS_DIR")]
        jobs_dir: PathBuf,
    },

    /// Validate job definitions without running
    Validate {
        /// Path to the directory containing job YAML files
        #[arg(value_name = "JOBS_DIR")]
        jobs_dir: PathBuf,
    },

    /// List job definitions and their upcoming fires
    List {
        /// Path to the directory containing job YAML files
        #[arg(value_name = "JOBS_DIR")]
        jobs_dir: PathBuf,

        /// Print the definitions as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Fire one job immediately and report the result
    Trigger {
        /// Path to the directory containing job YAML files
        #[arg(value_name = "JOBS_DIR")]
        jobs_dir: PathBuf,

        /// Numeric id of the job to fire
        #[arg(value_name = "JOB_ID")]
        job_id: i64,
    },

    /// Apply the configured retention policy to the audit logs
    Reclaim {
        /// Path to the directory containing job YAML files
        #[arg(value_name = "JOBS_DIR")]
        jobs_dir: PathBuf,
    },
}

fn build_registry() -> Result<HandlerRegistry, Box<dyn std::error::Error>> {
    let registry = HandlerRegistry::builder()
        .register(
            USER_COUNT_HANDLER,
            Arc::new(UserCountHandler::new(Arc::new(FixedUserCount(42)))),
        )?
        .build();
    Ok(registry)
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(AppConfig::load(path)?),
        None => Ok(AppConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Run { jobs_dir } => run_scheduler(config, jobs_dir).await?,
        Commands::Validate { jobs_dir } => validate_jobs(config, jobs_dir).await?,
        Commands::List { jobs_dir, json } => list_jobs(jobs_dir, json)?,
        Commands::Trigger { jobs_dir, job_id } => trigger_job(config, jobs_dir, job_id).await?,
        Commands::Reclaim { jobs_dir } => reclaim_logs(config, jobs_dir).await?,
    }

    Ok(())
}

/// Run the scheduler until Ctrl+C.
async fn run_scheduler(
    config: AppConfig,
    jobs_dir: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = AppContext::new(config, build_registry()?);

    info!("loading jobs from: {}", jobs_dir.display());
    let count = ctx.load_definitions(&jobs_dir).await?;

    if count == 0 {
        warn!("no job files found in {}", jobs_dir.display());
        return Ok(());
    }

    info!(
        "starting scheduler with {} job(s) (tick interval: {:?})",
        count,
        ctx.config().tick_interval()
    );
    info!("press Ctrl+C to stop");

    let (handle, scheduler_task) = ctx.start_scheduler();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            handle.shutdown().await?;
        }
        _ = scheduler_task => {
            info!("scheduler stopped");
        }
    }

    Ok(())
}

/// Validate job definitions without running anything.
async fn validate_jobs(
    config: AppConfig,
    jobs_dir: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("validating jobs in: {}", jobs_dir.display());

    let ctx = AppContext::new(config, build_registry()?);
    match ctx.load_definitions(&jobs_dir).await {
        Ok(count) => {
            info!("all {} job definition(s) are valid", count);
            Ok(())
        }
        Err(e) => {
            error!("validation failed: {}", e);
            Err(e.into())
        }
    }
}

/// List job definitions with their next fire times.
fn list_jobs(jobs_dir: PathBuf, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let defs = load_definitions_from_directory(&jobs_dir)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&defs)?);
        return Ok(());
    }

    if defs.is_empty() {
        println!("No jobs found in {}", jobs_dir.display());
        return Ok(());
    }

    println!("Jobs in {}:", jobs_dir.display());
    println!();

    for def in &defs {
        println!("ID: {}", def.id);
        println!("  Name: {}", def.name);
        println!("  Handler: {}", def.handler_name);
        println!("  Schedule: {} ({})", def.cron_expression, def.timezone);
        println!("  Enabled: {}", def.is_enabled());
        if def.retry.retry_count > 0 {
            println!(
                "  Retry: {} times, every {:?}",
                def.retry.retry_count, def.retry.retry_interval
            );
        }
        if let Ok(schedule) = def.schedule() {
            if let Ok(fires) = schedule.upcoming_fires(Utc::now(), 3) {
                println!("  Next fires:");
                for fire in fires {
                    println!("    {}", fire.format("%Y-%m-%d %H:%M:%S %Z"));
                }
            }
        }
        println!();
    }

    Ok(())
}

/// Fire one job immediately and wait for its outcome.
async fn trigger_job(
    config: AppConfig,
    jobs_dir: PathBuf,
    job_id: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = AppContext::new(config, build_registry()?);
    ctx.load_definitions(&jobs_dir).await?;

    let (handle, _scheduler_task) = ctx.start_scheduler();
    let job_id = JobId::new(job_id);
    let max_attempts = ctx.jobs().get(job_id).await?.retry.max_attempts();

    handle.trigger(job_id).await?;

    // Poll the execution log until the fire is settled: all rows terminal and
    // either a non-Failure tail or the retry budget exhausted.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    loop {
        tokio::time::sleep(Duration::from_millis(100)).await;

        let rows = ctx.executions().list_for_job(job_id).await?;
        let settled = !rows.is_empty()
            && rows.iter().all(|r| r.status.is_terminal())
            && rows.last().is_some_and(|last| {
                last.status != ExecutionStatus::Failure || last.attempt >= max_attempts
            });

        if settled {
            if let Some(last) = rows.last() {
                let result = last.result.as_deref().unwrap_or("");
                match last.status {
                    ExecutionStatus::Success => {
                        info!("job {} succeeded after {} attempt(s): {}", job_id, last.attempt, result);
                    }
                    other => {
                        error!("job {} finished {:?} after {} attempt(s): {}", job_id, other, last.attempt, result);
                    }
                }
            }
            break;
        }

        if tokio::time::Instant::now() >= deadline {
            warn!("timed out waiting for job {} to finish", job_id);
            break;
        }
    }

    handle.shutdown().await?;
    Ok(())
}

/// Apply the configured retention policy to the audit log stores.
async fn reclaim_logs(
    config: AppConfig,
    jobs_dir: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = AppContext::new(config, build_registry()?);
    ctx.load_definitions(&jobs_dir).await?;

    let Some(policy) = ctx.retention_policy()? else {
        warn!("no retention policy configured, nothing to reclaim");
        return Ok(());
    };

    let access = reclaim_with_policy(ctx.access_log().as_ref(), policy).await?;
    let operate = reclaim_with_policy(ctx.operate_log().as_ref(), policy).await?;

    info!(
        "reclaimed {} access log row(s) and {} operate log row(s) older than {} day(s)",
        access, operate, policy.exceed_days
    );

    Ok(())
}
