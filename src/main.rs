use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use tracker_lite::board::{Column, ColumnView, JobDraft, JobFields, JobId, JobPatch, TrackedJob};
use tracker_lite::cache::{FileCache, LocalCache, MemoryCache};
use tracker_lite::config::{TrackerConfig, DEFAULT_API_BASE_URL};
use tracker_lite::dashboard::{run_dashboard, DashboardState};
use tracker_lite::gateway::HttpGateway;
use tracker_lite::reconcile::ReconciliationScheduler;
use tracker_lite::shutdown::install_shutdown_handler;
use tracker_lite::tracker::{JobTracker, LoadSource};

#[derive(Parser, Debug)]
#[command(name = "tracker-lite")]
#[command(version)]
#[command(about = "Personal job-application board with offline cache and server sync")]
#[command(propagate_version = true)]
struct Args {
    /// Jobs API base URL
    #[arg(long, env = "TRACKER_API_URL", default_value = DEFAULT_API_BASE_URL, global = true)]
    api_url: String,

    /// Local snapshot file (kept in memory when omitted)
    #[arg(long, env = "TRACKER_CACHE", global = true)]
    cache: Option<PathBuf>,

    /// Per-request timeout in milliseconds
    #[arg(long, default_value = "10000", global = true)]
    timeout_ms: u64,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the board over HTTP and keep it reconciled with the server
    Serve(ServeArgs),

    /// Show every column and its jobs
    Board,

    /// Show job counts per column
    Stats,

    /// Add a job to the board
    Add(AddArgs),

    /// Move a job to another column
    Move {
        /// The job ID
        job_id: JobId,
        /// Target column (wishlist, applied, interview, offer, rejected)
        target: Column,
        /// Position in the target column (default: end)
        #[arg(long)]
        index: Option<usize>,
    },

    /// Reorder a job within its column
    Reorder {
        /// The job ID
        job_id: JobId,
        /// New position (0 = top)
        index: usize,
    },

    /// Edit a job's details
    Update {
        /// The job ID
        job_id: JobId,
        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Delete a job
    Delete {
        /// The job ID
        job_id: JobId,
    },

    /// Replace the local board with the server's
    Sync,
}

// =============================================================================
// Command Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Dashboard listen address
    #[arg(long, default_value = "127.0.0.1:3030")]
    listen: SocketAddr,

    /// Reconciliation interval in milliseconds
    #[arg(long, default_value = "60000")]
    reconcile_interval_ms: u64,
}

#[derive(Parser, Debug)]
struct AddArgs {
    /// Job title
    #[arg(long)]
    title: String,

    /// Company name
    #[arg(long)]
    company: String,

    /// Column to add the job to
    #[arg(long, default_value = "wishlist")]
    column: Column,

    #[arg(long)]
    url: Option<String>,

    /// Where the posting was found
    #[arg(long)]
    source: Option<String>,

    #[arg(long)]
    notes: Option<String>,

    #[arg(long)]
    salary: Option<String>,

    #[arg(long)]
    location: Option<String>,
}

#[derive(Parser, Debug)]
struct FieldArgs {
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    company: Option<String>,
    #[arg(long)]
    url: Option<String>,
    #[arg(long)]
    source: Option<String>,
    #[arg(long)]
    notes: Option<String>,
    #[arg(long)]
    salary: Option<String>,
    #[arg(long)]
    location: Option<String>,
}

impl From<AddArgs> for JobDraft {
    fn from(args: AddArgs) -> Self {
        JobDraft {
            fields: JobFields {
                title: args.title,
                company: args.company,
                url: args.url,
                source: args.source,
                notes: args.notes,
                salary: args.salary,
                location: args.location,
            },
            column: args.column,
        }
    }
}

impl From<FieldArgs> for JobPatch {
    fn from(args: FieldArgs) -> Self {
        JobPatch {
            title: args.title,
            company: args.company,
            url: args.url,
            source: args.source,
            notes: args.notes,
            salary: args.salary,
            location: args.location,
        }
    }
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct BoardOutput<'a> {
    source: &'a LoadSource,
    columns: Vec<ColumnView>,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn build_config(args: &Args) -> TrackerConfig {
    let config =
        TrackerConfig::new(args.api_url.clone()).with_request_timeout_ms(args.timeout_ms);
    match &args.cache {
        Some(path) => config.with_cache_path(path),
        None => config,
    }
}

fn build_tracker(config: &TrackerConfig) -> Result<Arc<JobTracker>, Box<dyn std::error::Error>> {
    let gateway = HttpGateway::from_config(config)?;
    let cache: Arc<dyn LocalCache> = match &config.cache_path {
        Some(path) => Arc::new(FileCache::new(path)),
        None => Arc::new(MemoryCache::new()),
    };
    Ok(Arc::new(JobTracker::new(Arc::new(gateway), cache)))
}

fn print_job(job: &TrackedJob, output: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(job)?),
        OutputFormat::Table => {
            println!("Job ID:   {}", job.id);
            println!("Title:    {}", job.fields.title);
            println!("Company:  {}", job.fields.company);
            println!("Column:   {} (position {})", job.column, job.position);
            println!("Updated:  {}", job.updated_at.to_rfc3339());
        }
    }
    Ok(())
}

fn print_board(
    source: &LoadSource,
    columns: Vec<ColumnView>,
    output: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        OutputFormat::Json => {
            let out = BoardOutput { source, columns };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Table => {
            if let LoadSource::Cache { saved_at, .. } = source {
                eprintln!("Warning: server unreachable, showing cache from {}", saved_at.to_rfc3339());
            }
            for column in columns {
                println!("{} ({})", column.title.to_uppercase(), column.jobs.len());
                for job in column.jobs {
                    println!(
                        "  {:<3} {:<38} {} @ {}",
                        job.position, job.id, job.fields.title, job.fields.company
                    );
                }
            }
        }
    }
    Ok(())
}

fn print_done(message: &str, output: &OutputFormat) {
    match output {
        OutputFormat::Json => println!("{{\"ok\":true}}"),
        OutputFormat::Table => println!("{message}"),
    }
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_serve(
    tracker: Arc<JobTracker>,
    config: TrackerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match tracker.load().await {
        Ok(source) => tracing::info!(source = ?source, "Board ready"),
        Err(e) => tracing::warn!(error = %e, "Starting with an empty board"),
    }

    let shutdown = install_shutdown_handler();

    let scheduler = ReconciliationScheduler::new(Arc::clone(&tracker), config.reconcile_interval());
    let scheduler_handle = scheduler.spawn(shutdown.clone());

    run_dashboard(config.dashboard_addr, DashboardState { tracker }, shutdown.clone()).await;

    shutdown.cancel();
    scheduler_handle.await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = if matches!(args.command, Commands::Serve(_)) {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = build_config(&args);
    let tracker = build_tracker(&config)?;
    let output = args.output.clone();

    if let Commands::Serve(serve) = args.command {
        let config = config
            .with_reconcile_interval_ms(serve.reconcile_interval_ms)
            .with_dashboard_addr(serve.listen);
        return run_serve(tracker, config).await;
    }

    let source = tracker.load().await?;

    match args.command {
        Commands::Serve(_) => {}
        Commands::Board => print_board(&source, tracker.columns().await, &output)?,
        Commands::Stats => {
            let stats = tracker.stats().await;
            match output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Table => {
                    println!("{:<12} COUNT", "COLUMN");
                    for (column, count) in &stats.by_column {
                        println!("{:<12} {}", column.title(), count);
                    }
                    println!("{:<12} {}", "TOTAL", stats.total);
                }
            }
        }
        Commands::Add(add) => {
            let job = tracker.add_job(add.into()).await?;
            print_job(&job, &output)?;
        }
        Commands::Move {
            job_id,
            target,
            index,
        } => {
            let source = tracker
                .job(&job_id)
                .await
                .map(|j| j.column)
                .ok_or_else(|| tracker_lite::TrackerError::JobNotFound(job_id.clone()))?;
            tracker.move_job(&job_id, source, target, index).await?;
            print_done(&format!("Moved {job_id} from {source} to {target}"), &output);
        }
        Commands::Reorder { job_id, index } => {
            let column = tracker
                .job(&job_id)
                .await
                .map(|j| j.column)
                .ok_or_else(|| tracker_lite::TrackerError::JobNotFound(job_id.clone()))?;
            tracker.reorder_in_column(column, &job_id, index).await?;
            print_done(&format!("Reordered {job_id} in {column}"), &output);
        }
        Commands::Update { job_id, fields } => {
            let job = tracker.update_job(&job_id, fields.into()).await?;
            print_job(&job, &output)?;
        }
        Commands::Delete { job_id } => {
            tracker.delete_job(&job_id).await?;
            print_done(&format!("Deleted {job_id}"), &output);
        }
        Commands::Sync => {
            let outcome = tracker.sync_with_server().await?;
            match output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
                OutputFormat::Table => println!("Synced: {outcome:?}"),
            }
        }
    }

    Ok(())
}
