use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use adsync_client::{AccessTokenProvider, BigQueryWarehouse, GcsObjectStore, GoogleAdsClient};
use adsync_core::descriptors;
use adsync_core::models::EntityKind;
use adsync_core::schema::{SchemaTranslator, bigquery_schema};
use adsync_core::task::TaskStatus;
use adsync_core::task_queue::TaskQueue;
use adsync_core::{Orchestrator, PipelineConfig, TracingWorkerReporter, WorkerConfig, WorkerService};
use adsync_db::{Database, DatabaseConfig, RefreshTaskRepository};

type LiveOrchestrator =
    Orchestrator<GoogleAdsClient, GcsObjectStore, BigQueryWarehouse, RefreshTaskRepository>;

#[derive(Parser)]
#[command(name = "adsync", version, about = "Ads account export into BigQuery")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the task queue and run refresh tasks until interrupted
    Worker {
        /// Worker identifier (defaults to a random id)
        #[arg(long, env = "ADSYNC_WORKER_ID")]
        worker_id: Option<String>,

        /// Seconds to wait between polls when the queue is empty
        #[arg(long, env = "ADSYNC_POLL_INTERVAL", default_value_t = 5)]
        poll_interval: u64,

        /// Upper bound on a single task's run time, in seconds
        #[arg(long, env = "ADSYNC_TASK_TIMEOUT", default_value_t = 1800)]
        task_timeout: u64,
    },

    /// Run a single stage now. Dependent stages load the roster first.
    Refresh {
        /// account, campaign, ad_group or ad_group_ad
        stage: EntityKind,
    },

    /// Run a full refresh cycle in this process
    Cycle,

    /// Print the warehouse schema derived for an entity kind
    Schema {
        /// account, campaign, ad_group or ad_group_ad
        kind: EntityKind,
    },

    /// List refresh tasks, or show one task
    Tasks {
        /// Show a single task
        #[arg(long)]
        id: Option<Uuid>,

        /// Filter by status (pending, running, completed, failed, cancelled)
        #[arg(short, long)]
        status: Option<TaskStatus>,

        /// Number of tasks to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("adsync=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Worker {
            worker_id,
            poll_interval,
            task_timeout,
        } => {
            let db = connect_db().await?;
            let orchestrator = Arc::new(build_orchestrator(&db)?);
            let mut config = WorkerConfig::default()
                .with_poll_interval(Duration::from_secs(poll_interval))
                .with_task_timeout(Duration::from_secs(task_timeout));
            if let Some(id) = worker_id {
                config = config.with_worker_id(id);
            }
            cmd_worker(db.task_repo(), orchestrator, config).await?;
        }
        Commands::Refresh { stage } => {
            let db = connect_db().await?;
            let orchestrator = build_orchestrator(&db)?;
            cmd_refresh(&orchestrator, stage).await?;
        }
        Commands::Cycle => {
            let db = connect_db().await?;
            let orchestrator = build_orchestrator(&db)?;
            let report = orchestrator
                .run_full_cycle(&CancellationToken::new())
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            println!("{report}");
        }
        Commands::Schema { kind } => cmd_schema(kind)?,
        Commands::Tasks { id, status, limit } => {
            let db = connect_db().await?;
            cmd_tasks(&db.task_repo(), id, status, limit).await?;
        }
    }

    Ok(())
}

/// Connect to PostgreSQL using DATABASE_URL and apply migrations.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.map_err(|e| anyhow::anyhow!(e))?;
    Ok(db)
}

fn build_orchestrator(db: &Database) -> Result<LiveOrchestrator> {
    let config = PipelineConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let api = GoogleAdsClient::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let tokens = AccessTokenProvider::cloud_from_env().map_err(|e| anyhow::anyhow!(e))?;
    let store = GcsObjectStore::new(&config.project, tokens.clone())?;
    let warehouse = BigQueryWarehouse::new(&config.project, tokens)?;

    Ok(Orchestrator::new(api, store, warehouse, db.task_repo(), config))
}

async fn cmd_worker(
    queue: RefreshTaskRepository,
    orchestrator: Arc<LiveOrchestrator>,
    config: WorkerConfig,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    WorkerService::new(queue, orchestrator, config)
        .run(cancel, &TracingWorkerReporter)
        .await
        .map_err(|e| anyhow::anyhow!(e))
}

async fn cmd_refresh(orchestrator: &LiveOrchestrator, stage: EntityKind) -> Result<()> {
    let accounts = orchestrator
        .refresh_accounts()
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    println!("{}", accounts.report);

    let report = match stage {
        EntityKind::Account => {
            for account in &accounts.context.accounts {
                println!("  {} {}", account.client_customer, account.status);
            }
            return Ok(());
        }
        EntityKind::Campaign => orchestrator.refresh_campaigns().await,
        EntityKind::AdGroup => orchestrator.refresh_ad_groups().await,
        EntityKind::AdGroupAd => orchestrator.refresh_ad_group_ads().await,
    }
    .map_err(|e| anyhow::anyhow!(e))?;

    println!("{report}");
    Ok(())
}

fn cmd_schema(kind: EntityKind) -> Result<()> {
    let fields = SchemaTranslator::default()
        .translate(&descriptors::for_kind(kind))
        .map_err(|e| anyhow::anyhow!(e))?;
    println!("{}", serde_json::to_string_pretty(&bigquery_schema(&fields))?);
    Ok(())
}

async fn cmd_tasks(
    repo: &RefreshTaskRepository,
    id: Option<Uuid>,
    status: Option<TaskStatus>,
    limit: usize,
) -> Result<()> {
    if let Some(id) = id {
        let task = repo
            .get_task(id)
            .await
            .map_err(|e| anyhow::anyhow!(e))?
            .with_context(|| format!("Task not found: {id}"))?;
        println!("{}", serde_json::to_string_pretty(&task)?);
        return Ok(());
    }

    let tasks = repo
        .list_tasks(status, limit)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    if tasks.is_empty() {
        println!("No tasks found");
        return Ok(());
    }

    for task in &tasks {
        println!(
            "  [{:>9}] {} {} (retries: {}/{}){}",
            task.status,
            task.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            task.payload,
            task.retry_count,
            task.max_retries,
            task.error_message
                .as_deref()
                .map(|e| format!(" error: {e}"))
                .unwrap_or_default(),
        );
    }
    println!("\nTotal: {} tasks", tasks.len());

    Ok(())
}
