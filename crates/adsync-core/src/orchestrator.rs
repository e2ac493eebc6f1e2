use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{NaiveDate, Utc};
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::eligibility::policy_for;
use crate::entity::Entity;
use crate::error::AppError;
use crate::fetcher::{EntityFetcher, FetchOutcome, blob_template};
use crate::loader::WarehouseLoader;
use crate::models::{AdGroup, AdGroupAd, Account, Campaign, EntityKind, partition_key};
use crate::schema::{FieldSpec, SchemaTranslator};
use crate::serializer::serialize_batch;
use crate::stage_writer::StageWriter;
use crate::task::{CreateTaskRequest, RefreshTask, TaskPayload};
use crate::task_queue::TaskQueue;
use crate::traits::{AdsApi, ObjectStore, Warehouse};
use crate::worker::TaskHandler;

/// Dependent stages in the order a full cycle dispatches them.
pub const CYCLE_ORDER: [EntityKind; 3] = [
    EntityKind::Campaign,
    EntityKind::AdGroupAd,
    EntityKind::AdGroup,
];

/// The roster of one refresh cycle, passed to every dependent stage.
#[derive(Debug, Clone)]
pub struct CycleContext {
    pub date: NaiveDate,
    pub accounts: Vec<Account>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// The stage was executed inline and loaded into its table.
    Loaded {
        table: String,
        records: usize,
        blobs: usize,
        table_rows: u64,
    },
    /// One task per eligible account was enqueued.
    Enqueued { table: String, tasks: usize },
    Skipped { reason: String },
    Failed { error: String },
}

/// Result of one stage, rendered as a human-readable status line.
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub kind: EntityKind,
    pub outcome: StageOutcome,
}

impl StageReport {
    fn skipped(kind: EntityKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            outcome: StageOutcome::Skipped {
                reason: reason.into(),
            },
        }
    }
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self.kind.stage_label();
        match &self.outcome {
            StageOutcome::Loaded {
                table,
                records,
                blobs,
                table_rows,
            } => write!(
                f,
                "{label}: loaded {records} records from {blobs} blob(s) into {table} ({table_rows} rows)"
            ),
            StageOutcome::Enqueued { table, tasks } => {
                write!(f, "{label}: enqueued {tasks} task(s) loading into {table}")
            }
            StageOutcome::Skipped { reason } => write!(f, "{label}: skipped, {reason}"),
            StageOutcome::Failed { error } => write!(f, "{label}: failed, {error}"),
        }
    }
}

/// Roster plus status of the Accounts stage.
#[derive(Debug, Clone)]
pub struct AccountsRefresh {
    pub context: Arc<CycleContext>,
    pub report: StageReport,
}

/// Status of every stage of one full cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub date: NaiveDate,
    pub stages: Vec<StageReport>,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cycle {}", partition_key(self.date))?;
        for stage in &self.stages {
            write!(f, "\n{stage}")?;
        }
        Ok(())
    }
}

/// Result of one per-account fetch task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub kind: EntityKind,
    pub account_id: String,
    pub table: String,
    pub rows: usize,
    pub blobs: usize,
    pub table_rows: u64,
}

impl fmt::Display for TaskReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} for account {}: {} rows in {} blob(s) loaded into {} ({} rows)",
            self.kind.stage_label(),
            self.account_id,
            self.rows,
            self.blobs,
            self.table,
            self.table_rows
        )
    }
}

/// Sequences the stages of a refresh and fans dependent stages out to the
/// task queue, one task per eligible account.
pub struct Orchestrator<A, S, W, Q>
where
    A: AdsApi,
    S: ObjectStore,
    W: Warehouse,
    Q: TaskQueue,
{
    api: A,
    fetcher: EntityFetcher<A, S>,
    loader: WarehouseLoader<W>,
    queue: Q,
    config: PipelineConfig,
    translator: SchemaTranslator,
    roster: RwLock<Option<Arc<CycleContext>>>,
    cycle_lock: tokio::sync::Mutex<()>,
}

impl<A, S, W, Q> Orchestrator<A, S, W, Q>
where
    A: AdsApi,
    S: ObjectStore,
    W: Warehouse,
    Q: TaskQueue,
{
    pub fn new(api: A, store: S, warehouse: W, queue: Q, config: PipelineConfig) -> Self {
        let writer = StageWriter::new(store, config.bucket.clone(), config.chunk_size);
        Self {
            fetcher: EntityFetcher::new(api.clone(), writer),
            api,
            loader: WarehouseLoader::new(warehouse, config.dataset.clone()),
            queue,
            config,
            translator: SchemaTranslator::default(),
            roster: RwLock::new(None),
            cycle_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_translator(mut self, translator: SchemaTranslator) -> Self {
        self.translator = translator;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// The cached roster, if the Accounts stage has run since the last clear.
    pub fn roster(&self) -> Option<Arc<CycleContext>> {
        match self.roster.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_roster(&self, context: Option<Arc<CycleContext>>) {
        match self.roster.write() {
            Ok(mut guard) => *guard = context,
            Err(poisoned) => *poisoned.into_inner() = context,
        }
    }

    /// Drop the cached roster.
    pub fn clear(&self) {
        self.set_roster(None);
        tracing::info!("Roster cleared");
    }

    /// Warehouse columns for an entity kind.
    pub fn schema_for(&self, kind: EntityKind) -> Result<Vec<FieldSpec>, AppError> {
        let fields = match kind {
            EntityKind::Account => Account::wire_schema(),
            EntityKind::Campaign => Campaign::wire_schema(),
            EntityKind::AdGroup => AdGroup::wire_schema(),
            EntityKind::AdGroupAd => AdGroupAd::wire_schema(),
        };
        self.translator.translate(&fields)
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    // -----------------------------------------------------------------------
    // Stage entrypoints
    // -----------------------------------------------------------------------

    /// Fetch the roster under the manager account, load it into the day's
    /// accounts table and cache it for the dependent stages.
    pub async fn refresh_accounts(&self) -> Result<AccountsRefresh, AppError> {
        let refresh = self
            .load_accounts(Self::today(), &CancellationToken::new())
            .await?;
        self.set_roster(Some(refresh.context.clone()));
        Ok(refresh)
    }

    pub async fn refresh_campaigns(&self) -> Result<StageReport, AppError> {
        self.refresh_stage(EntityKind::Campaign).await
    }

    pub async fn refresh_ad_groups(&self) -> Result<StageReport, AppError> {
        self.refresh_stage(EntityKind::AdGroup).await
    }

    pub async fn refresh_ad_group_ads(&self) -> Result<StageReport, AppError> {
        self.refresh_stage(EntityKind::AdGroupAd).await
    }

    /// Enqueue a deferred full cycle and return immediately.
    pub async fn refresh_all(&self) -> Result<RefreshTask, AppError> {
        let task = self
            .queue
            .create_task(CreateTaskRequest::new(TaskPayload::FullCycle))
            .await?;
        tracing::info!(task_id = %task.id, "Full refresh cycle enqueued");
        Ok(task)
    }

    /// Run every stage against one explicit cycle context.
    ///
    /// Only one cycle runs at a time in this process; a concurrent call fails
    /// with [`AppError::CycleInProgress`]. A failed Accounts stage aborts the
    /// cycle. A failed dependent stage is reported and the others still run.
    pub async fn run_full_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport, AppError> {
        let _guard = self
            .cycle_lock
            .try_lock()
            .map_err(|_| AppError::CycleInProgress)?;

        self.clear();
        let result = self.cycle(Self::today(), cancel).await;
        self.clear();

        match &result {
            Ok(report) => tracing::info!(date = %report.date, stages = report.stages.len(), "Refresh cycle finished"),
            Err(e) => tracing::error!(error = %e, "Refresh cycle aborted"),
        }
        result
    }

    async fn cycle(&self, date: NaiveDate, cancel: &CancellationToken) -> Result<CycleReport, AppError> {
        let accounts = self.load_accounts(date, cancel).await?;
        let mut stages = vec![accounts.report];

        for kind in CYCLE_ORDER {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            let report = match self.dispatch_stage(&accounts.context, kind).await {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(kind = %kind, error = %e, "Stage failed");
                    StageReport {
                        kind,
                        outcome: StageOutcome::Failed {
                            error: e.to_string(),
                        },
                    }
                }
            };
            stages.push(report);
        }

        Ok(CycleReport { date, stages })
    }

    async fn refresh_stage(&self, kind: EntityKind) -> Result<StageReport, AppError> {
        match self.roster() {
            Some(context) => self.dispatch_stage(&context, kind).await,
            None => {
                tracing::info!(kind = %kind, "No roster loaded, skipping stage");
                Ok(StageReport::skipped(kind, "no roster loaded"))
            }
        }
    }

    /// Replace the stage's table and enqueue one fetch task per eligible
    /// account in `context`.
    pub async fn dispatch_stage(
        &self,
        context: &CycleContext,
        kind: EntityKind,
    ) -> Result<StageReport, AppError> {
        let Some(policy) = policy_for(kind) else {
            return Err(AppError::Generic(format!(
                "{kind} is loaded inline and cannot be dispatched"
            )));
        };

        if context.accounts.is_empty() {
            tracing::info!(kind = %kind, "Roster is empty, skipping stage");
            return Ok(StageReport::skipped(kind, "roster is empty"));
        }

        // Translate first so a bad schema leaves yesterday's state untouched.
        self.schema_for(kind)?;

        let table = self.config.table_for(kind, context.date);
        self.loader.ensure_table_absent(&table).await?;
        self.fetcher
            .writer()
            .store()
            .ensure_bucket(&self.config.bucket)
            .await?;

        let account_ids = policy.select(&context.accounts);
        for account_id in &account_ids {
            let request = CreateTaskRequest::fetch_account(kind, account_id.as_str(), context.date);
            self.queue.create_task(request).await?;
        }

        tracing::info!(
            kind = %kind,
            %table,
            roster = context.accounts.len(),
            tasks = account_ids.len(),
            "Stage dispatched"
        );

        Ok(StageReport {
            kind,
            outcome: StageOutcome::Enqueued {
                table,
                tasks: account_ids.len(),
            },
        })
    }

    async fn load_accounts(
        &self,
        date: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<AccountsRefresh, AppError> {
        let kind = EntityKind::Account;
        let schema = self.schema_for(kind)?;
        let table = self.config.table_for(kind, date);
        let mcc_id = self.config.mcc_id.as_str();

        self.loader.ensure_table_absent(&table).await?;
        self.fetcher
            .writer()
            .store()
            .ensure_bucket(&self.config.bucket)
            .await?;

        let accounts = self.collect_accounts(mcc_id, cancel).await?;
        let lines = serialize_batch(&accounts);
        let blobs = self
            .fetcher
            .writer()
            .write(lines, date, &blob_template(date, mcc_id, kind, 0))
            .await?;

        let mut table_rows = 0;
        for blob in &blobs {
            table_rows = self.loader.load(&table, &schema, blob).await?;
        }

        tracing::info!(
            %mcc_id,
            %table,
            accounts = accounts.len(),
            blobs = blobs.len(),
            "Roster loaded"
        );

        let report = StageReport {
            kind,
            outcome: StageOutcome::Loaded {
                table,
                records: accounts.len(),
                blobs: blobs.len(),
                table_rows,
            },
        };
        Ok(AccountsRefresh {
            context: Arc::new(CycleContext { date, accounts }),
            report,
        })
    }

    /// Read the whole roster into memory. Any source error fails the stage.
    async fn collect_accounts(
        &self,
        mcc_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Account>, AppError> {
        use futures::StreamExt;

        let mut rows = self.api.search(mcc_id, Account::QUERY);
        let mut accounts = Vec::new();
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(AppError::Cancelled),
                next = rows.next() => next,
            };
            match next {
                None => break,
                Some(row) => accounts.push(Account::project(&row?)?),
            }
        }
        Ok(accounts)
    }

    // -----------------------------------------------------------------------
    // Task body
    // -----------------------------------------------------------------------

    /// Fetch one entity kind for one account and load every staged blob into
    /// the day's table.
    ///
    /// Blobs flushed before a fetch error are still loaded; the error is
    /// returned afterwards so the caller can decide whether to redeliver.
    pub async fn execute_fetch(
        &self,
        kind: EntityKind,
        account_id: &str,
        date: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<TaskReport, AppError> {
        let schema = self.schema_for(kind)?;
        let table = self.config.table_for(kind, date);

        let outcome: FetchOutcome = match kind {
            EntityKind::Account => self.fetcher.fetch::<Account>(account_id, date, cancel).await?,
            EntityKind::Campaign => self.fetcher.fetch::<Campaign>(account_id, date, cancel).await?,
            EntityKind::AdGroup => self.fetcher.fetch::<AdGroup>(account_id, date, cancel).await?,
            EntityKind::AdGroupAd => {
                self.fetcher
                    .fetch::<AdGroupAd>(account_id, date, cancel)
                    .await?
            }
        };

        let mut table_rows = 0;
        for blob in &outcome.blobs {
            table_rows = self.loader.load(&table, &schema, blob).await?;
        }

        if let Some(e) = outcome.error {
            return Err(e);
        }

        Ok(TaskReport {
            kind,
            account_id: account_id.to_string(),
            table,
            rows: outcome.rows,
            blobs: outcome.blobs.len(),
            table_rows,
        })
    }
}

impl<A, S, W, Q> TaskHandler for Orchestrator<A, S, W, Q>
where
    A: AdsApi,
    S: ObjectStore,
    W: Warehouse,
    Q: TaskQueue,
{
    async fn handle(&self, payload: &TaskPayload, cancel: CancellationToken) -> Result<String, AppError> {
        match payload {
            TaskPayload::FetchAccount {
                kind,
                account_id,
                date,
            } => {
                let report = self.execute_fetch(*kind, account_id, *date, &cancel).await?;
                Ok(report.to_string())
            }
            TaskPayload::FullCycle => {
                let report = self.run_full_cycle(&cancel).await?;
                Ok(report.to_string())
            }
        }
    }
}
