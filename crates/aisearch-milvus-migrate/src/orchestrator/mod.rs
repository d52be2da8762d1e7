//! Batch migrator - drives documents from the source index into the target collection.

mod machine;
mod retry;

pub use machine::{BatchTally, Phase, Step};
pub use retry::RetryPolicy;

use crate::config::MigrationConfig;
use crate::convert::SchemaConversionResult;
use crate::core::{RejectedDocument, SourceReader, TargetWriter};
use crate::error::{MigrateError, Result};
use crate::state::{Checkpoint, CheckpointKey, CheckpointLease, CheckpointStore, RunStatus};
use crate::transform::{DocumentTransformer, TransformFailure};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Failure records kept in the result; counters keep counting past this.
const MAX_REPORTED_FAILURES: usize = 1000;

/// Knobs for a single run.
#[derive(Debug, Clone)]
pub struct MigratorOptions {
    /// Documents per batch.
    pub batch_size: usize,
    /// Blocking tasks used to transform one batch.
    pub transform_workers: usize,
    pub retry: RetryPolicy,
    /// Extract and transform only; touch neither target nor checkpoint.
    pub dry_run: bool,
    /// Discard any existing checkpoint instead of resuming.
    pub fresh_start: bool,
    /// Recreate the target collection. Implies a fresh start.
    pub drop_existing: bool,
}

impl Default for MigratorOptions {
    fn default() -> Self {
        Self {
            batch_size: 500,
            transform_workers: 4,
            retry: RetryPolicy::default(),
            dry_run: false,
            fresh_start: false,
            drop_existing: false,
        }
    }
}

impl MigratorOptions {
    pub fn from_config(config: &MigrationConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            transform_workers: config.get_transform_workers(),
            retry: config.retry_policy(),
            dry_run: false,
            fresh_start: false,
            drop_existing: config.drop_existing_collection,
        }
    }
}

/// Progress notification sent after every committed batch.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    pub phase: Phase,
    /// Batches committed in total, including earlier runs.
    pub batch: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Source document count, if known.
    pub total: Option<u64>,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status ("completed" or "dry_run").
    pub status: String,

    pub dry_run: bool,

    pub source_id: String,

    pub target_id: String,

    pub collection: String,

    pub schema_fingerprint: String,

    /// Whether the run continued from an existing checkpoint.
    pub resumed: bool,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Batches committed by this run.
    pub batches: u64,

    /// Batches committed across all runs.
    pub batches_committed: u64,

    /// Documents read from the source by this run.
    pub documents_extracted: u64,

    /// Cumulative counters from the checkpoint.
    pub processed_count: u64,
    pub success_count: u64,
    pub failure_count: u64,

    /// Average throughput of this run.
    pub documents_per_second: f64,

    pub indexes_built: usize,

    /// VARCHAR values cut to their field's max_length by this run.
    pub truncated_values: u64,

    /// Documents that could not be transformed (first 1000).
    pub transform_failures: Vec<TransformFailure>,

    /// Documents the target refused (first 1000).
    pub rejected: Vec<RejectedDocument>,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Mutable state of one run.
struct RunContext {
    key: CheckpointKey,
    checkpoint: Checkpoint,
    lease: CheckpointLease,
    /// The checkpoint reflects what is durable; failures may be recorded.
    initialized: bool,
    resumed: bool,
    total: Option<u64>,
    batches: u64,
    extracted: u64,
    indexes_built: usize,
    truncated_values: u64,
    transform_failures: Vec<TransformFailure>,
    rejected: Vec<RejectedDocument>,
}

/// Resumable extract/transform/load/checkpoint loop.
pub struct BatchMigrator {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    store: Arc<dyn CheckpointStore>,
    conversion: Arc<SchemaConversionResult>,
    transformer: DocumentTransformer,
    options: MigratorOptions,
    cancel: CancellationToken,
    progress: Option<mpsc::Sender<ProgressUpdate>>,
}

impl BatchMigrator {
    pub fn new(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        store: Arc<dyn CheckpointStore>,
        conversion: SchemaConversionResult,
        options: MigratorOptions,
    ) -> Self {
        let transformer = DocumentTransformer::new(&conversion);
        Self {
            source,
            target,
            store,
            conversion: Arc::new(conversion),
            transformer,
            options,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Send a [`ProgressUpdate`] after every committed batch.
    pub fn with_progress(mut self, tx: mpsc::Sender<ProgressUpdate>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Stop at the next batch boundary once `token` is cancelled.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.options.dry_run = enabled;
        self
    }

    pub fn fresh_start(mut self, enabled: bool) -> Self {
        self.options.fresh_start = enabled;
        self
    }

    pub fn drop_existing(mut self, enabled: bool) -> Self {
        self.options.drop_existing = enabled;
        self
    }

    /// Checkpoint identity of this migration.
    pub fn key(&self) -> CheckpointKey {
        CheckpointKey::new(self.source.source_id(), self.target.target_id())
    }

    /// Run the migration to completion, failure or cancellation.
    pub async fn run(self) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let key = self.key();
        let run_id = uuid::Uuid::new_v4().to_string();

        info!(
            "Starting migration run {}: {} ({} fields, fingerprint {})",
            run_id,
            key,
            self.conversion.fields.len(),
            short(&self.conversion.fingerprint)
        );

        let mut ctx = RunContext {
            checkpoint: Checkpoint::new(&key, &self.conversion.fingerprint, &run_id),
            key,
            lease: CheckpointLease::detached(),
            initialized: false,
            resumed: false,
            total: None,
            batches: 0,
            extracted: 0,
            indexes_built: 0,
            truncated_values: 0,
            transform_failures: Vec::new(),
            rejected: Vec::new(),
        };

        let mut step = Step::Init;
        loop {
            let phase = step.phase();
            if phase == Phase::Done {
                break;
            }
            match self.advance(&mut ctx, step).await {
                Ok(next) => {
                    debug_assert!(
                        phase.can_advance_to(next.phase()),
                        "illegal transition {} -> {}",
                        phase,
                        next.phase()
                    );
                    debug!("{} -> {}", phase, next.phase());
                    step = next;
                }
                Err(e) => {
                    debug!("{} -> {}", phase, Phase::Failed);
                    self.record_failure(&ctx, &e).await;
                    return Err(e);
                }
            }
        }

        if let Err(e) = self.complete(&mut ctx).await {
            self.record_failure(&ctx, &e).await;
            return Err(e);
        }

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let documents_per_second = if duration > 0.0 {
            ctx.extracted as f64 / duration
        } else {
            0.0
        };

        let cp = &ctx.checkpoint;
        let result = MigrationResult {
            run_id: cp.run_id.clone(),
            status: if self.options.dry_run { "dry_run" } else { "completed" }.to_string(),
            dry_run: self.options.dry_run,
            source_id: ctx.key.source_id.clone(),
            target_id: ctx.key.target_id.clone(),
            collection: self.conversion.collection.clone(),
            schema_fingerprint: self.conversion.fingerprint.clone(),
            resumed: ctx.resumed,
            started_at,
            completed_at,
            duration_seconds: duration,
            batches: ctx.batches,
            batches_committed: cp.batches_committed,
            documents_extracted: ctx.extracted,
            processed_count: cp.processed_count,
            success_count: cp.success_count,
            failure_count: cp.failure_count,
            documents_per_second,
            indexes_built: ctx.indexes_built,
            truncated_values: ctx.truncated_values,
            transform_failures: ctx.transform_failures,
            rejected: ctx.rejected,
        };

        info!(
            "Migration {}: {} processed, {} written, {} failed in {:.1}s ({:.0} docs/s)",
            result.status,
            result.processed_count,
            result.success_count,
            result.failure_count,
            result.duration_seconds,
            result.documents_per_second
        );

        Ok(result)
    }

    /// Execute the work of `step` and return the step that follows it.
    async fn advance(&self, ctx: &mut RunContext, step: Step) -> Result<Step> {
        match step {
            Step::Init => self.init(ctx).await,
            Step::Extract => self.extract(ctx).await,
            Step::Transform(page) => {
                let mut tally = BatchTally {
                    processed: page.documents.len() as u64,
                    next_cursor: page.next_cursor,
                    ..Default::default()
                };
                let batch = self
                    .transformer
                    .transform_batch(page.documents, self.options.transform_workers)
                    .await?;

                tally.failed = batch.failures.len() as u64;
                if batch.truncated_values > 0 {
                    warn!(
                        "{} VARCHAR values truncated to their max_length",
                        batch.truncated_values
                    );
                    ctx.truncated_values += batch.truncated_values;
                }
                if !batch.failures.is_empty() {
                    warn!(
                        "{} of {} documents failed to transform",
                        batch.failures.len(),
                        tally.processed
                    );
                }
                let room = MAX_REPORTED_FAILURES.saturating_sub(ctx.transform_failures.len());
                ctx.transform_failures
                    .extend(batch.failures.iter().take(room).cloned());

                if self.options.dry_run || batch.documents.is_empty() {
                    if self.options.dry_run {
                        tally.succeeded = batch.documents.len() as u64;
                    }
                    return Ok(Step::Checkpoint(tally));
                }
                Ok(Step::Load {
                    documents: batch.documents,
                    tally,
                })
            }
            Step::Load {
                documents,
                mut tally,
            } => {
                let batch_no = ctx.checkpoint.batches_committed + 1;
                let count = documents.len();
                let (outcome, attempts) = self
                    .options
                    .retry
                    .run_counted("upsert", || self.target.upsert(documents.clone()))
                    .await;
                let outcome = outcome.map_err(|e| MigrateError::Load {
                    batch: batch_no,
                    attempts,
                    message: e.to_string(),
                })?;

                if !outcome.rejected.is_empty() {
                    warn!(
                        "Target rejected {} of {} documents in batch {}",
                        outcome.rejected.len(),
                        count,
                        batch_no
                    );
                }
                tally.succeeded = outcome.succeeded;
                tally.failed += outcome.rejected.len() as u64;
                let room = MAX_REPORTED_FAILURES.saturating_sub(ctx.rejected.len());
                ctx.rejected.extend(outcome.rejected.into_iter().take(room));
                Ok(Step::Checkpoint(tally))
            }
            Step::Checkpoint(tally) => self.commit(ctx, tally).await,
            Step::BuildIndex => {
                if self.options.dry_run {
                    return Ok(Step::Done);
                }
                for index in &self.conversion.indexes {
                    info!(
                        "Building {} index on {} ({})",
                        index.index_type, index.field, index.metric_type
                    );
                    self.options
                        .retry
                        .run("build_index", || self.target.build_index(&index.field, index))
                        .await?;
                    ctx.indexes_built += 1;
                }
                Ok(Step::Done)
            }
            Step::Done => Ok(Step::Done),
        }
    }

    async fn init(&self, ctx: &mut RunContext) -> Result<Step> {
        ctx.total = match self.options.retry.run("count", || self.source.count()).await {
            Ok(n) => Some(n),
            Err(e) => {
                warn!("Could not count source documents: {}", e);
                None
            }
        };

        if self.options.dry_run {
            info!(
                "Dry run: transforming {} without writing to {}",
                ctx.key.source_id, ctx.key.target_id
            );
            return Ok(Step::Extract);
        }

        ctx.lease = self.store.lock(&ctx.key).await?;

        if self.options.fresh_start || self.options.drop_existing {
            self.store.clear(&ctx.key).await?;
        } else if let Some(existing) = self.store.load(&ctx.key).await? {
            existing.validate_for(&ctx.key, &self.conversion.fingerprint)?;
            info!(
                "Resuming from checkpoint: {} processed in {} batches (run {})",
                existing.processed_count, existing.batches_committed, existing.run_id
            );
            ctx.checkpoint = existing;
            ctx.resumed = true;
        }
        ctx.checkpoint.status = RunStatus::Running;
        ctx.initialized = true;

        let schema = self.conversion.target_schema();
        if self.options.drop_existing {
            info!("Recreating collection {}", schema.collection);
        }
        self.options
            .retry
            .run("create_collection", || {
                self.target
                    .create_collection(&schema, self.options.drop_existing)
            })
            .await?;

        if ctx.checkpoint.is_completed() || ctx.checkpoint.source_exhausted {
            info!("Source already fully migrated, finishing index build");
            return Ok(Step::BuildIndex);
        }
        Ok(Step::Extract)
    }

    async fn extract(&self, ctx: &mut RunContext) -> Result<Step> {
        if ctx.checkpoint.source_exhausted {
            return Ok(Step::BuildIndex);
        }
        if self.cancel.is_cancelled() {
            info!("Cancellation requested, stopping at batch boundary");
            return Err(MigrateError::Cancelled);
        }

        let cursor = ctx.checkpoint.cursor.clone();
        let page = self
            .options
            .retry
            .run("paginate", || {
                self.source
                    .paginate(cursor.as_deref(), self.options.batch_size)
            })
            .await?;

        if page.documents.is_empty() {
            debug!("Source exhausted at cursor {:?}", cursor);
            ctx.checkpoint.source_exhausted = true;
            return Ok(Step::BuildIndex);
        }

        ctx.extracted += page.documents.len() as u64;
        Ok(Step::Transform(page))
    }

    /// Persist a fully loaded batch, then report progress.
    async fn commit(&self, ctx: &mut RunContext, tally: BatchTally) -> Result<Step> {
        let mut next = ctx.checkpoint.clone();
        next.record_batch(tally.processed, tally.succeeded, tally.failed, tally.next_cursor);

        if !self.options.dry_run {
            ctx.lease.heartbeat()?;
            self.store.save(&mut next).await?;
        }
        ctx.checkpoint = next;
        ctx.batches += 1;

        let cp = &ctx.checkpoint;
        match ctx.total {
            Some(total) => info!(
                "Batch {} committed: {}/{} processed ({} failed)",
                cp.batches_committed, cp.processed_count, total, cp.failure_count
            ),
            None => info!(
                "Batch {} committed: {} processed ({} failed)",
                cp.batches_committed, cp.processed_count, cp.failure_count
            ),
        }

        if let Some(tx) = &self.progress {
            let update = ProgressUpdate {
                phase: Phase::Checkpoint,
                batch: cp.batches_committed,
                processed: cp.processed_count,
                succeeded: cp.success_count,
                failed: cp.failure_count,
                total: ctx.total,
            };
            if tx.send(update).await.is_err() {
                debug!("Progress receiver dropped");
            }
        }

        Ok(Step::Extract)
    }

    /// DONE: make the collection queryable and mark the checkpoint complete.
    async fn complete(&self, ctx: &mut RunContext) -> Result<()> {
        if self.options.dry_run {
            return Ok(());
        }
        self.options
            .retry
            .run("load_collection", || self.target.load_collection())
            .await?;

        ctx.lease.heartbeat()?;
        ctx.checkpoint.mark_completed();
        self.store.save(&mut ctx.checkpoint).await?;
        Ok(())
    }

    /// Record a FAILED or cancelled run without moving the committed cursor.
    ///
    /// Nothing is written once the lock is gone: the checkpoint then belongs
    /// to whichever run took it over.
    async fn record_failure(&self, ctx: &RunContext, err: &MigrateError) {
        if !ctx.initialized || self.options.dry_run {
            return;
        }
        if matches!(err, MigrateError::CheckpointLocked(_)) {
            warn!("Checkpoint lock lost, leaving checkpoint to its new owner: {}", err);
            return;
        }
        if let Err(e) = ctx.lease.heartbeat() {
            warn!("Not recording run status, checkpoint lock lost: {}", e);
            return;
        }

        let mut cp = ctx.checkpoint.clone();
        match err {
            MigrateError::Cancelled => cp.mark_cancelled(),
            _ => cp.mark_failed(),
        }
        if let Err(e) = self.store.save(&mut cp).await {
            warn!("Failed to record run status in checkpoint: {}", e);
        }
        warn!(
            "Migration stopped after {} committed batches: {}",
            cp.batches_committed, err
        );
    }
}

fn short(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}
