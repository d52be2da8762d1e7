//! End-to-end migration scenarios against the in-memory source and target.
//!
//! Crashes are simulated by wrapping the real collaborators and failing one
//! specific call, then resuming with the unwrapped ones.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use aisearch_milvus_migrate::core::{
    Document, EdmKind, FieldDescriptor, IndexSpec, Page, RawDocument, SourceReader, SourceSchema,
    TargetSchema, TargetWriter, UpsertOutcome,
};
use aisearch_milvus_migrate::convert::FieldOverride;
use aisearch_milvus_migrate::state::{Checkpoint, CheckpointLease, RunStatus};
use aisearch_milvus_migrate::{
    convert, BatchMigrator, CheckpointKey, CheckpointStore, ConversionOptions, FileCheckpointStore,
    MemorySource, MemoryTarget, MigrateError, MigratorOptions, Result, RetryPolicy,
    SchemaConversionResult, Validator,
};

fn schema() -> SourceSchema {
    SourceSchema::new(
        "products",
        vec![
            FieldDescriptor::scalar("id", EdmKind::String).key(),
            FieldDescriptor::scalar("price", EdmKind::Double),
            FieldDescriptor::vector("vec", EdmKind::Single, Some(4)),
        ],
    )
}

fn document(i: usize) -> RawDocument {
    json!({
        "id": format!("doc-{:04}", i),
        "price": i as f64 * 1.5,
        "vec": [i as f64 / 1000.0, 0.5, 0.25, 1.0],
    })
    .as_object()
    .unwrap()
    .clone()
}

fn source(n: usize) -> Arc<MemorySource> {
    Arc::new(MemorySource::new(schema(), (0..n).map(document).collect()).unwrap())
}

fn conversion() -> SchemaConversionResult {
    convert(&schema(), &ConversionOptions::default()).unwrap()
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(1),
        timeout: Duration::from_secs(5),
    }
}

fn options(batch_size: usize) -> MigratorOptions {
    MigratorOptions {
        batch_size,
        transform_workers: 2,
        retry: fast_retry(),
        ..Default::default()
    }
}

fn key() -> CheckpointKey {
    CheckpointKey::new("products", "products")
}

fn migrator(
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    store: Arc<dyn CheckpointStore>,
    batch_size: usize,
) -> BatchMigrator {
    BatchMigrator::new(source, target, store, conversion(), options(batch_size))
}

/// Checkpoint store that fails exactly one `save` call.
struct FailingStore {
    inner: FileCheckpointStore,
    fail_on: u64,
    saves: AtomicU64,
}

#[async_trait]
impl CheckpointStore for FailingStore {
    async fn load(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>> {
        self.inner.load(key).await
    }

    async fn save(&self, checkpoint: &mut Checkpoint) -> Result<()> {
        let n = self.saves.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into());
        }
        self.inner.save(checkpoint).await
    }

    async fn clear(&self, key: &CheckpointKey) -> Result<()> {
        self.inner.clear(key).await
    }

    async fn lock(&self, key: &CheckpointKey) -> Result<CheckpointLease> {
        self.inner.lock(key).await
    }

    fn store_type(&self) -> &'static str {
        "failing"
    }
}

/// Target that fails one upsert call permanently.
struct FailingTarget {
    inner: Arc<MemoryTarget>,
    fail_on: u64,
    upserts: AtomicU64,
}

#[async_trait]
impl TargetWriter for FailingTarget {
    fn target_id(&self) -> &str {
        self.inner.target_id()
    }

    async fn create_collection(&self, schema: &TargetSchema, drop_existing: bool) -> Result<()> {
        self.inner.create_collection(schema, drop_existing).await
    }

    async fn upsert(&self, batch: Vec<Document>) -> Result<UpsertOutcome> {
        let n = self.upserts.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on {
            return Err(MigrateError::Target("write rejected".into()));
        }
        self.inner.upsert(batch).await
    }

    async fn build_index(&self, field: &str, spec: &IndexSpec) -> Result<()> {
        self.inner.build_index(field, spec).await
    }

    async fn load_collection(&self) -> Result<()> {
        self.inner.load_collection().await
    }

    async fn count(&self) -> Result<u64> {
        self.inner.count().await
    }

    async fn get_by_keys(&self, keys: &[String]) -> Result<Vec<Document>> {
        self.inner.get_by_keys(keys).await
    }

    async fn describe_collection(&self) -> Result<Option<TargetSchema>> {
        self.inner.describe_collection().await
    }
}

/// Source that hands the checkpoint to another migration on one `paginate`
/// call, as a second process would after reclaiming the lock.
struct TakeoverSource {
    inner: Arc<MemorySource>,
    store: FileCheckpointStore,
    on_page: u64,
    pages: AtomicU64,
}

#[async_trait]
impl SourceReader for TakeoverSource {
    fn source_id(&self) -> &str {
        self.inner.source_id()
    }

    async fn list_schema(&self) -> Result<SourceSchema> {
        self.inner.list_schema().await
    }

    async fn paginate(&self, cursor: Option<&str>, batch_size: usize) -> Result<Page> {
        let n = self.pages.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.on_page {
            let now = chrono::Utc::now();
            let lock = json!({
                "owner": "other-run",
                "pid": 1,
                "acquiredAt": now,
                "heartbeatAt": now,
            });
            std::fs::write(self.store.lock_path_for(&key()), lock.to_string())?;
            let mut cp = Checkpoint::new(&key(), &conversion().fingerprint, "other-run");
            self.store.save(&mut cp).await?;
        }
        self.inner.paginate(cursor, batch_size).await
    }

    async fn get_by_keys(&self, keys: &[String]) -> Result<Vec<RawDocument>> {
        self.inner.get_by_keys(keys).await
    }

    async fn count(&self) -> Result<u64> {
        self.inner.count().await
    }
}

/// Target whose upserts outlast the checkpoint lock's stale window.
struct SlowTarget {
    inner: Arc<MemoryTarget>,
    delay: Duration,
}

#[async_trait]
impl TargetWriter for SlowTarget {
    fn target_id(&self) -> &str {
        self.inner.target_id()
    }

    async fn create_collection(&self, schema: &TargetSchema, drop_existing: bool) -> Result<()> {
        self.inner.create_collection(schema, drop_existing).await
    }

    async fn upsert(&self, batch: Vec<Document>) -> Result<UpsertOutcome> {
        tokio::time::sleep(self.delay).await;
        self.inner.upsert(batch).await
    }

    async fn build_index(&self, field: &str, spec: &IndexSpec) -> Result<()> {
        self.inner.build_index(field, spec).await
    }

    async fn load_collection(&self) -> Result<()> {
        self.inner.load_collection().await
    }

    async fn count(&self) -> Result<u64> {
        self.inner.count().await
    }

    async fn get_by_keys(&self, keys: &[String]) -> Result<Vec<Document>> {
        self.inner.get_by_keys(keys).await
    }

    async fn describe_collection(&self) -> Result<Option<TargetSchema>> {
        self.inner.describe_collection().await
    }
}

#[tokio::test]
async fn test_thousand_documents_in_ten_batches() {
    let dir = TempDir::new().unwrap();
    let source = source(1000);
    let target = Arc::new(MemoryTarget::new("products"));
    let store = Arc::new(FileCheckpointStore::new(dir.path()));

    let result = migrator(source.clone(), target.clone(), store.clone(), 100)
        .run()
        .await
        .unwrap();

    assert_eq!(result.batches, 10);
    assert_eq!(result.processed_count, 1000);
    assert_eq!(result.success_count, 1000);
    assert_eq!(result.failure_count, 0);
    assert_eq!(result.indexes_built, 1);
    assert!(!result.resumed);
    assert_eq!(target.count().await.unwrap(), 1000);
    assert!(target.is_loaded().await);
    assert!(target.indexes().await.contains_key("vec"));

    let checkpoint = store.load(&key()).await.unwrap().unwrap();
    assert_eq!(checkpoint.status, RunStatus::Completed);
    assert_eq!(checkpoint.batches_committed, 10);
    assert!(checkpoint.source_exhausted);

    let validation = Validator::new(source, target, conversion())
        .with_seed(Some(42))
        .compare(100)
        .await
        .unwrap();
    assert!(validation.passed(), "{:?}", validation.sample_mismatches);
    assert_eq!(validation.sampled_keys.len(), 100);
    assert_eq!(validation.sample_size, 100);
}

#[tokio::test]
async fn test_crash_between_load_and_checkpoint_leaves_no_duplicates() {
    let dir = TempDir::new().unwrap();
    let source = source(1000);
    let target = Arc::new(MemoryTarget::new("products"));
    let failing = Arc::new(FailingStore {
        inner: FileCheckpointStore::new(dir.path()),
        fail_on: 3,
        saves: AtomicU64::new(0),
    });

    let err = migrator(source.clone(), target.clone(), failing, 100)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::Io(_)));
    // Batch 3 reached the target but its checkpoint did not.
    assert_eq!(target.count().await.unwrap(), 300);

    let store = Arc::new(FileCheckpointStore::new(dir.path()));
    let stored = store.load(&key()).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Failed);
    assert_eq!(stored.batches_committed, 2);

    let result = migrator(source, target.clone(), store, 100)
        .run()
        .await
        .unwrap();
    assert!(result.resumed);
    assert_eq!(result.batches, 8);
    assert_eq!(result.processed_count, 1000);
    assert_eq!(target.count().await.unwrap(), 1000);
}

#[tokio::test]
async fn test_resume_after_target_failure_skips_committed_batches() {
    let dir = TempDir::new().unwrap();
    let source = source(1000);
    let inner = Arc::new(MemoryTarget::new("products"));
    let store = Arc::new(FileCheckpointStore::new(dir.path()));
    let failing = Arc::new(FailingTarget {
        inner: inner.clone(),
        fail_on: 4,
        upserts: AtomicU64::new(0),
    });

    let err = migrator(source.clone(), failing, store.clone(), 100)
        .run()
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 5);
    match err {
        MigrateError::Load { batch, attempts, .. } => {
            assert_eq!(batch, 4);
            assert_eq!(attempts, 1);
        }
        other => panic!("expected load error, got {other}"),
    }
    assert_eq!(source.documents_served(), 400);

    let result = migrator(source.clone(), inner.clone(), store, 100)
        .run()
        .await
        .unwrap();
    assert_eq!(result.batches, 7);
    assert_eq!(result.documents_extracted, 700);
    assert_eq!(source.documents_served(), 1100);
    assert_eq!(result.processed_count, 1000);
    assert_eq!(inner.count().await.unwrap(), 1000);
}

#[tokio::test]
async fn test_transient_upsert_errors_are_retried() {
    let dir = TempDir::new().unwrap();
    let target = Arc::new(MemoryTarget::new("products"));
    target.fail_next_upserts(2, true);

    let result = migrator(
        source(250),
        target.clone(),
        Arc::new(FileCheckpointStore::new(dir.path())),
        100,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(result.success_count, 250);
    assert_eq!(target.upsert_calls(), 3 + 2);
}

#[tokio::test]
async fn test_permanent_upsert_error_is_not_retried() {
    let dir = TempDir::new().unwrap();
    let target = Arc::new(MemoryTarget::new("products"));
    target.fail_next_upserts(1, false);

    let err = migrator(
        source(250),
        target.clone(),
        Arc::new(FileCheckpointStore::new(dir.path())),
        100,
    )
    .run()
    .await
    .unwrap_err();

    assert!(matches!(err, MigrateError::Load { attempts: 1, .. }));
    assert_eq!(target.upsert_calls(), 1);
}

#[tokio::test]
async fn test_transient_source_errors_are_retried() {
    let dir = TempDir::new().unwrap();
    let source = source(50);
    source.fail_next_pages(2);
    let target = Arc::new(MemoryTarget::new("products"));

    let result = migrator(
        source,
        target.clone(),
        Arc::new(FileCheckpointStore::new(dir.path())),
        20,
    )
    .run()
    .await
    .unwrap();
    assert_eq!(result.processed_count, 50);
    assert_eq!(target.count().await.unwrap(), 50);
}

#[tokio::test]
async fn test_validator_reports_short_sample() {
    let dir = TempDir::new().unwrap();
    let source = source(40);
    let target = Arc::new(MemoryTarget::new("products"));
    migrator(
        source.clone(),
        target.clone(),
        Arc::new(FileCheckpointStore::new(dir.path())),
        20,
    )
    .run()
    .await
    .unwrap();

    let result = Validator::new(source, target, conversion())
        .with_seed(Some(3))
        .compare(500)
        .await
        .unwrap();
    assert!(result.passed());
    assert_eq!(result.sample_size, 500);
    assert_eq!(result.sampled_keys.len(), 40);
}

#[tokio::test]
async fn test_validator_detects_altered_field() {
    let dir = TempDir::new().unwrap();
    let source = source(200);
    let target = Arc::new(MemoryTarget::new("products"));
    migrator(
        source.clone(),
        target.clone(),
        Arc::new(FileCheckpointStore::new(dir.path())),
        50,
    )
    .run()
    .await
    .unwrap();

    assert!(target
        .set_field("doc-0007", "price", json!(999.0))
        .await
        .unwrap());

    let result = Validator::new(source, target, conversion())
        .with_seed(Some(1))
        .compare(200)
        .await
        .unwrap();

    assert!(!result.passed());
    assert!(result.count_match);
    assert_eq!(result.mismatched_keys(), vec!["doc-0007"]);
    assert_eq!(result.sample_mismatches[0].field, "price");
    assert_eq!(result.sample_mismatches[0].actual, json!(999.0));
}

#[tokio::test]
async fn test_validator_detects_missing_documents() {
    let source = source(30);
    let target = Arc::new(MemoryTarget::new("products"));
    let conversion = conversion();
    target
        .create_collection(&conversion.target_schema(), false)
        .await
        .unwrap();
    target
        .upsert(vec![document(0)])
        .await
        .unwrap();

    let result = Validator::new(source, target, conversion)
        .compare(30)
        .await
        .unwrap();
    assert!(!result.count_match);
    assert!(result.field_count_match);
    assert_eq!(result.mismatched_keys().len(), 29);
}

#[tokio::test]
async fn test_dry_run_leaves_target_and_checkpoint_untouched() {
    let dir = TempDir::new().unwrap();
    let target_dir = dir.path().join("collection");
    let target = Arc::new(MemoryTarget::open(&target_dir, "products").unwrap());
    let store = Arc::new(FileCheckpointStore::new(dir.path().join("checkpoints")));

    let result = migrator(source(120), target.clone(), store.clone(), 50)
        .dry_run(true)
        .run()
        .await
        .unwrap();

    assert_eq!(result.status, "dry_run");
    assert_eq!(result.batches, 3);
    assert_eq!(result.processed_count, 120);
    assert_eq!(result.indexes_built, 0);
    assert_eq!(target.upsert_calls(), 0);
    assert!(target.describe_collection().await.unwrap().is_none());
    assert!(!target_dir.exists());
    assert!(store.load(&key()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_changed_schema_rejects_stale_checkpoint() {
    let dir = TempDir::new().unwrap();
    let source = source(40);
    let target = Arc::new(MemoryTarget::new("products"));
    let store = Arc::new(FileCheckpointStore::new(dir.path()));
    migrator(source.clone(), target.clone(), store.clone(), 10)
        .run()
        .await
        .unwrap();

    let changed = convert(
        &schema(),
        &ConversionOptions {
            varchar_max_length: 512,
            ..Default::default()
        },
    )
    .unwrap();
    assert_ne!(changed.fingerprint, conversion().fingerprint);

    let err = BatchMigrator::new(
        source.clone(),
        target.clone(),
        store.clone(),
        changed.clone(),
        options(10),
    )
    .run()
    .await
    .unwrap_err();
    assert!(matches!(err, MigrateError::StaleCheckpoint { .. }));
    assert_eq!(err.exit_code(), 4);

    // Recreating the collection starts over under the new fingerprint.
    let result = BatchMigrator::new(source, target.clone(), store.clone(), changed.clone(), options(10))
        .drop_existing(true)
        .run()
        .await
        .unwrap();
    assert!(!result.resumed);
    assert_eq!(result.processed_count, 40);
    assert_eq!(target.count().await.unwrap(), 40);
    let checkpoint = store.load(&key()).await.unwrap().unwrap();
    assert_eq!(checkpoint.schema_fingerprint, changed.fingerprint);
}

#[tokio::test]
async fn test_fresh_start_reprocesses_everything() {
    let dir = TempDir::new().unwrap();
    let source = source(40);
    let target = Arc::new(MemoryTarget::new("products"));
    let store = Arc::new(FileCheckpointStore::new(dir.path()));
    migrator(source.clone(), target.clone(), store.clone(), 10)
        .run()
        .await
        .unwrap();

    let result = migrator(source, target.clone(), store, 10)
        .fresh_start(true)
        .run()
        .await
        .unwrap();
    assert!(!result.resumed);
    assert_eq!(result.batches, 4);
    assert_eq!(target.count().await.unwrap(), 40);
}

#[tokio::test]
async fn test_concurrent_run_is_locked_out() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileCheckpointStore::new(dir.path()));
    let _held = store.lock(&key()).await.unwrap();

    let target = Arc::new(MemoryTarget::new("products"));
    let err = migrator(source(10), target.clone(), store.clone(), 10)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::CheckpointLocked(_)));
    assert_eq!(target.upsert_calls(), 0);
    assert!(store.load(&key()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_run_that_lost_its_lock_leaves_new_owner_checkpoint() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileCheckpointStore::new(dir.path()));
    let target = Arc::new(MemoryTarget::new("products"));
    let source = Arc::new(TakeoverSource {
        inner: source(50),
        store: FileCheckpointStore::new(dir.path()),
        on_page: 3,
        pages: AtomicU64::new(0),
    });

    let err = migrator(source, target.clone(), store.clone(), 10)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::CheckpointLocked(_)), "{err}");
    assert_eq!(err.exit_code(), 4);
    // the batch loaded after the takeover is never committed
    assert_eq!(target.upsert_calls(), 3);

    let checkpoint = store.load(&key()).await.unwrap().unwrap();
    assert_eq!(checkpoint.run_id, "other-run");
    assert_eq!(checkpoint.status, RunStatus::Running);
    assert_eq!(checkpoint.batches_committed, 0);

    // and its lock file outlives the run that lost it
    let lock = std::fs::read_to_string(store.lock_path_for(&key())).unwrap();
    assert!(lock.contains("other-run"));
}

#[tokio::test]
async fn test_slow_batch_keeps_lock_from_going_stale() {
    let dir = TempDir::new().unwrap();
    let stale_after = Duration::from_millis(400);
    let store = Arc::new(FileCheckpointStore::new(dir.path()).with_stale_lock_after(stale_after));
    let target = Arc::new(MemoryTarget::new("products"));
    let slow = Arc::new(SlowTarget {
        inner: target.clone(),
        delay: stale_after * 3,
    });

    let contender = async {
        tokio::time::sleep(stale_after * 2).await;
        store.lock(&key()).await.map(|_| ())
    };
    let (result, contender) = tokio::join!(
        migrator(source(10), slow, store.clone(), 10).run(),
        contender
    );

    assert!(matches!(contender, Err(MigrateError::CheckpointLocked(_))));
    let result = result.unwrap();
    assert_eq!(result.success_count, 10);
    assert_eq!(target.count().await.unwrap(), 10);
}

#[tokio::test]
async fn test_cancelled_run_records_status_and_resumes() {
    let dir = TempDir::new().unwrap();
    let source = source(30);
    let target = Arc::new(MemoryTarget::new("products"));
    let store = Arc::new(FileCheckpointStore::new(dir.path()));

    let token = CancellationToken::new();
    token.cancel();
    let err = migrator(source.clone(), target.clone(), store.clone(), 10)
        .with_cancel(token)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::Cancelled));
    assert_eq!(err.exit_code(), 130);

    let checkpoint = store.load(&key()).await.unwrap().unwrap();
    assert_eq!(checkpoint.status, RunStatus::Cancelled);
    assert_eq!(checkpoint.batches_committed, 0);

    let result = migrator(source, target.clone(), store, 10)
        .run()
        .await
        .unwrap();
    assert_eq!(result.processed_count, 30);
    assert_eq!(target.count().await.unwrap(), 30);
}

#[tokio::test]
async fn test_untransformable_documents_are_counted_not_fatal() {
    let dir = TempDir::new().unwrap();
    let mut docs: Vec<RawDocument> = (0..20).map(document).collect();
    docs[5].insert("vec".into(), json!([1.0, 2.0]));
    let source = Arc::new(MemorySource::new(schema(), docs).unwrap());
    let target = Arc::new(MemoryTarget::new("products"));

    let result = migrator(
        source,
        target.clone(),
        Arc::new(FileCheckpointStore::new(dir.path())),
        10,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(result.processed_count, 20);
    assert_eq!(result.success_count, 19);
    assert_eq!(result.failure_count, 1);
    assert_eq!(result.transform_failures[0].key, "doc-0005");
    assert_eq!(result.transform_failures[0].field, "vec");
    assert_eq!(target.count().await.unwrap(), 19);
}

#[tokio::test]
async fn test_overlong_keys_are_failures_not_merged() {
    let dir = TempDir::new().unwrap();
    let mut opts = ConversionOptions::default();
    opts.field_overrides.insert(
        "id".into(),
        FieldOverride {
            max_length: Some(6),
            ..Default::default()
        },
    );
    let conversion = convert(&schema(), &opts).unwrap();

    // "doc-0000" .. "doc-0009" all share the six-byte prefix "doc-00"
    let target = Arc::new(MemoryTarget::new("products"));
    let result = BatchMigrator::new(
        source(10),
        target.clone(),
        Arc::new(FileCheckpointStore::new(dir.path())),
        conversion,
        options(5),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(result.processed_count, 10);
    assert_eq!(result.success_count, 0);
    assert_eq!(result.failure_count, 10);
    assert_eq!(result.truncated_values, 0);
    assert!(result.transform_failures.iter().all(|f| f.field == "id"));
    assert_eq!(target.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_rejected_documents_are_counted() {
    let dir = TempDir::new().unwrap();
    let target = Arc::new(MemoryTarget::new("products"));
    target.reject_keys(["doc-0003".to_string()]).await;

    let result = migrator(
        source(10),
        target.clone(),
        Arc::new(FileCheckpointStore::new(dir.path())),
        10,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(result.success_count, 9);
    assert_eq!(result.failure_count, 1);
    assert_eq!(result.rejected[0].key, "doc-0003");
}

#[tokio::test]
async fn test_progress_reported_per_batch() {
    let dir = TempDir::new().unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::channel(16);

    migrator(
        source(35),
        Arc::new(MemoryTarget::new("products")),
        Arc::new(FileCheckpointStore::new(dir.path())),
        10,
    )
    .with_progress(tx)
    .run()
    .await
    .unwrap();

    let mut updates = Vec::new();
    while let Some(update) = rx.recv().await {
        updates.push(update);
    }
    assert_eq!(updates.len(), 4);
    assert_eq!(updates[3].processed, 35);
    assert_eq!(updates[3].total, Some(35));
}
