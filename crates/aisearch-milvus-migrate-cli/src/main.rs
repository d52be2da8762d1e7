//! aisearch-milvus-migrate CLI - Azure AI Search to Milvus migration.

use aisearch_milvus_migrate::convert::ConversionOptions;
use aisearch_milvus_migrate::drivers::load_index_definition;
use aisearch_milvus_migrate::typemap::all_mappings;
use aisearch_milvus_migrate::{
    convert, AssessmentReport, BatchMigrator, CheckpointKey, CheckpointStore, Config,
    FileCheckpointStore, MemorySource, MemoryTarget, MigrateError, MigratorOptions,
    NoOpCheckpointStore, ProgressUpdate, SchemaConversionResult, SourceReader, Validator,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Exit code when validation completes with a FAIL verdict.
const EXIT_VALIDATION_FAILED: u8 = 6;

#[derive(Parser)]
#[command(name = "aisearch-milvus-migrate")]
#[command(about = "Migrate an Azure AI Search index into a Milvus collection")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml", env = "AISEARCH_MIGRATE_CONFIG")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info", env = "AISEARCH_MIGRATE_VERBOSITY")]
    verbosity: String,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert the index definition and print the collection schema
    Schema {
        /// Read the index definition from this file instead of the config
        #[arg(long)]
        from_json: Option<PathBuf>,

        /// Also write the conversion result to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Report how faithfully the index can be migrated
    Assess {
        /// Also write the report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Migrate documents, resuming from the last checkpoint
    Migrate {
        /// Extract and transform only; write nothing
        #[arg(long)]
        dry_run: bool,

        /// Drop and recreate the target collection
        #[arg(long)]
        drop_existing: bool,

        /// Ignore any existing checkpoint
        #[arg(long)]
        fresh: bool,

        /// Override documents per batch
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Compare the target collection against the source index
    Validate {
        /// Override number of documents sampled
        #[arg(long)]
        sample_size: Option<usize>,

        /// Seed for reproducible sampling
        #[arg(long)]
        seed: Option<u64>,

        /// Also write the result to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Remove the checkpoint for the configured source and target
    Reset,

    /// Print the type mapping table
    TypeMap,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    match cli.command {
        Commands::TypeMap => {
            print_type_map(cli.output_json)?;
        }

        Commands::Schema { from_json, output } => {
            let (schema, options) = match from_json {
                Some(path) => {
                    // The config is optional here; it only contributes overrides.
                    let options = if cli.config.exists() {
                        Config::load(&cli.config)?.conversion_options()
                    } else {
                        ConversionOptions::default()
                    };
                    (load_index_definition(&path)?, options)
                }
                None => {
                    let config = Config::load(&cli.config)?;
                    (
                        load_index_definition(&config.source.index_definition)?,
                        config.conversion_options(),
                    )
                }
            };
            let conversion = convert(&schema, &options)?;

            if let Some(path) = output {
                write_report(&path, &conversion.to_json()?)?;
            }
            if cli.output_json {
                println!("{}", conversion.to_json()?);
            } else {
                print_conversion(&conversion);
            }
        }

        Commands::Assess { output } => {
            let config = Config::load(&cli.config)?;
            let source = open_source(&config)?;
            let conversion = convert(&source.list_schema().await?, &config.conversion_options())?;
            let report = AssessmentReport::from_conversion(&conversion, Some(source.count().await?));

            if let Some(path) = output {
                write_report(&path, &report.to_json()?)?;
            }
            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                print_assessment(&report);
            }
        }

        Commands::Migrate {
            dry_run,
            drop_existing,
            fresh,
            batch_size,
        } => {
            let mut config = Config::load(&cli.config)?.with_auto_tuning();
            info!("Loaded configuration from {:?}", cli.config);
            if let Some(size) = batch_size {
                if size == 0 {
                    return Err(MigrateError::Config("--batch-size must be at least 1".into()));
                }
                config.migration.batch_size = size;
            }

            let cancel_token = setup_signal_handler();

            let source = open_source(&config)?;
            let conversion = convert(&source.list_schema().await?, &config.conversion_options())?;
            let target = MemoryTarget::open(&config.target.path, conversion.collection.clone())?;
            let store: Arc<dyn CheckpointStore> = if dry_run {
                Arc::new(NoOpCheckpointStore::new())
            } else {
                Arc::new(open_store(&config))
            };

            let mut migrator = BatchMigrator::new(
                Arc::new(source),
                Arc::new(target),
                store,
                conversion,
                MigratorOptions::from_config(&config.migration),
            )
            .with_cancel(cancel_token)
            .dry_run(dry_run)
            .fresh_start(fresh);
            if drop_existing {
                migrator = migrator.drop_existing(true);
            }

            let printer = if cli.progress {
                let (tx, rx) = mpsc::channel(64);
                migrator = migrator.with_progress(tx);
                Some(tokio::spawn(print_progress(rx)))
            } else {
                None
            };

            let result = migrator.run().await;
            if let Some(printer) = printer {
                // The sender was dropped with the migrator, so this finishes.
                let _ = printer.await;
            }
            let result = result?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                let status_msg = if dry_run { "Dry run completed!" } else { "Migration completed!" };
                println!("\n{}", status_msg);
                println!("  Run ID: {}", result.run_id);
                println!("  Collection: {}", result.collection);
                println!("  Duration: {:.2}s", result.duration_seconds);
                if result.resumed {
                    println!("  Resumed from checkpoint");
                }
                println!("  Batches: {}", result.batches);
                println!(
                    "  Documents: {} processed, {} succeeded, {} failed",
                    result.processed_count, result.success_count, result.failure_count
                );
                println!("  Throughput: {:.0} docs/sec", result.documents_per_second);
                println!("  Indexes built: {}", result.indexes_built);
                if result.truncated_values > 0 {
                    println!("  Truncated values: {}", result.truncated_values);
                }
                for failure in result.transform_failures.iter().take(10) {
                    println!("  Failed {} ({}): {}", failure.key, failure.field, failure.reason);
                }
                for rejected in result.rejected.iter().take(10) {
                    println!("  Rejected {}: {}", rejected.key, rejected.reason);
                }
            }
        }

        Commands::Validate {
            sample_size,
            seed,
            output,
        } => {
            let config = Config::load(&cli.config)?;
            let source = open_source(&config)?;
            let conversion = convert(&source.list_schema().await?, &config.conversion_options())?;
            let target = MemoryTarget::open(&config.target.path, conversion.collection.clone())?;

            let validator = Validator::new(Arc::new(source), Arc::new(target), conversion)
                .with_tolerance(config.validation.float_tolerance)
                .with_seed(seed.or(config.validation.seed))
                .with_retry(config.migration.retry_policy());
            let result = validator
                .compare(sample_size.unwrap_or(config.validation.sample_size))
                .await?;

            if let Some(path) = output {
                write_report(&path, &result.to_json()?)?;
            }
            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("Validation: {}", result.overall);
                println!(
                    "  Documents: source={} target={}{}",
                    result.source_count,
                    result.target_count,
                    if result.count_match { "" } else { " (MISMATCH)" }
                );
                println!(
                    "  Fields: expected={} actual={}{}",
                    result.expected_field_count,
                    result.actual_field_count,
                    if result.field_count_match { "" } else { " (MISMATCH)" }
                );
                println!(
                    "  Sampled: {} documents, {} with mismatches",
                    result.sampled_keys.len(),
                    result.mismatched_keys().len()
                );
                for m in result.sample_mismatches.iter().take(20) {
                    println!(
                        "    {} {}: expected {} got {}",
                        m.key, m.field, m.expected, m.actual
                    );
                }
                for check in result.dimension_checks.iter().filter(|c| !c.passed) {
                    println!(
                        "  Vector {}: expected dim {}, declared {:?}, {} of {} bad",
                        check.field, check.expected, check.declared, check.mismatched, check.checked
                    );
                }
            }

            if !result.passed() {
                return Ok(ExitCode::from(EXIT_VALIDATION_FAILED));
            }
        }

        Commands::Reset => {
            let config = Config::load(&cli.config)?;
            let schema = load_index_definition(&config.source.index_definition)?;
            let conversion = convert(&schema, &config.conversion_options())?;
            let store = open_store(&config);
            let key = CheckpointKey::new(&schema.name, &conversion.collection);

            // Holding the lock keeps a running migration's checkpoint in place.
            let _lease = store.lock(&key).await?;
            store.clear(&key).await?;
            println!("Checkpoint cleared for {}", key);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn open_source(config: &Config) -> Result<MemorySource, MigrateError> {
    MemorySource::from_export(&config.source.index_definition, &config.source.documents)
}

fn open_store(config: &Config) -> FileCheckpointStore {
    FileCheckpointStore::new(&config.migration.checkpoint_dir)
        .with_stale_lock_after(config.migration.stale_lock_after())
}

fn write_report(path: &Path, json: &str) -> Result<(), MigrateError> {
    std::fs::write(path, json)?;
    info!("Wrote {}", path.display());
    Ok(())
}

async fn print_progress(mut rx: mpsc::Receiver<ProgressUpdate>) {
    while let Some(update) = rx.recv().await {
        match serde_json::to_string(&update) {
            Ok(line) => eprintln!("{}", line),
            Err(e) => warn!("Cannot serialize progress update: {}", e),
        }
    }
}

fn print_conversion(conversion: &SchemaConversionResult) {
    println!(
        "Collection {} from index {} ({})",
        conversion.collection, conversion.source_index, conversion.assessment
    );
    for field in &conversion.fields {
        let mut extra = Vec::new();
        if field.is_primary {
            extra.push("primary".to_string());
        }
        if field.is_partition_key {
            extra.push("partition key".to_string());
        }
        if let Some(dim) = field.dim {
            extra.push(format!("dim={}", dim));
        }
        if let Some(len) = field.max_length {
            extra.push(format!("max_length={}", len));
        }
        println!(
            "  {:<24} {:<16} <- {} {} [{}]{}",
            field.name,
            field.data_type,
            field.source_name,
            field.source_type,
            field.confidence,
            if extra.is_empty() {
                String::new()
            } else {
                format!(" ({})", extra.join(", "))
            }
        );
    }
    for index in &conversion.indexes {
        println!(
            "  index on {}: {} {}",
            index.field, index.index_type, index.metric_type
        );
    }
    for name in &conversion.skipped_fields {
        println!("  skipped {}", name);
    }
    for warning in &conversion.warnings {
        println!("  warning: {}", warning.message);
    }
    println!("  fingerprint: {}", conversion.fingerprint);
}

fn print_assessment(report: &AssessmentReport) {
    println!("Assessment: {}", report.assessment);
    println!("  Index: {} -> collection {}", report.index_name, report.collection);
    if let Some(count) = report.document_count {
        println!("  Documents: {}", count);
    }
    println!(
        "  Fields: {} total, {} converted ({} exact, {} lossy, {} semantic), {} skipped, {} vector",
        report.total_fields,
        report.converted_fields,
        report.exact_fields,
        report.lossy_fields,
        report.semantic_fields,
        report.skipped_fields,
        report.vector_fields
    );
    for feature in &report.unsupported_features {
        println!("  Unsupported: {}", feature);
    }
    for warning in &report.warnings {
        println!("  Warning: {}", warning.message);
    }
    if !report.applicable_advantages.is_empty() {
        println!("\nTarget capabilities this index could use:");
        for advantage in &report.applicable_advantages {
            println!("  - {}: {}", advantage.feature, advantage.description);
            if !advantage.index_types.is_empty() {
                println!("      index types: {}", advantage.index_types.join(", "));
            }
        }
    }
}

fn print_type_map(as_json: bool) -> Result<(), MigrateError> {
    let mappings = all_mappings();
    if as_json {
        let rows: Vec<serde_json::Value> = mappings
            .iter()
            .map(|(source, mapping)| {
                serde_json::json!({
                    "source": source.to_string(),
                    "mapping": mapping,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{:<34} {:<16} {:<10} NOTE", "SOURCE", "TARGET", "CONFIDENCE");
    for (source, mapping) in &mappings {
        let target = match mapping.element_type {
            Some(element) => format!("{}<{}>", mapping.target, element),
            None => mapping.target.to_string(),
        };
        println!(
            "{:<34} {:<16} {:<10} {}",
            source.to_string(),
            target,
            mapping.confidence.to_string(),
            mapping.note
        );
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so --output-json leaves stdout parseable.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Stopping after the current batch...", name);
                    token.cancel();
                });
            }
            Err(e) => warn!("Cannot install {} handler: {}", name, e),
        }
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping after the current batch...");
            token.cancel();
        }
    });

    cancel_token
}
