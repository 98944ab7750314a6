use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use eligibility_sync::auth::AllowAll;
use eligibility_sync::config::{init_tracing, ImportConfig};
use eligibility_sync::report::{ErrorReporter, ErrorTracker, ImportReport, MemoryErrorTracker, TracingErrorTracker};
use eligibility_sync::{
    CriteriaCopy, ImportRequest, ImportService, LocalObjectStore, OpportunityType, RecordType,
    RecordTypeRegistry, SqliteConnector, SqliteStore, StateCode, Store,
};

#[derive(Parser)]
#[command(name = "eligibility-sync", version, about = "Eligibility record import and requirement tools")]
struct Cli {
    /// SQLite database (or set SYNC_DATABASE_PATH)
    #[arg(long, global = true, value_name = "PATH")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import one snapshot from a local bucket directory
    Import {
        /// Bucket name, a directory under SYNC_BUCKET_ROOT
        #[arg(long)]
        bucket: String,
        /// Object path, e.g. US_ID/sentencing_case_record.json
        #[arg(long)]
        object: String,
        /// Bucket root (default: SYNC_BUCKET_ROOT)
        #[arg(long, value_name = "DIR")]
        bucket_root: Option<PathBuf>,
    },
    /// Print derived requirements for one referral record
    Requirements {
        /// State the opportunity belongs to
        #[arg(long)]
        state: String,
        /// Opportunity id, e.g. earnedDischarge
        #[arg(long)]
        opportunity: String,
        /// JSON file holding one raw referral record
        #[arg(long, value_name = "PATH")]
        file: PathBuf,
        /// Reference date for time-remaining copy (default: today)
        #[arg(long)]
        today: Option<NaiveDate>,
        /// JSON copy table overriding the built-in one
        #[arg(long, value_name = "PATH")]
        copy: Option<PathBuf>,
    },
    /// List stored rows of one record type
    Records {
        #[arg(long)]
        state: String,
        /// e.g. case, offense, referral:usMeSCCP
        #[arg(long = "type")]
        record_type: String,
    },
}

/// Reports go to the log and are kept for the summary.
struct CliTracker {
    memory: MemoryErrorTracker,
}

impl ErrorTracker for CliTracker {
    fn capture(&self, report: &ImportReport) {
        TracingErrorTracker.capture(report);
        self.memory.capture(report);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = ImportConfig::from_env()?;
    init_tracing(config.log_json);
    if let Some(database) = cli.database {
        config.database_path = database;
    }

    match cli.command {
        Commands::Import {
            bucket,
            object,
            bucket_root,
        } => {
            if let Some(root) = bucket_root {
                config.bucket_root = root;
            }
            run_import(&config, bucket, object)
        }
        Commands::Requirements {
            state,
            opportunity,
            file,
            today,
            copy,
        } => run_requirements(&state, &opportunity, &file, today, copy),
        Commands::Records { state, record_type } => run_records(&config, &state, &record_type),
    }
}

fn run_import(config: &ImportConfig, bucket: String, object: String) -> Result<()> {
    println!("📥 Import: {}/{}", bucket, object);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let connector = SqliteConnector::file(&config.database_path)
        .with_context(|| format!("Failed to open database {:?}", config.database_path))?
        .with_actor("cli");
    let memory = MemoryErrorTracker::new();
    let service = ImportService::new(
        Arc::new(RecordTypeRegistry::builtin().context("Failed to build record types")?),
        Arc::new(connector),
        Arc::new(LocalObjectStore::new(&config.bucket_root)),
        Arc::new(AllowAll),
        Arc::new(CliTracker { memory: memory.clone() }),
    )
    .with_options(config.sync_options())
    .with_reporter(ErrorReporter::new(config.report_examples));

    let outcome = service.handle(None, &ImportRequest::new(bucket, object));

    if let Some(job) = &outcome.job {
        println!("✓ Rows read:  {}", job.rows_read);
        println!("✓ Inserted:   {}", job.inserted);
        println!("✓ Updated:    {}", job.updated);
        println!("✓ Deleted:    {}", job.deleted);
        println!("✓ Skipped:    {}", job.skipped);
    }
    for report in memory.reports() {
        println!("\n⚠️  {}", report.message);
        for example in &report.examples {
            println!("   - {}", example);
        }
    }

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if outcome.status != 200 {
        bail!("import failed ({}): {}", outcome.status, outcome.message);
    }
    println!("✅ {}", outcome.message);
    Ok(())
}

fn run_requirements(
    state: &str,
    opportunity: &str,
    file: &Path,
    today: Option<NaiveDate>,
    copy: Option<PathBuf>,
) -> Result<()> {
    let state: StateCode = state.parse().map_err(anyhow::Error::msg)?;
    let opportunity: OpportunityType = opportunity.parse().map_err(anyhow::Error::msg)?;
    if opportunity.state_code() != state {
        bail!("{} is not offered in {}", opportunity, state);
    }

    let mut config = opportunity.config()?;
    if let Some(path) = copy {
        config = config.with_copy_overrides(CriteriaCopy::from_file(&path)?);
    }

    let content = std::fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?;
    let raw: serde_json::Value = serde_json::from_str(&content).context("Record file is not valid JSON")?;
    let raw = raw.as_object().context("Record file must hold a JSON object")?;
    let record = config.parse(raw).map_err(|e| anyhow::anyhow!("record rejected: {}", e))?;

    let today = today.unwrap_or_else(|| chrono::Local::now().date_naive());
    let summary = config.summarize(&record, today);

    println!("🎯 {} ({})", config.label, state);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for requirement in &summary.requirements_met {
        if requirement.is_heading {
            println!("\n{}", requirement.text);
        } else {
            println!("  ✓ {}", requirement.text);
        }
    }
    if !summary.requirements_almost_met.is_empty() {
        println!("\nAlmost met:");
        for requirement in &summary.requirements_almost_met {
            println!("  … {}", requirement.text);
        }
    }
    if let Some(date) = summary.eligibility_date {
        println!("\nEligible from {}", date);
    }
    println!("\nDenial reasons:");
    for (code, text) in &summary.denial_reasons {
        println!("  {}: {}", code, text);
    }
    Ok(())
}

fn run_records(config: &ImportConfig, state: &str, record_type: &str) -> Result<()> {
    let state: StateCode = state.parse().map_err(anyhow::Error::msg)?;
    let record_type: RecordType = record_type.parse().map_err(anyhow::Error::msg)?;
    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("Failed to open database {:?}", config.database_path))?;

    let records = store.find_many(record_type, state)?;
    println!("📊 {} {} rows in {}", records.len(), record_type, state);
    for record in records {
        println!("{}", serde_json::to_string(&record.fields)?);
    }
    Ok(())
}
