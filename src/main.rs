use std::path::PathBuf;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};

use depwatch::config::{self, MonitorConfig};
use depwatch::engine::{BatchSummary, CheckResult, Monitor, MonitorOptions};
use depwatch::logging::init_logging;
use depwatch::model::{AccessMethod, CheckFrequency, DependencyRecord};
use depwatch::notify::{LoggingNotifier, notify_changes};
use depwatch::store::{ManifestStore, SqliteStore, persist_results};

#[derive(Parser)]
#[command(name = "depwatch")]
#[command(version, about = "Detects and classifies changes in external dependencies")]
struct Cli {
    /// Path to the manifest database
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Path to the JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to a file in the data directory instead of stderr
    #[arg(long, global = true)]
    log_to_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check all due dependencies and write back their state
    Check {
        /// Check enabled dependencies even when they are not due
        #[arg(long)]
        force: bool,

        /// Print the batch summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add or replace a tracked dependency
    Add {
        #[arg(long)]
        id: String,

        #[arg(long)]
        url: String,

        /// repository-api, http-content, api-spec or docs-api
        #[arg(long)]
        method: String,

        /// hourly, daily, weekly or monthly
        #[arg(long)]
        frequency: Option<String>,

        #[arg(long)]
        name: Option<String>,
    },
    /// List tracked dependencies
    List,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(config::config_path);
    let mut config = MonitorConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    if cli.log_to_file && config.log.file.is_none() {
        config.log.file = Some(config::log_path());
    }
    if let Some(dir) = config.log.file.as_ref().and_then(|f| f.parent()) {
        std::fs::create_dir_all(dir)?;
    }
    let _guard = init_logging(&config.log).map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    let db_path = cli.db.clone().unwrap_or_else(config::db_path);
    if let Some(dir) = db_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let store = SqliteStore::new(&db_path)?;

    match cli.command {
        Command::Check { force, json } => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(run_check(&store, &config, force, json)),
        Command::Add {
            id,
            url,
            method,
            frequency,
            name,
        } => run_add(&store, &config, id, url, &method, frequency.as_deref(), name),
        Command::List => run_list(&store),
    }
}

async fn run_check(
    store: &SqliteStore,
    config: &MonitorConfig,
    force: bool,
    json: bool,
) -> anyhow::Result<()> {
    let mut records = store.load_records()?;
    for record in &mut records {
        config.apply_overrides(record);
    }

    let monitor = Monitor::from_config(config)
        .with_options(MonitorOptions::from_config(config).with_force(force));
    let results = monitor.check_all(&records).await;

    persist_results(store, &results)?;

    notify_changes(&LoggingNotifier, &results).await;

    let summary = BatchSummary::from_results(&results);
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_results(&results, &summary);
    }

    Ok(())
}

fn print_results(results: &[CheckResult], summary: &BatchSummary) {
    for result in results {
        let status = if let Some(reason) = result.skip_reason() {
            format!("skipped ({})", reason.as_str())
        } else if let Some(error) = result.error() {
            format!("error: {}", error)
        } else if let Some(severity) = result.severity() {
            let labels: Vec<_> = result.change_labels().iter().map(|c| c.as_str()).collect();
            format!("changed [{}] {}", severity.as_str(), labels.join(", "))
        } else {
            "unchanged".to_string()
        };
        println!("{}\t{}", result.dependency.id, status);
    }

    println!(
        "\n{} total, {} checked, {} changed, {} skipped, {} errors, {} rate limit warnings",
        summary.total,
        summary.checked,
        summary.changed,
        summary.skipped,
        summary.errors,
        summary.rate_limit_warnings
    );
}

fn run_add(
    store: &SqliteStore,
    config: &MonitorConfig,
    id: String,
    url: String,
    method: &str,
    frequency: Option<&str>,
    name: Option<String>,
) -> anyhow::Result<()> {
    let access_method: AccessMethod = method
        .parse()
        .map_err(|_| anyhow!("Unknown access method: {}", method))?;

    let mut monitoring = config.effective_monitoring(&url);
    if let Some(frequency) = frequency {
        monitoring.check_frequency = frequency
            .parse::<CheckFrequency>()
            .map_err(|_| anyhow!("Unknown check frequency: {}", frequency))?;
    }

    let existing = store.get_record(&id)?;
    let mut record = DependencyRecord::new(id, url, access_method).with_monitoring(monitoring);
    record.name = name;

    // Keep the baseline when the source itself did not move
    if let Some(existing) = existing
        && existing.url == record.url
        && existing.access_method == record.access_method
    {
        record.current_state_hash = existing.current_state_hash;
        record.current_version = existing.current_version;
        record.state_metadata = existing.state_metadata;
        record.last_checked = existing.last_checked;
    }

    store.upsert_record(&record)?;
    println!("Tracking {} ({})", record.id, record.access_method.as_str());
    Ok(())
}

fn run_list(store: &SqliteStore) -> anyhow::Result<()> {
    for record in store.load_records()? {
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            record.id,
            record.access_method.as_str(),
            if record.monitoring.enabled {
                record.monitoring.check_frequency.as_str()
            } else {
                "disabled"
            },
            record.current_version.as_deref().unwrap_or("-"),
            record
                .last_checked
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string()),
            record.url
        );
    }
    Ok(())
}
