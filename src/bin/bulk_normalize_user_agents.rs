use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use metrics_enrich::enrich::bots::BotSignatures;
use metrics_enrich::enrich::domain::{normalize_domain, normalize_referrer};
use metrics_enrich::enrich::user_agent::UserAgentProvider;
use metrics_enrich::logging;
use metrics_enrich::pipeline::{run_pipeline, EnrichmentPlan, Normalized, RunOptions};
use metrics_enrich::util::env as env_util;

/// Tables processed when no --table override is given.
const DEFAULT_TABLES: [&str; 2] = ["metrics_page_views", "metrics_events"];

/// Bulk user-agent normalization: export candidate rows, classify them
/// offline (bot detection, browser/OS/device parsing, referrer and domain
/// normalization), stage the results and apply one set-based merge per
/// table.
#[derive(Parser, Debug)]
#[command(
    name = "bulk_normalize_user_agents",
    version,
    about = "Bulk user-agent/referrer/domain normalization for analytics records"
)]
struct Cli {
    /// Limit number of records to process per table (for testing)
    #[arg(long)]
    limit: Option<i64>,

    /// Process but do not update the database
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Reprocess ALL records with raw values (not just unprocessed ones)
    #[arg(long, default_value_t = false)]
    force: bool,

    /// Process a single table instead of the default set
    #[arg(long)]
    table: Option<String>,

    /// Default the log filter to debug instead of info
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_util::init_env();
    logging::init_tracing(if cli.verbose { "debug" } else { "info" })?;

    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted");
            std::process::exit(130);
        }
    });

    if cli.dry_run {
        info!("dry-run mode: no database changes will be made");
    }
    if cli.force {
        info!("force mode: reprocessing all records with raw values");
    }

    let resource_dir = env_util::env_opt("ENRICH_RESOURCE_DIR")
        .unwrap_or_else(|| "resources".to_string());
    let provider = UserAgentProvider::new(BotSignatures::load(Path::new(&resource_dir)));
    let database_url = env_util::db_url()?;

    let opts = RunOptions {
        limit: cli.limit,
        dry_run: cli.dry_run,
        force: cli.force,
        ..RunOptions::default()
    };

    let tables: Vec<String> = match &cli.table {
        Some(t) => vec![t.clone()],
        None => DEFAULT_TABLES.iter().map(|t| t.to_string()).collect(),
    };

    let started = Instant::now();
    let mut total_processed = 0usize;
    let mut total_bots = 0usize;
    for table in &tables {
        let report = run_pipeline(
            &database_url,
            EnrichmentPlan::user_agent(table),
            &opts,
            |cand| classify_row(&provider, cand),
        )
        .await?;
        total_processed += report.candidates;
        total_bots += report.bots;
    }

    info!(
        tables = tables.len(),
        total_processed,
        total_bots,
        elapsed_s = format!("{:.1}", started.elapsed().as_secs_f64()),
        "overall summary"
    );
    Ok(())
}

/// Map one candidate row to its normalized result. Referrer/domain columns
/// are only present when the target table carries them, so their keys are
/// checked rather than assumed.
fn classify_row(
    provider: &UserAgentProvider,
    cand: &metrics_enrich::pipeline::Candidate,
) -> Normalized {
    let profile = cand
        .raw_value("user_agent")
        .map(|ua| provider.classify(ua))
        .unwrap_or_default();

    let mut derived: BTreeMap<&'static str, Option<String>> = BTreeMap::new();
    derived.insert("browser_normalized", profile.browser);
    derived.insert("os_normalized", profile.os);
    derived.insert("device_normalized", profile.device);
    if cand.raw.contains_key("referrer") {
        derived.insert(
            "referrer_normalized",
            cand.raw_value("referrer").and_then(normalize_referrer),
        );
    }
    if cand.raw.contains_key("domain") {
        derived.insert(
            "domain_normalized",
            cand.raw_value("domain").and_then(normalize_domain),
        );
    }

    Normalized {
        id: cand.id,
        derived,
        is_bot: Some(profile.is_bot),
    }
}
