use std::collections::BTreeMap;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use metrics_enrich::enrich::geo::{GeoProvider, UNKNOWN_COUNTRY};
use metrics_enrich::logging;
use metrics_enrich::pipeline::{run_pipeline, EnrichmentPlan, Normalized, RunOptions};
use metrics_enrich::util::env as env_util;

/// Bulk IP geolocation: export candidate rows, resolve country codes
/// offline against GeoLite2, stage the results and apply one set-based
/// merge. Orders of magnitude faster than row-by-row updates.
#[derive(Parser, Debug)]
#[command(
    name = "bulk_ip_geolocation",
    version,
    about = "Bulk IP geolocation for analytics records"
)]
struct Cli {
    /// Limit number of records to process (for testing)
    #[arg(long)]
    limit: Option<i64>,

    /// Process but do not update the database
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Reprocess ALL records with an IP (not just missing countries)
    #[arg(long, default_value_t = false)]
    force: bool,

    /// Progress report interval in records
    #[arg(long, default_value_t = 10_000)]
    batch_size: usize,

    /// Target table
    #[arg(long, default_value = "metrics_page_views")]
    table: String,

    /// Default the log filter to debug instead of info
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_util::init_env();
    logging::init_tracing(if cli.verbose { "debug" } else { "info" })?;

    // Conventional exit code for interrupted jobs. Nothing before the merge
    // mutates the live table and the merge is one transaction, so exiting
    // here cannot tear state.
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
        info!("force mode: reprocessing all records with an IP");
    }

    let geo = GeoProvider::open(&GeoProvider::db_path())?;
    let database_url = env_util::db_url()?;

    let opts = RunOptions {
        limit: cli.limit,
        dry_run: cli.dry_run,
        force: cli.force,
        batch_size: cli.batch_size,
    };

    let mut unknown = 0usize;
    let report = run_pipeline(
        &database_url,
        EnrichmentPlan::geolocation(&cli.table),
        &opts,
        |cand| {
            let country = geo.staged_country(cand.raw_value("ip"));
            if country == UNKNOWN_COUNTRY {
                unknown += 1;
            }
            let mut derived = BTreeMap::new();
            derived.insert("country", Some(country));
            Normalized {
                id: cand.id,
                derived,
                is_bot: None,
            }
        },
    )
    .await?;

    info!(
        processed = report.candidates,
        unknown_countries = unknown,
        "geolocation tallies"
    );
    Ok(())
}
