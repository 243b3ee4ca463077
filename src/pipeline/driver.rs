use std::fmt;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::db::Db;
use crate::error::{EnrichError, Result};
use crate::pipeline::extract::{extract_candidates, Candidate, Normalized};
use crate::pipeline::plan::EnrichmentPlan;
use crate::pipeline::stage::stage_and_merge;

/// Pipeline phases, in execution order. Logged so an aborted run shows how
/// far it got; everything before Merging is side-effect-free on the live
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validating,
    Extracting,
    Transforming,
    DryRunReport,
    Staging,
    Merging,
    Reporting,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Validating => "validating",
            Phase::Extracting => "extracting",
            Phase::Transforming => "transforming",
            Phase::DryRunReport => "dry-run-report",
            Phase::Staging => "staging",
            Phase::Merging => "merging",
            Phase::Reporting => "reporting",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub limit: Option<i64>,
    pub dry_run: bool,
    pub force: bool,
    /// Progress-report interval in records. Chunking is for reporting only;
    /// the merge is still a single statement.
    pub batch_size: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            limit: None,
            dry_run: false,
            force: false,
            batch_size: 10_000,
        }
    }
}

/// Outcome of one pipeline run against one table.
#[derive(Debug, Default)]
pub struct RunReport {
    pub candidates: usize,
    pub merged_rows: u64,
    pub bots: usize,
    pub elapsed: Duration,
    pub dry_run: bool,
}

impl RunReport {
    pub fn records_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.candidates as f64 / secs
        } else {
            0.0
        }
    }
}

/// Run the full pipeline: validate schema, extract candidates, release the
/// connection, transform offline, then (unless dry-run) stage and merge on a
/// fresh connection.
///
/// `classify` maps one candidate to its normalized result; it must return
/// the candidate's own id. It is infallible by design: providers degrade
/// per-record trouble to sentinel/null internally.
pub async fn run_pipeline<F>(
    database_url: &str,
    plan: EnrichmentPlan,
    opts: &RunOptions,
    mut classify: F,
) -> Result<RunReport>
where
    F: FnMut(&Candidate) -> Normalized,
{
    let started = Instant::now();
    let table = plan.table.clone();

    info!(phase = %Phase::Validating, table = %table, "starting enrichment run");
    let db = Db::connect(database_url, 2).await?;
    let columns = db.table_columns(&table).await?;
    let resolved = plan.resolve(&columns)?;
    info!(
        table = %table,
        projection = ?resolved.projection(),
        derived = ?resolved.derived_columns(),
        "schema resolved"
    );

    info!(phase = %Phase::Extracting, table = %table, limit = ?opts.limit, force = opts.force, "extracting");
    let candidates = extract_candidates(&db, &resolved, opts.force, opts.limit).await?;

    // The transform below may take minutes over large volumes; it must not
    // hold a server-side session, so the pool is released first.
    db.close().await;

    if candidates.is_empty() {
        info!(table = %table, "no records to process");
        return Ok(RunReport {
            elapsed: started.elapsed(),
            dry_run: opts.dry_run,
            ..RunReport::default()
        });
    }

    info!(phase = %Phase::Transforming, table = %table, total = candidates.len(), "transforming offline");
    let interval = opts.batch_size.max(1);
    let total = candidates.len();
    let mut results: Vec<Normalized> = Vec::with_capacity(total);
    let mut bots = 0usize;
    for candidate in &candidates {
        let normalized = classify(candidate);
        if normalized.id != candidate.id {
            return Err(EnrichError::Load(format!(
                "classifier returned id {} for candidate {}",
                normalized.id, candidate.id
            )));
        }
        if normalized.is_bot == Some(true) {
            bots += 1;
        }
        results.push(normalized);

        let done = results.len();
        if done % interval == 0 && done < total {
            let elapsed = started.elapsed().as_secs_f64();
            let progress = done as f64 / total as f64;
            let remaining_min = (elapsed / progress - elapsed) / 60.0;
            info!(
                table = %table,
                processed = done,
                total,
                pct = format!("{:.1}%", progress * 100.0),
                remaining_min = format!("{remaining_min:.1}"),
                "transform progress"
            );
        }
    }

    if opts.dry_run {
        info!(phase = %Phase::DryRunReport, table = %table, "dry run: skipping database update");
        for sample in results.iter().take(5) {
            let fields: Vec<String> = sample
                .derived
                .iter()
                .map(|(col, v)| format!("{col}={}", v.as_deref().unwrap_or("NULL")))
                .collect();
            info!(
                id = sample.id,
                is_bot = ?sample.is_bot,
                fields = fields.join(" "),
                "sample result"
            );
        }
        let report = RunReport {
            candidates: total,
            merged_rows: 0,
            bots,
            elapsed: started.elapsed(),
            dry_run: true,
        };
        report_summary(&table, &report);
        return Ok(report);
    }

    info!(phase = %Phase::Staging, table = %table, "reconnecting for update phase");
    let db = Db::connect(database_url, 2).await?;
    info!(phase = %Phase::Merging, table = %table, "applying bulk merge");
    let merge_started = Instant::now();
    let merged_rows = stage_and_merge(&db, &resolved, &results).await?;
    info!(
        table = %table,
        merged_rows,
        merge_s = format!("{:.1}", merge_started.elapsed().as_secs_f64()),
        "bulk merge committed"
    );
    if merged_rows as usize != results.len() {
        // Rows deleted between extract and merge leave staged orphans; that
        // is benign but worth surfacing.
        warn!(
            table = %table,
            staged = results.len(),
            merged_rows,
            "merge touched fewer rows than staged"
        );
    }
    db.close().await;

    let report = RunReport {
        candidates: total,
        merged_rows,
        bots,
        elapsed: started.elapsed(),
        dry_run: false,
    };
    report_summary(&table, &report);
    Ok(report)
}

fn report_summary(table: &str, report: &RunReport) {
    info!(
        phase = %Phase::Reporting,
        table = %table,
        processed = report.candidates,
        merged_rows = report.merged_rows,
        bots = report.bots,
        dry_run = report.dry_run,
        elapsed_s = format!("{:.1}", report.elapsed.as_secs_f64()),
        records_per_sec = format!("{:.0}", report.records_per_sec()),
        "run complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throughput_handles_zero_elapsed() {
        let report = RunReport::default();
        assert_eq!(report.records_per_sec(), 0.0);
    }

    #[test]
    fn throughput_is_candidates_over_elapsed() {
        let report = RunReport {
            candidates: 500,
            elapsed: Duration::from_secs(10),
            ..RunReport::default()
        };
        assert!((report.records_per_sec() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn phases_render_for_logs() {
        assert_eq!(Phase::Validating.to_string(), "validating");
        assert_eq!(Phase::DryRunReport.to_string(), "dry-run-report");
        assert_eq!(Phase::Merging.to_string(), "merging");
    }
}
