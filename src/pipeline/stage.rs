use std::collections::HashSet;

use sqlx::{Acquire, QueryBuilder};
use tracing::info;

use crate::db::Db;
use crate::error::{EnrichError, Result};
use crate::pipeline::extract::Normalized;
use crate::pipeline::plan::ResolvedPlan;

/// Run-scoped staging table. Session-local and dropped at commit, so nothing
/// survives the run and concurrent runs cannot collide.
pub const STAGING_TABLE: &str = "enrich_staging";

/// Rows per INSERT statement; keeps bind counts well under the wire limit.
const INSERT_CHUNK: usize = 1000;

/// DDL for the staging table matching the plan's derived columns.
pub fn staging_ddl(plan: &ResolvedPlan) -> String {
    let mut columns = vec![format!("{} BIGINT PRIMARY KEY", plan.key_column())];
    for col in plan.derived_columns() {
        columns.push(format!("{col} TEXT"));
    }
    if let Some(flag) = plan.bot_flag_column() {
        columns.push(format!("{flag} BOOLEAN"));
    }
    format!(
        "CREATE TEMPORARY TABLE {STAGING_TABLE} ({}) ON COMMIT DROP",
        columns.join(", ")
    )
}

/// The single set-based merge statement.
///
/// Precedence per column: bot-sensitive fields are forced to NULL for
/// bot-flagged rows and otherwise COALESCE staged-over-live; all other
/// fields COALESCE staged-over-live; the bot flag itself always takes the
/// staged value when present. Staged empties are NULL, so a known-good live
/// value is never overwritten with nothing.
pub fn merge_sql(plan: &ResolvedPlan) -> String {
    let key = plan.key_column();
    let mut set_clauses = Vec::new();
    for col in plan.derived_columns() {
        if plan.is_bot_sensitive(col) {
            set_clauses.push(format!(
                "{col} = CASE WHEN t.is_bot THEN NULL ELSE COALESCE(t.{col}, m.{col}) END"
            ));
        } else {
            set_clauses.push(format!("{col} = COALESCE(t.{col}, m.{col})"));
        }
    }
    if let Some(flag) = plan.bot_flag_column() {
        set_clauses.push(format!("{flag} = COALESCE(t.{flag}, m.{flag})"));
    }
    format!(
        "UPDATE {} AS m SET {} FROM {STAGING_TABLE} AS t WHERE m.{key} = t.{key}",
        plan.table(),
        set_clauses.join(", ")
    )
}

/// Empty strings stage as NULL so the merge's COALESCE never replaces a
/// known-good live value with nothing.
fn stage_value(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Reject result sets with duplicate identifiers. A duplicate means the
/// extractor produced the same row twice and the merge would be ambiguous.
pub fn check_unique_ids(results: &[Normalized]) -> Result<()> {
    let mut seen = HashSet::with_capacity(results.len());
    for r in results {
        if !seen.insert(r.id) {
            return Err(EnrichError::Load(format!(
                "duplicate identifier {} in staged results",
                r.id
            )));
        }
    }
    Ok(())
}

/// Bulk-load the results into the staging table and apply the merge, all on
/// one connection inside one transaction. The temp table is session-local
/// (it must live on the same connection as the merge) and the single commit
/// means an interrupt either applies everything or nothing.
pub async fn stage_and_merge(
    db: &Db,
    plan: &ResolvedPlan,
    results: &[Normalized],
) -> Result<u64> {
    check_unique_ids(results)?;

    let derived = plan.derived_columns();
    let mut insert_columns = vec![plan.key_column()];
    insert_columns.extend(derived.iter().copied());
    if let Some(flag) = plan.bot_flag_column() {
        insert_columns.push(flag);
    }

    let mut conn = db.pool.acquire().await?;
    let mut tx = conn.begin().await?;

    sqlx::raw_sql(&staging_ddl(plan)).execute(&mut *tx).await?;

    for chunk in results.chunks(INSERT_CHUNK) {
        let mut qb: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {STAGING_TABLE} ({}) ",
            insert_columns.join(", ")
        ));
        qb.push_values(chunk, |mut b, r| {
            b.push_bind(r.id);
            for col in &derived {
                b.push_bind(stage_value(r.derived.get(*col).and_then(|v| v.clone())));
            }
            if plan.bot_flag_column().is_some() {
                b.push_bind(r.is_bot);
            }
        });
        qb.build().persistent(false).execute(&mut *tx).await?;
    }
    info!(staged = results.len(), "loaded staging table");

    let merged = sqlx::raw_sql(&merge_sql(plan)).execute(&mut *tx).await?;
    tx.commit().await?;

    Ok(merged.rows_affected())
}
