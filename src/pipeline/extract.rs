use std::collections::BTreeMap;

use sqlx::Row;
use tracing::info;

use crate::db::Db;
use crate::error::Result;
use crate::pipeline::plan::ResolvedPlan;

/// One extracted source row. Raw values are keyed by column name; a key is
/// present for every projected column, with None for SQL NULL.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: i64,
    pub raw: BTreeMap<&'static str, Option<String>>,
}

impl Candidate {
    /// Raw value for a column, None when NULL, absent, or empty.
    pub fn raw_value(&self, column: &str) -> Option<&str> {
        self.raw
            .get(column)
            .and_then(|v| v.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

/// Result of classifying one candidate. Derived values are keyed by column
/// name; empty values must be represented as None so the merge never
/// overwrites existing data with an empty string.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub id: i64,
    pub derived: BTreeMap<&'static str, Option<String>>,
    pub is_bot: Option<bool>,
}

/// Pull candidate rows matching the plan's predicate, newest first.
/// Read-only; the connection can be dropped as soon as this returns.
pub async fn extract_candidates(
    db: &Db,
    plan: &ResolvedPlan,
    force: bool,
    limit: Option<i64>,
) -> Result<Vec<Candidate>> {
    let sql = plan.select_sql(force, limit);
    let rows = sqlx::query(&sql)
        .persistent(false)
        .fetch_all(&db.pool)
        .await?;

    let projection = plan.projection();
    let mut candidates = Vec::with_capacity(rows.len());
    for row in rows {
        let id: i64 = row.try_get(plan.key_column())?;
        let mut raw = BTreeMap::new();
        for col in &projection {
            let value: Option<String> = row.try_get(*col)?;
            raw.insert(*col, value);
        }
        candidates.push(Candidate { id, raw });
    }
    info!(
        table = plan.table(),
        candidates = candidates.len(),
        force,
        "extracted candidate rows"
    );
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_value_filters_null_and_empty() {
        let mut raw = BTreeMap::new();
        raw.insert("ip", Some("8.8.8.8".to_string()));
        raw.insert("user_agent", Some("   ".to_string()));
        raw.insert("referrer", None);
        let cand = Candidate { id: 7, raw };

        assert_eq!(cand.raw_value("ip"), Some("8.8.8.8"));
        assert_eq!(cand.raw_value("user_agent"), None);
        assert_eq!(cand.raw_value("referrer"), None);
        assert_eq!(cand.raw_value("domain"), None);
    }
}
