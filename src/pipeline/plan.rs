use crate::error::{EnrichError, Result};

/// One raw input column and the derived columns its lookup produces.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub raw: &'static str,
    pub derived: &'static [&'static str],
    /// Required mappings abort on a missing column; optional ones are
    /// silently skipped when the target table does not carry them.
    pub required: bool,
}

/// Declarative description of one enrichment type against one table.
///
/// The marker column is a derived column the merge writes for every staged
/// row (the geolocation sentinel makes `country` always non-null; the
/// user-agent merge always writes `is_bot`). The incremental predicate keys
/// off it, which is what makes a second run over unchanged data select
/// nothing even when individual lookups degraded to null.
#[derive(Debug, Clone)]
pub struct EnrichmentPlan {
    pub table: String,
    pub key_column: &'static str,
    pub recency_column: &'static str,
    pub fields: Vec<FieldMapping>,
    pub marker_column: &'static str,
    /// Boolean flag column staged alongside the text fields, when the
    /// enrichment classifies bot traffic.
    pub bot_flag_column: Option<&'static str>,
    /// Derived columns forced to NULL for bot-flagged rows.
    pub bot_sensitive: &'static [&'static str],
}

impl EnrichmentPlan {
    /// IP -> country enrichment.
    pub fn geolocation(table: &str) -> Self {
        Self {
            table: table.to_string(),
            key_column: "id",
            recency_column: "timestamp",
            fields: vec![FieldMapping {
                raw: "ip",
                derived: &["country"],
                required: true,
            }],
            marker_column: "country",
            bot_flag_column: None,
            bot_sensitive: &[],
        }
    }

    /// User-agent / referrer / domain enrichment. Referrer and domain pairs
    /// exist only on some tables and are picked up when present.
    pub fn user_agent(table: &str) -> Self {
        Self {
            table: table.to_string(),
            key_column: "id",
            recency_column: "timestamp",
            fields: vec![
                FieldMapping {
                    raw: "user_agent",
                    derived: &[
                        "browser_normalized",
                        "os_normalized",
                        "device_normalized",
                    ],
                    required: true,
                },
                FieldMapping {
                    raw: "referrer",
                    derived: &["referrer_normalized"],
                    required: false,
                },
                FieldMapping {
                    raw: "domain",
                    derived: &["domain_normalized"],
                    required: false,
                },
            ],
            marker_column: "is_bot",
            bot_flag_column: Some("is_bot"),
            bot_sensitive: &[
                "browser_normalized",
                "os_normalized",
                "device_normalized",
            ],
        }
    }

    /// Check the plan against the table's actual columns and keep only the
    /// field mappings the table can serve. Missing required columns are a
    /// schema error; missing optional mappings are dropped.
    pub fn resolve(self, columns: &[String]) -> Result<ResolvedPlan> {
        let has = |c: &str| columns.iter().any(|col| col == c);

        let mut structural = vec![self.key_column, self.recency_column];
        if let Some(flag) = self.bot_flag_column {
            structural.push(flag);
        }
        for col in structural {
            if !has(col) {
                return Err(EnrichError::Schema(format!(
                    "table {} is missing required column {col}",
                    self.table
                )));
            }
        }

        let mut active = Vec::new();
        for field in &self.fields {
            let complete = has(field.raw) && field.derived.iter().all(|d| has(d));
            if complete {
                active.push(*field);
            } else if field.required {
                return Err(EnrichError::Schema(format!(
                    "table {} is missing columns for required field {} -> {:?}",
                    self.table, field.raw, field.derived
                )));
            }
        }
        if active.is_empty() {
            return Err(EnrichError::Schema(format!(
                "table {} has no usable enrichment columns",
                self.table
            )));
        }

        Ok(ResolvedPlan { plan: self, active })
    }
}

/// Plan narrowed to the field mappings the target table actually carries.
#[derive(Debug, Clone)]
pub struct ResolvedPlan {
    plan: EnrichmentPlan,
    active: Vec<FieldMapping>,
}

impl ResolvedPlan {
    pub fn table(&self) -> &str {
        &self.plan.table
    }

    pub fn key_column(&self) -> &'static str {
        self.plan.key_column
    }

    pub fn bot_flag_column(&self) -> Option<&'static str> {
        self.plan.bot_flag_column
    }

    pub fn active_fields(&self) -> &[FieldMapping] {
        &self.active
    }

    /// Raw columns to extract, key column excluded.
    pub fn projection(&self) -> Vec<&'static str> {
        self.active.iter().map(|f| f.raw).collect()
    }

    /// Derived text columns to stage, in field order. The bot flag is not a
    /// text column and is handled separately.
    pub fn derived_columns(&self) -> Vec<&'static str> {
        self.active
            .iter()
            .flat_map(|f| f.derived.iter().copied())
            .filter(|d| Some(*d) != self.plan.bot_flag_column)
            .collect()
    }

    pub fn is_bot_sensitive(&self, column: &str) -> bool {
        self.plan.bot_sensitive.contains(&column)
    }

    /// Inclusion predicate. Incremental mode keys off the marker column so
    /// already-processed rows (including sentinel and bot outcomes) are
    /// never reselected; force mode takes every row with any populated raw
    /// field.
    pub fn predicate(&self, force: bool) -> String {
        let raw_populated = self
            .active
            .iter()
            .map(|f| format!("{} IS NOT NULL", f.raw))
            .collect::<Vec<_>>()
            .join(" OR ");
        if force {
            format!("({raw_populated})")
        } else {
            format!("{} IS NULL AND ({raw_populated})", self.plan.marker_column)
        }
    }

    /// Candidate extraction query, most recent rows first.
    pub fn select_sql(&self, force: bool, limit: Option<i64>) -> String {
        let mut columns = vec![self.plan.key_column];
        columns.extend(self.projection());
        let mut sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {} DESC",
            columns.join(", "),
            self.plan.table,
            self.predicate(force),
            self.plan.recency_column,
        );
        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    const PAGE_VIEW_COLS: &[&str] = &[
        "id",
        "timestamp",
        "ip",
        "country",
        "user_agent",
        "browser_normalized",
        "os_normalized",
        "device_normalized",
        "referrer",
        "referrer_normalized",
        "domain",
        "domain_normalized",
        "is_bot",
    ];

    #[test]
    fn geolocation_predicates() {
        let plan = EnrichmentPlan::geolocation("metrics_page_views")
            .resolve(&cols(PAGE_VIEW_COLS))
            .unwrap();
        assert_eq!(plan.predicate(false), "country IS NULL AND (ip IS NOT NULL)");
        assert_eq!(plan.predicate(true), "(ip IS NOT NULL)");
        assert_eq!(
            plan.select_sql(false, Some(10)),
            "SELECT id, ip FROM metrics_page_views \
             WHERE country IS NULL AND (ip IS NOT NULL) \
             ORDER BY timestamp DESC LIMIT 10"
        );
    }

    #[test]
    fn user_agent_plan_uses_all_columns_when_present() {
        let plan = EnrichmentPlan::user_agent("metrics_page_views")
            .resolve(&cols(PAGE_VIEW_COLS))
            .unwrap();
        assert_eq!(plan.projection(), vec!["user_agent", "referrer", "domain"]);
        assert_eq!(
            plan.derived_columns(),
            vec![
                "browser_normalized",
                "os_normalized",
                "device_normalized",
                "referrer_normalized",
                "domain_normalized",
            ]
        );
        assert_eq!(
            plan.predicate(false),
            "is_bot IS NULL AND (user_agent IS NOT NULL OR referrer IS NOT NULL \
             OR domain IS NOT NULL)"
        );
    }

    #[test]
    fn optional_fields_drop_when_columns_absent() {
        let plan = EnrichmentPlan::user_agent("metrics_events")
            .resolve(&cols(&[
                "id",
                "timestamp",
                "user_agent",
                "browser_normalized",
                "os_normalized",
                "device_normalized",
                "is_bot",
                "referrer", // raw present but no referrer_normalized
            ]))
            .unwrap();
        assert_eq!(plan.projection(), vec!["user_agent"]);
        assert_eq!(
            plan.predicate(false),
            "is_bot IS NULL AND (user_agent IS NOT NULL)"
        );
    }

    #[test]
    fn missing_required_columns_are_schema_errors() {
        let err = EnrichmentPlan::geolocation("metrics_page_views")
            .resolve(&cols(&["id", "timestamp", "ip"]))
            .unwrap_err();
        assert!(matches!(err, EnrichError::Schema(_)), "{err}");

        let err = EnrichmentPlan::user_agent("metrics_events")
            .resolve(&cols(&["id", "timestamp", "user_agent"]))
            .unwrap_err();
        assert!(matches!(err, EnrichError::Schema(_)), "{err}");
    }
}
