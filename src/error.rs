use thiserror::Error;

/// Failure taxonomy for enrichment runs.
///
/// Only structural problems abort a run. Per-record lookup trouble is handled
/// inside the providers: the affected field degrades to its sentinel/null and
/// the incident is logged at debug level.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// Target table or a required column is absent. Raised before any
    /// extraction happens.
    #[error("schema error: {0}")]
    Schema(String),

    /// A startup-required reference dataset could not be loaded.
    #[error("reference data missing: {0}")]
    ReferenceDataMissing(String),

    /// Duplicate identifier while building the staging set. This means the
    /// extractor produced the same row twice; aborting is the safe choice.
    #[error("staging load error: {0}")]
    Load(String),

    /// Connection or query failure surfaced by the database driver.
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

pub type Result<T, E = EnrichError> = std::result::Result<T, E>;
