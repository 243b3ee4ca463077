//! The bulk offline-batch enrichment pipeline: extract candidate rows,
//! transform them with no connection held, stage the results into a
//! run-scoped temp table, and apply them with a single set-based merge.

pub mod driver;
pub mod extract;
pub mod plan;
pub mod stage;

pub use driver::{run_pipeline, Phase, RunOptions, RunReport};
pub use extract::{Candidate, Normalized};
pub use plan::{EnrichmentPlan, ResolvedPlan};
