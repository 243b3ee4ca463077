//! Lookup providers: pure raw-string -> normalized-field classification.
//! Reference datasets are loaded once at startup; lookups themselves do no
//! I/O and never abort a batch.

pub mod bots;
pub mod domain;
pub mod geo;
pub mod user_agent;
