//! SQLite-backed storage for the vigil analysis engine.
//!
//! Two independent read paths live here. The [`archive::EventArchive`]
//! keeps one SQLite database per UTC day and retrieves a single archived
//! event document by its composite (partition, row) id for the operator
//! UI; it is not on the analysis hot path. The
//! [`rule_store::SqliteRuleStore`] implements the engine's read-only
//! [`vigil_rules::storage::RuleStorage`] contract by building fresh rule
//! instances from stored rows on every fetch.

pub mod archive;
pub mod error;
pub mod rule_store;
