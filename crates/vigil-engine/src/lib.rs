//! Two-level dispatch-and-analysis engine for program health auditing.
//!
//! The [`engine::AnalyzerEngine`] owns a single ingest queue and routes
//! every incoming [`vigil_common::types::SystemEvent`] to the
//! [`analyzer::ProgramAnalyzer`] responsible for the emitting program,
//! creating rule-less analyzers on first sight of a new program. Each
//! analyzer drains its own queue and fans every event out over the
//! matching rules in parallel, publishing an alarm per triggered rule.
//!
//! Faults stay contained: a failing rule raises a medium alarm and stays
//! installed, a crashed analyzer is restarted by the dispatch loop on the
//! next event for its program, and a crashed dispatch loop drops the
//! engine to stopped for an external supervisor to restart.

pub mod analyzer;
pub mod config;
pub mod engine;
pub mod error;
pub mod messages;
pub mod registry;


pub use analyzer::ProgramAnalyzer;
pub use config::EngineConfig;
pub use engine::AnalyzerEngine;
pub use error::EngineError;
pub use messages::EngineMessages;
pub use registry::AnalyzerRegistry;
