//! Shared data model for the vigil analysis engine.
//!
//! Everything that crosses a crate boundary lives here: the
//! [`types::SystemEvent`] observations emitted by monitored programs, the
//! [`types::AlarmMessage`] notifications raised by rules, and the composite
//! [`types::EventId`] used to retrieve archived event documents.

pub mod types;
