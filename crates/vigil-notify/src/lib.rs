//! Alarm delivery sinks for the vigil analysis engine.
//!
//! Alarms raised by rules are published through an [`AlarmSink`]. Publishing
//! is best-effort: the engine logs a failed publish and moves on, so a slow
//! or broken sink can never crash an analyzer. Built-in sinks cover
//! structured logging, webhooks, and an in-memory capture buffer; the
//! [`router::AlarmRouter`] fans one alarm out to several sinks with a
//! per-sink minimum level.

pub mod error;
pub mod router;
pub mod sinks;

#[cfg(test)]
mod tests;

use anyhow::Result;
use async_trait::async_trait;
use vigil_common::types::AlarmMessage;

/// Destination for alarms raised by the analysis engine.
///
/// Implementations must be shareable across analyzer tasks (`Send + Sync`).
/// `raise_alarm` may block on I/O; callers treat it as fire-and-forget and
/// must tolerate failure.
#[async_trait]
pub trait AlarmSink: Send + Sync {
    async fn raise_alarm(&self, alarm: &AlarmMessage) -> Result<()>;
}
