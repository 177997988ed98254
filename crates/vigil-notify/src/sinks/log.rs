use crate::AlarmSink;
use anyhow::Result;
use async_trait::async_trait;
use vigil_common::types::{AlarmLevel, AlarmMessage};

/// Sink that emits every alarm as a structured `tracing` event, mapping
/// alarm levels onto log levels. The default sink for deployments that
/// ship logs somewhere else anyway.
#[derive(Default)]
pub struct TracingAlarmSink;

#[async_trait]
impl AlarmSink for TracingAlarmSink {
    async fn raise_alarm(&self, alarm: &AlarmMessage) -> Result<()> {
        let detail = alarm.detail.as_deref().unwrap_or("-");
        let event_id = alarm
            .event_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());

        match alarm.level {
            AlarmLevel::Low => tracing::info!(
                program = %alarm.program_name,
                level = %alarm.level,
                detail,
                event_id = %event_id,
                "{}", alarm.summary
            ),
            AlarmLevel::Medium | AlarmLevel::High => tracing::warn!(
                program = %alarm.program_name,
                level = %alarm.level,
                detail,
                event_id = %event_id,
                "{}", alarm.summary
            ),
            AlarmLevel::Critical => tracing::error!(
                program = %alarm.program_name,
                level = %alarm.level,
                detail,
                event_id = %event_id,
                "{}", alarm.summary
            ),
        }
        Ok(())
    }
}
