use crate::AlarmSink;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;
use vigil_common::types::AlarmMessage;

/// Sink that appends every alarm to an in-memory buffer.
///
/// Used by tests to assert on raised alarms, and by embedders that drain
/// alarms through their own channel.
#[derive(Default)]
pub struct MemoryAlarmSink {
    alarms: Mutex<Vec<AlarmMessage>>,
}

impl MemoryAlarmSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything raised so far.
    pub fn alarms(&self) -> Vec<AlarmMessage> {
        self.alarms.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.alarms.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alarms.lock().unwrap().is_empty()
    }

    /// Remove and return everything raised so far.
    pub fn drain(&self) -> Vec<AlarmMessage> {
        std::mem::take(&mut self.alarms.lock().unwrap())
    }
}

#[async_trait]
impl AlarmSink for MemoryAlarmSink {
    async fn raise_alarm(&self, alarm: &AlarmMessage) -> Result<()> {
        self.alarms.lock().unwrap().push(alarm.clone());
        Ok(())
    }
}
