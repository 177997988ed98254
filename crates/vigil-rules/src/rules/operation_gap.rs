use crate::AnalyzeRule;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use vigil_common::types::{AlarmLevel, AlarmMessage, SystemEvent};

/// Triggers when the gap between consecutive matching operations exceeds a
/// bound.
///
/// The rule is driven from two sides. Each incoming event compares its
/// timestamp against the previous one and re-arms a timer for `max_gap`;
/// if the timer elapses with no further event, a timeout alarm is pushed
/// through the observer channel and `last_seen` is cleared so the next
/// event restarts the cycle instead of re-triggering immediately.
///
/// `add_and_check` must be called from within a tokio runtime, since it
/// arms the timer task.
pub struct OperationGapRule {
    rule_name: String,
    program_name: String,
    operation_name: String,
    alarm_level: AlarmLevel,
    alarm_message: String,
    max_gap: Duration,
    state: Arc<Mutex<GapState>>,
}

#[derive(Default)]
struct GapState {
    last_seen: Option<DateTime<Utc>>,
    timer: Option<JoinHandle<()>>,
    observer: Option<UnboundedSender<AlarmMessage>>,
}

impl OperationGapRule {
    pub fn new(
        rule_name: &str,
        program_name: &str,
        operation_name: &str,
        alarm_level: AlarmLevel,
        alarm_message: &str,
        max_gap: Duration,
    ) -> Self {
        Self {
            rule_name: rule_name.to_string(),
            program_name: program_name.to_string(),
            operation_name: operation_name.to_string(),
            alarm_level,
            alarm_message: alarm_message.to_string(),
            max_gap,
            state: Arc::new(Mutex::new(GapState::default())),
        }
    }

    /// Timestamp of the last matching event, if the cycle is armed.
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.state.lock().unwrap().last_seen
    }

    fn arm_timer(&self) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let sleep_for = self.max_gap.to_std().unwrap_or_default();
        let level = self.alarm_level;
        let program = self.program_name.clone();
        let summary = self.alarm_message.clone();
        let operation = self.operation_name.clone();
        let gap_secs = self.max_gap.num_milliseconds() as f64 / 1000.0;

        tokio::spawn(async move {
            tokio::time::sleep(sleep_for).await;

            let mut state = state.lock().unwrap();
            state.last_seen = None;
            state.timer = None;
            if let Some(observer) = &state.observer {
                let alarm = AlarmMessage {
                    level,
                    program_name: program.clone(),
                    summary,
                    detail: Some(format!(
                        "no further '{operation}' operation observed within {gap_secs}s"
                    )),
                    event_id: None,
                    timestamp: Utc::now(),
                };
                if observer.send(alarm).is_err() {
                    tracing::debug!(program = %program, "Gap timeout observer dropped");
                }
            }
        })
    }
}

impl AnalyzeRule for OperationGapRule {
    fn rule_name(&self) -> &str {
        &self.rule_name
    }

    fn program_name(&self) -> &str {
        &self.program_name
    }

    fn operation_name(&self) -> &str {
        &self.operation_name
    }

    fn alarm_level(&self) -> AlarmLevel {
        self.alarm_level
    }

    fn alarm_message(&self) -> &str {
        &self.alarm_message
    }

    fn add_and_check(&self, event: &SystemEvent) -> bool {
        let triggered = {
            let mut state = self.state.lock().unwrap();
            let triggered = state
                .last_seen
                .is_some_and(|last| event.timestamp - last > self.max_gap);
            state.last_seen = Some(event.timestamp);
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            triggered
        };
        // Arm outside the lock; the timer task takes the same lock.
        let timer = self.arm_timer();
        self.state.lock().unwrap().timer = Some(timer);
        triggered
    }

    fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.last_seen = None;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }

    fn attach_observer(&self, observer: UnboundedSender<AlarmMessage>) {
        self.state.lock().unwrap().observer = Some(observer);
    }
}
