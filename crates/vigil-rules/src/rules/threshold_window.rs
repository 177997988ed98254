use crate::AnalyzeRule;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;
use vigil_common::types::{AlarmLevel, SystemEvent};

/// Triggers when the number of matching events inside a sliding window
/// reaches a threshold.
///
/// After firing, the rule cools down: it stays silent until the live count
/// drops back below the threshold, so a sustained burst produces one alarm
/// instead of one per event.
pub struct ThresholdWindowRule {
    rule_name: String,
    program_name: String,
    operation_name: String,
    alarm_level: AlarmLevel,
    alarm_message: String,
    threshold: usize,
    window: Duration,
    failures_only: bool,
    state: Mutex<WindowState>,
}

#[derive(Default)]
struct WindowState {
    hits: VecDeque<DateTime<Utc>>,
    cooling: bool,
}

impl ThresholdWindowRule {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rule_name: &str,
        program_name: &str,
        operation_name: &str,
        alarm_level: AlarmLevel,
        alarm_message: &str,
        threshold: usize,
        window: Duration,
        failures_only: bool,
    ) -> Self {
        Self {
            rule_name: rule_name.to_string(),
            program_name: program_name.to_string(),
            operation_name: operation_name.to_string(),
            alarm_level,
            alarm_message: alarm_message.to_string(),
            threshold: threshold.max(1),
            window,
            failures_only,
            state: Mutex::new(WindowState::default()),
        }
    }

    /// Number of hits currently inside the window.
    pub fn hit_count(&self) -> usize {
        self.state.lock().unwrap().hits.len()
    }
}

impl AnalyzeRule for ThresholdWindowRule {
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
        if self.failures_only && event.succeeded {
            return false;
        }

        let mut state = self.state.lock().unwrap();

        let cutoff = event.timestamp - self.window;
        state.hits.push_back(event.timestamp);
        while let Some(front) = state.hits.front() {
            if *front < cutoff {
                state.hits.pop_front();
            } else {
                break;
            }
        }

        if state.hits.len() >= self.threshold {
            if state.cooling {
                false
            } else {
                state.cooling = true;
                true
            }
        } else {
            // Window emptied below the threshold; the rule may fire again.
            state.cooling = false;
            false
        }
    }

    fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.hits.clear();
        state.cooling = false;
    }
}
