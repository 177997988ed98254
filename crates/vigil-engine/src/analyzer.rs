use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::messages::EngineMessages;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use vigil_common::types::{AlarmLevel, AlarmMessage, RunState, SystemEvent};
use vigil_notify::AlarmSink;
use vigil_rules::rule_set::RuleSet;
use vigil_rules::AnalyzeRule;

/// Per-program worker: owns a private event queue and the program's rule
/// set, and fans each event out over the matching rules in parallel.
///
/// The analyzer follows the same Stopped -> Running -> ShuttingDown ->
/// Stopped lifecycle as the engine. The engine is the single producer for
/// the queue; the analyzer's task is the single consumer.
pub struct ProgramAnalyzer {
    program: Mutex<Option<String>>,
    state: Mutex<RunState>,
    queue: Mutex<VecDeque<SystemEvent>>,
    rules: Mutex<RuleSet>,
    sink: Arc<dyn AlarmSink>,
    messages: Arc<EngineMessages>,
    config: Arc<EngineConfig>,
    timeout_tx: UnboundedSender<AlarmMessage>,
    timeout_rx: Mutex<Option<UnboundedReceiver<AlarmMessage>>>,
}

impl ProgramAnalyzer {
    pub fn new(
        program: Option<&str>,
        sink: Arc<dyn AlarmSink>,
        messages: Arc<EngineMessages>,
        config: Arc<EngineConfig>,
    ) -> Self {
        let (timeout_tx, timeout_rx) = mpsc::unbounded_channel();
        Self {
            program: Mutex::new(program.map(str::to_string)),
            state: Mutex::new(RunState::Stopped),
            queue: Mutex::new(VecDeque::new()),
            rules: Mutex::new(RuleSet::new()),
            sink,
            messages,
            config,
            timeout_tx,
            timeout_rx: Mutex::new(Some(timeout_rx)),
        }
    }

    pub fn program(&self) -> Option<String> {
        self.program.lock().unwrap().clone()
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Append one event to the private queue. With a configured cap the
    /// overflowing event is dropped and recorded as an engine message.
    pub fn add_event(&self, event: SystemEvent) {
        let mut queue = self.queue.lock().unwrap();
        if let Some(capacity) = self.config.analyzer_queue_capacity {
            if queue.len() >= capacity {
                drop(queue);
                tracing::warn!(
                    program = %event.program_name,
                    capacity,
                    "Analyzer queue full, dropping event"
                );
                self.messages.push(format!(
                    "analyzer queue for '{}' full (capacity {capacity}); event {} dropped",
                    event.program_name, event.event_id
                ));
                return;
            }
        }
        queue.push_back(event);
    }

    /// Install a rule under its name, replacing (and resetting) any
    /// previous rule of that name.
    ///
    /// An analyzer without a program adopts the rule's; otherwise the
    /// programs must match, and a mismatch leaves the rule set untouched.
    pub fn add_or_replace_rule(&self, rule: Arc<dyn AnalyzeRule>) -> Result<(), EngineError> {
        {
            let mut program = self.program.lock().unwrap();
            match program.as_deref() {
                None => *program = Some(rule.program_name().to_string()),
                Some(own) if own != rule.program_name() => {
                    return Err(EngineError::ProgramMismatch {
                        expected: own.to_string(),
                        got: rule.program_name().to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        rule.attach_observer(self.timeout_tx.clone());
        self.rules.lock().unwrap().insert(rule);
        Ok(())
    }

    /// Reset every rule (cancelling pending timers) and empty the set.
    pub fn unload_all_rules(&self) {
        self.rules.lock().unwrap().clear();
    }

    pub fn rule_names(&self) -> Vec<String> {
        self.rules.lock().unwrap().names()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.lock().unwrap().len()
    }

    /// Signal the evaluation loop to drain the queue and stop.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == RunState::Running {
            *state = RunState::ShuttingDown;
        }
    }

    /// Launch the evaluation loop. A no-op when the analyzer is already
    /// Running (or still draining a previous shutdown).
    pub fn start_task(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().unwrap();
            match *state {
                RunState::Running | RunState::ShuttingDown => return,
                RunState::Stopped => *state = RunState::Running,
            }
        }

        // The timeout forwarder is spawned once, on first start; it lives
        // until the analyzer is dropped and all rule senders are gone.
        if let Some(mut rx) = self.timeout_rx.lock().unwrap().take() {
            let sink = Arc::clone(&self.sink);
            tokio::spawn(async move {
                while let Some(alarm) = rx.recv().await {
                    if let Err(e) = sink.raise_alarm(&alarm).await {
                        tracing::error!(
                            program = %alarm.program_name,
                            error = %e,
                            "Failed to publish gap timeout alarm"
                        );
                    }
                }
            });
        }

        let analyzer = Arc::clone(self);
        let loop_handle = tokio::spawn(async move { analyzer.run_loop().await });

        // Watch the loop; a crash drops the analyzer to Stopped and raises
        // a medium alarm. Dispatch restarts it on the next event.
        let analyzer = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = loop_handle.await {
                *analyzer.state.lock().unwrap() = RunState::Stopped;
                let program = analyzer.program().unwrap_or_default();
                tracing::error!(program = %program, error = %e, "Analyzer loop crashed");
                let alarm = AlarmMessage {
                    level: AlarmLevel::Medium,
                    program_name: program.clone(),
                    summary: format!("analyzer for '{program}' stopped after a fault"),
                    detail: Some(e.to_string()),
                    event_id: None,
                    timestamp: Utc::now(),
                };
                if let Err(e) = analyzer.sink.raise_alarm(&alarm).await {
                    tracing::error!(program = %program, error = %e, "Failed to publish analyzer fault alarm");
                }
            }
        });
    }

    async fn run_loop(&self) {
        let program = self.program().unwrap_or_default();
        tracing::debug!(program = %program, "Analyzer task started");

        let idle = std::time::Duration::from_millis(self.config.analyzer_idle_ms);
        loop {
            let event = self.queue.lock().unwrap().pop_front();
            match event {
                Some(event) => self.evaluate_event(event).await,
                None => match self.state() {
                    RunState::Running => tokio::time::sleep(idle).await,
                    RunState::ShuttingDown | RunState::Stopped => break,
                },
            }
        }

        *self.state.lock().unwrap() = RunState::Stopped;
        tracing::debug!(program = %program, "Analyzer task stopped");
    }

    /// Evaluate one event against every matching rule, each on its own
    /// task so a slow rule cannot stall its siblings.
    async fn evaluate_event(&self, event: SystemEvent) {
        let matching = self.rules.lock().unwrap().matching(&event);
        if matching.is_empty() {
            return;
        }

        let event = Arc::new(event);
        let mut evaluations = Vec::with_capacity(matching.len());
        for rule in matching {
            let task_rule = Arc::clone(&rule);
            let task_event = Arc::clone(&event);
            let handle = tokio::spawn(async move { task_rule.add_and_check(&task_event) });
            evaluations.push((rule, handle));
        }

        for (rule, handle) in evaluations {
            match handle.await {
                Ok(true) => {
                    let alarm = AlarmMessage {
                        level: rule.alarm_level(),
                        program_name: event.program_name.clone(),
                        summary: rule.alarm_message().to_string(),
                        detail: event.error_message().map(str::to_string),
                        event_id: Some(event.event_id.clone()),
                        timestamp: Utc::now(),
                    };
                    self.publish(alarm).await;
                }
                Ok(false) => {}
                Err(e) => {
                    // The rule panicked; it stays installed and the next
                    // event retries it.
                    tracing::error!(
                        rule = %rule.rule_name(),
                        program = %event.program_name,
                        error = %e,
                        "Rule evaluation failed"
                    );
                    let alarm = AlarmMessage {
                        level: AlarmLevel::Medium,
                        program_name: event.program_name.clone(),
                        summary: format!(
                            "rule '{}' failed while evaluating an event",
                            rule.rule_name()
                        ),
                        detail: Some(e.to_string()),
                        event_id: Some(event.event_id.clone()),
                        timestamp: Utc::now(),
                    };
                    self.publish(alarm).await;
                }
            }
        }
    }

    /// Best-effort publish; a failing sink is logged, never propagated.
    async fn publish(&self, alarm: AlarmMessage) {
        if let Err(e) = self.sink.raise_alarm(&alarm).await {
            tracing::error!(
                program = %alarm.program_name,
                error = %e,
                "Failed to publish alarm"
            );
        }
    }
}
