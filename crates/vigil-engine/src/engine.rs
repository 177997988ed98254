use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::messages::EngineMessages;
use crate::registry::AnalyzerRegistry;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use vigil_common::types::{AlarmLevel, AlarmMessage, EngineMessage, RunState, SystemEvent};
use vigil_notify::AlarmSink;
use vigil_rules::storage::RuleStorage;
use vigil_rules::AnalyzeRule;

/// Process-wide coordinator: owns the ingest queue, the analyzer registry,
/// and the engine lifecycle.
///
/// One engine instance serves one process; horizontal scale is achieved by
/// sharding programs across processes upstream, not by nesting engines.
pub struct AnalyzerEngine {
    config: Arc<EngineConfig>,
    state: Arc<Mutex<RunState>>,
    ingest: Arc<Mutex<VecDeque<SystemEvent>>>,
    registry: Arc<AnalyzerRegistry>,
    messages: Arc<EngineMessages>,
    storage: Mutex<Option<Arc<dyn RuleStorage>>>,
    sink: Mutex<Option<Arc<dyn AlarmSink>>>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

impl AnalyzerEngine {
    pub fn new(config: EngineConfig) -> Self {
        let message_capacity = config.engine_message_capacity;
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(RunState::Stopped)),
            ingest: Arc::new(Mutex::new(VecDeque::new())),
            registry: Arc::new(AnalyzerRegistry::new()),
            messages: Arc::new(EngineMessages::new(message_capacity)),
            storage: Mutex::new(None),
            sink: Mutex::new(None),
            dispatch: Mutex::new(None),
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap()
    }

    /// Number of events waiting in the ingest queue.
    pub fn ingest_len(&self) -> usize {
        self.ingest.lock().unwrap().len()
    }

    /// Read the full rule set from storage, build one analyzer per
    /// program, and launch dispatch. Fails unless the engine is Stopped.
    pub async fn start(
        &self,
        storage: Arc<dyn RuleStorage>,
        sink: Arc<dyn AlarmSink>,
    ) -> Result<(), EngineError> {
        {
            let state = self.state.lock().unwrap();
            if *state != RunState::Stopped {
                return Err(EngineError::NotStopped(*state));
            }
        }

        let rules = storage.get_all_rules().await?;
        let mut by_program: HashMap<String, Vec<Arc<dyn AnalyzeRule>>> = HashMap::new();
        for rule in rules {
            by_program
                .entry(rule.program_name().to_string())
                .or_default()
                .push(rule);
        }

        if by_program.is_empty() {
            tracing::info!("No rules in storage; starting with an empty analyzer set");
            self.messages
                .push("no rules in storage; analyzers will be created on demand");
        }

        for (program, rules) in by_program {
            let analyzer = self.registry.get_or_create(
                &program,
                Arc::clone(&sink),
                Arc::clone(&self.messages),
                Arc::clone(&self.config),
            );
            let count = rules.len();
            for rule in rules {
                if let Err(e) = analyzer.add_or_replace_rule(rule) {
                    tracing::warn!(program = %program, error = %e, "Skipping rule from storage");
                }
            }
            analyzer.start_task();
            tracing::info!(program = %program, rules = count, "Analyzer loaded");
        }

        *self.storage.lock().unwrap() = Some(storage);
        *self.sink.lock().unwrap() = Some(Arc::clone(&sink));
        *self.state.lock().unwrap() = RunState::Running;

        let handle = self.spawn_dispatch(sink);
        *self.dispatch.lock().unwrap() = Some(handle);

        self.messages.push("engine started");
        tracing::info!(analyzers = self.registry.len(), "Engine started");
        Ok(())
    }

    fn spawn_dispatch(&self, sink: Arc<dyn AlarmSink>) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let ingest = Arc::clone(&self.ingest);
        let registry = Arc::clone(&self.registry);
        let messages = Arc::clone(&self.messages);
        let config = Arc::clone(&self.config);

        let inner = tokio::spawn(Self::dispatch_loop(
            Arc::clone(&state),
            ingest,
            registry,
            Arc::clone(&sink),
            Arc::clone(&messages),
            config,
        ));

        // Watch the dispatch task; a crash drops the engine to Stopped and
        // leaves the restart to an external supervisor.
        tokio::spawn(async move {
            if let Err(e) = inner.await {
                *state.lock().unwrap() = RunState::Stopped;
                tracing::error!(error = %e, "Dispatch task crashed");
                messages.push(format!("dispatch task crashed: {e}"));
                let alarm = AlarmMessage {
                    level: AlarmLevel::Medium,
                    program_name: "engine".to_string(),
                    summary: "event dispatch stopped after a fault".to_string(),
                    detail: Some(e.to_string()),
                    event_id: None,
                    timestamp: Utc::now(),
                };
                if let Err(e) = sink.raise_alarm(&alarm).await {
                    tracing::error!(error = %e, "Failed to publish dispatch fault alarm");
                }
            }
        })
    }

    /// Pull events off the ingest queue and hand each to its program's
    /// analyzer, creating and (re)starting analyzers as needed. Keeps
    /// draining during ShuttingDown and exits once the queue is empty.
    async fn dispatch_loop(
        state: Arc<Mutex<RunState>>,
        ingest: Arc<Mutex<VecDeque<SystemEvent>>>,
        registry: Arc<AnalyzerRegistry>,
        sink: Arc<dyn AlarmSink>,
        messages: Arc<EngineMessages>,
        config: Arc<EngineConfig>,
    ) {
        let idle = std::time::Duration::from_millis(config.dispatch_idle_ms);

        loop {
            let event = ingest.lock().unwrap().pop_front();
            match event {
                Some(event) => {
                    let analyzer = registry.get_or_create(
                        &event.program_name,
                        Arc::clone(&sink),
                        Arc::clone(&messages),
                        Arc::clone(&config),
                    );
                    // Covers both a brand-new analyzer and one that
                    // stopped after a fault; a no-op otherwise.
                    analyzer.start_task();
                    analyzer.add_event(event);
                }
                None => match *state.lock().unwrap() {
                    RunState::Running => {}
                    RunState::ShuttingDown | RunState::Stopped => break,
                },
            }
            if ingest.lock().unwrap().is_empty() && *state.lock().unwrap() == RunState::Running {
                tokio::time::sleep(idle).await;
            }
        }
    }

    /// Drain the ingest queue, stop every analyzer, and wait (bounded by
    /// the grace period) until they report Stopped.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if *state != RunState::Running {
                return;
            }
            *state = RunState::ShuttingDown;
        }
        self.messages
            .push("engine shutting down; draining ingest queue");
        tracing::info!("Engine shutting down");

        let dispatch = self.dispatch.lock().unwrap().take();
        if let Some(handle) = dispatch {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Dispatch watcher join failed");
            }
        }

        for analyzer in self.registry.all() {
            analyzer.stop();
        }

        let grace = std::time::Duration::from_secs(self.config.shutdown_grace_secs);
        let poll = std::time::Duration::from_millis(self.config.state_poll_ms);
        let deadline = tokio::time::Instant::now() + grace;

        loop {
            let pending: Vec<String> = self
                .registry
                .snapshot()
                .into_iter()
                .filter(|(_, state)| *state != RunState::Stopped)
                .map(|(program, _)| program)
                .collect();
            if pending.is_empty() {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(
                    pending = pending.len(),
                    "Shutdown grace period elapsed with analyzers still running"
                );
                self.messages.push(format!(
                    "shutdown grace period elapsed; {} analyzer(s) still running: {}",
                    pending.len(),
                    pending.join(", ")
                ));
                break;
            }
            tokio::time::sleep(poll).await;
        }

        *self.state.lock().unwrap() = RunState::Stopped;
        self.messages.push("engine stopped");
        tracing::info!("Engine stopped");
    }

    /// Append a batch to the ingest queue, preserving its internal order.
    /// Non-blocking; fails unless the engine is Running.
    pub fn enqueue(&self, events: Vec<SystemEvent>) -> Result<(), EngineError> {
        if self.state() != RunState::Running {
            return Err(EngineError::NotRunning);
        }
        let mut ingest = self.ingest.lock().unwrap();
        if let Some(capacity) = self.config.ingest_capacity {
            if ingest.len() + events.len() > capacity {
                return Err(EngineError::QueueFull { capacity });
            }
        }
        ingest.extend(events);
        Ok(())
    }

    /// Stop the named analyzer, replace its rule set with the current
    /// storage contents for that program, and restart it. The analyzer is
    /// created when it does not exist yet. Fails unless the engine is
    /// Running: a reload after `stop` would spawn an analyzer task nothing
    /// ever stops.
    pub async fn reload_rules(&self, program_name: &str) -> Result<(), EngineError> {
        if self.state() != RunState::Running {
            return Err(EngineError::NotRunning);
        }
        let storage = self
            .storage
            .lock()
            .unwrap()
            .clone()
            .ok_or(EngineError::NotRunning)?;
        let sink = self
            .sink
            .lock()
            .unwrap()
            .clone()
            .ok_or(EngineError::NotRunning)?;

        let analyzer = self.registry.get_or_create(
            program_name,
            sink,
            Arc::clone(&self.messages),
            Arc::clone(&self.config),
        );

        analyzer.stop();
        let poll = std::time::Duration::from_millis(self.config.state_poll_ms);
        while analyzer.state() != RunState::Stopped {
            tokio::time::sleep(poll).await;
        }

        analyzer.unload_all_rules();
        let rules = storage.get_rules_for_program(program_name).await?;
        let count = rules.len();
        for rule in rules {
            if let Err(e) = analyzer.add_or_replace_rule(rule) {
                tracing::warn!(program = %program_name, error = %e, "Skipping rule from storage");
            }
        }
        analyzer.start_task();

        tracing::info!(program = %program_name, rules = count, "Rules reloaded");
        self.messages
            .push(format!("reloaded {count} rule(s) for program '{program_name}'"));
        Ok(())
    }

    /// Best-effort snapshot of (program, state) pairs.
    pub fn list_analyzers(&self) -> Vec<(String, RunState)> {
        self.registry.snapshot()
    }

    /// Snapshot of the diagnostic message queue.
    pub fn engine_messages(&self) -> Vec<EngineMessage> {
        self.messages.snapshot()
    }
}
