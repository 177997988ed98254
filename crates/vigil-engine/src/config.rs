use serde::Deserialize;

/// Tunables for the engine and its analyzers. All fields have defaults, so
/// an empty TOML document is a valid configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// How long `stop` waits for analyzers to drain before giving up.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Idle sleep of the dispatch loop when the ingest queue is empty.
    #[serde(default = "default_dispatch_idle_ms")]
    pub dispatch_idle_ms: u64,

    /// Idle sleep of an analyzer loop when its queue is empty.
    #[serde(default = "default_analyzer_idle_ms")]
    pub analyzer_idle_ms: u64,

    /// Polling interval while waiting on analyzer state transitions.
    #[serde(default = "default_state_poll_ms")]
    pub state_poll_ms: u64,

    /// Optional cap on the ingest queue; `enqueue` fails when the batch
    /// does not fit. Unbounded when absent.
    #[serde(default)]
    pub ingest_capacity: Option<usize>,

    /// Optional per-analyzer queue cap; overflowing events are dropped
    /// and recorded as an engine message. Unbounded when absent.
    #[serde(default)]
    pub analyzer_queue_capacity: Option<usize>,

    /// Ring size of the diagnostic message queue.
    #[serde(default = "default_engine_message_capacity")]
    pub engine_message_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: default_shutdown_grace_secs(),
            dispatch_idle_ms: default_dispatch_idle_ms(),
            analyzer_idle_ms: default_analyzer_idle_ms(),
            state_poll_ms: default_state_poll_ms(),
            ingest_capacity: None,
            analyzer_queue_capacity: None,
            engine_message_capacity: default_engine_message_capacity(),
        }
    }
}

fn default_shutdown_grace_secs() -> u64 {
    300
}

fn default_dispatch_idle_ms() -> u64 {
    20
}

fn default_analyzer_idle_ms() -> u64 {
    20
}

fn default_state_poll_ms() -> u64 {
    50
}

fn default_engine_message_capacity() -> usize {
    256
}

impl EngineConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}
