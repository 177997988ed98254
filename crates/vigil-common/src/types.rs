use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snowflake::SnowflakeIdGenerator;
use std::sync::{Mutex, OnceLock};

/// Row keys are snowflake ids, so concurrently minted ids stay unique and
/// roughly time-ordered within a partition. One process-wide generator is
/// enough: ids never cross process boundaries before gaining their
/// partition half.
fn next_row_key() -> String {
    static ROW_KEYS: OnceLock<Mutex<SnowflakeIdGenerator>> = OnceLock::new();
    let generator = ROW_KEYS.get_or_init(|| Mutex::new(SnowflakeIdGenerator::new(1, 1)));
    generator.lock().unwrap().real_time_generate().to_string()
}

/// Composite identifier of an archived event document.
///
/// `partition` is the UTC day key (`%Y-%m-%d`) of the event timestamp and
/// selects the daily archive database; `row` is a snowflake id unique
/// within the partition. The textual form `partition:row` is reversible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId {
    pub partition: String,
    pub row: String,
}

impl EventId {
    /// Mint a fresh id whose partition is derived from `ts`.
    pub fn generate(ts: DateTime<Utc>) -> Self {
        Self {
            partition: ts.format("%Y-%m-%d").to_string(),
            row: next_row_key(),
        }
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.partition, self.row)
    }
}

impl std::str::FromStr for EventId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (partition, row) = s
            .split_once(':')
            .ok_or_else(|| format!("malformed event id: {s}"))?;
        if partition.is_empty() || row.is_empty() {
            return Err(format!("malformed event id: {s}"));
        }
        Ok(Self {
            partition: partition.to_string(),
            row: row.to_string(),
        })
    }
}

/// Error captured alongside a failed operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedError {
    pub message: String,
    /// Stack frames as reported by the emitting program, outermost first.
    #[serde(default)]
    pub stack: Vec<String>,
}

/// One observation of an operation outcome, emitted by a monitored program.
///
/// Immutable once ingested; the engine and analyzers only ever read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEvent {
    pub event_id: EventId,
    pub program_name: String,
    pub operation_name: String,
    pub succeeded: bool,
    pub error: Option<CapturedError>,
    /// Opaque parameter blob captured for post-mortem display.
    #[serde(default)]
    pub parameters: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl SystemEvent {
    /// Build a successful observation stamped `ts`, with a freshly minted id.
    pub fn succeeded(program: &str, operation: &str, ts: DateTime<Utc>) -> Self {
        Self {
            event_id: EventId::generate(ts),
            program_name: program.to_string(),
            operation_name: operation.to_string(),
            succeeded: true,
            error: None,
            parameters: serde_json::Value::Null,
            timestamp: ts,
        }
    }

    /// Build a failed observation carrying the given error message.
    pub fn failed(program: &str, operation: &str, ts: DateTime<Utc>, message: &str) -> Self {
        Self {
            event_id: EventId::generate(ts),
            program_name: program.to_string(),
            operation_name: operation.to_string(),
            succeeded: false,
            error: Some(CapturedError {
                message: message.to_string(),
                stack: Vec::new(),
            }),
            parameters: serde_json::Value::Null,
            timestamp: ts,
        }
    }

    /// The captured error message, when the operation failed with one.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for AlarmLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlarmLevel::Low => write!(f, "low"),
            AlarmLevel::Medium => write!(f, "medium"),
            AlarmLevel::High => write!(f, "high"),
            AlarmLevel::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for AlarmLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(AlarmLevel::Low),
            "medium" => Ok(AlarmLevel::Medium),
            "high" => Ok(AlarmLevel::High),
            "critical" => Ok(AlarmLevel::Critical),
            _ => Err(format!("unknown alarm level: {s}")),
        }
    }
}

/// A levelled notification raised when a rule triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmMessage {
    pub level: AlarmLevel,
    pub program_name: String,
    pub summary: String,
    /// Usually the captured error message of the triggering event.
    pub detail: Option<String>,
    /// Absent for timer-driven triggers, which have no triggering event.
    pub event_id: Option<EventId>,
    pub timestamp: DateTime<Utc>,
}

/// A UTC-stamped diagnostic line for operator introspection. Not an alarm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineMessage {
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

impl EngineMessage {
    pub fn now(text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            text: text.into(),
        }
    }
}

/// Lifecycle state shared by the engine and every analyzer.
///
/// Transitions are linear: Stopped -> Running -> ShuttingDown -> Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Stopped,
    Running,
    ShuttingDown,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Stopped => write!(f, "stopped"),
            RunState::Running => write!(f, "running"),
            RunState::ShuttingDown => write!(f, "shutting_down"),
        }
    }
}
