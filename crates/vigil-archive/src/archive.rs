use crate::error::{ArchiveError, Result};
use chrono::DateTime;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use vigil_common::types::{CapturedError, EventId, SystemEvent};

const EVENTS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS events (
    row_id TEXT PRIMARY KEY,
    program_name TEXT NOT NULL,
    operation_name TEXT NOT NULL,
    succeeded INTEGER NOT NULL,
    error_message TEXT,
    error_stack TEXT NOT NULL DEFAULT '[]',
    parameters TEXT NOT NULL DEFAULT 'null',
    timestamp INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_program_time
    ON events(program_name, timestamp);
";

/// Day-partitioned archive of event documents.
///
/// Each UTC day gets its own SQLite database `<partition>.db` under the
/// data directory; the partition half of an [`EventId`] names the file and
/// the row half the record inside it. Lookups never scan across
/// partitions.
pub struct EventArchive {
    data_dir: PathBuf,
    connections: Mutex<HashMap<String, Connection>>,
}

impl EventArchive {
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            connections: Mutex::new(HashMap::new()),
        })
    }

    /// Lock the connection cache, recovering from a poisoned Mutex.
    fn lock_connections(&self) -> MutexGuard<'_, HashMap<String, Connection>> {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn partition_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.db"))
    }

    /// Ensure the partition database is open and cached. With
    /// `create_missing` false, a partition without a file on disk is
    /// reported as absent instead of being created.
    fn ensure_partition(&self, key: &str, create_missing: bool) -> Result<bool> {
        let mut conns = self.lock_connections();
        if conns.contains_key(key) {
            return Ok(true);
        }
        let path = self.partition_path(key);
        if !create_missing && !path.exists() {
            return Ok(false);
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(EVENTS_SCHEMA)?;
        if create_missing {
            tracing::info!(partition = %key, "Opened archive partition");
        }
        conns.insert(key.to_string(), conn);
        Ok(true)
    }

    /// Persist one event document into its partition.
    pub fn store(&self, event: &SystemEvent) -> Result<()> {
        let key = &event.event_id.partition;
        self.ensure_partition(key, true)?;

        let error_message = event.error.as_ref().map(|e| e.message.clone());
        let error_stack = serde_json::to_string(
            &event.error.as_ref().map(|e| e.stack.clone()).unwrap_or_default(),
        )?;
        let parameters = serde_json::to_string(&event.parameters)?;

        let conns = self.lock_connections();
        let conn = conns.get(key.as_str()).expect("partition just ensured");
        conn.execute(
            "INSERT OR REPLACE INTO events
                (row_id, program_name, operation_name, succeeded,
                 error_message, error_stack, parameters, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                event.event_id.row,
                event.program_name,
                event.operation_name,
                event.succeeded,
                error_message,
                error_stack,
                parameters,
                event.timestamp.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    /// Retrieve a single archived event by its composite id. Returns
    /// `None` when the partition or the row does not exist.
    pub fn fetch(&self, id: &EventId) -> Result<Option<SystemEvent>> {
        if !self.ensure_partition(&id.partition, false)? {
            return Ok(None);
        }

        let conns = self.lock_connections();
        let conn = conns.get(id.partition.as_str()).expect("partition just ensured");
        let row = conn
            .query_row(
                "SELECT program_name, operation_name, succeeded,
                        error_message, error_stack, parameters, timestamp
                 FROM events WHERE row_id = ?1",
                rusqlite::params![id.row],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((program, operation, succeeded, error_message, error_stack, parameters, ts)) =
            row
        else {
            return Ok(None);
        };

        let timestamp = DateTime::from_timestamp_millis(ts)
            .ok_or_else(|| ArchiveError::InvalidTimestamp(id.to_string()))?;
        let stack: Vec<String> = serde_json::from_str(&error_stack)?;
        let error = error_message.map(|message| CapturedError { message, stack });

        Ok(Some(SystemEvent {
            event_id: id.clone(),
            program_name: program,
            operation_name: operation,
            succeeded,
            error,
            parameters: serde_json::from_str(&parameters)?,
            timestamp,
        }))
    }

    /// Partition keys with a database file on disk, oldest first.
    pub fn list_partitions(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(key) = name.strip_suffix(".db") {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}
