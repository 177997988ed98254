use crate::analyzer::ProgramAnalyzer;
use crate::config::EngineConfig;
use crate::messages::EngineMessages;
use dashmap::DashMap;
use std::sync::Arc;
use vigil_common::types::RunState;
use vigil_notify::AlarmSink;

/// Concurrent map from program name to its analyzer.
///
/// Insert-or-get is atomic through the map's entry API, so two racing
/// dispatchers observing the same new program end up sharing one analyzer.
#[derive(Default)]
pub struct AnalyzerRegistry {
    analyzers: DashMap<String, Arc<ProgramAnalyzer>>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, program_name: &str) -> Option<Arc<ProgramAnalyzer>> {
        self.analyzers.get(program_name).map(|a| Arc::clone(&a))
    }

    /// Fetch the analyzer for `program_name`, creating a rule-less one on
    /// first sight.
    pub fn get_or_create(
        &self,
        program_name: &str,
        sink: Arc<dyn AlarmSink>,
        messages: Arc<EngineMessages>,
        config: Arc<EngineConfig>,
    ) -> Arc<ProgramAnalyzer> {
        let entry = self
            .analyzers
            .entry(program_name.to_string())
            .or_insert_with(|| {
                tracing::info!(program = %program_name, "Creating analyzer");
                Arc::new(ProgramAnalyzer::new(
                    Some(program_name),
                    sink,
                    messages,
                    config,
                ))
            });
        Arc::clone(&entry)
    }

    /// Best-effort snapshot of (program, state) pairs.
    pub fn snapshot(&self) -> Vec<(String, RunState)> {
        self.analyzers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state()))
            .collect()
    }

    pub fn all(&self) -> Vec<Arc<ProgramAnalyzer>> {
        self.analyzers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }
}
