use crate::AnalyzeRule;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Read-only source of rule definitions, queried at engine startup and on
/// explicit reload.
///
/// Implementations must hand out independent rule instances on every call:
/// evaluation state lives inside the rule, and two analyzers (or two
/// generations of the same analyzer) must never share it.
#[async_trait]
pub trait RuleStorage: Send + Sync {
    async fn get_all_rules(&self) -> Result<Vec<Arc<dyn AnalyzeRule>>>;

    async fn get_rules_for_program(&self, program_name: &str)
        -> Result<Vec<Arc<dyn AnalyzeRule>>>;
}

type RuleFactory = Box<dyn Fn() -> Arc<dyn AnalyzeRule> + Send + Sync>;

/// In-memory [`RuleStorage`] backed by rule factories.
///
/// Registering a factory instead of a rule instance keeps fetches
/// independent: every `get_*` call builds fresh rules with pristine state.
/// Used by tests and by embedders that configure rules in code.
#[derive(Default)]
pub struct MemoryRuleStore {
    factories: Mutex<Vec<RuleFactory>>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, factory: F)
    where
        F: Fn() -> Arc<dyn AnalyzeRule> + Send + Sync + 'static,
    {
        self.factories.lock().unwrap().push(Box::new(factory));
    }

    fn build_all(&self) -> Vec<Arc<dyn AnalyzeRule>> {
        self.factories.lock().unwrap().iter().map(|f| f()).collect()
    }
}

#[async_trait]
impl RuleStorage for MemoryRuleStore {
    async fn get_all_rules(&self) -> Result<Vec<Arc<dyn AnalyzeRule>>> {
        Ok(self.build_all())
    }

    async fn get_rules_for_program(
        &self,
        program_name: &str,
    ) -> Result<Vec<Arc<dyn AnalyzeRule>>> {
        Ok(self
            .build_all()
            .into_iter()
            .filter(|rule| rule.program_name() == program_name)
            .collect())
    }
}
