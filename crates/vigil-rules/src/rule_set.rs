use crate::AnalyzeRule;
use std::collections::HashMap;
use std::sync::Arc;
use vigil_common::types::SystemEvent;

/// The rules installed for one program, keyed by rule name.
#[derive(Default)]
pub struct RuleSet {
    rules: HashMap<String, Arc<dyn AnalyzeRule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a rule under its name. A displaced rule of the same name is
    /// reset first so its pending timers are cancelled.
    pub fn insert(&mut self, rule: Arc<dyn AnalyzeRule>) {
        let name = rule.rule_name().to_string();
        if let Some(old) = self.rules.insert(name, rule) {
            old.reset();
        }
    }

    /// Reset every rule and empty the set.
    pub fn clear(&mut self) {
        for rule in self.rules.values() {
            rule.reset();
        }
        self.rules.clear();
    }

    pub fn get(&self, rule_name: &str) -> Option<&Arc<dyn AnalyzeRule>> {
        self.rules.get(rule_name)
    }

    /// The subset of rules whose program and operation filter cover the
    /// event.
    pub fn matching(&self, event: &SystemEvent) -> Vec<Arc<dyn AnalyzeRule>> {
        self.rules
            .values()
            .filter(|rule| rule.matches(event))
            .cloned()
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.rules.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
