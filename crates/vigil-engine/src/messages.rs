use std::collections::VecDeque;
use std::sync::Mutex;
use vigil_common::types::EngineMessage;

/// Bounded ring of diagnostic messages for operator introspection.
///
/// At capacity the oldest entry is dropped; consumers that want every
/// message must drain faster than the engine writes. Never used for
/// alarms.
pub struct EngineMessages {
    ring: Mutex<VecDeque<EngineMessage>>,
    capacity: usize,
}

impl EngineMessages {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, text: impl Into<String>) {
        let message = EngineMessage::now(text);
        tracing::debug!(message = %message.text, "Engine message");
        let mut ring = self.ring.lock().unwrap();
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(message);
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<EngineMessage> {
        self.ring.lock().unwrap().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().unwrap().is_empty()
    }
}
