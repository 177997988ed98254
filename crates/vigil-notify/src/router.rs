use crate::AlarmSink;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use vigil_common::types::{AlarmLevel, AlarmMessage};

/// One routed destination: a sink plus the minimum level it cares about.
struct Route {
    name: String,
    min_level: AlarmLevel,
    sink: Arc<dyn AlarmSink>,
}

/// Fans a single alarm out to several sinks, filtering each by a minimum
/// level. A failing sink is logged and skipped; the remaining routes still
/// receive the alarm.
#[derive(Default)]
pub struct AlarmRouter {
    routes: Vec<Route>,
}

impl AlarmRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a destination. `name` only appears in logs.
    pub fn add_route(mut self, name: &str, min_level: AlarmLevel, sink: Arc<dyn AlarmSink>) -> Self {
        self.routes.push(Route {
            name: name.to_string(),
            min_level,
            sink,
        });
        self
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}

#[async_trait]
impl AlarmSink for AlarmRouter {
    async fn raise_alarm(&self, alarm: &AlarmMessage) -> Result<()> {
        for route in &self.routes {
            if alarm.level < route.min_level {
                continue;
            }
            if let Err(e) = route.sink.raise_alarm(alarm).await {
                tracing::error!(
                    route = %route.name,
                    program = %alarm.program_name,
                    error = %e,
                    "Failed to deliver alarm"
                );
            }
        }
        Ok(())
    }
}
