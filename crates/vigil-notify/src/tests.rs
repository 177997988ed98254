use crate::router::AlarmRouter;
use crate::sinks::MemoryAlarmSink;
use crate::AlarmSink;
use chrono::Utc;
use std::sync::Arc;
use vigil_common::types::{AlarmLevel, AlarmMessage};

fn alarm(level: AlarmLevel, summary: &str) -> AlarmMessage {
    AlarmMessage {
        level,
        program_name: "billing".to_string(),
        summary: summary.to_string(),
        detail: None,
        event_id: None,
        timestamp: Utc::now(),
    }
}

#[tokio::test]
async fn memory_sink_captures_in_order() {
    let sink = MemoryAlarmSink::new();
    sink.raise_alarm(&alarm(AlarmLevel::Low, "first")).await.unwrap();
    sink.raise_alarm(&alarm(AlarmLevel::High, "second")).await.unwrap();

    let captured = sink.alarms();
    assert_eq!(captured.len(), 2);
    assert_eq!(captured[0].summary, "first");
    assert_eq!(captured[1].summary, "second");

    assert_eq!(sink.drain().len(), 2);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn router_filters_by_minimum_level() {
    let everything = Arc::new(MemoryAlarmSink::new());
    let critical_only = Arc::new(MemoryAlarmSink::new());

    let router = AlarmRouter::new()
        .add_route("everything", AlarmLevel::Low, everything.clone())
        .add_route("pager", AlarmLevel::Critical, critical_only.clone());

    router.raise_alarm(&alarm(AlarmLevel::Medium, "warn")).await.unwrap();
    router
        .raise_alarm(&alarm(AlarmLevel::Critical, "page"))
        .await
        .unwrap();

    assert_eq!(everything.len(), 2);
    assert_eq!(critical_only.len(), 1);
    assert_eq!(critical_only.alarms()[0].summary, "page");
}

#[tokio::test]
async fn router_survives_failing_route() {
    struct FailingSink;

    #[async_trait::async_trait]
    impl AlarmSink for FailingSink {
        async fn raise_alarm(&self, _alarm: &AlarmMessage) -> anyhow::Result<()> {
            anyhow::bail!("endpoint unreachable")
        }
    }

    let captured = Arc::new(MemoryAlarmSink::new());
    let router = AlarmRouter::new()
        .add_route("broken", AlarmLevel::Low, Arc::new(FailingSink))
        .add_route("working", AlarmLevel::Low, captured.clone());

    router
        .raise_alarm(&alarm(AlarmLevel::High, "still delivered"))
        .await
        .unwrap();

    assert_eq!(captured.len(), 1);
}
