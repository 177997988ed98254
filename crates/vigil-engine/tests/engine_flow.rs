//! End-to-end flows through the engine: ingest, dispatch, rule
//! evaluation, alarms, reload, and shutdown draining.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use vigil_common::types::{AlarmLevel, RunState, SystemEvent};
use vigil_engine::{AnalyzerEngine, EngineConfig, EngineError};
use vigil_notify::sinks::MemoryAlarmSink;
use vigil_rules::rules::operation_gap::OperationGapRule;
use vigil_rules::rules::threshold_window::ThresholdWindowRule;
use vigil_rules::storage::MemoryRuleStore;
use vigil_rules::AnalyzeRule;

fn fast_config() -> EngineConfig {
    EngineConfig {
        shutdown_grace_secs: 10,
        dispatch_idle_ms: 5,
        analyzer_idle_ms: 5,
        state_poll_ms: 5,
        ..EngineConfig::default()
    }
}

fn failure(program: &str, operation: &str, at: DateTime<Utc>) -> SystemEvent {
    SystemEvent::failed(program, operation, at, "backend returned 502")
}

async fn wait_until<F: Fn() -> bool>(condition: F, what: &str) {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for: {what}"
        );
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
}

fn pay_burst_store() -> Arc<MemoryRuleStore> {
    let store = Arc::new(MemoryRuleStore::new());
    store.register(|| {
        Arc::new(ThresholdWindowRule::new(
            "pay-failure-burst",
            "X",
            "pay",
            AlarmLevel::High,
            "repeated pay failures",
            3,
            Duration::seconds(60),
            true,
        ))
    });
    store
}

#[tokio::test]
async fn threshold_rule_fires_once_per_burst() {
    let engine = AnalyzerEngine::new(fast_config());
    let sink = Arc::new(MemoryAlarmSink::new());
    engine.start(pay_burst_store(), sink.clone()).await.unwrap();

    let t0 = Utc::now() - Duration::minutes(10);
    let events: Vec<SystemEvent> = (0..4)
        .map(|i| failure("X", "pay", t0 + Duration::seconds(i * 10)))
        .collect();
    let third_id = events[2].event_id.clone();
    engine.enqueue(events).unwrap();

    wait_until(|| !sink.is_empty(), "threshold alarm").await;
    engine.stop().await;

    // One High alarm on the third failure; the fourth is inside cooldown.
    let alarms = sink.alarms();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].level, AlarmLevel::High);
    assert_eq!(alarms[0].program_name, "X");
    assert_eq!(alarms[0].event_id.as_ref(), Some(&third_id));
    assert_eq!(alarms[0].detail.as_deref(), Some("backend returned 502"));
}

#[tokio::test]
async fn operation_filter_keeps_other_operations_silent() {
    let engine = AnalyzerEngine::new(fast_config());
    let sink = Arc::new(MemoryAlarmSink::new());
    engine.start(pay_burst_store(), sink.clone()).await.unwrap();

    let t0 = Utc::now() - Duration::minutes(10);
    let events: Vec<SystemEvent> = (0..4)
        .map(|i| failure("X", "refund", t0 + Duration::seconds(i * 5)))
        .collect();
    engine.enqueue(events).unwrap();

    // Stop drains everything; nothing may have matched.
    engine.stop().await;
    assert!(sink.is_empty());
}

#[tokio::test]
async fn gap_rule_fires_on_late_event() {
    let store = Arc::new(MemoryRuleStore::new());
    store.register(|| {
        Arc::new(OperationGapRule::new(
            "tick-gap",
            "Y",
            "tick",
            AlarmLevel::High,
            "tick stalled",
            Duration::seconds(30),
        ))
    });

    let engine = AnalyzerEngine::new(fast_config());
    let sink = Arc::new(MemoryAlarmSink::new());
    engine.start(store, sink.clone()).await.unwrap();

    let t0 = Utc::now() - Duration::minutes(10);
    let late = SystemEvent::succeeded("Y", "tick", t0 + Duration::seconds(45));
    let late_id = late.event_id.clone();
    engine
        .enqueue(vec![SystemEvent::succeeded("Y", "tick", t0), late])
        .unwrap();

    wait_until(|| !sink.is_empty(), "gap alarm").await;
    engine.stop().await;

    let alarms = sink.alarms();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].event_id.as_ref(), Some(&late_id));
}

#[tokio::test]
async fn gap_rule_fires_on_timer_without_event() {
    let store = Arc::new(MemoryRuleStore::new());
    store.register(|| {
        Arc::new(OperationGapRule::new(
            "tick-gap",
            "Y",
            "tick",
            AlarmLevel::High,
            "tick stalled",
            Duration::milliseconds(80),
        ))
    });

    let engine = AnalyzerEngine::new(fast_config());
    let sink = Arc::new(MemoryAlarmSink::new());
    engine.start(store, sink.clone()).await.unwrap();

    engine
        .enqueue(vec![SystemEvent::succeeded("Y", "tick", Utc::now())])
        .unwrap();

    wait_until(|| !sink.is_empty(), "timeout alarm").await;
    engine.stop().await;

    let alarms = sink.alarms();
    assert_eq!(alarms.len(), 1);
    assert!(alarms[0].event_id.is_none(), "timer alarms carry no event id");
    assert_eq!(alarms[0].program_name, "Y");
}

#[tokio::test]
async fn first_sight_of_a_program_creates_its_analyzer() {
    let engine = AnalyzerEngine::new(fast_config());
    let sink = Arc::new(MemoryAlarmSink::new());
    let store = Arc::new(MemoryRuleStore::new());
    engine.start(store.clone(), sink.clone()).await.unwrap();

    assert!(engine.list_analyzers().is_empty());
    engine
        .enqueue(vec![SystemEvent::succeeded("Z", "boot", Utc::now())])
        .unwrap();

    wait_until(
        || {
            engine
                .list_analyzers()
                .iter()
                .any(|(program, state)| program == "Z" && *state == RunState::Running)
        },
        "analyzer Z running",
    )
    .await;
    assert!(sink.is_empty());

    // Rules appear in storage later; a reload installs them without
    // tearing the analyzer down for good.
    store.register(|| {
        Arc::new(ThresholdWindowRule::new(
            "boot-failures",
            "Z",
            "boot",
            AlarmLevel::Medium,
            "boot failures",
            1,
            Duration::seconds(60),
            true,
        ))
    });
    engine.reload_rules("Z").await.unwrap();

    engine
        .enqueue(vec![failure("Z", "boot", Utc::now())])
        .unwrap();
    wait_until(|| !sink.is_empty(), "boot failure alarm").await;
    engine.stop().await;
}

#[tokio::test]
async fn stop_drains_every_queued_event() {
    // The rule counts every event; a single alarm on the 1000th proves
    // none were lost in the shutdown.
    let store = Arc::new(MemoryRuleStore::new());
    store.register(|| {
        Arc::new(ThresholdWindowRule::new(
            "volume",
            "W",
            "",
            AlarmLevel::Low,
            "thousand events observed",
            1000,
            Duration::hours(1),
            false,
        ))
    });

    let engine = AnalyzerEngine::new(fast_config());
    let sink = Arc::new(MemoryAlarmSink::new());
    engine.start(store, sink.clone()).await.unwrap();

    let t0 = Utc::now() - Duration::minutes(5);
    let events: Vec<SystemEvent> = (0..1000)
        .map(|i| SystemEvent::succeeded("W", "work", t0 + Duration::milliseconds(i)))
        .collect();
    engine.enqueue(events).unwrap();
    engine.stop().await;

    assert_eq!(engine.state(), RunState::Stopped);
    assert!(engine
        .list_analyzers()
        .iter()
        .all(|(_, state)| *state == RunState::Stopped));
    assert_eq!(sink.len(), 1, "the 1000th event fired the counting rule");
}

#[tokio::test]
async fn per_program_order_is_preserved() {
    struct RecordingRule {
        program: String,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl AnalyzeRule for RecordingRule {
        fn rule_name(&self) -> &str {
            "recorder"
        }
        fn program_name(&self) -> &str {
            &self.program
        }
        fn operation_name(&self) -> &str {
            ""
        }
        fn alarm_level(&self) -> AlarmLevel {
            AlarmLevel::Low
        }
        fn alarm_message(&self) -> &str {
            "recorder"
        }
        fn add_and_check(&self, event: &SystemEvent) -> bool {
            self.seen.lock().unwrap().push(event.operation_name.clone());
            false
        }
        fn reset(&self) {
            self.seen.lock().unwrap().clear();
        }
    }

    let seen_a = Arc::new(Mutex::new(Vec::new()));
    let seen_b = Arc::new(Mutex::new(Vec::new()));
    let store = Arc::new(MemoryRuleStore::new());
    {
        let seen_a = seen_a.clone();
        store.register(move || {
            Arc::new(RecordingRule {
                program: "A".to_string(),
                seen: seen_a.clone(),
            })
        });
    }
    {
        let seen_b = seen_b.clone();
        store.register(move || {
            Arc::new(RecordingRule {
                program: "B".to_string(),
                seen: seen_b.clone(),
            })
        });
    }

    let engine = AnalyzerEngine::new(fast_config());
    let sink = Arc::new(MemoryAlarmSink::new());
    engine.start(store, sink.clone()).await.unwrap();

    // Interleave two programs; each must keep its own order.
    let now = Utc::now();
    let mut events = Vec::new();
    for i in 0..50 {
        events.push(SystemEvent::succeeded("A", &format!("a{i}"), now));
        events.push(SystemEvent::succeeded("B", &format!("b{i}"), now));
    }
    engine.enqueue(events).unwrap();
    engine.stop().await;

    let expected_a: Vec<String> = (0..50).map(|i| format!("a{i}")).collect();
    let expected_b: Vec<String> = (0..50).map(|i| format!("b{i}")).collect();
    assert_eq!(*seen_a.lock().unwrap(), expected_a);
    assert_eq!(*seen_b.lock().unwrap(), expected_b);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn enqueue_outside_running_is_rejected() {
    let engine = AnalyzerEngine::new(fast_config());
    let event = SystemEvent::succeeded("X", "pay", Utc::now());

    let err = engine.enqueue(vec![event.clone()]).unwrap_err();
    assert!(matches!(err, EngineError::NotRunning));

    let sink = Arc::new(MemoryAlarmSink::new());
    engine
        .start(Arc::new(MemoryRuleStore::new()), sink)
        .await
        .unwrap();
    engine.enqueue(vec![event.clone()]).unwrap();
    engine.stop().await;

    assert!(matches!(
        engine.enqueue(vec![event]).unwrap_err(),
        EngineError::NotRunning
    ));
}

#[tokio::test]
async fn reload_after_stop_is_rejected() {
    let engine = AnalyzerEngine::new(fast_config());
    let sink = Arc::new(MemoryAlarmSink::new());
    let store = Arc::new(MemoryRuleStore::new());

    // Never started: nothing to reload into.
    assert!(matches!(
        engine.reload_rules("X").await.unwrap_err(),
        EngineError::NotRunning
    ));

    engine.start(store, sink).await.unwrap();
    engine.stop().await;

    // Stopped again: a reload here would spawn an analyzer task that no
    // later shutdown would ever reach.
    assert!(matches!(
        engine.reload_rules("X").await.unwrap_err(),
        EngineError::NotRunning
    ));
    assert!(engine
        .list_analyzers()
        .iter()
        .all(|(_, state)| *state == RunState::Stopped));
}

#[tokio::test]
async fn start_twice_is_a_usage_error() {
    let engine = AnalyzerEngine::new(fast_config());
    let sink = Arc::new(MemoryAlarmSink::new());
    let store = Arc::new(MemoryRuleStore::new());

    engine.start(store.clone(), sink.clone()).await.unwrap();
    let err = engine.start(store, sink).await.unwrap_err();
    assert!(matches!(err, EngineError::NotStopped(RunState::Running)));
    engine.stop().await;
}

#[tokio::test]
async fn ingest_capacity_rejects_overflowing_batch() {
    let config = EngineConfig {
        ingest_capacity: Some(3),
        ..fast_config()
    };
    let engine = AnalyzerEngine::new(config);
    let sink = Arc::new(MemoryAlarmSink::new());
    engine
        .start(Arc::new(MemoryRuleStore::new()), sink)
        .await
        .unwrap();

    let now = Utc::now();
    let batch: Vec<SystemEvent> = (0..4)
        .map(|_| SystemEvent::succeeded("X", "pay", now))
        .collect();
    let err = engine.enqueue(batch).unwrap_err();
    assert!(matches!(err, EngineError::QueueFull { capacity: 3 }));
    engine.stop().await;
}

#[tokio::test]
async fn reload_replaces_rule_set_with_storage_contents() {
    let store = Arc::new(MemoryRuleStore::new());
    store.register(|| {
        Arc::new(ThresholdWindowRule::new(
            "pay-failure-burst",
            "X",
            "pay",
            AlarmLevel::High,
            "repeated pay failures",
            3,
            Duration::seconds(60),
            true,
        ))
    });

    let engine = AnalyzerEngine::new(fast_config());
    let sink = Arc::new(MemoryAlarmSink::new());
    engine.start(store.clone(), sink.clone()).await.unwrap();

    // Second generation of rules: a stricter burst rule joins the first.
    store.register(|| {
        Arc::new(ThresholdWindowRule::new(
            "refund-failure-burst",
            "X",
            "refund",
            AlarmLevel::Critical,
            "repeated refund failures",
            2,
            Duration::seconds(60),
            true,
        ))
    });
    engine.reload_rules("X").await.unwrap();

    wait_until(
        || {
            engine
                .list_analyzers()
                .iter()
                .any(|(program, state)| program == "X" && *state == RunState::Running)
        },
        "analyzer X running after reload",
    )
    .await;

    let t0 = Utc::now() - Duration::minutes(10);
    engine
        .enqueue(vec![
            failure("X", "refund", t0),
            failure("X", "refund", t0 + Duration::seconds(5)),
        ])
        .unwrap();
    wait_until(|| !sink.is_empty(), "refund alarm").await;
    engine.stop().await;

    let alarms = sink.alarms();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].level, AlarmLevel::Critical);
}

#[tokio::test]
async fn engine_messages_record_lifecycle() {
    let engine = AnalyzerEngine::new(fast_config());
    let sink = Arc::new(MemoryAlarmSink::new());
    engine
        .start(Arc::new(MemoryRuleStore::new()), sink)
        .await
        .unwrap();
    engine.stop().await;

    let texts: Vec<String> = engine
        .engine_messages()
        .into_iter()
        .map(|m| m.text)
        .collect();
    assert!(texts.iter().any(|t| t.contains("no rules in storage")));
    assert!(texts.iter().any(|t| t.contains("engine started")));
    assert!(texts.iter().any(|t| t.contains("engine stopped")));
}
