use crate::*;
use ivr_types::EscalationReason;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn empty_snapshot() {
    let metrics = MetricsCollector::new();
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot, MetricsSnapshot::default());
    assert_eq!(snapshot.turns.total(), 0);
}

#[test]
fn aggregates_outcomes_and_latency() {
    let metrics = MetricsCollector::new();
    metrics.record_session_opened();
    metrics.record_turn(TurnRecord::resolved(Duration::from_millis(10)));
    metrics.record_turn(
        TurnRecord::resolved(Duration::from_millis(30)).with_guard_intervention("notice_count"),
    );
    metrics.record_turn(TurnRecord::unresolved(Duration::from_millis(20)));
    metrics.record_turn(TurnRecord::timeout());
    metrics.record_turn(TurnRecord::escalated(
        EscalationReason::ConsecutiveUnresolved,
        Duration::from_millis(40),
    ));

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.active_sessions, 1);
    assert_eq!(snapshot.turns.resolved, 2);
    assert_eq!(snapshot.turns.unresolved, 2);
    assert_eq!(snapshot.turns.escalated, 1);
    assert_eq!(snapshot.turns.listen_timeouts, 1);
    assert_eq!(snapshot.turns.total(), 5);
    assert_eq!(snapshot.guard_interventions.get("notice_count"), Some(&1));
    assert_eq!(
        snapshot.escalations.get(&EscalationReason::ConsecutiveUnresolved),
        Some(&1)
    );

    // Timeouts carry no latency.
    assert_eq!(snapshot.latency.count, 4);
    assert!((snapshot.latency.mean_ms - 25.0).abs() < 1e-6);
    assert!((snapshot.latency.max_ms - 40.0).abs() < 1e-6);
}

#[test]
fn concurrent_accumulation() {
    let metrics = Arc::new(MetricsCollector::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let metrics = Arc::clone(&metrics);
            std::thread::spawn(move || {
                metrics.record_session_opened();
                for _ in 0..100 {
                    metrics.record_turn(TurnRecord::resolved(Duration::from_millis(1)));
                }
                metrics.record_session_closed();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.turns.resolved, 800);
    assert_eq!(snapshot.sessions_opened, 8);
    assert_eq!(snapshot.active_sessions, 0);
}

#[test]
fn snapshot_serializes() {
    let metrics = MetricsCollector::new();
    metrics.record_turn(TurnRecord::escalated(
        EscalationReason::AgentRequested,
        Duration::from_millis(5),
    ));
    let json = serde_json::to_value(metrics.snapshot()).unwrap();
    assert_eq!(json["turns"]["escalated"], 1);
    assert_eq!(json["escalations"]["agent_requested"], 1);
}
