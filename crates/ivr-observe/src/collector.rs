use ivr_types::{EscalationReason, TurnOutcome};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// One completed caller turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRecord {
    pub outcome: TurnOutcome,
    /// From finalized utterance to the response being ready.
    pub latency: Duration,
    /// Label of the guard intervention on this turn, if any.
    pub guard_intervention: Option<&'static str>,
    pub escalation: Option<EscalationReason>,
    /// The turn was produced by the listen timeout rather than caller input.
    pub timed_out: bool,
}

impl TurnRecord {
    pub fn resolved(latency: Duration) -> Self {
        Self::new(TurnOutcome::Resolved, latency)
    }

    pub fn unresolved(latency: Duration) -> Self {
        Self::new(TurnOutcome::Unresolved, latency)
    }

    pub fn escalated(reason: EscalationReason, latency: Duration) -> Self {
        Self {
            escalation: Some(reason),
            ..Self::new(TurnOutcome::Escalated, latency)
        }
    }

    /// A listen timeout, counted as an unresolved turn.
    pub fn timeout() -> Self {
        Self {
            timed_out: true,
            ..Self::new(TurnOutcome::Unresolved, Duration::ZERO)
        }
    }

    pub fn with_guard_intervention(mut self, label: &'static str) -> Self {
        self.guard_intervention = Some(label);
        self
    }

    fn new(outcome: TurnOutcome, latency: Duration) -> Self {
        Self {
            outcome,
            latency,
            guard_intervention: None,
            escalation: None,
            timed_out: false,
        }
    }
}

/// Turn counts per outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub resolved: u64,
    pub unresolved: u64,
    pub escalated: u64,
    pub listen_timeouts: u64,
}

impl OutcomeCounts {
    pub fn total(&self) -> u64 {
        self.resolved + self.unresolved + self.escalated
    }
}

/// Latency over turns that processed caller input.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub count: u64,
    pub mean_ms: f64,
    pub max_ms: f64,
}

/// Point-in-time copy of the aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub active_sessions: u64,
    pub turns: OutcomeCounts,
    pub guard_interventions: BTreeMap<String, u64>,
    pub escalations: BTreeMap<EscalationReason, u64>,
    pub latency: LatencySummary,
}

#[derive(Debug, Default)]
struct Aggregate {
    sessions_opened: u64,
    sessions_closed: u64,
    turns: OutcomeCounts,
    guard_interventions: BTreeMap<&'static str, u64>,
    escalations: BTreeMap<EscalationReason, u64>,
    latency_count: u64,
    latency_total: Duration,
    latency_max: Duration,
}

/// Append-only, process-wide metrics aggregate. Safe to share across
/// sessions behind an `Arc`.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    inner: Mutex<Aggregate>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_session_opened(&self) {
        self.lock().sessions_opened += 1;
    }

    pub fn record_session_closed(&self) {
        self.lock().sessions_closed += 1;
    }

    pub fn record_turn(&self, record: TurnRecord) {
        let mut aggregate = self.lock();
        match record.outcome {
            TurnOutcome::Resolved => aggregate.turns.resolved += 1,
            TurnOutcome::Unresolved => aggregate.turns.unresolved += 1,
            TurnOutcome::Escalated => aggregate.turns.escalated += 1,
        }
        if record.timed_out {
            aggregate.turns.listen_timeouts += 1;
        } else {
            aggregate.latency_count += 1;
            aggregate.latency_total += record.latency;
            aggregate.latency_max = aggregate.latency_max.max(record.latency);
        }
        if let Some(label) = record.guard_intervention {
            *aggregate.guard_interventions.entry(label).or_default() += 1;
        }
        if let Some(reason) = record.escalation {
            *aggregate.escalations.entry(reason).or_default() += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let aggregate = self.lock();
        let mean_ms = if aggregate.latency_count == 0 {
            0.0
        } else {
            aggregate.latency_total.as_secs_f64() * 1000.0 / aggregate.latency_count as f64
        };
        MetricsSnapshot {
            sessions_opened: aggregate.sessions_opened,
            sessions_closed: aggregate.sessions_closed,
            active_sessions: aggregate
                .sessions_opened
                .saturating_sub(aggregate.sessions_closed),
            turns: aggregate.turns.clone(),
            guard_interventions: aggregate
                .guard_interventions
                .iter()
                .map(|(label, count)| (label.to_string(), *count))
                .collect(),
            escalations: aggregate.escalations.clone(),
            latency: LatencySummary {
                count: aggregate.latency_count,
                mean_ms,
                max_ms: aggregate.latency_max.as_secs_f64() * 1000.0,
            },
        }
    }

    /// Emits the current snapshot as a structured log line.
    pub fn log_summary(&self, context: &str) {
        let snapshot = self.snapshot();
        tracing::info!(
            context,
            sessions_opened = snapshot.sessions_opened,
            sessions_closed = snapshot.sessions_closed,
            turns = snapshot.turns.total(),
            resolved = snapshot.turns.resolved,
            unresolved = snapshot.turns.unresolved,
            escalated = snapshot.turns.escalated,
            guard_interventions = snapshot.guard_interventions.values().sum::<u64>(),
            mean_latency_ms = snapshot.latency.mean_ms,
            "metrics summary"
        );
    }

    // A panic while holding the lock leaves counters valid, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Aggregate> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
