//! Process-wide metrics for the IVR navigator.
//!
//! Every session appends to one shared [`MetricsCollector`]: turn outcomes,
//! end-to-end turn latency, security guard interventions and escalations.
//! The aggregate is read on demand (the `/api/metrics` endpoint, session
//! close, process shutdown) and never influences session behavior.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ivr_observe::{MetricsCollector, TurnRecord};
//!
//! let metrics = MetricsCollector::new();
//! metrics.record_turn(TurnRecord::resolved(started.elapsed()));
//! tracing::info!(snapshot = ?metrics.snapshot(), "final metrics");
//! ```

mod collector;

pub use collector::{LatencySummary, MetricsCollector, MetricsSnapshot, OutcomeCounts, TurnRecord};

#[cfg(test)]
mod tests;
