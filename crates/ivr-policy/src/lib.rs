//! Policy components that sit around intent resolution.
//!
//! - [`SecurityGuard`] vets every candidate response before it is spoken:
//!   protected values are masked, and responses that omit an authentication
//!   requirement, exceed four steps, or carry the wrong footer are blocked.
//! - [`EscalationDetector`] decides, before any resolution happens, whether
//!   a caller must be handed to a human agent.
//!
//! Both are stateless after construction and shared across sessions.

mod escalation;
mod guard;

pub use escalation::{EscalationConfig, EscalationDecision, EscalationDetector, SessionSignals};
pub use guard::{GuardReason, SecurityGuard, Verdict, MASK};
