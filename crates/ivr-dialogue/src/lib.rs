//! Conversation layer of the IVR navigator.
//!
//! - [`ResponseFormatter`] turns a resolved path into a spoken step trace,
//!   vetted by the security guard.
//! - [`NavigationEngine`] bundles the read-only components every session
//!   shares: menu tree, guard, resolver, escalation detector, formatter and
//!   the metrics collector.
//! - [`DialogueSession`] is the per-caller turn state machine.
//! - [`TurnScheduler`] runs a session as a tokio task and owns its timers:
//!   listen timeout, endpointing window, barge-in and the idle bound.
//!
//! Sessions share nothing mutable except the metrics collector.

mod engine;
mod error;
mod events;
mod formatter;
mod scheduler;
mod session;

pub use engine::{EngineConfig, Navigation, NavigationEngine};
pub use error::{FormatError, SessionError};
pub use events::{AgentEvent, CallerEvent, CloseReason, Speaker, TranscriptEntry};
pub use formatter::{RenderedResponse, ResponseFormatter};
pub use scheduler::{SchedulerConfig, TurnScheduler};
pub use session::{DialogueSession, TurnReply};
