//! Turn-Taking Scheduler: the timing half of a session.
//!
//! Runs one [`DialogueSession`] as a tokio task. It owns every timer
//! (listen timeout, endpointing window, delivery watchdog, idle bound) and
//! delivers responses one segment at a time so a barge-in can drop the rest.

use crate::error::SessionError;
use crate::events::{AgentEvent, CallerEvent, CloseReason};
use crate::formatter::RenderedResponse;
use crate::session::{DialogueSession, TurnReply};
use ivr_types::{CallerUtterance, EscalationReason, Language, TurnState};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

const WATCHDOG_GRACE: Duration = Duration::from_secs(1);

/// Turn timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Silence allowed in LISTENING before the caller is re-prompted.
    pub listen_timeout_secs: f64,
    /// Endpointing delay when the end-of-turn detector is confident.
    pub min_endpointing_delay_secs: f64,
    /// Endpointing delay when the end-of-turn signal is absent or uncertain.
    pub max_endpointing_delay_secs: f64,
    /// End-of-turn confidence at or above which the short delay applies.
    pub end_of_turn_threshold: f32,
    /// Caller inactivity that closes the session.
    pub idle_timeout_secs: f64,
    /// Assumed synthesis speed, for the delivery watchdog.
    pub speech_chars_per_second: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            listen_timeout_secs: 5.0,
            min_endpointing_delay_secs: 0.5,
            max_endpointing_delay_secs: 5.0,
            end_of_turn_threshold: 0.6,
            idle_timeout_secs: 300.0,
            speech_chars_per_second: 15.0,
        }
    }
}

impl SchedulerConfig {
    pub fn listen_timeout(&self) -> Duration {
        secs(self.listen_timeout_secs)
    }

    /// The endpointing window for a fragment with this end-of-turn confidence.
    pub fn endpointing_delay(&self, end_of_turn_confidence: f32) -> Duration {
        if end_of_turn_confidence >= self.end_of_turn_threshold {
            secs(self.min_endpointing_delay_secs)
        } else {
            secs(self.max_endpointing_delay_secs)
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        secs(self.idle_timeout_secs)
    }

    /// How long a segment may take before it is presumed delivered.
    fn watchdog(&self, text: &str) -> Duration {
        let rate = self.speech_chars_per_second.max(1.0);
        secs(text.chars().count() as f64 / rate) + WATCHDOG_GRACE
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// What follows the end of a delivery.
#[derive(Debug, Clone, Copy)]
enum AfterSpeech {
    Listen,
    Transfer(EscalationReason),
}

enum Phase {
    Listening {
        deadline: Instant,
    },
    /// A fragment arrived; waiting to see whether the caller continues.
    Endpointing {
        pending: CallerUtterance,
        deadline: Instant,
    },
    Speaking {
        queue: VecDeque<String>,
        language: Language,
        awaiting: u64,
        watchdog: Instant,
        after: AfterSpeech,
    },
    Done,
}

impl Phase {
    fn deadline(&self) -> Option<Instant> {
        match self {
            Self::Listening { deadline } | Self::Endpointing { deadline, .. } => Some(*deadline),
            Self::Speaking { watchdog, .. } => Some(*watchdog),
            Self::Done => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Listening { .. } => "listening",
            Self::Endpointing { .. } => "endpointing",
            Self::Speaking { .. } => "speaking",
            Self::Done => "done",
        }
    }
}

/// Drives one session from greeting to close.
pub struct TurnScheduler {
    session: DialogueSession,
    config: SchedulerConfig,
    events: mpsc::Receiver<CallerEvent>,
    out: mpsc::Sender<AgentEvent>,
    cancel: CancellationToken,
    phase: Phase,
    seq: u64,
    idle_deadline: Instant,
}

impl TurnScheduler {
    pub fn new(
        session: DialogueSession,
        config: SchedulerConfig,
        events: mpsc::Receiver<CallerEvent>,
        out: mpsc::Sender<AgentEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let idle_deadline = Instant::now() + config.idle_timeout();
        Self {
            session,
            config,
            events,
            out,
            cancel,
            phase: Phase::Done,
            seq: 0,
            idle_deadline,
        }
    }

    /// Greets the caller and runs until the session closes. Returns the
    /// closed session for inspection.
    pub async fn run(mut self) -> DialogueSession {
        let session_id = self.session.id();
        tracing::debug!(session_id = %session_id, "scheduler started");

        match self.session.greet() {
            Ok(greeting) => self.speak(greeting, AfterSpeech::Listen).await,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "failed to greet caller");
                self.close(CloseReason::Shutdown).await;
            }
        }

        while !matches!(self.phase, Phase::Done) {
            let deadline = self.phase.deadline();
            let idle_deadline = self.idle_deadline;
            tokio::select! {
                () = self.cancel.cancelled() => self.close(CloseReason::Shutdown).await,
                event = self.events.recv() => match event {
                    Some(event) => self.on_event(event).await,
                    None => self.close(CloseReason::CallerDisconnected).await,
                },
                () = sleep_until_or_never(deadline) => self.on_deadline().await,
                () = sleep_until(idle_deadline) => {
                    tracing::info!(session_id = %session_id, "caller idle, closing session");
                    self.close(CloseReason::IdleTimeout).await;
                }
            }
        }

        tracing::debug!(session_id = %session_id, "scheduler stopped");
        self.session
    }

    async fn on_event(&mut self, event: CallerEvent) {
        if !matches!(event, CallerEvent::PlaybackFinished { .. }) {
            self.idle_deadline = Instant::now() + self.config.idle_timeout();
        }

        match event {
            CallerEvent::Disconnect => self.close(CloseReason::CallerDisconnected).await,
            CallerEvent::PlaybackFinished { seq } => {
                if matches!(self.phase, Phase::Speaking { awaiting, .. } if awaiting == seq) {
                    self.deliver_next().await;
                }
            }
            CallerEvent::SpeechOnset => {
                let listen = Instant::now() + self.config.listen_timeout();
                let endpoint = Instant::now() + self.config.endpointing_delay(0.0);
                match &mut self.phase {
                    Phase::Listening { deadline } => *deadline = listen,
                    Phase::Endpointing { deadline, .. } => *deadline = endpoint,
                    Phase::Speaking { .. } | Phase::Done => {}
                }
                self.interrupt().await;
            }
            CallerEvent::Dtmf { key } => {
                self.interrupt().await;
                let mut utterance = match std::mem::replace(&mut self.phase, Phase::Done) {
                    Phase::Endpointing { pending, .. } => pending,
                    Phase::Done => return,
                    _ => CallerUtterance::default(),
                };
                utterance.merge(CallerUtterance::keypad(key));
                self.finalize(utterance).await;
            }
            CallerEvent::Utterance(utterance) => {
                if utterance.is_empty() {
                    return;
                }
                self.interrupt().await;
                let delay = self.config.endpointing_delay(utterance.end_of_turn_confidence);
                let deadline = Instant::now() + delay;
                self.phase = match std::mem::replace(&mut self.phase, Phase::Done) {
                    Phase::Endpointing { mut pending, .. } => {
                        pending.merge(utterance);
                        Phase::Endpointing { pending, deadline }
                    }
                    Phase::Listening { .. } => Phase::Endpointing {
                        pending: utterance,
                        deadline,
                    },
                    other => other,
                };
            }
        }
    }

    async fn on_deadline(&mut self) {
        match std::mem::replace(&mut self.phase, Phase::Done) {
            Phase::Listening { .. } => match self.session.listen_timeout() {
                Ok(reply) => self.reply(reply).await,
                Err(e) => self.recover(e).await,
            },
            Phase::Endpointing { pending, .. } => self.finalize(pending).await,
            phase @ Phase::Speaking { .. } => {
                self.phase = phase;
                self.deliver_next().await;
            }
            Phase::Done => {}
        }
    }

    async fn finalize(&mut self, utterance: CallerUtterance) {
        match self.session.process_turn(&utterance) {
            Ok(reply) => self.reply(reply).await,
            Err(e) => self.recover(e).await,
        }
    }

    async fn reply(&mut self, reply: TurnReply) {
        let after = match reply.escalation {
            Some(reason) => AfterSpeech::Transfer(reason),
            None => AfterSpeech::Listen,
        };
        self.speak(reply.response, after).await;
    }

    async fn recover(&mut self, error: SessionError) {
        tracing::warn!(
            session_id = %self.session.id(),
            state = %self.session.state(),
            error = %error,
            "turn failed"
        );
        if self.session.state().is_terminal() {
            self.close(CloseReason::Shutdown).await;
        } else {
            self.listen();
        }
    }

    async fn speak(&mut self, response: RenderedResponse, after: AfterSpeech) {
        self.phase = Phase::Speaking {
            queue: response.segments.into(),
            language: response.language,
            awaiting: self.seq,
            watchdog: Instant::now(),
            after,
        };
        self.deliver_next().await;
    }

    /// Sends the next queued segment, or ends the delivery.
    async fn deliver_next(&mut self) {
        let Phase::Speaking {
            queue,
            language,
            awaiting,
            watchdog,
            after,
        } = &mut self.phase
        else {
            return;
        };

        let Some(text) = queue.pop_front() else {
            let after = *after;
            self.finish_delivery(after).await;
            return;
        };

        self.seq += 1;
        *awaiting = self.seq;
        *watchdog = Instant::now() + self.config.watchdog(&text);
        let event = AgentEvent::Say {
            seq: self.seq,
            language: *language,
            text,
        };
        self.send(event).await;
    }

    async fn finish_delivery(&mut self, after: AfterSpeech) {
        match after {
            AfterSpeech::Listen => {
                if self.session.state() == TurnState::Speaking {
                    if let Err(e) = self.session.finish_speaking() {
                        tracing::warn!(error = %e, "failed to leave SPEAKING");
                    }
                }
                self.listen();
            }
            AfterSpeech::Transfer(reason) => {
                let transcript = self.session.transcript().to_vec();
                tracing::info!(
                    session_id = %self.session.id(),
                    reason = %reason,
                    "handing caller to an agent"
                );
                self.send(AgentEvent::TransferToAgent { reason, transcript })
                    .await;
                self.close(CloseReason::Transferred).await;
            }
        }
    }

    /// Barge-in: cancels the delivery in progress and drops what is left.
    async fn interrupt(&mut self) {
        let Phase::Speaking { queue, after, .. } = &self.phase else {
            return;
        };
        let after = *after;
        tracing::debug!(
            session_id = %self.session.id(),
            dropped_segments = queue.len(),
            "caller interrupted delivery"
        );
        self.send(AgentEvent::CancelSpeech).await;
        match after {
            AfterSpeech::Listen => {
                if self.session.state() == TurnState::Speaking {
                    if let Err(e) = self.session.barge_in() {
                        tracing::warn!(error = %e, "failed to leave SPEAKING");
                    }
                }
                self.listen();
            }
            AfterSpeech::Transfer(_) => self.finish_delivery(after).await,
        }
    }

    fn listen(&mut self) {
        self.phase = Phase::Listening {
            deadline: Instant::now() + self.config.listen_timeout(),
        };
    }

    async fn send(&mut self, event: AgentEvent) {
        if self.out.send(event).await.is_err() && !matches!(self.phase, Phase::Done) {
            tracing::info!(
                session_id = %self.session.id(),
                phase = self.phase.label(),
                "transport gone, closing session"
            );
            self.shut(CloseReason::CallerDisconnected);
        }
    }

    async fn close(&mut self, reason: CloseReason) {
        if self.session.state() == TurnState::Closed {
            return;
        }
        self.shut(reason);
        let _ = self.out.send(AgentEvent::Closed { reason }).await;
    }

    fn shut(&mut self, reason: CloseReason) {
        self.phase = Phase::Done;
        if let Err(e) = self.session.close(reason) {
            tracing::warn!(session_id = %self.session.id(), error = %e, "failed to close session");
        }
    }
}

async fn sleep_until_or_never(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
