//! Dialogue Session: the per-caller turn state machine.
//!
//! ```text
//! IDLE -> LISTENING -> PROCESSING -> {SPEAKING, ESCALATED}
//! SPEAKING -> LISTENING
//! any non-terminal -> CLOSED
//! ```
//!
//! A session owns no timers. The [`TurnScheduler`](crate::TurnScheduler)
//! decides *when* each transition happens; the session decides *what* is said.

use crate::engine::{Navigation, NavigationEngine};
use crate::error::SessionError;
use crate::events::{CloseReason, Speaker, TranscriptEntry};
use crate::formatter::RenderedResponse;
use ivr_menu::MenuNode;
use ivr_observe::TurnRecord;
use ivr_policy::{EscalationDecision, SessionSignals};
use ivr_types::{CallerUtterance, EscalationReason, Language, NodeKind, TurnOutcome, TurnState};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// What one caller turn produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReply {
    /// Text to speak next.
    pub response: RenderedResponse,
    pub outcome: TurnOutcome,
    pub escalation: Option<EscalationReason>,
}

/// One caller's conversation. Never shared between callers.
#[derive(Debug)]
pub struct DialogueSession {
    id: Uuid,
    engine: Arc<NavigationEngine>,
    state: TurnState,
    language: Option<Language>,
    consecutive_unresolved: u32,
    /// The menu the caller is positioned in for keypad input.
    current_menu: Option<String>,
    last_response: Option<RenderedResponse>,
    transcript: Vec<TranscriptEntry>,
    escalation: Option<EscalationReason>,
    close_reason: Option<CloseReason>,
}

impl DialogueSession {
    pub fn new(engine: Arc<NavigationEngine>) -> Self {
        let id = Uuid::new_v4();
        engine.metrics().record_session_opened();
        tracing::info!(session_id = %id, "session opened");
        Self {
            id,
            engine,
            state: TurnState::Idle,
            language: None,
            consecutive_unresolved: 0,
            current_menu: None,
            last_response: None,
            transcript: Vec::new(),
            escalation: None,
            close_reason: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// The caller's selected language, once chosen.
    pub fn language(&self) -> Option<Language> {
        self.language
    }

    pub fn consecutive_unresolved(&self) -> u32 {
        self.consecutive_unresolved
    }

    pub fn current_menu(&self) -> Option<&str> {
        self.current_menu.as_deref()
    }

    pub fn last_response(&self) -> Option<&RenderedResponse> {
        self.last_response.as_ref()
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn escalation(&self) -> Option<EscalationReason> {
        self.escalation
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    /// The language responses are rendered in right now.
    pub fn speaking_language(&self) -> Language {
        self.language
            .unwrap_or_else(|| self.engine.tree().default_language())
    }

    /// What the human agent receives, once the session has escalated.
    pub fn handoff(&self) -> Option<(EscalationReason, Vec<TranscriptEntry>)> {
        self.escalation
            .map(|reason| (reason, self.transcript.clone()))
    }

    /// Opens the call: IDLE -> SPEAKING with the greeting.
    pub fn greet(&mut self) -> Result<RenderedResponse, SessionError> {
        self.transition(TurnState::Speaking)?;
        let greeting = self.engine.formatter().greeting(self.speaking_language());
        self.note(Speaker::Navigator, &greeting.text);
        Ok(greeting)
    }

    /// A finalized utterance arrived: LISTENING -> PROCESSING. A caller who
    /// speaks before the greeting moves straight from IDLE.
    pub fn begin_processing(&mut self) -> Result<(), SessionError> {
        if self.state == TurnState::Idle {
            self.transition(TurnState::Listening)?;
        }
        self.transition(TurnState::Processing)
    }

    /// Runs one turn: escalation check, keypad handling, then resolution,
    /// guard and rendering.
    ///
    /// Ends in SPEAKING, ESCALATED, or LISTENING when the guard blocked the
    /// rendering and the fixed fallback is spoken instead.
    pub fn process_turn(&mut self, utterance: &CallerUtterance) -> Result<TurnReply, SessionError> {
        if self.state != TurnState::Processing {
            self.begin_processing()?;
        }
        let started = Instant::now();
        self.note_caller(utterance);

        if let EscalationDecision::Escalate(reason) =
            self.engine.detector().evaluate(utterance, &*self)
        {
            return self.escalate_turn(reason, started);
        }

        if let Some(key) = utterance.dtmf {
            return self.keypad(key, started);
        }

        if utterance.text.trim().is_empty() {
            return self.unresolved(started);
        }

        let engine = self.engine.clone();
        match engine.navigate(&utterance.text, &utterance.slots, self.language) {
            Ok(Navigation::Resolved {
                node_id,
                language,
                confidence,
                response,
            }) => {
                tracing::info!(
                    session_id = %self.id,
                    node_id = %node_id,
                    confidence,
                    language = %language,
                    "turn resolved"
                );
                // The root sits above every language subtree and selects none.
                if let Ok(MenuNode {
                    language: Some(selected),
                    ..
                }) = engine.tree().lookup(&node_id)
                {
                    self.language = Some(*selected);
                }
                self.position_at(&node_id);
                self.resolved(response, started)
            }
            Ok(Navigation::Unresolved) => self.unresolved(started),
            Ok(Navigation::Blocked(reason)) => self.blocked(reason.label(), started),
            Err(e) => {
                tracing::error!(session_id = %self.id, error = %e, "rendering failed");
                self.blocked("format_error", started)
            }
        }
    }

    /// The caller stayed silent through the listen timeout.
    ///
    /// Counts as an unresolved turn and re-enters LISTENING with a prompt,
    /// unless the caller has already failed too often, which escalates.
    ///
    /// Silence therefore transfers a caller after the unresolved limit plus
    /// one listen timeouts, long before the scheduler's idle bound. The idle
    /// close is the backstop for a listen timeout configured longer than the
    /// idle bound.
    pub fn listen_timeout(&mut self) -> Result<TurnReply, SessionError> {
        self.transition(TurnState::Processing)?;
        if self.consecutive_unresolved >= self.engine.detector().config().consecutive_unresolved_limit
        {
            return self.escalate_turn(EscalationReason::ConsecutiveUnresolved, Instant::now());
        }

        self.consecutive_unresolved += 1;
        self.engine.metrics().record_turn(TurnRecord::timeout());
        tracing::info!(
            session_id = %self.id,
            consecutive_unresolved = self.consecutive_unresolved,
            "listen timeout"
        );
        let response = self.engine.formatter().timeout_prompt(self.speaking_language());
        self.note(Speaker::Navigator, &response.text);
        self.transition(TurnState::Listening)?;
        Ok(TurnReply {
            response,
            outcome: TurnOutcome::Unresolved,
            escalation: None,
        })
    }

    /// Delivery completed: SPEAKING -> LISTENING.
    pub fn finish_speaking(&mut self) -> Result<(), SessionError> {
        self.transition(TurnState::Listening)
    }

    /// The caller spoke over the response: SPEAKING -> LISTENING. Only the
    /// delivery is abandoned; session state is kept.
    pub fn barge_in(&mut self) -> Result<(), SessionError> {
        tracing::debug!(session_id = %self.id, "barge-in");
        self.transition(TurnState::Listening)
    }

    /// PROCESSING -> ESCALATED. No further resolution happens afterwards.
    pub fn escalate(&mut self, reason: EscalationReason) -> Result<RenderedResponse, SessionError> {
        self.transition(TurnState::Escalated)?;
        self.escalation = Some(reason);
        tracing::info!(session_id = %self.id, reason = %reason, "session escalated");
        let response = self.engine.formatter().transfer(self.speaking_language());
        self.note(Speaker::Navigator, &response.text);
        Ok(response)
    }

    /// Ends the session. Closing twice is a no-op.
    pub fn close(&mut self, reason: CloseReason) -> Result<(), SessionError> {
        if self.state == TurnState::Closed {
            return Ok(());
        }
        self.transition(TurnState::Closed)?;
        self.close_reason = Some(reason);
        let metrics = self.engine.metrics();
        metrics.record_session_closed();
        tracing::info!(
            session_id = %self.id,
            reason = reason.label(),
            transcript_entries = self.transcript.len(),
            "session closed"
        );
        metrics.log_summary("session_closed");
        Ok(())
    }

    fn keypad(&mut self, key: char, started: Instant) -> Result<TurnReply, SessionError> {
        let tree = self.engine.tree().clone();
        let menu_id = self
            .current_menu
            .clone()
            .unwrap_or_else(|| tree.root().id.clone());

        let selected = match key {
            '*' => None,
            '#' => Some(tree.lookup(&menu_id)?.parent.clone().unwrap_or(menu_id.clone())),
            _ => {
                let selector = key.to_string();
                let child = tree
                    .children_of(&menu_id)?
                    .into_iter()
                    .find(|child| child.selector.as_deref() == Some(selector.as_str()));
                match child {
                    None => return self.unresolved(started),
                    Some(child) => match child.kind {
                        NodeKind::AgentTransfer => {
                            return self.escalate_turn(EscalationReason::AgentRequested, started)
                        }
                        NodeKind::Repeat => None,
                        NodeKind::Return => {
                            Some(tree.lookup(&menu_id)?.parent.clone().unwrap_or(menu_id.clone()))
                        }
                        _ => Some(child.id.clone()),
                    },
                }
            }
        };

        let target = match selected {
            Some(id) => id,
            None => match self.last_response.clone() {
                Some(response) => return self.resolved(response, started),
                None => menu_id,
            },
        };

        let node = tree.lookup(&target)?;
        if let Some(language) = node.language {
            self.language = Some(language);
        }
        tracing::debug!(session_id = %self.id, key = %key, node_id = %target, "keypad selection");
        match self.engine.render_node(&target, self.speaking_language()) {
            Ok(response) => {
                self.position_at(&target);
                self.resolved(response, started)
            }
            Err(e) => {
                tracing::warn!(session_id = %self.id, node_id = %target, error = %e, "keypad rendering failed");
                self.blocked("format_error", started)
            }
        }
    }

    fn escalate_turn(
        &mut self,
        reason: EscalationReason,
        started: Instant,
    ) -> Result<TurnReply, SessionError> {
        let response = self.escalate(reason)?;
        self.engine
            .metrics()
            .record_turn(TurnRecord::escalated(reason, started.elapsed()));
        Ok(TurnReply {
            response,
            outcome: TurnOutcome::Escalated,
            escalation: Some(reason),
        })
    }

    fn resolved(
        &mut self,
        response: RenderedResponse,
        started: Instant,
    ) -> Result<TurnReply, SessionError> {
        self.transition(TurnState::Speaking)?;
        self.consecutive_unresolved = 0;
        let mut record = TurnRecord::resolved(started.elapsed());
        if let Some(label) = response.guard_intervention {
            record = record.with_guard_intervention(label);
        }
        self.engine.metrics().record_turn(record);
        self.note(Speaker::Navigator, &response.text);
        self.last_response = Some(response.clone());
        Ok(TurnReply {
            response,
            outcome: TurnOutcome::Resolved,
            escalation: None,
        })
    }

    fn unresolved(&mut self, started: Instant) -> Result<TurnReply, SessionError> {
        self.transition(TurnState::Speaking)?;
        self.consecutive_unresolved += 1;
        tracing::info!(
            session_id = %self.id,
            consecutive_unresolved = self.consecutive_unresolved,
            "turn unresolved"
        );
        self.engine
            .metrics()
            .record_turn(TurnRecord::unresolved(started.elapsed()));
        let response = self.engine.formatter().reprompt(self.speaking_language());
        self.note(Speaker::Navigator, &response.text);
        Ok(TurnReply {
            response,
            outcome: TurnOutcome::Unresolved,
            escalation: None,
        })
    }

    /// The guard vetoed the answer: speak the fallback, back to LISTENING at
    /// the main menu.
    fn blocked(&mut self, label: &'static str, started: Instant) -> Result<TurnReply, SessionError> {
        self.transition(TurnState::Listening)?;
        self.engine.metrics().record_turn(
            TurnRecord::unresolved(started.elapsed()).with_guard_intervention(label),
        );
        let language = self.speaking_language();
        self.current_menu = self
            .engine
            .tree()
            .language_node(language)
            .map(|node| node.id.clone());
        let response = self.engine.formatter().fallback(language);
        self.note(Speaker::Navigator, &response.text);
        Ok(TurnReply {
            response,
            outcome: TurnOutcome::Unresolved,
            escalation: None,
        })
    }

    /// Keypad context follows the last match: a menu itself, or the menu
    /// holding a leaf.
    fn position_at(&mut self, node_id: &str) {
        let menu = match self.engine.tree().lookup(node_id) {
            Ok(node) if node.kind.is_selection_point() => Some(node.id.clone()),
            Ok(MenuNode { parent, .. }) => parent.clone(),
            Err(_) => None,
        };
        self.current_menu = menu;
    }

    fn transition(&mut self, next: TurnState) -> Result<(), SessionError> {
        if !self.state.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(session_id = %self.id, from = %self.state, to = %next, "state transition");
        self.state = next;
        Ok(())
    }

    fn note_caller(&mut self, utterance: &CallerUtterance) {
        let text = match (utterance.text.trim(), utterance.dtmf) {
            ("", Some(key)) => format!("[pressed {key}]"),
            (text, Some(key)) => format!("{text} [pressed {key}]"),
            (text, None) => text.to_string(),
        };
        self.note(Speaker::Caller, &text);
    }

    fn note(&mut self, speaker: Speaker, text: &str) {
        self.transcript.push(TranscriptEntry::now(speaker, text));
    }
}

impl SessionSignals for DialogueSession {
    fn consecutive_unresolved(&self) -> u32 {
        self.consecutive_unresolved
    }
}
