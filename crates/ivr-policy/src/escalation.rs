//! Escalation Detector: decides whether a caller must reach a human agent.
//!
//! Runs before intent resolution on every turn, so a positive decision
//! pre-empts any further menu navigation.

use ivr_types::{text, CallerUtterance, EscalationReason};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Session signals the detector reads. Implemented by the dialogue session
/// so this crate does not depend on it.
pub trait SessionSignals {
    /// Turns in a row that ended without a confident match.
    fn consecutive_unresolved(&self) -> u32;
}

impl SessionSignals for u32 {
    fn consecutive_unresolved(&self) -> u32 {
        *self
    }
}

/// Result of [`EscalationDetector::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationDecision {
    Continue,
    Escalate(EscalationReason),
}

/// Escalation thresholds and phrase lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Phrases that count as an explicit request for a person, any language.
    pub agent_phrases: Vec<String>,
    /// Escalate once this many turns in a row were unresolved.
    pub consecutive_unresolved_limit: u32,
    /// Escalate when the caller's sentiment score rises above this value.
    pub frustration_threshold: f32,
    /// Keypad key that always transfers to an agent.
    pub transfer_key: char,
    /// Spoken forms of the transfer key.
    pub transfer_words: Vec<String>,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            agent_phrases: [
                "agent",
                "representative",
                "human",
                "real person",
                "operator",
                "customer service",
                "talk to someone",
                "speak to someone",
                "agente",
                "representante",
                "humano",
                "persona real",
                "operador",
                "hablar con alguien",
                "servicio al cliente",
            ]
            .map(String::from)
            .to_vec(),
            consecutive_unresolved_limit: 2,
            frustration_threshold: 0.7,
            transfer_key: '0',
            transfer_words: ["0", "zero", "cero"].map(String::from).to_vec(),
        }
    }
}

/// Stateless escalation policy.
#[derive(Debug)]
pub struct EscalationDetector {
    config: EscalationConfig,
    agent_pattern: Option<Regex>,
    shortcut_pattern: Option<Regex>,
}

impl EscalationDetector {
    pub fn new(config: EscalationConfig) -> Self {
        let agent_pattern = word_alternation(&config.agent_phrases, r"\b(?:", r")\b");
        let shortcut_pattern = word_alternation(
            &config.transfer_words,
            r"^(?:(?:press|dial|say|marcar|marque|oprima|presione)\s+)?(?:",
            r")$",
        );
        Self {
            config,
            agent_pattern,
            shortcut_pattern,
        }
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }

    /// Decides whether this turn must be handed to a human.
    ///
    /// Triggers are checked in a fixed order so the reported reason is
    /// deterministic: repeated failures, the transfer shortcut, an explicit
    /// request, then frustration.
    pub fn evaluate(
        &self,
        utterance: &CallerUtterance,
        session: &impl SessionSignals,
    ) -> EscalationDecision {
        if session.consecutive_unresolved() >= self.config.consecutive_unresolved_limit {
            return EscalationDecision::Escalate(EscalationReason::ConsecutiveUnresolved);
        }

        let folded = text::fold(&utterance.text);
        if utterance.dtmf == Some(self.config.transfer_key)
            || self
                .shortcut_pattern
                .as_ref()
                .is_some_and(|re| re.is_match(&folded))
        {
            return EscalationDecision::Escalate(EscalationReason::TransferShortcut);
        }

        if self.is_agent_request(&utterance.text) {
            return EscalationDecision::Escalate(EscalationReason::AgentRequested);
        }

        if utterance
            .sentiment
            .is_some_and(|score| score > self.config.frustration_threshold)
        {
            return EscalationDecision::Escalate(EscalationReason::Frustration);
        }

        EscalationDecision::Continue
    }

    /// Returns `true` if `utterance` asks for a person.
    pub fn is_agent_request(&self, utterance: &str) -> bool {
        let folded = text::fold(utterance);
        self.agent_pattern
            .as_ref()
            .is_some_and(|re| re.is_match(&folded))
    }
}

impl Default for EscalationDetector {
    fn default() -> Self {
        Self::new(EscalationConfig::default())
    }
}

/// Builds `prefix(a|b|c)suffix` over folded, escaped phrases.
fn word_alternation(phrases: &[String], prefix: &str, suffix: &str) -> Option<Regex> {
    let alternatives: Vec<String> = phrases
        .iter()
        .map(|phrase| text::fold(phrase))
        .filter(|phrase| !phrase.is_empty())
        .map(|phrase| regex::escape(&phrase).replace(' ', r"\s+"))
        .collect();
    if alternatives.is_empty() {
        return None;
    }
    let pattern = format!("{prefix}{}{suffix}", alternatives.join("|"));
    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!(error = %e, "invalid escalation phrase pattern");
            None
        }
    }
}
