//! Messages exchanged between a session and its transport.

use chrono::{DateTime, Utc};
use ivr_types::{CallerUtterance, EscalationReason, Language};
use serde::{Deserialize, Serialize};

/// Input from the transport collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallerEvent {
    /// A finalized (or partial, low-confidence) recognition result.
    Utterance(CallerUtterance),
    /// Voice activity detected from the caller.
    SpeechOnset,
    /// A keypad press outside of any utterance.
    Dtmf { key: char },
    /// The synthesizer finished speaking segment `seq`.
    PlaybackFinished { seq: u64 },
    Disconnect,
}

/// Output to the transport collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Speak one segment. Acknowledged with [`CallerEvent::PlaybackFinished`].
    Say {
        seq: u64,
        language: Language,
        text: String,
    },
    /// Stop speaking immediately.
    CancelSpeech,
    /// Hand the caller to a human agent.
    TransferToAgent {
        reason: EscalationReason,
        transcript: Vec<TranscriptEntry>,
    },
    Closed { reason: CloseReason },
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    CallerDisconnected,
    IdleTimeout,
    Shutdown,
    /// Handed to a human agent.
    Transferred,
}

impl CloseReason {
    pub fn label(self) -> &'static str {
        match self {
            Self::CallerDisconnected => "caller_disconnected",
            Self::IdleTimeout => "idle_timeout",
            Self::Shutdown => "shutdown",
            Self::Transferred => "transferred",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Caller,
    Navigator,
}

/// One line of the transcript handed to the human agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub at: DateTime<Utc>,
    pub speaker: Speaker,
    pub text: String,
}

impl TranscriptEntry {
    pub fn now(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            speaker,
            text: text.into(),
        }
    }
}
