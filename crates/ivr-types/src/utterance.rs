//! Finalized caller input as delivered by the transport collaborator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structured values extracted from an utterance by the NLU collaborator,
/// keyed by slot name (e.g. `"ein"`, `"account_type"`).
pub type Slots = BTreeMap<String, String>;

/// One finalized caller turn.
///
/// The core never performs recognition itself: `text`, `slots` and
/// `sentiment` arrive already computed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallerUtterance {
    /// Recognized speech, possibly empty for a pure keypad entry.
    #[serde(default)]
    pub text: String,
    /// Extracted slot values.
    #[serde(default)]
    pub slots: Slots,
    /// End-of-turn detector confidence that the caller has finished (0.0 - 1.0).
    #[serde(default = "default_end_of_turn_confidence")]
    pub end_of_turn_confidence: f32,
    /// Frustration score from the NLU collaborator (0.0 calm - 1.0 furious).
    #[serde(default)]
    pub sentiment: Option<f32>,
    /// A keypad key pressed instead of, or alongside, speech.
    #[serde(default)]
    pub dtmf: Option<char>,
}

fn default_end_of_turn_confidence() -> f32 {
    1.0
}

impl CallerUtterance {
    /// Creates a spoken utterance with no slots and full end-of-turn confidence.
    pub fn spoken(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            end_of_turn_confidence: default_end_of_turn_confidence(),
            ..Default::default()
        }
    }

    /// Creates a keypad entry.
    pub fn keypad(key: char) -> Self {
        Self {
            dtmf: Some(key),
            end_of_turn_confidence: default_end_of_turn_confidence(),
            ..Default::default()
        }
    }

    /// Adds a slot value.
    pub fn with_slot(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.slots.insert(name.into(), value.into());
        self
    }

    /// Sets the sentiment score.
    pub fn with_sentiment(mut self, score: f32) -> Self {
        self.sentiment = Some(score);
        self
    }

    /// Returns `true` if the turn carries neither speech nor a key press.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.dtmf.is_none()
    }

    /// Appends a later fragment of the same turn (received inside the
    /// endpointing window) to this one.
    pub fn merge(&mut self, later: CallerUtterance) {
        let text = later.text.trim();
        if !text.is_empty() {
            if !self.text.trim().is_empty() {
                self.text.push(' ');
            }
            self.text.push_str(text);
        }
        self.slots.extend(later.slots);
        self.end_of_turn_confidence = later.end_of_turn_confidence;
        self.sentiment = match (self.sentiment, later.sentiment) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        if later.dtmf.is_some() {
            self.dtmf = later.dtmf;
        }
    }
}
