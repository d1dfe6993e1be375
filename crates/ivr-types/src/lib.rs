//! Shared types for the conversational IVR navigator.
//!
//! This crate holds the vocabulary every other crate speaks: caller
//! languages, menu node kinds, protected data categories, the dialogue turn
//! state machine, and the finalized caller utterance delivered by the
//! transport collaborator.
//!
//! No crate in the workspace depends on anything *except* `ivr-types` for
//! cross-cutting type definitions. This keeps the dependency graph clean and
//! prevents circular dependencies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod text;
mod utterance;
pub use utterance::{CallerUtterance, Slots};

/// Caller-facing languages supported by the menu.
///
/// Each language owns one subtree under the language-selection root and one
/// set of response templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "en")]
    English,
    #[serde(rename = "es")]
    Spanish,
}

impl Language {
    /// All supported languages, in menu order.
    pub const ALL: [Language; 2] = [Language::English, Language::Spanish];

    /// Returns the ISO 639-1 code for this language.
    pub fn code(self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Spanish => "es",
        }
    }

    /// Attempts to convert a language code to a `Language`.
    ///
    /// Returns `None` if the code is not a supported language.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "en" => Some(Self::English),
            "es" => Some(Self::Spanish),
            _ => None,
        }
    }

    /// Returns the language's own name for itself.
    pub fn label(self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Spanish => "Español",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// The role a node plays in the IVR tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// The language-selection root.
    LanguageSelect,
    /// A language's main menu.
    Menu,
    /// A nested menu reached from a main menu.
    Submenu,
    /// A terminal node representing a concrete service request.
    LeafAction,
    /// `#`: return to the previous menu.
    Return,
    /// `*`: repeat the current menu.
    Repeat,
    /// Hand the caller to a human agent.
    AgentTransfer,
}

impl NodeKind {
    /// Returns `true` for nodes that offer further options to the caller.
    pub fn is_selection_point(self) -> bool {
        matches!(self, Self::LanguageSelect | Self::Menu | Self::Submenu)
    }

    /// Returns `true` for nodes that must not have children.
    pub fn is_terminal(self) -> bool {
        !self.is_selection_point()
    }

    /// Returns `true` for navigation controls that are never a resolution target.
    pub fn is_control(self) -> bool {
        matches!(self, Self::Return | Self::Repeat)
    }

    /// Returns the string label for this kind.
    pub fn label(self) -> &'static str {
        match self {
            Self::LanguageSelect => "LANGUAGE_SELECT",
            Self::Menu => "MENU",
            Self::Submenu => "SUBMENU",
            Self::LeafAction => "LEAF_ACTION",
            Self::Return => "RETURN",
            Self::Repeat => "REPEAT",
            Self::AgentTransfer => "AGENT_TRANSFER",
        }
    }
}

/// Categories of customer data the navigator may request but never state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    AccountBalance,
    CreditLimit,
    TransactionHistory,
    AccountNumber,
    Ssn,
    CardNumber,
    TaxId,
    LoanNumber,
}

impl DataCategory {
    /// The categories that may never be disclosed, regardless of node.
    pub const PROTECTED: [DataCategory; 6] = [
        DataCategory::AccountBalance,
        DataCategory::CreditLimit,
        DataCategory::TransactionHistory,
        DataCategory::AccountNumber,
        DataCategory::Ssn,
        DataCategory::CardNumber,
    ];

    /// Returns the string label for this category.
    pub fn label(self) -> &'static str {
        match self {
            Self::AccountBalance => "ACCOUNT_BALANCE",
            Self::CreditLimit => "CREDIT_LIMIT",
            Self::TransactionHistory => "TRANSACTION_HISTORY",
            Self::AccountNumber => "ACCOUNT_NUMBER",
            Self::Ssn => "SSN",
            Self::CardNumber => "CARD_NUMBER",
            Self::TaxId => "TAX_ID",
            Self::LoanNumber => "LOAN_NUMBER",
        }
    }
}

/// Dialogue turn state for one caller session.
///
/// ```text
/// IDLE -> LISTENING -> PROCESSING -> {SPEAKING, ESCALATED}
/// SPEAKING -> LISTENING      (delivery finished or barge-in)
/// any non-terminal -> CLOSED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnState {
    Idle,
    Listening,
    Processing,
    Speaking,
    Escalated,
    Closed,
}

impl TurnState {
    /// Returns `true` if the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: TurnState) -> bool {
        use TurnState::*;
        match (self, next) {
            (Idle, Listening) | (Idle, Speaking) => true,
            (Listening, Processing) => true,
            (Processing, Speaking) | (Processing, Escalated) | (Processing, Listening) => true,
            (Speaking, Listening) => true,
            (Closed, _) => false,
            (_, Closed) => true,
            _ => false,
        }
    }

    /// Returns `true` once no further navigation can happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Escalated | Self::Closed)
    }

    /// Returns the string label for this state.
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Listening => "LISTENING",
            Self::Processing => "PROCESSING",
            Self::Speaking => "SPEAKING",
            Self::Escalated => "ESCALATED",
            Self::Closed => "CLOSED",
        }
    }
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The result of one completed caller turn, as recorded by metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Resolved,
    Unresolved,
    Escalated,
}

/// Why a session was handed to a human agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// The caller explicitly asked for a person.
    AgentRequested,
    /// Too many turns in a row without a confident match.
    ConsecutiveUnresolved,
    /// The NLU collaborator tagged the caller as frustrated.
    Frustration,
    /// The caller pressed or said the universal transfer shortcut.
    TransferShortcut,
}

impl EscalationReason {
    /// Returns the string label for this reason.
    pub fn label(self) -> &'static str {
        match self {
            Self::AgentRequested => "AGENT_REQUESTED",
            Self::ConsecutiveUnresolved => "CONSECUTIVE_UNRESOLVED",
            Self::Frustration => "FRUSTRATION",
            Self::TransferShortcut => "TRANSFER_SHORTCUT",
        }
    }
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-language text keyed by language, as stored in definition files.
pub type LocalizedText = BTreeMap<Language, String>;
