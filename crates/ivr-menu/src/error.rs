//! Error types for menu loading and lookup.

use ivr_types::{Language, NodeKind};

/// A malformed menu definition. Fatal at load: the process must not start.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The definition file could not be read.
    #[error("failed to read menu definition: {0}")]
    Read(#[from] std::io::Error),

    /// The definition is not valid TOML or does not match the schema.
    #[error("failed to parse menu definition: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("menu definition has no root node")]
    NoRoot,

    #[error("menu definition has more than one root node: {0:?}")]
    MultipleRoots(Vec<String>),

    #[error("node '{id}' of kind {kind:?} is not allowed at this position")]
    MisplacedKind { id: String, kind: NodeKind },

    #[error("root node '{id}' must be a language selection, found {kind:?}")]
    RootKind { id: String, kind: NodeKind },

    #[error("node '{id}' has an empty {field}")]
    EmptyField { id: String, field: &'static str },

    #[error("duplicate node id: {0}")]
    DuplicateId(String),

    #[error("node '{id}' references unknown parent '{parent}'")]
    UnknownParent { id: String, parent: String },

    #[error("{kind:?} node '{id}' cannot have children")]
    TerminalWithChildren { id: String, kind: NodeKind },

    #[error("nodes unreachable from the root (cycle or detached branch): {0:?}")]
    Unreachable(Vec<String>),

    #[error("node '{id}' is at depth {depth}, deeper than the maximum of {max}")]
    TooDeep { id: String, depth: usize, max: usize },

    #[error("node '{0}' has no selector")]
    MissingSelector(String),

    #[error("menu '{parent}' has more than one option on selector '{selector}'")]
    DuplicateSelector { parent: String, selector: String },

    #[error("language menu '{0}' does not declare a language")]
    MissingLanguage(String),

    #[error("language {0} has more than one menu")]
    DuplicateLanguage(Language),

    #[error("node '{id}' declares language {declared} inside the {inherited} subtree")]
    LanguageMismatch {
        id: String,
        declared: Language,
        inherited: Language,
    },

    #[error("default language {0} has no menu")]
    MissingDefaultLanguage(Language),

    #[error("sensitive node '{0}' has no authentication requirement")]
    MissingAuthRequirement(String),

    #[error("node '{id}' references unknown auth field '{field}'")]
    UnknownAuthField { id: String, field: String },

    #[error("duplicate auth field: {0}")]
    DuplicateAuthField(String),

    #[error("auth field '{field}' has no prompt for language {language}")]
    MissingPrompt { field: String, language: Language },

    #[error("node '{id}' references unknown intent '{intent}'")]
    UnknownIntent { id: String, intent: String },

    #[error("duplicate intent: {0}")]
    DuplicateIntent(String),

    #[error("no timeout notice marker for language {0}")]
    MissingTimeoutMarker(Language),

    #[error("invalid security rule: {0}")]
    InvalidRule(String),
}

/// Lookup failures against a loaded tree.
///
/// Ids come from the tree itself, so a miss indicates a programming error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MenuError {
    #[error("menu node not found: {0}")]
    NotFound(String),
}
