//! On-disk menu definition schema.
//!
//! The definition is a flat TOML document: every node names its parent, so
//! the loader can detect duplicates, orphans and cycles before building the
//! tree. See `menus/my_bank.toml` for a complete example.

use ivr_types::{DataCategory, Language, LocalizedText, NodeKind};
use serde::Deserialize;
use std::collections::BTreeSet;

/// Top-level menu definition document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MenuDefinition {
    /// Operator-assigned version of this menu.
    pub version: String,
    /// Language used for resolution until the caller selects one.
    pub default_language: Language,
    #[serde(default)]
    pub notices: NoticesDef,
    #[serde(default)]
    pub auth_fields: Vec<AuthFieldDef>,
    #[serde(default)]
    pub intents: Vec<IntentDef>,
    pub nodes: Vec<NodeDef>,
    #[serde(default)]
    pub security_rules: Vec<SecurityRuleDef>,
}

/// Markers the response footer must carry exactly once.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoticesDef {
    #[serde(default = "default_return_marker")]
    pub return_marker: String,
    #[serde(default = "default_timeout_markers")]
    pub timeout_markers: LocalizedText,
}

fn default_return_marker() -> String {
    "#".to_string()
}

fn default_timeout_markers() -> LocalizedText {
    LocalizedText::from([
        (Language::English, "5 seconds".to_string()),
        (Language::Spanish, "5 segundos".to_string()),
    ])
}

impl Default for NoticesDef {
    fn default() -> Self {
        Self {
            return_marker: default_return_marker(),
            timeout_markers: default_timeout_markers(),
        }
    }
}

/// A piece of sensitive data the caller must supply to proceed.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthFieldDef {
    pub id: String,
    /// The data category this field unlocks.
    pub protects: DataCategory,
    /// How the field is described to the caller, per language.
    pub prompt: LocalizedText,
}

/// A multilingual synonym set shared by equivalent nodes across languages.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntentDef {
    pub id: String,
    #[serde(default)]
    pub phrases: Vec<String>,
}

/// One node of the IVR tree.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeDef {
    pub id: String,
    #[serde(default)]
    pub parent: Option<String>,
    /// DTMF key that selects this node from its parent.
    #[serde(default)]
    pub selector: Option<String>,
    pub label: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub language: Option<Language>,
    #[serde(default)]
    pub intent: Option<String>,
    /// Node-local synonyms, in addition to the label and intent phrases.
    #[serde(default)]
    pub phrases: Vec<String>,
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default)]
    pub sensitive: bool,
    /// Slot keys that boost this node when present in the utterance.
    #[serde(default)]
    pub slots: Vec<String>,
}

/// A disclosure rule keyed by node id or by auth field.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityRuleDef {
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub forbidden: BTreeSet<DataCategory>,
    #[serde(default)]
    pub required_fields: BTreeSet<String>,
}
