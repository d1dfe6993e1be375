//! Security Policy Guard.
//!
//! Every candidate response passes through [`SecurityGuard::check`] before it
//! is handed to speech synthesis. Rules, in priority order:
//!
//! 1. Protected values (balances, limits, account/card numbers, SSNs) are
//!    never stated. Anything that looks like one is masked with [`MASK`] and
//!    the verdict is [`Verdict::Redact`].
//! 2. A response about a node with an authentication requirement must name
//!    that requirement, plus any field required by a matching security rule.
//! 3. A rendered path may not exceed the maximum step count.
//! 4. The return marker and the timeout notice appear exactly once.
//!
//! Rules 2-4 are checked against the (possibly masked) text and any failure
//! is a [`Verdict::Block`], which outranks a redaction.

use ivr_menu::{AuthField, MenuNode, MenuTree, Notices, SecurityRule, MAX_DEPTH};
use ivr_types::{DataCategory, Language};
use regex::Regex;
use std::collections::BTreeMap;

/// Replacement for a masked protected value.
pub const MASK: &str = "***";

/// Why the guard intervened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardReason {
    #[error("response states a protected {} value", .0.label())]
    ProtectedValue(DataCategory),

    #[error("response does not state the '{field}' authentication requirement")]
    MissingAuthRequirement { field: String },

    #[error("response does not request required field '{0}'")]
    MissingRequiredField(String),

    #[error("rendered path has {steps} steps")]
    PathTooLong { steps: usize },

    #[error("notice '{marker}' appears {count} times, expected once")]
    NoticeCount { marker: String, count: usize },
}

impl GuardReason {
    /// Stable label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ProtectedValue(_) => "protected_value",
            Self::MissingAuthRequirement { .. } => "missing_auth_requirement",
            Self::MissingRequiredField(_) => "missing_required_field",
            Self::PathTooLong { .. } => "path_too_long",
            Self::NoticeCount { .. } => "notice_count",
        }
    }
}

/// Outcome of a guard check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The text may be spoken as is.
    Allowed,
    /// The text may be spoken only in its masked form.
    Redact { text: String, reason: GuardReason },
    /// The text must not be spoken.
    Block(GuardReason),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// The intervention reason, if any.
    pub fn reason(&self) -> Option<&GuardReason> {
        match self {
            Self::Allowed => None,
            Self::Redact { reason, .. } | Self::Block(reason) => Some(reason),
        }
    }
}

/// A compiled protected-value pattern.
struct ProtectedPattern {
    category: DataCategory,
    pattern: Regex,
}

/// Stateless response validator built from the menu's static rules.
pub struct SecurityGuard {
    patterns: Vec<ProtectedPattern>,
    rules: Vec<SecurityRule>,
    auth_fields: BTreeMap<String, AuthField>,
    notices: Notices,
    max_steps: usize,
}

impl std::fmt::Debug for SecurityGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityGuard")
            .field("patterns", &self.patterns.len())
            .field("rules", &self.rules.len())
            .field("max_steps", &self.max_steps)
            .finish()
    }
}

/// Ordered so that the most specific shape claims a value first.
const PROTECTED_PATTERNS: &[(DataCategory, &str)] = &[
    // 123-45-6789
    (DataCategory::Ssn, r"\b\d{3}-\d{2}-\d{4}\b"),
    // 4111 1111 1111 1111, 4111-1111-1111-1111
    (DataCategory::CardNumber, r"\b\d{4}(?:[ -]\d{4}){3}\b"),
    // Any other run of eight or more digits.
    (DataCategory::AccountNumber, r"\b\d{8,}\b"),
    // $1,234.56, 1234 dollars, 50 dólares
    (
        DataCategory::AccountBalance,
        r"(?i)(?:[$€£]\s?\d[\d,]*(?:\.\d+)?)|(?:\b\d[\d,]*(?:\.\d+)?\s?(?:dollars?|d[oó]lares|usd|pesos|euros?)\b)",
    ),
];

impl SecurityGuard {
    /// Compiles the guard from the rules and auth fields loaded with the menu.
    pub fn new(tree: &MenuTree) -> Self {
        let patterns = PROTECTED_PATTERNS
            .iter()
            .filter_map(|(category, pattern)| match Regex::new(pattern) {
                Ok(pattern) => Some(ProtectedPattern {
                    category: *category,
                    pattern,
                }),
                Err(e) => {
                    tracing::error!(category = category.label(), error = %e, "invalid protected-value pattern");
                    None
                }
            })
            .collect();

        Self {
            patterns,
            rules: tree.security_rules().to_vec(),
            auth_fields: tree
                .auth_fields()
                .map(|field| (field.id.clone(), field.clone()))
                .collect(),
            notices: tree.notices().clone(),
            max_steps: MAX_DEPTH,
        }
    }

    /// Overrides the maximum number of rendered steps.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Vets `text`, a response about `node` reached in `steps` selections.
    pub fn check(&self, text: &str, node: &MenuNode, steps: usize) -> Verdict {
        let (checked, redaction) = self.redact(text);

        if let Some(reason) = self.block_reason(&checked, node, steps) {
            tracing::warn!(node_id = %node.id, reason = reason.label(), "guard blocked response");
            return Verdict::Block(reason);
        }

        match redaction {
            Some(category) => {
                tracing::warn!(node_id = %node.id, category = category.label(), "guard masked protected value");
                Verdict::Redact {
                    text: checked,
                    reason: GuardReason::ProtectedValue(category),
                }
            }
            None => Verdict::Allowed,
        }
    }

    /// Rule 1 on its own: masks protected values and returns the masked text
    /// with the first category found.
    pub fn redact(&self, text: &str) -> (String, Option<DataCategory>) {
        let mut masked = text.to_string();
        let mut first = None;
        for rule in &self.patterns {
            if rule.pattern.is_match(&masked) {
                first.get_or_insert(rule.category);
                masked = rule.pattern.replace_all(&masked, MASK).into_owned();
            }
        }
        (masked, first)
    }

    fn block_reason(&self, text: &str, node: &MenuNode, steps: usize) -> Option<GuardReason> {
        let haystack = text.to_lowercase();

        // Rule 2
        if let Some(auth) = &node.auth_requirement {
            if !haystack.contains(&auth.description.to_lowercase()) {
                return Some(GuardReason::MissingAuthRequirement {
                    field: auth.field.clone(),
                });
            }
        }
        for rule in self.rules.iter().filter(|rule| rule.applies_to(node)) {
            for field in &rule.required_fields {
                if !self.mentions_field(&haystack, field, node.language) {
                    return Some(GuardReason::MissingRequiredField(field.clone()));
                }
            }
        }

        // Rule 3
        if steps > self.max_steps {
            return Some(GuardReason::PathTooLong { steps });
        }

        // Rule 4
        let returns = text.matches(self.notices.return_marker.as_str()).count();
        if returns != 1 {
            return Some(GuardReason::NoticeCount {
                marker: self.notices.return_marker.clone(),
                count: returns,
            });
        }
        let timeouts: usize = self
            .notices
            .timeout_markers
            .values()
            .map(|marker| haystack.matches(&marker.to_lowercase()).count())
            .sum();
        if timeouts != 1 {
            let marker = node
                .language
                .and_then(|lang| self.notices.timeout_marker(lang))
                .or_else(|| self.notices.timeout_markers.values().next().map(String::as_str))
                .unwrap_or_default()
                .to_string();
            return Some(GuardReason::NoticeCount {
                marker,
                count: timeouts,
            });
        }

        None
    }

    fn mentions_field(&self, haystack: &str, field: &str, language: Option<Language>) -> bool {
        let Some(definition) = self.auth_fields.get(field) else {
            return false;
        };
        match language.and_then(|lang| definition.prompt(lang)) {
            Some(prompt) => haystack.contains(&prompt.to_lowercase()),
            None => definition
                .prompts
                .values()
                .any(|prompt| haystack.contains(&prompt.to_lowercase())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOOTER: &str = "Press # to return. This call will time out after 5 seconds of silence.";

    fn tree() -> MenuTree {
        ivr_menu::bundled().unwrap()
    }

    #[test]
    fn every_protected_pattern_compiles() {
        for (category, pattern) in PROTECTED_PATTERNS {
            assert!(
                Regex::new(pattern).is_ok(),
                "pattern for {} does not compile",
                category.label()
            );
        }
        let guard = SecurityGuard::new(&tree());
        assert_eq!(guard.patterns.len(), PROTECTED_PATTERNS.len());
    }

    #[test]
    fn allows_well_formed_response() {
        let tree = tree();
        let guard = SecurityGuard::new(&tree);
        let node = tree.lookup("en.account.balance").unwrap();
        let text = format!("Please have your 16-digit account number ready. {FOOTER}");
        assert_eq!(guard.check(&text, node, 3), Verdict::Allowed);
    }

    #[test]
    fn masks_currency_and_numbers() {
        let tree = tree();
        let guard = SecurityGuard::new(&tree);
        let node = tree.lookup("en.cards.apply").unwrap();
        let text = format!("Your balance is $1,234.56 on account 12345678901234. {FOOTER}");

        match guard.check(&text, node, 3) {
            Verdict::Redact { text, reason } => {
                assert!(!text.contains("1,234.56"));
                assert!(!text.contains("12345678901234"));
                assert!(text.contains(MASK));
                assert_eq!(reason, GuardReason::ProtectedValue(DataCategory::AccountNumber));
            }
            other => panic!("expected Redact, got {other:?}"),
        }
    }

    #[test]
    fn masks_ssn_before_other_shapes() {
        let tree = tree();
        let guard = SecurityGuard::new(&tree);
        let node = tree.lookup("en.cards.apply").unwrap();
        let text = format!("Your SSN is 123-45-6789. {FOOTER}");
        match guard.check(&text, node, 3) {
            Verdict::Redact { text, reason } => {
                assert_eq!(reason, GuardReason::ProtectedValue(DataCategory::Ssn));
                assert!(text.starts_with("Your SSN is ***."));
            }
            other => panic!("expected Redact, got {other:?}"),
        }
    }

    #[test]
    fn ordinary_digits_are_not_protected() {
        let tree = tree();
        let guard = SecurityGuard::new(&tree);
        let node = tree.lookup("en.account.balance").unwrap();
        let text = format!(
            "Step 1: press 1 for English. Step 2: press 1 for Account Information. \
             Please have your 16-digit account number ready. {FOOTER}"
        );
        assert!(guard.check(&text, node, 2).is_allowed());
    }

    #[test]
    fn blocks_missing_auth_requirement() {
        let tree = tree();
        let guard = SecurityGuard::new(&tree);
        let node = tree.lookup("en.cards.limit").unwrap();
        let text = format!("Press 1 to hear your limit. {FOOTER}");
        assert_eq!(
            guard.check(&text, node, 3),
            Verdict::Block(GuardReason::MissingAuthRequirement {
                field: "card_last4".to_string()
            })
        );
    }

    #[test]
    fn blocks_over_long_paths() {
        let tree = tree();
        let guard = SecurityGuard::new(&tree);
        let node = tree.lookup("en.cards.apply").unwrap();
        assert_eq!(
            guard.check(FOOTER, node, 5),
            Verdict::Block(GuardReason::PathTooLong { steps: 5 })
        );
        assert!(guard.check(FOOTER, node, 4).is_allowed());
    }

    #[test]
    fn blocks_missing_or_repeated_notices() {
        let tree = tree();
        let guard = SecurityGuard::new(&tree);
        let node = tree.lookup("en.cards.apply").unwrap();

        let verdict = guard.check("Press 2 to apply.", node, 3);
        assert!(matches!(
            verdict,
            Verdict::Block(GuardReason::NoticeCount { count: 0, .. })
        ));

        let doubled = format!("{FOOTER} {FOOTER}");
        assert!(matches!(
            guard.check(&doubled, node, 3),
            Verdict::Block(GuardReason::NoticeCount { count: 2, .. })
        ));
    }

    #[test]
    fn spanish_notices_count() {
        let tree = tree();
        let guard = SecurityGuard::new(&tree);
        let node = tree.lookup("es.cards.lost").unwrap();
        let text = "Tenga a mano los últimos cuatro dígitos de su tarjeta. \
                    Presione # para regresar. La llamada termina tras 5 segundos de silencio.";
        assert!(guard.check(text, node, 3).is_allowed());
    }

    #[test]
    fn block_outranks_redaction() {
        let tree = tree();
        let guard = SecurityGuard::new(&tree);
        let node = tree.lookup("en.cards.apply").unwrap();
        let verdict = guard.check("You owe $40.", node, 3);
        assert!(matches!(verdict, Verdict::Block(_)));
    }
}
