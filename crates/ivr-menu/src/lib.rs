//! Menu tree model for the IVR navigator.
//!
//! The tree is loaded once from a TOML definition, validated in full, and
//! then shared read-only by every caller session. A definition that fails
//! validation is fatal: the service must not start with a partial menu.

mod definition;
mod error;
mod tree;

pub use definition::{
    AuthFieldDef, IntentDef, MenuDefinition, NodeDef, NoticesDef, SecurityRuleDef,
};
pub use error::{MenuError, SchemaError};
pub use tree::{
    AuthField, AuthRequirement, ChildRef, MenuNode, MenuTree, Notices, RuleTarget, SecurityRule,
    MAX_DEPTH,
};

/// The bank menu shipped with the service, used when no definition path is
/// configured and by tests across the workspace.
pub const BUNDLED_DEFINITION: &str = include_str!("../../../menus/my_bank.toml");

/// Loads [`BUNDLED_DEFINITION`].
///
/// # Errors
///
/// Returns a [`SchemaError`] if the bundled definition is invalid.
pub fn bundled() -> Result<MenuTree, SchemaError> {
    MenuTree::load(BUNDLED_DEFINITION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ivr_types::{DataCategory, Language, NodeKind};

    fn tree() -> MenuTree {
        bundled().expect("bundled menu must load")
    }

    #[test]
    fn bundled_menu_loads() {
        let tree = tree();
        assert_eq!(tree.version(), "2024.1");
        assert_eq!(tree.default_language(), Language::English);
        assert_eq!(tree.root().kind, NodeKind::LanguageSelect);
        assert_eq!(tree.root().depth, 0);
        assert_eq!(
            tree.languages().collect::<Vec<_>>(),
            vec![Language::English, Language::Spanish]
        );
    }

    #[test]
    fn lookup_reports_missing_ids() {
        let tree = tree();
        assert!(tree.lookup("en.cards.lost").is_ok());
        assert_eq!(
            tree.lookup("en.mortgage").unwrap_err(),
            MenuError::NotFound("en.mortgage".to_string())
        );
    }

    #[test]
    fn path_and_steps() {
        let tree = tree();
        let path: Vec<&str> = tree
            .path_to("es.cards.lost")
            .unwrap()
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(path, vec!["root", "es", "es.cards", "es.cards.lost"]);

        let steps = tree.steps_to("es.cards.lost").unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].id, "es");
        assert!(tree.steps_to("root").unwrap().is_empty());
    }

    #[test]
    fn children_keep_definition_order() {
        let tree = tree();
        let selectors: Vec<&str> = tree
            .root()
            .children
            .iter()
            .map(|c| c.selector.as_str())
            .collect();
        assert_eq!(selectors, vec!["1", "2"]);

        let cards = tree.children_of("en.cards").unwrap();
        let labels: Vec<&str> = cards.iter().map(|n| n.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "Check Credit Limit",
                "Apply for New Card",
                "Report Lost or Stolen Card",
                "Return to Main Menu"
            ]
        );
    }

    #[test]
    fn language_is_inherited() {
        let tree = tree();
        assert_eq!(tree.root().language, None);
        assert_eq!(
            tree.lookup("es.business.small").unwrap().language,
            Some(Language::Spanish)
        );
        assert_eq!(tree.language_node(Language::English).unwrap().id, "en");
    }

    #[test]
    fn sensitive_leaves_carry_localized_auth() {
        let tree = tree();
        let auth = tree
            .lookup("es.account.balance")
            .unwrap()
            .auth_requirement
            .clone()
            .unwrap();
        assert_eq!(auth.field, "account_number");
        assert_eq!(auth.protects, DataCategory::AccountNumber);
        assert_eq!(auth.description, "número de cuenta de 16 dígitos");

        assert!(tree.lookup("en.cards.apply").unwrap().auth_requirement.is_none());
    }

    #[test]
    fn phrases_merge_label_and_intent() {
        let tree = tree();
        let node = tree.lookup("en.cards.lost").unwrap();
        assert_eq!(node.phrases[0], "Report Lost or Stolen Card");
        assert!(node.phrases.iter().any(|p| p == "tarjeta perdida"));
    }

    #[test]
    fn rules_apply_by_node_and_by_field() {
        let tree = tree();
        let small = tree.lookup("en.business.small").unwrap();
        let limit = tree.lookup("en.cards.limit").unwrap();

        let small_rules: Vec<_> = tree
            .security_rules()
            .iter()
            .filter(|r| r.applies_to(small))
            .collect();
        assert_eq!(small_rules.len(), 1);
        assert!(small_rules[0].required_fields.contains("ein"));

        assert!(tree
            .security_rules()
            .iter()
            .any(|r| r.applies_to(limit) && r.forbidden.contains(&DataCategory::CreditLimit)));
    }

    #[test]
    fn within_subtree() {
        let tree = tree();
        assert!(tree.is_within("en.vehicle.emi", "en"));
        assert!(!tree.is_within("en.vehicle.emi", "es"));
        assert!(tree.is_within("en", "en"));
    }
}
