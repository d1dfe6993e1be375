use ivr_menu::{MenuTree, SchemaError};
use std::io::Write;

const HEADER: &str = r#"
version = "test"
default_language = "en"

[[auth_fields]]
id = "card_last4"
protects = "card_number"
prompt = { en = "last four digits of your card", es = "últimos cuatro dígitos" }
"#;

const ROOT: &str = r#"
[[nodes]]
id = "root"
label = "Language"
kind = "language_select"
"#;

const ENGLISH: &str = r#"
[[nodes]]
id = "en"
parent = "root"
selector = "1"
label = "English"
kind = "menu"
language = "en"

[[nodes]]
id = "en.cards"
parent = "en"
selector = "1"
label = "Cards"
kind = "submenu"

[[nodes]]
id = "en.cards.lost"
parent = "en.cards"
selector = "1"
label = "Lost Card"
kind = "leaf_action"
auth = "card_last4"
sensitive = true
"#;

fn definition(extra: &str) -> String {
    format!("{HEADER}{ROOT}{ENGLISH}{extra}")
}

fn node(id: &str, parent: &str, selector: &str, kind: &str) -> String {
    format!(
        "\n[[nodes]]\nid = \"{id}\"\nparent = \"{parent}\"\nselector = \"{selector}\"\nlabel = \"{id}\"\nkind = \"{kind}\"\n"
    )
}

#[test]
fn minimal_definition_loads() {
    let tree = MenuTree::load(&definition("")).unwrap();
    assert_eq!(tree.nodes().count(), 4);
    assert_eq!(tree.lookup("en.cards.lost").unwrap().depth, 3);
}

#[test]
fn loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(definition("").as_bytes()).unwrap();

    let tree = MenuTree::from_path(file.path()).unwrap();
    assert_eq!(tree.version(), "test");
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = MenuTree::from_path(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(SchemaError::Read(_))));
}

#[test]
fn rejects_unknown_keys() {
    let result = MenuTree::load(&definition("\n[extras]\nfoo = 1\n"));
    assert!(matches!(result, Err(SchemaError::Parse(_))));
}

#[test]
fn rejects_duplicate_ids() {
    let result = MenuTree::load(&definition(&node("en.cards", "en", "2", "submenu")));
    match result {
        Err(SchemaError::DuplicateId(id)) => assert_eq!(id, "en.cards"),
        other => panic!("expected DuplicateId, got {other:?}"),
    }
}

#[test]
fn rejects_orphans() {
    let result = MenuTree::load(&definition(&node("en.ghost", "en.nowhere", "2", "leaf_action")));
    match result {
        Err(SchemaError::UnknownParent { id, parent }) => {
            assert_eq!(id, "en.ghost");
            assert_eq!(parent, "en.nowhere");
        }
        other => panic!("expected UnknownParent, got {other:?}"),
    }
}

#[test]
fn rejects_cycles() {
    let extra = format!(
        "{}{}",
        node("loop.a", "loop.b", "1", "submenu"),
        node("loop.b", "loop.a", "1", "submenu")
    );
    match MenuTree::load(&definition(&extra)) {
        Err(SchemaError::Unreachable(ids)) => {
            assert!(ids.contains(&"loop.a".to_string()));
            assert!(ids.contains(&"loop.b".to_string()));
        }
        other => panic!("expected Unreachable, got {other:?}"),
    }
}

#[test]
fn rejects_paths_deeper_than_four() {
    let extra = format!(
        "{}{}{}",
        node("en.a", "en", "2", "submenu"),
        node("en.a.b", "en.a", "1", "submenu"),
        node("en.a.b.c", "en.a.b", "1", "submenu"),
    ) + &node("en.a.b.c.d", "en.a.b.c", "1", "leaf_action");
    match MenuTree::load(&definition(&extra)) {
        Err(SchemaError::TooDeep { id, depth, max }) => {
            assert_eq!(id, "en.a.b.c.d");
            assert_eq!(depth, 5);
            assert_eq!(max, 4);
        }
        other => panic!("expected TooDeep, got {other:?}"),
    }
}

#[test]
fn rejects_children_under_leaves() {
    let result = MenuTree::load(&definition(&node("en.cards.lost.x", "en.cards.lost", "1", "leaf_action")));
    assert!(matches!(result, Err(SchemaError::TerminalWithChildren { .. })));
}

#[test]
fn rejects_duplicate_selectors() {
    let result = MenuTree::load(&definition(&node("en.cards.other", "en.cards", "1", "leaf_action")));
    assert!(matches!(
        result,
        Err(SchemaError::DuplicateSelector { ref parent, ref selector }) if parent == "en.cards" && selector == "1"
    ));
}

#[test]
fn rejects_sensitive_node_without_auth() {
    let extra = node("en.cards.limit", "en.cards", "2", "leaf_action") + "sensitive = true\n";
    match MenuTree::load(&definition(&extra)) {
        Err(SchemaError::MissingAuthRequirement(id)) => assert_eq!(id, "en.cards.limit"),
        other => panic!("expected MissingAuthRequirement, got {other:?}"),
    }
}

#[test]
fn rejects_unknown_auth_field() {
    let extra = node("en.cards.limit", "en.cards", "2", "leaf_action") + "auth = \"pin\"\n";
    assert!(matches!(
        MenuTree::load(&definition(&extra)),
        Err(SchemaError::UnknownAuthField { .. })
    ));
}

#[test]
fn rejects_second_root() {
    let extra = "\n[[nodes]]\nid = \"other\"\nlabel = \"Other\"\nkind = \"language_select\"\n";
    assert!(matches!(
        MenuTree::load(&definition(extra)),
        Err(SchemaError::MultipleRoots(_))
    ));
}

#[test]
fn rejects_language_mismatch() {
    let extra = node("en.es", "en", "9", "submenu") + "language = \"es\"\n";
    assert!(matches!(
        MenuTree::load(&definition(&extra)),
        Err(SchemaError::LanguageMismatch { .. })
    ));
}

#[test]
fn rejects_missing_default_language() {
    let text = definition("").replace("default_language = \"en\"", "default_language = \"es\"");
    assert!(matches!(
        MenuTree::load(&text),
        Err(SchemaError::MissingDefaultLanguage(_))
    ));
}

#[test]
fn rejects_rule_on_unknown_node() {
    let extra = "\n[[security_rules]]\nnode = \"en.mortgage\"\nforbidden = [\"tax_id\"]\n";
    assert!(matches!(
        MenuTree::load(&definition(extra)),
        Err(SchemaError::InvalidRule(_))
    ));
}

#[test]
fn rejects_empty_label() {
    let text = definition("").replace("label = \"Cards\"", "label = \"  \"");
    assert!(matches!(
        MenuTree::load(&text),
        Err(SchemaError::EmptyField { field: "label", .. })
    ));
}
