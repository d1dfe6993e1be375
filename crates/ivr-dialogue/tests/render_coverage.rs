//! Every node of the bundled menu renders cleanly in every language.

use ivr_dialogue::{EngineConfig, NavigationEngine};
use ivr_observe::MetricsCollector;
use ivr_policy::MASK;
use ivr_types::Language;
use std::sync::Arc;

#[test]
fn every_node_renders_without_disclosure_or_guard_intervention() {
    let tree = Arc::new(ivr_menu::bundled().unwrap());
    let engine = NavigationEngine::new(
        tree.clone(),
        EngineConfig::default(),
        Arc::new(MetricsCollector::new()),
    )
    .unwrap();

    let mut failures = Vec::new();
    for node in tree.nodes() {
        for language in Language::ALL {
            match engine.render_node(&node.id, language) {
                Ok(response) => {
                    if let Some(label) = response.guard_intervention {
                        failures.push(format!("{} ({language}): guard {label}", node.id));
                    }
                    if response.text.contains(MASK) {
                        failures.push(format!("{} ({language}): masked output", node.id));
                    }
                    if let (_, Some(category)) = engine.guard().redact(&response.text) {
                        failures.push(format!(
                            "{} ({language}): states a {} value",
                            node.id,
                            category.label()
                        ));
                    }
                }
                Err(e) => failures.push(format!("{} ({language}): {e}", node.id)),
            }
        }
    }

    assert!(failures.is_empty(), "{failures:#?}");
}
