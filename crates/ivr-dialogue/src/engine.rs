use crate::error::FormatError;
use crate::formatter::{RenderedResponse, ResponseFormatter};
use ivr_menu::{MenuTree, MAX_DEPTH};
use ivr_observe::MetricsCollector;
use ivr_policy::{EscalationConfig, EscalationDetector, GuardReason, SecurityGuard};
use ivr_resolver::{IntentResolver, Resolution, ResolverConfig, ResolverError, TextEmbedder};
use ivr_types::{Language, Slots};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Tunables for the shared navigation components.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub resolver: ResolverConfig,
    pub escalation: EscalationConfig,
    /// Longest step trace the guard lets through.
    pub guard_max_steps: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            escalation: EscalationConfig::default(),
            guard_max_steps: MAX_DEPTH,
        }
    }
}

/// Result of running an utterance through resolution and rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum Navigation {
    Resolved {
        node_id: String,
        language: Language,
        confidence: f32,
        response: RenderedResponse,
    },
    Unresolved,
    /// The guard vetoed every rendering.
    Blocked(GuardReason),
}

/// The read-only components every session shares: one per process.
pub struct NavigationEngine {
    tree: Arc<MenuTree>,
    guard: Arc<SecurityGuard>,
    resolver: IntentResolver,
    detector: EscalationDetector,
    formatter: ResponseFormatter,
    metrics: Arc<MetricsCollector>,
}

impl std::fmt::Debug for NavigationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationEngine")
            .field("menu_version", &self.tree.version())
            .field("resolver", &self.resolver)
            .field("guard", &self.guard)
            .finish()
    }
}

impl NavigationEngine {
    pub fn new(
        tree: Arc<MenuTree>,
        config: EngineConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self, ResolverError> {
        let resolver = IntentResolver::new(tree.clone(), config.resolver)?;
        Ok(Self::assemble(tree, resolver, config, metrics))
    }

    /// Builds an engine whose resolver scores with an external embedder.
    pub fn with_embedder(
        tree: Arc<MenuTree>,
        embedder: Arc<dyn TextEmbedder>,
        config: EngineConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self, ResolverError> {
        let resolver = IntentResolver::with_embedder(tree.clone(), embedder, config.resolver)?;
        Ok(Self::assemble(tree, resolver, config, metrics))
    }

    fn assemble(
        tree: Arc<MenuTree>,
        resolver: IntentResolver,
        config: EngineConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let guard = Arc::new(SecurityGuard::new(&tree).with_max_steps(config.guard_max_steps));
        let formatter = ResponseFormatter::new(tree.clone(), guard.clone());
        Self {
            tree,
            guard,
            resolver,
            detector: EscalationDetector::new(config.escalation),
            formatter,
            metrics,
        }
    }

    pub fn tree(&self) -> &Arc<MenuTree> {
        &self.tree
    }

    pub fn guard(&self) -> &SecurityGuard {
        &self.guard
    }

    pub fn resolver(&self) -> &IntentResolver {
        &self.resolver
    }

    pub fn detector(&self) -> &EscalationDetector {
        &self.detector
    }

    pub fn formatter(&self) -> &ResponseFormatter {
        &self.formatter
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Resolves `utterance` and renders the result.
    ///
    /// A path rejected as too long is retried at a coarser grain, one step
    /// shorter each time, until something renders or nothing qualifies.
    /// Resolver failures degrade to [`Navigation::Unresolved`].
    pub fn navigate(
        &self,
        utterance: &str,
        slots: &Slots,
        language: Option<Language>,
    ) -> Result<Navigation, FormatError> {
        let mut resolution = match self.resolver.resolve(utterance, slots, language) {
            Ok(resolution) => resolution,
            Err(e) => {
                tracing::warn!(error = %e, "resolution failed, treating turn as unresolved");
                return Ok(Navigation::Unresolved);
            }
        };

        loop {
            let Resolution::Resolved(path) = resolution else {
                return Ok(Navigation::Unresolved);
            };
            match self.formatter.format(&path, path.language) {
                Ok(response) => {
                    return Ok(Navigation::Resolved {
                        node_id: path.target().id.clone(),
                        language: path.language,
                        confidence: path.confidence,
                        response,
                    })
                }
                Err(FormatError::Blocked(GuardReason::PathTooLong { steps })) if steps > 1 => {
                    tracing::info!(
                        node_id = %path.target().id,
                        steps,
                        "path too long, retrying at a coarser grain"
                    );
                    resolution =
                        match self.resolver.resolve_within(utterance, slots, language, steps - 1) {
                            Ok(resolution) => resolution,
                            Err(e) => {
                                tracing::warn!(error = %e, "coarser resolution failed");
                                return Ok(Navigation::Unresolved);
                            }
                        };
                }
                Err(FormatError::Blocked(reason)) => return Ok(Navigation::Blocked(reason)),
                Err(e) => return Err(e),
            }
        }
    }

    /// Renders the step trace to a node chosen directly, e.g. by keypad.
    pub fn render_node(&self, id: &str, language: Language) -> Result<RenderedResponse, FormatError> {
        let path = self.resolver.path_for(id, 1.0, language)?;
        self.formatter.format(&path, path.language)
    }
}
