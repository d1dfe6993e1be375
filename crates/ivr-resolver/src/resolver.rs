//! Intent Resolver: maps an utterance to a path through the menu tree.

use crate::embedder::{cosine_similarity, TextEmbedder, VocabularyEmbedder};
use crate::error::ResolverError;
use crate::normalize::normalize;
use ivr_menu::{AuthRequirement, MenuNode, MenuTree, MAX_DEPTH};
use ivr_types::{Language, Slots};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Resolver thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Minimum score for a match to be accepted.
    pub acceptance_threshold: f32,
    /// The best score must beat the runner-up by at least this much.
    pub tie_margin: f32,
    /// Score multiplier for a node whose slot keys appear in the utterance.
    pub slot_boost: f32,
    /// Deepest node a resolution may return, in selections from the root.
    pub max_steps: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.5,
            tie_margin: 0.1,
            slot_boost: 1.25,
            max_steps: MAX_DEPTH,
        }
    }
}

/// A confident match, from the root down to the matched node.
///
/// Created fresh per turn and never persisted.
#[derive(Debug, Clone)]
pub struct ResolvedPath<'a> {
    /// Root first, matched node last.
    pub nodes: Vec<&'a MenuNode>,
    /// Used only for threshold decisions; never shown to the caller.
    pub confidence: f32,
    pub terminal_auth_requirement: Option<&'a AuthRequirement>,
    /// Language the response should be rendered in.
    pub language: Language,
}

impl<'a> ResolvedPath<'a> {
    /// The matched node.
    pub fn target(&self) -> &'a MenuNode {
        self.nodes[self.nodes.len() - 1]
    }

    /// The selections the caller makes: every node after the root.
    pub fn steps(&self) -> &[&'a MenuNode] {
        &self.nodes[1..]
    }

    pub fn node_ids(&self) -> Vec<&'a str> {
        self.nodes.iter().map(|node| node.id.as_str()).collect()
    }
}

impl PartialEq for ResolvedPath<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.node_ids() == other.node_ids()
            && self.confidence == other.confidence
            && self.language == other.language
    }
}

/// Outcome of resolving one utterance.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<'a> {
    Resolved(ResolvedPath<'a>),
    /// No confident match, or the top two candidates were too close to call.
    Unresolved,
}

impl<'a> Resolution<'a> {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    pub fn path(&self) -> Option<&ResolvedPath<'a>> {
        match self {
            Self::Resolved(path) => Some(path),
            Self::Unresolved => None,
        }
    }
}

/// A resolvable node with its phrase embeddings precomputed.
struct Candidate {
    id: String,
    language: Option<Language>,
    depth: usize,
    slot_keys: BTreeSet<String>,
    phrases: Vec<Vec<f32>>,
}

/// Scores utterances against node phrases.
///
/// Built once per menu tree and shared read-only by every session.
pub struct IntentResolver {
    tree: Arc<MenuTree>,
    embedder: Arc<dyn TextEmbedder>,
    config: ResolverConfig,
    candidates: Vec<Candidate>,
    /// Normalized tokens that name each language.
    language_names: BTreeMap<Language, BTreeSet<String>>,
}

impl std::fmt::Debug for IntentResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentResolver")
            .field("config", &self.config)
            .field("candidates", &self.candidates.len())
            .finish()
    }
}

impl IntentResolver {
    /// Builds a resolver backed by a [`VocabularyEmbedder`] over the tree's phrases.
    pub fn new(tree: Arc<MenuTree>, config: ResolverConfig) -> Result<Self, ResolverError> {
        let embedder = Arc::new(VocabularyEmbedder::from_tree(&tree));
        Self::with_embedder(tree, embedder, config)
    }

    /// Builds a resolver backed by an external embedder.
    pub fn with_embedder(
        tree: Arc<MenuTree>,
        embedder: Arc<dyn TextEmbedder>,
        config: ResolverConfig,
    ) -> Result<Self, ResolverError> {
        let mut candidates = Vec::new();
        for node in tree.nodes().filter(|node| node.is_resolvable()) {
            let phrases = node
                .phrases
                .iter()
                .map(|phrase| embedder.embed(phrase))
                .collect::<Result<Vec<_>, _>>()
                .map_err(ResolverError::Embedding)?;
            let mut slot_keys: BTreeSet<String> = node.slot_keys.iter().cloned().collect();
            if let Some(auth) = &node.auth_requirement {
                slot_keys.insert(auth.field.clone());
            }
            candidates.push(Candidate {
                id: node.id.clone(),
                language: node.language,
                depth: node.depth,
                slot_keys,
                phrases,
            });
        }

        let mut language_names = BTreeMap::new();
        for language in tree.languages() {
            let Some(node) = tree.language_node(language) else {
                continue;
            };
            let intent_phrases = node
                .intent
                .as_deref()
                .and_then(|intent| tree.intent_phrases(intent))
                .unwrap_or_default();
            let names: BTreeSet<String> = std::iter::once(&node.label)
                .chain(intent_phrases)
                .flat_map(|phrase| normalize(phrase))
                .collect();
            language_names.insert(language, names);
        }

        tracing::debug!(candidates = candidates.len(), "intent resolver ready");

        Ok(Self {
            tree,
            embedder,
            config,
            candidates,
            language_names,
        })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn tree(&self) -> &MenuTree {
        &self.tree
    }

    /// Resolves an utterance within the configured step limit.
    ///
    /// `language` is the session's sticky selection; without one, the tree's
    /// default language subtree is searched.
    pub fn resolve(
        &self,
        utterance: &str,
        slots: &Slots,
        language: Option<Language>,
    ) -> Result<Resolution<'_>, ResolverError> {
        self.resolve_within(utterance, slots, language, self.config.max_steps)
    }

    /// Resolves an utterance, accepting only nodes at most `max_steps`
    /// selections from the root. Used for the coarser retry after a path
    /// was rejected as too long.
    pub fn resolve_within(
        &self,
        utterance: &str,
        slots: &Slots,
        language: Option<Language>,
        max_steps: usize,
    ) -> Result<Resolution<'_>, ResolverError> {
        let tokens = normalize(utterance);

        if let Some(switch) = self.requested_language(&tokens) {
            let names = &self.language_names[&switch];
            let remainder: Vec<&str> = tokens
                .iter()
                .filter(|token| !names.contains(*token))
                .map(String::as_str)
                .collect();
            if !remainder.is_empty() {
                let query = self.embed(&remainder.join(" "))?;
                let resolution = self.best_match(&query, slots, switch, max_steps)?;
                if resolution.is_resolved() {
                    return Ok(resolution);
                }
            }
            if let Some(node) = self.tree.language_node(switch) {
                if node.depth <= max_steps {
                    tracing::debug!(language = %switch, "language switch requested");
                    return self.path_for(&node.id, 1.0, switch).map(Resolution::Resolved);
                }
            }
        }

        let language = language.unwrap_or_else(|| self.tree.default_language());
        let query = self.embed(utterance)?;
        self.best_match(&query, slots, language, max_steps)
    }

    /// The single language the tokens name, if exactly one is named.
    fn requested_language(&self, tokens: &[String]) -> Option<Language> {
        let mut mentioned = self
            .language_names
            .iter()
            .filter(|(_, names)| tokens.iter().any(|token| names.contains(token)))
            .map(|(language, _)| *language);
        match (mentioned.next(), mentioned.next()) {
            (Some(language), None) => Some(language),
            _ => None,
        }
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, ResolverError> {
        self.embedder.embed(text).map_err(ResolverError::Embedding)
    }

    fn best_match(
        &self,
        query: &[f32],
        slots: &Slots,
        language: Language,
        max_steps: usize,
    ) -> Result<Resolution<'_>, ResolverError> {
        let mut scored: Vec<(f32, &Candidate)> = self
            .candidates
            .iter()
            .filter(|c| c.depth <= max_steps && c.language.is_none_or(|l| l == language))
            .map(|c| (self.score(c, query, slots), c))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let Some(&(best, candidate)) = scored.first() else {
            return Ok(Resolution::Unresolved);
        };
        if best < self.config.acceptance_threshold {
            tracing::debug!(best, node_id = %candidate.id, "no candidate above threshold");
            return Ok(Resolution::Unresolved);
        }
        if let Some(&(runner_up, other)) = scored.get(1) {
            if best - runner_up < self.config.tie_margin {
                tracing::debug!(
                    best,
                    runner_up,
                    node_id = %candidate.id,
                    other_id = %other.id,
                    "ambiguous match"
                );
                return Ok(Resolution::Unresolved);
            }
        }

        tracing::debug!(node_id = %candidate.id, confidence = best, "resolved utterance");
        self.path_for(&candidate.id, best.min(1.0), language)
            .map(Resolution::Resolved)
    }

    fn score(&self, candidate: &Candidate, query: &[f32], slots: &Slots) -> f32 {
        let similarity = candidate
            .phrases
            .iter()
            .map(|phrase| cosine_similarity(query, phrase))
            .fold(0.0, f32::max);
        if slots.keys().any(|key| candidate.slot_keys.contains(key)) {
            similarity * self.config.slot_boost
        } else {
            similarity
        }
    }

    /// Builds the path to a known node, e.g. one selected by keypad.
    pub fn path_for(
        &self,
        id: &str,
        confidence: f32,
        language: Language,
    ) -> Result<ResolvedPath<'_>, ResolverError> {
        let nodes = self.tree.path_to(id)?;
        let target = nodes[nodes.len() - 1];
        Ok(ResolvedPath {
            terminal_auth_requirement: target.auth_requirement.as_ref(),
            language: target.language.unwrap_or(language),
            nodes,
            confidence,
        })
    }
}
