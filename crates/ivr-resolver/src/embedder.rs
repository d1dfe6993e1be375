//! Text embedding for intent scoring.

use crate::normalize::normalize;
use std::collections::BTreeMap;

/// A text embedding model.
///
/// The default [`VocabularyEmbedder`] is deterministic and needs no external
/// service; an NLU collaborator can supply its own implementation.
pub trait TextEmbedder: Send + Sync {
    /// Embeds a text string into a vector of floats.
    fn embed(&self, text: &str) -> Result<Vec<f32>, String>;
}

/// Bag-of-words embedder over a fixed vocabulary.
///
/// Each dimension is one normalized token drawn from the menu's phrases;
/// tokens outside the vocabulary are ignored, so filler words never dilute a
/// match.
#[derive(Debug, Clone, Default)]
pub struct VocabularyEmbedder {
    vocabulary: BTreeMap<String, usize>,
}

impl VocabularyEmbedder {
    /// Builds the vocabulary from a set of phrases.
    pub fn new<'a>(phrases: impl IntoIterator<Item = &'a str>) -> Self {
        let mut vocabulary = BTreeMap::new();
        for phrase in phrases {
            for token in normalize(phrase) {
                let next = vocabulary.len();
                vocabulary.entry(token).or_insert(next);
            }
        }
        Self { vocabulary }
    }

    /// Builds the vocabulary from every phrase in a menu tree.
    pub fn from_tree(tree: &ivr_menu::MenuTree) -> Self {
        Self::new(
            tree.nodes()
                .flat_map(|node| node.phrases.iter().map(String::as_str)),
        )
    }

    pub fn len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.vocabulary.contains_key(token)
    }
}

impl TextEmbedder for VocabularyEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        let mut vector = vec![0.0; self.vocabulary.len()];
        for token in normalize(text) {
            if let Some(&index) = self.vocabulary.get(&token) {
                vector[index] = 1.0;
            }
        }
        Ok(vector)
    }
}

/// Calculates the cosine similarity between two vectors.
///
/// Mismatched or zero vectors score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}
