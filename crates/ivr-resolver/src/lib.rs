//! Intent resolution for the IVR navigator.
//!
//! [`IntentResolver`] scores every resolvable node of the caller's language
//! subtree by cosine similarity between the utterance and the node's
//! phrases, boosts nodes whose slots were extracted, and accepts the best
//! candidate only if it clears the acceptance threshold *and* beats the
//! runner-up by the tie margin. Ambiguity always degrades to
//! [`Resolution::Unresolved`], never to an arbitrary pick.

mod embedder;
mod error;
pub mod normalize;
mod resolver;

pub use embedder::{cosine_similarity, TextEmbedder, VocabularyEmbedder};
pub use error::ResolverError;
pub use resolver::{IntentResolver, Resolution, ResolvedPath, ResolverConfig};
