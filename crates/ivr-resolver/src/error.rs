use ivr_menu::MenuError;

/// Errors that can occur while resolving an utterance.
///
/// A low-confidence or ambiguous match is not an error; it is
/// [`Resolution::Unresolved`](crate::Resolution::Unresolved).
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    /// The embedder could not produce a vector.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// A candidate id did not resolve against the tree.
    #[error(transparent)]
    Menu(#[from] MenuError),
}
