use ivr_menu::MenuError;
use ivr_policy::GuardReason;
use ivr_resolver::ResolverError;
use ivr_types::TurnState;

/// Rendering failures.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// The security guard vetoed the rendered text.
    #[error("response blocked: {0}")]
    Blocked(GuardReason),

    #[error(transparent)]
    Menu(#[from] MenuError),

    #[error(transparent)]
    Resolver(#[from] ResolverError),
}

/// Errors that can occur while driving a dialogue session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The requested transition is not allowed from the current state.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: TurnState, to: TurnState },

    #[error(transparent)]
    Menu(#[from] MenuError),

    #[error(transparent)]
    Resolver(#[from] ResolverError),
}
