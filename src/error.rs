use thiserror::Error;

/// Failures of the request/response data service.
///
/// An ambiguous response (non-error, but missing the authoritative message id)
/// is its own variant and is always handled as a failure, never a success:
/// silently dropping the user's text is worse than a retry affordance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("ambiguous response: {0}")]
    Ambiguous(String),
}

/// Failures of the push channel. Disconnection is silent at this layer:
/// presence freezes at the last known state and the surrounding shell owns
/// reconnecting and resubscribing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("channel disconnected")]
    Disconnected,
    #[error("subscribe failed: {0}")]
    Subscribe(String),
}
