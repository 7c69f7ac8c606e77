//! Typed failure modes for the ask pipeline.

use std::time::Duration;

use thiserror::Error;

use crate::types::ChannelId;

/// A live session already occupies the destination.
#[derive(Debug, Error)]
#[error("a question is already awaiting a reply in this destination")]
pub struct AlreadyExists;

/// The session already reached a terminal state (or was evicted).
#[derive(Debug, Error)]
#[error("session already settled")]
pub struct AlreadyTerminal;

/// Errors raised by the chat transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed before the backend answered.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with an error.
    #[error("chat api error: {0}")]
    Api(String),

    /// An internal worker stopped before reporting a result.
    #[error("transport worker stopped before reporting a result")]
    Aborted,
}

/// Outcome of an `ask` that did not produce a reply.
#[derive(Debug, Error)]
pub enum AskError {
    /// The destination already has a question awaiting its reply.
    #[error("a question is already pending in {destination}")]
    ConcurrentQuestion { destination: ChannelId },

    /// The question could not be posted or the event stream failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The deadline elapsed with no qualifying reply. A normal outcome,
    /// not an unexpected failure.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// The caller withdrew the question.
    #[error("question cancelled before a reply arrived")]
    Cancelled,
}
