//! Error and discard types for the session endpoints.

use chrono::{DateTime, Utc};
use thiserror::Error;
use wristlink_common::DecodeError;

/// Errors returned synchronously by session operations.
///
/// None of these leave a trace in the session: the state machine and the
/// in-flight record are exactly as they were before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// `start` was called on a session that is already running.
    #[error("a workout session is already active")]
    AlreadyActive,

    /// The session has not started yet, or has already ended.
    #[error("no workout session is active")]
    NoActiveSession,

    /// The session was finalized and cannot be restarted.
    #[error("the workout session has been finalized")]
    SessionFinalized,

    /// The transport refused the outbound message.
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),
}

/// Failures of a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The receiving end is gone.
    #[error("the link to the peer is closed")]
    Closed,

    /// The link is up but did not take the message.
    #[error("the link rejected the message: {0}")]
    Rejected(String),
}

/// Why an inbound message was dropped without touching the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscardReason {
    /// The payload could not be decoded into an envelope.
    #[error("malformed message: {0}")]
    Malformed(#[from] DecodeError),

    /// The message travels in the wrong direction for this side of the link.
    #[error("`{type_tag}` messages are not accepted on this side of the link")]
    UnexpectedDirection {
        /// Type tag of the rejected message
        type_tag: &'static str,
    },

    /// The session was finalized before the message arrived.
    #[error("the session is closed")]
    SessionClosed,

    /// The message was created before the current session started.
    #[error("message from {timestamp} predates the session start at {started_at}")]
    Stale {
        /// Creation time carried by the message
        timestamp: DateTime<Utc>,
        /// When the local session started
        started_at: DateTime<Utc>,
    },
}
