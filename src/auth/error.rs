//! Error types for agent authentication

use std::fmt;

/// Closed set of failure kinds for the agent-facing surface.
///
/// Callers branch on the variant, never on the message text; the payload is
/// the human-readable reason returned to the agent.
#[derive(Debug)]
pub enum AuthError {
    /// Missing/invalid credentials, malformed identifier, inaccessible
    /// group, or a failed provisioning transaction
    Unauthenticated(String),

    /// A referenced entity does not exist
    NotFound(String),

    /// A dependency failed in a retryable way
    Transient(String),

    /// The transport violated the call contract
    Protocol(String),
}

impl AuthError {
    /// The user-facing reason string.
    pub fn reason(&self) -> &str {
        match self {
            AuthError::Unauthenticated(reason)
            | AuthError::NotFound(reason)
            | AuthError::Transient(reason)
            | AuthError::Protocol(reason) => reason,
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Unauthenticated(reason) => write!(f, "unauthenticated: {}", reason),
            AuthError::NotFound(reason) => write!(f, "not found: {}", reason),
            AuthError::Transient(reason) => write!(f, "transient failure: {}", reason),
            AuthError::Protocol(reason) => write!(f, "protocol error: {}", reason),
        }
    }
}

impl std::error::Error for AuthError {}
