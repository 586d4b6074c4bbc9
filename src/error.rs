//! Parley error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::AgentId;
use crate::session::SessionStatus;

/// Errors surfaced synchronously to the caller
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Session was built with an empty agent set
    #[error("No agents configured")]
    NoAgentsConfigured,

    /// Two agents registered under the same id
    #[error("Duplicate agent id: {0}")]
    DuplicateAgent(AgentId),

    /// Rejected setup value
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Agent not found
    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    /// Turn selector could not pick a speaker
    #[error("Selection failure: {0}")]
    SelectionFailure(String),

    /// Operation on a session that already reached a terminal status
    #[error("Session already {0}")]
    SessionClosed(SessionStatus),

    /// Session ended abnormally while the caller was waiting on it
    #[error("Session aborted: {0}")]
    Aborted(AbortReason),

    /// Configuration source could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl ParleyError {
    /// True for errors raised while assembling a session
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NoAgentsConfigured
                | Self::DuplicateAgent(_)
                | Self::InvalidConfiguration(_)
                | Self::Config(_)
        )
    }
}

impl From<figment::Error> for ParleyError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

/// Failure reported by a responder for a single call
#[derive(Debug, Error)]
pub enum ResponderError {
    /// Backend unreachable, rate limited or timed out
    #[error("Responder unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),

    /// Backend answered with empty or malformed output
    #[error("Responder returned invalid output: {0}")]
    InvalidOutput(String),
}

impl ResponderError {
    pub fn unavailable(msg: impl std::fmt::Display) -> Self {
        Self::Unavailable(anyhow::anyhow!("{msg}"))
    }

    pub fn kind(&self) -> ResponderFailureKind {
        match self {
            Self::Unavailable(_) => ResponderFailureKind::Unavailable,
            Self::InvalidOutput(_) => ResponderFailureKind::InvalidOutput,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponderFailureKind {
    Unavailable,
    InvalidOutput,
}

/// Machine-readable reason attached to an aborted session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum AbortReason {
    SelectionFailure {
        message: String,
    },
    ResponderFailure {
        agent_id: AgentId,
        kind: ResponderFailureKind,
        attempts: usize,
        message: String,
    },
    RunawayLoop {
        limit: usize,
    },
    CancelledByCaller,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SelectionFailure { message } => write!(f, "selection failure: {message}"),
            Self::ResponderFailure {
                agent_id,
                attempts,
                message,
                ..
            } => write!(
                f,
                "responder for {agent_id} failed after {attempts} attempt(s): {message}"
            ),
            Self::RunawayLoop { limit } => write!(f, "safety ceiling of {limit} turns reached"),
            Self::CancelledByCaller => f.write_str("cancelled by caller"),
        }
    }
}
