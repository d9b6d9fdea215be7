//! Error types for Wikirace

use crate::types::AgentId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("unknown agent: {0}")]
    UnknownAgent(AgentId),

    #[error("no active task")]
    NoActiveTask,

    #[error("malformed {kind} event: {reason}")]
    MalformedEvent { kind: String, reason: String },

    #[error("no graph parent for node: {0}")]
    MissingParentNode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }

    pub fn malformed(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that reject a single event without touching task state.
    pub fn is_rejected_event(&self) -> bool {
        matches!(self, Self::MalformedEvent { .. } | Self::Json(_))
    }
}
