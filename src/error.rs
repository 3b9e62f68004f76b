//! Error types shared across the dashboard core.

use thiserror::Error;

/// Failure to produce a resource. Cloned to every caller waiting on the
/// same in-flight retrieval.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("failed to fetch {key}: {reason}")]
    Transport { key: String, reason: String },
    #[error("empty payload for {key}")]
    EmptyPayload { key: String },
    #[error("invalid JSON in {key}: {reason}")]
    Decode { key: String, reason: String },
}

impl FetchError {
    pub fn key(&self) -> &str {
        match self {
            FetchError::Transport { key, .. }
            | FetchError::EmptyPayload { key }
            | FetchError::Decode { key, .. } => key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FragmentError {
    #[error("invalid fragment name: {0:?}")]
    InvalidName(String),
    #[error("invalid value {value:?} for fragment entry {name}")]
    InvalidValue { name: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("option already defined: {0}")]
    DuplicateOption(String),
    #[error("no widget matches selector {0}")]
    UnknownWidget(String),
    #[error(transparent)]
    Fragment(#[from] FragmentError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("{target}: option {option} failed: {reason}")]
    Resolver {
        target: String,
        option: String,
        reason: String,
    },
    #[error("{target}: no option named {option}")]
    UnknownOption { target: String, option: String },
    #[error("{target}: option dependency cycle through {option}")]
    Cycle { target: String, option: String },
    #[error("{target}: render failed: {reason}")]
    Render { target: String, reason: String },
}

impl GraphError {
    pub fn target(&self) -> &str {
        match self {
            GraphError::Resolver { target, .. }
            | GraphError::UnknownOption { target, .. }
            | GraphError::Cycle { target, .. }
            | GraphError::Render { target, .. } => target,
        }
    }
}
