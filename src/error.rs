// src/error.rs
use std::io;
use thiserror::Error;

/// Result type used throughout the hostpulse library
pub type Result<T> = std::result::Result<T, AgentError>;

/// Custom Error type for the hostpulse agent
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Collection error: {0}")]
    Collection(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Rejected by server with HTTP status {status}")]
    Rejected { status: u16 },

    #[error("{context} failed after {attempts} attempts: {source}")]
    Retry {
        context: String,
        attempts: usize,
        #[source]
        source: Box<AgentError>,
    },

    #[error("Other error: {0}")]
    Other(String),
}

impl AgentError {
    /// Build a collection error from any displayable cause
    pub fn collection(cause: impl std::fmt::Display) -> Self {
        AgentError::Collection(cause.to_string())
    }

    /// Wrap the last error of an exhausted retry loop
    pub fn retry(context: &str, attempts: usize, source: AgentError) -> Self {
        AgentError::Retry {
            context: context.to_string(),
            attempts,
            source: Box::new(source),
        }
    }

    /// Whether repeating the same operation later might succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AgentError::Io(_)
                | AgentError::Connection(_)
                | AgentError::Timeout(_)
                | AgentError::Delivery(_)
        )
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AgentError::Timeout(err.to_string())
        } else if err.is_connect() {
            AgentError::Connection(err.to_string())
        } else {
            AgentError::Delivery(err.to_string())
        }
    }
}

impl From<config::ConfigError> for AgentError {
    fn from(err: config::ConfigError) -> Self {
        AgentError::Config(err.to_string())
    }
}
