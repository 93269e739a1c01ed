//! Error handling for the convergence layer
//!
//! Every variant is fatal for the entity being reconciled. Nothing in this
//! crate retries; the driver isolates one entity's failure from the next.

use ipa_client::ClientError;
use thiserror::Error;

use crate::normalize::NormalizeError;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Authentication, application (`error` field) or transport failure.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// A directory attribute was not in any of the expected shapes.
    #[error(transparent)]
    Shape(#[from] NormalizeError),

    #[error("Invalid desired state for {kind} '{name}': {message}")]
    InvalidDesired {
        kind: &'static str,
        name: String,
        message: String,
    },

    #[error("Command `{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ReconcileError {
    pub fn invalid(kind: &'static str, name: &str, message: impl Into<String>) -> Self {
        Self::InvalidDesired {
            kind,
            name: name.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
