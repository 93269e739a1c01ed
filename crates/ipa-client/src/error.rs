//! Error types for the IPA HTTP client

use thiserror::Error;

/// Everything that can go wrong talking to the directory API.
///
/// None of these are retried here; the caller decides what a failure means
/// for the entity it was working on.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("authentication failed for '{principal}' at {url}: code={status} body={body}")]
    Authentication {
        principal: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("Received API error from IPA: {0}")]
    Api(String),

    #[error("HTTP redirect too deep: {method} {url} exceeded {limit} requests")]
    RedirectLimit {
        method: String,
        url: String,
        limit: usize,
    },

    #[error("HTTP {method} {url} failed: code={status} message={message} body={body}")]
    Status {
        method: String,
        url: String,
        status: u16,
        message: String,
        body: String,
    },

    #[error("HTTP {method} {url} answered {status} without a Location header")]
    MissingLocation {
        method: String,
        url: String,
        status: u16,
    },

    #[error("Invalid URL '{url}': {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Response body is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { status, .. }
            | Self::Status { status, .. }
            | Self::MissingLocation { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
