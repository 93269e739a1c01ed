//! Connection configuration
//!
//! Connection parameters come from the manifest's `connection` section, with
//! any missing field taken from the environment:
//!
//! | field | env |
//! |---|---|
//! | `api_url` | `IPA_API_URL` |
//! | `username` | `IPA_API_USERNAME` |
//! | `password` | `IPA_API_PASSWORD` |
//! | `tls_verify` | `IPA_TLS_VERIFY` |

use std::fmt;

use ipa_client::{HttpConfig, DEFAULT_REDIRECT_LIMIT};
use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, Result};
use crate::normalize::boolify;

/// A credential that never shows up in `Debug` output or logs.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Endpoint, principal and credential for one IPA server.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    /// Base API URL, e.g. `https://ipa.example.com/ipa`. Endpoints are appended.
    pub api_url: String,
    pub username: String,
    pub password: Secret,
    pub http: HttpConfig,
}

impl Connection {
    pub fn new(
        api_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<Secret>,
    ) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            http: HttpConfig::default(),
        }
    }

    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// Session cache key: endpoint followed by principal.
    pub fn cache_key(&self) -> String {
        format!("{}{}", self.api_url, self.username)
    }
}

/// `connection` section as written in a manifest.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionSpec {
    pub api_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<Secret>,
    pub tls_verify: Option<bool>,
    pub redirect_limit: Option<usize>,
    pub timeout_secs: Option<u64>,
}

impl ConnectionSpec {
    /// Fill gaps from the process environment.
    pub fn resolve(self) -> Result<Connection> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Fill gaps from `env`.
    pub fn resolve_with(self, env: impl Fn(&str) -> Option<String>) -> Result<Connection> {
        let api_url = self
            .api_url
            .or_else(|| env("IPA_API_URL"))
            .ok_or_else(|| missing("api_url", "IPA_API_URL"))?;
        let username = self
            .username
            .or_else(|| env("IPA_API_USERNAME"))
            .ok_or_else(|| missing("username", "IPA_API_USERNAME"))?;
        let password = self
            .password
            .or_else(|| env("IPA_API_PASSWORD").map(Secret::new))
            .ok_or_else(|| missing("password", "IPA_API_PASSWORD"))?;

        let tls_verify = match self.tls_verify {
            Some(flag) => flag,
            None => match env("IPA_TLS_VERIFY") {
                Some(raw) => boolify(&serde_json::Value::String(raw))?,
                None => false,
            },
        };

        let http = HttpConfig {
            tls_verify,
            redirect_limit: self.redirect_limit.unwrap_or(DEFAULT_REDIRECT_LIMIT),
            timeout_secs: self.timeout_secs,
        };

        Ok(Connection::new(api_url, username, password).with_http(http))
    }
}

fn missing(field: &str, env: &str) -> ReconcileError {
    ReconcileError::Manifest(format!(
        "connection.{field} is not set and {env} is not in the environment"
    ))
}
