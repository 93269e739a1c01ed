//! Low-level HTTP transport
//!
//! Thin wrapper over `reqwest` that owns a persistent header set and follows
//! redirects itself. Automatic redirects are disabled on the inner client so
//! that a redirected POST is re-sent as a POST with the same body, and so the
//! hop limit produces a diagnosable error instead of a generic one.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use reqwest::{Client, Method, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ClientError, Result};

/// Maximum number of requests issued for one logical call, redirects included.
pub const DEFAULT_REDIRECT_LIMIT: usize = 10;

/// Transport settings shared by every client bound to one connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Verify the server's TLS certificate chain.
    ///
    /// **Disabled by default.** IPA servers are routinely deployed with a
    /// certificate issued by their own internal CA, which the host running
    /// this tool may not trust yet. Turn this on wherever the CA is
    /// installed; a warning is logged every time a client is built without it.
    pub tls_verify: bool,

    /// Requests allowed per call, following redirects. Exceeding it is fatal.
    pub redirect_limit: usize,

    /// Whole-request timeout. `None` leaves it to the transport.
    pub timeout_secs: Option<u64>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            tls_verify: false,
            redirect_limit: DEFAULT_REDIRECT_LIMIT,
            timeout_secs: None,
        }
    }
}

/// Body of an outgoing request. Kept owned so it can be re-sent on redirect.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
    Text(String),
}

/// HTTP handle with a persistent header set.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    headers: HeaderMap,
    redirect_limit: usize,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        if !config.tls_verify {
            warn!("TLS certificate verification is disabled for the IPA API client");
        }

        let mut builder = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(!config.tls_verify);
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
            headers: HeaderMap::new(),
            redirect_limit: config.redirect_limit,
        })
    }

    /// Headers sent with every request.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Merge `headers` into the persistent set, replacing same-named entries.
    pub fn update_headers(&mut self, headers: HeaderMap) {
        for (name, value) in headers.iter() {
            self.headers.insert(name.clone(), value.clone());
        }
    }

    pub fn set_header(&mut self, name: HeaderName, value: &str) -> Result<()> {
        self.headers.insert(name, HeaderValue::from_str(value)?);
        Ok(())
    }

    /// Execute a request, following redirects up to the configured limit.
    ///
    /// `extra` headers are layered over the persistent set for this call only.
    /// A 2xx response is returned as-is; any other non-redirect status is an
    /// error carrying method, URL, status, reason and body.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: &RequestBody,
        extra: &HeaderMap,
    ) -> Result<Response> {
        let mut target = parse_url(url)?;

        let mut headers = self.headers.clone();
        for (name, value) in extra.iter() {
            headers.insert(name.clone(), value.clone());
        }

        for hop in 0..self.redirect_limit {
            debug!(method = %method, url = %target, hop, "http request");

            let builder = self
                .client
                .request(method.clone(), target.clone())
                .headers(headers.clone());
            let builder = match body {
                RequestBody::Empty => builder,
                RequestBody::Json(value) => builder.json(value),
                RequestBody::Form(pairs) => builder.form(pairs),
                RequestBody::Text(text) => builder.body(text.clone()),
            };

            let response = builder.send().await?;
            let status = response.status();
            debug!(method = %method, url = %target, status = status.as_u16(), "http response");

            if status.is_success() {
                return Ok(response);
            }

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| ClientError::MissingLocation {
                        method: method.to_string(),
                        url: target.to_string(),
                        status: status.as_u16(),
                    })?;
                target = target.join(location).map_err(|source| ClientError::Url {
                    url: location.to_string(),
                    source,
                })?;
                continue;
            }

            let message = status.canonical_reason().unwrap_or_default().to_string();
            let body = response.text().await.unwrap_or_default();
            debug!(
                method = %method,
                url = %target,
                status = status.as_u16(),
                body = %body,
                "http error response"
            );
            return Err(ClientError::Status {
                method: method.to_string(),
                url: target.to_string(),
                status: status.as_u16(),
                message,
                body,
            });
        }

        Err(ClientError::RedirectLimit {
            method: method.to_string(),
            url: url.to_string(),
            limit: self.redirect_limit,
        })
    }
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|source| ClientError::Url {
        url: url.to_string(),
        source,
    })
}
