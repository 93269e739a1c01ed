//! Authenticated IPA session
//!
//! `SessionClient::login` posts the credentials once and keeps the returned
//! session cookie as a persistent `Cookie` header; every later call reuses it.

use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, COOKIE, REFERER, SET_COOKIE,
};
use reqwest::Method;
use tracing::{debug, info};

use crate::error::{ClientError, Result};
use crate::http::{HttpClient, HttpConfig, RequestBody};
use crate::rpc::{RpcRequest, RpcResponse};

/// Form-encoded password login endpoint, relative to the API URL.
pub const LOGIN_ENDPOINT: &str = "/session/login_password";

/// JSON-RPC endpoint, relative to the API URL.
pub const JSON_ENDPOINT: &str = "/session/json";

/// HTTP handle bound to one (endpoint, principal) pair.
#[derive(Debug, Clone)]
pub struct SessionClient {
    base_url: String,
    principal: String,
    http: HttpClient,
}

impl SessionClient {
    /// Log in with a username and password and return the authenticated client.
    ///
    /// The login endpoint answers in plain text, so the body is not parsed;
    /// success is a 2xx status plus at least one `Set-Cookie` header.
    pub async fn login(
        base_url: &str,
        username: &str,
        password: &str,
        config: &HttpConfig,
    ) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();

        let mut http = HttpClient::new(config)?;
        http.set_header(REFERER, &base_url)?;
        http.set_header(CONTENT_TYPE, "application/json")?;

        let mut login_headers = HeaderMap::new();
        login_headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        login_headers.insert(ACCEPT, HeaderValue::from_static("text/plain"));

        let url = format!("{base_url}{LOGIN_ENDPOINT}");
        let form = RequestBody::Form(vec![
            ("user".to_string(), username.to_string()),
            ("password".to_string(), password.to_string()),
        ]);

        let response = match http
            .request(Method::POST, &url, &form, &login_headers)
            .await
        {
            Ok(response) => response,
            Err(ClientError::Status { status, body, .. }) => {
                return Err(ClientError::Authentication {
                    principal: username.to_string(),
                    url,
                    status,
                    body,
                })
            }
            Err(e) => return Err(e),
        };

        let cookie = session_cookie(response.headers());
        if cookie.is_empty() {
            return Err(ClientError::Authentication {
                principal: username.to_string(),
                url,
                status: response.status().as_u16(),
                body: "login response carried no session cookie".to_string(),
            });
        }
        http.set_header(COOKIE, &cookie)?;

        info!(principal = %username, url = %base_url, "IPA session established");

        Ok(Self {
            base_url,
            principal: username.to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Persistent headers, including the session cookie.
    pub fn headers(&self) -> &HeaderMap {
        self.http.headers()
    }

    pub fn make_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Issue one JSON-RPC call.
    ///
    /// The HTTP status is not authoritative: a 200 whose body has a non-null
    /// `error` field is returned as [`ClientError::Api`].
    pub async fn call(&self, request: &RpcRequest) -> Result<RpcResponse> {
        let url = self.make_url(JSON_ENDPOINT);
        let body = RequestBody::Json(serde_json::to_value(request)?);
        debug!(method = %request.method, args = ?request.args(), "IPA call");

        let response = self
            .http
            .request(Method::POST, &url, &body, &HeaderMap::new())
            .await?;
        let text = response.text().await?;
        let parsed: RpcResponse = serde_json::from_str(&text)?;
        parsed.into_result()
    }

    /// Issue a call and return its `result.result` payload.
    pub async fn call_payload(&self, request: &RpcRequest) -> Result<serde_json::Value> {
        Ok(self.call(request).await?.into_payload())
    }
}

/// Build a `Cookie` header value from every `Set-Cookie` header.
///
/// Only each cookie's `name=value` pair is kept; attributes such as `Path`
/// and `HttpOnly` are for the user agent, not for sending back.
pub fn session_cookie(headers: &HeaderMap) -> String {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|c| c.split(';').next())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}
