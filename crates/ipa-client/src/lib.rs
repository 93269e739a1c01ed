//! IPA API client
//!
//! HTTP plumbing for the FreeIPA JSON-RPC API:
//! - [`HttpClient`]: persistent headers, manual redirect following with a hop limit
//! - [`SessionClient`]: password login, session cookie persistence, JSON-RPC calls
//! - [`RpcRequest`] / [`RpcResponse`]: the `{id, method, params}` envelope
//!
//! # Usage
//!
//! ```ignore
//! use ipa_client::{HttpConfig, RpcRequest, SessionClient};
//!
//! let client = SessionClient::login(
//!     "https://ipa.example.com/ipa",
//!     "admin",
//!     "secret",
//!     &HttpConfig::default(),
//! )
//! .await?;
//!
//! let users = client
//!     .call_payload(&RpcRequest::new("user_find/1").option("all", true))
//!     .await?;
//! ```

pub mod error;
pub mod http;
pub mod rpc;
pub mod session;

pub use error::{ClientError, Result};
pub use http::{HttpClient, HttpConfig, RequestBody, DEFAULT_REDIRECT_LIMIT};
pub use rpc::{RpcRequest, RpcResponse};
pub use session::{session_cookie, SessionClient, JSON_ENDPOINT, LOGIN_ENDPOINT};
