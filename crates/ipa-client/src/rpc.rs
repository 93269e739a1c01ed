//! JSON-RPC envelope used by the IPA `/session/json` endpoint
//!
//! Requests look like `{"id": 0, "method": "user_find/1", "params": [[args], {options}]}`
//! and responses like `{"result": {"result": <payload>, ...}, "error": null}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ClientError, Result};

/// One JSON-RPC call: a versioned method, positional args and named options.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcRequest {
    pub id: u64,
    pub method: String,
    pub params: (Vec<Value>, Map<String, Value>),
}

impl RpcRequest {
    /// New request for a method such as `"group_add/1"`.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            id: 0,
            method: method.into(),
            params: (Vec::new(), Map::new()),
        }
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.params.0.push(value.into());
        self
    }

    /// Set a named option.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.1.insert(key.into(), value.into());
        self
    }

    /// Merge a prepared option map, replacing same-named options.
    pub fn options(mut self, options: Map<String, Value>) -> Self {
        self.params.1.extend(options);
        self
    }

    pub fn args(&self) -> &[Value] {
        &self.params.0
    }

    pub fn named_options(&self) -> &Map<String, Value> {
        &self.params.1
    }
}

/// Parsed response body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Value,
    #[serde(default)]
    pub id: Value,
}

impl RpcResponse {
    /// Server error text, if the `error` field is populated.
    ///
    /// IPA usually sends an object with a `message`; that message is returned
    /// untouched. Any other non-null shape is returned as its JSON text.
    pub fn error_message(&self) -> Option<String> {
        match &self.error {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => Some(
                obj.get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| self.error.to_string()),
            ),
            other => Some(other.to_string()),
        }
    }

    /// Turn a populated `error` field into [`ClientError::Api`].
    pub fn into_result(self) -> Result<Self> {
        match self.error_message() {
            Some(message) => Err(ClientError::Api(message)),
            None => Ok(self),
        }
    }

    /// The `result.result` payload, or null when absent.
    pub fn payload(&self) -> &Value {
        self.result.get("result").unwrap_or(&Value::Null)
    }

    pub fn into_payload(mut self) -> Value {
        match self.result.get_mut("result") {
            Some(payload) => payload.take(),
            None => Value::Null,
        }
    }
}
