// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! JSON-RPC 2.0 transport for the Odoo `/jsonrpc` endpoint.
//!
//! Odoo exposes all RPC services through a single HTTP endpoint; requests
//! name a `service` ("common" for authentication, "object" for model
//! calls) and a `method` with positional args:
//!
//! ```json
//! {
//!   "jsonrpc": "2.0",
//!   "method": "call",
//!   "params": {"service": "object", "method": "execute_kw", "args": [...]},
//!   "id": 1
//! }
//! ```
//!
//! The transport is deliberately dumb: one request, one response, no retry
//! and no session handling. [`crate::rpc::OdooClient`] owns the session.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// A fault surfaced by the transport or the remote endpoint.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct RpcFault {
    pub message: String,
}

impl RpcFault {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: RpcParams<'a>,
    id: u64,
}

#[derive(Serialize)]
struct RpcParams<'a> {
    service: &'a str,
    method: &'a str,
    args: Value,
}

pub struct JsonRpcTransport {
    http: reqwest::Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl JsonRpcTransport {
    pub fn new(base_url: &str) -> Result<Self, RpcFault> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| RpcFault::new(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: format!("{}/jsonrpc", base_url.trim_end_matches('/')),
            next_id: AtomicU64::new(1),
        })
    }

    /// Perform one RPC call and return the `result` payload.
    pub async fn call(&self, service: &str, method: &str, args: Value) -> Result<Value, RpcFault> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method: "call",
            params: RpcParams {
                service,
                method,
                args,
            },
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let started = std::time::Instant::now();
        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcFault::new(format!("transport error: {e}")))?;
        crate::metrics::record_rpc(service, method, started.elapsed());

        let status = response.status();
        if !status.is_success() {
            return Err(RpcFault::new(format!("HTTP {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RpcFault::new(format!("malformed response: {e}")))?;

        if let Some(error) = body.get("error") {
            return Err(RpcFault::new(fault_message(error)));
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }
}

/// Odoo nests the useful message under `error.data.message`; fall back to
/// the outer message, then to the raw error object.
fn fault_message(error: &Value) -> String {
    error
        .pointer("/data/message")
        .or_else(|| error.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string())
}
