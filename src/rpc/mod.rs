// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote ERP client.
//!
//! [`OdooClient`] wraps a single authenticated session to one remote
//! endpoint and exposes four primitives: [`ErpClient::search_read`],
//! [`ErpClient::create`], [`ErpClient::write`] and [`ErpClient::unlink`].
//!
//! Construction fails closed: if authentication does not succeed the
//! client is never handed out, and there is no implicit re-authentication
//! later. Every primitive fault is surfaced as
//! [`SyncError::RemoteCall`] carrying the model and method; callers must
//! not assume partial success from a raised error. Retries are a
//! caller-level policy (see [`crate::resilience::retry`]), never done here.

pub mod jsonrpc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::error::SyncError;
use jsonrpc::JsonRpcTransport;

/// Datetime format used by the remote in `write_date` filters and fields.
pub const REMOTE_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";
/// Date-only format used for order/invoice date fields.
pub const REMOTE_DATE_FMT: &str = "%Y-%m-%d";

/// One `(field, operator, value)` term of a remote search domain.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DomainTerm(pub String, pub String, pub Value);

impl DomainTerm {
    #[must_use]
    pub fn new(field: impl Into<String>, op: impl Into<String>, value: Value) -> Self {
        Self(field.into(), op.into(), value)
    }

    #[must_use]
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, "=", value)
    }

    #[must_use]
    pub fn gt(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, ">", value)
    }
}

/// A remote search domain: all terms are ANDed.
pub type Domain = Vec<DomainTerm>;

/// A remote record as returned by `search_read`.
pub type RemoteRecord = Map<String, Value>;

/// Pagination and ordering options for [`ErpClient::search_read`].
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub limit: Option<u32>,
    pub offset: u32,
    pub order: Option<String>,
}

/// The four primitives the synchronizers need from the remote ERP.
///
/// Implemented by [`OdooClient`] for production and by scriptable fakes in
/// tests.
#[async_trait]
pub trait ErpClient: Send + Sync {
    async fn search_read(
        &self,
        model: &str,
        domain: &Domain,
        fields: &[&str],
        opts: &SearchOptions,
    ) -> Result<Vec<RemoteRecord>, SyncError>;

    /// Create one record, returning its remote id.
    async fn create(&self, model: &str, values: Value) -> Result<i64, SyncError>;

    /// Update records in place.
    async fn write(&self, model: &str, ids: &[i64], values: Value) -> Result<bool, SyncError>;

    /// Delete records.
    async fn unlink(&self, model: &str, ids: &[i64]) -> Result<bool, SyncError>;
}

/// Stateful session client for an Odoo-compatible backend.
pub struct OdooClient {
    transport: JsonRpcTransport,
    database: String,
    api_key: String,
    uid: i64,
}

impl OdooClient {
    /// Authenticate against the `common` service and return a connected
    /// client. Any failure here means no client exists at all.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, SyncError> {
        let transport = JsonRpcTransport::new(&config.url)
            .map_err(|e| SyncError::Connection(e.to_string()))?;

        let result = transport
            .call(
                "common",
                "authenticate",
                json!([config.database, config.username, config.api_key, {}]),
            )
            .await
            .map_err(|e| SyncError::Connection(e.to_string()))?;

        // Odoo returns `false` (not an error) on bad credentials.
        let uid = result
            .as_i64()
            .filter(|uid| *uid > 0)
            .ok_or_else(|| SyncError::Connection("authentication failed".into()))?;

        info!(url = %config.url, database = %config.database, uid, "connected to remote ERP");
        Ok(Self {
            transport,
            database: config.database.clone(),
            api_key: config.api_key.clone(),
            uid,
        })
    }

    /// Remote user id of the authenticated session.
    #[must_use]
    pub fn uid(&self) -> i64 {
        self.uid
    }

    async fn execute_kw(
        &self,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value, SyncError> {
        debug!(model, method, "remote call");
        self.transport
            .call(
                "object",
                "execute_kw",
                json!([self.database, self.uid, self.api_key, model, method, args, kwargs]),
            )
            .await
            .map_err(|e| SyncError::RemoteCall {
                model: model.to_string(),
                method: method.to_string(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl ErpClient for OdooClient {
    async fn search_read(
        &self,
        model: &str,
        domain: &Domain,
        fields: &[&str],
        opts: &SearchOptions,
    ) -> Result<Vec<RemoteRecord>, SyncError> {
        let mut kwargs = Map::new();
        kwargs.insert("domain".into(), serde_json::to_value(domain).unwrap_or_default());
        kwargs.insert("fields".into(), json!(fields));
        if let Some(limit) = opts.limit {
            kwargs.insert("limit".into(), json!(limit));
        }
        if opts.offset > 0 {
            kwargs.insert("offset".into(), json!(opts.offset));
        }
        if let Some(order) = &opts.order {
            kwargs.insert("order".into(), json!(order));
        }

        let result = self
            .execute_kw(model, "search_read", json!([[]]), Value::Object(kwargs))
            .await?;

        match result {
            Value::Array(rows) => rows
                .into_iter()
                .map(|row| match row {
                    Value::Object(map) => Ok(map),
                    other => Err(SyncError::RemoteCall {
                        model: model.to_string(),
                        method: "search_read".to_string(),
                        message: format!("expected record object, got {other}"),
                    }),
                })
                .collect(),
            other => Err(SyncError::RemoteCall {
                model: model.to_string(),
                method: "search_read".to_string(),
                message: format!("expected record list, got {other}"),
            }),
        }
    }

    async fn create(&self, model: &str, values: Value) -> Result<i64, SyncError> {
        let result = self
            .execute_kw(model, "create", json!([values]), json!({}))
            .await?;
        // Single-record create returns the id; batch create returns a list.
        result
            .as_i64()
            .or_else(|| result.get(0).and_then(Value::as_i64))
            .ok_or_else(|| SyncError::RemoteCall {
                model: model.to_string(),
                method: "create".to_string(),
                message: format!("expected record id, got {result}"),
            })
    }

    async fn write(&self, model: &str, ids: &[i64], values: Value) -> Result<bool, SyncError> {
        let result = self
            .execute_kw(model, "write", json!([ids, values]), json!({}))
            .await?;
        Ok(result.as_bool().unwrap_or(true))
    }

    async fn unlink(&self, model: &str, ids: &[i64]) -> Result<bool, SyncError> {
        let result = self
            .execute_kw(model, "unlink", json!([ids]), json!({}))
            .await?;
        Ok(result.as_bool().unwrap_or(true))
    }
}

/// Helpers for reading remote record fields. Odoo sends `false` for empty
/// or unset values regardless of the field type, so every accessor treats
/// `false`, `null` and absence the same way.
pub mod row {
    use super::{RemoteRecord, SyncError, Value};

    /// Optional string field.
    #[must_use]
    pub fn opt_str(record: &RemoteRecord, key: &str) -> Option<String> {
        match record.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    /// String field, empty when unset.
    #[must_use]
    pub fn text(record: &RemoteRecord, key: &str) -> String {
        opt_str(record, key).unwrap_or_default()
    }

    /// Numeric field, `0.0` when unset.
    #[must_use]
    pub fn number(record: &RemoteRecord, key: &str) -> f64 {
        record.get(key).and_then(Value::as_f64).unwrap_or(0.0)
    }

    /// Optional integer field.
    #[must_use]
    pub fn opt_int(record: &RemoteRecord, key: &str) -> Option<i64> {
        record.get(key).and_then(Value::as_i64)
    }

    /// Many-to-one fields arrive as `[id, display_name]`; plain ids also
    /// occur in line records.
    #[must_use]
    pub fn many2one(record: &RemoteRecord, key: &str) -> Option<i64> {
        match record.get(key) {
            Some(Value::Array(pair)) => pair.first().and_then(Value::as_i64),
            Some(value) => value.as_i64(),
            None => None,
        }
    }

    /// Integer field that the remote schema guarantees, e.g. `id`.
    pub fn required_int(record: &RemoteRecord, key: &str, model: &str) -> Result<i64, SyncError> {
        opt_int(record, key).ok_or_else(|| SyncError::RemoteCall {
            model: model.to_string(),
            method: "search_read".to_string(),
            message: format!("record is missing required field '{key}'"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_serializes_as_triplet_list() {
        let domain: Domain = vec![
            DomainTerm::eq("customer", json!(true)),
            DomainTerm::gt("write_date", json!("2026-01-01 00:00:00")),
        ];
        let value = serde_json::to_value(&domain).unwrap();
        assert_eq!(value, json!([["customer", "=", true],
                                 ["write_date", ">", "2026-01-01 00:00:00"]]));
    }

    #[test]
    fn row_helpers_treat_false_as_unset() {
        let record: RemoteRecord = serde_json::from_value(json!({
            "id": 42,
            "name": "Alice",
            "email": false,
            "list_price": 12.5,
            "partner_id": [7, "Alice"]
        }))
        .unwrap();

        assert_eq!(row::opt_str(&record, "email"), None);
        assert_eq!(row::text(&record, "missing"), "");
        assert_eq!(row::number(&record, "list_price"), 12.5);
        assert_eq!(row::many2one(&record, "partner_id"), Some(7));
        assert_eq!(row::required_int(&record, "id", "res.partner").unwrap(), 42);
        assert!(row::required_int(&record, "email", "res.partner").is_err());
    }
}
