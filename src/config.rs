//! Integration configuration.
//!
//! One [`Integration`] row exists per configured remote ERP backend. It is
//! owned exclusively by the sync subsystem: the watermarks are mutated only
//! by a completed sync cycle, everything else only by administrative edits.
//!
//! # Example
//!
//! ```
//! use rentsync::config::{ConnectionConfig, Integration};
//!
//! let conn: ConnectionConfig = serde_json::from_str(r#"{
//!     "url": "https://erp.example.com",
//!     "database": "rental",
//!     "username": "sync-bot",
//!     "api_key": "secret"
//! }"#).unwrap();
//! assert_eq!(conn.company_id, 1);
//! assert_eq!(conn.version, "16.0");
//!
//! let integration = Integration::new(1, "main", conn);
//! assert!(integration.watermark(rentsync::EntityKind::Product).is_none());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityKind;

/// Connection descriptor for one remote ERP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Base server URL (e.g. `https://erp.example.com`)
    pub url: String,
    /// Database / tenant name
    pub database: String,
    /// Principal used for the RPC session
    pub username: String,
    /// API key or password
    pub api_key: String,
    /// Remote company id records are scoped to
    #[serde(default = "default_company_id")]
    pub company_id: i64,
    /// Remote protocol version (informational)
    #[serde(default = "default_version")]
    pub version: String,
}

/// Per-entity enable flags and sync intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPolicy {
    #[serde(default = "default_true")]
    pub sync_products: bool,
    #[serde(default = "default_true")]
    pub sync_customers: bool,
    #[serde(default = "default_true")]
    pub sync_orders: bool,
    #[serde(default = "default_true")]
    pub sync_invoices: bool,

    /// Intervals in minutes, consumed by an external scheduler.
    #[serde(default = "default_slow_interval")]
    pub product_sync_interval: u32,
    #[serde(default = "default_slow_interval")]
    pub customer_sync_interval: u32,
    #[serde(default = "default_fast_interval")]
    pub order_sync_interval: u32,
    #[serde(default = "default_fast_interval")]
    pub invoice_sync_interval: u32,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            sync_products: true,
            sync_customers: true,
            sync_orders: true,
            sync_invoices: true,
            product_sync_interval: default_slow_interval(),
            customer_sync_interval: default_slow_interval(),
            order_sync_interval: default_fast_interval(),
            invoice_sync_interval: default_fast_interval(),
        }
    }
}

impl SyncPolicy {
    #[must_use]
    pub fn enabled_for(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::Product => self.sync_products,
            EntityKind::Customer => self.sync_customers,
            EntityKind::Order => self.sync_orders,
            EntityKind::Invoice => self.sync_invoices,
        }
    }

    /// Sync interval in minutes for one entity type.
    #[must_use]
    pub fn interval_for(&self, kind: EntityKind) -> u32 {
        match kind {
            EntityKind::Product => self.product_sync_interval,
            EntityKind::Customer => self.customer_sync_interval,
            EntityKind::Order => self.order_sync_interval,
            EntityKind::Invoice => self.invoice_sync_interval,
        }
    }
}

/// One configured connection to a remote ERP backend, including the
/// per-entity watermarks that drive incremental sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Integration {
    pub id: i64,
    pub name: String,
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub policy: SyncPolicy,

    /// Last successful sync per entity. `None` means "full sync".
    #[serde(default)]
    pub last_product_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_customer_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_order_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_invoice_sync: Option<DateTime<Utc>>,
}

impl Integration {
    #[must_use]
    pub fn new(id: i64, name: impl Into<String>, connection: ConnectionConfig) -> Self {
        Self {
            id,
            name: name.into(),
            connection,
            policy: SyncPolicy::default(),
            last_product_sync: None,
            last_customer_sync: None,
            last_order_sync: None,
            last_invoice_sync: None,
        }
    }

    #[must_use]
    pub fn watermark(&self, kind: EntityKind) -> Option<DateTime<Utc>> {
        match kind {
            EntityKind::Product => self.last_product_sync,
            EntityKind::Customer => self.last_customer_sync,
            EntityKind::Order => self.last_order_sync,
            EntityKind::Invoice => self.last_invoice_sync,
        }
    }

    pub fn set_watermark(&mut self, kind: EntityKind, at: DateTime<Utc>) {
        match kind {
            EntityKind::Product => self.last_product_sync = Some(at),
            EntityKind::Customer => self.last_customer_sync = Some(at),
            EntityKind::Order => self.last_order_sync = Some(at),
            EntityKind::Invoice => self.last_invoice_sync = Some(at),
        }
    }
}

fn default_company_id() -> i64 {
    1
}
fn default_version() -> String {
    "16.0".to_string()
}
fn default_true() -> bool {
    true
}
fn default_slow_interval() -> u32 {
    60
}
fn default_fast_interval() -> u32 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> ConnectionConfig {
        ConnectionConfig {
            url: "http://localhost:8069".into(),
            database: "rental".into(),
            username: "bot".into(),
            api_key: "key".into(),
            company_id: 1,
            version: "16.0".into(),
        }
    }

    #[test]
    fn policy_defaults() {
        let policy = SyncPolicy::default();
        for kind in [
            EntityKind::Product,
            EntityKind::Customer,
            EntityKind::Order,
            EntityKind::Invoice,
        ] {
            assert!(policy.enabled_for(kind));
        }
        assert_eq!(policy.interval_for(EntityKind::Product), 60);
        assert_eq!(policy.interval_for(EntityKind::Invoice), 30);
    }

    #[test]
    fn watermark_roundtrip() {
        let mut integration = Integration::new(7, "main", connection());
        assert!(integration.watermark(EntityKind::Order).is_none());

        let now = Utc::now();
        integration.set_watermark(EntityKind::Order, now);
        assert_eq!(integration.watermark(EntityKind::Order), Some(now));
        // Other entities stay untouched.
        assert!(integration.watermark(EntityKind::Invoice).is_none());
    }
}
