//! Storage backend traits.
//!
//! Four concerns, four traits:
//! - [`MappingStore`]: the local<->remote identity bijection
//! - [`SyncLogStore`]: the append-only audit log
//! - [`IntegrationStore`]: integration rows and their watermarks
//! - [`LocalStore`]: the host application's domain entities
//!
//! [`crate::storage::sql::SqlStore`] implements all four over SQL;
//! [`crate::storage::memory::MemoryStore`] implements them in memory for
//! tests and demos.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::Integration;
use crate::entity::{Customer, EntityKind, Invoice, InvoiceItem, Order, OrderItem, Product};
use crate::log::{SyncLogEntry, SyncLogFilter};
use crate::mapping::EntityMapping;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error(
        "mapping conflict for {kind} on integration {integration_id}: \
         ({local_id} -> {remote_id}) collides with an existing mapping"
    )]
    MappingConflict {
        kind: EntityKind,
        integration_id: i64,
        local_id: i64,
        remote_id: i64,
    },
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Lookup/upsert for the identity mapping tables.
#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn find_by_local(
        &self,
        integration_id: i64,
        kind: EntityKind,
        local_id: i64,
    ) -> Result<Option<EntityMapping>, StoreError>;

    async fn find_by_remote(
        &self,
        integration_id: i64,
        kind: EntityKind,
        remote_id: i64,
    ) -> Result<Option<EntityMapping>, StoreError>;

    /// Create the mapping, or touch `last_sync` when the exact pair
    /// already exists. A pair that collides with a *different* existing
    /// mapping on either side fails with [`StoreError::MappingConflict`].
    async fn upsert(
        &self,
        integration_id: i64,
        kind: EntityKind,
        local_id: i64,
        remote_id: i64,
    ) -> Result<EntityMapping, StoreError>;
}

/// Persistence for [`SyncLogEntry`] audit records.
#[async_trait]
pub trait SyncLogStore: Send + Sync {
    /// Persist a freshly opened entry, returning its assigned id.
    async fn insert(&self, entry: &SyncLogEntry) -> Result<i64, StoreError>;

    /// Write the finalized entry. Called exactly once per entry.
    async fn finalize(&self, entry: &SyncLogEntry) -> Result<(), StoreError>;

    /// Read entries newest-first.
    async fn query(
        &self,
        filter: &SyncLogFilter,
        limit: Option<u32>,
    ) -> Result<Vec<SyncLogEntry>, StoreError>;
}

/// Integration configuration rows.
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    async fn load(&self, integration_id: i64) -> Result<Integration, StoreError>;

    /// Advance one entity's watermark after a completed sync cycle.
    async fn save_watermark(
        &self,
        integration_id: i64,
        kind: EntityKind,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

/// Read/write access to the host application's domain entities. The sync
/// engine goes through this trait exclusively and never bypasses the
/// entities' own invariants.
#[async_trait]
pub trait LocalStore: Send + Sync {
    // -- products ---------------------------------------------------------

    /// Export changeset: all products when `since` is `None`, else those
    /// with `updated_at` strictly after it.
    async fn products_changed_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Product>, StoreError>;
    async fn product(&self, id: i64) -> Result<Option<Product>, StoreError>;
    /// Case-insensitive substring match on the product name, first hit.
    async fn product_by_name(&self, name: &str) -> Result<Option<Product>, StoreError>;
    async fn product_count(&self) -> Result<u64, StoreError>;
    /// Insert, returning the assigned id (the `id` field is ignored).
    async fn insert_product(&self, product: &Product) -> Result<i64, StoreError>;
    async fn update_product(&self, product: &Product) -> Result<(), StoreError>;

    // -- customers --------------------------------------------------------

    /// Export changeset keyed on account creation time.
    async fn customers_created_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Customer>, StoreError>;
    async fn customer(&self, id: i64) -> Result<Option<Customer>, StoreError>;
    async fn customer_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError>;
    async fn username_taken(&self, username: &str) -> Result<bool, StoreError>;
    async fn insert_customer(&self, customer: &Customer) -> Result<i64, StoreError>;
    async fn update_customer(&self, customer: &Customer) -> Result<(), StoreError>;

    // -- orders -----------------------------------------------------------

    async fn orders_changed_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Order>, StoreError>;
    async fn order(&self, id: i64) -> Result<Option<Order>, StoreError>;
    async fn order_by_code(&self, id_code: &str) -> Result<Option<Order>, StoreError>;
    async fn order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, StoreError>;
    async fn order_count(&self) -> Result<u64, StoreError>;
    async fn insert_order(&self, order: &Order) -> Result<i64, StoreError>;
    async fn update_order(&self, order: &Order) -> Result<(), StoreError>;
    /// Replace-all: delete the order's items and insert the given set.
    async fn replace_order_items(
        &self,
        order_id: i64,
        items: &[OrderItem],
    ) -> Result<(), StoreError>;

    // -- invoices ---------------------------------------------------------

    async fn invoices_changed_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Invoice>, StoreError>;
    async fn invoice(&self, id: i64) -> Result<Option<Invoice>, StoreError>;
    async fn invoice_items(&self, invoice_id: i64) -> Result<Vec<InvoiceItem>, StoreError>;
    async fn invoice_count(&self) -> Result<u64, StoreError>;
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<i64, StoreError>;
    async fn update_invoice(&self, invoice: &Invoice) -> Result<(), StoreError>;
    /// Replace-all: delete the invoice's items and insert the given set.
    async fn replace_invoice_items(
        &self,
        invoice_id: i64,
        items: &[InvoiceItem],
    ) -> Result<(), StoreError>;
}
