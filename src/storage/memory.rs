//! In-memory store used by tests and demos.
//!
//! Implements every storage trait over plain locked collections. Seed
//! helpers (`add_product`, `add_customer`, ...) assign ids the way the SQL
//! backend would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::config::Integration;
use crate::entity::{Customer, EntityKind, Invoice, InvoiceItem, Order, OrderItem, Product};
use crate::log::{SyncLogEntry, SyncLogFilter};
use crate::mapping::EntityMapping;
use super::traits::{
    IntegrationStore, LocalStore, MappingStore, StoreError, SyncLogStore,
};

#[derive(Default)]
pub struct MemoryStore {
    mappings: RwLock<Vec<EntityMapping>>,
    logs: RwLock<Vec<SyncLogEntry>>,
    integrations: RwLock<HashMap<i64, Integration>>,
    products: RwLock<Vec<Product>>,
    customers: RwLock<Vec<Customer>>,
    orders: RwLock<Vec<Order>>,
    order_items: RwLock<Vec<OrderItem>>,
    invoices: RwLock<Vec<Invoice>>,
    invoice_items: RwLock<Vec<InvoiceItem>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    fn alloc_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // -- seed helpers -----------------------------------------------------

    pub fn put_integration(&self, integration: Integration) {
        self.integrations
            .write()
            .insert(integration.id, integration);
    }

    pub fn add_product(&self, mut product: Product) -> i64 {
        product.id = self.alloc_id();
        let id = product.id;
        self.products.write().push(product);
        id
    }

    pub fn add_customer(&self, mut customer: Customer) -> i64 {
        customer.id = self.alloc_id();
        let id = customer.id;
        self.customers.write().push(customer);
        id
    }

    pub fn add_order(&self, mut order: Order, items: Vec<OrderItem>) -> i64 {
        order.id = self.alloc_id();
        let id = order.id;
        self.orders.write().push(order);
        let mut all = self.order_items.write();
        for mut item in items {
            item.id = self.alloc_id();
            item.order_id = id;
            all.push(item);
        }
        id
    }

    pub fn add_invoice(&self, mut invoice: Invoice, items: Vec<InvoiceItem>) -> i64 {
        invoice.id = self.alloc_id();
        let id = invoice.id;
        self.invoices.write().push(invoice);
        let mut all = self.invoice_items.write();
        for mut item in items {
            item.id = self.alloc_id();
            item.invoice_id = id;
            all.push(item);
        }
        id
    }

    // -- inspection helpers for tests -------------------------------------

    #[must_use]
    pub fn all_mappings(&self) -> Vec<EntityMapping> {
        self.mappings.read().clone()
    }

    #[must_use]
    pub fn mapping_count(&self, kind: EntityKind) -> usize {
        self.mappings.read().iter().filter(|m| m.kind == kind).count()
    }
}

#[async_trait]
impl MappingStore for MemoryStore {
    async fn find_by_local(
        &self,
        integration_id: i64,
        kind: EntityKind,
        local_id: i64,
    ) -> Result<Option<EntityMapping>, StoreError> {
        Ok(self
            .mappings
            .read()
            .iter()
            .find(|m| {
                m.integration_id == integration_id && m.kind == kind && m.local_id == local_id
            })
            .cloned())
    }

    async fn find_by_remote(
        &self,
        integration_id: i64,
        kind: EntityKind,
        remote_id: i64,
    ) -> Result<Option<EntityMapping>, StoreError> {
        Ok(self
            .mappings
            .read()
            .iter()
            .find(|m| {
                m.integration_id == integration_id && m.kind == kind && m.remote_id == remote_id
            })
            .cloned())
    }

    async fn upsert(
        &self,
        integration_id: i64,
        kind: EntityKind,
        local_id: i64,
        remote_id: i64,
    ) -> Result<EntityMapping, StoreError> {
        let mut mappings = self.mappings.write();

        for existing in mappings.iter_mut() {
            if existing.integration_id != integration_id || existing.kind != kind {
                continue;
            }
            let local_hit = existing.local_id == local_id;
            let remote_hit = existing.remote_id == remote_id;
            if local_hit && remote_hit {
                existing.last_sync = Utc::now();
                return Ok(existing.clone());
            }
            if local_hit || remote_hit {
                return Err(StoreError::MappingConflict {
                    kind,
                    integration_id,
                    local_id,
                    remote_id,
                });
            }
        }

        let mapping = EntityMapping {
            integration_id,
            kind,
            local_id,
            remote_id,
            last_sync: Utc::now(),
        };
        mappings.push(mapping.clone());
        Ok(mapping)
    }
}

#[async_trait]
impl SyncLogStore for MemoryStore {
    async fn insert(&self, entry: &SyncLogEntry) -> Result<i64, StoreError> {
        let mut logs = self.logs.write();
        let mut stored = entry.clone();
        stored.id = self.alloc_id();
        let id = stored.id;
        logs.push(stored);
        Ok(id)
    }

    async fn finalize(&self, entry: &SyncLogEntry) -> Result<(), StoreError> {
        let mut logs = self.logs.write();
        let slot = logs
            .iter_mut()
            .find(|stored| stored.id == entry.id)
            .ok_or(StoreError::NotFound)?;
        *slot = entry.clone();
        Ok(())
    }

    async fn query(
        &self,
        filter: &SyncLogFilter,
        limit: Option<u32>,
    ) -> Result<Vec<SyncLogEntry>, StoreError> {
        let logs = self.logs.read();
        let mut hits: Vec<SyncLogEntry> = logs
            .iter()
            .filter(|e| filter.integration_id.map_or(true, |id| e.integration_id == id))
            .filter(|e| filter.entity.map_or(true, |kind| e.entity == kind))
            .filter(|e| filter.direction.map_or(true, |d| e.direction == d))
            .filter(|e| filter.status.map_or(true, |s| e.status == s))
            .filter(|e| filter.since.map_or(true, |t| e.started_at >= t))
            .filter(|e| filter.until.map_or(true, |t| e.started_at <= t))
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        if let Some(limit) = limit {
            hits.truncate(limit as usize);
        }
        Ok(hits)
    }
}

#[async_trait]
impl IntegrationStore for MemoryStore {
    async fn load(&self, integration_id: i64) -> Result<Integration, StoreError> {
        self.integrations
            .read()
            .get(&integration_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn save_watermark(
        &self,
        integration_id: i64,
        kind: EntityKind,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut integrations = self.integrations.write();
        let integration = integrations
            .get_mut(&integration_id)
            .ok_or(StoreError::NotFound)?;
        integration.set_watermark(kind, at);
        Ok(())
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn products_changed_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Product>, StoreError> {
        Ok(self
            .products
            .read()
            .iter()
            .filter(|p| since.map_or(true, |t| p.updated_at > t))
            .cloned()
            .collect())
    }

    async fn product(&self, id: i64) -> Result<Option<Product>, StoreError> {
        Ok(self.products.read().iter().find(|p| p.id == id).cloned())
    }

    async fn product_by_name(&self, name: &str) -> Result<Option<Product>, StoreError> {
        let needle = name.to_lowercase();
        Ok(self
            .products
            .read()
            .iter()
            .find(|p| p.name.to_lowercase().contains(&needle))
            .cloned())
    }

    async fn product_count(&self) -> Result<u64, StoreError> {
        Ok(self.products.read().len() as u64)
    }

    async fn insert_product(&self, product: &Product) -> Result<i64, StoreError> {
        let mut stored = product.clone();
        stored.id = self.alloc_id();
        let id = stored.id;
        self.products.write().push(stored);
        Ok(id)
    }

    async fn update_product(&self, product: &Product) -> Result<(), StoreError> {
        let mut products = self.products.write();
        let slot = products
            .iter_mut()
            .find(|p| p.id == product.id)
            .ok_or(StoreError::NotFound)?;
        *slot = product.clone();
        Ok(())
    }

    async fn customers_created_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Customer>, StoreError> {
        Ok(self
            .customers
            .read()
            .iter()
            .filter(|c| since.map_or(true, |t| c.created_at > t))
            .cloned()
            .collect())
    }

    async fn customer(&self, id: i64) -> Result<Option<Customer>, StoreError> {
        Ok(self.customers.read().iter().find(|c| c.id == id).cloned())
    }

    async fn customer_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError> {
        Ok(self
            .customers
            .read()
            .iter()
            .find(|c| c.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn username_taken(&self, username: &str) -> Result<bool, StoreError> {
        Ok(self.customers.read().iter().any(|c| c.username == username))
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<i64, StoreError> {
        let mut stored = customer.clone();
        stored.id = self.alloc_id();
        let id = stored.id;
        self.customers.write().push(stored);
        Ok(id)
    }

    async fn update_customer(&self, customer: &Customer) -> Result<(), StoreError> {
        let mut customers = self.customers.write();
        let slot = customers
            .iter_mut()
            .find(|c| c.id == customer.id)
            .ok_or(StoreError::NotFound)?;
        *slot = customer.clone();
        Ok(())
    }

    async fn orders_changed_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Order>, StoreError> {
        Ok(self
            .orders
            .read()
            .iter()
            .filter(|o| since.map_or(true, |t| o.updated_at > t))
            .cloned()
            .collect())
    }

    async fn order(&self, id: i64) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.read().iter().find(|o| o.id == id).cloned())
    }

    async fn order_by_code(&self, id_code: &str) -> Result<Option<Order>, StoreError> {
        Ok(self
            .orders
            .read()
            .iter()
            .find(|o| o.id_code == id_code)
            .cloned())
    }

    async fn order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, StoreError> {
        Ok(self
            .order_items
            .read()
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn order_count(&self) -> Result<u64, StoreError> {
        Ok(self.orders.read().len() as u64)
    }

    async fn insert_order(&self, order: &Order) -> Result<i64, StoreError> {
        let mut stored = order.clone();
        stored.id = self.alloc_id();
        let id = stored.id;
        self.orders.write().push(stored);
        Ok(id)
    }

    async fn update_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut orders = self.orders.write();
        let slot = orders
            .iter_mut()
            .find(|o| o.id == order.id)
            .ok_or(StoreError::NotFound)?;
        *slot = order.clone();
        Ok(())
    }

    async fn replace_order_items(
        &self,
        order_id: i64,
        items: &[OrderItem],
    ) -> Result<(), StoreError> {
        let mut all = self.order_items.write();
        all.retain(|i| i.order_id != order_id);
        for item in items {
            let mut stored = item.clone();
            stored.id = self.alloc_id();
            stored.order_id = order_id;
            all.push(stored);
        }
        Ok(())
    }

    async fn invoices_changed_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Invoice>, StoreError> {
        Ok(self
            .invoices
            .read()
            .iter()
            .filter(|i| since.map_or(true, |t| i.updated_at > t))
            .cloned()
            .collect())
    }

    async fn invoice(&self, id: i64) -> Result<Option<Invoice>, StoreError> {
        Ok(self.invoices.read().iter().find(|i| i.id == id).cloned())
    }

    async fn invoice_items(&self, invoice_id: i64) -> Result<Vec<InvoiceItem>, StoreError> {
        Ok(self
            .invoice_items
            .read()
            .iter()
            .filter(|i| i.invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    async fn invoice_count(&self) -> Result<u64, StoreError> {
        Ok(self.invoices.read().len() as u64)
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<i64, StoreError> {
        let mut stored = invoice.clone();
        stored.id = self.alloc_id();
        let id = stored.id;
        self.invoices.write().push(stored);
        Ok(id)
    }

    async fn update_invoice(&self, invoice: &Invoice) -> Result<(), StoreError> {
        let mut invoices = self.invoices.write();
        let slot = invoices
            .iter_mut()
            .find(|i| i.id == invoice.id)
            .ok_or(StoreError::NotFound)?;
        *slot = invoice.clone();
        Ok(())
    }

    async fn replace_invoice_items(
        &self,
        invoice_id: i64,
        items: &[InvoiceItem],
    ) -> Result<(), StoreError> {
        let mut all = self.invoice_items.write();
        all.retain(|i| i.invoice_id != invoice_id);
        for item in items {
            let mut stored = item.clone();
            stored.id = self.alloc_id();
            stored.invoice_id = invoice_id;
            all.push(stored);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_is_idempotent_for_the_same_pair() {
        let store = MemoryStore::new();
        store
            .upsert(1, EntityKind::Product, 10, 100)
            .await
            .unwrap();
        store
            .upsert(1, EntityKind::Product, 10, 100)
            .await
            .unwrap();
        assert_eq!(store.mapping_count(EntityKind::Product), 1);
    }

    #[tokio::test]
    async fn upsert_rejects_bijection_violations() {
        let store = MemoryStore::new();
        store
            .upsert(1, EntityKind::Product, 10, 100)
            .await
            .unwrap();

        let same_local = store.upsert(1, EntityKind::Product, 10, 200).await;
        assert!(matches!(
            same_local,
            Err(StoreError::MappingConflict { .. })
        ));

        let same_remote = store.upsert(1, EntityKind::Product, 20, 100).await;
        assert!(matches!(
            same_remote,
            Err(StoreError::MappingConflict { .. })
        ));

        // Different integration is a different bijection.
        store
            .upsert(2, EntityKind::Product, 10, 100)
            .await
            .unwrap();
        assert_eq!(store.mapping_count(EntityKind::Product), 2);
    }

    #[tokio::test]
    async fn log_query_is_newest_first_and_filtered() {
        use crate::entity::Direction;
        use crate::log::{SyncLogEntry, SyncLogFilter, SyncStatus};

        let store = MemoryStore::new();
        let mut first = SyncLogEntry::new(1, EntityKind::Product, Direction::Export);
        first.id = store.insert(&first).await.unwrap();
        let mut second = SyncLogEntry::new(1, EntityKind::Order, Direction::Import);
        second.started_at = first.started_at + chrono::Duration::seconds(5);
        second.id = store.insert(&second).await.unwrap();

        let all = store.query(&SyncLogFilter::default(), None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id);

        let orders_only = store
            .query(
                &SyncLogFilter {
                    entity: Some(EntityKind::Order),
                    status: Some(SyncStatus::Success),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(orders_only.len(), 1);
        assert_eq!(orders_only[0].entity, EntityKind::Order);
    }
}
