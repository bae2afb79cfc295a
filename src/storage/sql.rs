// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL storage backend (SQLite for single-node, MySQL for shared setups).
//!
//! One pool serves all four storage traits. Layout:
//! - `integrations` — one row per configured remote backend, watermarks
//!   as nullable epoch-millis columns
//! - `product_mappings` / `customer_mappings` / `order_mappings` /
//!   `invoice_mappings` — the identity bijections, enforced by
//!   `PRIMARY KEY (integration_id, local_id)` plus
//!   `UNIQUE (integration_id, remote_id)`
//! - `sync_logs` — append-only audit entries; per-record detail as JSON
//!   in a TEXT column (the sqlx `Any` driver has no native JSON mapping)
//! - `products`, `customers`, `orders`, `order_items`, `invoices`,
//!   `invoice_items` — the host domain tables
//!
//! All timestamps are epoch millis in BIGINT columns; calendar dates are
//! `YYYY-MM-DD` TEXT. Status enums are stored as their serde string form.

use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{Any, AnyPool, QueryBuilder, Row};

use crate::config::{ConnectionConfig, Integration, SyncPolicy};
use crate::entity::{
    Customer, EntityKind, Invoice, InvoiceItem, Order, OrderItem, Product,
};
use crate::log::{SyncDetail, SyncLogEntry, SyncLogFilter};
use crate::mapping::EntityMapping;
use super::traits::{
    IntegrationStore, LocalStore, MappingStore, StoreError, SyncLogStore,
};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

pub struct SqlStore {
    pool: AnyPool,
    is_sqlite: bool,
}

impl SqlStore {
    /// Connect and bootstrap the schema.
    pub async fn new(connection_string: &str) -> Result<Self, StoreError> {
        install_drivers();

        let is_sqlite = connection_string.starts_with("sqlite:");
        let pool = AnyPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(connection_string)
            .await
            .map_err(backend)?;

        let store = Self { pool, is_sqlite };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let auto_pk = if self.is_sqlite {
            "INTEGER PRIMARY KEY AUTOINCREMENT"
        } else {
            "BIGINT PRIMARY KEY AUTO_INCREMENT"
        };

        let mut statements = vec![
            "CREATE TABLE IF NOT EXISTS integrations (
                id BIGINT PRIMARY KEY,
                name VARCHAR(100) NOT NULL,
                url TEXT NOT NULL,
                database_name VARCHAR(100) NOT NULL,
                username VARCHAR(100) NOT NULL,
                api_key VARCHAR(255) NOT NULL,
                company_id BIGINT NOT NULL,
                version VARCHAR(10) NOT NULL,
                sync_products BIGINT NOT NULL,
                sync_customers BIGINT NOT NULL,
                sync_orders BIGINT NOT NULL,
                sync_invoices BIGINT NOT NULL,
                product_sync_interval BIGINT NOT NULL,
                customer_sync_interval BIGINT NOT NULL,
                order_sync_interval BIGINT NOT NULL,
                invoice_sync_interval BIGINT NOT NULL,
                last_product_sync BIGINT,
                last_customer_sync BIGINT,
                last_order_sync BIGINT,
                last_invoice_sync BIGINT
            )"
            .to_string(),
        ];

        for table in [
            "product_mappings",
            "customer_mappings",
            "order_mappings",
            "invoice_mappings",
        ] {
            statements.push(format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    integration_id BIGINT NOT NULL,
                    local_id BIGINT NOT NULL,
                    remote_id BIGINT NOT NULL,
                    last_sync BIGINT NOT NULL,
                    PRIMARY KEY (integration_id, local_id),
                    UNIQUE (integration_id, remote_id)
                )"
            ));
        }

        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS sync_logs (
                id {auto_pk},
                integration_id BIGINT NOT NULL,
                entity VARCHAR(20) NOT NULL,
                direction VARCHAR(10) NOT NULL,
                status VARCHAR(10) NOT NULL,
                started_at BIGINT NOT NULL,
                records_processed BIGINT NOT NULL,
                records_succeeded BIGINT NOT NULL,
                records_failed BIGINT NOT NULL,
                error_message TEXT,
                detail TEXT
            )"
        ));

        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS products (
                id {auto_pk},
                id_code VARCHAR(20) NOT NULL UNIQUE,
                name VARCHAR(255) NOT NULL,
                sku VARCHAR(50) NOT NULL,
                description TEXT NOT NULL,
                rental_price DOUBLE PRECISION NOT NULL,
                replacement_value DOUBLE PRECISION NOT NULL,
                stock BIGINT NOT NULL,
                available_for_rent BIGINT NOT NULL,
                status VARCHAR(20) NOT NULL,
                updated_at BIGINT NOT NULL
            )"
        ));

        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS customers (
                id {auto_pk},
                username VARCHAR(150) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL,
                first_name VARCHAR(150) NOT NULL,
                last_name VARCHAR(150) NOT NULL,
                phone VARCHAR(20) NOT NULL,
                address TEXT NOT NULL,
                created_at BIGINT NOT NULL
            )"
        ));

        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS orders (
                id {auto_pk},
                id_code VARCHAR(20) NOT NULL UNIQUE,
                customer_id BIGINT NOT NULL,
                order_date VARCHAR(10) NOT NULL,
                status VARCHAR(20) NOT NULL,
                payment_status VARCHAR(20) NOT NULL,
                total_amount DOUBLE PRECISION NOT NULL,
                notes TEXT NOT NULL,
                updated_at BIGINT NOT NULL
            )"
        ));

        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS order_items (
                id {auto_pk},
                order_id BIGINT NOT NULL,
                product_id BIGINT NOT NULL,
                quantity BIGINT NOT NULL,
                price DOUBLE PRECISION NOT NULL,
                subtotal DOUBLE PRECISION NOT NULL
            )"
        ));

        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS invoices (
                id {auto_pk},
                id_code VARCHAR(20) NOT NULL UNIQUE,
                number VARCHAR(50) NOT NULL UNIQUE,
                customer_id BIGINT NOT NULL,
                issue_date VARCHAR(10) NOT NULL,
                due_date VARCHAR(10) NOT NULL,
                status VARCHAR(20) NOT NULL,
                amount DOUBLE PRECISION NOT NULL,
                paid_amount DOUBLE PRECISION NOT NULL,
                notes TEXT NOT NULL,
                updated_at BIGINT NOT NULL
            )"
        ));

        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS invoice_items (
                id {auto_pk},
                invoice_id BIGINT NOT NULL,
                description TEXT NOT NULL,
                quantity BIGINT NOT NULL,
                unit_price DOUBLE PRECISION NOT NULL,
                amount DOUBLE PRECISION NOT NULL
            )"
        ));

        for statement in statements {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(backend)?;
        }
        Ok(())
    }

    /// Save or replace an integration row. Administrative surface; the
    /// engine itself only touches watermarks.
    pub async fn save_integration(&self, integration: &Integration) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM integrations WHERE id = ?")
            .bind(integration.id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        sqlx::query(
            "INSERT INTO integrations (
                id, name, url, database_name, username, api_key, company_id, version,
                sync_products, sync_customers, sync_orders, sync_invoices,
                product_sync_interval, customer_sync_interval,
                order_sync_interval, invoice_sync_interval,
                last_product_sync, last_customer_sync,
                last_order_sync, last_invoice_sync
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(integration.id)
        .bind(&integration.name)
        .bind(&integration.connection.url)
        .bind(&integration.connection.database)
        .bind(&integration.connection.username)
        .bind(&integration.connection.api_key)
        .bind(integration.connection.company_id)
        .bind(&integration.connection.version)
        .bind(i64::from(integration.policy.sync_products))
        .bind(i64::from(integration.policy.sync_customers))
        .bind(i64::from(integration.policy.sync_orders))
        .bind(i64::from(integration.policy.sync_invoices))
        .bind(i64::from(integration.policy.product_sync_interval))
        .bind(i64::from(integration.policy.customer_sync_interval))
        .bind(i64::from(integration.policy.order_sync_interval))
        .bind(i64::from(integration.policy.invoice_sync_interval))
        .bind(integration.last_product_sync.map(millis))
        .bind(integration.last_customer_sync.map(millis))
        .bind(integration.last_order_sync.map(millis))
        .bind(integration.last_invoice_sync.map(millis))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn last_insert_id(
        &self,
        conn: &mut sqlx::pool::PoolConnection<Any>,
    ) -> Result<i64, StoreError> {
        let sql = if self.is_sqlite {
            "SELECT last_insert_rowid()"
        } else {
            "SELECT LAST_INSERT_ID()"
        };
        let row = sqlx::query(sql)
            .fetch_one(conn.as_mut())
            .await
            .map_err(backend)?;
        row.try_get::<i64, _>(0).map_err(backend)
    }
}

fn backend(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn date_str(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(s: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(backend)
}

/// Status enums round-trip through their serde string form.
fn enum_str<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn parse_enum<T: DeserializeOwned>(s: &str) -> Result<T, StoreError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|e| StoreError::Backend(format!("unknown enum value '{s}': {e}")))
}

fn mapping_table(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Product => "product_mappings",
        EntityKind::Customer => "customer_mappings",
        EntityKind::Order => "order_mappings",
        EntityKind::Invoice => "invoice_mappings",
    }
}

fn watermark_column(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Product => "last_product_sync",
        EntityKind::Customer => "last_customer_sync",
        EntityKind::Order => "last_order_sync",
        EntityKind::Invoice => "last_invoice_sync",
    }
}

fn mapping_from_row(kind: EntityKind, row: &AnyRow) -> Result<EntityMapping, StoreError> {
    Ok(EntityMapping {
        integration_id: row.try_get("integration_id").map_err(backend)?,
        kind,
        local_id: row.try_get("local_id").map_err(backend)?,
        remote_id: row.try_get("remote_id").map_err(backend)?,
        last_sync: from_millis(row.try_get("last_sync").map_err(backend)?),
    })
}

fn product_from_row(row: &AnyRow) -> Result<Product, StoreError> {
    Ok(Product {
        id: row.try_get("id").map_err(backend)?,
        id_code: row.try_get("id_code").map_err(backend)?,
        name: row.try_get("name").map_err(backend)?,
        sku: row.try_get("sku").map_err(backend)?,
        description: row.try_get("description").map_err(backend)?,
        rental_price: row.try_get("rental_price").map_err(backend)?,
        replacement_value: row.try_get("replacement_value").map_err(backend)?,
        stock: row.try_get("stock").map_err(backend)?,
        available_for_rent: row.try_get("available_for_rent").map_err(backend)?,
        status: parse_enum(&row.try_get::<String, _>("status").map_err(backend)?)?,
        updated_at: from_millis(row.try_get("updated_at").map_err(backend)?),
    })
}

fn customer_from_row(row: &AnyRow) -> Result<Customer, StoreError> {
    Ok(Customer {
        id: row.try_get("id").map_err(backend)?,
        username: row.try_get("username").map_err(backend)?,
        email: row.try_get("email").map_err(backend)?,
        first_name: row.try_get("first_name").map_err(backend)?,
        last_name: row.try_get("last_name").map_err(backend)?,
        phone: row.try_get("phone").map_err(backend)?,
        address: row.try_get("address").map_err(backend)?,
        created_at: from_millis(row.try_get("created_at").map_err(backend)?),
    })
}

fn order_from_row(row: &AnyRow) -> Result<Order, StoreError> {
    Ok(Order {
        id: row.try_get("id").map_err(backend)?,
        id_code: row.try_get("id_code").map_err(backend)?,
        customer_id: row.try_get("customer_id").map_err(backend)?,
        order_date: parse_date(&row.try_get::<String, _>("order_date").map_err(backend)?)?,
        status: parse_enum(&row.try_get::<String, _>("status").map_err(backend)?)?,
        payment_status: parse_enum(&row.try_get::<String, _>("payment_status").map_err(backend)?)?,
        total_amount: row.try_get("total_amount").map_err(backend)?,
        notes: row.try_get("notes").map_err(backend)?,
        updated_at: from_millis(row.try_get("updated_at").map_err(backend)?),
    })
}

fn order_item_from_row(row: &AnyRow) -> Result<OrderItem, StoreError> {
    Ok(OrderItem {
        id: row.try_get("id").map_err(backend)?,
        order_id: row.try_get("order_id").map_err(backend)?,
        product_id: row.try_get("product_id").map_err(backend)?,
        quantity: row.try_get("quantity").map_err(backend)?,
        price: row.try_get("price").map_err(backend)?,
        subtotal: row.try_get("subtotal").map_err(backend)?,
    })
}

fn invoice_from_row(row: &AnyRow) -> Result<Invoice, StoreError> {
    Ok(Invoice {
        id: row.try_get("id").map_err(backend)?,
        id_code: row.try_get("id_code").map_err(backend)?,
        number: row.try_get("number").map_err(backend)?,
        customer_id: row.try_get("customer_id").map_err(backend)?,
        issue_date: parse_date(&row.try_get::<String, _>("issue_date").map_err(backend)?)?,
        due_date: parse_date(&row.try_get::<String, _>("due_date").map_err(backend)?)?,
        status: parse_enum(&row.try_get::<String, _>("status").map_err(backend)?)?,
        amount: row.try_get("amount").map_err(backend)?,
        paid_amount: row.try_get("paid_amount").map_err(backend)?,
        notes: row.try_get("notes").map_err(backend)?,
        updated_at: from_millis(row.try_get("updated_at").map_err(backend)?),
    })
}

fn invoice_item_from_row(row: &AnyRow) -> Result<InvoiceItem, StoreError> {
    Ok(InvoiceItem {
        id: row.try_get("id").map_err(backend)?,
        invoice_id: row.try_get("invoice_id").map_err(backend)?,
        description: row.try_get("description").map_err(backend)?,
        quantity: row.try_get("quantity").map_err(backend)?,
        unit_price: row.try_get("unit_price").map_err(backend)?,
        amount: row.try_get("amount").map_err(backend)?,
    })
}

fn log_from_row(row: &AnyRow) -> Result<SyncLogEntry, StoreError> {
    let detail: SyncDetail = match row.try_get::<Option<String>, _>("detail").map_err(backend)? {
        Some(json) if !json.is_empty() => serde_json::from_str(&json).map_err(backend)?,
        _ => SyncDetail::default(),
    };
    Ok(SyncLogEntry {
        id: row.try_get("id").map_err(backend)?,
        integration_id: row.try_get("integration_id").map_err(backend)?,
        entity: parse_enum(&row.try_get::<String, _>("entity").map_err(backend)?)?,
        direction: parse_enum(&row.try_get::<String, _>("direction").map_err(backend)?)?,
        status: parse_enum(&row.try_get::<String, _>("status").map_err(backend)?)?,
        started_at: from_millis(row.try_get("started_at").map_err(backend)?),
        records_processed: row.try_get::<i64, _>("records_processed").map_err(backend)? as u64,
        records_succeeded: row.try_get::<i64, _>("records_succeeded").map_err(backend)? as u64,
        records_failed: row.try_get::<i64, _>("records_failed").map_err(backend)? as u64,
        error_message: row.try_get("error_message").map_err(backend)?,
        detail,
    })
}

#[async_trait]
impl MappingStore for SqlStore {
    async fn find_by_local(
        &self,
        integration_id: i64,
        kind: EntityKind,
        local_id: i64,
    ) -> Result<Option<EntityMapping>, StoreError> {
        let sql = format!(
            "SELECT integration_id, local_id, remote_id, last_sync FROM {} \
             WHERE integration_id = ? AND local_id = ?",
            mapping_table(kind)
        );
        let row = sqlx::query(&sql)
            .bind(integration_id)
            .bind(local_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(|r| mapping_from_row(kind, &r)).transpose()
    }

    async fn find_by_remote(
        &self,
        integration_id: i64,
        kind: EntityKind,
        remote_id: i64,
    ) -> Result<Option<EntityMapping>, StoreError> {
        let sql = format!(
            "SELECT integration_id, local_id, remote_id, last_sync FROM {} \
             WHERE integration_id = ? AND remote_id = ?",
            mapping_table(kind)
        );
        let row = sqlx::query(&sql)
            .bind(integration_id)
            .bind(remote_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(|r| mapping_from_row(kind, &r)).transpose()
    }

    async fn upsert(
        &self,
        integration_id: i64,
        kind: EntityKind,
        local_id: i64,
        remote_id: i64,
    ) -> Result<EntityMapping, StoreError> {
        // Lookup-before-create; the unique constraints are the backstop.
        let by_local = self.find_by_local(integration_id, kind, local_id).await?;
        let by_remote = self.find_by_remote(integration_id, kind, remote_id).await?;

        match (&by_local, &by_remote) {
            (Some(a), Some(b)) if a.local_id == b.local_id && a.remote_id == b.remote_id => {
                let now = Utc::now();
                let sql = format!(
                    "UPDATE {} SET last_sync = ? WHERE integration_id = ? AND local_id = ?",
                    mapping_table(kind)
                );
                sqlx::query(&sql)
                    .bind(millis(now))
                    .bind(integration_id)
                    .bind(local_id)
                    .execute(&self.pool)
                    .await
                    .map_err(backend)?;
                let mut touched = a.clone();
                touched.last_sync = now;
                Ok(touched)
            }
            (None, None) => {
                let now = Utc::now();
                let sql = format!(
                    "INSERT INTO {} (integration_id, local_id, remote_id, last_sync) \
                     VALUES (?, ?, ?, ?)",
                    mapping_table(kind)
                );
                sqlx::query(&sql)
                    .bind(integration_id)
                    .bind(local_id)
                    .bind(remote_id)
                    .bind(millis(now))
                    .execute(&self.pool)
                    .await
                    .map_err(backend)?;
                Ok(EntityMapping {
                    integration_id,
                    kind,
                    local_id,
                    remote_id,
                    last_sync: now,
                })
            }
            _ => Err(StoreError::MappingConflict {
                kind,
                integration_id,
                local_id,
                remote_id,
            }),
        }
    }
}

#[async_trait]
impl SyncLogStore for SqlStore {
    async fn insert(&self, entry: &SyncLogEntry) -> Result<i64, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        sqlx::query(
            "INSERT INTO sync_logs (
                integration_id, entity, direction, status, started_at,
                records_processed, records_succeeded, records_failed,
                error_message, detail
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.integration_id)
        .bind(enum_str(&entry.entity))
        .bind(enum_str(&entry.direction))
        .bind(enum_str(&entry.status))
        .bind(millis(entry.started_at))
        .bind(entry.records_processed as i64)
        .bind(entry.records_succeeded as i64)
        .bind(entry.records_failed as i64)
        .bind(entry.error_message.clone())
        .bind(serde_json::to_string(&entry.detail).map_err(backend)?)
        .execute(conn.as_mut())
        .await
        .map_err(backend)?;
        self.last_insert_id(&mut conn).await
    }

    async fn finalize(&self, entry: &SyncLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE sync_logs SET
                status = ?, records_processed = ?, records_succeeded = ?,
                records_failed = ?, error_message = ?, detail = ?
             WHERE id = ?",
        )
        .bind(enum_str(&entry.status))
        .bind(entry.records_processed as i64)
        .bind(entry.records_succeeded as i64)
        .bind(entry.records_failed as i64)
        .bind(entry.error_message.clone())
        .bind(serde_json::to_string(&entry.detail).map_err(backend)?)
        .bind(entry.id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn query(
        &self,
        filter: &SyncLogFilter,
        limit: Option<u32>,
    ) -> Result<Vec<SyncLogEntry>, StoreError> {
        let mut qb = QueryBuilder::<Any>::new(
            "SELECT id, integration_id, entity, direction, status, started_at, \
             records_processed, records_succeeded, records_failed, error_message, detail \
             FROM sync_logs WHERE 1=1",
        );
        if let Some(id) = filter.integration_id {
            qb.push(" AND integration_id = ").push_bind(id);
        }
        if let Some(kind) = filter.entity {
            qb.push(" AND entity = ").push_bind(enum_str(&kind));
        }
        if let Some(direction) = filter.direction {
            qb.push(" AND direction = ").push_bind(enum_str(&direction));
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(enum_str(&status));
        }
        if let Some(since) = filter.since {
            qb.push(" AND started_at >= ").push_bind(millis(since));
        }
        if let Some(until) = filter.until {
            qb.push(" AND started_at <= ").push_bind(millis(until));
        }
        qb.push(" ORDER BY started_at DESC, id DESC");
        if let Some(limit) = limit {
            qb.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(log_from_row).collect()
    }
}

#[async_trait]
impl IntegrationStore for SqlStore {
    async fn load(&self, integration_id: i64) -> Result<Integration, StoreError> {
        let row = sqlx::query("SELECT * FROM integrations WHERE id = ?")
            .bind(integration_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound)?;

        Ok(Integration {
            id: row.try_get("id").map_err(backend)?,
            name: row.try_get("name").map_err(backend)?,
            connection: ConnectionConfig {
                url: row.try_get("url").map_err(backend)?,
                database: row.try_get("database_name").map_err(backend)?,
                username: row.try_get("username").map_err(backend)?,
                api_key: row.try_get("api_key").map_err(backend)?,
                company_id: row.try_get("company_id").map_err(backend)?,
                version: row.try_get("version").map_err(backend)?,
            },
            policy: SyncPolicy {
                sync_products: row.try_get::<i64, _>("sync_products").map_err(backend)? != 0,
                sync_customers: row.try_get::<i64, _>("sync_customers").map_err(backend)? != 0,
                sync_orders: row.try_get::<i64, _>("sync_orders").map_err(backend)? != 0,
                sync_invoices: row.try_get::<i64, _>("sync_invoices").map_err(backend)? != 0,
                product_sync_interval: row
                    .try_get::<i64, _>("product_sync_interval")
                    .map_err(backend)? as u32,
                customer_sync_interval: row
                    .try_get::<i64, _>("customer_sync_interval")
                    .map_err(backend)? as u32,
                order_sync_interval: row
                    .try_get::<i64, _>("order_sync_interval")
                    .map_err(backend)? as u32,
                invoice_sync_interval: row
                    .try_get::<i64, _>("invoice_sync_interval")
                    .map_err(backend)? as u32,
            },
            last_product_sync: row
                .try_get::<Option<i64>, _>("last_product_sync")
                .map_err(backend)?
                .map(from_millis),
            last_customer_sync: row
                .try_get::<Option<i64>, _>("last_customer_sync")
                .map_err(backend)?
                .map(from_millis),
            last_order_sync: row
                .try_get::<Option<i64>, _>("last_order_sync")
                .map_err(backend)?
                .map(from_millis),
            last_invoice_sync: row
                .try_get::<Option<i64>, _>("last_invoice_sync")
                .map_err(backend)?
                .map(from_millis),
        })
    }

    async fn save_watermark(
        &self,
        integration_id: i64,
        kind: EntityKind,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE integrations SET {} = ? WHERE id = ?",
            watermark_column(kind)
        );
        let result = sqlx::query(&sql)
            .bind(millis(at))
            .bind(integration_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl LocalStore for SqlStore {
    async fn products_changed_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Product>, StoreError> {
        let rows = match since {
            Some(t) => {
                sqlx::query("SELECT * FROM products WHERE updated_at > ? ORDER BY id")
                    .bind(millis(t))
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT * FROM products ORDER BY id")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(backend)?;
        rows.iter().map(product_from_row).collect()
    }

    async fn product(&self, id: i64) -> Result<Option<Product>, StoreError> {
        sqlx::query("SELECT * FROM products WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(|r| product_from_row(&r))
            .transpose()
    }

    async fn product_by_name(&self, name: &str) -> Result<Option<Product>, StoreError> {
        sqlx::query("SELECT * FROM products WHERE LOWER(name) LIKE ? ORDER BY id")
            .bind(format!("%{}%", name.to_lowercase()))
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(|r| product_from_row(&r))
            .transpose()
    }

    async fn product_count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(row.try_get::<i64, _>(0).map_err(backend)? as u64)
    }

    async fn insert_product(&self, product: &Product) -> Result<i64, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        sqlx::query(
            "INSERT INTO products (
                id_code, name, sku, description, rental_price, replacement_value,
                stock, available_for_rent, status, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&product.id_code)
        .bind(&product.name)
        .bind(&product.sku)
        .bind(&product.description)
        .bind(product.rental_price)
        .bind(product.replacement_value)
        .bind(product.stock)
        .bind(product.available_for_rent)
        .bind(enum_str(&product.status))
        .bind(millis(product.updated_at))
        .execute(conn.as_mut())
        .await
        .map_err(backend)?;
        self.last_insert_id(&mut conn).await
    }

    async fn update_product(&self, product: &Product) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE products SET
                id_code = ?, name = ?, sku = ?, description = ?, rental_price = ?,
                replacement_value = ?, stock = ?, available_for_rent = ?,
                status = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&product.id_code)
        .bind(&product.name)
        .bind(&product.sku)
        .bind(&product.description)
        .bind(product.rental_price)
        .bind(product.replacement_value)
        .bind(product.stock)
        .bind(product.available_for_rent)
        .bind(enum_str(&product.status))
        .bind(millis(product.updated_at))
        .bind(product.id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn customers_created_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Customer>, StoreError> {
        let rows = match since {
            Some(t) => {
                sqlx::query("SELECT * FROM customers WHERE created_at > ? ORDER BY id")
                    .bind(millis(t))
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT * FROM customers ORDER BY id")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(backend)?;
        rows.iter().map(customer_from_row).collect()
    }

    async fn customer(&self, id: i64) -> Result<Option<Customer>, StoreError> {
        sqlx::query("SELECT * FROM customers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(|r| customer_from_row(&r))
            .transpose()
    }

    async fn customer_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError> {
        sqlx::query("SELECT * FROM customers WHERE LOWER(email) = ?")
            .bind(email.to_lowercase())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(|r| customer_from_row(&r))
            .transpose()
    }

    async fn username_taken(&self, username: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) FROM customers WHERE username = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(row.try_get::<i64, _>(0).map_err(backend)? > 0)
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<i64, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        sqlx::query(
            "INSERT INTO customers (
                username, email, first_name, last_name, phone, address, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&customer.username)
        .bind(&customer.email)
        .bind(&customer.first_name)
        .bind(&customer.last_name)
        .bind(&customer.phone)
        .bind(&customer.address)
        .bind(millis(customer.created_at))
        .execute(conn.as_mut())
        .await
        .map_err(backend)?;
        self.last_insert_id(&mut conn).await
    }

    async fn update_customer(&self, customer: &Customer) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE customers SET
                username = ?, email = ?, first_name = ?, last_name = ?,
                phone = ?, address = ?
             WHERE id = ?",
        )
        .bind(&customer.username)
        .bind(&customer.email)
        .bind(&customer.first_name)
        .bind(&customer.last_name)
        .bind(&customer.phone)
        .bind(&customer.address)
        .bind(customer.id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn orders_changed_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Order>, StoreError> {
        let rows = match since {
            Some(t) => {
                sqlx::query("SELECT * FROM orders WHERE updated_at > ? ORDER BY id")
                    .bind(millis(t))
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT * FROM orders ORDER BY id")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(backend)?;
        rows.iter().map(order_from_row).collect()
    }

    async fn order(&self, id: i64) -> Result<Option<Order>, StoreError> {
        sqlx::query("SELECT * FROM orders WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(|r| order_from_row(&r))
            .transpose()
    }

    async fn order_by_code(&self, id_code: &str) -> Result<Option<Order>, StoreError> {
        sqlx::query("SELECT * FROM orders WHERE id_code = ?")
            .bind(id_code)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(|r| order_from_row(&r))
            .transpose()
    }

    async fn order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, StoreError> {
        let rows = sqlx::query("SELECT * FROM order_items WHERE order_id = ? ORDER BY id")
            .bind(order_id)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(order_item_from_row).collect()
    }

    async fn order_count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(row.try_get::<i64, _>(0).map_err(backend)? as u64)
    }

    async fn insert_order(&self, order: &Order) -> Result<i64, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        sqlx::query(
            "INSERT INTO orders (
                id_code, customer_id, order_date, status, payment_status,
                total_amount, notes, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&order.id_code)
        .bind(order.customer_id)
        .bind(date_str(order.order_date))
        .bind(enum_str(&order.status))
        .bind(enum_str(&order.payment_status))
        .bind(order.total_amount)
        .bind(&order.notes)
        .bind(millis(order.updated_at))
        .execute(conn.as_mut())
        .await
        .map_err(backend)?;
        self.last_insert_id(&mut conn).await
    }

    async fn update_order(&self, order: &Order) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE orders SET
                id_code = ?, customer_id = ?, order_date = ?, status = ?,
                payment_status = ?, total_amount = ?, notes = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&order.id_code)
        .bind(order.customer_id)
        .bind(date_str(order.order_date))
        .bind(enum_str(&order.status))
        .bind(enum_str(&order.payment_status))
        .bind(order.total_amount)
        .bind(&order.notes)
        .bind(millis(order.updated_at))
        .bind(order.id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn replace_order_items(
        &self,
        order_id: i64,
        items: &[OrderItem],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        sqlx::query("DELETE FROM order_items WHERE order_id = ?")
            .bind(order_id)
            .execute(tx.as_mut())
            .await
            .map_err(backend)?;
        for item in items {
            sqlx::query(
                "INSERT INTO order_items (order_id, product_id, quantity, price, subtotal) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(order_id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(item.price)
            .bind(item.subtotal)
            .execute(tx.as_mut())
            .await
            .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)
    }

    async fn invoices_changed_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Invoice>, StoreError> {
        let rows = match since {
            Some(t) => {
                sqlx::query("SELECT * FROM invoices WHERE updated_at > ? ORDER BY id")
                    .bind(millis(t))
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT * FROM invoices ORDER BY id")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(backend)?;
        rows.iter().map(invoice_from_row).collect()
    }

    async fn invoice(&self, id: i64) -> Result<Option<Invoice>, StoreError> {
        sqlx::query("SELECT * FROM invoices WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(|r| invoice_from_row(&r))
            .transpose()
    }

    async fn invoice_items(&self, invoice_id: i64) -> Result<Vec<InvoiceItem>, StoreError> {
        let rows = sqlx::query("SELECT * FROM invoice_items WHERE invoice_id = ? ORDER BY id")
            .bind(invoice_id)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(invoice_item_from_row).collect()
    }

    async fn invoice_count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) FROM invoices")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(row.try_get::<i64, _>(0).map_err(backend)? as u64)
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<i64, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        sqlx::query(
            "INSERT INTO invoices (
                id_code, number, customer_id, issue_date, due_date, status,
                amount, paid_amount, notes, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&invoice.id_code)
        .bind(&invoice.number)
        .bind(invoice.customer_id)
        .bind(date_str(invoice.issue_date))
        .bind(date_str(invoice.due_date))
        .bind(enum_str(&invoice.status))
        .bind(invoice.amount)
        .bind(invoice.paid_amount)
        .bind(&invoice.notes)
        .bind(millis(invoice.updated_at))
        .execute(conn.as_mut())
        .await
        .map_err(backend)?;
        self.last_insert_id(&mut conn).await
    }

    async fn update_invoice(&self, invoice: &Invoice) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE invoices SET
                id_code = ?, number = ?, customer_id = ?, issue_date = ?,
                due_date = ?, status = ?, amount = ?, paid_amount = ?,
                notes = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&invoice.id_code)
        .bind(&invoice.number)
        .bind(invoice.customer_id)
        .bind(date_str(invoice.issue_date))
        .bind(date_str(invoice.due_date))
        .bind(enum_str(&invoice.status))
        .bind(invoice.amount)
        .bind(invoice.paid_amount)
        .bind(&invoice.notes)
        .bind(millis(invoice.updated_at))
        .bind(invoice.id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn replace_invoice_items(
        &self,
        invoice_id: i64,
        items: &[InvoiceItem],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        sqlx::query("DELETE FROM invoice_items WHERE invoice_id = ?")
            .bind(invoice_id)
            .execute(tx.as_mut())
            .await
            .map_err(backend)?;
        for item in items {
            sqlx::query(
                "INSERT INTO invoice_items (invoice_id, description, quantity, unit_price, amount) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(invoice_id)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.amount)
            .execute(tx.as_mut())
            .await
            .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use chrono::Days;

    use crate::entity::{
        Direction, InvoiceStatus, OrderStatus, PaymentStatus, ProductStatus,
    };
    use crate::log::{RecordFailed, RecordSynced, SyncStatus};

    fn temp_db_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("rentsync_sql_tests");
        let _ = std::fs::create_dir_all(&dir);
        dir.join(format!("sql_test_{name}.db"))
    }

    /// Clean up SQLite database and its WAL files
    fn cleanup_db(path: &PathBuf) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(format!("{}-wal", path.display()));
        let _ = std::fs::remove_file(format!("{}-shm", path.display()));
    }

    async fn open_store(name: &str) -> (SqlStore, PathBuf) {
        let db_path = temp_db_path(name);
        cleanup_db(&db_path);
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let store = SqlStore::new(&url).await.unwrap();
        (store, db_path)
    }

    fn integration_row(id: i64) -> Integration {
        Integration::new(
            id,
            "main",
            ConnectionConfig {
                url: "http://localhost:8069".into(),
                database: "rental".into(),
                username: "bot".into(),
                api_key: "key".into(),
                company_id: 1,
                version: "16.0".into(),
            },
        )
    }

    #[tokio::test]
    async fn mapping_upsert_touches_and_conflicts() {
        let (store, db_path) = open_store("mapping").await;

        let created = store.upsert(1, EntityKind::Product, 10, 100).await.unwrap();
        assert_eq!(created.local_id, 10);
        assert_eq!(created.remote_id, 100);

        // Same pair again is a touch, not a duplicate.
        let touched = store.upsert(1, EntityKind::Product, 10, 100).await.unwrap();
        assert!(touched.last_sync >= created.last_sync);

        // Re-pairing either side violates the bijection.
        let err = store.upsert(1, EntityKind::Product, 10, 999).await.unwrap_err();
        assert!(matches!(err, StoreError::MappingConflict { .. }));
        let err = store.upsert(1, EntityKind::Product, 11, 100).await.unwrap_err();
        assert!(matches!(err, StoreError::MappingConflict { .. }));

        // Other integrations and other entity kinds are independent.
        store.upsert(2, EntityKind::Product, 10, 100).await.unwrap();
        store.upsert(1, EntityKind::Order, 10, 100).await.unwrap();

        let by_local = store
            .find_by_local(1, EntityKind::Product, 10)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_local.remote_id, 100);
        let by_remote = store
            .find_by_remote(1, EntityKind::Product, 100)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_remote.local_id, 10);
        assert!(store
            .find_by_local(1, EntityKind::Customer, 10)
            .await
            .unwrap()
            .is_none());

        cleanup_db(&db_path);
    }

    #[tokio::test]
    async fn watermark_survives_reload() {
        let (store, db_path) = open_store("watermark").await;

        store.save_integration(&integration_row(7)).await.unwrap();
        let loaded = store.load(7).await.unwrap();
        assert_eq!(loaded.name, "main");
        assert!(loaded.last_order_sync.is_none());

        let at = Utc::now();
        store.save_watermark(7, EntityKind::Order, at).await.unwrap();

        let reloaded = store.load(7).await.unwrap();
        let persisted = reloaded.last_order_sync.unwrap();
        // Stored at millisecond precision.
        assert_eq!(persisted.timestamp_millis(), at.timestamp_millis());
        assert!(reloaded.last_product_sync.is_none());

        let err = store
            .save_watermark(99, EntityKind::Order, at)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));

        cleanup_db(&db_path);
    }

    #[tokio::test]
    async fn log_lifecycle_round_trips() {
        let (store, db_path) = open_store("log").await;

        let mut entry = SyncLogEntry::new(1, EntityKind::Product, Direction::Export);
        entry.records_processed = 2;
        entry.record_success(RecordSynced {
            local_id: 10,
            local_code: Some("PRD-010".into()),
            remote_id: 100,
            name: "4K Camera".into(),
        });
        entry.record_failure(RecordFailed {
            local_id: Some(11),
            remote_id: None,
            name: "Fog Machine".into(),
            error: "remote rejected the write".into(),
        });
        entry.id = SyncLogStore::insert(&store, &entry).await.unwrap();
        assert!(entry.id > 0);

        entry.finalize();
        assert_eq!(entry.status, SyncStatus::Partial);
        store.finalize(&entry).await.unwrap();

        // A later success entry for another integration.
        let mut other = SyncLogEntry::new(2, EntityKind::Customer, Direction::Import);
        other.started_at = entry.started_at + Days::new(1);
        other.id = SyncLogStore::insert(&store, &other).await.unwrap();
        store.finalize(&other).await.unwrap();

        let all = store.query(&SyncLogFilter::default(), None).await.unwrap();
        assert_eq!(all.len(), 2);
        // Newest first.
        assert_eq!(all[0].id, other.id);

        let filter = SyncLogFilter {
            integration_id: Some(1),
            status: Some(SyncStatus::Partial),
            ..SyncLogFilter::default()
        };
        let found = store.query(&filter, Some(10)).await.unwrap();
        assert_eq!(found.len(), 1);
        let round_tripped = &found[0];
        assert_eq!(round_tripped.entity, EntityKind::Product);
        assert_eq!(round_tripped.direction, Direction::Export);
        assert_eq!(round_tripped.records_succeeded, 1);
        assert_eq!(round_tripped.records_failed, 1);
        assert_eq!(round_tripped.detail.succeeded[0].remote_id, 100);
        assert_eq!(round_tripped.detail.failed[0].name, "Fog Machine");

        cleanup_db(&db_path);
    }

    #[tokio::test]
    async fn product_round_trips_enums_and_timestamps() {
        let (store, db_path) = open_store("product").await;

        let product = Product {
            id: 0,
            id_code: "PRD-001".into(),
            name: "4K Camera".into(),
            sku: "CAM-4K".into(),
            description: "Body only".into(),
            rental_price: 120.0,
            replacement_value: 2400.0,
            stock: 4,
            available_for_rent: 3,
            status: ProductStatus::Active,
            updated_at: Utc::now(),
        };
        let id = store.insert_product(&product).await.unwrap();
        assert!(id > 0);
        assert_eq!(store.product_count().await.unwrap(), 1);

        let mut loaded = store.product(id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ProductStatus::Active);
        assert_eq!(
            loaded.updated_at.timestamp_millis(),
            product.updated_at.timestamp_millis()
        );

        loaded.status = ProductStatus::Discontinued;
        store.update_product(&loaded).await.unwrap();
        let reloaded = store.product(id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, ProductStatus::Discontinued);

        // Name lookup is case-insensitive substring match.
        let by_name = store.product_by_name("camera").await.unwrap().unwrap();
        assert_eq!(by_name.id, id);

        // Changeset windows: strictly-after filter.
        let after = store
            .products_changed_since(Some(product.updated_at))
            .await
            .unwrap();
        assert!(after.is_empty());
        let all = store.products_changed_since(None).await.unwrap();
        assert_eq!(all.len(), 1);

        cleanup_db(&db_path);
    }

    #[tokio::test]
    async fn order_items_replace_wholesale() {
        let (store, db_path) = open_store("order").await;

        let customer_id = store
            .insert_customer(&Customer {
                id: 0,
                username: "ada.l".into(),
                email: "ada.l@example.com".into(),
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                phone: String::new(),
                address: String::new(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        assert!(store.username_taken("ada.l").await.unwrap());
        assert!(!store.username_taken("ada.l1").await.unwrap());
        let by_email = store
            .customer_by_email("ADA.L@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, customer_id);

        let order_date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let order_id = store
            .insert_order(&Order {
                id: 0,
                id_code: "ORD-001".into(),
                customer_id,
                order_date,
                status: OrderStatus::Confirmed,
                payment_status: PaymentStatus::Pending,
                total_amount: 240.0,
                notes: String::new(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let first = vec![OrderItem {
            id: 0,
            order_id,
            product_id: 1,
            quantity: 2,
            price: 120.0,
            subtotal: 240.0,
        }];
        store.replace_order_items(order_id, &first).await.unwrap();
        let second = vec![
            OrderItem {
                id: 0,
                order_id,
                product_id: 1,
                quantity: 1,
                price: 120.0,
                subtotal: 120.0,
            },
            OrderItem {
                id: 0,
                order_id,
                product_id: 2,
                quantity: 3,
                price: 10.0,
                subtotal: 30.0,
            },
        ];
        store.replace_order_items(order_id, &second).await.unwrap();

        let items = store.order_items(order_id).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].subtotal, 30.0);

        let loaded = store.order_by_code("ORD-001").await.unwrap().unwrap();
        assert_eq!(loaded.order_date, order_date);
        assert_eq!(loaded.status, OrderStatus::Confirmed);
        assert_eq!(loaded.payment_status, PaymentStatus::Pending);

        cleanup_db(&db_path);
    }

    #[tokio::test]
    async fn invoice_round_trips_dates_and_status() {
        let (store, db_path) = open_store("invoice").await;

        let issue = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        let invoice = Invoice {
            id: 0,
            id_code: "INV-001".into(),
            number: "INV/2026/0001".into(),
            customer_id: 1,
            issue_date: issue,
            due_date: issue.checked_add_days(Days::new(30)).unwrap(),
            status: InvoiceStatus::Partial,
            amount: 200.0,
            paid_amount: 150.0,
            notes: "deposit received".into(),
            updated_at: Utc::now(),
        };
        let id = store.insert_invoice(&invoice).await.unwrap();
        assert_eq!(store.invoice_count().await.unwrap(), 1);

        store
            .replace_invoice_items(
                id,
                &[InvoiceItem {
                    id: 0,
                    invoice_id: id,
                    description: "4K Camera - March".into(),
                    quantity: 1,
                    unit_price: 200.0,
                    amount: 200.0,
                }],
            )
            .await
            .unwrap();

        let loaded = store.invoice(id).await.unwrap().unwrap();
        assert_eq!(loaded.status, InvoiceStatus::Partial);
        assert_eq!(loaded.issue_date, issue);
        assert_eq!(loaded.due_date.to_string(), "2026-02-14");
        assert_eq!(loaded.paid_amount, 150.0);

        let items = store.invoice_items(id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "4K Camera - March");

        cleanup_db(&db_path);
    }
}
