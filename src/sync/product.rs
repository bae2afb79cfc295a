// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Product synchronizer (`product.template` on the remote side).
//!
//! Export pushes the rental catalog fields onto the remote template and
//! tags it with `x_rentsync_id` / `x_rentsync_id_code` so a later import
//! can short-circuit identity resolution. Import pulls stockable templates
//! and resolves identity in order: back-reference tag, mapping table, then
//! create.
//!
//! Both directions go through typed projections ([`ProductExport`],
//! [`ProductImport`]) so the field set per direction is explicit and
//! checked at compile time.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::config::Integration;
use crate::entity::{Product, ProductStatus};
use crate::error::SyncError;
use crate::log::{RecordFailed, RecordSynced, SyncLogEntry};
use crate::rpc::{row, DomainTerm, RemoteRecord, SearchOptions};
use crate::sync::{payload, remote_timestamp, SyncContext};

pub(crate) const MODEL: &str = "product.template";

pub(crate) const IMPORT_FIELDS: &[&str] = &[
    "id",
    "name",
    "default_code",
    "list_price",
    "standard_price",
    "description",
    "type",
    "x_rentsync_id",
];

/// Remote-shape projection of a local product.
#[derive(Debug, Serialize)]
struct ProductExport<'a> {
    name: &'a str,
    default_code: &'a str,
    list_price: f64,
    standard_price: f64,
    description: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    company_id: i64,
    x_rentsync_id: i64,
    x_rentsync_id_code: &'a str,
}

impl<'a> ProductExport<'a> {
    fn project(integration: &Integration, product: &'a Product) -> Self {
        Self {
            name: &product.name,
            default_code: &product.sku,
            list_price: product.rental_price,
            standard_price: product.replacement_value,
            description: &product.description,
            kind: "product",
            company_id: integration.connection.company_id,
            x_rentsync_id: product.id,
            x_rentsync_id_code: &product.id_code,
        }
    }
}

/// Typed view of a remote template row.
#[derive(Debug)]
struct ProductImport {
    remote_id: i64,
    tag: Option<i64>,
    name: String,
    sku: Option<String>,
    rental_price: f64,
    replacement_value: f64,
    description: Option<String>,
}

impl ProductImport {
    fn from_record(record: &RemoteRecord) -> Result<Self, SyncError> {
        Ok(Self {
            remote_id: row::required_int(record, "id", MODEL)?,
            tag: row::opt_int(record, "x_rentsync_id"),
            name: row::text(record, "name"),
            sku: row::opt_str(record, "default_code"),
            rental_price: row::number(record, "list_price"),
            replacement_value: row::number(record, "standard_price"),
            description: row::opt_str(record, "description"),
        })
    }
}

pub(crate) async fn export(
    ctx: &SyncContext<'_>,
    since: Option<DateTime<Utc>>,
    entry: &mut SyncLogEntry,
) -> Result<(), SyncError> {
    let products = ctx.local.products_changed_since(since).await?;
    debug!(count = products.len(), "product export changeset");

    for product in &products {
        entry.records_processed += 1;
        match export_one(ctx, product).await {
            Ok(record) => entry.record_success(record),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => entry.record_failure(RecordFailed {
                local_id: Some(product.id),
                remote_id: None,
                name: product.name.clone(),
                error: err.to_string(),
            }),
        }
    }
    Ok(())
}

/// Push one product, creating or updating the remote template. Also used
/// by the dependency resolver when an order line needs an unmapped product.
pub(crate) async fn export_one(
    ctx: &SyncContext<'_>,
    product: &Product,
) -> Result<RecordSynced, SyncError> {
    let integration = ctx.integration;
    let values = payload(&ProductExport::project(integration, product));

    let existing = ctx
        .mappings
        .find_by_local(integration.id, crate::EntityKind::Product, product.id)
        .await?;

    let remote_id = match existing {
        Some(mapping) => {
            ctx.client.write(MODEL, &[mapping.remote_id], values).await?;
            mapping.remote_id
        }
        None => ctx.client.create(MODEL, values).await?,
    };

    ctx.mappings
        .upsert(integration.id, crate::EntityKind::Product, product.id, remote_id)
        .await?;

    Ok(RecordSynced {
        local_id: product.id,
        local_code: Some(product.id_code.clone()),
        remote_id,
        name: product.name.clone(),
    })
}

pub(crate) async fn import(
    ctx: &SyncContext<'_>,
    since: Option<DateTime<Utc>>,
    entry: &mut SyncLogEntry,
) -> Result<(), SyncError> {
    let mut domain = vec![DomainTerm::eq("type", json!("product"))];
    if let Some(watermark) = since {
        domain.push(DomainTerm::gt("write_date", json!(remote_timestamp(watermark))));
    }

    let records = ctx
        .client
        .search_read(MODEL, &domain, IMPORT_FIELDS, &SearchOptions::default())
        .await?;
    debug!(count = records.len(), "product import changeset");

    for record in &records {
        entry.records_processed += 1;
        match import_one(ctx, record).await {
            Ok(synced) => entry.record_success(synced),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => entry.record_failure(RecordFailed {
                local_id: None,
                remote_id: row::opt_int(record, "id"),
                name: row::text(record, "name"),
                error: err.to_string(),
            }),
        }
    }
    Ok(())
}

/// Pull one remote template into the local catalog. Also used by the
/// dependency resolver during order import.
pub(crate) async fn import_one(
    ctx: &SyncContext<'_>,
    record: &RemoteRecord,
) -> Result<RecordSynced, SyncError> {
    let integration = ctx.integration;
    let incoming = ProductImport::from_record(record)?;

    // Identity resolution: back-reference tag first, then the mapping
    // table. A tag pointing at a deleted local row falls through to create.
    let mut target = None;
    if let Some(tagged_id) = incoming.tag {
        target = ctx.local.product(tagged_id).await?;
    }
    if target.is_none() {
        if let Some(mapping) = ctx
            .mappings
            .find_by_remote(integration.id, crate::EntityKind::Product, incoming.remote_id)
            .await?
        {
            target = ctx.local.product(mapping.local_id).await?;
        }
    }

    let local_id = match target {
        Some(mut product) => {
            product.name = incoming.name.clone();
            if let Some(sku) = incoming.sku {
                product.sku = sku;
            }
            product.rental_price = incoming.rental_price;
            product.replacement_value = incoming.replacement_value;
            if let Some(description) = incoming.description {
                product.description = description;
            }
            product.updated_at = Utc::now();
            ctx.local.update_product(&product).await?;
            product.id
        }
        None => {
            let count = ctx.local.product_count().await?;
            let product = Product {
                id: 0,
                id_code: format!("PRD-{:03}", count + 1),
                name: incoming.name.clone(),
                sku: incoming
                    .sku
                    .unwrap_or_else(|| format!("ERP-{}", incoming.remote_id)),
                description: incoming.description.unwrap_or_default(),
                rental_price: incoming.rental_price,
                replacement_value: incoming.replacement_value,
                stock: 0,
                available_for_rent: 0,
                status: ProductStatus::Active,
                updated_at: Utc::now(),
            };
            ctx.local.insert_product(&product).await?
        }
    };

    let mapping = ctx
        .mappings
        .upsert(
            integration.id,
            crate::EntityKind::Product,
            local_id,
            incoming.remote_id,
        )
        .await?;

    Ok(RecordSynced {
        local_id: mapping.local_id,
        local_code: None,
        remote_id: incoming.remote_id,
        name: incoming.name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;

    fn integration() -> Integration {
        Integration::new(
            1,
            "main",
            ConnectionConfig {
                url: "http://localhost:8069".into(),
                database: "rental".into(),
                username: "bot".into(),
                api_key: "key".into(),
                company_id: 3,
                version: "16.0".into(),
            },
        )
    }

    fn product() -> Product {
        Product {
            id: 11,
            id_code: "PRD-011".into(),
            name: "4K Camera".into(),
            sku: "CAM-4K".into(),
            description: "Body only".into(),
            rental_price: 120.0,
            replacement_value: 2400.0,
            stock: 4,
            available_for_rent: 3,
            status: ProductStatus::Active,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn export_projection_covers_catalog_fields_only() {
        let integration = integration();
        let product = product();
        let value = payload(&ProductExport::project(&integration, &product));

        assert_eq!(value["name"], "4K Camera");
        assert_eq!(value["default_code"], "CAM-4K");
        assert_eq!(value["list_price"], 120.0);
        assert_eq!(value["standard_price"], 2400.0);
        assert_eq!(value["type"], "product");
        assert_eq!(value["company_id"], 3);
        assert_eq!(value["x_rentsync_id"], 11);
        assert_eq!(value["x_rentsync_id_code"], "PRD-011");
        // Inventory levels are local-only.
        assert!(value.get("stock").is_none());
        assert!(value.get("available_for_rent").is_none());
    }

    #[test]
    fn import_projection_treats_false_as_unset() {
        let record: RemoteRecord = serde_json::from_value(json!({
            "id": 501,
            "name": "Fog Machine",
            "default_code": false,
            "list_price": 35.0,
            "standard_price": 420.0,
            "description": false
        }))
        .unwrap();

        let incoming = ProductImport::from_record(&record).unwrap();
        assert_eq!(incoming.remote_id, 501);
        assert_eq!(incoming.tag, None);
        assert_eq!(incoming.sku, None);
        assert_eq!(incoming.description, None);
        assert_eq!(incoming.rental_price, 35.0);
    }
}
