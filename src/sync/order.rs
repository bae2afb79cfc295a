// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Order synchronizer (`sale.order` / `sale.order.line` on the remote
//! side).
//!
//! Orders reference customers and products; both are resolved through
//! [`crate::sync::resolve`] before the order itself crosses the boundary.
//! Line items are replaced wholesale on both sides rather than diffed:
//! updating a remote order first unlinks its existing lines, importing an
//! order replaces the local item set. The local total is always recomputed
//! from the item subtotals, never taken from the remote total (which may
//! include tax).

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::entity::{Order, OrderItem, OrderStatus, PaymentStatus};
use crate::error::SyncError;
use crate::log::{RecordFailed, RecordSynced, SyncLogEntry};
use crate::rpc::{row, DomainTerm, RemoteRecord, SearchOptions, REMOTE_DATE_FMT};
use crate::sync::{payload, remote_date, remote_timestamp, resolve, SyncContext};

pub(crate) const MODEL: &str = "sale.order";
pub(crate) const LINE_MODEL: &str = "sale.order.line";
pub(crate) const VARIANT_MODEL: &str = "product.product";

const IMPORT_FIELDS: &[&str] = &[
    "id",
    "name",
    "partner_id",
    "date_order",
    "state",
    "amount_total",
    "note",
    "x_rentsync_id",
];

const LINE_FIELDS: &[&str] = &[
    "id",
    "product_id",
    "name",
    "product_uom_qty",
    "price_unit",
    "price_subtotal",
];

/// Remote-shape projection of a local order header. The customer is
/// resolved to a partner id before projection.
#[derive(Debug, Serialize)]
struct OrderExport<'a> {
    partner_id: i64,
    date_order: String,
    state: &'static str,
    note: &'a str,
    company_id: i64,
    x_rentsync_id: i64,
    x_rentsync_id_code: &'a str,
}

impl<'a> OrderExport<'a> {
    fn project(ctx: &SyncContext<'_>, order: &'a Order, partner_id: i64) -> Self {
        Self {
            partner_id,
            date_order: order.order_date.format(REMOTE_DATE_FMT).to_string(),
            state: remote_state(order.status),
            note: &order.notes,
            company_id: ctx.integration.connection.company_id,
            x_rentsync_id: order.id,
            x_rentsync_id_code: &order.id_code,
        }
    }
}

/// Remote-shape projection of one order line.
#[derive(Debug, Serialize)]
struct OrderLineExport {
    order_id: i64,
    product_id: i64,
    name: String,
    product_uom_qty: i64,
    price_unit: f64,
}

/// Typed view of a remote order header.
#[derive(Debug)]
struct OrderImport {
    remote_id: i64,
    tag: Option<i64>,
    name: String,
    partner_id: Option<i64>,
    date_order: NaiveDate,
    status: OrderStatus,
    notes: String,
}

impl OrderImport {
    fn from_record(record: &RemoteRecord) -> Result<Self, SyncError> {
        Ok(Self {
            remote_id: row::required_int(record, "id", MODEL)?,
            tag: row::opt_int(record, "x_rentsync_id"),
            name: row::text(record, "name"),
            partner_id: row::many2one(record, "partner_id"),
            date_order: remote_date(row::opt_str(record, "date_order").as_deref())
                .unwrap_or_else(|| Utc::now().date_naive()),
            status: local_status(&row::text(record, "state")),
            notes: row::text(record, "note"),
        })
    }
}

/// Typed view of one remote order line. `variant_id` is `None` for note
/// and section lines, which carry no product.
#[derive(Debug)]
struct OrderLineImport {
    variant_id: Option<i64>,
    quantity: i64,
    price: f64,
    subtotal: f64,
}

impl OrderLineImport {
    fn from_record(line: &RemoteRecord) -> Self {
        let quantity = row::number(line, "product_uom_qty").round() as i64;
        let price = row::number(line, "price_unit");
        let subtotal = match line.get("price_subtotal").and_then(serde_json::Value::as_f64) {
            Some(subtotal) => subtotal,
            None => price * quantity as f64,
        };
        Self {
            variant_id: row::many2one(line, "product_id"),
            quantity,
            price,
            subtotal,
        }
    }
}

/// Local status -> remote `sale.order` state.
pub(crate) fn remote_state(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "draft",
        OrderStatus::Confirmed => "sent",
        OrderStatus::InProgress => "sale",
        OrderStatus::Completed => "done",
        OrderStatus::Cancelled => "cancel",
    }
}

/// Remote `sale.order` state -> local status. Unknown states fall back to
/// pending rather than failing the record.
pub(crate) fn local_status(state: &str) -> OrderStatus {
    match state {
        "sent" => OrderStatus::Confirmed,
        "sale" => OrderStatus::InProgress,
        "done" => OrderStatus::Completed,
        "cancel" => OrderStatus::Cancelled,
        _ => OrderStatus::Pending,
    }
}

pub(crate) async fn export(
    ctx: &SyncContext<'_>,
    since: Option<DateTime<Utc>>,
    entry: &mut SyncLogEntry,
) -> Result<(), SyncError> {
    let orders = ctx.local.orders_changed_since(since).await?;
    debug!(count = orders.len(), "order export changeset");

    for order in &orders {
        entry.records_processed += 1;
        match export_one(ctx, order).await {
            Ok(record) => entry.record_success(record),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => entry.record_failure(RecordFailed {
                local_id: Some(order.id),
                remote_id: None,
                name: order.id_code.clone(),
                error: err.to_string(),
            }),
        }
    }
    Ok(())
}

async fn export_one(ctx: &SyncContext<'_>, order: &Order) -> Result<RecordSynced, SyncError> {
    let integration = ctx.integration;
    let partner_id = resolve::customer_remote_id(ctx, order.customer_id).await?;
    let values = payload(&OrderExport::project(ctx, order, partner_id));

    let existing = ctx
        .mappings
        .find_by_local(integration.id, crate::EntityKind::Order, order.id)
        .await?;

    let remote_id = match existing {
        Some(mapping) => {
            ctx.client.write(MODEL, &[mapping.remote_id], values).await?;
            clear_remote_lines(ctx, mapping.remote_id).await?;
            mapping.remote_id
        }
        None => ctx.client.create(MODEL, values).await?,
    };

    // Mapping goes in before the lines: if a line fails, the next run must
    // retry against this remote order, not create a duplicate.
    ctx.mappings
        .upsert(integration.id, crate::EntityKind::Order, order.id, remote_id)
        .await?;

    for item in ctx.local.order_items(order.id).await? {
        let variant_id = variant_for_item(ctx, item.product_id).await?;
        let label = match ctx.local.product(item.product_id).await? {
            Some(product) => product.name,
            None => format!("Item {}", item.id),
        };
        let line = OrderLineExport {
            order_id: remote_id,
            product_id: variant_id,
            name: label,
            product_uom_qty: item.quantity,
            price_unit: item.price,
        };
        ctx.client.create(LINE_MODEL, payload(&line)).await?;
    }

    Ok(RecordSynced {
        local_id: order.id,
        local_code: Some(order.id_code.clone()),
        remote_id,
        name: order.id_code.clone(),
    })
}

/// Replace-all, remote side: drop every existing line of the order.
async fn clear_remote_lines(ctx: &SyncContext<'_>, remote_order_id: i64) -> Result<(), SyncError> {
    let domain = vec![DomainTerm::eq("order_id", json!(remote_order_id))];
    let lines = ctx
        .client
        .search_read(LINE_MODEL, &domain, &["id"], &SearchOptions::default())
        .await?;
    let ids: Vec<i64> = lines
        .iter()
        .filter_map(|line| row::opt_int(line, "id"))
        .collect();
    if !ids.is_empty() {
        ctx.client.unlink(LINE_MODEL, &ids).await?;
    }
    Ok(())
}

/// Remote variant id for a local product. Templates are what we map;
/// order lines want the variant under the template.
async fn variant_for_item(ctx: &SyncContext<'_>, product_id: i64) -> Result<i64, SyncError> {
    let template_id = resolve::product_remote_id(ctx, product_id).await?;
    let domain = vec![DomainTerm::eq("product_tmpl_id", json!(template_id))];
    let opts = SearchOptions {
        limit: Some(1),
        ..SearchOptions::default()
    };
    let variants = ctx.client.search_read(VARIANT_MODEL, &domain, &["id"], &opts).await?;
    variants
        .first()
        .and_then(|v| row::opt_int(v, "id"))
        .ok_or_else(|| SyncError::DependencyUnresolved {
            kind: crate::EntityKind::Product,
            key: product_id.to_string(),
            reason: format!("remote template {template_id} has no variant"),
        })
}

pub(crate) async fn import(
    ctx: &SyncContext<'_>,
    since: Option<DateTime<Utc>>,
    entry: &mut SyncLogEntry,
) -> Result<(), SyncError> {
    let mut domain = Vec::new();
    if let Some(watermark) = since {
        domain.push(DomainTerm::gt("write_date", json!(remote_timestamp(watermark))));
    }

    let records = ctx
        .client
        .search_read(MODEL, &domain, IMPORT_FIELDS, &SearchOptions::default())
        .await?;
    debug!(count = records.len(), "order import changeset");

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

async fn import_one(
    ctx: &SyncContext<'_>,
    record: &RemoteRecord,
) -> Result<RecordSynced, SyncError> {
    let integration = ctx.integration;
    let incoming = OrderImport::from_record(record)?;

    let partner_id = incoming.partner_id.ok_or_else(|| SyncError::DependencyUnresolved {
        kind: crate::EntityKind::Customer,
        key: format!("order {}", incoming.remote_id),
        reason: "remote order has no partner".into(),
    })?;
    let customer_id = resolve::customer_local_id(ctx, partner_id).await?;

    // (product_id, line) per remote line, with the variant resolved back
    // to a local product.
    let mut lines = Vec::new();
    let line_domain = vec![DomainTerm::eq("order_id", json!(incoming.remote_id))];
    for raw in ctx
        .client
        .search_read(LINE_MODEL, &line_domain, LINE_FIELDS, &SearchOptions::default())
        .await?
    {
        let line = OrderLineImport::from_record(&raw);
        let variant_id = match line.variant_id {
            Some(id) => id,
            None => continue, // note lines and sections carry no product
        };
        let product_id = local_product_for_variant(ctx, variant_id).await?;
        lines.push((product_id, line));
    }
    let total: f64 = lines.iter().map(|(_, line)| line.subtotal).sum();

    let mut target = None;
    if let Some(tagged_id) = incoming.tag {
        target = ctx.local.order(tagged_id).await?;
    }
    if target.is_none() {
        if let Some(mapping) = ctx
            .mappings
            .find_by_remote(integration.id, crate::EntityKind::Order, incoming.remote_id)
            .await?
        {
            target = ctx.local.order(mapping.local_id).await?;
        }
    }

    let (local_id, local_code) = match target {
        Some(mut order) => {
            order.customer_id = customer_id;
            order.order_date = incoming.date_order;
            order.status = incoming.status;
            order.notes = incoming.notes;
            order.total_amount = total;
            order.updated_at = Utc::now();
            ctx.local.update_order(&order).await?;
            (order.id, order.id_code)
        }
        None => {
            let count = ctx.local.order_count().await?;
            let order = Order {
                id: 0,
                id_code: format!("ORD-{:03}", count + 1),
                customer_id,
                order_date: incoming.date_order,
                status: incoming.status,
                payment_status: PaymentStatus::Pending,
                total_amount: total,
                notes: incoming.notes,
                updated_at: Utc::now(),
            };
            let id = ctx.local.insert_order(&order).await?;
            (id, order.id_code)
        }
    };

    let items: Vec<OrderItem> = lines
        .into_iter()
        .map(|(product_id, line)| OrderItem {
            id: 0,
            order_id: local_id,
            product_id,
            quantity: line.quantity,
            price: line.price,
            subtotal: line.subtotal,
        })
        .collect();
    ctx.local.replace_order_items(local_id, &items).await?;

    let mapping = ctx
        .mappings
        .upsert(
            integration.id,
            crate::EntityKind::Order,
            local_id,
            incoming.remote_id,
        )
        .await?;

    Ok(RecordSynced {
        local_id: mapping.local_id,
        local_code: Some(local_code),
        remote_id: incoming.remote_id,
        name: incoming.name,
    })
}

/// Local template id for a remote variant: read the variant's template,
/// then resolve the template as a product dependency.
async fn local_product_for_variant(
    ctx: &SyncContext<'_>,
    variant_id: i64,
) -> Result<i64, SyncError> {
    let domain = vec![DomainTerm::eq("id", json!(variant_id))];
    let opts = SearchOptions {
        limit: Some(1),
        ..SearchOptions::default()
    };
    let variants = ctx
        .client
        .search_read(VARIANT_MODEL, &domain, &["id", "product_tmpl_id"], &opts)
        .await?;
    let template_id = variants
        .first()
        .and_then(|v| row::many2one(v, "product_tmpl_id"))
        .ok_or_else(|| SyncError::DependencyUnresolved {
            kind: crate::EntityKind::Product,
            key: variant_id.to_string(),
            reason: "remote variant not found".into(),
        })?;
    resolve::product_local_id(ctx, template_id).await
}
