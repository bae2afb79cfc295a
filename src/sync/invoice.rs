// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Invoice synchronizer (`account.move` / `account.move.line` on the
//! remote side, `move_type = out_invoice` only).
//!
//! The remote splits invoice state across two fields: `state`
//! (draft/posted/cancel) and `payment_state`. Import combines both into
//! the local six-state status; export collapses the local status into the
//! remote's convention, with `overdue` travelling as `posted` (overdue is
//! derived locally from the due date and is not a remote concept).
//!
//! Lines are replaced wholesale like order lines, always filtered on
//! `exclude_from_invoice_tab = false` so tax and payment-term lines never
//! cross the boundary.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::entity::{Invoice, InvoiceItem, InvoiceStatus};
use crate::error::SyncError;
use crate::log::{RecordFailed, RecordSynced, SyncLogEntry};
use crate::rpc::{row, DomainTerm, RemoteRecord, SearchOptions, REMOTE_DATE_FMT};
use crate::sync::{order, payload, remote_date, remote_timestamp, resolve, SyncContext};

pub(crate) const MODEL: &str = "account.move";
pub(crate) const LINE_MODEL: &str = "account.move.line";

const IMPORT_FIELDS: &[&str] = &[
    "id",
    "name",
    "partner_id",
    "invoice_date",
    "invoice_date_due",
    "state",
    "payment_state",
    "amount_total",
    "amount_residual",
    "x_rentsync_id",
];

const LINE_FIELDS: &[&str] = &["id", "name", "quantity", "price_unit", "price_subtotal"];

/// Remote-shape projection of a local invoice header. `move_type` is only
/// set on the create path; the remote fixes it at creation and rejects it
/// on write. `invoice_origin` is set when the source order is known.
#[derive(Debug, Serialize)]
struct InvoiceExport<'a> {
    partner_id: i64,
    name: &'a str,
    invoice_date: String,
    invoice_date_due: String,
    state: &'static str,
    company_id: i64,
    x_rentsync_id: i64,
    x_rentsync_id_code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    invoice_origin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    move_type: Option<&'static str>,
}

impl<'a> InvoiceExport<'a> {
    fn project(
        ctx: &SyncContext<'_>,
        invoice: &'a Invoice,
        partner_id: i64,
        origin: Option<String>,
    ) -> Self {
        Self {
            partner_id,
            name: &invoice.number,
            invoice_date: invoice.issue_date.format(REMOTE_DATE_FMT).to_string(),
            invoice_date_due: invoice.due_date.format(REMOTE_DATE_FMT).to_string(),
            state: remote_state(invoice.status),
            company_id: ctx.integration.connection.company_id,
            x_rentsync_id: invoice.id,
            x_rentsync_id_code: &invoice.id_code,
            invoice_origin: origin,
            move_type: None,
        }
    }
}

/// Remote-shape projection of one invoice line. `product_id` is attached
/// when a local product could be matched from the description.
#[derive(Debug, Serialize)]
struct InvoiceLineExport<'a> {
    move_id: i64,
    name: &'a str,
    quantity: i64,
    price_unit: f64,
    exclude_from_invoice_tab: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    product_id: Option<i64>,
}

/// Typed view of a remote invoice header.
#[derive(Debug)]
struct InvoiceImport {
    remote_id: i64,
    tag: Option<i64>,
    name: Option<String>,
    partner_id: Option<i64>,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    status: InvoiceStatus,
    amount: f64,
    paid_amount: f64,
}

impl InvoiceImport {
    fn from_record(record: &RemoteRecord) -> Result<Self, SyncError> {
        let issue_date = remote_date(row::opt_str(record, "invoice_date").as_deref())
            .unwrap_or_else(|| Utc::now().date_naive());
        let due_date = remote_date(row::opt_str(record, "invoice_date_due").as_deref())
            .unwrap_or_else(|| issue_date.checked_add_days(Days::new(30)).unwrap_or(issue_date));
        let amount = row::number(record, "amount_total");
        Ok(Self {
            remote_id: row::required_int(record, "id", MODEL)?,
            tag: row::opt_int(record, "x_rentsync_id"),
            name: row::opt_str(record, "name"),
            partner_id: row::many2one(record, "partner_id"),
            issue_date,
            due_date,
            status: local_status(&row::text(record, "state"), &row::text(record, "payment_state")),
            amount,
            paid_amount: (amount - row::number(record, "amount_residual")).max(0.0),
        })
    }
}

/// Typed view of one remote invoice line.
#[derive(Debug)]
struct InvoiceLineImport {
    description: String,
    quantity: i64,
    unit_price: f64,
    amount: f64,
}

impl InvoiceLineImport {
    fn from_record(line: &RemoteRecord) -> Self {
        let quantity = row::number(line, "quantity").round() as i64;
        let unit_price = row::number(line, "price_unit");
        let amount = match line.get("price_subtotal").and_then(serde_json::Value::as_f64) {
            Some(subtotal) => subtotal,
            None => unit_price * quantity as f64,
        };
        Self {
            description: row::text(line, "name"),
            quantity,
            unit_price,
            amount,
        }
    }
}

/// Local status -> remote `account.move` state.
pub(crate) fn remote_state(status: InvoiceStatus) -> &'static str {
    match status {
        InvoiceStatus::Draft => "draft",
        InvoiceStatus::Sent => "posted",
        InvoiceStatus::Paid => "paid",
        InvoiceStatus::Partial => "partial",
        InvoiceStatus::Overdue => "posted",
        InvoiceStatus::Cancelled => "cancel",
    }
}

/// Remote `(state, payment_state)` -> local status. Unknown states fall
/// back to draft rather than failing the record.
pub(crate) fn local_status(state: &str, payment_state: &str) -> InvoiceStatus {
    match state {
        "cancel" => InvoiceStatus::Cancelled,
        "posted" | "paid" | "partial" => match payment_state {
            "paid" | "in_payment" => InvoiceStatus::Paid,
            "partial" => InvoiceStatus::Partial,
            _ => InvoiceStatus::Sent,
        },
        _ => InvoiceStatus::Draft,
    }
}

pub(crate) async fn export(
    ctx: &SyncContext<'_>,
    since: Option<DateTime<Utc>>,
    entry: &mut SyncLogEntry,
) -> Result<(), SyncError> {
    let invoices = ctx.local.invoices_changed_since(since).await?;
    debug!(count = invoices.len(), "invoice export changeset");

    for invoice in &invoices {
        entry.records_processed += 1;
        match export_one(ctx, invoice).await {
            Ok(record) => entry.record_success(record),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => entry.record_failure(RecordFailed {
                local_id: Some(invoice.id),
                remote_id: None,
                name: invoice.number.clone(),
                error: err.to_string(),
            }),
        }
    }
    Ok(())
}

async fn export_one(ctx: &SyncContext<'_>, invoice: &Invoice) -> Result<RecordSynced, SyncError> {
    let integration = ctx.integration;
    let partner_id = resolve::customer_remote_id(ctx, invoice.customer_id).await?;
    let origin = order_origin(ctx, invoice).await?;
    let mut projection = InvoiceExport::project(ctx, invoice, partner_id, origin);

    let existing = ctx
        .mappings
        .find_by_local(integration.id, crate::EntityKind::Invoice, invoice.id)
        .await?;

    let remote_id = match existing {
        Some(mapping) => {
            ctx.client
                .write(MODEL, &[mapping.remote_id], payload(&projection))
                .await?;
            clear_remote_lines(ctx, mapping.remote_id).await?;
            mapping.remote_id
        }
        None => {
            projection.move_type = Some("out_invoice");
            ctx.client.create(MODEL, payload(&projection)).await?
        }
    };

    // Mapping before lines, same reasoning as orders: a line failure must
    // not cause a duplicate invoice on retry.
    ctx.mappings
        .upsert(integration.id, crate::EntityKind::Invoice, invoice.id, remote_id)
        .await?;

    for item in ctx.local.invoice_items(invoice.id).await? {
        let line = InvoiceLineExport {
            move_id: remote_id,
            name: &item.description,
            quantity: item.quantity,
            price_unit: item.unit_price,
            exclude_from_invoice_tab: false,
            product_id: linked_variant(ctx, &item.description).await?,
        };
        ctx.client.create(LINE_MODEL, payload(&line)).await?;
    }

    Ok(RecordSynced {
        local_id: invoice.id,
        local_code: Some(invoice.id_code.clone()),
        remote_id,
        name: invoice.number.clone(),
    })
}

/// Invoices created from an order carry the order's number with the
/// prefix swapped (`INV-007` for `ORD-007`). When that order exists and
/// is already mapped, pass its code as the remote invoice origin.
async fn order_origin(
    ctx: &SyncContext<'_>,
    invoice: &Invoice,
) -> Result<Option<String>, SyncError> {
    let Some(suffix) = invoice.number.strip_prefix("INV-") else {
        return Ok(None);
    };
    let Some(found) = ctx.local.order_by_code(&format!("ORD-{suffix}")).await? else {
        return Ok(None);
    };
    let mapped = ctx
        .mappings
        .find_by_local(ctx.integration.id, crate::EntityKind::Order, found.id)
        .await?;
    Ok(mapped.map(|_| found.id_code))
}

/// Best-effort product link for an exported line. Line descriptions are
/// conventionally `"<product name> - <period>"`; when the prefix matches
/// a local product that is already mapped, attach its remote variant.
async fn linked_variant(
    ctx: &SyncContext<'_>,
    description: &str,
) -> Result<Option<i64>, SyncError> {
    let prefix = description.split(" - ").next().unwrap_or(description).trim();
    if prefix.is_empty() {
        return Ok(None);
    }
    let Some(product) = ctx.local.product_by_name(prefix).await? else {
        return Ok(None);
    };
    let Some(mapping) = ctx
        .mappings
        .find_by_local(ctx.integration.id, crate::EntityKind::Product, product.id)
        .await?
    else {
        return Ok(None);
    };

    let domain = vec![DomainTerm::eq("product_tmpl_id", json!(mapping.remote_id))];
    let opts = SearchOptions {
        limit: Some(1),
        ..SearchOptions::default()
    };
    let variants = ctx
        .client
        .search_read(order::VARIANT_MODEL, &domain, &["id"], &opts)
        .await?;
    Ok(variants.first().and_then(|v| row::opt_int(v, "id")))
}

/// Replace-all, remote side: drop the invoice's product lines. Tax and
/// payment-term lines are managed by the remote and left alone.
async fn clear_remote_lines(ctx: &SyncContext<'_>, remote_move_id: i64) -> Result<(), SyncError> {
    let domain = vec![
        DomainTerm::eq("move_id", json!(remote_move_id)),
        DomainTerm::eq("exclude_from_invoice_tab", json!(false)),
    ];
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

pub(crate) async fn import(
    ctx: &SyncContext<'_>,
    since: Option<DateTime<Utc>>,
    entry: &mut SyncLogEntry,
) -> Result<(), SyncError> {
    let mut domain = vec![DomainTerm::eq("move_type", json!("out_invoice"))];
    if let Some(watermark) = since {
        domain.push(DomainTerm::gt("write_date", json!(remote_timestamp(watermark))));
    }

    let records = ctx
        .client
        .search_read(MODEL, &domain, IMPORT_FIELDS, &SearchOptions::default())
        .await?;
    debug!(count = records.len(), "invoice import changeset");

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
    let incoming = InvoiceImport::from_record(record)?;

    let partner_id = incoming.partner_id.ok_or_else(|| SyncError::DependencyUnresolved {
        kind: crate::EntityKind::Customer,
        key: format!("invoice {}", incoming.remote_id),
        reason: "remote invoice has no partner".into(),
    })?;
    let customer_id = resolve::customer_local_id(ctx, partner_id).await?;

    let line_domain = vec![
        DomainTerm::eq("move_id", json!(incoming.remote_id)),
        DomainTerm::eq("exclude_from_invoice_tab", json!(false)),
    ];
    let remote_lines = ctx
        .client
        .search_read(LINE_MODEL, &line_domain, LINE_FIELDS, &SearchOptions::default())
        .await?;

    let mut target = None;
    if let Some(tagged_id) = incoming.tag {
        target = ctx.local.invoice(tagged_id).await?;
    }
    if target.is_none() {
        if let Some(mapping) = ctx
            .mappings
            .find_by_remote(integration.id, crate::EntityKind::Invoice, incoming.remote_id)
            .await?
        {
            target = ctx.local.invoice(mapping.local_id).await?;
        }
    }

    let (local_id, local_code) = match target {
        Some(mut invoice) => {
            invoice.customer_id = customer_id;
            invoice.issue_date = incoming.issue_date;
            invoice.due_date = incoming.due_date;
            invoice.status = incoming.status;
            invoice.amount = incoming.amount;
            invoice.paid_amount = incoming.paid_amount;
            invoice.updated_at = Utc::now();
            ctx.local.update_invoice(&invoice).await?;
            (invoice.id, invoice.id_code)
        }
        None => {
            let count = ctx.local.invoice_count().await?;
            let number = match incoming.name.clone() {
                // "/" is the remote's placeholder for an unnumbered draft.
                Some(name) if name != "/" => name,
                _ => format!("INV-{:06}", count + 1),
            };
            let invoice = Invoice {
                id: 0,
                id_code: format!("INV-{:03}", count + 1),
                number,
                customer_id,
                issue_date: incoming.issue_date,
                due_date: incoming.due_date,
                status: incoming.status,
                amount: incoming.amount,
                paid_amount: incoming.paid_amount,
                notes: String::new(),
                updated_at: Utc::now(),
            };
            let id = ctx.local.insert_invoice(&invoice).await?;
            (id, invoice.id_code)
        }
    };

    let items: Vec<InvoiceItem> = remote_lines
        .iter()
        .map(|raw| {
            let line = InvoiceLineImport::from_record(raw);
            InvoiceItem {
                id: 0,
                invoice_id: local_id,
                description: line.description,
                quantity: line.quantity,
                unit_price: line.unit_price,
                amount: line.amount,
            }
        })
        .collect();
    ctx.local.replace_invoice_items(local_id, &items).await?;

    let mapping = ctx
        .mappings
        .upsert(
            integration.id,
            crate::EntityKind::Invoice,
            local_id,
            incoming.remote_id,
        )
        .await?;

    Ok(RecordSynced {
        local_id: mapping.local_id,
        local_code: Some(local_code),
        remote_id: incoming.remote_id,
        name: incoming.name.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_local_status_has_a_remote_state() {
        assert_eq!(remote_state(InvoiceStatus::Draft), "draft");
        assert_eq!(remote_state(InvoiceStatus::Sent), "posted");
        assert_eq!(remote_state(InvoiceStatus::Paid), "paid");
        assert_eq!(remote_state(InvoiceStatus::Partial), "partial");
        // Overdue is a local derivation, not a remote state.
        assert_eq!(remote_state(InvoiceStatus::Overdue), "posted");
        assert_eq!(remote_state(InvoiceStatus::Cancelled), "cancel");
    }

    #[test]
    fn payment_state_refines_posted() {
        assert_eq!(local_status("posted", "not_paid"), InvoiceStatus::Sent);
        assert_eq!(local_status("posted", "paid"), InvoiceStatus::Paid);
        assert_eq!(local_status("posted", "in_payment"), InvoiceStatus::Paid);
        assert_eq!(local_status("posted", "partial"), InvoiceStatus::Partial);
        assert_eq!(local_status("cancel", "paid"), InvoiceStatus::Cancelled);
        assert_eq!(local_status("draft", ""), InvoiceStatus::Draft);
        assert_eq!(local_status("unknown", ""), InvoiceStatus::Draft);
    }

    #[test]
    fn optional_projection_fields_are_omitted_not_null() {
        let line = InvoiceLineExport {
            move_id: 9,
            name: "Camera - March",
            quantity: 1,
            price_unit: 100.0,
            exclude_from_invoice_tab: false,
            product_id: None,
        };
        let value = payload(&line);
        assert!(value.get("product_id").is_none());
        assert_eq!(value["exclude_from_invoice_tab"], false);
    }

    #[test]
    fn missing_due_date_defaults_to_thirty_days_after_issue() {
        let record: RemoteRecord = serde_json::from_value(json!({
            "id": 88,
            "name": "INV/2026/0001",
            "partner_id": [5, "Ada Lovelace"],
            "invoice_date": "2026-01-15",
            "invoice_date_due": false,
            "state": "posted",
            "payment_state": "not_paid",
            "amount_total": 200.0,
            "amount_residual": 50.0
        }))
        .unwrap();

        let incoming = InvoiceImport::from_record(&record).unwrap();
        assert_eq!(incoming.issue_date.to_string(), "2026-01-15");
        assert_eq!(incoming.due_date.to_string(), "2026-02-14");
        assert_eq!(incoming.paid_amount, 150.0);
        assert_eq!(incoming.status, InvoiceStatus::Sent);
    }
}
