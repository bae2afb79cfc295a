// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cross-entity dependency resolution.
//!
//! Orders and invoices reference customers and products. When a
//! synchronizer hits a reference with no mapping it resolves exactly that
//! one dependency record through the dependency's own synchronizer, then
//! re-reads the mapping. Resolution never advances the dependency's
//! watermark and never recurses further: customers and products have no
//! dependencies of their own, so the chain is at most one level deep.
//!
//! A dependency that still cannot be resolved fails the *referencing*
//! record with [`SyncError::DependencyUnresolved`]; the batch continues.

use serde_json::json;
use tracing::debug;

use crate::entity::EntityKind;
use crate::error::SyncError;
use crate::rpc::{DomainTerm, SearchOptions};
use crate::sync::{customer, product, SyncContext};

/// Remote partner id for a local customer, exporting the customer first
/// if it has never crossed the boundary.
pub(crate) async fn customer_remote_id(
    ctx: &SyncContext<'_>,
    customer_id: i64,
) -> Result<i64, SyncError> {
    if let Some(mapping) = ctx
        .mappings
        .find_by_local(ctx.integration.id, EntityKind::Customer, customer_id)
        .await?
    {
        return Ok(mapping.remote_id);
    }

    let found = ctx
        .local
        .customer(customer_id)
        .await?
        .ok_or_else(|| unresolved(EntityKind::Customer, customer_id, "no such local customer"))?;

    debug!(customer_id, "exporting unmapped customer dependency");
    let synced = customer::export_one(ctx, &found)
        .await
        .map_err(|err| wrap(err, EntityKind::Customer, customer_id))?;
    Ok(synced.remote_id)
}

/// Remote template id for a local product, exporting the product first if
/// it has never crossed the boundary.
pub(crate) async fn product_remote_id(
    ctx: &SyncContext<'_>,
    product_id: i64,
) -> Result<i64, SyncError> {
    if let Some(mapping) = ctx
        .mappings
        .find_by_local(ctx.integration.id, EntityKind::Product, product_id)
        .await?
    {
        return Ok(mapping.remote_id);
    }

    let found = ctx
        .local
        .product(product_id)
        .await?
        .ok_or_else(|| unresolved(EntityKind::Product, product_id, "no such local product"))?;

    debug!(product_id, "exporting unmapped product dependency");
    let synced = product::export_one(ctx, &found)
        .await
        .map_err(|err| wrap(err, EntityKind::Product, product_id))?;
    Ok(synced.remote_id)
}

/// Local customer id for a remote partner, importing the partner first if
/// it has never crossed the boundary.
pub(crate) async fn customer_local_id(
    ctx: &SyncContext<'_>,
    remote_partner_id: i64,
) -> Result<i64, SyncError> {
    if let Some(mapping) = ctx
        .mappings
        .find_by_remote(ctx.integration.id, EntityKind::Customer, remote_partner_id)
        .await?
    {
        return Ok(mapping.local_id);
    }

    let record = fetch_one(ctx, customer::MODEL, customer::IMPORT_FIELDS, remote_partner_id)
        .await?
        .ok_or_else(|| {
            unresolved(EntityKind::Customer, remote_partner_id, "remote partner not found")
        })?;

    debug!(remote_partner_id, "importing unmapped partner dependency");
    let synced = customer::import_one(ctx, &record)
        .await
        .map_err(|err| wrap(err, EntityKind::Customer, remote_partner_id))?;
    Ok(synced.local_id)
}

/// Local product id for a remote template, importing the template first
/// if it has never crossed the boundary.
pub(crate) async fn product_local_id(
    ctx: &SyncContext<'_>,
    remote_template_id: i64,
) -> Result<i64, SyncError> {
    if let Some(mapping) = ctx
        .mappings
        .find_by_remote(ctx.integration.id, EntityKind::Product, remote_template_id)
        .await?
    {
        return Ok(mapping.local_id);
    }

    let record = fetch_one(ctx, product::MODEL, product::IMPORT_FIELDS, remote_template_id)
        .await?
        .ok_or_else(|| {
            unresolved(EntityKind::Product, remote_template_id, "remote template not found")
        })?;

    debug!(remote_template_id, "importing unmapped template dependency");
    let synced = product::import_one(ctx, &record)
        .await
        .map_err(|err| wrap(err, EntityKind::Product, remote_template_id))?;
    Ok(synced.local_id)
}

async fn fetch_one(
    ctx: &SyncContext<'_>,
    model: &str,
    fields: &[&str],
    remote_id: i64,
) -> Result<Option<crate::rpc::RemoteRecord>, SyncError> {
    let domain = vec![DomainTerm::eq("id", json!(remote_id))];
    let opts = SearchOptions {
        limit: Some(1),
        ..SearchOptions::default()
    };
    let mut records = ctx.client.search_read(model, &domain, fields, &opts).await?;
    Ok(if records.is_empty() {
        None
    } else {
        Some(records.remove(0))
    })
}

fn unresolved(kind: EntityKind, key: i64, reason: &str) -> SyncError {
    SyncError::DependencyUnresolved {
        kind,
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Connection loss stays fatal; anything else becomes a dependency
/// failure attributed to the referencing record.
fn wrap(err: SyncError, kind: EntityKind, key: i64) -> SyncError {
    if err.is_fatal() {
        return err;
    }
    SyncError::DependencyUnresolved {
        kind,
        key: key.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use async_trait::async_trait;
    use serde_json::Value;

    use crate::error::SyncError;
    use crate::rpc::{Domain, ErpClient, RemoteRecord, SearchOptions};

    /// Client for tests that never expect a remote call.
    pub(crate) struct NullClient;

    #[async_trait]
    impl ErpClient for NullClient {
        async fn search_read(
            &self,
            model: &str,
            _domain: &Domain,
            _fields: &[&str],
            _opts: &SearchOptions,
        ) -> Result<Vec<RemoteRecord>, SyncError> {
            panic!("unexpected search_read on {model}");
        }

        async fn create(&self, model: &str, _values: Value) -> Result<i64, SyncError> {
            panic!("unexpected create on {model}");
        }

        async fn write(
            &self,
            model: &str,
            _ids: &[i64],
            _values: Value,
        ) -> Result<bool, SyncError> {
            panic!("unexpected write on {model}");
        }

        async fn unlink(&self, model: &str, _ids: &[i64]) -> Result<bool, SyncError> {
            panic!("unexpected unlink on {model}");
        }
    }
}
