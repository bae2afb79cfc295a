// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The sync engine: one batch runner, four entity synchronizers.
//!
//! [`SyncEngine::sync`] runs one `(entity, direction)` invocation end to
//! end: take the per-entity advisory lock, open a log entry, snapshot the
//! watermark, hand off to the entity module, then settle the log and
//! advance the watermark. The entity modules own the per-record loop and
//! the projections; they never touch the log store or the watermark.
//!
//! Watermark rules:
//! - captured at batch *start*, so records modified while the batch runs
//!   fall into the next window instead of being skipped
//! - advanced on `success` and `partial` outcomes
//! - left untouched when the invocation fails, so the next run retries
//!   the same window

pub mod customer;
pub mod invoice;
pub mod order;
pub mod product;
pub(crate) mod resolve;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::{ConnectionConfig, Integration};
use crate::entity::{Direction, EntityKind};
use crate::error::SyncError;
use crate::log::{SyncLogEntry, SyncStatus};
use crate::metrics;
use crate::rpc::{ErpClient, OdooClient};
use crate::storage::traits::{IntegrationStore, LocalStore, MappingStore, SyncLogStore};

/// Everything an entity synchronizer needs for one invocation. Borrowed
/// from the engine; the integration is a snapshot taken at batch start.
pub(crate) struct SyncContext<'a> {
    pub integration: &'a Integration,
    pub client: &'a dyn ErpClient,
    pub mappings: &'a dyn MappingStore,
    pub local: &'a dyn LocalStore,
}

/// Bidirectional synchronizer for one integration.
///
/// All state lives in the stores; the engine itself only caches the
/// integration row and serializes concurrent invocations per entity.
pub struct SyncEngine {
    integration: RwLock<Integration>,
    client: Arc<dyn ErpClient>,
    mappings: Arc<dyn MappingStore>,
    logs: Arc<dyn SyncLogStore>,
    integrations: Arc<dyn IntegrationStore>,
    local: Arc<dyn LocalStore>,
    // One advisory lock per entity kind; the engine is per-integration, so
    // this serializes per (integration, entity).
    locks: DashMap<EntityKind, Arc<Mutex<()>>>,
}

impl SyncEngine {
    pub fn new(
        integration: Integration,
        client: Arc<dyn ErpClient>,
        mappings: Arc<dyn MappingStore>,
        logs: Arc<dyn SyncLogStore>,
        integrations: Arc<dyn IntegrationStore>,
        local: Arc<dyn LocalStore>,
    ) -> Self {
        Self {
            integration: RwLock::new(integration),
            client,
            mappings,
            logs,
            integrations,
            local,
            locks: DashMap::new(),
        }
    }

    /// Authenticate against a remote endpoint without building an engine.
    /// Returns the session uid. Used by the administrative "test
    /// connection" surface.
    pub async fn test_connection(config: &ConnectionConfig) -> Result<i64, SyncError> {
        let client = OdooClient::connect(config).await?;
        Ok(client.uid())
    }

    /// Current integration snapshot, including watermarks.
    #[must_use]
    pub fn integration(&self) -> Integration {
        self.integration.read().clone()
    }

    /// Run one sync invocation for `kind` in `direction`.
    ///
    /// Invocation-level failures do not surface as `Err`: they come back
    /// as an entry with status [`SyncStatus::Error`] and the watermark
    /// un-advanced. `Err` here means the engine could not even persist its
    /// own audit log.
    pub async fn sync(
        &self,
        kind: EntityKind,
        direction: Direction,
    ) -> Result<SyncLogEntry, SyncError> {
        let integration = self.integration.read().clone();
        let mut entry = SyncLogEntry::new(integration.id, kind, direction);

        if !integration.policy.enabled_for(kind) {
            // Not an error and not worth an audit row; the caller sees why
            // nothing happened.
            entry.error_message = Some(format!("{kind} sync disabled by policy"));
            return Ok(entry);
        }

        let lock = Arc::clone(self.locks.entry(kind).or_default().value());
        let _guard = lock.lock().await;

        // Records modified after this instant belong to the next window.
        let batch_start = entry.started_at;
        let wall = std::time::Instant::now();
        let since = integration.watermark(kind);
        entry.id = self.logs.insert(&entry).await?;

        info!(
            integration = integration.id,
            entity = %kind,
            direction = %direction,
            since = ?since,
            "sync started"
        );

        let ctx = SyncContext {
            integration: &integration,
            client: self.client.as_ref(),
            mappings: self.mappings.as_ref(),
            local: self.local.as_ref(),
        };

        let outcome = match (kind, direction) {
            (EntityKind::Product, Direction::Export) => {
                product::export(&ctx, since, &mut entry).await
            }
            (EntityKind::Product, Direction::Import) => {
                product::import(&ctx, since, &mut entry).await
            }
            (EntityKind::Customer, Direction::Export) => {
                customer::export(&ctx, since, &mut entry).await
            }
            (EntityKind::Customer, Direction::Import) => {
                customer::import(&ctx, since, &mut entry).await
            }
            (EntityKind::Order, Direction::Export) => order::export(&ctx, since, &mut entry).await,
            (EntityKind::Order, Direction::Import) => order::import(&ctx, since, &mut entry).await,
            (EntityKind::Invoice, Direction::Export) => {
                invoice::export(&ctx, since, &mut entry).await
            }
            (EntityKind::Invoice, Direction::Import) => {
                invoice::import(&ctx, since, &mut entry).await
            }
        };

        match outcome {
            Ok(()) => {
                entry.finalize();
                self.integrations
                    .save_watermark(integration.id, kind, batch_start)
                    .await?;
                self.integration.write().set_watermark(kind, batch_start);
            }
            Err(err) => {
                error!(
                    integration = integration.id,
                    entity = %kind,
                    direction = %direction,
                    error = %err,
                    "sync invocation failed"
                );
                entry.fail(err.to_string());
            }
        }

        self.logs.finalize(&entry).await?;
        metrics::record_sync(&entry, wall.elapsed());

        match entry.status {
            SyncStatus::Success => info!(
                entity = %kind,
                direction = %direction,
                processed = entry.records_processed,
                "sync finished"
            ),
            SyncStatus::Partial => warn!(
                entity = %kind,
                direction = %direction,
                processed = entry.records_processed,
                failed = entry.records_failed,
                "sync finished with record failures"
            ),
            SyncStatus::Error => {}
        }

        Ok(entry)
    }

    /// Sync all enabled entities in dependency order: customers and
    /// products carry no dependencies, orders need both, invoices need
    /// customers and orders.
    pub async fn sync_all(&self, direction: Direction) -> Result<Vec<SyncLogEntry>, SyncError> {
        let mut entries = Vec::with_capacity(4);
        for kind in [
            EntityKind::Customer,
            EntityKind::Product,
            EntityKind::Order,
            EntityKind::Invoice,
        ] {
            entries.push(self.sync(kind, direction).await?);
        }
        Ok(entries)
    }

    pub async fn sync_products(&self, direction: Direction) -> Result<SyncLogEntry, SyncError> {
        self.sync(EntityKind::Product, direction).await
    }

    pub async fn sync_customers(&self, direction: Direction) -> Result<SyncLogEntry, SyncError> {
        self.sync(EntityKind::Customer, direction).await
    }

    pub async fn sync_orders(&self, direction: Direction) -> Result<SyncLogEntry, SyncError> {
        self.sync(EntityKind::Order, direction).await
    }

    pub async fn sync_invoices(&self, direction: Direction) -> Result<SyncLogEntry, SyncError> {
        self.sync(EntityKind::Invoice, direction).await
    }
}

/// Serialize a projection struct into the wire value the client takes.
/// Projection structs are plain field sets; serialization cannot fail for
/// them, so the fallback is never observed in practice.
pub(crate) fn payload<T: serde::Serialize>(projection: &T) -> serde_json::Value {
    serde_json::to_value(projection).unwrap_or(serde_json::Value::Null)
}

/// Format a watermark the way the remote's `write_date` filter expects.
pub(crate) fn remote_timestamp(at: DateTime<Utc>) -> String {
    at.format(crate::rpc::REMOTE_DATETIME_FMT).to_string()
}

/// Remote date fields arrive as `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`;
/// the date is the first ten characters. Unparseable dates fall back to
/// today rather than failing the record.
pub(crate) fn remote_date(raw: Option<&str>) -> Option<chrono::NaiveDate> {
    raw.and_then(|s| {
        chrono::NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), crate::rpc::REMOTE_DATE_FMT)
            .ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn remote_dates_parse_with_and_without_time() {
        let expected = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        assert_eq!(remote_date(Some("2026-03-14 09:30:00")), Some(expected));
        assert_eq!(remote_date(Some("2026-03-14")), Some(expected));
        assert_eq!(remote_date(Some("not a date")), None);
        assert_eq!(remote_date(None), None);
    }

    #[test]
    fn watermark_formats_for_remote_filters() {
        let at = chrono::DateTime::parse_from_rfc3339("2026-03-14T09:30:05Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(remote_timestamp(at), "2026-03-14 09:30:05");
    }
}
