//! # rentsync
//!
//! Bidirectional sync engine between a rental back office and an
//! Odoo-compatible ERP.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        SyncEngine                           │
//! │  • One engine per integration                               │
//! │  • Per-entity advisory locks, watermark bookkeeping         │
//! │  • Opens/finalizes one SyncLogEntry per invocation          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │               Entity synchronizers (sync::*)                │
//! │  • product / customer / order / invoice                     │
//! │  • Per-record loop: one failure never aborts the batch      │
//! │  • resolve:: pulls in unmapped dependencies on demand       │
//! └─────────────────────────────────────────────────────────────┘
//!              │                                │
//!              ▼                                ▼
//! ┌───────────────────────────┐  ┌───────────────────────────────┐
//! │     Storage (traits)      │  │        rpc::OdooClient        │
//! │  • MappingStore           │  │  • JSON-RPC 2.0 transport     │
//! │  • SyncLogStore           │  │  • search_read/create/        │
//! │  • IntegrationStore       │  │    write/unlink               │
//! │  • LocalStore             │  │  • Fails closed on auth       │
//! │  (SQL or in-memory)       │  │                               │
//! └───────────────────────────┘  └───────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rentsync::{
//!     config::{ConnectionConfig, Integration},
//!     rpc::OdooClient,
//!     storage::sql::SqlStore,
//!     sync::SyncEngine,
//!     Direction,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqlStore::new("sqlite://rentsync.db?mode=rwc").await?);
//!
//!     let connection = ConnectionConfig {
//!         url: "https://erp.example.com".into(),
//!         database: "rental".into(),
//!         username: "sync-bot".into(),
//!         api_key: "secret".into(),
//!         company_id: 1,
//!         version: "16.0".into(),
//!     };
//!     let client = Arc::new(OdooClient::connect(&connection).await?);
//!     let integration = Integration::new(1, "main", connection);
//!
//!     let engine = SyncEngine::new(
//!         integration,
//!         client,
//!         store.clone(),
//!         store.clone(),
//!         store.clone(),
//!         store,
//!     );
//!
//!     // Push the local catalog, then pull remote orders.
//!     let entry = engine.sync_products(Direction::Export).await?;
//!     println!("{}: {} records", entry.status, entry.records_processed);
//!     engine.sync_orders(Direction::Import).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Guarantees
//!
//! - **Identity bijection**: per integration and entity type, local and
//!   remote ids map one-to-one; conflicting upserts are rejected
//! - **Record isolation**: one failing record is logged and skipped, the
//!   rest of the batch proceeds
//! - **Watermark safety**: watermarks are captured at batch start and
//!   only advanced after a completed run, so failures re-cover the window
//! - **Auditability**: every invocation leaves a `SyncLogEntry` with
//!   per-record success/failure detail

pub mod config;
pub mod entity;
pub mod error;
pub mod log;
pub mod mapping;
pub mod metrics;
pub mod resilience;
pub mod rpc;
pub mod storage;
pub mod sync;

pub use config::{ConnectionConfig, Integration, SyncPolicy};
pub use entity::{Direction, EntityKind};
pub use error::SyncError;
pub use log::{SyncLogEntry, SyncStatus};
pub use mapping::EntityMapping;
pub use sync::SyncEngine;
