//! Error taxonomy for the sync engine.
//!
//! Two propagation classes exist and every variant belongs to exactly one:
//!
//! - **Invocation-fatal**: [`SyncError::Connection`]. Aborts the whole sync
//!   run, sets the log entry to `error`, and leaves the watermark
//!   un-advanced so the next run retries the same window.
//! - **Per-record**: everything else. Caught at the record boundary,
//!   recorded in the log's failure detail, and the batch continues.
//!
//! Nothing in this crate panics on a sync failure; a failed sync is a
//! reported, recoverable outcome.

use thiserror::Error;

use crate::entity::EntityKind;
use crate::storage::traits::StoreError;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Session or authentication failure against the remote ERP.
    /// Fatal for the whole invocation.
    #[error("not connected to remote ERP: {0}")]
    Connection(String),

    /// A single RPC call faulted. Callers must not assume partial success.
    #[error("remote call '{method}' on '{model}' failed: {message}")]
    RemoteCall {
        model: String,
        method: String,
        message: String,
    },

    /// An upsert would break the per-integration local<->remote bijection.
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

    /// A required cross-entity mapping could not be resolved even after
    /// triggering a sync of the dependency entity.
    #[error("unresolved {kind} dependency ({key}): {reason}")]
    DependencyUnresolved {
        kind: EntityKind,
        key: String,
        reason: String,
    },

    /// The local persistence layer rejected a read or write.
    #[error("local persistence error: {0}")]
    LocalPersistence(String),
}

impl SyncError {
    /// True when the error must abort the whole invocation rather than
    /// fail a single record.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MappingConflict {
                kind,
                integration_id,
                local_id,
                remote_id,
            } => Self::MappingConflict {
                kind,
                integration_id,
                local_id,
                remote_id,
            },
            other => Self::LocalPersistence(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_errors_are_fatal() {
        assert!(SyncError::Connection("auth failed".into()).is_fatal());
        assert!(!SyncError::RemoteCall {
            model: "res.partner".into(),
            method: "create".into(),
            message: "boom".into(),
        }
        .is_fatal());
        assert!(!SyncError::LocalPersistence("disk full".into()).is_fatal());
    }

    #[test]
    fn store_conflict_maps_to_mapping_conflict() {
        let err: SyncError = StoreError::MappingConflict {
            kind: EntityKind::Product,
            integration_id: 1,
            local_id: 2,
            remote_id: 3,
        }
        .into();
        assert!(matches!(err, SyncError::MappingConflict { local_id: 2, .. }));
    }
}
