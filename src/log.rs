//! Append-only audit log of sync invocations.
//!
//! A [`SyncLogEntry`] is created at the start of a sync call with status
//! optimistically [`SyncStatus::Success`], mutated in memory while records
//! are processed, then finalized exactly once. After finalization it is an
//! audit record and is never edited again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{Direction, EntityKind};

/// Terminal status of a sync invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Every record succeeded (or the run was empty).
    Success,
    /// An invocation-level failure aborted the run.
    Error,
    /// The run completed but some records failed.
    Partial,
}

impl SyncStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Partial => "partial",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record that crossed the boundary successfully.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSynced {
    pub local_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_code: Option<String>,
    pub remote_id: i64,
    /// Display name for operators (product name, customer full name, ...)
    pub name: String,
}

/// One record that failed, with enough identity to chase it down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordFailed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<i64>,
    pub name: String,
    pub error: String,
}

/// Structured per-record outcome detail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncDetail {
    pub succeeded: Vec<RecordSynced>,
    pub failed: Vec<RecordFailed>,
}

/// Audit record for one sync invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLogEntry {
    /// Store-assigned id; 0 until persisted.
    pub id: i64,
    pub integration_id: i64,
    pub entity: EntityKind,
    pub direction: Direction,
    pub status: SyncStatus,
    pub started_at: DateTime<Utc>,
    pub records_processed: u64,
    pub records_succeeded: u64,
    pub records_failed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub detail: SyncDetail,
}

impl SyncLogEntry {
    /// Open a new entry with optimistic `success` status.
    #[must_use]
    pub fn new(integration_id: i64, entity: EntityKind, direction: Direction) -> Self {
        Self {
            id: 0,
            integration_id,
            entity,
            direction,
            status: SyncStatus::Success,
            started_at: Utc::now(),
            records_processed: 0,
            records_succeeded: 0,
            records_failed: 0,
            error_message: None,
            detail: SyncDetail::default(),
        }
    }

    pub fn record_success(&mut self, record: RecordSynced) {
        self.records_succeeded += 1;
        self.detail.succeeded.push(record);
    }

    pub fn record_failure(&mut self, record: RecordFailed) {
        self.records_failed += 1;
        self.detail.failed.push(record);
    }

    /// Mark the whole invocation failed. The individual record detail
    /// gathered so far is kept.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = SyncStatus::Error;
        self.error_message = Some(message.into());
    }

    /// Settle the terminal status after the per-record loop completed.
    /// Individual record failures are swallowed at the record boundary, so
    /// the downgrade to `partial` has to happen here.
    pub fn finalize(&mut self) {
        if self.status == SyncStatus::Success && self.records_failed > 0 {
            self.status = SyncStatus::Partial;
        }
    }
}

/// Filter for reading the log, newest-first. Used for operational
/// visibility only; the synchronizers never read the log themselves.
#[derive(Debug, Clone, Default)]
pub struct SyncLogFilter {
    pub integration_id: Option<i64>,
    pub entity: Option<EntityKind>,
    pub direction: Option<Direction>,
    pub status: Option<SyncStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> SyncLogEntry {
        SyncLogEntry::new(1, EntityKind::Product, Direction::Export)
    }

    #[test]
    fn clean_run_stays_success() {
        let mut log = entry();
        log.records_processed = 2;
        log.record_success(RecordSynced {
            local_id: 1,
            local_code: Some("PRD-001".into()),
            remote_id: 10,
            name: "Camera".into(),
        });
        log.record_success(RecordSynced {
            local_id: 2,
            local_code: Some("PRD-002".into()),
            remote_id: 11,
            name: "Tripod".into(),
        });
        log.finalize();
        assert_eq!(log.status, SyncStatus::Success);
        assert_eq!(log.records_succeeded, 2);
    }

    #[test]
    fn record_failures_downgrade_to_partial() {
        let mut log = entry();
        log.records_processed = 2;
        log.record_success(RecordSynced {
            local_id: 1,
            local_code: None,
            remote_id: 10,
            name: "Camera".into(),
        });
        log.record_failure(RecordFailed {
            local_id: Some(2),
            remote_id: None,
            name: "Tripod".into(),
            error: "remote call failed".into(),
        });
        log.finalize();
        assert_eq!(log.status, SyncStatus::Partial);
    }

    #[test]
    fn invocation_failure_wins_over_partial() {
        let mut log = entry();
        log.record_failure(RecordFailed {
            local_id: Some(2),
            remote_id: None,
            name: "Tripod".into(),
            error: "remote call failed".into(),
        });
        log.fail("connection lost");
        log.finalize();
        assert_eq!(log.status, SyncStatus::Error);
        assert_eq!(log.error_message.as_deref(), Some("connection lost"));
    }
}
