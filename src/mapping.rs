//! Identity mapping between local and remote entity ids.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityKind;

/// A persisted local-id <-> remote-id pair, scoped to one integration and
/// one entity type.
///
/// Per (integration, kind) the mapping is a bijection: no two rows share a
/// `local_id` and no two share a `remote_id`. Rows are created the first
/// time an entity crosses the boundary in either direction, touched
/// (`last_sync`) on every later successful sync, and never deleted
/// automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMapping {
    pub integration_id: i64,
    pub kind: EntityKind,
    pub local_id: i64,
    pub remote_id: i64,
    pub last_sync: DateTime<Utc>,
}
