//! Data-model types shared across the substrate.
//!
//! These are the shapes that cross crate boundaries or land on disk:
//! replication status, store/registry payloads, transaction-log records,
//! and the commit-change tuple replayed during fast-forward.
//!
//! On-disk encodings are part of the wire contract:
//! - `ReplicationStatus` is JSON with the exact field names
//!   `FailedToReplicate`, `ActiveFolderToggler`, `LogCommitChanges`.
//! - `LogRecord` is one JSON object per line with the payload bytes
//!   encoded as base64 text.
//! - `CommitChangeRecord` and priority-log payloads are bincode blocks.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a stored blob.
pub type BlobId = Uuid;

/// Identifier of a transaction.
pub type Tid = Uuid;

/// Replication controller state, persisted to `replstat.txt` on both the
/// active and passive folders and mirrored into the shared cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationStatus {
    /// Set when replication to the passive target has failed.
    #[serde(rename = "FailedToReplicate")]
    pub failed_to_replicate: bool,
    /// Selects which of the two base folders is authoritative.
    #[serde(rename = "ActiveFolderToggler")]
    pub active_folder_toggler: bool,
    /// When set, committed transactions append commit-change logs.
    #[serde(rename = "LogCommitChanges")]
    pub log_commit_changes: bool,
}

impl Default for ReplicationStatus {
    fn default() -> Self {
        ReplicationStatus {
            failed_to_replicate: false,
            active_folder_toggler: true,
            log_commit_changes: false,
        }
    }
}

/// Descriptor of a store, as carried inside commit-change logs.
///
/// `count` is re-enriched from the store repository during fast-forward;
/// the persisted value is a snapshot taken at commit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreInfo {
    /// Store name, unique within a deployment.
    pub name: String,
    /// Item count at commit time.
    pub count: i64,
    /// Commit timestamp, milliseconds since the epoch.
    pub timestamp: i64,
}

/// A virtual-ID record: one logical ID backed by two physical IDs, with
/// a flag selecting the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handle {
    /// Logical identifier, stable across swaps.
    pub logical_id: Uuid,
    /// First physical slot.
    pub physical_id_a: Uuid,
    /// Second physical slot.
    pub physical_id_b: Uuid,
    /// Selects `physical_id_b` as the live slot when set.
    pub is_active_id_b: bool,
    /// Version counter, bumped per update.
    pub version: i32,
    /// Work-in-progress marker, milliseconds since the epoch; zero when
    /// no update is in flight.
    pub work_in_progress_timestamp: i64,
    /// Tombstone flag.
    pub is_deleted: bool,
}

impl Handle {
    /// New handle with a fresh live physical ID in slot A.
    pub fn new(logical_id: Uuid) -> Self {
        Handle {
            logical_id,
            physical_id_a: Uuid::new_v4(),
            physical_id_b: Uuid::nil(),
            is_active_id_b: false,
            version: 0,
            work_in_progress_timestamp: 0,
            is_deleted: false,
        }
    }

    /// The currently live physical ID.
    pub fn active_id(&self) -> Uuid {
        if self.is_active_id_b {
            self.physical_id_b
        } else {
            self.physical_id_a
        }
    }
}

/// A batch of registry items scoped to one registry table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryPayload<T> {
    /// Registry table the items belong to.
    pub registry_table: String,
    /// Items in the batch.
    pub ids: Vec<T>,
}

/// One transaction-log line: `{key, value}` with the value carried as
/// base64 text so the log stays line-oriented and greppable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Caller-assigned record key.
    pub key: i32,
    /// Opaque payload bytes.
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,
}

/// Durable record of a committed transaction's store and registry
/// mutations, consumed by fast-forward: `(stores, new_root, added,
/// updated, removed)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CommitChangeRecord {
    /// Stores touched by the commit.
    pub stores: Vec<StoreInfo>,
    /// Root handles created by the commit.
    pub new_root: Vec<RegistryPayload<Handle>>,
    /// Handles added.
    pub added: Vec<RegistryPayload<Handle>>,
    /// Handles updated.
    pub updated: Vec<RegistryPayload<Handle>>,
    /// Handles removed.
    pub removed: Vec<RegistryPayload<Handle>>,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replication_status_wire_field_names() {
        let status = ReplicationStatus::default();
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(
            json,
            r#"{"FailedToReplicate":false,"ActiveFolderToggler":true,"LogCommitChanges":false}"#
        );
    }

    #[test]
    fn log_record_round_trips_as_base64_line() {
        let rec = LogRecord {
            key: 7,
            value: vec![1, 2, 3, 255],
        };
        let line = serde_json::to_string(&rec).unwrap();
        assert!(line.contains("\"AQID/w==\""));
        let back: LogRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn handle_active_id_follows_toggle() {
        let mut h = Handle::new(Uuid::new_v4());
        assert_eq!(h.active_id(), h.physical_id_a);
        h.physical_id_b = Uuid::new_v4();
        h.is_active_id_b = true;
        assert_eq!(h.active_id(), h.physical_id_b);
    }
}
