// Operation Log: bounded per-document append log in the shared store,
// used only so a briefly disconnected client can catch up without a full
// document replay. Explicitly a best-effort cache: if the store evicts or
// is unreachable, catch-up degrades to "no history".

use collabspace_common::protocol::ws::OperationRecord;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};
use tokio::sync::RwLock;
use tracing::warn;

use crate::metrics;

/// Dual-backend bounded operation log, oldest entries evicted first.
#[derive(Clone)]
pub enum OperationLog {
    Redis { conn: ConnectionManager, cap: usize },
    Memory { logs: Arc<RwLock<HashMap<String, VecDeque<OperationRecord>>>>, cap: usize },
}

impl OperationLog {
    pub fn redis(conn: ConnectionManager, cap: usize) -> Self {
        Self::Redis { conn, cap }
    }

    pub fn memory(cap: usize) -> Self {
        Self::Memory { logs: Arc::new(RwLock::new(HashMap::new())), cap }
    }

    /// Append a record to the head of the room's log and trim to the cap.
    pub async fn append(&self, record: &OperationRecord) {
        match self {
            Self::Redis { conn, cap } => {
                let payload = match serde_json::to_string(record) {
                    Ok(payload) => payload,
                    Err(error) => {
                        warn!(room_id = %record.room_id, error = %error, "operation record failed to serialize");
                        return;
                    }
                };
                let key = oplog_key(&record.room_id);
                let mut conn = conn.clone();
                let push: Result<(), redis::RedisError> = conn.lpush(&key, payload).await;
                if let Err(error) = push {
                    warn!(room_id = %record.room_id, error = %error, "operation log append failed");
                    metrics::increment_store_errors();
                    return;
                }
                let trim: Result<(), redis::RedisError> =
                    conn.ltrim(&key, 0, *cap as isize - 1).await;
                if let Err(error) = trim {
                    warn!(room_id = %record.room_id, error = %error, "operation log trim failed");
                }
            }
            Self::Memory { logs, cap } => {
                let mut logs = logs.write().await;
                let log = logs.entry(record.room_id.clone()).or_default();
                log.push_front(record.clone());
                log.truncate(*cap);
            }
        }
    }

    /// Recent operations for a room in chronological (oldest-first) order;
    /// empty when the store has no history or is unreachable.
    pub async fn recent(&self, room_id: &str) -> Vec<OperationRecord> {
        match self {
            Self::Redis { conn, cap } => {
                let mut conn = conn.clone();
                let raw: Vec<String> =
                    match conn.lrange(oplog_key(room_id), 0, *cap as isize - 1).await {
                        Ok(raw) => raw,
                        Err(error) => {
                            warn!(room_id = %room_id, error = %error, "operation log read failed");
                            metrics::increment_store_errors();
                            return Vec::new();
                        }
                    };
                parse_records(raw)
            }
            Self::Memory { logs, .. } => {
                let logs = logs.read().await;
                let mut records: Vec<OperationRecord> =
                    logs.get(room_id).map(|log| log.iter().cloned().collect()).unwrap_or_default();
                records.reverse();
                records
            }
        }
    }
}

fn oplog_key(room_id: &str) -> String {
    format!("doc_ops:{room_id}")
}

/// Decode stored entries, newest first on the wire; unparseable entries are
/// skipped rather than failing the whole read.
fn parse_records(raw: Vec<String>) -> Vec<OperationRecord> {
    let mut records: Vec<OperationRecord> = raw
        .iter()
        .filter_map(|entry| serde_json::from_str(entry).ok())
        .collect();
    records.reverse();
    records
}
