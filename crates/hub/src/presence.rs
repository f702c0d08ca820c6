// Presence Store: online/offline status per user in the shared expiring
// store.
//
// Entries carry a short TTL and are refreshed while a connection is alive,
// so presence self-heals if a process dies without running its disconnect
// sweep. Absence of a live entry reads as offline. Store failures are
// logged and swallowed — presence degrades, the hub keeps serving.

use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::metrics;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresenceEntry {
    pub status: PresenceStatus,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug)]
pub struct MemoryEntry {
    entry: PresenceEntry,
    expires_at: Instant,
}

/// Dual-backend presence store: Redis in production, in-process for local
/// runs and tests.
#[derive(Clone)]
pub enum PresenceStore {
    Redis { conn: ConnectionManager, ttl_secs: u64 },
    Memory { entries: Arc<RwLock<HashMap<Uuid, MemoryEntry>>>, ttl: Duration },
}

impl PresenceStore {
    pub fn redis(conn: ConnectionManager, ttl_secs: u64) -> Self {
        Self::Redis { conn, ttl_secs }
    }

    pub fn memory(ttl: Duration) -> Self {
        Self::Memory { entries: Arc::new(RwLock::new(HashMap::new())), ttl }
    }

    /// Publish an online entry; also used as the periodic refresh.
    pub async fn mark_online(&self, user_id: Uuid) {
        self.write(user_id, PresenceStatus::Online).await;
    }

    /// Explicit offline transition when a user's last connection closes.
    /// Written with the same TTL; expiry remains the backstop.
    pub async fn mark_offline(&self, user_id: Uuid) {
        self.write(user_id, PresenceStatus::Offline).await;
    }

    /// Look up a user's presence. A missing or expired entry reads as
    /// offline with no last-seen time.
    pub async fn status(&self, user_id: Uuid) -> PresenceStatus {
        self.lookup(user_id)
            .await
            .map(|entry| entry.status)
            .unwrap_or(PresenceStatus::Offline)
    }

    pub async fn lookup(&self, user_id: Uuid) -> Option<PresenceEntry> {
        match self {
            Self::Redis { conn, .. } => {
                let mut conn = conn.clone();
                let raw: Option<String> = match conn.get(presence_key(user_id)).await {
                    Ok(raw) => raw,
                    Err(error) => {
                        warn!(user_id = %user_id, error = %error, "presence lookup failed");
                        metrics::increment_store_errors();
                        return None;
                    }
                };
                raw.and_then(|raw| serde_json::from_str(&raw).ok())
            }
            Self::Memory { entries, .. } => {
                let entries = entries.read().await;
                entries
                    .get(&user_id)
                    .filter(|entry| entry.expires_at > Instant::now())
                    .map(|entry| entry.entry.clone())
            }
        }
    }

    async fn write(&self, user_id: Uuid, status: PresenceStatus) {
        let entry = PresenceEntry { status, last_seen: Utc::now() };
        match self {
            Self::Redis { conn, ttl_secs } => {
                let mut conn = conn.clone();
                let payload = match serde_json::to_string(&entry) {
                    Ok(payload) => payload,
                    Err(error) => {
                        warn!(user_id = %user_id, error = %error, "presence entry failed to serialize");
                        return;
                    }
                };
                let result: Result<(), redis::RedisError> =
                    conn.set_ex(presence_key(user_id), payload, *ttl_secs).await;
                if let Err(error) = result {
                    warn!(user_id = %user_id, error = %error, "presence write failed");
                    metrics::increment_store_errors();
                }
            }
            Self::Memory { entries, ttl } => {
                let mut entries = entries.write().await;
                entries.insert(user_id, MemoryEntry { entry, expires_at: Instant::now() + *ttl });
            }
        }
    }
}

fn presence_key(user_id: Uuid) -> String {
    format!("user_presence:{user_id}")
}
