// Room Manager: per-room membership sets and their mutable attributes.
//
// Rooms are created lazily on first join and deleted when the last member
// leaves; an empty room is never addressable as a fan-out target.
//
// Lock discipline: the outer map is a `RwLock`; every membership operation
// holds the outer read guard while taking the per-room write lock, so
// operations on different rooms never contend. Deletion takes the outer
// write guard and re-checks emptiness, which cannot interleave with a join
// (joins hold the outer read guard across their insert).

use chrono::{DateTime, Utc};
use collabspace_common::{
    protocol::ws::MemberInfo,
    types::{Identity, RoomKey, RoomKind},
};
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use uuid::Uuid;

/// A connection's participation record within a room.
#[derive(Debug, Clone)]
pub struct Membership {
    pub connection_id: Uuid,
    pub identity: Identity,
    pub joined_at: DateTime<Utc>,
    pub attributes: serde_json::Map<String, Value>,
}

impl Membership {
    fn new(connection_id: Uuid, identity: Identity) -> Self {
        Self {
            connection_id,
            identity,
            joined_at: Utc::now(),
            attributes: serde_json::Map::new(),
        }
    }

    pub fn to_info(&self) -> MemberInfo {
        MemberInfo {
            connection_id: self.connection_id,
            user_id: self.identity.user_id,
            display_name: self.identity.display_name.clone(),
            joined_at: self.joined_at,
            attributes: self.attributes.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct RoomState {
    members: HashMap<Uuid, Membership>,
}

impl RoomState {
    fn snapshot(&self) -> Vec<MemberInfo> {
        let mut members: Vec<MemberInfo> =
            self.members.values().map(Membership::to_info).collect();
        members.sort_by(|a, b| {
            a.joined_at.cmp(&b.joined_at).then_with(|| a.connection_id.cmp(&b.connection_id))
        });
        members
    }
}

/// Result of a join call: the full membership snapshot plus whether the
/// connection was actually added (false on an idempotent re-join).
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub newly_joined: bool,
    pub members: Vec<MemberInfo>,
}

#[derive(Debug, Default)]
pub struct RoomManager {
    rooms: RwLock<HashMap<RoomKey, Arc<RwLock<RoomState>>>>,
}

impl RoomManager {
    /// Join a room, creating it lazily. Idempotent per connection: a repeat
    /// join changes nothing and returns the existing snapshot.
    pub async fn join(
        &self,
        room: &RoomKey,
        connection_id: Uuid,
        identity: Identity,
    ) -> JoinOutcome {
        {
            let rooms = self.rooms.read().await;
            if let Some(state) = rooms.get(room) {
                let mut state = state.write().await;
                let newly_joined = !state.members.contains_key(&connection_id);
                if newly_joined {
                    state
                        .members
                        .insert(connection_id, Membership::new(connection_id, identity));
                }
                return JoinOutcome { newly_joined, members: state.snapshot() };
            }
        }

        // Room absent: create and insert while still holding the outer write
        // guard, so a pending empty-room deletion cannot observe the room
        // before its first member lands.
        let mut rooms = self.rooms.write().await;
        let state = rooms.entry(room.clone()).or_default().clone();
        let mut state = state.write().await;
        let newly_joined = !state.members.contains_key(&connection_id);
        if newly_joined {
            state.members.insert(connection_id, Membership::new(connection_id, identity));
        }
        JoinOutcome { newly_joined, members: state.snapshot() }
    }

    /// Remove a membership; deletes the room when it empties. Safe to call
    /// for a connection that is not a member.
    pub async fn leave(&self, room: &RoomKey, connection_id: Uuid) -> Option<Membership> {
        let (removed, now_empty) = {
            let rooms = self.rooms.read().await;
            let Some(state) = rooms.get(room) else {
                return None;
            };
            let mut state = state.write().await;
            let removed = state.members.remove(&connection_id);
            (removed, state.members.is_empty())
        };

        if removed.is_some() && now_empty {
            // Re-check under the outer write guard: a join may have landed
            // between dropping the read guard and acquiring this one.
            let mut rooms = self.rooms.write().await;
            let still_empty = match rooms.get(room) {
                Some(state) => state.read().await.members.is_empty(),
                None => false,
            };
            if still_empty {
                rooms.remove(room);
            }
        }

        removed
    }

    /// Merge a partial attribute object into a membership, last-write-wins
    /// per field. The field set is open (room-kind-specific).
    pub async fn update_attributes(
        &self,
        room: &RoomKey,
        connection_id: Uuid,
        partial: serde_json::Map<String, Value>,
    ) -> bool {
        let rooms = self.rooms.read().await;
        let Some(state) = rooms.get(room) else {
            return false;
        };
        let mut state = state.write().await;
        let Some(membership) = state.members.get_mut(&connection_id) else {
            return false;
        };
        for (field, value) in partial {
            membership.attributes.insert(field, value);
        }
        true
    }

    /// Current membership snapshot; empty for an unknown room.
    pub async fn members(&self, room: &RoomKey) -> Vec<MemberInfo> {
        let rooms = self.rooms.read().await;
        match rooms.get(room) {
            Some(state) => state.read().await.snapshot(),
            None => Vec::new(),
        }
    }

    /// Fan-out target set for broadcast-except-self delivery.
    pub async fn members_except(&self, room: &RoomKey, connection_id: Uuid) -> Vec<MemberInfo> {
        self.members(room)
            .await
            .into_iter()
            .filter(|member| member.connection_id != connection_id)
            .collect()
    }

    /// Whether the connection currently belongs to the room.
    pub async fn is_member(&self, room: &RoomKey, connection_id: Uuid) -> bool {
        let rooms = self.rooms.read().await;
        match rooms.get(room) {
            Some(state) => state.read().await.members.contains_key(&connection_id),
            None => false,
        }
    }

    /// Every room currently listing this connection. Used by the lifecycle
    /// sweep on disconnect.
    pub async fn rooms_of(&self, connection_id: Uuid) -> Vec<RoomKey> {
        let rooms = self.rooms.read().await;
        let mut result = Vec::new();
        for (key, state) in rooms.iter() {
            if state.read().await.members.contains_key(&connection_id) {
                result.push(key.clone());
            }
        }
        result
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn room_count_of_kind(&self, kind: RoomKind) -> usize {
        self.rooms.read().await.keys().filter(|key| key.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity(name: &str) -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            display_name: name.into(),
            email: format!("{}@example.com", name.to_lowercase()),
        }
    }

    fn attrs(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn join_creates_room_lazily_and_returns_snapshot() {
        let manager = RoomManager::default();
        let room = RoomKey::document("doc-1");
        let connection_id = Uuid::new_v4();

        assert_eq!(manager.room_count().await, 0);
        let outcome = manager.join(&room, connection_id, identity("Alice")).await;

        assert!(outcome.newly_joined);
        assert_eq!(outcome.members.len(), 1);
        assert_eq!(outcome.members[0].connection_id, connection_id);
        assert_eq!(manager.room_count().await, 1);
    }

    #[tokio::test]
    async fn repeat_join_is_idempotent() {
        let manager = RoomManager::default();
        let room = RoomKey::document("doc-1");
        let connection_id = Uuid::new_v4();
        let alice = identity("Alice");

        let first = manager.join(&room, connection_id, alice.clone()).await;
        let second = manager.join(&room, connection_id, alice).await;

        assert!(first.newly_joined);
        assert!(!second.newly_joined);
        assert_eq!(second.members.len(), 1);
    }

    #[tokio::test]
    async fn snapshot_lists_existing_members_for_new_joiner() {
        let manager = RoomManager::default();
        let room = RoomKey::meeting("standup");
        manager.join(&room, Uuid::new_v4(), identity("Alice")).await;
        manager.join(&room, Uuid::new_v4(), identity("Bob")).await;

        let outcome = manager.join(&room, Uuid::new_v4(), identity("Carol")).await;
        assert_eq!(outcome.members.len(), 3);
    }

    #[tokio::test]
    async fn last_leave_deletes_the_room() {
        let manager = RoomManager::default();
        let room = RoomKey::document("doc-1");
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        manager.join(&room, a, identity("Alice")).await;
        manager.join(&room, b, identity("Bob")).await;

        manager.leave(&room, a).await;
        assert_eq!(manager.room_count().await, 1);

        manager.leave(&room, b).await;
        assert_eq!(manager.room_count().await, 0);
        assert!(manager.members(&room).await.is_empty());
        assert!(!manager.is_member(&room, b).await);
    }

    #[tokio::test]
    async fn leave_of_non_member_is_a_noop() {
        let manager = RoomManager::default();
        let room = RoomKey::document("doc-1");
        manager.join(&room, Uuid::new_v4(), identity("Alice")).await;

        assert!(manager.leave(&room, Uuid::new_v4()).await.is_none());
        assert!(manager.leave(&RoomKey::document("ghost"), Uuid::new_v4()).await.is_none());
        assert_eq!(manager.members(&room).await.len(), 1);
    }

    #[tokio::test]
    async fn attribute_merge_is_last_write_wins_per_field() {
        let manager = RoomManager::default();
        let room = RoomKey::meeting("standup");
        let connection_id = Uuid::new_v4();
        manager.join(&room, connection_id, identity("Alice")).await;

        manager
            .update_attributes(
                &room,
                connection_id,
                attrs(&[("video_enabled", json!(true)), ("hand_raised", json!(false))]),
            )
            .await;
        manager
            .update_attributes(&room, connection_id, attrs(&[("video_enabled", json!(false))]))
            .await;

        let members = manager.members(&room).await;
        assert_eq!(members[0].attributes["video_enabled"], json!(false));
        assert_eq!(members[0].attributes["hand_raised"], json!(false));
    }

    #[tokio::test]
    async fn update_attributes_for_non_member_reports_false() {
        let manager = RoomManager::default();
        let room = RoomKey::document("doc-1");
        manager.join(&room, Uuid::new_v4(), identity("Alice")).await;

        let updated = manager
            .update_attributes(&room, Uuid::new_v4(), attrs(&[("cursor", json!(4))]))
            .await;
        assert!(!updated);
    }

    #[tokio::test]
    async fn members_except_excludes_only_the_sender() {
        let manager = RoomManager::default();
        let room = RoomKey::document("doc-1");
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        manager.join(&room, a, identity("Alice")).await;
        manager.join(&room, b, identity("Bob")).await;
        manager.join(&room, c, identity("Carol")).await;

        let others = manager.members_except(&room, b).await;
        assert_eq!(others.len(), 2);
        assert!(others.iter().all(|member| member.connection_id != b));
    }

    #[tokio::test]
    async fn rooms_of_lists_every_membership() {
        let manager = RoomManager::default();
        let connection_id = Uuid::new_v4();
        let alice = identity("Alice");
        let doc = RoomKey::document("doc-1");
        let meeting = RoomKey::meeting("standup");
        manager.join(&doc, connection_id, alice.clone()).await;
        manager.join(&meeting, connection_id, alice).await;
        manager.join(&RoomKey::document("doc-2"), Uuid::new_v4(), identity("Bob")).await;

        let mut rooms = manager.rooms_of(connection_id).await;
        rooms.sort_by_key(|room| room.to_string());
        assert_eq!(rooms, vec![doc, meeting]);
    }

    #[tokio::test]
    async fn same_id_different_kind_are_separate_rooms() {
        let manager = RoomManager::default();
        manager.join(&RoomKey::document("x"), Uuid::new_v4(), identity("Alice")).await;
        manager.join(&RoomKey::meeting("x"), Uuid::new_v4(), identity("Bob")).await;

        assert_eq!(manager.room_count().await, 2);
        assert_eq!(manager.room_count_of_kind(RoomKind::Document).await, 1);
        assert_eq!(manager.room_count_of_kind(RoomKind::Meeting).await, 1);
    }

    #[tokio::test]
    async fn concurrent_joins_do_not_lose_members() {
        let manager = Arc::new(RoomManager::default());
        let room = RoomKey::document("doc-1");

        let mut handles = Vec::new();
        for i in 0..16 {
            let manager = Arc::clone(&manager);
            let room = room.clone();
            handles.push(tokio::spawn(async move {
                manager.join(&room, Uuid::new_v4(), identity(&format!("User{i}"))).await;
            }));
        }
        for handle in handles {
            handle.await.expect("join task should not panic");
        }

        assert_eq!(manager.members(&room).await.len(), 16);
    }

    #[tokio::test]
    async fn concurrent_leave_and_join_keep_room_addressable() {
        let manager = Arc::new(RoomManager::default());
        let room = RoomKey::document("doc-1");
        let first = Uuid::new_v4();
        manager.join(&room, first, identity("Alice")).await;

        let leaver = {
            let manager = Arc::clone(&manager);
            let room = room.clone();
            tokio::spawn(async move { manager.leave(&room, first).await })
        };
        let joiner = {
            let manager = Arc::clone(&manager);
            let room = room.clone();
            tokio::spawn(async move { manager.join(&room, Uuid::new_v4(), identity("Bob")).await })
        };

        leaver.await.expect("leave should not panic");
        joiner.await.expect("join should not panic");

        // Bob joined, so his membership must be visible in a snapshot.
        let members = manager.members(&room).await;
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].display_name, "Bob");
        assert_eq!(manager.room_count().await, 1);
    }
}
