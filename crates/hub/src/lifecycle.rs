// Lifecycle Supervisor: reclaims everything a connection owns when it goes
// away, on every disconnect path (clean close, transport error, idle sweep).
//
// Idempotent end-to-end: the room sweep is driven by what the Room Manager
// still lists, unregister is a no-op the second time, and the offline
// transition only fires when the registry shows no remaining connections
// for the user (multi-device presence must not flicker).

use chrono::Utc;
use collabspace_common::protocol::ws::ServerEvent;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::{
    broadcast::BroadcastRouter, presence::PresenceStore, registry::ConnectionRegistry,
    rooms::RoomManager,
};

pub struct LifecycleSupervisor {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomManager>,
    broadcast: BroadcastRouter,
    presence: PresenceStore,
}

impl LifecycleSupervisor {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        rooms: Arc<RoomManager>,
        broadcast: BroadcastRouter,
        presence: PresenceStore,
    ) -> Self {
        Self { registry, rooms, broadcast, presence }
    }

    /// Release every room membership and presence claim of a connection,
    /// notifying the remaining members of each room.
    pub async fn on_disconnect(&self, connection_id: Uuid) {
        let mut rooms_left = 0usize;
        for room in self.rooms.rooms_of(connection_id).await {
            let Some(membership) = self.rooms.leave(&room, connection_id).await else {
                continue;
            };
            rooms_left += 1;
            let notice = ServerEvent::CollaboratorLeft {
                room: room.clone(),
                user_id: membership.identity.user_id,
                display_name: membership.identity.display_name.clone(),
                timestamp: Utc::now(),
            };
            // The connection is already out of the room, so a full-room
            // broadcast reaches exactly the remaining members.
            self.broadcast.room_all(&room, notice).await;
        }

        let Some(connection) = self.registry.unregister(connection_id).await else {
            return;
        };

        let user_id = connection.identity.user_id;
        if self.registry.connections_of(user_id).await.is_empty() {
            self.presence.mark_offline(user_id).await;
        }

        info!(
            connection_id = %connection_id,
            user_id = %user_id,
            display_name = %connection.identity.display_name,
            rooms_left,
            "connection cleaned up"
        );
    }
}
