// Broadcast Router: resolves an event's fan-out target set and relays it.
//
// Three delivery modes: room-broadcast-except-sender (most room events),
// full-room broadcast (chat, so the sender's own view stays ordered), and
// direct-to-user (WebRTC signaling). Delivery is fire-and-forget per
// recipient — a failed or closed recipient channel never aborts delivery
// to the others and never blocks the sender.

use collabspace_common::{protocol::ws::ServerEvent, types::RoomKey};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::{registry::ConnectionRegistry, rooms::RoomManager};

#[derive(Clone)]
pub struct BroadcastRouter {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomManager>,
}

impl BroadcastRouter {
    pub fn new(registry: Arc<ConnectionRegistry>, rooms: Arc<RoomManager>) -> Self {
        Self { registry, rooms }
    }

    /// Deliver to every room member except the sender.
    pub async fn room_except_sender(
        &self,
        room: &RoomKey,
        sender: Uuid,
        event: ServerEvent,
    ) -> usize {
        let recipients = self.rooms.members_except(room, sender).await;
        self.fan_out(recipients.iter().map(|member| member.connection_id), event).await
    }

    /// Deliver to the full room, sender included.
    pub async fn room_all(&self, room: &RoomKey, event: ServerEvent) -> usize {
        let recipients = self.rooms.members(room).await;
        self.fan_out(recipients.iter().map(|member| member.connection_id), event).await
    }

    /// Relay to every connection currently registered to one user. A target
    /// with zero connections is an expected steady-state miss, not an error:
    /// the event is dropped and the sender is not notified.
    pub async fn direct_to_user(&self, target_user_id: Uuid, event: ServerEvent) -> usize {
        let senders = self.registry.senders_of_user(target_user_id).await;
        if senders.is_empty() {
            debug!(target_user_id = %target_user_id, "direct relay target unreachable, dropping");
            return 0;
        }

        let mut sent = 0;
        for (_connection_id, sender) in senders {
            if sender.send(event.clone()).is_ok() {
                sent += 1;
            }
        }
        sent
    }

    async fn fan_out(
        &self,
        connection_ids: impl Iterator<Item = Uuid>,
        event: ServerEvent,
    ) -> usize {
        let mut sent = 0;
        for connection_id in connection_ids {
            if self.registry.send_to(connection_id, event.clone()).await {
                sent += 1;
            }
        }
        sent
    }
}
