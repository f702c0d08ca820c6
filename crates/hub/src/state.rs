// Shared hub state handed to every router and connection task.

use std::sync::Arc;

use crate::{
    auth::jwt::JwtIdentityVerifier, broadcast::BroadcastRouter, config::HubConfig,
    lifecycle::LifecycleSupervisor, oplog::OperationLog, presence::PresenceStore,
    registry::ConnectionRegistry, rooms::RoomManager,
};

#[derive(Clone)]
pub struct HubState {
    pub config: Arc<HubConfig>,
    pub verifier: Arc<JwtIdentityVerifier>,
    pub registry: Arc<ConnectionRegistry>,
    pub rooms: Arc<RoomManager>,
    pub broadcast: BroadcastRouter,
    pub presence: PresenceStore,
    pub oplog: OperationLog,
    pub lifecycle: Arc<LifecycleSupervisor>,
}

impl HubState {
    pub fn new(
        config: HubConfig,
        verifier: JwtIdentityVerifier,
        presence: PresenceStore,
        oplog: OperationLog,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::default());
        let rooms = Arc::new(RoomManager::default());
        let broadcast = BroadcastRouter::new(Arc::clone(&registry), Arc::clone(&rooms));
        let lifecycle = Arc::new(LifecycleSupervisor::new(
            Arc::clone(&registry),
            Arc::clone(&rooms),
            broadcast.clone(),
            presence.clone(),
        ));

        Self {
            config: Arc::new(config),
            verifier: Arc::new(verifier),
            registry,
            rooms,
            broadcast,
            presence,
            oplog,
            lifecycle,
        }
    }
}
