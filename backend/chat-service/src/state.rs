use crate::{
    config::Config,
    services::{
        ChannelMembershipResolver, FriendService, GroupService, MembershipCoordinator,
        MessageService, SearchService,
    },
    store::SharedStore,
    websocket::{ConnectionRegistry, EventBroadcaster, RealtimeHub},
};
use std::sync::Arc;

/// Composition root; one instance shared by every worker
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub hub: RealtimeHub,
    pub broadcaster: EventBroadcaster,
    pub coordinator: MembershipCoordinator,
    pub friends: FriendService,
    pub groups: GroupService,
    pub messages: MessageService,
    pub search: SearchService,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: SharedStore, config: Arc<Config>) -> Self {
        let resolver = ChannelMembershipResolver::new(store.clone());
        let hub = RealtimeHub::new(ConnectionRegistry::new(), resolver);
        let broadcaster = EventBroadcaster::new(hub.clone());

        Self {
            coordinator: MembershipCoordinator::new(store.clone(), hub.clone(), broadcaster.clone()),
            friends: FriendService::new(store.clone()),
            groups: GroupService::new(store.clone()),
            messages: MessageService::new(store.clone(), broadcaster.clone(), config.max_page_size),
            search: SearchService::new(store.clone()),
            store,
            hub,
            broadcaster,
            config,
        }
    }
}
