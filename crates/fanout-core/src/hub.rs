// SPDX-FileCopyrightText: Fanout Hub Team <hub@fanouthub.dev>
//
// SPDX-License-Identifier: Apache-2.0

//! The in-process registry of connections and rooms.
//!
//! All mutable state lives behind a single [`parking_lot::RwLock`]. The
//! discipline followed throughout is: take the read lock only long enough to
//! snapshot the delivery targets, release it, then perform the actual
//! (non-blocking) send outside the lock. A failed send evicts its session —
//! eviction also happens outside the lock, since it re-acquires the write
//! lock to unregister.

use std::sync::Arc;

use bytestring::ByteString;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use tracing::warn;

use crate::{
    bridge::{BridgeError, PubSubBridge, RoomHandler, StatsHandler},
    claims::Role,
    protocol::{StatsEvent, StatsEventKind},
    session::ClientSession,
};

#[derive(Default)]
struct HubState {
    clients: FxHashMap<String, Arc<ClientSession>>,
    rooms: FxHashMap<String, FxHashSet<String>>,
}

/// A point-in-time view of one connection, for the admin inspection endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ClientSummary {
    pub id: String,
    pub user_id: String,
    pub role: Role,
    pub role_specific_id: Option<String>,
    pub rooms: Vec<String>,
}

pub struct Hub {
    state: RwLock<HubState>,
    bridge: RwLock<Option<Arc<dyn PubSubBridge>>>,
}

impl Hub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(HubState::default()),
            bridge: RwLock::new(None),
        })
    }

    /// Installs the pub/sub bridge and starts its inbound loop. The handlers
    /// hold only a [`std::sync::Weak`] reference back to this hub, so the
    /// hub and the bridge's background task never keep each other alive.
    pub async fn install_bridge(self: &Arc<Self>, bridge: Arc<dyn PubSubBridge>) {
        let weak = Arc::downgrade(self);
        let room_handler: RoomHandler = Arc::new(move |room, data| {
            if let Some(hub) = weak.upgrade() {
                // Inbound bus messages are local-fanout only — never
                // re-published, or this would loop across instances.
                hub.broadcast_room(&room, data);
            }
        });

        let weak = Arc::downgrade(self);
        let stats_handler: StatsHandler = Arc::new(move |data| {
            if let Some(hub) = weak.upgrade() {
                hub.dispatch_stats_payload(data);
            }
        });

        bridge.start(room_handler, stats_handler).await;
        *self.bridge.write() = Some(bridge);
    }

    pub fn register(&self, session: Arc<ClientSession>) {
        self.state.write().clients.insert(session.id.clone(), session);
    }

    pub fn unregister(&self, connection_id: &str) {
        let mut state = self.state.write();
        let Some(session) = state.clients.remove(connection_id) else {
            return;
        };
        for room in session.joined_rooms() {
            if let Some(members) = state.rooms.get_mut(&room) {
                members.remove(connection_id);
                if members.is_empty() {
                    state.rooms.remove(&room);
                }
            }
        }
    }

    pub fn join_room(&self, connection_id: &str, room: &str) {
        let mut state = self.state.write();
        let Some(session) = state.clients.get(connection_id).cloned() else {
            return;
        };
        session.join(room);
        state.rooms.entry(room.to_owned()).or_default().insert(connection_id.to_owned());
    }

    pub fn leave_room(&self, connection_id: &str, room: &str) {
        let mut state = self.state.write();
        if let Some(session) = state.clients.get(connection_id) {
            session.leave(room);
        }
        if let Some(members) = state.rooms.get_mut(room) {
            members.remove(connection_id);
            if members.is_empty() {
                state.rooms.remove(room);
            }
        }
    }

    pub fn send_to_user(&self, user_id: &str, data: ByteString) {
        let targets = {
            let state = self.state.read();
            state
                .clients
                .values()
                .filter(|session| session.user_id == user_id)
                .cloned()
                .collect::<Vec<_>>()
        };
        self.deliver(targets, data);
    }

    /// Local-only room broadcast. Does not touch the bus — use
    /// [`Hub::publish_room`] for messages that must also reach other
    /// instances.
    pub fn broadcast_room(&self, room: &str, data: ByteString) {
        let targets = {
            let state = self.state.read();
            state
                .rooms
                .get(room)
                .into_iter()
                .flatten()
                .filter_map(|id| state.clients.get(id).cloned())
                .collect::<Vec<_>>()
        };
        self.deliver(targets, data);
    }

    /// Room broadcast that also federates the message over the bus, so other
    /// instances deliver it to their own local members of `room`.
    pub async fn publish_room(&self, room: &str, data: ByteString) -> Result<(), BridgeError> {
        self.broadcast_room(room, data.clone());

        let bridge = self.bridge.read().clone();
        if let Some(bridge) = bridge {
            bridge.publish(room, data).await?;
        }
        Ok(())
    }

    /// Delivers a stats event to locally-connected clients matching its
    /// scope, and federates it over the bus's `events` channel.
    pub async fn publish_stats_event(&self, event: &StatsEvent) -> Result<(), BridgeError> {
        let data = match serde_json::to_string(event) {
            Ok(json) => ByteString::from(json),
            Err(error) => {
                warn!(%error, "failed to encode stats event");
                return Ok(());
            }
        };

        self.deliver_stats_event(event, data.clone());

        let bridge = self.bridge.read().clone();
        if let Some(bridge) = bridge {
            bridge.publish_stats(data).await?;
        }
        Ok(())
    }

    fn dispatch_stats_payload(&self, data: ByteString) {
        let event: StatsEvent = match serde_json::from_str(&data) {
            Ok(event) => event,
            Err(error) => {
                warn!(%error, "dropping malformed stats event from the bus");
                return;
            }
        };
        self.deliver_stats_event(&event, data);
    }

    fn deliver_stats_event(&self, event: &StatsEvent, data: ByteString) {
        if event.kind == StatsEventKind::Unknown {
            warn!(?event, "dropping stats event of unrecognized type");
            return;
        }
        let targets = {
            let state = self.state.read();
            state
                .clients
                .values()
                .filter(|session| match event.kind {
                    StatsEventKind::AdminStatsUpdated => session.role == Role::Admin,
                    StatsEventKind::SellerStatsUpdated => {
                        match event.seller_id.as_deref() {
                            Some(seller_id) if !seller_id.is_empty() => {
                                session.role == Role::Seller
                                    && session.role_specific_id.as_deref() == Some(seller_id)
                            }
                            _ => false,
                        }
                    }
                    StatsEventKind::Unknown => false,
                })
                .cloned()
                .collect::<Vec<_>>()
        };
        self.deliver(targets, data);
    }

    pub fn snapshot(&self) -> Vec<ClientSummary> {
        let state = self.state.read();
        state
            .clients
            .values()
            .map(|session| ClientSummary {
                id: session.id.clone(),
                user_id: session.user_id.clone(),
                role: session.role.clone(),
                role_specific_id: session.role_specific_id.clone(),
                rooms: session.joined_rooms(),
            })
            .collect()
    }

    pub async fn close(&self) {
        let bridge = self.bridge.write().take();
        if let Some(bridge) = bridge {
            bridge.close().await;
        }
        let sessions = {
            let state = self.state.read();
            state.clients.values().cloned().collect::<Vec<_>>()
        };
        for session in sessions {
            session.close();
        }
    }

    fn deliver(&self, targets: Vec<Arc<ClientSession>>, data: ByteString) {
        let mut evicted = Vec::new();
        for session in targets {
            if !session.send(data.clone()) {
                evicted.push(session.id.clone());
            }
        }
        for connection_id in evicted {
            self.evict(&connection_id);
        }
    }

    /// A full send failure means the consumer is gone or too slow to keep
    /// up; either way the connection is torn down rather than left to
    /// silently accumulate drops.
    fn evict(&self, connection_id: &str) {
        let session = self.state.read().clients.get(connection_id).cloned();
        if let Some(session) = session {
            session.close();
        }
        self.unregister(connection_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OUTBOUND_QUEUE_CAPACITY;

    fn register_client(hub: &Hub, id: &str, user_id: &str, role: Role) -> tokio::sync::mpsc::Receiver<ByteString> {
        let (session, receiver) = ClientSession::new(id, user_id, role, None);
        hub.register(Arc::new(session));
        receiver
    }

    #[test]
    fn join_and_broadcast_room_reaches_members_only() {
        let hub = Hub::new();
        let mut rx_a = register_client(&hub, "a", "u1", Role::Client);
        let mut rx_b = register_client(&hub, "b", "u2", Role::Client);

        hub.join_room("a", "order-1");
        hub.broadcast_room("order-1", ByteString::from_static("hello"));

        assert_eq!(rx_a.try_recv().unwrap(), ByteString::from_static("hello"));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn send_to_user_targets_all_of_that_users_connections() {
        let hub = Hub::new();
        let mut rx_a = register_client(&hub, "a", "u1", Role::Client);
        let mut rx_b = register_client(&hub, "b", "u1", Role::Client);
        let mut rx_c = register_client(&hub, "c", "u2", Role::Client);

        hub.send_to_user("u1", ByteString::from_static("ping"));

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());
    }

    #[test]
    fn leave_room_stops_further_delivery() {
        let hub = Hub::new();
        let mut rx_a = register_client(&hub, "a", "u1", Role::Client);
        hub.join_room("a", "order-1");
        hub.leave_room("a", "order-1");
        hub.broadcast_room("order-1", ByteString::from_static("hello"));
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn slow_consumer_is_evicted_on_full_queue() {
        let hub = Hub::new();
        let rx = register_client(&hub, "a", "u1", Role::Client);
        hub.join_room("a", "order-1");

        for i in 0..OUTBOUND_QUEUE_CAPACITY {
            hub.broadcast_room("order-1", ByteString::from(format!("msg-{i}")));
        }
        assert_eq!(hub.snapshot().len(), 1);

        // This send overflows the queue and evicts the connection.
        hub.broadcast_room("order-1", ByteString::from_static("overflow"));
        assert_eq!(hub.snapshot().len(), 0);

        drop(rx);
    }

    #[test]
    fn unregister_cleans_up_empty_rooms() {
        let hub = Hub::new();
        let _rx = register_client(&hub, "a", "u1", Role::Client);
        hub.join_room("a", "order-1");
        hub.unregister("a");

        let _rx_b = register_client(&hub, "b", "u2", Role::Client);
        hub.join_room("b", "order-2");
        // order-1 should no longer exist as a room with members.
        hub.broadcast_room("order-1", ByteString::from_static("nobody-home"));
        assert_eq!(hub.snapshot().len(), 1);
    }

    #[test]
    fn stats_event_reaches_only_matching_seller() {
        let hub = Hub::new();
        let (seller_session, mut seller_rx) =
            ClientSession::new("s1", "u1", Role::Seller, Some("42".to_owned()));
        hub.register(Arc::new(seller_session));
        let (other_session, mut other_rx) =
            ClientSession::new("s2", "u2", Role::Seller, Some("99".to_owned()));
        hub.register(Arc::new(other_session));

        let event = StatsEvent {
            kind: StatsEventKind::SellerStatsUpdated,
            seller_id: Some("42".to_owned()),
            timestamp: "2024-01-01T00:00:00Z".to_owned(),
            metadata: serde_json::json!({}),
        };
        hub.deliver_stats_event(&event, ByteString::from_static("{}"));

        assert!(seller_rx.try_recv().is_ok());
        assert!(other_rx.try_recv().is_err());
    }
}
