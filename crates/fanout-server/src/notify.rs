// SPDX-FileCopyrightText: Fanout Hub Team <hub@fanouthub.dev>
//
// SPDX-License-Identifier: Apache-2.0

//! High-level, per-domain convenience wrappers around [`Hub`] fan-out.
//!
//! Mirrors the original source's `NotificationService`: a thin layer so a
//! caller embedding this crate doesn't have to hand-build the `Notification`
//! envelope and pick `send_to_user` vs `publish_room` itself for every
//! domain event it wants to emit.

use std::sync::Arc;

use bytestring::ByteString;
use fanout_core::{BridgeError, Hub};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::models::{Order, Product};

/// Wire shape for every notification this service sends: `to` records the
/// resolved destination (a user id or a room name) for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub event: String,
    pub data: Value,
    pub to: String,
}

impl Notification {
    pub fn new(event: impl Into<String>, data: Value, to: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data,
            to: to.into(),
        }
    }

    fn encode(&self) -> Option<ByteString> {
        match serde_json::to_string(self) {
            Ok(json) => Some(ByteString::from(json)),
            Err(error) => {
                warn!(%error, event = %self.event, "failed to encode notification");
                None
            }
        }
    }
}

/// Per-domain convenience methods on top of the hub's generic `SendToUser`
/// and `PublishRoom` entry points.
pub struct NotificationService {
    hub: Arc<Hub>,
}

impl NotificationService {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }

    /// Sends an order update directly to the owning client.
    pub fn send_order_update(&self, user_id: &str, order: &Order) {
        let notification = Notification::new(
            "order_updated",
            serde_json::to_value(order).unwrap_or(Value::Null),
            user_id,
        );
        let Some(payload) = notification.encode() else {
            return;
        };
        self.hub.send_to_user(user_id, payload);
        info!(user_id, order_id = order.id_order, "order update sent");
    }

    /// Publishes a product update to every subscriber of `room` (locally and
    /// across instances via the bridge, like any other `PublishRoom`).
    pub async fn send_product_update(&self, room: &str, product: &Product) -> Result<(), BridgeError> {
        let notification = Notification::new(
            "product_updated",
            serde_json::to_value(product).unwrap_or(Value::Null),
            room,
        );
        let Some(payload) = notification.encode() else {
            return Ok(());
        };
        self.hub.publish_room(room, payload).await?;
        info!(room, product_id = product.id_product, "product update sent");
        Ok(())
    }

    /// Publishes an arbitrary event to a room.
    pub async fn broadcast_notification(
        &self,
        room: &str,
        event: &str,
        data: Value,
    ) -> Result<(), BridgeError> {
        let notification = Notification::new(event, data, room);
        let Some(payload) = notification.encode() else {
            return Ok(());
        };
        self.hub.publish_room(room, payload).await?;
        info!(room, event, "notification broadcast");
        Ok(())
    }

    /// Sends an arbitrary event directly to one user.
    pub fn send_notification_to_user(&self, user_id: &str, event: &str, data: Value) {
        let notification = Notification::new(event, data, user_id);
        let Some(payload) = notification.encode() else {
            return;
        };
        self.hub.send_to_user(user_id, payload);
        info!(user_id, event, "notification sent");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanout_core::{ClientSession, Role};
    use pretty_assertions::assert_eq;

    fn order(id: i64) -> Order {
        Order {
            id_order: id,
            order_date: chrono::Utc::now(),
            status: "pending".into(),
            total_amount: 10.0,
            delivery_type: "pickup".into(),
            id_client: 1,
            id_cart: 1,
            id_payment_method: 1,
            id_delivery: None,
        }
    }

    #[tokio::test]
    async fn send_order_update_reaches_owning_user() {
        let hub = Hub::new();
        let (session, mut rx) = ClientSession::new("c1", "u1", Role::Client, None);
        hub.register(std::sync::Arc::new(session));

        let service = NotificationService::new(hub);
        service.send_order_update("u1", &order(7));

        let payload = rx.try_recv().unwrap();
        assert!(payload.contains("order_updated"));
        assert!(payload.contains("\"id_order\":7"));
    }

    #[tokio::test]
    async fn broadcast_notification_reaches_room_members() {
        let hub = Hub::new();
        let (session, mut rx) = ClientSession::new("c1", "u1", Role::Client, None);
        hub.register(std::sync::Arc::new(session));
        hub.join_room("c1", "order-7");

        let service = NotificationService::new(hub);
        service
            .broadcast_notification("order-7", "order_shipped", serde_json::json!({"ok": true}))
            .await
            .unwrap();

        let payload = rx.try_recv().unwrap();
        assert_eq!(
            serde_json::from_str::<Notification>(&payload)
                .map(|n| n.event)
                .unwrap_or_default(),
            "order_shipped"
        );
    }
}
