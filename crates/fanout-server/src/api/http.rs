// SPDX-FileCopyrightText: Fanout Hub Team <hub@fanouthub.dev>
//
// SPDX-License-Identifier: Apache-2.0

//! The minimal HTTP surface alongside the websocket endpoint.

use actix_web::{get, post, web, HttpResponse};
use fanout_core::Hub;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    event: String,
    data: Value,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    room: Option<String>,
}

/// Delegates to [`crate::notify::NotificationService`] the way the original
/// source's handler hands the room case to its `NotificationService` and the
/// user case to a direct `SendToUser` (`§1`, "per-domain notification
/// convenience methods").
#[post("/api/notify")]
pub async fn notify(
    state: web::Data<AppState>,
    body: web::Json<NotifyRequest>,
) -> Result<HttpResponse, ApiError> {
    let NotifyRequest {
        event,
        data,
        user_id,
        room,
    } = body.into_inner();

    match (user_id, room) {
        (Some(_), Some(_)) => return Err(ApiError::AmbiguousNotifyTarget),
        (None, None) => return Err(ApiError::MissingNotifyTarget),
        (Some(user_id), None) => state.notifications.send_notification_to_user(&user_id, &event, data),
        (None, Some(room)) => state
            .notifications
            .broadcast_notification(&room, &event, data)
            .await
            .map_err(|source| ApiError::Bridge { source })?,
    }

    Ok(HttpResponse::Accepted().finish())
}

#[derive(Debug, Serialize)]
struct SnapshotResponse {
    clients: usize,
    rooms: std::collections::BTreeMap<String, usize>,
}

#[get("/admin/clients")]
pub async fn admin_clients(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(snapshot_response(&state.hub))
}

fn snapshot_response(hub: &Hub) -> SnapshotResponse {
    let clients = hub.snapshot();
    let mut rooms = std::collections::BTreeMap::new();
    for client in &clients {
        for room in &client.rooms {
            *rooms.entry(room.clone()).or_insert(0usize) += 1;
        }
    }
    SnapshotResponse {
        clients: clients.len(),
        rooms,
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    environment: String,
}

#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy",
        environment: state.environment.clone(),
    })
}
