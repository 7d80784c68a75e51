// SPDX-FileCopyrightText: Fanout Hub Team <hub@fanouthub.dev>
//
// SPDX-License-Identifier: Apache-2.0

//! The `/ws` upgrade endpoint and the per-connection reader/writer tasks.

use std::{sync::Arc, time::Duration};

use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_httpauth::headers::authorization::{Authorization, Bearer};
use bytestring::ByteString;
use fanout_core::{
    protocol::{join_ack, leave_ack},
    ClientSession, Claims, Envelope, Hub, InboundMessage, InboundRequest, ProtocolError,
    RoomAuthorizer, TokenValidator, MAX_FRAME_BYTES,
};
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_futures::Instrument;
use uuid::Uuid;

use super::AppState;

/// Per-write deadline for the connection's writer task (§5).
const WRITE_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

#[get("/ws")]
pub async fn ws_handshake(
    req: HttpRequest,
    body: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let header_token = Authorization::<Bearer>::parse(&req)
        .ok()
        .map(|auth| format!("Bearer {}", auth.into_scheme().token()));
    let query_token = web::Query::<TokenQuery>::from_query(req.query_string())
        .ok()
        .and_then(|query| query.into_inner().token);

    let token = match TokenValidator::extract_token(header_token.as_deref(), query_token.as_deref()) {
        Ok(token) => token.to_owned(),
        Err(_) => return Ok(HttpResponse::Unauthorized().finish()),
    };

    let claims = match state.validator.validate(&token) {
        Ok(claims) => claims,
        Err(error) => {
            warn!(%error, "rejected websocket handshake");
            return Ok(HttpResponse::Unauthorized().finish());
        }
    };

    let (response, session, msg_stream) = actix_ws::handle(&req, body)?;

    let connection_id = Uuid::new_v4().to_string();
    let (client_session, outbound_rx) = ClientSession::new(
        connection_id.clone(),
        claims.user_id.clone(),
        claims.role.clone(),
        claims.role_specific_id.clone(),
    );
    let client_session = Arc::new(client_session);
    state.hub.register(client_session.clone());

    let span = tracing::info_span!(
        "ws_connection",
        connection_id = %connection_id,
        user_id = %claims.user_id,
    );

    info!(parent: &span, "connection established");

    actix_web::rt::spawn(
        writer_loop(client_session.clone(), session.clone(), outbound_rx).instrument(span.clone()),
    );
    actix_web::rt::spawn(
        reader_loop(
            client_session,
            session,
            msg_stream,
            state.hub.clone(),
            state.authorizer.clone(),
            claims,
        )
        .instrument(span),
    );

    Ok(response)
}

async fn writer_loop(
    client_session: Arc<ClientSession>,
    mut session: actix_ws::Session,
    mut outbound_rx: mpsc::Receiver<ByteString>,
) {
    loop {
        tokio::select! {
            biased;
            _ = client_session.closed() => break,
            next = outbound_rx.recv() => {
                let Some(data) = next else { break };
                let write = tokio::time::timeout(WRITE_DEADLINE, session.text(data));
                match write.await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) | Err(_) => break,
                }
            }
        }
    }
    client_session.close();
    let _ = session.close(None).await;
}

async fn reader_loop(
    client_session: Arc<ClientSession>,
    mut session: actix_ws::Session,
    mut msg_stream: actix_ws::MessageStream,
    hub: Arc<Hub>,
    authorizer: Arc<RoomAuthorizer>,
    claims: Claims,
) {
    while let Some(Ok(message)) = msg_stream.next().await {
        match message {
            actix_ws::Message::Text(text) => {
                if text.len() > MAX_FRAME_BYTES {
                    send_error(&client_session, &hub, ProtocolError::MessageTooLarge);
                    break;
                }
                handle_frame(&text, &client_session, &hub, &authorizer, &claims).await;
            }
            actix_ws::Message::Ping(bytes) => {
                let _ = session.pong(&bytes).await;
            }
            actix_ws::Message::Close(_) => break,
            _ => {}
        }
    }

    hub.unregister(&client_session.id);
    client_session.close();
}

async fn handle_frame(
    text: &str,
    client_session: &Arc<ClientSession>,
    hub: &Arc<Hub>,
    authorizer: &Arc<RoomAuthorizer>,
    claims: &Claims,
) {
    let message: InboundMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(_) => {
            send_error(client_session, hub, ProtocolError::InvalidJson);
            return;
        }
    };

    let request = match message.into_request() {
        Ok(request) => request,
        Err(error) => {
            send_error(client_session, hub, error);
            return;
        }
    };

    match request {
        InboundRequest::Join { room } => {
            match authorizer.authorize(&claims.user_id, claims, &room).await {
                Ok(true) => {
                    hub.join_room(&client_session.id, &room);
                    enqueue(client_session, hub, ByteString::from(join_ack(&room)));
                }
                Ok(false) => send_error(client_session, hub, ProtocolError::NotAuthorized),
                Err(error) => {
                    warn!(%error, room = %room, "authorization check failed");
                    send_error(client_session, hub, ProtocolError::ServerError);
                }
            }
        }
        InboundRequest::Leave { room } => {
            hub.leave_room(&client_session.id, &room);
            enqueue(client_session, hub, ByteString::from(leave_ack(&room)));
        }
        InboundRequest::Broadcast { room, body } => {
            let envelope = Envelope::new(client_session.id.clone(), room.clone(), body);
            match serde_json::to_string(&envelope) {
                Ok(json) => {
                    if let Err(error) = hub.publish_room(&room, ByteString::from(json)).await {
                        warn!(%error, room = %room, "bus publish failed");
                    }
                }
                Err(error) => warn!(%error, "failed to encode broadcast envelope"),
            }
        }
    }
}

/// Routes a direct-to-this-connection response through the outbound queue
/// rather than writing the socket from the reader task — only the writer
/// task is allowed to touch the socket (§9). A full queue here means this
/// connection is already a slow consumer, so it is evicted the same way the
/// Hub evicts one during fan-out.
fn enqueue(client_session: &Arc<ClientSession>, hub: &Arc<Hub>, data: ByteString) {
    if !client_session.send(data) {
        client_session.close();
        hub.unregister(&client_session.id);
    }
}

fn send_error(client_session: &Arc<ClientSession>, hub: &Arc<Hub>, error: ProtocolError) {
    if let Ok(json) = serde_json::to_string(&error.to_frame()) {
        enqueue(client_session, hub, ByteString::from(json));
    }
}
