// SPDX-FileCopyrightText: Fanout Hub Team <hub@fanouthub.dev>
//
// SPDX-License-Identifier: Apache-2.0

//! Federates room messages across service instances over an external bus.
//!
//! The reference implementation models the bus as Redis: room messages are
//! published on `ws:room:{room}` and picked up by a pattern subscription on
//! `ws:room:*`; a second `events` channel carries role-scoped stats events.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use bytestring::ByteString;
use futures::StreamExt;
use rand::Rng;
use snafu::Snafu;
use tokio::{
    sync::{Mutex as AsyncMutex, Notify},
    task::JoinHandle,
};
use tracing::{info, warn};

const ROOM_CHANNEL_PREFIX: &str = "ws:room:";
const ROOM_CHANNEL_PATTERN: &str = "ws:room:*";
const EVENTS_CHANNEL: &str = "events";
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Snafu)]
pub enum BridgeError {
    #[snafu(display("failed to connect to the pub/sub bus: {source}"))]
    Connect { source: redis::RedisError },
    #[snafu(display("failed to publish to the pub/sub bus: {source}"))]
    Publish { source: redis::RedisError },
    #[snafu(display("publish to the pub/sub bus timed out"))]
    PublishTimeout,
}

/// Callback invoked for every inbound room message. The handler installed by
/// the Hub is local-only broadcast — it must never re-publish, or room
/// messages would loop forever between instances.
pub type RoomHandler = Arc<dyn Fn(String, ByteString) + Send + Sync>;
/// Callback invoked for every inbound stats event.
pub type StatsHandler = Arc<dyn Fn(ByteString) + Send + Sync>;

#[async_trait]
pub trait PubSubBridge: Send + Sync {
    async fn publish(&self, room: &str, data: ByteString) -> Result<(), BridgeError>;
    async fn publish_stats(&self, data: ByteString) -> Result<(), BridgeError>;
    async fn start(&self, room_handler: RoomHandler, stats_handler: StatsHandler);
    async fn close(&self);
}

/// Redis-backed [`PubSubBridge`].
pub struct RedisBridge {
    client: redis::Client,
    publish_conn: AsyncMutex<redis::aio::ConnectionManager>,
    cancel: Arc<Notify>,
    closed: AtomicBool,
    inbound_task: AsyncMutex<Option<JoinHandle<()>>>,
}

impl RedisBridge {
    async fn publish_to_channel(&self, channel: String, data: ByteString) -> Result<(), BridgeError> {
        let mut conn = self.publish_conn.lock().await;

        let result = tokio::time::timeout(
            PUBLISH_TIMEOUT,
            redis::AsyncCommands::publish::<_, _, ()>(&mut *conn, channel, data.as_ref()),
        )
        .await;

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(BridgeError::Publish { source }),
            Err(_) => Err(BridgeError::PublishTimeout),
        }
    }

    /// Connects to the bus at `redis_url`. If `password` is set and the URL
    /// doesn't already carry credentials, it is folded into the connection
    /// info directly rather than string-munged into the URL.
    pub async fn connect(redis_url: &str, password: Option<&str>) -> Result<Self, BridgeError> {
        let mut connection_info =
            redis::IntoConnectionInfo::into_connection_info(redis_url)
                .map_err(|source| BridgeError::Connect { source })?;
        if let Some(password) = password {
            if connection_info.redis.password.is_none() {
                connection_info.redis.password = Some(password.to_owned());
            }
        }
        let client =
            redis::Client::open(connection_info).map_err(|source| BridgeError::Connect { source })?;
        let publish_conn = client
            .get_connection_manager()
            .await
            .map_err(|source| BridgeError::Connect { source })?;

        Ok(Self {
            client,
            publish_conn: AsyncMutex::new(publish_conn),
            cancel: Arc::new(Notify::new()),
            closed: AtomicBool::new(false),
            inbound_task: AsyncMutex::new(None),
        })
    }
}

#[async_trait]
impl PubSubBridge for RedisBridge {
    async fn publish(&self, room: &str, data: ByteString) -> Result<(), BridgeError> {
        self.publish_to_channel(format!("{ROOM_CHANNEL_PREFIX}{room}"), data).await
    }

    async fn publish_stats(&self, data: ByteString) -> Result<(), BridgeError> {
        self.publish_to_channel(EVENTS_CHANNEL.to_owned(), data).await
    }

    async fn start(&self, room_handler: RoomHandler, stats_handler: StatsHandler) {
        let client = self.client.clone();
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(inbound_loop(client, room_handler, stats_handler, cancel));
        *self.inbound_task.lock().await = Some(handle);
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.notify_waiters();
        if let Some(handle) = self.inbound_task.lock().await.take() {
            let _ = handle.await;
        }
    }
}

async fn inbound_loop(
    client: redis::Client,
    room_handler: RoomHandler,
    stats_handler: StatsHandler,
    cancel: Arc<Notify>,
) {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        let connection = tokio::select! {
            biased;
            _ = cancel.notified() => return,
            connection = client.get_async_pubsub() => connection,
        };

        let mut pubsub = match connection {
            Ok(pubsub) => pubsub,
            Err(error) => {
                warn!(%error, "failed to open pub/sub connection, retrying");
                if sleep_with_jitter_or_cancel(backoff, &cancel).await {
                    return;
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }
        };

        if let Err(error) = pubsub.psubscribe(ROOM_CHANNEL_PATTERN).await {
            warn!(%error, "failed to subscribe to room channels, retrying");
            if sleep_with_jitter_or_cancel(backoff, &cancel).await {
                return;
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
            continue;
        }
        if let Err(error) = pubsub.subscribe(EVENTS_CHANNEL).await {
            warn!(%error, "failed to subscribe to the events channel, retrying");
            if sleep_with_jitter_or_cancel(backoff, &cancel).await {
                return;
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
            continue;
        }

        info!("subscribed to pub/sub bus");
        backoff = INITIAL_BACKOFF;

        let mut messages = pubsub.on_message();
        loop {
            tokio::select! {
                biased;
                _ = cancel.notified() => return,
                next = messages.next() => {
                    match next {
                        Some(msg) => dispatch(&msg, &room_handler, &stats_handler),
                        None => {
                            warn!("pub/sub subscription dropped, reconnecting");
                            break;
                        }
                    }
                }
            }
        }

        if sleep_with_jitter_or_cancel(backoff, &cancel).await {
            return;
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

fn dispatch(msg: &redis::Msg, room_handler: &RoomHandler, stats_handler: &StatsHandler) {
    let channel = msg.get_channel_name();
    let payload: Vec<u8> = match msg.get_payload() {
        Ok(payload) => payload,
        Err(error) => {
            warn!(%error, "failed to decode pub/sub payload");
            return;
        }
    };
    let payload = ByteString::try_from(payload).unwrap_or_default();

    if channel == EVENTS_CHANNEL {
        stats_handler(payload);
    } else if let Some(room) = channel.strip_prefix(ROOM_CHANNEL_PREFIX) {
        room_handler(room.to_owned(), payload);
    }
}

/// Sleeps for `backoff` plus uniform jitter in `[0, backoff)`, unless
/// cancellation fires first. Returns `true` if cancellation won the race.
async fn sleep_with_jitter_or_cancel(backoff: Duration, cancel: &Notify) -> bool {
    let jitter_ms = rand::thread_rng().gen_range(0..backoff.as_millis() as u64);
    let delay = backoff + Duration::from_millis(jitter_ms);

    tokio::select! {
        biased;
        _ = cancel.notified() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let mut backoff = INITIAL_BACKOFF;
        for _ in 0..10 {
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
        assert_eq!(backoff, MAX_BACKOFF);
    }
}
