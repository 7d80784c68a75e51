// SPDX-FileCopyrightText: Fanout Hub Team <hub@fanouthub.dev>
//
// SPDX-License-Identifier: Apache-2.0

//! The server-side object representing one live socket connection.

use std::{
    collections::HashSet,
    hash::{Hash, Hasher},
    sync::atomic::{AtomicBool, Ordering},
};

use bytestring::ByteString;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::{
    claims::Role,
    protocol::OUTBOUND_QUEUE_CAPACITY,
};

/// One per live connection. Owns the bounded outbound queue; the actual
/// socket write half is owned by the writer task running in the frontend,
/// which drains the paired [`mpsc::Receiver`] returned by [`ClientSession::new`].
pub struct ClientSession {
    pub id: String,
    pub user_id: String,
    pub role: Role,
    pub role_specific_id: Option<String>,
    sender: mpsc::Sender<ByteString>,
    close_notify: Notify,
    closed: AtomicBool,
    rooms: Mutex<HashSet<String>>,
}

impl ClientSession {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        role: Role,
        role_specific_id: Option<String>,
    ) -> (Self, mpsc::Receiver<ByteString>) {
        let (sender, receiver) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let session = Self {
            id: id.into(),
            user_id: user_id.into(),
            role,
            role_specific_id,
            sender,
            close_notify: Notify::new(),
            closed: AtomicBool::new(false),
            rooms: Mutex::new(HashSet::new()),
        };
        (session, receiver)
    }

    /// Non-blocking enqueue. Returns `false` if the queue is full (or
    /// already closed) — the Hub treats that as a slow-consumer signal.
    pub fn send(&self, data: ByteString) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        self.sender.try_send(data).is_ok()
    }

    /// Idempotent. The writer task observes the notification (or the
    /// subsequent drop of this session's sender) and tears the socket down.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.close_notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once [`ClientSession::close`] has run, for the writer task
    /// to race against `receiver.recv()`.
    pub async fn closed(&self) {
        if self.is_closed() {
            return;
        }
        self.close_notify.notified().await;
    }

    pub fn join(&self, room: impl Into<String>) {
        self.rooms.lock().insert(room.into());
    }

    pub fn leave(&self, room: &str) {
        self.rooms.lock().remove(room);
    }

    pub fn joined_rooms(&self) -> Vec<String> {
        self.rooms.lock().iter().cloned().collect()
    }
}

impl PartialEq for ClientSession {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ClientSession {}

impl Hash for ClientSession {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("role", &self.role)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_fails_once_queue_is_full() {
        let (session, mut receiver) = ClientSession::new("conn-1", "u1", Role::Client, None);
        for _ in 0..OUTBOUND_QUEUE_CAPACITY {
            assert!(session.send(ByteString::from_static("x")));
        }
        assert!(!session.send(ByteString::from_static("overflow")));

        // Draining frees capacity again.
        receiver.recv().await.unwrap();
        assert!(session.send(ByteString::from_static("fits-now")));
    }

    #[test]
    fn close_is_idempotent() {
        let (session, _receiver) = ClientSession::new("conn-1", "u1", Role::Client, None);
        assert!(!session.is_closed());
        session.close();
        session.close();
        assert!(session.is_closed());
    }

    #[test]
    fn send_after_close_fails() {
        let (session, _receiver) = ClientSession::new("conn-1", "u1", Role::Client, None);
        session.close();
        assert!(!session.send(ByteString::from_static("x")));
    }
}
