// SPDX-FileCopyrightText: Fanout Hub Team <hub@fanouthub.dev>
//
// SPDX-License-Identifier: Apache-2.0

//! Core library for the realtime message-fanout hub: token verification,
//! room authorization, the wire protocol, the per-connection session object,
//! the in-process hub registry, and the pub/sub bridge used to federate
//! rooms across instances.

pub mod auth;
pub mod authorizer;
pub mod bridge;
pub mod claims;
pub mod hub;
pub mod protocol;
pub mod session;

pub use auth::{AuthError, TokenValidator, TokenValidatorConfig};
pub use authorizer::{AuthorizationError, RoomAuthorizer};
pub use bridge::{BridgeError, PubSubBridge, RedisBridge};
pub use claims::{Claims, Role};
pub use hub::{ClientSummary, Hub};
pub use protocol::{
    Envelope, InboundMessage, InboundRequest, ProtocolError, StatsEvent, StatsEventKind,
    MAX_FRAME_BYTES, OUTBOUND_QUEUE_CAPACITY,
};
pub use session::ClientSession;
