// SPDX-FileCopyrightText: Fanout Hub Team <hub@fanouthub.dev>
//
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use fanout_core::{Hub, RoomAuthorizer, TokenValidator};

use crate::notify::NotificationService;

pub mod http;
pub mod ws;

/// Shared application state handed to every handler via `web::Data`.
pub struct AppState {
    pub hub: Arc<Hub>,
    pub validator: Arc<TokenValidator>,
    pub authorizer: Arc<RoomAuthorizer>,
    pub notifications: Arc<NotificationService>,
    pub environment: String,
}
