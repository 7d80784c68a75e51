// SPDX-FileCopyrightText: Fanout Hub Team <hub@fanouthub.dev>
//
// SPDX-License-Identifier: Apache-2.0

//! Top-level error type for the HTTP surface.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum ApiError {
    #[snafu(display("exactly one of user_id/room must be supplied"))]
    AmbiguousNotifyTarget,
    #[snafu(display("notify requires a user_id or room"))]
    MissingNotifyTarget,
    #[snafu(display("internal error: {source}"))]
    Bridge { source: fanout_core::BridgeError },
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::AmbiguousNotifyTarget | ApiError::MissingNotifyTarget => StatusCode::BAD_REQUEST,
            ApiError::Bridge { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}
