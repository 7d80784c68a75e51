// SPDX-FileCopyrightText: Fanout Hub Team <hub@fanouthub.dev>
//
// SPDX-License-Identifier: Apache-2.0

mod api;
mod error;
mod models;
mod notify;
mod settings;
mod trace;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use fanout_core::{Hub, RedisBridge, RoomAuthorizer, TokenValidator, TokenValidatorConfig};
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;

use api::{http, ws, AppState};
use notify::NotificationService;
use settings::Settings;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config_path =
        std::env::var("FANOUT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned());
    let settings = Settings::load(&config_path).unwrap_or_else(|error| {
        panic!("failed to load settings from {config_path}: {error}");
    });

    trace::init(&settings.logging);

    let hub = Hub::new();

    if let Some(redis_settings) = &settings.redis {
        match RedisBridge::connect(&redis_settings.url, redis_settings.password.as_deref()).await {
            Ok(bridge) => {
                hub.install_bridge(Arc::new(bridge)).await;
                info!("pub/sub bridge connected");
            }
            Err(error) => {
                warn!(%error, "failed to connect pub/sub bridge, continuing with local-only fan-out");
            }
        }
    }

    let validator = Arc::new(TokenValidator::new(TokenValidatorConfig {
        secret: settings.auth.secret.clone(),
        expected_issuer: settings.auth.issuer.clone(),
        expected_audience: settings.auth.audience.clone(),
    }));
    let authorizer = Arc::new(RoomAuthorizer::new(settings.authorization.policy_base_url.clone()));
    let notifications = Arc::new(NotificationService::new(hub.clone()));

    let state = web::Data::new(AppState {
        hub: hub.clone(),
        validator,
        authorizer,
        notifications,
        environment: settings.environment.clone(),
    });

    let bind_address = (settings.http.address, settings.http.port);
    info!(?bind_address, "starting fanout-server");

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(TracingLogger::default())
            .wrap(Cors::permissive())
            .service(ws::ws_handshake)
            .service(http::notify)
            .service(http::admin_clients)
            .service(http::health)
    })
    .bind(bind_address)?
    .run();

    server.await?;

    hub.close().await;
    Ok(())
}
