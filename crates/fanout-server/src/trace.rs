// SPDX-FileCopyrightText: Fanout Hub Team <hub@fanouthub.dev>
//
// SPDX-License-Identifier: Apache-2.0

//! Structured logging setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::settings::LoggingSettings;

const DEFAULT_LOGGING_DIRECTIVES: &str = "error,fanout_core=info,fanout_server=info,redis=warn,reqwest=warn";

/// Initializes the global tracing subscriber. Priority, highest first:
/// `RUST_LOG` env var, the config file's `logging.default_directives`, the
/// built-in defaults above.
pub fn init(settings: &LoggingSettings) {
    let filter = build_filter(settings);
    let fmt = tracing_subscriber::fmt::Layer::default();
    Registry::default().with(filter).with(fmt).init();
}

fn build_filter(settings: &LoggingSettings) -> EnvFilter {
    let mut directives = DEFAULT_LOGGING_DIRECTIVES.to_owned();

    if let Some(config_directives) = &settings.default_directives {
        if !config_directives.is_empty() {
            directives = [directives, config_directives.join(",")].join(",");
        }
    }

    if let Ok(env_directives) = std::env::var(EnvFilter::DEFAULT_ENV) {
        if !env_directives.is_empty() {
            directives = [directives, env_directives].join(",");
        }
    }

    EnvFilter::new(directives)
}
