// SPDX-FileCopyrightText: Fanout Hub Team <hub@fanouthub.dev>
//
// SPDX-License-Identifier: Apache-2.0

//! Layered settings: a TOML file overlaid with environment variables.

use std::net::{IpAddr, Ipv4Addr};

use config::{Config, Environment as EnvSource, File, FileFormat};
use serde::Deserialize;
use snafu::{ResultExt, Snafu};

const ENV_PREFIX: &str = "FANOUT";

#[derive(Debug, Snafu)]
pub enum SettingsError {
    #[snafu(display("failed to build configuration from {file_name}: {source}"))]
    Build {
        file_name: String,
        source: config::ConfigError,
    },
    #[snafu(display("configuration at {file_name} failed to deserialize: {source}"))]
    Deserialize {
        file_name: String,
        source: serde_path_to_error::Error<config::ConfigError>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub http: HttpSettings,
    /// No `#[serde(default)]`: a missing `auth.secret` is a startup failure,
    /// not a silent insecure default.
    pub auth: AuthSettings,
    #[serde(default)]
    pub authorization: AuthorizationSettings,
    #[serde(default)]
    pub redis: Option<RedisSettings>,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub environment: String,
}

impl Settings {
    /// Loads `{file_name}` (if present) overlaid with `FANOUT__*` environment
    /// variables, reporting deserialization failures with the offending key.
    pub fn load(file_name: &str) -> Result<Self, SettingsError> {
        let config = Config::builder()
            .add_source(File::new(file_name, FileFormat::Toml).required(false))
            .add_source(
                EnvSource::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context(BuildSnafu {
                file_name: file_name.to_owned(),
            })?;

        serde_path_to_error::deserialize(config).context(DeserializeSnafu {
            file_name: file_name.to_owned(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub address: IpAddr,
    pub port: u16,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
        }
    }
}

/// Deliberately has no `Default` impl: unlike every other section, there is
/// no safe fallback for the HMAC secret, so an empty or absent config file
/// must fail to load rather than run with a guessable built-in secret.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    pub secret: String,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthorizationSettings {
    pub policy_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    pub url: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub default_directives: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_file_still_loads_from_env() {
        std::env::set_var("FANOUT__AUTH__SECRET", "test-secret");
        let settings = Settings::load("does-not-exist.toml").unwrap();
        assert_eq!(settings.auth.secret, "test-secret");
        assert_eq!(settings.http.port, 8080);
        std::env::remove_var("FANOUT__AUTH__SECRET");
    }
}
