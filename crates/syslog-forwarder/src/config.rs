// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;
use tracing::warn;

use crate::batcher::DEFAULT_FLUSH_INTERVAL;
use crate::errors::ConfigError;
use crate::listener::{ListenerConfig, DEFAULT_HOST, DEFAULT_PORT};
use crate::signing::Credentials;

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_LOG_STORE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_group_name: String,
    /// Prefix for the stream name; a unique id is always appended.
    pub stream_name_prefix: Option<String>,
    /// How often pending records are delivered.
    pub flush_interval: Duration,
    pub region: String,
    pub log_store_endpoint: String,
    /// Used to sign store requests. Only optional with an explicit endpoint.
    pub credentials: Option<Credentials>,
    pub log_store_timeout: Duration,
    pub https_proxy: Option<String>,
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        let log_group_name =
            non_empty_var("LOG_GROUP_NAME").ok_or(ConfigError::Missing("LOG_GROUP_NAME"))?;

        let port = match non_empty_var("PORT") {
            Some(port) => port
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::Invalid("PORT", format!("{port}: {e}")))?,
            None => DEFAULT_PORT,
        };

        let flush_interval = non_empty_var("TICKER_TIME")
            .map_or(DEFAULT_FLUSH_INTERVAL, |ms| parse_flush_interval(&ms));

        let region = non_empty_var("AWS_REGION")
            .or_else(|| non_empty_var("AWS_DEFAULT_REGION"))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let endpoint_override = non_empty_var("LOG_STORE_ENDPOINT");
        let credentials = credentials_from_env()?;
        if endpoint_override.is_none() && credentials.is_none() {
            return Err(ConfigError::Missing("AWS_ACCESS_KEY_ID"));
        }
        let log_store_endpoint =
            endpoint_override.unwrap_or_else(|| format!("https://logs.{region}.amazonaws.com"));

        let log_store_timeout = match non_empty_var("LOG_STORE_TIMEOUT_SECS") {
            Some(secs) => Duration::from_secs(secs.trim().parse::<u64>().map_err(|e| {
                ConfigError::Invalid("LOG_STORE_TIMEOUT_SECS", format!("{secs}: {e}"))
            })?),
            None => Duration::from_secs(DEFAULT_LOG_STORE_TIMEOUT_SECS),
        };

        Ok(Config {
            host: non_empty_var("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            log_group_name,
            stream_name_prefix: non_empty_var("STREAM_NAME"),
            flush_interval,
            region,
            log_store_endpoint,
            credentials,
            log_store_timeout,
            https_proxy: non_empty_var("HTTPS_PROXY"),
        })
    }

    #[must_use]
    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

/// Both keys or neither; a lone key is a configuration mistake.
fn credentials_from_env() -> Result<Option<Credentials>, ConfigError> {
    match (
        non_empty_var("AWS_ACCESS_KEY_ID"),
        non_empty_var("AWS_SECRET_ACCESS_KEY"),
    ) {
        (Some(access_key_id), Some(secret_access_key)) => Ok(Some(Credentials::new(
            access_key_id,
            secret_access_key,
            non_empty_var("AWS_SESSION_TOKEN"),
        ))),
        (Some(_), None) => Err(ConfigError::Missing("AWS_SECRET_ACCESS_KEY")),
        (None, Some(_)) => Err(ConfigError::Missing("AWS_ACCESS_KEY_ID")),
        (None, None) => Ok(None),
    }
}

fn parse_flush_interval(ms: &str) -> Duration {
    match ms.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Duration::from_millis(ms),
        _ => {
            warn!(
                "Invalid TICKER_TIME '{ms}', using {} milliseconds",
                DEFAULT_FLUSH_INTERVAL.as_millis()
            );
            DEFAULT_FLUSH_INTERVAL
        }
    }
}
