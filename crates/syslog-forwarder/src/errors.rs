// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the syslog forwarder.

use std::net::SocketAddr;

/// A single inbound syslog unit could not be decoded.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty message")]
    Empty,
    #[error("missing or malformed priority: {0}")]
    Priority(String),
    #[error("malformed RFC5424 header: {0}")]
    Header(String),
}

/// The TCP byte stream could not be split into syslog frames.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("frame of {0} bytes exceeds the maximum of {1} bytes")]
    FrameTooLarge(usize, usize),
    #[error("invalid octet count: {0}")]
    InvalidLength(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Binding one of the listener sockets failed.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("invalid listen address {0}: {1}")]
    Address(String, String),
    #[error("failed to bind udp socket on {0}: {1}")]
    BindUdp(SocketAddr, std::io::Error),
    #[error("failed to bind tcp socket on {0}: {1}")]
    BindTcp(SocketAddr, std::io::Error),
}

/// Errors raised while reading the process configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be specified")]
    Missing(&'static str),
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

/// Provisioning the remote stream failed.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("failed to create log stream {stream} in group {group}: {source}")]
    Create {
        group: String,
        stream: String,
        #[source]
        source: crate::log_store::LogStoreError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::Missing("LOG_GROUP_NAME");
        assert_eq!(error.to_string(), "LOG_GROUP_NAME must be specified");
    }

    #[test]
    fn test_framing_error_display() {
        let error = FramingError::FrameTooLarge(70_000, 65_536);
        assert_eq!(
            error.to_string(),
            "frame of 70000 bytes exceeds the maximum of 65536 bytes"
        );
    }
}
