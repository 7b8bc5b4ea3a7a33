// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Normalized syslog records and their single-line wire rendering.

use chrono::{DateTime, Utc};

/// Value used by syslog producers to mean "no value" for a field.
const NIL_VALUE: &str = "-";

/// A message body made of a single space is what some relays emit when the
/// message part of the frame is missing.
const EMPTY_MESSAGE: &str = " ";

/// One decoded syslog event.
///
/// RFC3164 frames fill `tag`, `pid` and `content`; RFC5424 frames fill
/// `app_name`, `proc_id` and `message`. Rendering picks whichever is usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub timestamp: DateTime<Utc>,
    pub hostname: Option<String>,
    pub tag: Option<String>,
    pub app_name: Option<String>,
    pub proc_id: Option<String>,
    pub pid: Option<String>,
    pub message: Option<String>,
    pub content: Option<String>,
}

impl Record {
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Record {
            timestamp,
            hostname: None,
            tag: None,
            app_name: None,
            proc_id: None,
            pid: None,
            message: None,
            content: None,
        }
    }

    /// Milliseconds since the Unix epoch, as the log store expects them.
    #[must_use]
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    /// The message body to forward: `message` unless it is missing, empty or
    /// the single-space placeholder, then `content`.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        usable(self.message.as_deref()).or_else(|| usable(self.content.as_deref()))
    }

    /// Whether the record has anything worth forwarding.
    #[must_use]
    pub fn is_deliverable(&self) -> bool {
        self.body().is_some()
    }

    /// Renders the record as `<hostname> <tag> [<pid>]: <message>`.
    ///
    /// The hostname and the bracketed pid are left out entirely when they are
    /// missing. The ident falls back from `tag` to `app_name` to `-`, and the
    /// pid from `proc_id` to `pid`. Returns `None` for undeliverable records.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        let body = self.body()?;
        let mut line = String::with_capacity(body.len() + 32);

        if let Some(hostname) = non_empty(self.hostname.as_deref()) {
            line.push_str(hostname);
            line.push(' ');
        }

        let ident = non_empty(self.tag.as_deref())
            .or_else(|| non_empty(self.app_name.as_deref()))
            .unwrap_or(NIL_VALUE);
        line.push_str(ident);

        let pid = non_nil(self.proc_id.as_deref()).or_else(|| non_nil(self.pid.as_deref()));
        if let Some(pid) = pid {
            line.push_str(" [");
            line.push_str(pid);
            line.push(']');
        }

        line.push_str(": ");
        line.push_str(body);
        Some(line)
    }
}

fn usable(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty() && *v != EMPTY_MESSAGE)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn non_nil(value: Option<&str>) -> Option<&str> {
    non_empty(value).filter(|v| *v != NIL_VALUE)
}
