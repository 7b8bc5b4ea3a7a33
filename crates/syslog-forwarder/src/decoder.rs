// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Syslog decoding with automatic format detection.
//!
//! A frame whose priority is followed by a version number and a space is read
//! as RFC5424, anything else as BSD-style RFC3164. RFC3164 is loose by nature,
//! so that path never fails once the priority parsed: missing headers fall
//! back to the receive time and the remaining text becomes the content.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, TimeZone, Utc};

use crate::errors::DecodeError;
use crate::record::Record;

const NIL_VALUE: &str = "-";
const MAX_PRIORITY: u16 = 191;
const BSD_TIMESTAMP_LEN: usize = 15;
const MAX_TAG_LEN: usize = 48;
const BYTE_ORDER_MARK: char = '\u{feff}';

/// Decodes one syslog message. `received_at` fills in the timestamp (or the
/// year, for RFC3164) when the frame does not carry one.
pub fn decode(raw: &str, received_at: DateTime<Utc>) -> Result<Record, DecodeError> {
    let raw = raw.trim_end_matches(['\r', '\n', '\0']);
    if raw.trim().is_empty() {
        return Err(DecodeError::Empty);
    }

    let rest = strip_priority(raw)?;
    match strip_version(rest) {
        Some(header) => decode_rfc5424(header, received_at),
        None => Ok(decode_rfc3164(rest, received_at)),
    }
}

fn strip_priority(raw: &str) -> Result<&str, DecodeError> {
    let malformed = || DecodeError::Priority(raw.chars().take(32).collect());

    let (digits, rest) = raw
        .strip_prefix('<')
        .and_then(|r| r.split_once('>'))
        .ok_or_else(malformed)?;
    if digits.is_empty() || digits.len() > 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let priority: u16 = digits.parse().map_err(|_| malformed())?;
    if priority > MAX_PRIORITY {
        return Err(malformed());
    }
    Ok(rest)
}

fn strip_version(rest: &str) -> Option<&str> {
    let (version, header) = rest.split_once(' ')?;
    let is_version = !version.is_empty()
        && version.len() <= 2
        && version.bytes().all(|b| b.is_ascii_digit())
        && version != "0";
    is_version.then_some(header)
}

fn nil_to_none(value: &str) -> Option<String> {
    (value != NIL_VALUE && !value.is_empty()).then(|| value.to_string())
}

fn decode_rfc5424(header: &str, received_at: DateTime<Utc>) -> Result<Record, DecodeError> {
    let mut fields = header.splitn(6, ' ');
    let mut next_field = |name: &str| {
        fields
            .next()
            .ok_or_else(|| DecodeError::Header(format!("missing {name}")))
    };

    let timestamp = next_field("timestamp")?;
    let hostname = next_field("hostname")?;
    let app_name = next_field("app-name")?;
    let proc_id = next_field("procid")?;
    let _msg_id = next_field("msgid")?;
    let tail = next_field("structured-data")?;

    let timestamp = if timestamp == NIL_VALUE {
        received_at
    } else {
        DateTime::parse_from_rfc3339(timestamp)
            .map_err(|e| DecodeError::Header(format!("timestamp {timestamp}: {e}")))?
            .with_timezone(&Utc)
    };

    let sd_end = structured_data_len(tail)
        .ok_or_else(|| DecodeError::Header("malformed structured data".to_string()))?;
    let message = tail[sd_end..]
        .strip_prefix(' ')
        .map(|m| m.trim_start_matches(BYTE_ORDER_MARK))
        .filter(|m| !m.is_empty())
        .map(str::to_string);

    let mut record = Record::new(timestamp);
    record.hostname = nil_to_none(hostname);
    record.app_name = nil_to_none(app_name);
    record.proc_id = nil_to_none(proc_id);
    record.message = message;
    Ok(record)
}

/// Byte length of the STRUCTURED-DATA part at the start of `tail`: either the
/// nil value or a run of `[...]` elements. Quoted values may contain escaped
/// `]` and `"`.
fn structured_data_len(tail: &str) -> Option<usize> {
    if tail.starts_with(NIL_VALUE) {
        return Some(NIL_VALUE.len());
    }

    let bytes = tail.as_bytes();
    let mut pos = 0;
    while bytes.get(pos) == Some(&b'[') {
        let mut in_quotes = false;
        let mut escaped = false;
        pos += 1;
        loop {
            let b = *bytes.get(pos)?;
            pos += 1;
            match b {
                _ if escaped => escaped = false,
                b'\\' if in_quotes => escaped = true,
                b'"' => in_quotes = !in_quotes,
                b']' if !in_quotes => break,
                _ => {}
            }
        }
    }
    (pos > 0).then_some(pos)
}

fn decode_rfc3164(rest: &str, received_at: DateTime<Utc>) -> Record {
    let rest = rest.trim_start();
    let (timestamp, hostname, rest) = match parse_timestamp(rest, received_at) {
        Some((timestamp, after)) => {
            let (hostname, after) = split_hostname(after.trim_start());
            (timestamp, hostname, after)
        }
        None => (received_at, None, rest),
    };

    let mut record = Record::new(timestamp);
    record.hostname = hostname;
    match split_tag(rest) {
        Some((tag, pid, content)) => {
            record.tag = Some(tag.to_string());
            record.pid = pid.map(str::to_string);
            record.content = Some(content.to_string());
        }
        None => record.content = Some(rest.to_string()),
    }
    record
}

/// Reads either a BSD `Mmm dd hh:mm:ss` stamp or an RFC3339 one.
fn parse_timestamp(rest: &str, received_at: DateTime<Utc>) -> Option<(DateTime<Utc>, &str)> {
    if let Some(stamp) = rest.get(..BSD_TIMESTAMP_LEN) {
        let after = &rest[BSD_TIMESTAMP_LEN..];
        if after.is_empty() || after.starts_with(' ') {
            if let Some(timestamp) = parse_bsd_timestamp(stamp, received_at) {
                return Some((timestamp, after));
            }
        }
    }

    let (token, after) = rest.split_once(' ').unwrap_or((rest, ""));
    DateTime::parse_from_rfc3339(token)
        .ok()
        .map(|t| (t.with_timezone(&Utc), after))
}

fn parse_bsd_timestamp(stamp: &str, received_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let mut parts = stamp.split_whitespace();
    let (month, day, time) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let at_year = |year: i32| {
        NaiveDateTime::parse_from_str(
            &format!("{year} {month} {day} {time}"),
            "%Y %b %d %H:%M:%S",
        )
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
    };

    // No year on the wire: a stamp that would land in the future, or that
    // does not exist this year (Feb 29), belongs to the previous year.
    let year = received_at.year();
    match at_year(year) {
        Some(timestamp) if timestamp - received_at <= Duration::days(1) => Some(timestamp),
        _ => at_year(year - 1),
    }
}

fn split_hostname(rest: &str) -> (Option<String>, &str) {
    match rest.split_once(' ') {
        Some((token, after)) if !looks_like_tag(token) => (nil_to_none(token), after),
        _ => (None, rest),
    }
}

fn looks_like_tag(token: &str) -> bool {
    token.ends_with(':') || token.contains('[')
}

/// Splits `TAG[PID]: CONTENT` or `TAG: CONTENT`.
fn split_tag(rest: &str) -> Option<(&str, Option<&str>, &str)> {
    let (token, content) = rest.split_once(' ').unwrap_or((rest, ""));
    let ident = token.strip_suffix(':')?;

    let (tag, pid) = match ident.split_once('[') {
        Some((tag, pid)) => (tag, Some(pid.strip_suffix(']')?)),
        None => (ident, None),
    };
    if tag.is_empty() || tag.len() > MAX_TAG_LEN {
        return None;
    }
    Some((tag, pid.filter(|p| !p.is_empty()), content))
}
