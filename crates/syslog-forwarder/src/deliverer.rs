// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ships batches of records to the remote log stream.
//!
//! The stream only accepts a write that carries the sequencing token returned
//! by the previous write. The token is not kept here: callers pass the current
//! one into [`Deliverer::deliver`] and keep the one handed back in the
//! [`DeliveryOutcome`].
//!
//! Delivery is at most once. A batch rejected for a stale token is dropped
//! after adopting the token the store expected, so that the next batch goes
//! through; it is never resubmitted.

use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::log_store::{
    InputLogEvent, LogStoreError, LogStoreFactory, PutLogEventsRequest, PutLogEventsResponse,
};
use crate::record::Record;

/// Continuation token required by the stream for the next write.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SequenceToken(String);

impl SequenceToken {
    pub fn new(token: impl Into<String>) -> Self {
        SequenceToken(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SequenceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extracts the token from a rejection such as
/// `The given sequenceToken is invalid. The next expected sequenceToken is: 4963`.
/// The token is whatever follows the first colon, trimmed.
#[must_use]
pub fn expected_token(message: &str) -> Option<SequenceToken> {
    let (_, token) = message.split_once(':')?;
    let token = token.trim();
    (!token.is_empty()).then(|| SequenceToken::new(token))
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("failed to open a log store session: {0}")]
    Session(#[source] LogStoreError),
    #[error("sequence token rejected: {0}")]
    StaleToken(#[source] LogStoreError),
    #[error("failed to put log events: {0}")]
    Put(#[source] LogStoreError),
}

/// What happened to one batch, and the token to use for the next one.
#[derive(Debug)]
pub struct DeliveryOutcome {
    /// Number of entries accepted by the store.
    pub result: Result<usize, DeliveryError>,
    pub next_token: Option<SequenceToken>,
}

pub struct Deliverer {
    factory: Arc<dyn LogStoreFactory>,
    log_group_name: String,
    log_stream_name: String,
}

impl Deliverer {
    #[must_use]
    pub fn new(
        factory: Arc<dyn LogStoreFactory>,
        log_group_name: String,
        log_stream_name: String,
    ) -> Self {
        Deliverer {
            factory,
            log_group_name,
            log_stream_name,
        }
    }

    #[must_use]
    pub fn log_stream_name(&self) -> &str {
        &self.log_stream_name
    }

    /// Sorts the batch by timestamp and renders it into wire events.
    /// Records with the same timestamp keep their arrival order; records
    /// without a usable message are left out.
    #[must_use]
    pub fn prepare(mut batch: Vec<Record>) -> Vec<InputLogEvent> {
        batch.sort_by_key(|r| r.timestamp);
        batch
            .iter()
            .filter_map(|record| {
                record.render().map(|message| InputLogEvent {
                    message,
                    timestamp: record.timestamp_millis(),
                })
            })
            .collect()
    }

    /// Submits `batch` as a single write, attaching `token` when there is one.
    pub async fn deliver(
        &self,
        batch: Vec<Record>,
        token: Option<SequenceToken>,
    ) -> DeliveryOutcome {
        let log_events = Self::prepare(batch);
        if log_events.is_empty() {
            return DeliveryOutcome {
                result: Ok(0),
                next_token: token,
            };
        }
        let entries = log_events.len();

        let store = match self.factory.create() {
            Ok(store) => store,
            Err(e) => {
                return DeliveryOutcome {
                    result: Err(DeliveryError::Session(e)),
                    next_token: token,
                }
            }
        };

        let request = PutLogEventsRequest {
            log_group_name: self.log_group_name.clone(),
            log_stream_name: self.log_stream_name.clone(),
            log_events,
            sequence_token: token.as_ref().map(|t| t.as_str().to_string()),
        };
        let response = store.put_log_events(request).await;
        drop(store);

        match response {
            Ok(response) => {
                Self::warn_rejected(&response);
                // A success without a token leaves the current one in place
                DeliveryOutcome {
                    result: Ok(entries),
                    next_token: response
                        .next_sequence_token
                        .map(SequenceToken::new)
                        .or(token),
                }
            }
            Err(e) if e.is_invalid_sequence_token() => {
                let corrected = match &e {
                    LogStoreError::Service { message, .. } => expected_token(message),
                    _ => None,
                };
                DeliveryOutcome {
                    result: Err(DeliveryError::StaleToken(e)),
                    next_token: corrected.or(token),
                }
            }
            Err(e) => DeliveryOutcome {
                result: Err(DeliveryError::Put(e)),
                next_token: token,
            },
        }
    }

    fn warn_rejected(response: &PutLogEventsResponse) {
        if let Some(info) = &response.rejected_log_events_info {
            warn!(
                "Log store rejected part of the batch: too new from {:?}, too old up to {:?}, expired up to {:?}",
                info.too_new_log_event_start_index,
                info.too_old_log_event_end_index,
                info.expired_log_event_end_index,
            );
        }
    }
}
