// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory log store used by the unit tests.

#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::log_store::{
    LogStore, LogStoreError, LogStoreFactory, PutLogEventsRequest, PutLogEventsResponse,
};
use crate::record::Record;

#[derive(Default)]
struct State {
    puts: Vec<PutLogEventsRequest>,
    streams: Vec<(String, String)>,
    put_results: VecDeque<Result<PutLogEventsResponse, LogStoreError>>,
    create_error: Option<LogStoreError>,
    sessions: usize,
}

/// Records every call and answers with scripted results. Once the script
/// runs out, puts succeed with `token-<n>`.
#[derive(Clone, Default)]
pub(crate) struct FakeLogStore {
    state: Arc<Mutex<State>>,
}

impl FakeLogStore {
    pub(crate) fn push_put_result(&self, result: Result<PutLogEventsResponse, LogStoreError>) {
        self.state.lock().unwrap().put_results.push_back(result);
    }

    pub(crate) fn fail_create(&self, error: LogStoreError) {
        self.state.lock().unwrap().create_error = Some(error);
    }

    pub(crate) fn puts(&self) -> Vec<PutLogEventsRequest> {
        self.state.lock().unwrap().puts.clone()
    }

    pub(crate) fn streams(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().streams.clone()
    }

    pub(crate) fn sessions(&self) -> usize {
        self.state.lock().unwrap().sessions
    }
}

impl LogStoreFactory for FakeLogStore {
    fn create(&self) -> Result<Box<dyn LogStore>, LogStoreError> {
        self.state.lock().unwrap().sessions += 1;
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl LogStore for FakeLogStore {
    async fn create_log_stream(
        &self,
        log_group_name: &str,
        log_stream_name: &str,
    ) -> Result<(), LogStoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.create_error.take() {
            return Err(error);
        }
        state
            .streams
            .push((log_group_name.to_string(), log_stream_name.to_string()));
        Ok(())
    }

    async fn put_log_events(
        &self,
        request: PutLogEventsRequest,
    ) -> Result<PutLogEventsResponse, LogStoreError> {
        let mut state = self.state.lock().unwrap();
        state.puts.push(request);
        let n = state.puts.len();
        state.put_results.pop_front().unwrap_or_else(|| {
            Ok(PutLogEventsResponse {
                next_sequence_token: Some(format!("token-{n}")),
                ..Default::default()
            })
        })
    }
}

pub(crate) fn service_error(code: &str, message: &str) -> LogStoreError {
    LogStoreError::Service {
        code: code.to_string(),
        message: message.to_string(),
    }
}

/// A deliverable record at `millis` with `text` as its RFC5424 message.
pub(crate) fn record_at(millis: i64, text: &str) -> Record {
    let mut record = Record::new(Utc.timestamp_millis_opt(millis).unwrap());
    record.hostname = Some("host".to_string());
    record.app_name = Some("app".to_string());
    record.message = Some(text.to_string());
    record
}
