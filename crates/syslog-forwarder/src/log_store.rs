// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client for the remote log store.
//!
//! The store speaks the CloudWatch Logs JSON protocol: every call is a POST to
//! the service endpoint with the operation named in the `X-Amz-Target` header.
//! With a [`RequestSigner`] every request is signed (SigV4); without one the
//! requests go out unsigned, which only suits local emulators.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::signing::RequestSigner;

const TARGET_PREFIX: &str = "Logs_20140328";
const AMZ_JSON: &str = "application/x-amz-json-1.1";

pub const INVALID_SEQUENCE_TOKEN: &str = "InvalidSequenceTokenException";
pub const DATA_ALREADY_ACCEPTED: &str = "DataAlreadyAcceptedException";

#[derive(Debug, thiserror::Error)]
pub enum LogStoreError {
    /// The store answered with an error payload.
    #[error("{code}: {message}")]
    Service { code: String, message: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("failed to build client: {0}")]
    Client(String),
}

impl LogStoreError {
    /// Rejections caused by a stale sequencing token. Both carry the expected
    /// token in their message.
    #[must_use]
    pub fn is_invalid_sequence_token(&self) -> bool {
        matches!(self, LogStoreError::Service { code, .. }
            if code == INVALID_SEQUENCE_TOKEN || code == DATA_ALREADY_ACCEPTED)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputLogEvent {
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutLogEventsRequest {
    pub log_group_name: String,
    pub log_stream_name: String,
    pub log_events: Vec<InputLogEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutLogEventsResponse {
    #[serde(default)]
    pub next_sequence_token: Option<String>,
    #[serde(default)]
    pub rejected_log_events_info: Option<RejectedLogEventsInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedLogEventsInfo {
    pub too_new_log_event_start_index: Option<i64>,
    pub too_old_log_event_end_index: Option<i64>,
    pub expired_log_event_end_index: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLogStreamRequest<'a> {
    log_group_name: &'a str,
    log_stream_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(alias = "Message", default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct EmptyResponse {}

/// The two calls the forwarder makes against the store.
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn create_log_stream(
        &self,
        log_group_name: &str,
        log_stream_name: &str,
    ) -> Result<(), LogStoreError>;

    async fn put_log_events(
        &self,
        request: PutLogEventsRequest,
    ) -> Result<PutLogEventsResponse, LogStoreError>;
}

/// Hands out a fresh store session per call, so a long running process never
/// holds on to a session whose credentials went stale.
pub trait LogStoreFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn LogStore>, LogStoreError>;
}

#[derive(Debug, Clone)]
pub struct CloudWatchLogsFactory {
    endpoint: String,
    timeout: Duration,
    https_proxy: Option<String>,
    signer: Option<RequestSigner>,
}

impl CloudWatchLogsFactory {
    #[must_use]
    pub fn new(endpoint: String, timeout: Duration, https_proxy: Option<String>) -> Self {
        CloudWatchLogsFactory {
            endpoint,
            timeout,
            https_proxy,
            signer: None,
        }
    }

    /// Signs every request made by the clients this factory creates.
    #[must_use]
    pub fn with_signer(mut self, signer: RequestSigner) -> Self {
        self.signer = Some(signer);
        self
    }
}

impl LogStoreFactory for CloudWatchLogsFactory {
    fn create(&self) -> Result<Box<dyn LogStore>, LogStoreError> {
        let mut client = CloudWatchLogsClient::new(
            self.endpoint.clone(),
            self.timeout,
            self.https_proxy.as_deref(),
        )?;
        if let Some(signer) = &self.signer {
            client = client.with_signer(signer.clone());
        }
        Ok(Box::new(client))
    }
}

#[derive(Debug, Clone)]
pub struct CloudWatchLogsClient {
    client: reqwest::Client,
    endpoint: Url,
    signer: Option<RequestSigner>,
}

impl CloudWatchLogsClient {
    pub fn new(
        endpoint: String,
        timeout: Duration,
        https_proxy: Option<&str>,
    ) -> Result<Self, LogStoreError> {
        let mut builder = reqwest::Client::builder().use_rustls_tls().timeout(timeout);
        if let Some(proxy) = https_proxy {
            let proxy =
                reqwest::Proxy::https(proxy).map_err(|e| LogStoreError::Client(e.to_string()))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| LogStoreError::Client(e.to_string()))?;
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| LogStoreError::Client(format!("invalid endpoint {endpoint}: {e}")))?;
        Ok(CloudWatchLogsClient {
            client,
            endpoint,
            signer: None,
        })
    }

    #[must_use]
    pub fn with_signer(mut self, signer: RequestSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Host header value reqwest sends for the endpoint; the default port
    /// is left out.
    fn host(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    fn headers(&self, operation: &str, payload: &[u8]) -> Result<HeaderMap, LogStoreError> {
        let target = format!("{TARGET_PREFIX}.{operation}");
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(AMZ_JSON));
        headers.insert(
            "X-Amz-Target",
            HeaderValue::from_str(&target).map_err(|e| LogStoreError::Client(e.to_string()))?,
        );

        if let Some(signer) = &self.signer {
            let signed = signer.sign(
                &self.host(),
                self.endpoint.path(),
                &[("content-type", AMZ_JSON), ("x-amz-target", target.as_str())],
                payload,
                Utc::now(),
            )?;
            for (name, value) in signed {
                headers.insert(
                    HeaderName::from_static(name),
                    HeaderValue::from_str(&value)
                        .map_err(|e| LogStoreError::Client(e.to_string()))?,
                );
            }
        }
        Ok(headers)
    }

    async fn call<Req, Resp>(&self, operation: &str, body: &Req) -> Result<Resp, LogStoreError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let payload =
            serde_json::to_vec(body).map_err(|e| LogStoreError::Client(e.to_string()))?;
        let resp = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers(operation, &payload)?)
            .body(payload)
            .send()
            .await
            .map_err(|e| LogStoreError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| LogStoreError::Transport(e.to_string()))?;
        debug!("{operation} returned {status}");

        if !status.is_success() {
            return Err(service_error(status, &text));
        }

        let text: &str = if text.trim().is_empty() { "{}" } else { &text };
        serde_json::from_str(text).map_err(|e| LogStoreError::Decode(e.to_string()))
    }
}

/// Maps an error body such as
/// `{"__type":"com.amazonaws.logs#InvalidSequenceTokenException","message":"..."}`
/// to a [`LogStoreError::Service`].
fn service_error(status: reqwest::StatusCode, body: &str) -> LogStoreError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) if !err.kind.is_empty() => {
            let code = err
                .kind
                .rsplit_once('#')
                .map_or(err.kind.as_str(), |(_, code)| code);
            LogStoreError::Service {
                code: code.to_string(),
                message: err.message,
            }
        }
        _ => LogStoreError::Service {
            code: status.as_u16().to_string(),
            message: body.to_string(),
        },
    }
}

#[async_trait]
impl LogStore for CloudWatchLogsClient {
    async fn create_log_stream(
        &self,
        log_group_name: &str,
        log_stream_name: &str,
    ) -> Result<(), LogStoreError> {
        let request = CreateLogStreamRequest {
            log_group_name,
            log_stream_name,
        };
        let _: EmptyResponse = self.call("CreateLogStream", &request).await?;
        Ok(())
    }

    async fn put_log_events(
        &self,
        request: PutLogEventsRequest,
    ) -> Result<PutLogEventsResponse, LogStoreError> {
        self.call("PutLogEvents", &request).await
    }
}
