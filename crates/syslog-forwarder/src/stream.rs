// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One-time provisioning of the destination log stream.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::errors::StreamError;
use crate::log_store::LogStoreFactory;

/// Builds the stream name. A fresh id is always part of it so that restarts
/// with the same configured prefix never collide.
#[must_use]
pub fn stream_name(prefix: Option<&str>, id: Uuid) -> String {
    match prefix.map(str::trim).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{prefix}-{id}"),
        None => id.to_string(),
    }
}

pub struct StreamInitializer {
    factory: Arc<dyn LogStoreFactory>,
    log_group_name: String,
}

impl StreamInitializer {
    #[must_use]
    pub fn new(factory: Arc<dyn LogStoreFactory>, log_group_name: String) -> Self {
        StreamInitializer {
            factory,
            log_group_name,
        }
    }

    /// Creates a uniquely named stream in the log group and returns its name.
    pub async fn initialize(&self, prefix: Option<&str>) -> Result<String, StreamError> {
        let log_stream_name = stream_name(prefix, Uuid::new_v4());
        let create_error = |source| StreamError::Create {
            group: self.log_group_name.clone(),
            stream: log_stream_name.clone(),
            source,
        };

        let store = self.factory.create().map_err(create_error)?;
        store
            .create_log_stream(&self.log_group_name, &log_stream_name)
            .await
            .map_err(create_error)?;

        info!("Created log stream: {log_stream_name}");
        Ok(log_stream_name)
    }
}
