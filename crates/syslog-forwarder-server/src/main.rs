// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, process, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use syslog_forwarder::{
    batcher::Batcher,
    config::Config,
    deliverer::Deliverer,
    errors::{ConfigError, ListenerError, StreamError},
    listener::Listener,
    log_store::{CloudWatchLogsFactory, LogStoreFactory},
    signing::RequestSigner,
    stream::StreamInitializer,
};

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Stream(#[from] StreamError),
    #[error("{0}")]
    Listener(#[from] ListenerError),
}

#[tokio::main]
pub async fn main() {
    let log_level = env::var("LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    if let Err(e) = run().await {
        error!("Shutting down syslog forwarder: {e}");
        process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let config = Config::from_env()?;
    let listener_config = config.listener_config();

    info!("Syslog server address: {}", listener_config.address());
    info!("Log group: {}", config.log_group_name);
    info!(
        "Stream name prefix: {}",
        config.stream_name_prefix.as_deref().unwrap_or("<none>")
    );
    info!("Ticker time: {} ms", config.flush_interval.as_millis());

    let mut factory = CloudWatchLogsFactory::new(
        config.log_store_endpoint.clone(),
        config.log_store_timeout,
        config.https_proxy.clone(),
    );
    match &config.credentials {
        Some(credentials) => {
            factory = factory.with_signer(RequestSigner::new(
                credentials.clone(),
                config.region.clone(),
            ));
        }
        None => warn!(
            "No AWS credentials in the environment, sending unsigned requests to {}",
            config.log_store_endpoint
        ),
    }
    let factory: Arc<dyn LogStoreFactory> = Arc::new(factory);

    let log_stream_name = StreamInitializer::new(factory.clone(), config.log_group_name.clone())
        .initialize(config.stream_name_prefix.as_deref())
        .await?;

    let deliverer = Deliverer::new(factory, config.log_group_name.clone(), log_stream_name);
    let (batcher, ingest) = Batcher::new(deliverer, config.flush_interval);

    let cancel_token = CancellationToken::new();
    let listener = Listener::bind(&listener_config, ingest, cancel_token.clone()).await?;

    let batcher_task = tokio::spawn(batcher.run());
    let listener_task = tokio::spawn(listener.spin());
    info!("Syslog forwarder started");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }
    info!("Shutting down, delivering pending records");

    // The listener owns the last ingest handle; once it stops the batcher
    // sees a closed queue and drains.
    cancel_token.cancel();
    if let Err(e) = listener_task.await {
        error!("Listener task failed: {e}");
    }
    if let Err(e) = batcher_task.await {
        error!("Batcher task failed: {e}");
    }
    Ok(())
}
