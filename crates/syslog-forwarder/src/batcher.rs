// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Time-windowed batching of ingested records.
//!
//! A single task owns the pending batch and the sequencing token. Each loop
//! iteration handles exactly one event: either a record arriving on the
//! ingestion queue (appended) or a timer tick (the pending batch, if any, is
//! handed to the [`Deliverer`]). The interval is the only flush trigger; there
//! is no size cap on a batch.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::deliverer::{Deliverer, SequenceToken};
use crate::record::Record;

/// Capacity of the ingestion queue. Producers wait when it is full.
pub const INGEST_QUEUE_CAPACITY: usize = 100;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(200);

/// Producer side of the ingestion queue, cheap to clone.
#[derive(Clone)]
pub struct IngestHandle {
    tx: mpsc::Sender<Record>,
}

/// Creates the bounded ingestion queue shared by the listeners. A capacity
/// of zero is raised to one.
#[must_use]
pub fn ingest_queue(capacity: usize) -> (IngestHandle, mpsc::Receiver<Record>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (IngestHandle { tx }, rx)
}

impl IngestHandle {
    /// Queues a record, waiting for room when the queue is full.
    pub async fn send(&self, record: Record) -> Result<(), mpsc::error::SendError<Record>> {
        self.tx.send(record).await
    }
}

pub struct Batcher {
    rx: mpsc::Receiver<Record>,
    deliverer: Deliverer,
    flush_interval: Duration,
    pending: Vec<Record>,
}

impl Batcher {
    #[must_use]
    pub fn new(deliverer: Deliverer, flush_interval: Duration) -> (Self, IngestHandle) {
        Self::with_capacity(deliverer, flush_interval, INGEST_QUEUE_CAPACITY)
    }

    /// A zero `flush_interval` falls back to [`DEFAULT_FLUSH_INTERVAL`] and a
    /// zero `capacity` is raised to one.
    #[must_use]
    pub fn with_capacity(
        deliverer: Deliverer,
        flush_interval: Duration,
        capacity: usize,
    ) -> (Self, IngestHandle) {
        let (handle, rx) = ingest_queue(capacity);
        let flush_interval = if flush_interval.is_zero() {
            DEFAULT_FLUSH_INTERVAL
        } else {
            flush_interval
        };
        let batcher = Batcher {
            rx,
            deliverer,
            flush_interval,
            pending: Vec::new(),
        };
        (batcher, handle)
    }

    /// Runs until every [`IngestHandle`] is dropped, then delivers what is
    /// still pending and returns.
    pub async fn run(mut self) {
        debug!("Batcher started, flushing every {:?}", self.flush_interval);

        let mut ticker = interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut token: Option<SequenceToken> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    token = self.flush(token).await;
                }
                record = self.rx.recv() => match record {
                    Some(record) => self.pending.push(record),
                    None => {
                        debug!("Ingestion queue closed, draining {} pending records", self.pending.len());
                        self.flush(token).await;
                        break;
                    }
                },
            }
        }

        debug!("Batcher stopped");
    }

    /// Hands the pending batch to the deliverer and returns the token for the
    /// next write. An empty batch makes no remote call.
    async fn flush(&mut self, token: Option<SequenceToken>) -> Option<SequenceToken> {
        if self.pending.is_empty() {
            return token;
        }
        let batch = std::mem::take(&mut self.pending);
        let size = batch.len();

        let outcome = self.deliverer.deliver(batch, token).await;
        match outcome.result {
            Ok(0) => debug!("Dropped {size} records without a message"),
            Ok(entries) => info!(
                "Pushed {entries} entries to log stream {}",
                self.deliverer.log_stream_name()
            ),
            Err(e) => error!("Dropped batch of {size} records: {e}"),
        }
        match &outcome.next_token {
            Some(next) => debug!("NextSequenceToken: {next}"),
            None => debug!("NextSequenceToken: none"),
        }
        outcome.next_token
    }
}
