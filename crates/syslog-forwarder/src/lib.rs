// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Syslog forwarding to a sequenced remote log stream.
//!
//! ```text
//!   UDP / TCP ──> Listener ──> ingestion queue ──> Batcher ──> Deliverer ──> log stream
//!                  (decode)       (bounded)       (interval)   (sort, render,
//!                                                              sequence token)
//! ```
//!
//! - [`stream`]: provisions the uniquely named destination stream at startup
//! - [`listener`]: UDP and TCP syslog server producing [`record::Record`]s
//! - [`batcher`]: single loop accumulating records and flushing on a timer
//! - [`deliverer`]: renders batches and manages the sequencing token
//! - [`log_store`]: the remote store's `PutLogEvents` / `CreateLogStream` calls,
//!   signed by [`signing`]

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod batcher;
pub mod config;
pub mod decoder;
pub mod deliverer;
pub mod errors;
pub mod framing;
pub mod listener;
pub mod log_store;
pub mod record;
pub mod signing;
pub mod stream;

#[cfg(test)]
mod test_support;
