// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Multi-group log tailer.
//!
//! Given a set of log group names in a remote log store, the tailer pages through every
//! group concurrently, optionally keeps polling for new entries (follow mode), and merges
//! everything into a single bounded event stream.
//!
//! ```text
//!   group "a" ──> GroupTailer ──┐
//!   group "b" ──> GroupTailer ──┼──> mpsc (bounded) ──> LogStream::recv()
//!   group "c" ──> GroupTailer ──┘
//!                      │
//!                      └── completion ──> supervisor ──> LogStream::err()
//! ```
//!
//! Entries keep the store's order within a group; no ordering holds across groups.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod backoff;
pub mod config;
pub mod error;
pub mod event;
mod group;
pub mod logs;
pub mod memory;
pub mod store;

pub use backoff::{BackoffConfig, BackoffState};
pub use config::Config;
pub use error::{ConfigError, FetchError, TailError};
pub use event::Event;
pub use logs::{LogStream, Logs};
pub use memory::MemoryLogStore;
pub use store::{FetchRequest, LogStore, Page, RawEvent};
