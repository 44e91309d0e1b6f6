// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tails every configured group concurrently into one merged stream.
//!
//! Each group runs in its own task with its own cursor. A supervisor task joins the group tasks
//! in launch order, keeps the first group failure it sees and closes the stream once every group
//! is done. Cancellation is only reported when no group failed. A failing group never stops its
//! siblings; entries already delivered are never taken back.

use std::sync::{Arc, OnceLock};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{ConfigError, TailError};
use crate::event::Event;
use crate::group::GroupTailer;

/// Log tailer over all configured groups.
#[derive(Debug)]
pub struct Logs {
    config: Arc<Config>,
    cancel_token: CancellationToken,
}

impl Logs {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        Self::with_cancel_token(config, CancellationToken::new())
    }

    /// Creates a tailer that stops as soon as `cancel_token` is cancelled.
    pub fn with_cancel_token(
        config: Config,
        cancel_token: CancellationToken,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            cancel_token,
        })
    }

    /// Starts one tailer per group and returns the merged stream.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self) -> LogStream {
        let Logs {
            config,
            cancel_token,
        } = self;
        // Dropping the stream must not cancel a token the caller shares with other work.
        let cancel_token = cancel_token.child_token();
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let error = Arc::new(OnceLock::new());

        info!(
            groups = config.group_names.len(),
            follow = config.follow,
            "starting log tailer"
        );

        let groups: Vec<(String, JoinHandle<Result<(), TailError>>)> = config
            .group_names
            .iter()
            .map(|name| {
                let tailer =
                    GroupTailer::new(Arc::clone(&config), name.clone(), cancel_token.clone());
                (name.clone(), tokio::spawn(tailer.run(tx.clone())))
            })
            .collect();

        tokio::spawn(wait(groups, tx, Arc::clone(&error)));

        LogStream {
            rx,
            error,
            cancel_token,
        }
    }
}

/// Waits for each group to complete, recording the first group failure, or `Cancelled` when
/// groups were cancelled and none failed. The stream closes when `tx`, the last sender once
/// every group is done, is dropped on return.
async fn wait(
    groups: Vec<(String, JoinHandle<Result<(), TailError>>)>,
    tx: mpsc::Sender<Event>,
    error: Arc<OnceLock<TailError>>,
) {
    let mut cancelled = false;
    for (group, handle) in groups {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(TailError::Task {
                group: group.clone(),
                reason: e.to_string(),
            }),
        };

        match result {
            Ok(()) => {}
            Err(TailError::Cancelled) => cancelled = true,
            Err(e) => {
                if let Err(discarded) = error.set(e) {
                    debug!(%group, "discarding subsequent error: {discarded}");
                }
            }
        }
    }

    if cancelled && error.get().is_none() {
        let _ = error.set(TailError::Cancelled);
    }

    info!("all log groups drained");
    drop(tx);
}

/// Merged event stream of every group.
///
/// Dropping the stream cancels every group still running.
#[derive(Debug)]
pub struct LogStream {
    rx: mpsc::Receiver<Event>,
    error: Arc<OnceLock<TailError>>,
    cancel_token: CancellationToken,
}

impl LogStream {
    /// Receives the next event, or `None` once every group is done.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// The first failure raised by any group, in launch order, or [`TailError::Cancelled`] if
    /// the groups were cancelled without any of them failing.
    ///
    /// Only final once [`recv`](Self::recv) has returned `None`.
    pub fn err(&self) -> Option<&TailError> {
        self.error.get()
    }

    /// Stops every group. The stream ends once the groups have unwound and `err` then reports
    /// [`TailError::Cancelled`] unless a group failed.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Token cancelled by [`cancel`](Self::cancel) or when the stream is dropped.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
