// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory log store replaying scripted responses.
//!
//! Every registered group owns a queue of responses (pages or errors) that are handed out one
//! per request, in order. Once a group's queue is empty it answers an empty last page, which is
//! what a real store returns for a group with nothing new. Groups that were never registered
//! answer [`FetchError::NotFound`]. Every request is recorded so callers can inspect how the
//! tailer walked through the store.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::FetchError;
use crate::store::{FetchRequest, LogStore, Page, RawEvent};

#[derive(Debug, Default)]
pub struct MemoryLogStore {
    scripts: Mutex<HashMap<String, VecDeque<Result<Page, FetchError>>>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `group` with an empty script, so it exists but holds no entries.
    #[must_use]
    pub fn with_group(self, group: &str) -> Self {
        lock(&self.scripts).entry(group.to_string()).or_default();
        self
    }

    /// Queues a page for `group`, registering the group if needed.
    #[must_use]
    pub fn with_page(self, group: &str, events: Vec<RawEvent>, next_token: Option<&str>) -> Self {
        self.push(
            group,
            Ok(Page::new(events, next_token.map(str::to_string))),
        );
        self
    }

    /// Queues an error for `group`, registering the group if needed.
    #[must_use]
    pub fn with_error(self, group: &str, error: FetchError) -> Self {
        self.push(group, Err(error));
        self
    }

    /// Queues a response for `group` on a store that may already be shared.
    pub fn push(&self, group: &str, response: Result<Page, FetchError>) {
        lock(&self.scripts)
            .entry(group.to_string())
            .or_default()
            .push_back(response);
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<FetchRequest> {
        lock(&self.requests).clone()
    }

    /// Requests received so far for `group`, in arrival order.
    pub fn requests_for(&self, group: &str) -> Vec<FetchRequest> {
        lock(&self.requests)
            .iter()
            .filter(|request| request.group_name == group)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn fetch_page(&self, request: &FetchRequest) -> Result<Page, FetchError> {
        lock(&self.requests).push(request.clone());

        let mut scripts = lock(&self.scripts);
        let Some(script) = scripts.get_mut(&request.group_name) else {
            return Err(FetchError::NotFound);
        };
        script.pop_front().unwrap_or_else(|| Ok(Page::default()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
