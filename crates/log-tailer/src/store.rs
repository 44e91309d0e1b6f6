// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The remote log store capability consumed by the tailer.

use async_trait::async_trait;

use crate::error::FetchError;

/// One page request against a single log group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub group_name: String,
    pub filter_pattern: String,
    /// Only entries at or after this instant, in milliseconds since the Unix epoch.
    pub start_time_ms: i64,
    /// Continuation token returned by the previous page of the same query window.
    pub next_token: Option<String>,
}

/// A raw entry as returned by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEvent {
    pub timestamp_ms: i64,
    pub message: String,
}

impl RawEvent {
    pub fn new(timestamp_ms: i64, message: impl Into<String>) -> Self {
        Self {
            timestamp_ms,
            message: message.into(),
        }
    }
}

/// A page of results. `next_token` is set when more results exist for the same window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub events: Vec<RawEvent>,
    pub next_token: Option<String>,
}

impl Page {
    pub fn new(events: Vec<RawEvent>, next_token: Option<String>) -> Self {
        Self { events, next_token }
    }

    /// The last page of a window.
    pub fn last(events: Vec<RawEvent>) -> Self {
        Self::new(events, None)
    }
}

/// Filtered, paginated access to log groups.
///
/// Implementations map their provider errors onto [`FetchError`]: a missing group must be
/// reported as [`FetchError::NotFound`] and rate limiting as [`FetchError::Throttled`], since
/// the tailer treats both specially.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Fetches the page of entries in `request.group_name` matching `request.filter_pattern`,
    /// starting at `request.start_time_ms`, continuing from `request.next_token` if present.
    async fn fetch_page(&self, request: &FetchRequest) -> Result<Page, FetchError>;
}
