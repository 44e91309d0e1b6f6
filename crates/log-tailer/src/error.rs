// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors a [`LogStore`](crate::store::LogStore) reports for a single page request.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The group does not exist (yet, or any more).
    #[error("log group not found")]
    NotFound,

    /// The provider's request rate limit was exceeded.
    #[error("request throttled")]
    Throttled,

    /// Any other transport or provider failure.
    #[error("{0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl FetchError {
    pub fn other(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Other(cause.into())
    }
}

/// Terminal error of a group tailer, and of the merged stream.
#[derive(Debug, thiserror::Error)]
pub enum TailError {
    #[error("log {group:?}: {source}")]
    Group {
        group: String,
        #[source]
        source: FetchError,
    },

    #[error("log {group:?}: still throttled after {attempts} retries")]
    RetryBudgetExhausted { group: String, attempts: u32 },

    #[error("tailing cancelled")]
    Cancelled,

    #[error("log {group:?}: tailer task failed: {reason}")]
    Task { group: String, reason: String },
}

impl TailError {
    /// Name of the group the error belongs to, if any.
    pub fn group(&self) -> Option<&str> {
        match self {
            Self::Group { group, .. }
            | Self::RetryBudgetExhausted { group, .. }
            | Self::Task { group, .. } => Some(group),
            Self::Cancelled => None,
        }
    }
}

/// Errors raised while building a [`Config`](crate::config::Config).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
