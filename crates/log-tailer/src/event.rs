// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A single log event read from a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// When the store says the event happened.
    pub timestamp: SystemTime,
    /// Group the event was read from.
    pub group_name: String,
    pub message: String,
}

impl Event {
    /// Builds an event from a store timestamp in milliseconds since the Unix epoch.
    pub fn from_millis(timestamp_ms: i64, group_name: impl Into<String>, message: String) -> Self {
        Self {
            timestamp: system_time_from_millis(timestamp_ms),
            group_name: group_name.into(),
            message,
        }
    }
}

/// Converts milliseconds since the Unix epoch into a `SystemTime`. Negative values land
/// before the epoch.
pub fn system_time_from_millis(timestamp_ms: i64) -> SystemTime {
    let offset = Duration::from_millis(timestamp_ms.unsigned_abs());
    if timestamp_ms >= 0 {
        UNIX_EPOCH + offset
    } else {
        UNIX_EPOCH - offset
    }
}

/// Converts a `SystemTime` into milliseconds since the Unix epoch, saturating at the
/// bounds of `i64`.
pub fn millis_since_epoch(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_millis()).unwrap_or(i64::MAX),
        Err(before) => i64::try_from(before.duration().as_millis())
            .map(|ms| -ms)
            .unwrap_or(i64::MIN),
    }
}
