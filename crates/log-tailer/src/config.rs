// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::backoff::{BackoffConfig, DEFAULT_THROTTLE_BACKOFF};
use crate::error::ConfigError;
use crate::event::system_time_from_millis;
use crate::store::LogStore;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1;

/// Configuration shared read-only by the coordinator and every group tailer.
#[derive(Clone)]
pub struct Config {
    /// Store the groups are read from
    pub store: Arc<dyn LogStore>,
    /// Provider filter pattern; empty matches everything
    pub filter_pattern: String,
    /// Delay between polls once a group is exhausted in follow mode
    pub poll_interval: Duration,
    /// Only entries at or after this instant are read
    pub start_time: SystemTime,
    /// Keep polling for new entries instead of stopping at the end of each group
    pub follow: bool,
    /// Groups to tail, launched in this order
    pub group_names: Vec<String>,
    /// Retry policy for throttled requests
    pub backoff: BackoffConfig,
    /// Capacity of the merged output channel
    pub channel_capacity: usize,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("filter_pattern", &self.filter_pattern)
            .field("poll_interval", &self.poll_interval)
            .field("start_time", &self.start_time)
            .field("follow", &self.follow)
            .field("group_names", &self.group_names)
            .field("backoff", &self.backoff)
            .field("channel_capacity", &self.channel_capacity)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// A configuration reading `group_names` from `store` from `start_time` onwards, without
    /// following.
    pub fn new(
        store: Arc<dyn LogStore>,
        group_names: impl IntoIterator<Item = impl Into<String>>,
        start_time: SystemTime,
    ) -> Self {
        Self {
            store,
            filter_pattern: String::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            start_time,
            follow: false,
            group_names: group_names.into_iter().map(Into::into).collect(),
            backoff: BackoffConfig::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Create configuration from environment variables
    pub fn from_env(store: Arc<dyn LogStore>) -> Result<Self, ConfigError> {
        let filter_pattern = env::var("LOGTAIL_FILTER_PATTERN").unwrap_or_default();
        let poll_interval = env_parse::<u64>("LOGTAIL_POLL_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        let start_time = env_parse::<i64>("LOGTAIL_START_TIME_MS")
            .map(system_time_from_millis)
            .unwrap_or_else(SystemTime::now);
        let follow = env::var("LOGTAIL_FOLLOW")
            .map(|val| matches!(val.trim().to_lowercase().as_str(), "true" | "1"))
            .unwrap_or(false);
        let group_names = env::var("LOGTAIL_GROUP_NAMES")
            .map(|val| parse_group_names(&val))
            .unwrap_or_default();
        let channel_capacity =
            env_parse::<usize>("LOGTAIL_CHANNEL_CAPACITY").unwrap_or(DEFAULT_CHANNEL_CAPACITY);

        let mut backoff = BackoffConfig::fixed(
            env_parse::<u64>("LOGTAIL_THROTTLE_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_THROTTLE_BACKOFF),
        );
        backoff.max_retries = env_parse::<u32>("LOGTAIL_THROTTLE_MAX_RETRIES");

        let config = Self {
            store,
            filter_pattern,
            poll_interval,
            start_time,
            follow,
            group_names,
            backoff,
            channel_capacity,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "channel capacity must be greater than 0".to_string(),
            ));
        }

        if self.follow && self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "poll interval must be greater than 0 in follow mode".to_string(),
            ));
        }

        if let Some(index) = self.group_names.iter().position(|n| n.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "group name at position {index} is empty"
            )));
        }

        if !(0.0..=1.0).contains(&self.backoff.jitter) {
            return Err(ConfigError::Invalid(format!(
                "backoff jitter must be within [0, 1], got {}",
                self.backoff.jitter
            )));
        }

        if self.backoff.factor.is_nan() || self.backoff.factor < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "backoff factor must be at least 1, got {}",
                self.backoff.factor
            )));
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|val| val.trim().parse::<T>().ok())
}

/// Splits a comma separated list of group names, dropping blanks.
pub fn parse_group_names(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
