// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Duration;

use crate::errors::ConfigError;

/// Default TTL for entries populated by the read path.
pub const DEFAULT_READ_TTL: Duration = Duration::from_secs(5 * 60);

/// Default number of log consumers.
pub const DEFAULT_WORKERS: usize = 6;

/// Default bound on how long shutdown waits for workers to finish.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Growth of the delay between re-subscribe attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub min: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff {
            min: Duration::from_millis(50),
            max: Duration::from_secs(5),
        }
    }
}

impl Backoff {
    /// The delay following `current`: grows by half, capped at `max`.
    pub fn next(&self, current: Option<Duration>) -> Duration {
        match current {
            None => self.min,
            Some(d) => std::cmp::min(d * 3 / 2, self.max),
        }
    }
}

/// Settings of a [`Pipeline`](crate::Pipeline).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Identifies this pipeline in logs.
    pub name: String,

    /// The log consumer group the worker pool joins.
    pub consumer_group: String,

    /// Number of concurrent log consumers.
    pub workers: usize,

    /// TTL of entries populated on a read miss. Must not be zero.
    pub read_ttl: Duration,

    /// TTL of entries set by write-through. Zero means no expiry.
    pub write_through_ttl: Duration,

    /// TTL of entries staged by write-behind. Zero means no expiry.
    pub write_behind_ttl: Duration,

    /// How long shutdown waits for workers before aborting them. `None` waits forever.
    pub drain_timeout: Option<Duration>,

    pub retry_backoff: Backoff,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            name: "pipeline".to_string(),
            consumer_group: "pipeline-writers".to_string(),
            workers: DEFAULT_WORKERS,
            read_ttl: DEFAULT_READ_TTL,
            write_through_ttl: Duration::ZERO,
            write_behind_ttl: Duration::ZERO,
            drain_timeout: Some(DEFAULT_DRAIN_TIMEOUT),
            retry_backoff: Backoff::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new(name: impl ToString) -> Self {
        PipelineConfig {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_consumer_group(mut self, group: impl ToString) -> Self {
        self.consumer_group = group.to_string();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_read_ttl(mut self, ttl: Duration) -> Self {
        self.read_ttl = ttl;
        self
    }

    pub fn with_write_through_ttl(mut self, ttl: Duration) -> Self {
        self.write_through_ttl = ttl;
        self
    }

    pub fn with_write_behind_ttl(mut self, ttl: Duration) -> Self {
        self.write_behind_ttl = ttl;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_retry_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.retry_backoff = Backoff { min, max };
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.consumer_group.is_empty() {
            return Err(ConfigError::new("consumer_group", "must not be empty"));
        }

        if self.workers == 0 {
            return Err(ConfigError::new("workers", "must be at least 1"));
        }

        // A read-populated entry without expiry would let read traffic grow the cache unbounded.
        if self.read_ttl.is_zero() {
            return Err(ConfigError::new("read_ttl", "must not be zero"));
        }

        if self.retry_backoff.min.is_zero() || self.retry_backoff.min > self.retry_backoff.max {
            return Err(ConfigError::new(
                "retry_backoff",
                format!(
                    "expect 0 < min <= max, got min={:?} max={:?}",
                    self.retry_backoff.min, self.retry_backoff.max
                ),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let c = PipelineConfig::default();
        assert_eq!(c.validate(), Ok(()));
        assert_eq!(c.workers, 6);
        assert_eq!(c.read_ttl, Duration::from_secs(300));
        assert!(c.write_behind_ttl.is_zero());
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = PipelineConfig::new("p").with_workers(0).validate().unwrap_err();
        assert_eq!(err.field(), "workers");

        let err = PipelineConfig::new("p")
            .with_read_ttl(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert_eq!(err.field(), "read_ttl");

        let err = PipelineConfig::new("p")
            .with_consumer_group("")
            .validate()
            .unwrap_err();
        assert_eq!(err.field(), "consumer_group");

        let err = PipelineConfig::new("p")
            .with_retry_backoff(Duration::from_secs(2), Duration::from_secs(1))
            .validate()
            .unwrap_err();
        assert_eq!(err.field(), "retry_backoff");
    }

    #[test]
    fn test_backoff_growth() {
        let b = Backoff {
            min: Duration::from_millis(100),
            max: Duration::from_millis(200),
        };

        let d1 = b.next(None);
        let d2 = b.next(Some(d1));
        let d3 = b.next(Some(d2));

        assert_eq!(d1, Duration::from_millis(100));
        assert_eq!(d2, Duration::from_millis(150));
        assert_eq!(d3, Duration::from_millis(200));
    }
}
