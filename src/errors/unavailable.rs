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

use std::fmt;
use std::io;

/// Identifies one of the three tiers the pipeline coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// The fast mutable cache.
    Cache,
    /// The durable append-only log.
    Log,
    /// The authoritative system-of-record store.
    Store,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Tier::Cache => write!(f, "cache"),
            Tier::Log => write!(f, "log"),
            Tier::Store => write!(f, "store"),
        }
    }
}

/// A tier could not be reached or failed to complete an operation.
///
/// This is always treated as transient: the immediate caller decides whether to
/// retry, and the worker pool relies on log redelivery rather than retrying in place.
///
/// The error includes:
/// - The tier that failed
/// - The underlying reason
/// - A chain of contexts naming the key, offset or operation involved
///
/// # Usage
///
/// ```rust
/// # use tiered_pipeline::errors::Tier;
/// # use tiered_pipeline::errors::Unavailable;
/// let err = Unavailable::new_str(Tier::Store, "connection reset")
///     .context("upsert key=k1")
///     .context("worker-0 apply");
/// assert_eq!(err.tier(), Tier::Store);
/// ```
#[derive(thiserror::Error, Debug)]
pub struct Unavailable {
    tier: Tier,

    #[source]
    reason: io::Error,

    /// Contexts appended by [`Unavailable::context`], innermost first.
    when: Vec<String>,
}

impl Unavailable {
    pub fn new(tier: Tier, reason: impl Into<io::Error>) -> Self {
        Unavailable {
            tier,
            reason: reason.into(),
            when: vec![],
        }
    }

    /// Create an error from a plain description of what went wrong.
    pub fn new_str(tier: Tier, reason: impl ToString) -> Self {
        Self::new(tier, io::Error::other(reason.to_string()))
    }

    /// Append a context describing when the error occurred.
    pub fn context(mut self, context: impl ToString) -> Self {
        self.when.push(context.to_string());
        self
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn reason(&self) -> &io::Error {
        &self.reason
    }
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} unavailable: {}", self.tier, self.reason)?;

        if self.when.is_empty() {
            return Ok(());
        }

        write!(f, "; when: (")?;

        for (i, when) in self.when.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", when)?;
        }

        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn test_string_reason() {
        let err = Unavailable::new_str(Tier::Cache, "connection refused");
        assert_eq!(err.to_string(), "cache unavailable: connection refused");
        assert_eq!(err.tier(), Tier::Cache);
    }

    #[test]
    fn test_io_reason() {
        let io_err = io::Error::new(io::ErrorKind::TimedOut, "operation timed out");
        let err = Unavailable::new(Tier::Log, io_err);
        assert_eq!(err.to_string(), "log unavailable: operation timed out");
        assert_eq!(err.reason().kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_context_chain() {
        let err = Unavailable::new_str(Tier::Store, "disk full")
            .context("upsert key=k1")
            .context("apply p0@3");
        assert_eq!(
            err.to_string(),
            "store unavailable: disk full; when: (upsert key=k1; apply p0@3)"
        );
    }

    #[test]
    fn test_source_is_reason() {
        use std::error::Error;

        let err = Unavailable::new_str(Tier::Store, "gone");
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("gone"));
    }
}
