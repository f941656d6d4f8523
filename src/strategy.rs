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
use std::str::FromStr;

/// How a write is propagated across the cache, the log and the store.
///
/// The string form is what an inbound request framework passes as the
/// strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteStrategy {
    /// Set the cache, then upsert the store, both before returning.
    WriteThrough,

    /// Set the cache, then hand the store upsert to a supervised background task.
    WriteThroughDeferred,

    /// Set the cache, then append to the durable log; the worker pool persists it later.
    WriteBehind,

    /// Upsert the store only. The cache is left untouched.
    WriteAround,

    /// Upsert the store, then delete the cache entry.
    Invalidate,
}

impl WriteStrategy {
    pub const ALL: [WriteStrategy; 5] = [
        WriteStrategy::WriteThrough,
        WriteStrategy::WriteThroughDeferred,
        WriteStrategy::WriteBehind,
        WriteStrategy::WriteAround,
        WriteStrategy::Invalidate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WriteStrategy::WriteThrough => "write-through",
            WriteStrategy::WriteThroughDeferred => "write-through-deferred",
            WriteStrategy::WriteBehind => "write-behind",
            WriteStrategy::WriteAround => "write-around",
            WriteStrategy::Invalidate => "invalidate",
        }
    }
}

impl fmt::Display for WriteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The strategy selector did not name a known strategy.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown write strategy: {0:?}")]
pub struct UnknownStrategy(pub String);

impl FromStr for WriteStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");

        let strategy = match normalized.as_str() {
            "write-through" => WriteStrategy::WriteThrough,
            "write-through-deferred" => WriteStrategy::WriteThroughDeferred,
            "write-behind" | "write-back" => WriteStrategy::WriteBehind,
            "write-around" => WriteStrategy::WriteAround,
            "invalidate" | "cache-aside" => WriteStrategy::Invalidate,
            _ => return Err(UnknownStrategy(s.to_string())),
        };

        Ok(strategy)
    }
}
