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

use crate::errors::Tier;
use crate::errors::Unavailable;
use crate::WriteStrategy;

/// A write did not complete at every tier its strategy requires.
///
/// The caller is always told which tier failed. A failed write may have already
/// touched an earlier tier, e.g. a write-behind whose cache set succeeded but whose
/// append failed; retrying the same record is safe because every tier is
/// last-value-wins.
#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    #[error("{strategy} write of key={key} failed at cache: {source}")]
    Cache {
        strategy: WriteStrategy,
        key: String,
        source: Unavailable,
    },

    #[error("{strategy} write of key={key} failed at log: {source}")]
    Log {
        strategy: WriteStrategy,
        key: String,
        source: Unavailable,
    },

    #[error("{strategy} write of key={key} failed at store: {source}")]
    Store {
        strategy: WriteStrategy,
        key: String,
        source: Unavailable,
    },

    #[error("{strategy} write of key={key} could not be encoded: {source}")]
    Encode {
        strategy: WriteStrategy,
        key: String,
        source: serde_json::Error,
    },
}

impl WriteError {
    /// Build the variant matching the tier that reported `source`.
    pub fn unavailable(strategy: WriteStrategy, key: impl ToString, source: Unavailable) -> Self {
        let key = key.to_string();
        match source.tier() {
            Tier::Cache => Self::Cache {
                strategy,
                key,
                source,
            },
            Tier::Log => Self::Log {
                strategy,
                key,
                source,
            },
            Tier::Store => Self::Store {
                strategy,
                key,
                source,
            },
        }
    }

    /// The tier that failed, `None` for an encoding failure.
    pub fn tier(&self) -> Option<Tier> {
        match self {
            Self::Cache { .. } => Some(Tier::Cache),
            Self::Log { .. } => Some(Tier::Log),
            Self::Store { .. } => Some(Tier::Store),
            Self::Encode { .. } => None,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Cache { key, .. }
            | Self::Log { key, .. }
            | Self::Store { key, .. }
            | Self::Encode { key, .. } => key,
        }
    }

    pub fn strategy(&self) -> WriteStrategy {
        match self {
            Self::Cache { strategy, .. }
            | Self::Log { strategy, .. }
            | Self::Store { strategy, .. }
            | Self::Encode { strategy, .. } => *strategy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_follows_tier() {
        let err = WriteError::unavailable(
            WriteStrategy::WriteBehind,
            "k1",
            Unavailable::new_str(Tier::Log, "broker down"),
        );
        assert!(matches!(err, WriteError::Log { .. }));
        assert_eq!(err.tier(), Some(Tier::Log));
        assert_eq!(err.key(), "k1");
        assert_eq!(err.strategy(), WriteStrategy::WriteBehind);
        assert_eq!(
            err.to_string(),
            "write-behind write of key=k1 failed at log: log unavailable: broker down"
        );
    }

    #[test]
    fn test_encode_has_no_tier() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = WriteError::Encode {
            strategy: WriteStrategy::WriteThrough,
            key: "k".to_string(),
            source,
        };
        assert_eq!(err.tier(), None);
    }
}
