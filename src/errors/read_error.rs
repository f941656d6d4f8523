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

use crate::errors::Unavailable;

/// A read could not produce a record.
#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    /// Neither the cache nor the store holds the key. Not cached.
    #[error("key={key} not found")]
    NotFound { key: String },

    #[error("read of key={key} failed at cache: {source}")]
    Cache { key: String, source: Unavailable },

    #[error("read of key={key} failed at store: {source}")]
    Store { key: String, source: Unavailable },

    /// The record read from the store could not be serialized for the cache.
    #[error("read of key={key} could not be encoded for the cache: {source}")]
    Encode {
        key: String,
        source: serde_json::Error,
    },
}

impl ReadError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn key(&self) -> &str {
        match self {
            Self::NotFound { key }
            | Self::Cache { key, .. }
            | Self::Store { key, .. }
            | Self::Encode { key, .. } => key,
        }
    }
}
