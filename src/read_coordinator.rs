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
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use log::warn;

use crate::errors::ReadError;
use crate::Cache;
use crate::PipelineConfig;
use crate::Record;
use crate::Store;
use crate::TypeConfig;

/// Which tier served a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    Cache,
    Store,
}

/// The result of a successful read.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub record: Record,
    pub source: ReadSource,
}

impl Lookup {
    pub fn into_record(self) -> Record {
        self.record
    }
}

/// Cache-aside reads with lazy population.
///
/// A miss reads the store and populates the cache with a bounded TTL. A key absent
/// from the store is not cached, so repeated misses query the store again.
///
/// Concurrent misses of the same key may each read the store and each populate the
/// cache. There is no per-key single-flight: both reads return the same record and
/// the duplicate work is bounded.
pub struct ReadCoordinator<C: TypeConfig> {
    name: String,

    cache: Arc<C::Cache>,
    store: Arc<C::Store>,

    read_ttl: Duration,
}

impl<C> Clone for ReadCoordinator<C>
where
    C: TypeConfig,
{
    fn clone(&self) -> Self {
        ReadCoordinator {
            name: self.name.clone(),
            cache: self.cache.clone(),
            store: self.store.clone(),
            read_ttl: self.read_ttl,
        }
    }
}

impl<C> fmt::Display for ReadCoordinator<C>
where
    C: TypeConfig,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ReadCoordinator({})", self.name)
    }
}

impl<C> ReadCoordinator<C>
where
    C: TypeConfig,
{
    /// `config.read_ttl` is expected to be validated non-zero; a zero TTL falls back to
    /// [`DEFAULT_READ_TTL`](crate::DEFAULT_READ_TTL).
    pub fn new(config: &PipelineConfig, cache: Arc<C::Cache>, store: Arc<C::Store>) -> Self {
        let read_ttl = if config.read_ttl.is_zero() {
            crate::config::DEFAULT_READ_TTL
        } else {
            config.read_ttl
        };

        ReadCoordinator {
            name: config.name.clone(),
            cache,
            store,
            read_ttl,
        }
    }

    /// Read `key` from the cache, falling back to the store on a miss.
    pub async fn get(&self, key: &str) -> Result<Lookup, ReadError> {
        let cached = self.cache.get(key).await.map_err(|e| ReadError::Cache {
            key: key.to_string(),
            source: e.context("get"),
        })?;

        if let Some(value) = cached {
            match Record::from_cache_value(&value) {
                Ok(record) => {
                    debug!("{}: key={} served from cache", self, key);
                    return Ok(Lookup {
                        record,
                        source: ReadSource::Cache,
                    });
                }
                Err(e) => {
                    // Not written by this pipeline's codec; the store is authoritative.
                    warn!(
                        "{}: key={} cached value is undecodable, reading store: {}",
                        self, key, e
                    );
                }
            }
        }

        let stored = self
            .store
            .read_by_key(key)
            .await
            .map_err(|e| ReadError::Store {
                key: key.to_string(),
                source: e.context("read_by_key"),
            })?;

        let Some(record) = stored else {
            debug!("{}: key={} not found in store", self, key);
            return Err(ReadError::NotFound {
                key: key.to_string(),
            });
        };

        let value = record.to_cache_value().map_err(|source| ReadError::Encode {
            key: key.to_string(),
            source,
        })?;

        self.cache
            .set(key, value, self.read_ttl)
            .await
            .map_err(|e| ReadError::Cache {
                key: key.to_string(),
                source: e.context("populate"),
            })?;

        debug!(
            "{}: key={} served from store, cached for {:?}",
            self, key, self.read_ttl
        );

        Ok(Lookup {
            record,
            source: ReadSource::Store,
        })
    }
}
