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

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::Deserialize;
use serde::Serialize;

/// The unit written through the pipeline, identified by `key`.
///
/// A record is only ever replaced as a whole; there are no partial field updates.
/// The same JSON form is used for the cache value and for the log payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,

    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,

    /// Opaque to the pipeline; carried through every tier unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Record {
    pub fn new(key: impl ToString) -> Self {
        Record {
            key: key.to_string(),
            fields: BTreeMap::new(),
            version: None,
        }
    }

    pub fn with_field(mut self, name: impl ToString, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn with_version(mut self, version: impl ToString) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    /// Serialize into a log payload.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize a log payload.
    ///
    /// A payload that is not a record, or a record with an empty key, is rejected.
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        let record: Record = serde_json::from_slice(payload)?;
        record.validated()
    }

    /// Serialize into the value stored in the cache.
    pub fn to_cache_value(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_cache_value(value: &str) -> Result<Self, serde_json::Error> {
        let record: Record = serde_json::from_str(value)?;
        record.validated()
    }

    fn validated(self) -> Result<Self, serde_json::Error> {
        if self.key.is_empty() {
            return Err(serde_json::Error::custom("record key is empty"));
        }
        Ok(self)
    }
}
