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
use std::time::SystemTime;

/// Where a message landed in the log: a partition and a per-partition offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub partition: u32,
    pub offset: u64,
}

impl Position {
    pub fn new(partition: u32, offset: u64) -> Self {
        Position { partition, offset }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "p{}@{}", self.partition, self.offset)
    }
}

/// An immutable entry of the durable log.
///
/// Offsets are strictly increasing within a partition and never reused.
#[derive(Debug, Clone, PartialEq)]
pub struct LogMessage {
    pub partition_key: String,
    pub position: Position,
    pub payload: Vec<u8>,
    pub produced_at: SystemTime,
}

impl LogMessage {
    pub fn new(partition_key: impl ToString, position: Position, payload: Vec<u8>) -> Self {
        LogMessage {
            partition_key: partition_key.to_string(),
            position,
            payload,
            produced_at: SystemTime::now(),
        }
    }
}
