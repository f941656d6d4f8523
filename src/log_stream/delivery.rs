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

use crate::log_stream::LogMessage;
use crate::log_stream::Position;

/// Identifies a delivered message to [`DurableLog::ack`](crate::DurableLog::ack).
///
/// `token` is opaque to the pipeline; a log implementation uses it to tell apart
/// deliveries of the same offset, e.g. a subscription or lease id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckHandle {
    group: String,
    position: Position,
    token: u64,
}

impl AckHandle {
    pub fn new(group: impl ToString, position: Position, token: u64) -> Self {
        AckHandle {
            group: group.to_string(),
            position,
            token,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn token(&self) -> u64 {
        self.token
    }
}

impl fmt::Display for AckHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}#{}", self.group, self.position, self.token)
    }
}

/// A message handed to one consumer of a group, together with the handle to ack it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: LogMessage,
    pub ack: AckHandle,
}

impl Delivery {
    pub fn unpack(self) -> (LogMessage, AckHandle) {
        (self.message, self.ack)
    }
}
