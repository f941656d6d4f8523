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

//! Types exchanged with a [`DurableLog`](crate::DurableLog).

mod delivery;
mod message;

use futures::stream::BoxStream;

pub use delivery::AckHandle;
pub use delivery::Delivery;
pub use message::LogMessage;
pub use message::Position;

use crate::errors::Unavailable;

/// The stream a consumer-group subscription yields.
///
/// Polling it waits until a message is available. Dropping it cancels the
/// subscription; messages delivered but not acked are redelivered later.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, Unavailable>>;
