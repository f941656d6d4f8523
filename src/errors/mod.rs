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

//! Errors reported by the pipeline, each naming the tier and key involved.

mod config_error;
mod read_error;
mod startup_error;
mod unavailable;
mod write_error;

pub use config_error::ConfigError;
pub use read_error::ReadError;
pub use startup_error::StartupError;
pub use unavailable::Tier;
pub use unavailable::Unavailable;
pub use write_error::WriteError;
