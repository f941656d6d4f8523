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

use crate::errors::ConfigError;
use crate::errors::Unavailable;

/// The pipeline refused to start serving.
#[derive(thiserror::Error, Debug)]
pub enum StartupError {
    #[error("pipeline start failed: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("pipeline start failed, tier unreachable: {0}")]
    Unreachable(#[from] Unavailable),
}
