//! Shared infrastructure: identifiers, errors, configuration, logging, the
//! event broker and the run manager.

/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

pub use broker::EventBroker;
pub use change::ChangeRequest;
pub use config::{
    KernelConfig, PathsConfig, ProcessConfig, ReceiverConfig, SequentialConfig, TracingConfig, CONFIG,
};
pub use declared_types::{DeclaredTypeResolver, GENERAL_TYPE};
pub use error::KernelError;
pub use listeners::{ChannelListener, RecordingListener, TracingListener};
pub use logging::init_tracing;
pub use manager::{Manager, ManagerState};
pub use types::*;

mod broker;
mod change;
mod config;
mod declared_types;
mod error;
mod listeners;
mod logging;
mod manager;
mod types;
