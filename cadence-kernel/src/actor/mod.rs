//! Actor cells, their ports and the context handed to user actors.

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

pub use actor_cell::{ActorBuilder, ActorCell};
pub use composite::Connection;
pub use context::FiringContext;
pub use lifecycle::{ExecutionFlags, LifecycleState};
pub use port::{Port, PortDirection, PortRef, PortSpec};

mod actor_cell;
mod composite;
mod context;
mod lifecycle;
mod port;
