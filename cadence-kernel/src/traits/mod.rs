//! Capability traits implemented by actors, directors, receivers and their collaborators.

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

pub use actor::Actor;
pub use director::Director;
pub use executable::{Executable, Initializable, IterationOutcome};
pub use listener::EventListener;
pub use receiver::Receiver;
pub use resource_scheduler::{ResourceScheduler, SharedScheduler};
pub use type_resolver::TypeResolver;

mod actor;
mod director;
mod executable;
mod listener;
mod receiver;
mod resource_scheduler;
mod type_resolver;
