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

use std::fmt::Debug;
use std::sync::Arc;

use crate::actor::ActorCell;
use crate::common::{ActorId, KernelError, ListenerId, Time};
use crate::traits::EventListener;

/// A shared resource that decorated actors must acquire before firing.
///
/// Directors call [`schedule`](Self::schedule) instead of firing a decorated
/// actor. The scheduler records the request and either lets the actor fire now
/// (it is no longer [waiting](Self::is_waiting_for_resource)) or returns the
/// relative time after which the director must call again. A request is never
/// dropped: a scheduler that cannot make progress returns an
/// [`Unschedulable`](KernelError::Unschedulable) error.
pub trait ResourceScheduler: Send + Sync + Debug {
    /// Name used in events.
    fn name(&self) -> &str;

    /// The decoration axis this scheduler serves, e.g. `"cpu"`.
    fn axis(&self) -> &str;

    /// Called once per run with every actor decorated on this axis.
    fn initialize_decorated_actors(&mut self, actors: &[Arc<ActorCell>]) -> Result<(), KernelError>;

    /// Called when actors decorated on this axis join a running model.
    /// Outstanding requests and numbering of earlier actors are kept.
    fn admit_decorated_actors(&mut self, actors: &[Arc<ActorCell>]) -> Result<(), KernelError>;

    /// Advances the resource to `environment_time` and submits or completes
    /// the request of `actor`.
    ///
    /// Returns the delay until the director must call again, or `None` when
    /// nothing is in progress.
    fn schedule(
        &mut self,
        actor: &ActorCell,
        environment_time: Time,
        deadline: Time,
        execution_time: f64,
    ) -> Result<Option<f64>, KernelError>;

    /// True while `actor` has a request that has not completed.
    fn is_waiting_for_resource(&self, actor: ActorId) -> bool;

    /// True when the last call to `schedule` completed the caller's request.
    fn last_scheduled_actor_finished(&self) -> bool;

    /// Called once at the end of the run. Drops outstanding requests.
    fn wrapup(&mut self) -> Result<(), KernelError>;

    /// Registers an observer of START/STOP/PREEMPTED events.
    fn add_listener(&mut self, listener: Arc<dyn EventListener>) -> ListenerId;

    /// Removes an observer. Returns false when the id was unknown.
    fn remove_listener(&mut self, id: ListenerId) -> bool;
}

/// How directors hold schedulers.
pub type SharedScheduler = Arc<parking_lot::Mutex<dyn ResourceScheduler>>;
