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
use std::sync::{Arc, Weak};

use async_trait::async_trait;

use crate::actor::ActorCell;
use crate::aspect::AspectRegistry;
use crate::common::{ChangeRequest, KernelError, ReceiverContainer, Time};
use crate::director::DirectorCore;
use crate::traits::{Executable, Receiver};

/// Execution policy for the actors directly inside one composite.
///
/// A director is itself [`Executable`]; the composite that owns it forwards
/// its own lifecycle to it. Most bookkeeping lives in a shared
/// [`DirectorCore`], which concrete directors expose through [`core`](Self::core)
/// so the provided methods below work unchanged.
#[async_trait]
pub trait Director: Executable + Debug {
    /// Shared bookkeeping.
    fn core(&self) -> &DirectorCore;

    /// Creates a receiver of the kind this director's regime needs.
    fn new_receiver(&self, owner: ReceiverContainer) -> Arc<dyn Receiver>;

    /// Name used in logs and events.
    fn name(&self) -> &str {
        self.core().name()
    }

    /// Attaches the director to its composite.
    fn set_container(&self, container: Weak<ActorCell>) {
        self.core().set_container(container);
    }

    /// The composite this director executes, if it is still alive.
    fn container(&self) -> Option<Arc<ActorCell>> {
        self.core().container()
    }

    /// Current model time. Directors without a notion of time report zero.
    fn model_time(&self) -> Time {
        self.core().model_time()
    }

    /// Asks to iterate again at `time`. Returns the time actually granted,
    /// which is never earlier than the current model time.
    fn fire_at(&self, actor: &ActorCell, time: Time) -> Result<Time, KernelError> {
        Ok(self.core().schedule_wakeup(actor.id(), time))
    }

    /// Records an actor created while the run is in progress.
    fn register_new_actor(&self, actor: Arc<ActorCell>) {
        self.core().register_new_actor(actor);
    }

    /// Actors registered since the last [`clear_new_actors`](Self::clear_new_actors).
    fn new_actors(&self) -> Vec<Arc<ActorCell>> {
        self.core().new_actors()
    }

    /// Forgets the registered new actors.
    fn clear_new_actors(&self) {
        self.core().clear_new_actors();
    }

    /// True once the director decided the run is over.
    fn is_finished(&self) -> bool {
        self.core().is_finished()
    }

    /// True between the start of `preinitialize` and the end of `wrapup`.
    fn is_running(&self) -> bool {
        self.core().is_running()
    }

    /// Queues a topology mutation to be applied at the next safe point.
    fn request_change(&self, change: ChangeRequest) {
        self.core().push_change(change);
    }

    /// Holds execution at the next safe point. Returns once held.
    async fn pause(&self) -> Result<(), KernelError> {
        Ok(())
    }

    /// Releases a previous [`pause`](Self::pause).
    async fn resume(&self) -> Result<(), KernelError> {
        Ok(())
    }

    /// Resource schedulers consulted before firing decorated actors.
    fn aspect_registry(&self) -> &AspectRegistry {
        self.core().aspects()
    }
}
