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

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::*;

use crate::actor::ActorCell;
use crate::aspect::AspectAttributes;
use crate::common::{ActorId, EventBroker, KernelError, ListenerId};
use crate::traits::{EventListener, ResourceScheduler, SharedScheduler};

/// The resource schedulers a director consults, one per decoration axis.
#[derive(Default)]
pub struct AspectRegistry {
    schedulers: RwLock<BTreeMap<String, SharedScheduler>>,
    broker_links: Mutex<Vec<(SharedScheduler, ListenerId)>>,
}

impl AspectRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a shared scheduler. Fails when its axis is already served.
    pub fn register(&self, scheduler: SharedScheduler) -> Result<(), KernelError> {
        let axis = scheduler.lock().axis().to_string();
        let mut schedulers = self.schedulers.write();
        if schedulers.contains_key(&axis) {
            return Err(KernelError::illegal(format!(
                "a resource scheduler is already registered for axis {axis}"
            )));
        }
        debug!(axis = %axis, "resource scheduler registered");
        schedulers.insert(axis, scheduler);
        Ok(())
    }

    /// Wraps `scheduler` for sharing, registers it and returns the handle.
    pub fn register_scheduler<S: ResourceScheduler + 'static>(
        &self,
        scheduler: S,
    ) -> Result<SharedScheduler, KernelError> {
        let shared: SharedScheduler = Arc::new(Mutex::new(scheduler));
        self.register(Arc::clone(&shared))?;
        Ok(shared)
    }

    /// Removes the scheduler serving `axis`.
    pub fn unregister(&self, axis: &str) -> Option<SharedScheduler> {
        self.schedulers.write().remove(axis)
    }

    /// The scheduler serving `axis`.
    #[must_use]
    pub fn scheduler(&self, axis: &str) -> Option<SharedScheduler> {
        self.schedulers.read().get(axis).cloned()
    }

    /// True when no scheduler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schedulers.read().is_empty()
    }

    /// Registered schedulers with the attributes `actor` enabled for them,
    /// in axis order.
    #[must_use]
    pub fn schedulers_for(&self, actor: &ActorCell) -> Vec<(SharedScheduler, AspectAttributes)> {
        let schedulers = self.schedulers.read();
        actor
            .enabled_aspects()
            .into_iter()
            .filter_map(|(axis, attributes)| {
                schedulers
                    .get(&axis)
                    .map(|scheduler| (Arc::clone(scheduler), attributes))
            })
            .collect()
    }

    /// True when `actor` has enabled decoration on a registered axis.
    #[must_use]
    pub fn is_decorated(&self, actor: &ActorCell) -> bool {
        !self.schedulers_for(actor).is_empty()
    }

    /// Hands every scheduler the actors decorated on its axis, in the given
    /// order.
    pub fn initialize_decorated_actors(&self, actors: &[Arc<ActorCell>]) -> Result<(), KernelError> {
        for (axis, scheduler) in self.schedulers.read().iter() {
            let decorated: Vec<_> = actors
                .iter()
                .filter(|actor| actor.aspect_attributes(axis).is_some_and(|a| a.enabled))
                .cloned()
                .collect();
            scheduler.lock().initialize_decorated_actors(&decorated)?;
        }
        Ok(())
    }

    /// Hands every scheduler the decorated actors among `actors` that joined
    /// during a run.
    pub fn admit_decorated_actors(&self, actors: &[Arc<ActorCell>]) -> Result<(), KernelError> {
        for (axis, scheduler) in self.schedulers.read().iter() {
            let decorated: Vec<_> = actors
                .iter()
                .filter(|actor| actor.aspect_attributes(axis).is_some_and(|a| a.enabled))
                .cloned()
                .collect();
            if !decorated.is_empty() {
                scheduler.lock().admit_decorated_actors(&decorated)?;
            }
        }
        Ok(())
    }

    /// True while `actor` waits on any registered scheduler.
    #[must_use]
    pub fn any_waiting(&self, actor: ActorId) -> bool {
        self.schedulers
            .read()
            .values()
            .any(|scheduler| scheduler.lock().is_waiting_for_resource(actor))
    }

    /// Wraps up every scheduler and reports the first failure.
    pub fn wrapup(&self) -> Result<(), KernelError> {
        self.detach_broker();
        let mut first_error = None;
        for scheduler in self.schedulers.read().values() {
            if let Err(e) = scheduler.lock().wrapup() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Forwards the execution events of every scheduler to `broker` until
    /// [`detach_broker`](Self::detach_broker).
    pub fn attach_broker(&self, broker: &Arc<EventBroker>) {
        self.detach_broker();
        let listener: Arc<dyn EventListener> = Arc::clone(broker) as Arc<dyn EventListener>;
        let mut links = self.broker_links.lock();
        for scheduler in self.schedulers.read().values() {
            let id = scheduler.lock().add_listener(Arc::clone(&listener));
            links.push((Arc::clone(scheduler), id));
        }
    }

    /// Stops forwarding scheduler events.
    pub fn detach_broker(&self) {
        for (scheduler, id) in self.broker_links.lock().drain(..) {
            scheduler.lock().remove_listener(id);
        }
    }
}

impl fmt::Debug for AspectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectRegistry")
            .field("axes", &self.schedulers.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aspect::{Fifo, PolicyScheduler};

    #[test]
    fn one_scheduler_per_axis() {
        let registry = AspectRegistry::new();
        registry
            .register_scheduler(PolicyScheduler::new("cpu0", "cpu", Fifo))
            .unwrap();
        let second = registry.register_scheduler(PolicyScheduler::new("cpu1", "cpu", Fifo));
        assert!(matches!(second, Err(KernelError::IllegalAction(_))));
        assert!(registry.scheduler("cpu").is_some());
        assert!(registry.unregister("cpu").is_some());
        assert!(registry.is_empty());
    }
}
