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

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::task::TaskTracker;
use tracing::*;

use crate::actor::{ActorCell, LifecycleState};
use crate::common::{ChangeRequest, DeclaredTypeResolver, KernelConfig, KernelError, ReceiverContainer, CONFIG};
use crate::director::process::state::{ProcessCoordinator, ThreadCounts};
use crate::director::process::worker::Worker;
use crate::director::wiring::{allocate_receivers, check_resolved_types, preinitialize_deep, LinkKey};
use crate::director::DirectorCore;
use crate::message::RunEvent;
use crate::receiver::{BlockingQueueReceiver, ThreadMonitor};
use crate::traits::{Director, Executable, Initializable, Receiver, TypeResolver};

#[derive(Debug, Default)]
struct ProcessState {
    receivers: HashMap<LinkKey, Arc<BlockingQueueReceiver>>,
    workers: Vec<Worker>,
    tracker: TaskTracker,
    deadlocked: bool,
}

/// Runs every actor of its domain on its own tokio task.
///
/// Actors only synchronize through [`BlockingQueueReceiver`]s. The director's
/// own `fire` watches the thread accounting: it returns once every worker has
/// exited, on a real deadlock (every live worker blocked and nothing pending
/// that could release one), on stop, or on the first worker error. Pending
/// change requests are applied with every worker held.
#[derive(Debug)]
pub struct ProcessDirector {
    core: DirectorCore,
    coordinator: Arc<ProcessCoordinator>,
    state: Mutex<ProcessState>,
}

impl ProcessDirector {
    /// A director using the global configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, CONFIG.clone())
    }

    /// A director using `config`.
    pub fn with_config(name: impl Into<String>, config: KernelConfig) -> Self {
        Self {
            core: DirectorCore::new(name, config),
            coordinator: Arc::new(ProcessCoordinator::default()),
            state: Mutex::new(ProcessState::default()),
        }
    }

    /// Current thread accounting.
    pub fn thread_counts(&self) -> ThreadCounts {
        self.coordinator.counts()
    }

    /// True when the last `fire` ended on a real deadlock.
    pub fn is_deadlocked(&self) -> bool {
        self.state.lock().deadlocked
    }

    fn make_receiver(&self) -> Arc<BlockingQueueReceiver> {
        let monitor: Arc<dyn ThreadMonitor> = Arc::clone(&self.coordinator) as Arc<dyn ThreadMonitor>;
        Arc::new(BlockingQueueReceiver::new(
            self.core.config().receivers.blocking_queue_capacity,
            Some(monitor),
        ))
    }

    fn receivers(&self) -> Vec<Arc<BlockingQueueReceiver>> {
        self.state.lock().receivers.values().cloned().collect()
    }

    fn publish(&self, event: RunEvent) {
        if let Some(broker) = self.core.container().and_then(|c| c.broker()) {
            broker.publish(event);
        }
    }

    /// Waits until `condition` holds, re-evaluating on every change reported
    /// by the coordinator.
    async fn wait_until(&self, condition: impl Fn(&ThreadCounts) -> bool) {
        loop {
            let changed = self.coordinator.changes().notified();
            tokio::pin!(changed);
            changed.as_mut().enable();
            if condition(&self.coordinator.counts()) || self.coordinator.is_terminate_requested() {
                return;
            }
            changed.await;
        }
    }

    /// Holds every worker: at its next pause point or inside a receiver.
    async fn hold_workers(&self) {
        self.coordinator.set_pause(true);
        for receiver in self.receivers() {
            receiver.request_pause(true);
        }
        self.wait_until(ThreadCounts::all_held).await;
        debug!(director = %self.core.name(), counts = ?self.coordinator.counts(), "workers held");
    }

    fn release_workers(&self) {
        for receiver in self.receivers() {
            receiver.request_pause(false);
        }
        self.coordinator.set_pause(false);
    }

    /// Doubles the smallest queue a writer is blocked on, within the
    /// configured maximum. Returns false when nothing could grow.
    fn grow_blocked_queue(&self) -> bool {
        let process = &self.core.config().process;
        if !process.grow_queues_on_deadlock {
            return false;
        }
        let Some(smallest) = self
            .receivers()
            .into_iter()
            .filter(|r| r.is_write_blocked())
            .min_by_key(|r| r.current_capacity())
        else {
            return false;
        };
        let capacity = smallest.current_capacity();
        if capacity >= process.max_queue_capacity {
            return false;
        }
        let grown = (capacity * 2).min(process.max_queue_capacity);
        info!(receiver = %smallest.describe(), from = capacity, to = grown, "growing queue to resolve deadlock");
        smallest.set_capacity(grown);
        true
    }

    /// Applies queued changes with every worker held, then integrates the
    /// actors they created and retires the ones they removed.
    async fn apply_mutations(&self, container: &Arc<ActorCell>) -> Result<(), KernelError> {
        self.hold_workers().await;
        let result = self.rewire(container).await;
        self.release_workers();
        let fresh = result?;

        for actor in &fresh {
            actor.initialize().await?;
        }
        let mut state = self.state.lock();
        for actor in fresh {
            let mut worker = Worker::spawn(actor, Arc::clone(&self.coordinator), &state.tracker);
            worker.start();
            state.workers.push(worker);
        }
        Ok(())
    }

    async fn rewire(&self, container: &Arc<ActorCell>) -> Result<Vec<Arc<ActorCell>>, KernelError> {
        let applied = self.core.apply_changes(container)?;
        let registered = self.core.take_new_actors();
        let present: BTreeSet<_> = container.deep_actors().iter().map(|a| a.id()).collect();
        let running: BTreeSet<_> = self.state.lock().workers.iter().map(|w| w.actor.id()).collect();
        let fresh: Vec<_> = registered
            .into_iter()
            .filter(|a| present.contains(&a.id()) && !running.contains(&a.id()))
            .collect();
        reject_decorated(&fresh)?;
        for actor in &fresh {
            actor.preinitialize().await?;
            DeclaredTypeResolver.resolve(actor)?;
        }

        let removed: Vec<_> = self
            .state
            .lock()
            .workers
            .iter()
            .filter(|w| !present.contains(&w.actor.id()))
            .map(|w| Arc::clone(&w.actor))
            .collect();
        // Removed workers must observe their stop before their links retire.
        for actor in &removed {
            actor.stop();
        }

        let previous = std::mem::take(&mut self.state.lock().receivers);
        let receivers = allocate_receivers(container, &previous, || self.make_receiver());
        for receiver in receivers.values() {
            receiver.request_pause(true);
        }
        for (key, receiver) in &previous {
            if !receivers.contains_key(key) {
                receiver.retire();
            }
        }
        self.state.lock().receivers = receivers;
        check_resolved_types(&container.deep_actors())?;

        info!(
            director = %self.core.name(),
            applied,
            added = fresh.len(),
            removed = removed.len(),
            "topology changed"
        );
        Ok(fresh)
    }
}

fn reject_decorated(actors: &[Arc<ActorCell>]) -> Result<(), KernelError> {
    if let Some(actor) = actors.iter().find(|a| !a.enabled_aspects().is_empty()) {
        return Err(KernelError::illegal(format!(
            "{} is decorated with an execution aspect, which the process regime cannot honor",
            actor.full_name()
        )));
    }
    Ok(())
}

#[async_trait]
impl Initializable for ProcessDirector {
    #[instrument(skip(self), fields(director = %self.core.name()))]
    async fn preinitialize(&self) -> Result<(), KernelError> {
        let container = self.core.require_container()?;
        self.core.begin_run();
        self.coordinator.reset();
        *self.state.lock() = ProcessState::default();

        reject_decorated(&container.deep_actors())?;
        preinitialize_deep(&container).await?;
        self.core.clear_new_actors();
        reject_decorated(&container.deep_actors())?;
        for initializable in self.core.initializables() {
            initializable.preinitialize().await?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(director = %self.core.name()))]
    async fn initialize(&self) -> Result<(), KernelError> {
        let container = self.core.require_container()?;
        let receivers = allocate_receivers(&container, &HashMap::new(), || self.make_receiver());
        self.state.lock().receivers = receivers;

        let actors = container.deep_actors();
        check_resolved_types(&actors)?;
        for actor in actors {
            actor.initialize().await?;
            let mut state = self.state.lock();
            let worker = Worker::spawn(actor, Arc::clone(&self.coordinator), &state.tracker);
            state.workers.push(worker);
        }
        for initializable in self.core.initializables() {
            initializable.initialize().await?;
        }
        debug!(workers = self.state.lock().workers.len(), "workers spawned");
        Ok(())
    }

    #[instrument(skip(self), fields(director = %self.core.name()))]
    async fn wrapup(&self) -> Result<(), KernelError> {
        let (mut workers, tracker) = {
            let mut state = self.state.lock();
            for receiver in state.receivers.values() {
                receiver.request_finish();
            }
            (std::mem::take(&mut state.workers), state.tracker.clone())
        };
        self.coordinator.set_pause(false);
        for worker in &mut workers {
            worker.actor.stop();
            worker.actor.stop_fire();
            worker.cancel_start();
        }
        tracker.close();
        tracker.wait().await;

        let mut first_error = None;
        for worker in workers {
            if let Err(e) = worker.handle.await {
                if e.is_panic() {
                    first_error.get_or_insert(KernelError::Panicked {
                        actor: worker.actor.full_name(),
                        message: e.to_string(),
                    });
                }
            }
            let state = worker.actor.lifecycle_state();
            if matches!(
                state,
                LifecycleState::Preinitialized | LifecycleState::Ready | LifecycleState::Prefired | LifecycleState::Fired
            ) {
                if let Err(e) = worker.actor.wrapup().await {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = self.coordinator.take_error() {
            first_error.get_or_insert(e);
        }
        if let Err(e) = self.core.aspects().wrapup() {
            first_error.get_or_insert(e);
        }
        for initializable in self.core.initializables() {
            if let Err(e) = initializable.wrapup().await {
                first_error.get_or_insert(e);
            }
        }
        self.core.set_running(false);
        first_error.map_or(Ok(()), Err)
    }

    fn add_initializable(&self, initializable: Arc<dyn Initializable>) {
        self.core.add_initializable(initializable);
    }

    fn remove_initializable(&self, initializable: &Arc<dyn Initializable>) {
        self.core.remove_initializable(initializable);
    }
}

#[async_trait]
impl Executable for ProcessDirector {
    async fn prefire(&self) -> Result<bool, KernelError> {
        for worker in &mut self.state.lock().workers {
            worker.start();
        }
        Ok(!self.core.is_finished())
    }

    #[instrument(skip(self), fields(director = %self.core.name()))]
    async fn fire(&self) -> Result<(), KernelError> {
        let container = self.core.require_container()?;
        loop {
            let changed = self.coordinator.changes().notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            if let Some(error) = self.coordinator.take_error() {
                return Err(error);
            }
            let counts = self.coordinator.counts();
            let mutation_pending = self.core.has_pending_changes() || !self.core.new_actors().is_empty();
            if counts.active == 0 && !mutation_pending {
                debug!("every worker exited");
                self.core.set_finished(true);
                return Ok(());
            }
            if self.core.stop_requested() || self.coordinator.is_terminate_requested() {
                return Ok(());
            }
            if self.coordinator.is_deadlocked() {
                if mutation_pending || self.grow_blocked_queue() {
                    debug!(?counts, "artificial deadlock");
                    self.publish(RunEvent::Deadlock {
                        container: container.full_name(),
                        artificial: true,
                    });
                } else {
                    warn!(?counts, "real deadlock");
                    self.state.lock().deadlocked = true;
                    self.publish(RunEvent::Deadlock {
                        container: container.full_name(),
                        artificial: false,
                    });
                    return Ok(());
                }
            }
            if mutation_pending {
                self.apply_mutations(&container).await?;
                continue;
            }
            changed.await;
        }
    }

    async fn postfire(&self) -> Result<bool, KernelError> {
        let deadlocked = self.state.lock().deadlocked;
        Ok(!(deadlocked || self.core.is_finished() || self.core.stop_requested()))
    }

    fn stop(&self) {
        self.core.request_stop();
        for worker in &self.state.lock().workers {
            worker.actor.stop();
        }
        self.coordinator.poke();
    }

    fn stop_fire(&self) {
        for worker in &self.state.lock().workers {
            worker.actor.stop_fire();
        }
    }

    fn terminate(&self) {
        self.coordinator.request_terminate();
        self.core.set_finished(true);
        let state = self.state.lock();
        for worker in &state.workers {
            worker.handle.abort();
            worker.actor.terminate();
        }
        for receiver in state.receivers.values() {
            receiver.request_finish();
        }
        warn!(director = %self.core.name(), workers = state.workers.len(), "terminated");
    }
}

#[async_trait]
impl Director for ProcessDirector {
    fn core(&self) -> &DirectorCore {
        &self.core
    }

    fn new_receiver(&self, owner: ReceiverContainer) -> Arc<dyn Receiver> {
        let receiver = self.make_receiver();
        receiver.set_container(Some(owner));
        receiver
    }

    fn register_new_actor(&self, actor: Arc<ActorCell>) {
        self.core.register_new_actor(actor);
        self.coordinator.poke();
    }

    fn request_change(&self, change: ChangeRequest) {
        self.core.push_change(change);
        self.coordinator.poke();
    }

    async fn pause(&self) -> Result<(), KernelError> {
        self.hold_workers().await;
        Ok(())
    }

    async fn resume(&self) -> Result<(), KernelError> {
        self.release_workers();
        Ok(())
    }
}
