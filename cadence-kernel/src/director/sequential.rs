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

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::*;

use crate::actor::ActorCell;
use crate::causality::DirectedGraph;
use crate::common::{ActorId, DeclaredTypeResolver, KernelConfig, KernelError, PortId, ReceiverContainer, Time, CONFIG};
use crate::director::wiring::{allocate_receivers, check_resolved_types, deep_links, preinitialize_deep, LinkKey};
use crate::director::DirectorCore;
use crate::receiver::QueueReceiver;
use crate::traits::{Director, Executable, Initializable, IterationOutcome, Receiver, TypeResolver};

#[derive(Debug, Default)]
struct SequentialState {
    order: Vec<Arc<ActorCell>>,
    finished: BTreeSet<ActorId>,
    receivers: HashMap<LinkKey, Arc<QueueReceiver>>,
    iterations: u64,
}

/// Single-threaded cooperative director.
///
/// Each `fire` runs one iteration of every live actor in a total order
/// derived from the dependency graph, so an actor only fires after everything
/// it depends on within the same iteration. Decorated actors fire only once
/// the resource schedulers have served their request.
#[derive(Debug)]
pub struct SequentialDirector {
    core: DirectorCore,
    state: Mutex<SequentialState>,
}

impl SequentialDirector {
    /// A director using the global configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, CONFIG.clone())
    }

    /// A director using `config`.
    pub fn with_config(name: impl Into<String>, config: KernelConfig) -> Self {
        Self {
            core: DirectorCore::new(name, config),
            state: Mutex::new(SequentialState::default()),
        }
    }

    /// Number of completed iterations in the current run.
    pub fn iteration_count(&self) -> u64 {
        self.state.lock().iterations
    }

    /// The firing order of the current run, by full name.
    pub fn firing_order(&self) -> Vec<String> {
        self.state
            .lock()
            .order
            .iter()
            .map(|actor| actor.full_name())
            .collect()
    }

    fn queue(&self) -> Arc<QueueReceiver> {
        Arc::new(QueueReceiver::new(
            self.core.config().receivers.sequential_queue_capacity,
        ))
    }

    /// Allocates receivers and computes the firing order of the current
    /// topology, reusing receivers of links that survived.
    fn wire(&self, container: &Arc<ActorCell>) -> Result<Vec<Arc<ActorCell>>, KernelError> {
        let previous = std::mem::take(&mut self.state.lock().receivers);
        let receivers = allocate_receivers(container, &previous, || self.queue());
        self.state.lock().receivers = receivers;

        let actors = container.deep_actors();
        check_resolved_types(&actors)?;
        container.function_dependency().check_acyclic()?;
        firing_order(container, &actors)
    }

    /// Asks every scheduler `actor` is decorated for whether it may fire now.
    fn resource_gate(&self, actor: &ActorCell) -> Result<bool, KernelError> {
        let schedulers = self.core.aspects().schedulers_for(actor);
        if schedulers.is_empty() {
            return Ok(true);
        }
        let now = self.core.model_time();
        let mut may_fire = true;
        for (scheduler, attributes) in schedulers {
            let deadline = attributes
                .deadline
                .map_or(Time::POSITIVE_INFINITY, |relative| now + relative);
            let mut scheduler = scheduler.lock();
            if let Some(delay) = scheduler.schedule(actor, now, deadline, attributes.execution_time)? {
                self.core.schedule_wakeup(actor.id(), now + delay);
            }
            if !scheduler.last_scheduled_actor_finished() {
                may_fire = false;
            }
        }
        Ok(may_fire)
    }

    /// Applies queued change requests and integrates the actors they created.
    async fn apply_mutations(&self, container: &Arc<ActorCell>) -> Result<(), KernelError> {
        let applied = self.core.apply_changes(container)?;
        let registered = self.core.take_new_actors();
        if applied == 0 && registered.is_empty() {
            return Ok(());
        }
        let present: BTreeSet<_> = container.deep_actors().iter().map(|a| a.id()).collect();
        let fresh: Vec<_> = registered
            .into_iter()
            .filter(|actor| present.contains(&actor.id()))
            .collect();
        for actor in &fresh {
            actor.preinitialize().await?;
            DeclaredTypeResolver.resolve(actor)?;
        }

        let previous_order = self.state.lock().order.clone();
        let order = self.wire(container)?;
        let admitted: Vec<_> = order
            .iter()
            .filter(|actor| fresh.iter().any(|f| f.id() == actor.id()))
            .cloned()
            .collect();
        self.core.aspects().admit_decorated_actors(&admitted)?;
        for actor in &fresh {
            actor.initialize().await?;
        }
        for removed in previous_order.iter().filter(|a| !present.contains(&a.id())) {
            debug!(director = %self.core.name(), actor = %removed.full_name(), "wrapping up removed actor");
            removed.wrapup().await?;
        }
        info!(director = %self.core.name(), applied, added = fresh.len(), "topology changed");
        self.state.lock().order = order;
        Ok(())
    }
}

/// Orders `actors` by the topological order of the port graph of the
/// domain: each actor sits at the earliest position of any of its ports.
/// Ties keep container order.
fn firing_order(
    container: &Arc<ActorCell>,
    actors: &[Arc<ActorCell>],
) -> Result<Vec<Arc<ActorCell>>, KernelError> {
    let mut graph = DirectedGraph::new();
    let mut labels: BTreeMap<PortId, String> = BTreeMap::new();
    for actor in actors {
        let dependency = actor.function_dependency();
        for port in actor.ports() {
            graph.add_node(port.id());
            labels.insert(port.id(), port.full_name());
        }
        for (from, to) in dependency.abstract_graph().edges() {
            graph.add_edge(from, to);
        }
    }
    for link in deep_links(container) {
        if !link.from_inside && !link.to_inside {
            graph.add_edge(link.source.id(), link.sink.id());
        }
    }

    let sorted = graph.topological_sort().map_err(|cycle| KernelError::CausalityCycle {
        container: container.full_name(),
        ports: cycle
            .into_iter()
            .map(|port| labels.get(&port).cloned().unwrap_or_else(|| format!("{port:?}")))
            .collect(),
    })?;
    let position: HashMap<PortId, usize> = sorted.into_iter().enumerate().map(|(i, p)| (p, i)).collect();

    let mut keyed: Vec<(usize, usize, Arc<ActorCell>)> = actors
        .iter()
        .enumerate()
        .map(|(index, actor)| {
            let earliest = actor
                .ports()
                .iter()
                .filter_map(|port| position.get(&port.id()).copied())
                .min()
                .unwrap_or(usize::MAX);
            (earliest, index, Arc::clone(actor))
        })
        .collect();
    keyed.sort_by_key(|(earliest, index, _)| (*earliest, *index));
    Ok(keyed.into_iter().map(|(_, _, actor)| actor).collect())
}

#[async_trait]
impl Initializable for SequentialDirector {
    #[instrument(skip(self), fields(director = %self.core.name()))]
    async fn preinitialize(&self) -> Result<(), KernelError> {
        let container = self.core.require_container()?;
        self.core.begin_run();
        *self.state.lock() = SequentialState::default();

        preinitialize_deep(&container).await?;
        self.core.clear_new_actors();
        for initializable in self.core.initializables() {
            initializable.preinitialize().await?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(director = %self.core.name()))]
    async fn initialize(&self) -> Result<(), KernelError> {
        let container = self.core.require_container()?;
        self.state.lock().receivers.clear();
        let receivers = allocate_receivers(&container, &HashMap::new(), || self.queue());
        self.state.lock().receivers = receivers;

        let actors = container.deep_actors();
        check_resolved_types(&actors)?;
        for actor in &actors {
            actor.initialize().await?;
        }
        container.function_dependency().check_acyclic()?;
        let order = firing_order(&container, &actors)?;

        self.core.aspects().initialize_decorated_actors(&order)?;
        if let Some(broker) = container.broker() {
            self.core.aspects().attach_broker(&broker);
        }
        debug!(order = ?order.iter().map(|a| a.name().to_string()).collect::<Vec<_>>(), "firing order");
        self.state.lock().order = order;

        for initializable in self.core.initializables() {
            initializable.initialize().await?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(director = %self.core.name()))]
    async fn wrapup(&self) -> Result<(), KernelError> {
        let mut first_error = None;
        if let Some(container) = self.core.container() {
            for actor in container.deep_actors() {
                if let Err(e) = actor.wrapup().await {
                    first_error.get_or_insert(e);
                }
            }
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
impl Executable for SequentialDirector {
    async fn prefire(&self) -> Result<bool, KernelError> {
        Ok(!self.core.is_finished())
    }

    async fn fire(&self) -> Result<(), KernelError> {
        let (order, finished) = {
            let state = self.state.lock();
            (state.order.clone(), state.finished.clone())
        };
        let mut done = Vec::new();
        for actor in order.iter().filter(|actor| !finished.contains(&actor.id())) {
            if !self.resource_gate(actor)? {
                trace!(actor = %actor.full_name(), "waiting for resource");
                continue;
            }
            if actor.iterate(1).await? == IterationOutcome::StopIterating {
                debug!(actor = %actor.full_name(), "actor finished");
                done.push(actor.id());
            }
        }
        self.state.lock().finished.extend(done);
        Ok(())
    }

    async fn postfire(&self) -> Result<bool, KernelError> {
        let container = self.core.require_container()?;
        let iterations = {
            let mut state = self.state.lock();
            state.iterations += 1;
            state.iterations
        };
        self.apply_mutations(&container).await?;

        let live: Vec<_> = {
            let state = self.state.lock();
            state
                .order
                .iter()
                .filter(|actor| !state.finished.contains(&actor.id()))
                .cloned()
                .collect()
        };
        let limit = self.core.config().sequential.iterations;
        if self.core.stop_requested() || live.is_empty() || (limit > 0 && iterations >= limit) {
            self.core.set_finished(true);
            return Ok(false);
        }

        if self.core.next_wakeup().is_none() {
            if let Some(stuck) = live.iter().find(|a| self.core.aspects().any_waiting(a.id())) {
                return Err(KernelError::Unschedulable {
                    scheduler: self.core.name().to_string(),
                    actor: stuck.full_name(),
                    reason: "request pending with no wake-up scheduled".to_string(),
                });
            }
        }
        if let Some(next) = self.core.next_wakeup() {
            if next > self.core.model_time() {
                trace!(from = %self.core.model_time(), to = %next, "advancing model time");
                self.core.set_model_time(next);
            }
            self.core.take_wakeups_until(self.core.model_time());
        }
        Ok(true)
    }

    fn stop(&self) {
        self.core.request_stop();
        if let Some(container) = self.core.container() {
            for actor in container.deep_actors() {
                actor.stop();
            }
        }
    }

    fn stop_fire(&self) {
        if let Some(container) = self.core.container() {
            for actor in container.deep_actors() {
                actor.stop_fire();
            }
        }
    }

    fn terminate(&self) {
        self.core.set_finished(true);
        if let Some(container) = self.core.container() {
            for actor in container.deep_actors() {
                actor.terminate();
            }
        }
    }
}

impl Director for SequentialDirector {
    fn core(&self) -> &DirectorCore {
        &self.core
    }

    fn new_receiver(&self, owner: ReceiverContainer) -> Arc<dyn Receiver> {
        let receiver = self.queue();
        receiver.set_container(Some(owner));
        receiver
    }
}
