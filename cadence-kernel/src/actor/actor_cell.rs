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

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::*;

use crate::actor::composite::CompositeBody;
use crate::actor::lifecycle::{LifecyclePhase, LifecycleTracker};
use crate::actor::{ExecutionFlags, FiringContext, LifecycleState, Port, PortDirection, PortRef, PortSpec};
use crate::aspect::AspectAttributes;
use crate::causality::FunctionDependency;
use crate::common::{ActorId, EventBroker, KernelError, PortId, Time};
use crate::message::{FiringEvent, FiringEventKind};
use crate::traits::{Actor, Director, Executable, Initializable, IterationOutcome};

pub(crate) struct AtomicBody {
    actor: tokio::sync::Mutex<Box<dyn Actor>>,
    fire_functional: bool,
    strict: bool,
}

pub(crate) enum CellBody {
    Atomic(AtomicBody),
    Composite(CompositeBody),
}

struct CachedDependency {
    fingerprint: u64,
    graph: Arc<FunctionDependency>,
}

/// The kernel's handle on one actor, atomic or composite.
///
/// Cells are always shared through [`ActorRef`](crate::common::ActorRef).
/// A composite cell with a local director is opaque and executes its
/// contents itself; one without is transparent and its contents are run by
/// the enclosing director.
pub struct ActorCell {
    id: ActorId,
    name: String,
    pub(crate) body: CellBody,
    container: RwLock<Weak<ActorCell>>,
    ports: RwLock<Vec<PortRef>>,
    next_port_index: AtomicUsize,
    independences: RwLock<BTreeSet<(String, String)>>,
    dependency: Mutex<Option<CachedDependency>>,
    dependency_dirty: AtomicBool,
    aspects: RwLock<BTreeMap<String, AspectAttributes>>,
    flags: ExecutionFlags,
    lifecycle: LifecycleTracker,
    initializables: RwLock<Vec<Arc<dyn Initializable>>>,
    broker: RwLock<Option<Arc<EventBroker>>>,
}

/// Assembles an [`ActorCell`] with its initial ports.
///
/// ```ignore
/// let scale = ActorBuilder::new("scale")
///     .input("in")
///     .output("out")
///     .typed("f64")
///     .build_atomic(Scale::default());
/// ```
#[derive(Debug, Clone)]
pub struct ActorBuilder {
    name: String,
    ports: Vec<PortSpec>,
}

impl ActorBuilder {
    /// Starts a builder for an actor called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ports: Vec::new(),
        }
    }

    /// Adds a port from a full description.
    #[must_use]
    pub fn port(mut self, spec: PortSpec) -> Self {
        if self.ports.iter().any(|p| p.name == spec.name) {
            warn!(actor = %self.name, port = %spec.name, "duplicate port ignored");
        } else {
            self.ports.push(spec);
        }
        self
    }

    /// Adds a single-channel input port.
    #[must_use]
    pub fn input(self, name: impl Into<String>) -> Self {
        self.port(PortSpec::new(name, PortDirection::Input))
    }

    /// Adds an output port.
    #[must_use]
    pub fn output(self, name: impl Into<String>) -> Self {
        self.port(PortSpec::new(name, PortDirection::Output))
    }

    /// Adds an input multiport.
    #[must_use]
    pub fn multiport_input(self, name: impl Into<String>) -> Self {
        let mut spec = PortSpec::new(name, PortDirection::Input);
        spec.multiport = true;
        self.port(spec)
    }

    /// Adds an output multiport, one channel per connection.
    #[must_use]
    pub fn multiport_output(self, name: impl Into<String>) -> Self {
        let mut spec = PortSpec::new(name, PortDirection::Output);
        spec.multiport = true;
        self.port(spec)
    }

    /// Adds a port that both receives and sends.
    #[must_use]
    pub fn input_output(self, name: impl Into<String>) -> Self {
        self.port(PortSpec::new(name, PortDirection::InputOutput))
    }

    /// Declares the type of the most recently added port.
    #[must_use]
    pub fn typed(mut self, type_name: impl Into<String>) -> Self {
        if let Some(last) = self.ports.last_mut() {
            last.declared_type = Some(type_name.into());
        }
        self
    }

    /// Builds an atomic actor around `actor`.
    pub fn build_atomic<A: Actor>(self, actor: A) -> Arc<ActorCell> {
        let body = CellBody::Atomic(AtomicBody {
            fire_functional: actor.is_fire_functional(),
            strict: actor.is_strict(),
            actor: tokio::sync::Mutex::new(Box::new(actor)),
        });
        self.build(body)
    }

    /// Builds an opaque composite executed by `director`.
    pub fn build_composite<D: Director + 'static>(self, director: D) -> Arc<ActorCell> {
        let director: Arc<dyn Director> = Arc::new(director);
        let cell = self.build(CellBody::Composite(CompositeBody::new(Some(Arc::clone(
            &director,
        )))));
        director.set_container(Arc::downgrade(&cell));
        cell
    }

    /// Builds a transparent composite, run by whichever director encloses it.
    pub fn build_transparent(self) -> Arc<ActorCell> {
        self.build(CellBody::Composite(CompositeBody::new(None)))
    }

    fn build(self, body: CellBody) -> Arc<ActorCell> {
        let id = ActorId::next();
        let port_count = self.ports.len();
        let name = self.name;
        let specs = self.ports;
        Arc::new_cyclic(|weak: &Weak<ActorCell>| {
            let ports = specs
                .into_iter()
                .enumerate()
                .map(|(index, spec)| Arc::new(Port::new(PortId { actor: id, index }, weak.clone(), spec)))
                .collect();
            ActorCell {
                id,
                name,
                body,
                container: RwLock::new(Weak::new()),
                ports: RwLock::new(ports),
                next_port_index: AtomicUsize::new(port_count),
                independences: RwLock::new(BTreeSet::new()),
                dependency: Mutex::new(None),
                dependency_dirty: AtomicBool::new(true),
                aspects: RwLock::new(BTreeMap::new()),
                flags: ExecutionFlags::default(),
                lifecycle: LifecycleTracker::default(),
                initializables: RwLock::new(Vec::new()),
                broker: RwLock::new(None),
            }
        })
    }
}

impl ActorCell {
    /// Identity of the cell.
    #[must_use]
    pub const fn id(&self) -> ActorId {
        self.id
    }

    /// Name within the container.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dot-separated path from the top-level actor.
    #[must_use]
    pub fn full_name(&self) -> String {
        match self.container() {
            Some(container) => format!("{}.{}", container.full_name(), self.name),
            None => self.name.clone(),
        }
    }

    /// The enclosing composite.
    #[must_use]
    pub fn container(&self) -> Option<Arc<ActorCell>> {
        self.container.read().upgrade()
    }

    pub(crate) fn set_container(&self, container: Weak<ActorCell>) {
        *self.container.write() = container;
    }

    /// True for cells wrapping a user [`Actor`].
    #[must_use]
    pub const fn is_atomic(&self) -> bool {
        matches!(self.body, CellBody::Atomic(_))
    }

    /// True for composite cells.
    #[must_use]
    pub const fn is_composite(&self) -> bool {
        matches!(self.body, CellBody::Composite(_))
    }

    /// Atomic cells and composites with a local director execute as a unit.
    #[must_use]
    pub fn is_opaque(&self) -> bool {
        match &self.body {
            CellBody::Atomic(_) => true,
            CellBody::Composite(composite) => composite.director().is_some(),
        }
    }

    /// The director inside this composite, if any.
    #[must_use]
    pub fn local_director(&self) -> Option<Arc<dyn Director>> {
        match &self.body {
            CellBody::Composite(composite) => composite.director(),
            CellBody::Atomic(_) => None,
        }
    }

    /// The local director if present, else the nearest enclosing one.
    #[must_use]
    pub fn director(&self) -> Option<Arc<dyn Director>> {
        self.local_director().or_else(|| self.executive_director())
    }

    /// The director that executes this cell.
    #[must_use]
    pub fn executive_director(&self) -> Option<Arc<dyn Director>> {
        self.container().and_then(|container| container.director())
    }

    /// Installs or replaces the local director of a composite.
    pub fn set_director(self: &Arc<Self>, director: Arc<dyn Director>) -> Result<(), KernelError> {
        let composite = self.composite_body()?;
        if let Some(current) = composite.director() {
            if current.is_running() {
                return Err(KernelError::illegal(format!(
                    "cannot replace the director of {} during a run",
                    self.full_name()
                )));
            }
        }
        director.set_container(Arc::downgrade(self));
        composite.set_director(Some(director));
        self.invalidate_dependency();
        Ok(())
    }

    pub(crate) fn composite_body(&self) -> Result<&CompositeBody, KernelError> {
        match &self.body {
            CellBody::Composite(composite) => Ok(composite),
            CellBody::Atomic(_) => Err(KernelError::illegal(format!(
                "{} is not a composite actor",
                self.full_name()
            ))),
        }
    }

    /// All ports in creation order.
    #[must_use]
    pub fn ports(&self) -> Vec<PortRef> {
        self.ports.read().clone()
    }

    /// Ports that receive tokens.
    #[must_use]
    pub fn input_ports(&self) -> Vec<PortRef> {
        self.ports.read().iter().filter(|p| p.is_input()).cloned().collect()
    }

    /// Ports that send tokens.
    #[must_use]
    pub fn output_ports(&self) -> Vec<PortRef> {
        self.ports.read().iter().filter(|p| p.is_output()).cloned().collect()
    }

    /// Looks a port up by name.
    #[must_use]
    pub fn port(&self, name: &str) -> Option<PortRef> {
        self.ports.read().iter().find(|p| p.name() == name).cloned()
    }

    pub(crate) fn require_port(&self, name: &str) -> Result<PortRef, KernelError> {
        self.port(name).ok_or_else(|| {
            KernelError::illegal(format!("{} has no port named {name}", self.full_name()))
        })
    }

    /// Adds a port after construction.
    pub fn add_port(self: &Arc<Self>, spec: PortSpec) -> Result<PortRef, KernelError> {
        if self.port(&spec.name).is_some() {
            return Err(KernelError::illegal(format!(
                "{} already has a port named {}",
                self.full_name(),
                spec.name
            )));
        }
        let index = self.next_port_index.fetch_add(1, Ordering::Relaxed);
        let port = Arc::new(Port::new(
            PortId {
                actor: self.id,
                index,
            },
            Arc::downgrade(self),
            spec,
        ));
        self.ports.write().push(Arc::clone(&port));
        self.invalidate_dependency();
        Ok(port)
    }

    /// Removes a port together with every connection that touches it.
    pub fn remove_port(&self, name: &str) -> Result<PortRef, KernelError> {
        let port = self.require_port(name)?;
        self.ports.write().retain(|p| p.id() != port.id());
        self.independences
            .write()
            .retain(|(input, output)| input != name && output != name);
        if let Ok(composite) = self.composite_body() {
            composite.drop_connections_touching(|p| p.id() == port.id());
        }
        if let Some(container) = self.container() {
            if let Ok(composite) = container.composite_body() {
                composite.drop_connections_touching(|p| p.id() == port.id());
            }
        }
        self.invalidate_dependency();
        Ok(port)
    }

    /// Removes the dependency of `output` on `input` from this actor's graph.
    pub fn declare_independence(&self, input: &str, output: &str) -> Result<(), KernelError> {
        let input_port = self.require_port(input)?;
        let output_port = self.require_port(output)?;
        if !input_port.is_input() || !output_port.is_output() {
            return Err(KernelError::illegal(format!(
                "independence must go from an input to an output of {}",
                self.full_name()
            )));
        }
        if self
            .independences
            .write()
            .insert((input.to_string(), output.to_string()))
        {
            self.invalidate_dependency();
        }
        Ok(())
    }

    /// Withdraws a declared independence. Returns false when none was declared.
    pub fn remove_independence(&self, input: &str, output: &str) -> bool {
        let removed = self
            .independences
            .write()
            .remove(&(input.to_string(), output.to_string()));
        if removed {
            self.invalidate_dependency();
        }
        removed
    }

    /// Declared (input, output) independences.
    #[must_use]
    pub fn independences(&self) -> BTreeSet<(String, String)> {
        self.independences.read().clone()
    }

    /// Input/output dependency graph of this actor, cached until the
    /// structure changes or [`invalidate_dependency`](Self::invalidate_dependency) is called.
    pub fn function_dependency(&self) -> Arc<FunctionDependency> {
        let fingerprint = self.structural_fingerprint();
        let dirty = self.dependency_dirty.swap(false, Ordering::AcqRel);
        if !dirty {
            if let Some(cached) = self.dependency.lock().as_ref() {
                if cached.fingerprint == fingerprint {
                    return Arc::clone(&cached.graph);
                }
            }
        }
        trace!(actor = %self.full_name(), "computing dependency graph");
        let graph = Arc::new(FunctionDependency::compute(self));
        *self.dependency.lock() = Some(CachedDependency {
            fingerprint,
            graph: Arc::clone(&graph),
        });
        graph
    }

    /// Marks the cached graph of this actor and every ancestor stale.
    pub fn invalidate_dependency(&self) {
        self.dependency_dirty.store(true, Ordering::Release);
        if let Some(container) = self.container() {
            container.invalidate_dependency();
        }
    }

    fn structural_fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash_structure(&mut hasher);
        hasher.finish()
    }

    fn hash_structure(&self, hasher: &mut DefaultHasher) {
        self.id.hash(hasher);
        for port in self.ports.read().iter() {
            port.id().hash(hasher);
            port.direction().hash(hasher);
        }
        self.independences.read().hash(hasher);
        if let CellBody::Composite(composite) = &self.body {
            for child in composite.children() {
                child.hash_structure(hasher);
            }
            for connection in composite.connections() {
                connection.from.id().hash(hasher);
                connection.to.id().hash(hasher);
            }
        }
    }

    /// Decorates this actor along `axis`.
    pub fn set_aspect_attributes(&self, axis: impl Into<String>, attributes: AspectAttributes) {
        self.aspects.write().insert(axis.into(), attributes);
    }

    /// Decoration along `axis`, if any.
    #[must_use]
    pub fn aspect_attributes(&self, axis: &str) -> Option<AspectAttributes> {
        self.aspects.read().get(axis).cloned()
    }

    /// Removes the decoration along `axis`.
    pub fn remove_aspect_attributes(&self, axis: &str) -> Option<AspectAttributes> {
        self.aspects.write().remove(axis)
    }

    /// Every axis with enabled decoration, in axis order.
    #[must_use]
    pub fn enabled_aspects(&self) -> Vec<(String, AspectAttributes)> {
        self.aspects
            .read()
            .iter()
            .filter(|(_, attributes)| attributes.enabled)
            .map(|(axis, attributes)| (axis.clone(), attributes.clone()))
            .collect()
    }

    pub(crate) fn set_sequence_number(&self, axis: &str, sequence: u64) {
        if let Some(attributes) = self.aspects.write().get_mut(axis) {
            attributes.sequence_number = Some(sequence);
        }
    }

    /// Cooperative control flags.
    #[must_use]
    pub const fn flags(&self) -> &ExecutionFlags {
        &self.flags
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Installs the event broker used by this cell and everything inside it.
    pub fn set_broker(&self, broker: Arc<EventBroker>) {
        *self.broker.write() = Some(broker);
    }

    /// The nearest broker up the containment chain.
    #[must_use]
    pub fn broker(&self) -> Option<Arc<EventBroker>> {
        if let Some(broker) = self.broker.read().clone() {
            return Some(broker);
        }
        self.container().and_then(|container| container.broker())
    }

    pub(crate) fn model_time(&self) -> Time {
        self.director().map_or(Time::ZERO, |director| director.model_time())
    }

    fn emit(&self, kind: FiringEventKind) {
        if let Some(broker) = self.broker() {
            broker.publish(FiringEvent::new(
                self.id,
                self.full_name(),
                kind,
                self.model_time(),
            ));
        }
    }

    fn actor_error(&self, error: anyhow::Error) -> KernelError {
        KernelError::from_actor(&self.full_name(), error)
    }

    fn initializables(&self) -> Vec<Arc<dyn Initializable>> {
        self.initializables.read().clone()
    }
}

#[async_trait]
impl Initializable for ActorCell {
    async fn preinitialize(&self) -> Result<(), KernelError> {
        self.lifecycle
            .check(LifecyclePhase::Preinitialize, &self.full_name())?;
        self.lifecycle.reset();
        self.flags.clear();
        self.lifecycle.set(LifecycleState::Preinitialized);
        trace!(actor = %self.full_name(), "preinitialize");
        match &self.body {
            CellBody::Atomic(atomic) => {
                let ctx = FiringContext::new(self);
                let mut actor = atomic.actor.lock().await;
                actor
                    .preinitialize(&ctx)
                    .await
                    .map_err(|e| self.actor_error(e))?;
            }
            CellBody::Composite(composite) => {
                if let Some(director) = composite.director() {
                    director.preinitialize().await?;
                }
            }
        }
        for initializable in self.initializables() {
            initializable.preinitialize().await?;
        }
        Ok(())
    }

    async fn initialize(&self) -> Result<(), KernelError> {
        self.lifecycle
            .check(LifecyclePhase::Initialize, &self.full_name())?;
        trace!(actor = %self.full_name(), "initialize");
        match &self.body {
            CellBody::Atomic(atomic) => {
                let ctx = FiringContext::new(self);
                let mut actor = atomic.actor.lock().await;
                actor
                    .initialize(&ctx)
                    .await
                    .map_err(|e| self.actor_error(e))?;
            }
            CellBody::Composite(composite) => {
                if let Some(director) = composite.director() {
                    director.initialize().await?;
                }
            }
        }
        for initializable in self.initializables() {
            initializable.initialize().await?;
        }
        self.lifecycle.set(LifecycleState::Ready);
        Ok(())
    }

    async fn wrapup(&self) -> Result<(), KernelError> {
        if !self.lifecycle.check(LifecyclePhase::Wrapup, &self.full_name())? {
            return Ok(());
        }
        self.lifecycle.set(LifecycleState::WrappedUp);
        trace!(actor = %self.full_name(), "wrapup");
        let mut first_error = None;
        let result = match &self.body {
            CellBody::Atomic(atomic) => {
                let ctx = FiringContext::new(self);
                let mut actor = atomic.actor.lock().await;
                actor.wrapup(&ctx).await.map_err(|e| self.actor_error(e))
            }
            CellBody::Composite(composite) => match composite.director() {
                Some(director) => director.wrapup().await,
                None => Ok(()),
            },
        };
        if let Err(e) = result {
            first_error = Some(e);
        }
        for initializable in self.initializables() {
            if let Err(e) = initializable.wrapup().await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn add_initializable(&self, initializable: Arc<dyn Initializable>) {
        self.initializables.write().push(initializable);
    }

    fn remove_initializable(&self, initializable: &Arc<dyn Initializable>) {
        self.initializables
            .write()
            .retain(|registered| !Arc::ptr_eq(registered, initializable));
    }
}

#[async_trait]
impl Executable for ActorCell {
    async fn prefire(&self) -> Result<bool, KernelError> {
        self.lifecycle.check(LifecyclePhase::Prefire, &self.full_name())?;
        self.emit(FiringEventKind::BeforePrefire);
        let ready = match &self.body {
            CellBody::Atomic(atomic) => {
                let ctx = FiringContext::new(self);
                let mut actor = atomic.actor.lock().await;
                actor.prefire(&ctx).await.map_err(|e| self.actor_error(e))?
            }
            CellBody::Composite(composite) => match composite.director() {
                Some(director) => director.prefire().await?,
                None => true,
            },
        };
        self.emit(FiringEventKind::AfterPrefire);
        if ready {
            self.lifecycle.set(LifecycleState::Prefired);
        }
        Ok(ready)
    }

    async fn fire(&self) -> Result<(), KernelError> {
        self.lifecycle.check(LifecyclePhase::Fire, &self.full_name())?;
        self.emit(FiringEventKind::BeforeFire);
        match &self.body {
            CellBody::Atomic(atomic) => {
                let ctx = FiringContext::new(self);
                let mut actor = atomic.actor.lock().await;
                actor.fire(&ctx).await.map_err(|e| self.actor_error(e))?;
            }
            CellBody::Composite(composite) => {
                if let Some(director) = composite.director() {
                    self.transfer_inputs().await?;
                    director.fire().await?;
                    self.transfer_outputs().await?;
                }
            }
        }
        self.flags.clear_stop_fire();
        self.lifecycle.set(LifecycleState::Fired);
        self.emit(FiringEventKind::AfterFire);
        Ok(())
    }

    async fn postfire(&self) -> Result<bool, KernelError> {
        self.lifecycle.check(LifecyclePhase::Postfire, &self.full_name())?;
        self.emit(FiringEventKind::BeforePostfire);
        let more = match &self.body {
            CellBody::Atomic(atomic) => {
                let ctx = FiringContext::new(self);
                let mut actor = atomic.actor.lock().await;
                actor.postfire(&ctx).await.map_err(|e| self.actor_error(e))?
            }
            CellBody::Composite(composite) => match composite.director() {
                Some(director) => director.postfire().await?,
                None => true,
            },
        };
        self.lifecycle.set(LifecycleState::Ready);
        self.emit(FiringEventKind::AfterPostfire);
        Ok(more && !self.flags.stop_requested())
    }

    async fn iterate(&self, count: u64) -> Result<IterationOutcome, KernelError> {
        self.emit(FiringEventKind::BeforeIterate);
        let mut outcome = IterationOutcome::Completed;
        for _ in 0..count {
            if !self.prefire().await? {
                outcome = IterationOutcome::NotReady;
                break;
            }
            self.fire().await?;
            if !self.postfire().await? {
                outcome = IterationOutcome::StopIterating;
                break;
            }
        }
        self.emit(FiringEventKind::AfterIterate);
        Ok(outcome)
    }

    fn stop(&self) {
        self.flags.request_stop();
        if let Some(director) = self.local_director() {
            director.stop();
        }
    }

    fn stop_fire(&self) {
        self.flags.request_stop_fire();
        if let Some(director) = self.local_director() {
            director.stop_fire();
        }
    }

    fn terminate(&self) {
        self.flags.mark_terminated();
        self.lifecycle.terminate();
        if let Some(director) = self.local_director() {
            director.terminate();
        }
    }

    fn is_fire_functional(&self) -> bool {
        match &self.body {
            CellBody::Atomic(atomic) => atomic.fire_functional,
            CellBody::Composite(_) => true,
        }
    }

    fn is_strict(&self) -> bool {
        match &self.body {
            CellBody::Atomic(atomic) => atomic.strict,
            CellBody::Composite(_) => true,
        }
    }
}

impl fmt::Debug for ActorCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorCell")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("opaque", &self.is_opaque())
            .field("state", &self.lifecycle.state())
            .finish_non_exhaustive()
    }
}
