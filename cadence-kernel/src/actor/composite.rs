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

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::*;

use crate::actor::{ActorCell, PortRef};
use crate::common::KernelError;
use crate::message::Token;
use crate::traits::{Director, Receiver};

/// A directed link from one port to another inside a composite.
///
/// `from` is an output port of a child or an input port of the composite
/// itself; `to` is an input port of a child or an output port of the
/// composite. A multiport gets one channel per connection, a single port
/// shares one channel across all its connections.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Source end.
    pub from: PortRef,
    /// Sink end.
    pub to: PortRef,
}

impl Connection {
    fn touches(&self, predicate: &impl Fn(&PortRef) -> bool) -> bool {
        predicate(&self.from) || predicate(&self.to)
    }
}

fn owned_by_child(children: &[Arc<ActorCell>], port: &PortRef) -> bool {
    children.iter().any(|child| child.id() == port.id().actor)
}

#[derive(Debug, Default)]
struct Topology {
    children: Vec<Arc<ActorCell>>,
    connections: Vec<Connection>,
}

pub(crate) struct CompositeBody {
    topology: RwLock<Topology>,
    director: RwLock<Option<Arc<dyn Director>>>,
}

impl CompositeBody {
    pub(crate) fn new(director: Option<Arc<dyn Director>>) -> Self {
        Self {
            topology: RwLock::new(Topology::default()),
            director: RwLock::new(director),
        }
    }

    pub(crate) fn director(&self) -> Option<Arc<dyn Director>> {
        self.director.read().clone()
    }

    pub(crate) fn set_director(&self, director: Option<Arc<dyn Director>>) {
        *self.director.write() = director;
    }

    pub(crate) fn children(&self) -> Vec<Arc<ActorCell>> {
        self.topology.read().children.clone()
    }

    pub(crate) fn connections(&self) -> Vec<Connection> {
        self.topology.read().connections.clone()
    }

    pub(crate) fn drop_connections_touching(&self, predicate: impl Fn(&PortRef) -> bool) {
        self.topology
            .write()
            .connections
            .retain(|connection| !connection.touches(&predicate));
    }
}

impl ActorCell {
    /// Direct children in insertion order.
    #[must_use]
    pub fn children(&self) -> Vec<Arc<ActorCell>> {
        self.composite_body()
            .map(CompositeBody::children)
            .unwrap_or_default()
    }

    /// Looks a direct child up by name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<Arc<ActorCell>> {
        self.children().into_iter().find(|child| child.name() == name)
    }

    /// Connections declared in this composite.
    #[must_use]
    pub fn connections(&self) -> Vec<Connection> {
        self.composite_body()
            .map(CompositeBody::connections)
            .unwrap_or_default()
    }

    /// Adds `child` to this composite.
    ///
    /// During a run the child is registered with the effective director so
    /// it is integrated before the next phase.
    pub fn add_child(self: &Arc<Self>, child: Arc<ActorCell>) -> Result<(), KernelError> {
        let composite = self.composite_body()?;
        if child.container().is_some() {
            return Err(KernelError::illegal(format!(
                "{} already belongs to a container",
                child.full_name()
            )));
        }
        let mut ancestor = Some(Arc::clone(self));
        while let Some(cell) = ancestor {
            if cell.id() == child.id() {
                return Err(KernelError::illegal(format!(
                    "{} cannot contain itself",
                    child.name()
                )));
            }
            ancestor = cell.container();
        }
        {
            let mut topology = composite.topology.write();
            if topology.children.iter().any(|c| c.name() == child.name()) {
                return Err(KernelError::illegal(format!(
                    "{} already has a child named {}",
                    self.full_name(),
                    child.name()
                )));
            }
            child.set_container(Arc::downgrade(self));
            topology.children.push(Arc::clone(&child));
        }
        self.invalidate_dependency();
        debug!(container = %self.full_name(), child = child.name(), "child added");

        if let Some(director) = self.director() {
            if director.is_running() {
                director.register_new_actor(child);
            }
        }
        Ok(())
    }

    /// Removes a direct child and every connection touching its ports.
    pub fn remove_child(&self, name: &str) -> Result<Arc<ActorCell>, KernelError> {
        let composite = self.composite_body()?;
        let child = {
            let mut topology = composite.topology.write();
            let position = topology
                .children
                .iter()
                .position(|c| c.name() == name)
                .ok_or_else(|| {
                    KernelError::illegal(format!("{} has no child named {name}", self.full_name()))
                })?;
            let child = topology.children.remove(position);
            let child_id = child.id();
            topology
                .connections
                .retain(|connection| !connection.touches(&|port: &PortRef| port.id().actor == child_id));
            child
        };
        child.set_container(std::sync::Weak::new());
        self.invalidate_dependency();
        debug!(container = %self.full_name(), child = name, "child removed");
        Ok(child)
    }

    /// Connects two ports inside this composite.
    pub fn connect(&self, from: &PortRef, to: &PortRef) -> Result<(), KernelError> {
        let composite = self.composite_body()?;
        {
            let mut topology = composite.topology.write();
            let from_ok = if from.is_owned_by(self) {
                from.is_input()
            } else {
                owned_by_child(&topology.children, from) && from.is_output()
            };
            let to_ok = if to.is_owned_by(self) {
                to.is_output()
            } else {
                owned_by_child(&topology.children, to) && to.is_input()
            };
            if !from_ok || !to_ok || from.id() == to.id() {
                return Err(KernelError::illegal(format!(
                    "cannot connect {} to {} inside {}",
                    from.full_name(),
                    to.full_name(),
                    self.full_name()
                )));
            }
            if topology
                .connections
                .iter()
                .any(|c| c.from.id() == from.id() && c.to.id() == to.id())
            {
                return Err(KernelError::illegal(format!(
                    "{} is already connected to {}",
                    from.full_name(),
                    to.full_name()
                )));
            }
            if !to.is_multiport() && topology.connections.iter().any(|c| c.to.id() == to.id()) {
                return Err(KernelError::illegal(format!(
                    "{} is a single port and is already connected",
                    to.full_name()
                )));
            }
            topology.connections.push(Connection {
                from: Arc::clone(from),
                to: Arc::clone(to),
            });
        }
        self.invalidate_dependency();
        Ok(())
    }

    /// Removes a connection.
    pub fn disconnect(&self, from: &PortRef, to: &PortRef) -> Result<(), KernelError> {
        let composite = self.composite_body()?;
        {
            let mut topology = composite.topology.write();
            let before = topology.connections.len();
            topology
                .connections
                .retain(|c| !(c.from.id() == from.id() && c.to.id() == to.id()));
            if topology.connections.len() == before {
                return Err(KernelError::illegal(format!(
                    "{} is not connected to {}",
                    from.full_name(),
                    to.full_name()
                )));
            }
        }
        self.invalidate_dependency();
        Ok(())
    }

    /// Opaque actors reachable without crossing an opaque boundary, with the
    /// contents of transparent composites flattened in place.
    #[must_use]
    pub fn deep_actors(&self) -> Vec<Arc<ActorCell>> {
        let mut actors = Vec::new();
        for child in self.children() {
            if child.is_opaque() {
                actors.push(child);
            } else {
                actors.extend(child.deep_actors());
            }
        }
        actors
    }

    /// Moves tokens waiting on the outside of this composite's input ports
    /// to every inside destination.
    pub(crate) async fn transfer_inputs(&self) -> Result<(), KernelError> {
        for port in self.input_ports() {
            let destinations = port.all_inside_remote_receivers();
            for receiver in port.receivers() {
                while receiver.has_token() {
                    let token = receiver.get().await?;
                    forward(&destinations, &token).await?;
                }
            }
        }
        Ok(())
    }

    /// Moves tokens produced inside this composite's output ports to every
    /// outside destination.
    pub(crate) async fn transfer_outputs(&self) -> Result<(), KernelError> {
        for port in self.output_ports() {
            let destinations = port.all_remote_receivers();
            for receiver in port.inside_receivers() {
                while receiver.has_token() {
                    let token = receiver.get().await?;
                    forward(&destinations, &token).await?;
                }
            }
        }
        Ok(())
    }
}

/// Puts `token` into every destination, skipping receivers retired by a
/// topology change.
async fn forward(destinations: &[Arc<dyn Receiver>], token: &Token) -> Result<(), KernelError> {
    for destination in destinations {
        match destination.put(token.clone()).await {
            Ok(()) | Err(KernelError::LinkRetired) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
