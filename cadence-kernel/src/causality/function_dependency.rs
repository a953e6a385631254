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

use std::collections::{BTreeMap, BTreeSet};

use crate::actor::ActorCell;
use crate::causality::DirectedGraph;
use crate::common::{ActorId, KernelError, PortId};

/// Which outputs of an actor depend, within one firing, on which inputs.
///
/// Two views are kept. The detailed graph has the actor's own ports and, for
/// a composite, the ports of its direct children, with edges through the
/// children and along connections. The abstract graph has only the actor's
/// own ports, with an edge from an input to an output whenever the detailed
/// graph has a path between them; it is what an enclosing composite folds in.
///
/// An atomic actor starts fully dependent (every input to every output);
/// declared independences remove exactly the named edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDependency {
    actor: ActorId,
    actor_name: String,
    inputs: Vec<PortId>,
    outputs: Vec<PortId>,
    labels: BTreeMap<PortId, String>,
    detailed: DirectedGraph<PortId>,
    abstract_graph: DirectedGraph<PortId>,
}

impl FunctionDependency {
    pub(crate) fn compute(cell: &ActorCell) -> Self {
        let mut labels = BTreeMap::new();
        let mut detailed = DirectedGraph::new();
        let ports = cell.ports();
        let independences = cell.independences();

        for port in &ports {
            detailed.add_node(port.id());
            labels.insert(port.id(), port.full_name());
        }
        let inputs: Vec<_> = ports.iter().filter(|p| p.is_input()).cloned().collect();
        let outputs: Vec<_> = ports.iter().filter(|p| p.is_output()).cloned().collect();
        let declared_independent = |input: &str, output: &str| {
            independences.contains(&(input.to_string(), output.to_string()))
        };

        let abstract_graph = if cell.is_atomic() {
            for input in &inputs {
                for output in &outputs {
                    if input.id() != output.id() && !declared_independent(input.name(), output.name()) {
                        detailed.add_edge(input.id(), output.id());
                    }
                }
            }
            detailed.clone()
        } else {
            for child in cell.children() {
                for port in child.ports() {
                    detailed.add_node(port.id());
                    labels.insert(port.id(), port.full_name());
                }
                let inner = child.function_dependency();
                for (from, to) in inner.abstract_graph().edges() {
                    detailed.add_edge(from, to);
                }
            }
            for connection in cell.connections() {
                detailed.add_edge(connection.from.id(), connection.to.id());
            }

            let mut abstract_graph = DirectedGraph::new();
            for port in &ports {
                abstract_graph.add_node(port.id());
            }
            for input in &inputs {
                let reachable = detailed.reachable_from(input.id());
                for output in &outputs {
                    if input.id() != output.id()
                        && reachable.contains(&output.id())
                        && !declared_independent(input.name(), output.name())
                    {
                        abstract_graph.add_edge(input.id(), output.id());
                    }
                }
            }
            abstract_graph
        };

        Self {
            actor: cell.id(),
            actor_name: cell.full_name(),
            inputs: inputs.iter().map(|p| p.id()).collect(),
            outputs: outputs.iter().map(|p| p.id()).collect(),
            labels,
            detailed,
            abstract_graph,
        }
    }

    /// The actor this graph describes.
    #[must_use]
    pub const fn actor(&self) -> ActorId {
        self.actor
    }

    /// Graph over the actor's ports and, for composites, its children's ports.
    #[must_use]
    pub const fn detailed_graph(&self) -> &DirectedGraph<PortId> {
        &self.detailed
    }

    /// Black-box graph over the actor's own ports.
    #[must_use]
    pub const fn abstract_graph(&self) -> &DirectedGraph<PortId> {
        &self.abstract_graph
    }

    /// True when `output` depends on `input` within one firing.
    #[must_use]
    pub fn has_dependency(&self, input: PortId, output: PortId) -> bool {
        self.abstract_graph.has_edge(input, output)
    }

    /// Outputs that depend on `input`.
    #[must_use]
    pub fn dependent_outputs(&self, input: PortId) -> BTreeSet<PortId> {
        self.abstract_graph.successors(input).collect()
    }

    /// Inputs that `output` depends on.
    #[must_use]
    pub fn input_dependencies(&self, output: PortId) -> BTreeSet<PortId> {
        self.abstract_graph.predecessors(output).into_iter().collect()
    }

    /// Inputs that must be treated together with `input`: those sharing a
    /// dependent output with it, transitively. Always contains `input`.
    #[must_use]
    pub fn equivalent_ports(&self, input: PortId) -> BTreeSet<PortId> {
        let mut equivalent = BTreeSet::from([input]);
        let mut frontier = vec![input];
        while let Some(next) = frontier.pop() {
            for output in self.dependent_outputs(next) {
                for other in self.input_dependencies(output) {
                    if equivalent.insert(other) {
                        frontier.push(other);
                    }
                }
            }
        }
        equivalent
    }

    /// Ports of the detailed graph that lie on an instantaneous loop.
    #[must_use]
    pub fn cycle_nodes(&self) -> BTreeSet<PortId> {
        self.detailed.cycle_nodes()
    }

    /// Full name of a port of the detailed graph.
    #[must_use]
    pub fn port_name(&self, port: PortId) -> Option<&str> {
        self.labels.get(&port).map(String::as_str)
    }

    /// Own input ports, in port order.
    #[must_use]
    pub fn inputs(&self) -> &[PortId] {
        &self.inputs
    }

    /// Own output ports, in port order.
    #[must_use]
    pub fn outputs(&self) -> &[PortId] {
        &self.outputs
    }

    /// Fails with [`KernelError::CausalityCycle`] when the detailed graph
    /// has a loop.
    pub fn check_acyclic(&self) -> Result<(), KernelError> {
        let cycle = self.cycle_nodes();
        if cycle.is_empty() {
            return Ok(());
        }
        Err(KernelError::CausalityCycle {
            container: self.actor_name.clone(),
            ports: cycle
                .into_iter()
                .map(|port| {
                    self.port_name(port)
                        .map_or_else(|| format!("{port:?}"), str::to_string)
                })
                .collect(),
        })
    }
}
