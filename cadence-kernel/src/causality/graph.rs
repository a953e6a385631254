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

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Debug;

/// A directed graph with deterministic iteration order.
///
/// Nodes and successor sets are kept sorted, so every query, including
/// topological order, depends only on the node and edge sets and not on
/// insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectedGraph<N: Ord> {
    successors: BTreeMap<N, BTreeSet<N>>,
}

impl<N: Ord> Default for DirectedGraph<N> {
    fn default() -> Self {
        Self {
            successors: BTreeMap::new(),
        }
    }
}

impl<N: Ord + Copy + Debug> DirectedGraph<N> {
    /// An empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node; no-op when present.
    pub fn add_node(&mut self, node: N) {
        self.successors.entry(node).or_default();
    }

    /// Adds an edge, creating missing nodes.
    pub fn add_edge(&mut self, from: N, to: N) {
        self.add_node(to);
        self.successors.entry(from).or_default().insert(to);
    }

    /// Removes an edge. Returns false when absent.
    pub fn remove_edge(&mut self, from: N, to: N) -> bool {
        self.successors
            .get_mut(&from)
            .is_some_and(|targets| targets.remove(&to))
    }

    /// True when `node` is in the graph.
    #[must_use]
    pub fn contains_node(&self, node: N) -> bool {
        self.successors.contains_key(&node)
    }

    /// True when the edge `from -> to` exists.
    #[must_use]
    pub fn has_edge(&self, from: N, to: N) -> bool {
        self.successors
            .get(&from)
            .is_some_and(|targets| targets.contains(&to))
    }

    /// Nodes in ascending order.
    pub fn nodes(&self) -> impl Iterator<Item = N> + '_ {
        self.successors.keys().copied()
    }

    /// Edges in ascending (source, sink) order.
    pub fn edges(&self) -> impl Iterator<Item = (N, N)> + '_ {
        self.successors
            .iter()
            .flat_map(|(from, targets)| targets.iter().map(move |to| (*from, *to)))
    }

    /// Direct successors of `node`.
    pub fn successors(&self, node: N) -> impl Iterator<Item = N> + '_ {
        self.successors.get(&node).into_iter().flatten().copied()
    }

    /// Direct predecessors of `node`.
    #[must_use]
    pub fn predecessors(&self, node: N) -> Vec<N> {
        self.successors
            .iter()
            .filter(|(_, targets)| targets.contains(&node))
            .map(|(from, _)| *from)
            .collect()
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.successors.len()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.successors.values().map(BTreeSet::len).sum()
    }

    /// Nodes reachable from `node` through at least one edge. `node` itself
    /// is included only when it lies on a cycle.
    #[must_use]
    pub fn reachable_from(&self, node: N) -> BTreeSet<N> {
        let mut seen = BTreeSet::new();
        let mut frontier: VecDeque<N> = self.successors(node).collect();
        while let Some(next) = frontier.pop_front() {
            if seen.insert(next) {
                frontier.extend(self.successors(next));
            }
        }
        seen
    }

    /// True when a path of length one or more leads from `from` to `to`.
    #[must_use]
    pub fn is_reachable(&self, from: N, to: N) -> bool {
        self.reachable_from(from).contains(&to)
    }

    /// Strongly connected components (Tarjan), each sorted, in the order
    /// Tarjan completes them: sinks of the condensation first.
    #[must_use]
    pub fn strongly_connected_components(&self) -> Vec<Vec<N>> {
        let nodes: Vec<N> = self.nodes().collect();
        let position: BTreeMap<N, usize> = nodes.iter().enumerate().map(|(i, n)| (*n, i)).collect();
        let adjacency: Vec<Vec<usize>> = nodes
            .iter()
            .map(|n| self.successors(*n).map(|s| position[&s]).collect())
            .collect();

        let count = nodes.len();
        let mut index = vec![usize::MAX; count];
        let mut lowlink = vec![usize::MAX; count];
        let mut on_stack = vec![false; count];
        let mut stack = Vec::new();
        let mut next_index = 0;
        let mut components = Vec::new();

        for start in 0..count {
            if index[start] != usize::MAX {
                continue;
            }
            // Iterative DFS: (node, next neighbor to visit).
            let mut dfs: Vec<(usize, usize)> = vec![(start, 0)];
            while let Some(frame) = dfs.last_mut() {
                let (v, neighbor) = *frame;
                if neighbor == 0 && index[v] == usize::MAX {
                    index[v] = next_index;
                    lowlink[v] = next_index;
                    next_index += 1;
                    stack.push(v);
                    on_stack[v] = true;
                }
                if let Some(&w) = adjacency[v].get(neighbor) {
                    frame.1 += 1;
                    if index[w] == usize::MAX {
                        dfs.push((w, 0));
                    } else if on_stack[w] {
                        lowlink[v] = lowlink[v].min(index[w]);
                    }
                    continue;
                }
                dfs.pop();
                if let Some(&(parent, _)) = dfs.last() {
                    lowlink[parent] = lowlink[parent].min(lowlink[v]);
                }
                if lowlink[v] == index[v] {
                    let mut component = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack[w] = false;
                        component.push(nodes[w]);
                        if w == v {
                            break;
                        }
                    }
                    component.sort();
                    components.push(component);
                }
            }
        }
        components
    }

    /// Every node on some cycle: members of components with more than one
    /// node, plus nodes with a self-loop.
    #[must_use]
    pub fn cycle_nodes(&self) -> BTreeSet<N> {
        self.strongly_connected_components()
            .into_iter()
            .filter(|component| {
                component.len() > 1 || component.first().is_some_and(|n| self.has_edge(*n, *n))
            })
            .flatten()
            .collect()
    }

    /// Kahn's algorithm, always taking the smallest ready node.
    ///
    /// # Errors
    ///
    /// Returns the cycle nodes when the graph is cyclic.
    pub fn topological_sort(&self) -> Result<Vec<N>, BTreeSet<N>> {
        let mut in_degree: BTreeMap<N, usize> = self.nodes().map(|n| (n, 0)).collect();
        for (_, to) in self.edges() {
            if let Some(degree) = in_degree.get_mut(&to) {
                *degree += 1;
            }
        }
        let mut ready: BTreeSet<N> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(n, _)| *n)
            .collect();
        let mut order = Vec::with_capacity(self.node_count());
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for successor in self.successors(next) {
                if let Some(degree) = in_degree.get_mut(&successor) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(successor);
                    }
                }
            }
        }
        if order.len() == self.node_count() {
            Ok(order)
        } else {
            Err(self.cycle_nodes())
        }
    }
}
