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

use tracing::*;

use crate::actor::{ActorCell, PortRef};
use crate::common::{KernelError, PortId, ReceiverContainer};
use crate::traits::{Initializable, Receiver};

/// Identity of one allocated channel, stable across reallocation as long as
/// the link itself survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct LinkKey {
    source: PortId,
    channel: usize,
    sink: PortId,
    occurrence: usize,
}

/// A channel from an opaque source to an opaque sink inside one director's
/// domain, with transparent composites' ports already traversed.
#[derive(Debug, Clone)]
pub(crate) struct Link {
    pub(crate) source: PortRef,
    /// True when the source is one of the container's own input ports.
    pub(crate) from_inside: bool,
    pub(crate) channel: usize,
    pub(crate) sink: PortRef,
    /// True when the sink is one of the container's own output ports.
    pub(crate) to_inside: bool,
}

/// Every link of the domain run by `container`'s director: outputs of deep
/// actors first, in actor order, then the container's own inputs.
pub(crate) fn deep_links(container: &Arc<ActorCell>) -> Vec<Link> {
    let mut links = Vec::new();
    for actor in container.deep_actors() {
        let Some(home) = actor.container() else {
            continue;
        };
        for port in actor.output_ports() {
            collect_links(container, &home, &port, false, &mut links);
        }
    }
    for port in container.input_ports() {
        collect_links(container, container, &port, true, &mut links);
    }
    links
}

fn collect_links(
    top: &Arc<ActorCell>,
    home: &Arc<ActorCell>,
    source: &PortRef,
    from_inside: bool,
    links: &mut Vec<Link>,
) {
    let outgoing = home
        .connections()
        .into_iter()
        .filter(|c| c.from.id() == source.id());
    for (index, connection) in outgoing.enumerate() {
        let channel = if source.is_multiport() { index } else { 0 };
        let mut visited = BTreeSet::new();
        let mut sinks = Vec::new();
        resolve_sinks(top, home, &connection.to, &mut visited, &mut sinks);
        for (sink, to_inside) in sinks {
            links.push(Link {
                source: Arc::clone(source),
                from_inside,
                channel,
                sink,
                to_inside,
            });
        }
    }
}

/// Follows `port` through transparent boundaries until it reaches the input
/// of an opaque actor or an output of `top`.
fn resolve_sinks(
    top: &Arc<ActorCell>,
    home: &Arc<ActorCell>,
    port: &PortRef,
    visited: &mut BTreeSet<PortId>,
    sinks: &mut Vec<(PortRef, bool)>,
) {
    if !visited.insert(port.id()) {
        return;
    }
    if port.is_owned_by(home) {
        if home.id() == top.id() {
            sinks.push((Arc::clone(port), true));
            return;
        }
        let Some(outer) = home.container() else {
            return;
        };
        for connection in outer.connections() {
            if connection.from.id() == port.id() {
                resolve_sinks(top, &outer, &connection.to, visited, sinks);
            }
        }
        return;
    }
    let Some(owner) = port.owner() else {
        return;
    };
    if owner.is_opaque() {
        sinks.push((Arc::clone(port), false));
    } else {
        for connection in owner.connections() {
            if connection.from.id() == port.id() {
                resolve_sinks(top, &owner, &connection.to, visited, sinks);
            }
        }
    }
}

/// Installs one receiver per link of `container`'s domain.
///
/// Receivers of links present in `previous` are reused with their buffered
/// tokens; `make` creates the others. Returns the receivers now in use.
pub(crate) fn allocate_receivers<R, F>(
    container: &Arc<ActorCell>,
    previous: &HashMap<LinkKey, Arc<R>>,
    mut make: F,
) -> HashMap<LinkKey, Arc<R>>
where
    R: Receiver + 'static,
    F: FnMut() -> Arc<R>,
{
    for actor in container.deep_actors() {
        for port in actor.ports() {
            port.clear_outside();
        }
    }
    for port in container.ports() {
        port.clear_inside();
    }

    let mut allocated = HashMap::new();
    let mut occurrences: HashMap<(PortId, usize, PortId), usize> = HashMap::new();
    let mut remote: BTreeMap<(PortId, usize), (PortRef, bool, Vec<Arc<dyn Receiver>>)> = BTreeMap::new();

    for link in deep_links(container) {
        let occurrence = occurrences
            .entry((link.source.id(), link.channel, link.sink.id()))
            .or_insert(0);
        let key = LinkKey {
            source: link.source.id(),
            channel: link.channel,
            sink: link.sink.id(),
            occurrence: *occurrence,
        };
        *occurrence += 1;

        let receiver = previous.get(&key).cloned().unwrap_or_else(&mut make);
        let shared: Arc<dyn Receiver> = Arc::clone(&receiver) as Arc<dyn Receiver>;
        let sink_channel = if link.to_inside {
            link.sink.push_inside_receiver(Arc::clone(&shared))
        } else {
            link.sink.push_receiver(Arc::clone(&shared))
        };
        receiver.set_container(Some(ReceiverContainer {
            port: link.sink.id(),
            channel: sink_channel,
            port_name: link.sink.full_name(),
        }));
        remote
            .entry((link.source.id(), link.channel))
            .or_insert_with(|| (Arc::clone(&link.source), link.from_inside, Vec::new()))
            .2
            .push(shared);
        allocated.insert(key, receiver);
    }

    for ((_, channel), (port, from_inside, receivers)) in remote {
        if from_inside {
            port.set_inside_remote(channel, receivers);
        } else {
            port.set_remote(channel, receivers);
        }
    }
    trace!(container = %container.full_name(), receivers = allocated.len(), "receivers allocated");
    allocated
}

/// Preinitializes every deep actor of `container`, including actors created
/// by other actors' preinitialize, until no new ones appear.
pub(crate) async fn preinitialize_deep(container: &Arc<ActorCell>) -> Result<(), KernelError> {
    let mut done = BTreeSet::new();
    loop {
        let pending: Vec<_> = container
            .deep_actors()
            .into_iter()
            .filter(|actor| !done.contains(&actor.id()))
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        for actor in pending {
            done.insert(actor.id());
            actor.preinitialize().await?;
        }
    }
}

/// Fails on the first port of `actors` that has no resolved type.
pub(crate) fn check_resolved_types(actors: &[Arc<ActorCell>]) -> Result<(), KernelError> {
    for actor in actors {
        if let Some(port) = actor.ports().into_iter().find(|p| p.resolved_type().is_none()) {
            return Err(KernelError::UnresolvedType {
                port: port.full_name(),
            });
        }
    }
    Ok(())
}
