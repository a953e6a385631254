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

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::actor::ActorCell;
use crate::common::{KernelError, PortId};
use crate::message::Token;
use crate::traits::Receiver;

/// Which way tokens flow through a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    /// Receives tokens.
    Input,
    /// Sends tokens.
    Output,
    /// Both.
    InputOutput,
}

impl PortDirection {
    /// True for `Input` and `InputOutput`.
    #[must_use]
    pub const fn is_input(self) -> bool {
        matches!(self, Self::Input | Self::InputOutput)
    }

    /// True for `Output` and `InputOutput`.
    #[must_use]
    pub const fn is_output(self) -> bool {
        matches!(self, Self::Output | Self::InputOutput)
    }
}

/// Static description of a port, given when the actor is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    /// Unique within the owning actor.
    pub name: String,
    /// Flow direction.
    pub direction: PortDirection,
    /// Whether more than one channel may be connected.
    pub multiport: bool,
    /// Type name declared by the model, if any.
    pub declared_type: Option<String>,
}

impl PortSpec {
    /// A single-channel port without a declared type.
    pub fn new(name: impl Into<String>, direction: PortDirection) -> Self {
        Self {
            name: name.into(),
            direction,
            multiport: false,
            declared_type: None,
        }
    }
}

/// Shared handle to a port; connections are expressed between these.
pub type PortRef = Arc<Port>;

/// A named endpoint of an actor.
///
/// A port keeps four channel lists, all rebuilt by the director that
/// allocates receivers:
/// - `receivers`: one per incoming outside channel, read by the owner
/// - `remote`: per outgoing outside channel, the receivers written on send
/// - `inside_receivers`: for an opaque composite's output port, the
///   receivers its inner actors write into
/// - `inside_remote`: for an opaque composite's input port, the receivers of
///   inner actors that tokens are handed to
pub struct Port {
    id: PortId,
    owner: Weak<ActorCell>,
    spec: PortSpec,
    resolved_type: RwLock<Option<String>>,
    receivers: RwLock<Vec<Arc<dyn Receiver>>>,
    remote: RwLock<Vec<Vec<Arc<dyn Receiver>>>>,
    inside_receivers: RwLock<Vec<Arc<dyn Receiver>>>,
    inside_remote: RwLock<Vec<Vec<Arc<dyn Receiver>>>>,
}

impl Port {
    pub(crate) fn new(id: PortId, owner: Weak<ActorCell>, spec: PortSpec) -> Self {
        Self {
            id,
            owner,
            spec,
            resolved_type: RwLock::new(None),
            receivers: RwLock::new(Vec::new()),
            remote: RwLock::new(Vec::new()),
            inside_receivers: RwLock::new(Vec::new()),
            inside_remote: RwLock::new(Vec::new()),
        }
    }

    /// Identity of the port.
    #[must_use]
    pub const fn id(&self) -> PortId {
        self.id
    }

    /// Name within the owning actor.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Owner's full name followed by the port name.
    #[must_use]
    pub fn full_name(&self) -> String {
        match self.owner() {
            Some(owner) => format!("{}.{}", owner.full_name(), self.spec.name),
            None => self.spec.name.clone(),
        }
    }

    /// The static description.
    #[must_use]
    pub const fn spec(&self) -> &PortSpec {
        &self.spec
    }

    /// Flow direction.
    #[must_use]
    pub const fn direction(&self) -> PortDirection {
        self.spec.direction
    }

    /// True when the port receives tokens.
    #[must_use]
    pub const fn is_input(&self) -> bool {
        self.spec.direction.is_input()
    }

    /// True when the port sends tokens.
    #[must_use]
    pub const fn is_output(&self) -> bool {
        self.spec.direction.is_output()
    }

    /// True for multiports.
    #[must_use]
    pub const fn is_multiport(&self) -> bool {
        self.spec.multiport
    }

    /// The owning actor, if it is still alive.
    #[must_use]
    pub fn owner(&self) -> Option<Arc<ActorCell>> {
        self.owner.upgrade()
    }

    pub(crate) fn is_owned_by(&self, cell: &ActorCell) -> bool {
        self.id.actor == cell.id()
    }

    /// Type name declared by the model.
    #[must_use]
    pub fn declared_type(&self) -> Option<&str> {
        self.spec.declared_type.as_deref()
    }

    /// Type name assigned by the type resolver.
    #[must_use]
    pub fn resolved_type(&self) -> Option<String> {
        self.resolved_type.read().clone()
    }

    /// Called by a [`TypeResolver`](crate::traits::TypeResolver).
    pub fn set_resolved_type(&self, type_name: impl Into<String>) {
        *self.resolved_type.write() = Some(type_name.into());
    }

    /// Number of outside channels: incoming for input ports, outgoing otherwise.
    #[must_use]
    pub fn width(&self) -> usize {
        if self.is_input() {
            self.receivers.read().len()
        } else {
            self.remote.read().len()
        }
    }

    /// Number of outgoing outside channels.
    #[must_use]
    pub fn output_width(&self) -> usize {
        self.remote.read().len()
    }

    /// The receiver of an incoming channel.
    pub fn receiver(&self, channel: usize) -> Result<Arc<dyn Receiver>, KernelError> {
        if !self.is_input() {
            return Err(KernelError::illegal(format!(
                "{} is not an input port",
                self.full_name()
            )));
        }
        let receivers = self.receivers.read();
        receivers.get(channel).cloned().ok_or_else(|| {
            KernelError::illegal(format!(
                "{} has no channel {channel} (width {})",
                self.full_name(),
                receivers.len()
            ))
        })
    }

    /// Every incoming receiver, in channel order.
    #[must_use]
    pub fn receivers(&self) -> Vec<Arc<dyn Receiver>> {
        self.receivers.read().clone()
    }

    /// The receivers written when sending on `channel`. Empty when the
    /// channel is not connected.
    pub fn remote_receivers(&self, channel: usize) -> Result<Vec<Arc<dyn Receiver>>, KernelError> {
        if !self.is_output() {
            return Err(KernelError::illegal(format!(
                "{} is not an output port",
                self.full_name()
            )));
        }
        Ok(self.remote.read().get(channel).cloned().unwrap_or_default())
    }

    /// Puts `token` into every receiver of outgoing `channel` and returns how
    /// many accepted it.
    ///
    /// A receiver retired by a topology change while the put waited is
    /// skipped, and the channel's current receivers are consulted again so a
    /// replacement link still gets the token.
    pub(crate) async fn deliver(&self, channel: usize, token: &Token) -> Result<usize, KernelError> {
        let mut attempted: Vec<Arc<dyn Receiver>> = Vec::new();
        let mut accepted = 0;
        loop {
            let pending: Vec<_> = self
                .remote_receivers(channel)?
                .into_iter()
                .filter(|r| !attempted.iter().any(|a| Arc::ptr_eq(a, r)))
                .collect();
            if pending.is_empty() {
                return Ok(accepted);
            }
            let mut retired = false;
            for receiver in pending {
                match receiver.put(token.clone()).await {
                    Ok(()) => accepted += 1,
                    Err(KernelError::LinkRetired) => retired = true,
                    Err(e) => return Err(e),
                }
                attempted.push(receiver);
            }
            if !retired {
                return Ok(accepted);
            }
        }
    }

    pub(crate) fn inside_receivers(&self) -> Vec<Arc<dyn Receiver>> {
        self.inside_receivers.read().clone()
    }

    pub(crate) fn all_remote_receivers(&self) -> Vec<Arc<dyn Receiver>> {
        self.remote.read().iter().flatten().cloned().collect()
    }

    pub(crate) fn all_inside_remote_receivers(&self) -> Vec<Arc<dyn Receiver>> {
        self.inside_remote.read().iter().flatten().cloned().collect()
    }

    /// Drops the outside channel lists.
    pub(crate) fn clear_outside(&self) {
        self.receivers.write().clear();
        self.remote.write().clear();
    }

    /// Drops the inside channel lists.
    pub(crate) fn clear_inside(&self) {
        self.inside_receivers.write().clear();
        self.inside_remote.write().clear();
    }

    /// Appends an incoming outside channel and returns its index.
    pub(crate) fn push_receiver(&self, receiver: Arc<dyn Receiver>) -> usize {
        let mut receivers = self.receivers.write();
        receivers.push(receiver);
        receivers.len() - 1
    }

    /// Appends an inside channel of an output port and returns its index.
    pub(crate) fn push_inside_receiver(&self, receiver: Arc<dyn Receiver>) -> usize {
        let mut receivers = self.inside_receivers.write();
        receivers.push(receiver);
        receivers.len() - 1
    }

    /// Sets the destinations of an outgoing outside channel.
    pub(crate) fn set_remote(&self, channel: usize, receivers: Vec<Arc<dyn Receiver>>) {
        let mut remote = self.remote.write();
        if remote.len() <= channel {
            remote.resize_with(channel + 1, Vec::new);
        }
        remote[channel] = receivers;
    }

    /// Sets the destinations of an inside channel of an input port.
    pub(crate) fn set_inside_remote(&self, channel: usize, receivers: Vec<Arc<dyn Receiver>>) {
        let mut remote = self.inside_remote.write();
        if remote.len() <= channel {
            remote.resize_with(channel + 1, Vec::new);
        }
        remote[channel] = receivers;
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("name", &self.full_name())
            .field("direction", &self.spec.direction)
            .field("width", &self.width())
            .finish()
    }
}
