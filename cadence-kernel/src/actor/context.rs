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

use tracing::*;

use crate::actor::ActorCell;
use crate::common::{KernelError, Time};
use crate::message::Token;

/// What an actor sees of the kernel while one of its hooks runs.
///
/// Port access goes through here so the kernel can swap receivers between
/// runs without the actor noticing.
#[derive(Debug, Clone, Copy)]
pub struct FiringContext<'a> {
    cell: &'a ActorCell,
}

impl<'a> FiringContext<'a> {
    pub(crate) const fn new(cell: &'a ActorCell) -> Self {
        Self { cell }
    }

    /// The cell being fired.
    #[must_use]
    pub const fn cell(&self) -> &'a ActorCell {
        self.cell
    }

    /// Full name of the actor.
    #[must_use]
    pub fn actor_name(&self) -> String {
        self.cell.full_name()
    }

    /// Takes the next token from `channel` of input `port`.
    ///
    /// Under the process director this waits for a token; a
    /// [`KernelError::ProcessTerminated`] means the run is ending and should be
    /// propagated with `?`.
    ///
    /// When a topology change retires the receiver being waited on, the
    /// channel is looked up again; an actor that is itself being removed gets
    /// `ProcessTerminated` instead.
    pub async fn get(&self, port: &str, channel: usize) -> Result<Token, KernelError> {
        let port = self.cell.require_port(port)?;
        let mut receiver = port.receiver(channel)?;
        loop {
            match receiver.get().await {
                Err(KernelError::LinkRetired) => {
                    if self.cell.flags().stop_requested() {
                        return Err(KernelError::ProcessTerminated);
                    }
                    let current = port.receiver(channel)?;
                    if Arc::ptr_eq(&current, &receiver) {
                        return Err(KernelError::LinkRetired);
                    }
                    trace!(actor = %self.cell.full_name(), port = port.name(), channel, "reading from rewired channel");
                    receiver = current;
                }
                other => return other,
            }
        }
    }

    /// Sends `token` on `channel` of output `port`. Tokens sent on an
    /// unconnected channel are discarded.
    pub async fn send(&self, port: &str, channel: usize, token: Token) -> Result<(), KernelError> {
        let accepted = self.cell.require_port(port)?.deliver(channel, &token).await?;
        if accepted == 0 {
            trace!(actor = %self.cell.full_name(), port, channel, "discarding token on unconnected channel");
        }
        Ok(())
    }

    /// Sends `token` on every channel of output `port`.
    pub async fn broadcast(&self, port: &str, token: Token) -> Result<(), KernelError> {
        let width = self.cell.require_port(port)?.output_width();
        for channel in 0..width {
            self.send(port, channel, token.clone()).await?;
        }
        Ok(())
    }

    /// True when `get(port, channel)` would return without waiting.
    #[must_use]
    pub fn has_token(&self, port: &str, channel: usize) -> bool {
        self.cell
            .require_port(port)
            .and_then(|p| p.receiver(channel))
            .is_ok_and(|receiver| receiver.has_token())
    }

    /// True when `send(port, channel, ..)` would return without waiting.
    #[must_use]
    pub fn has_room(&self, port: &str, channel: usize) -> bool {
        self.cell
            .require_port(port)
            .and_then(|p| p.remote_receivers(channel))
            .is_ok_and(|destinations| destinations.iter().all(|r| r.has_room()))
    }

    /// False while the channel is in the unknown state of a fixed-point
    /// iteration.
    #[must_use]
    pub fn is_known(&self, port: &str, channel: usize) -> bool {
        self.cell
            .require_port(port)
            .and_then(|p| p.receiver(channel))
            .is_ok_and(|receiver| receiver.is_known())
    }

    /// Number of channels connected to `port`, zero for unknown ports.
    #[must_use]
    pub fn width(&self, port: &str) -> usize {
        self.cell.port(port).map_or(0, |p| p.width())
    }

    /// Current model time of the actor's director.
    #[must_use]
    pub fn model_time(&self) -> Time {
        self.cell.model_time()
    }

    /// Requests another iteration at `time`. Returns the time granted.
    pub fn fire_at(&self, time: Time) -> Result<Time, KernelError> {
        let director = self.cell.director().ok_or_else(|| {
            KernelError::illegal(format!("{} has no director", self.cell.full_name()))
        })?;
        director.fire_at(self.cell, time)
    }

    /// True once the run should end at the next iteration boundary.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.cell.flags().stop_requested()
    }

    /// True once a long-running `fire` should return.
    #[must_use]
    pub fn stop_fire_requested(&self) -> bool {
        self.cell.flags().stop_fire_requested()
    }
}
