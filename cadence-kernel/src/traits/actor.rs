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

use std::fmt::Debug;

use async_trait::async_trait;

use crate::actor::FiringContext;

/// Behavior of an atomic actor.
///
/// Implementors only write the hooks they need. The kernel wraps the value
/// in an [`ActorCell`](crate::actor::ActorCell), which enforces call order,
/// emits firing events and exposes ports through the [`FiringContext`].
///
/// Errors are plain `anyhow` errors; kernel errors raised by context calls
/// (for example a finished receiver) pass through `?` unchanged.
#[async_trait]
pub trait Actor: Send + Debug + 'static {
    /// Called once before type resolution. May edit topology.
    async fn preinitialize(&mut self, _ctx: &FiringContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once after topology and types are fixed. May send tokens.
    async fn initialize(&mut self, _ctx: &FiringContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Start of an iteration.
    async fn prefire(&mut self, _ctx: &FiringContext<'_>) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// Reads inputs and produces outputs.
    async fn fire(&mut self, ctx: &FiringContext<'_>) -> anyhow::Result<()>;

    /// Commits state; false ends this actor's participation in the run.
    async fn postfire(&mut self, _ctx: &FiringContext<'_>) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// Called once at the end of the run. Must not send tokens.
    async fn wrapup(&mut self, _ctx: &FiringContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// See [`Executable::is_fire_functional`](crate::traits::Executable::is_fire_functional).
    fn is_fire_functional(&self) -> bool {
        true
    }

    /// See [`Executable::is_strict`](crate::traits::Executable::is_strict).
    fn is_strict(&self) -> bool {
        true
    }
}
