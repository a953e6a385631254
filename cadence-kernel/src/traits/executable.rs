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

use async_trait::async_trait;

use crate::common::KernelError;

/// Result of [`Executable::iterate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IterationOutcome {
    /// Every requested iteration ran and the last postfire asked for more.
    Completed,
    /// Prefire returned false; nothing was fired in that iteration.
    NotReady,
    /// Postfire returned false or stop was requested.
    StopIterating,
}

/// The run-bracketing half of the lifecycle.
///
/// For one run the kernel calls `preinitialize` once (before type
/// resolution, topology may still change), `initialize` once (topology and
/// types stable, output allowed) and `wrapup` once (no output, release
/// external resources).
///
/// Any initializable may register dependent initializables; `preinitialize`,
/// `initialize` and `wrapup` are forwarded to them in registration order over
/// a snapshot, so a dependent may unregister itself while being called.
#[async_trait]
pub trait Initializable: Send + Sync {
    /// First call of a run.
    async fn preinitialize(&self) -> Result<(), KernelError>;

    /// Second call of a run.
    async fn initialize(&self) -> Result<(), KernelError>;

    /// Last call of a run.
    async fn wrapup(&self) -> Result<(), KernelError>;

    /// Registers a dependent. The default refuses the registration silently.
    fn add_initializable(&self, _initializable: Arc<dyn Initializable>) {}

    /// Unregisters a dependent by identity.
    fn remove_initializable(&self, _initializable: &Arc<dyn Initializable>) {}
}

/// The state machine every actor and director obeys.
///
/// Between `initialize` and `wrapup` the kernel runs iterations, each being
/// one `prefire`, then (if it returned true) zero or more `fire` calls, then
/// exactly one `postfire`. When [`is_fire_functional`](Self::is_fire_functional)
/// is true, repeated `fire` calls before `postfire` must not change committed
/// state.
///
/// `stop` ends the run at the next iteration boundary, `stop_fire` ends only a
/// long-running `fire`, and `terminate` halts immediately without any
/// consistency guarantee; none of the three block.
#[async_trait]
pub trait Executable: Initializable {
    /// Start of an iteration. Returns false when not ready to fire.
    async fn prefire(&self) -> Result<bool, KernelError>;

    /// Computes outputs.
    async fn fire(&self) -> Result<(), KernelError>;

    /// Commits state. Returns false when no further iterations are wanted.
    async fn postfire(&self) -> Result<bool, KernelError>;

    /// Runs `count` iterations, stopping early on a false prefire or postfire.
    async fn iterate(&self, count: u64) -> Result<IterationOutcome, KernelError> {
        for _ in 0..count {
            if !self.prefire().await? {
                return Ok(IterationOutcome::NotReady);
            }
            self.fire().await?;
            if !self.postfire().await? {
                return Ok(IterationOutcome::StopIterating);
            }
        }
        Ok(IterationOutcome::Completed)
    }

    /// Cooperative request to end the run after the current iteration.
    fn stop(&self);

    /// Cooperative request to end the current `fire`.
    fn stop_fire(&self);

    /// Immediate, non-cooperative halt.
    fn terminate(&self);

    /// True when `fire` leaves committed state untouched.
    fn is_fire_functional(&self) -> bool {
        true
    }

    /// True when every input must be known before `fire`.
    fn is_strict(&self) -> bool {
        true
    }
}
