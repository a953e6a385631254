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

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::common::KernelError;

/// Where an actor is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Built, never run.
    Constructed,
    /// `preinitialize` done.
    Preinitialized,
    /// Initialized and between iterations.
    Ready,
    /// `prefire` returned true.
    Prefired,
    /// At least one `fire` since the last `prefire`.
    Fired,
    /// `wrapup` done. A new run may start.
    WrappedUp,
    /// `terminate` was called. Only a new run's `preinitialize` is accepted.
    Terminated,
}

/// A lifecycle call, checked against the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LifecyclePhase {
    Preinitialize,
    Initialize,
    Prefire,
    Fire,
    Postfire,
    Wrapup,
}

/// Enforces the mandated order of lifecycle calls on one actor.
#[derive(Debug)]
pub(crate) struct LifecycleTracker {
    state: Mutex<LifecycleState>,
}

impl Default for LifecycleTracker {
    fn default() -> Self {
        Self {
            state: Mutex::new(LifecycleState::Constructed),
        }
    }
}

impl LifecycleTracker {
    pub(crate) fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Checks that `phase` may start now. Returns false when the call is a
    /// no-op: `wrapup` of an actor whose run never started.
    pub(crate) fn check(&self, phase: LifecyclePhase, actor: &str) -> Result<bool, KernelError> {
        use LifecyclePhase as P;
        use LifecycleState as S;

        let state = *self.state.lock();
        let allowed = match phase {
            P::Preinitialize => matches!(state, S::Constructed | S::WrappedUp | S::Terminated),
            P::Initialize => state == S::Preinitialized,
            P::Prefire => state == S::Ready,
            P::Fire | P::Postfire => matches!(state, S::Prefired | S::Fired),
            P::Wrapup => {
                if state == S::Constructed {
                    return Ok(false);
                }
                matches!(state, S::Preinitialized | S::Ready | S::Prefired | S::Fired)
            }
        };
        if allowed {
            Ok(true)
        } else {
            Err(KernelError::illegal(format!(
                "{phase:?} called on {actor} while {state:?}"
            )))
        }
    }

    pub(crate) fn set(&self, state: LifecycleState) {
        let mut current = self.state.lock();
        if *current != LifecycleState::Terminated || state == LifecycleState::Constructed {
            *current = state;
        }
    }

    /// Records a forced halt; only a fresh [`reset`](Self::reset) leaves it.
    pub(crate) fn terminate(&self) {
        *self.state.lock() = LifecycleState::Terminated;
    }

    pub(crate) fn reset(&self) {
        *self.state.lock() = LifecycleState::Constructed;
    }
}

/// Cooperative control flags, readable without locking the actor.
#[derive(Debug, Default)]
pub struct ExecutionFlags {
    stop: AtomicBool,
    stop_fire: AtomicBool,
    terminated: AtomicBool,
}

impl ExecutionFlags {
    /// True after `stop` or `terminate`.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire) || self.is_terminated()
    }

    /// True after `stop_fire`, `stop` or `terminate`.
    #[must_use]
    pub fn stop_fire_requested(&self) -> bool {
        self.stop_fire.load(Ordering::Acquire) || self.stop_requested()
    }

    /// True after `terminate`.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub(crate) fn request_stop_fire(&self) {
        self.stop_fire.store(true, Ordering::Release);
    }

    pub(crate) fn clear_stop_fire(&self) {
        self.stop_fire.store(false, Ordering::Release);
    }

    pub(crate) fn mark_terminated(&self) {
        self.terminated.store(true, Ordering::Release);
    }

    pub(crate) fn clear(&self) {
        self.stop.store(false, Ordering::Release);
        self.stop_fire.store(false, Ordering::Release);
        self.terminated.store(false, Ordering::Release);
    }
}
