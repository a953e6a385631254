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

//! Discrete events emitted by the kernel.
//!
//! The stream is complete enough for an external renderer to rebuild a
//! timeline: every firing phase, every resource grant, and every change in the
//! run's state is reported.

use derive_new::new;

use crate::common::{ActorId, ManagerState, Time};

/// Phase of an actor iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FiringEventKind {
    /// About to call prefire.
    BeforePrefire,
    /// Prefire returned.
    AfterPrefire,
    /// About to call fire.
    BeforeFire,
    /// Fire returned.
    AfterFire,
    /// About to call postfire.
    BeforePostfire,
    /// Postfire returned.
    AfterPostfire,
    /// About to run a batch of iterations.
    BeforeIterate,
    /// A batch of iterations finished.
    AfterIterate,
}

/// An actor moved through a phase of its iteration.
#[derive(Debug, Clone, PartialEq, new)]
pub struct FiringEvent {
    /// The actor.
    pub actor: ActorId,
    /// Its full name.
    pub actor_name: String,
    /// Phase.
    pub kind: FiringEventKind,
    /// Model time of the actor's director when the phase happened.
    pub time: Time,
}

/// What a resource scheduler did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionEventKind {
    /// The actor was granted the resource.
    Start,
    /// The actor's request completed.
    Stop,
    /// The actor lost the resource to a more urgent request.
    Preempted,
}

/// A resource scheduler changed the state of a request.
#[derive(Debug, Clone, PartialEq, new)]
pub struct ExecutionEvent {
    /// Name of the scheduler.
    pub scheduler: String,
    /// The decorated actor.
    pub actor: ActorId,
    /// Its full name.
    pub actor_name: String,
    /// Identity of the request, unique per scheduler.
    pub request_id: u64,
    /// What happened.
    pub kind: ExecutionEventKind,
    /// Platform time of the scheduler.
    pub time: Time,
}

/// Run-level notifications.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum RunEvent {
    /// The manager entered a new state.
    StateChanged(ManagerState),
    /// Every worker has reached a pause point.
    Paused,
    /// Execution continues after a pause.
    Resumed,
    /// Every live worker of a process director is blocked.
    Deadlock {
        /// Full name of the composite whose director detected it.
        container: String,
        /// True when pending work (mutations, queue growth) can resolve it.
        artificial: bool,
    },
    /// The run failed.
    Error(String),
    /// The run was terminated forcefully.
    Terminated,
    /// The run finished normally.
    Finished,
}

/// Everything a listener can observe.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelEvent {
    /// Actor iteration phases.
    Firing(FiringEvent),
    /// Resource scheduling.
    Execution(ExecutionEvent),
    /// Run-level changes.
    Run(RunEvent),
}

impl From<FiringEvent> for KernelEvent {
    fn from(event: FiringEvent) -> Self {
        Self::Firing(event)
    }
}

impl From<ExecutionEvent> for KernelEvent {
    fn from(event: ExecutionEvent) -> Self {
        Self::Execution(event)
    }
}

impl From<RunEvent> for KernelEvent {
    fn from(event: RunEvent) -> Self {
        Self::Run(event)
    }
}
