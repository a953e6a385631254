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

use std::cmp::Ordering;
use std::fmt::Debug;

use crate::common::{ActorId, Time};

/// One firing waiting for, or holding, a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRequest {
    /// Arrival order within the scheduler; the tie-breaker of every policy.
    pub id: u64,
    /// Requesting actor.
    pub actor: ActorId,
    /// Its full name.
    pub actor_name: String,
    /// Platform time of arrival.
    pub arrival: Time,
    /// Absolute deadline.
    pub deadline: Time,
    /// Priority copied from the actor's decoration.
    pub priority: i64,
    /// Declared cost.
    pub execution_time: f64,
    /// Cost still to be served.
    pub remaining: f64,
}

/// Ordering of requests competing for one resource.
pub trait SchedulingPolicy: Send + Sync + Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// True when a more urgent arrival takes the resource from the running request.
    fn is_preemptive(&self) -> bool;

    /// `Less` when `a` is more urgent than `b`. Equal requests are served in
    /// arrival order.
    fn compare(&self, a: &ResourceRequest, b: &ResourceRequest) -> Ordering;
}

/// First come, first served. Never preempts.
#[derive(Debug, Default, Clone, Copy)]
pub struct Fifo;

impl SchedulingPolicy for Fifo {
    fn name(&self) -> &'static str {
        "fifo"
    }

    fn is_preemptive(&self) -> bool {
        false
    }

    fn compare(&self, _a: &ResourceRequest, _b: &ResourceRequest) -> Ordering {
        Ordering::Equal
    }
}

/// Lowest priority value first, preemptive.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedPriority;

impl SchedulingPolicy for FixedPriority {
    fn name(&self) -> &'static str {
        "fixed-priority"
    }

    fn is_preemptive(&self) -> bool {
        true
    }

    fn compare(&self, a: &ResourceRequest, b: &ResourceRequest) -> Ordering {
        a.priority.cmp(&b.priority)
    }
}

/// Earliest absolute deadline first, preemptive.
#[derive(Debug, Default, Clone, Copy)]
pub struct EarliestDeadlineFirst;

impl SchedulingPolicy for EarliestDeadlineFirst {
    fn name(&self) -> &'static str {
        "edf"
    }

    fn is_preemptive(&self) -> bool {
        true
    }

    fn compare(&self, a: &ResourceRequest, b: &ResourceRequest) -> Ordering {
        a.deadline.cmp(&b.deadline)
    }
}
