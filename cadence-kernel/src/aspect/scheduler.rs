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

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::*;

use crate::actor::ActorCell;
use crate::aspect::{ResourceRequest, SchedulingPolicy};
use crate::common::{ActorId, EventBroker, KernelError, ListenerId, Time};
use crate::message::{ExecutionEvent, ExecutionEventKind};
use crate::traits::{EventListener, ResourceScheduler};

const TIME_RESOLUTION: f64 = 1e-9;

/// A single resource shared by decorated actors, ordered by a policy.
///
/// The resource serves one request at a time. Time only moves when the
/// director calls [`schedule`](ResourceScheduler::schedule) with a later
/// environment time; requests that complete in between are served back to
/// back, each next request starting at the previous one's stop time.
#[derive(Debug)]
pub struct PolicyScheduler<P: SchedulingPolicy> {
    name: String,
    axis: String,
    policy: P,
    current_time: Time,
    running: Option<ResourceRequest>,
    pending: Vec<ResourceRequest>,
    finished: BTreeSet<ActorId>,
    next_request_id: u64,
    next_sequence: u64,
    last_finished: bool,
    listeners: EventBroker,
}

impl<P: SchedulingPolicy> PolicyScheduler<P> {
    /// A scheduler serving `axis` with `policy`.
    pub fn new(name: impl Into<String>, axis: impl Into<String>, policy: P) -> Self {
        Self {
            name: name.into(),
            axis: axis.into(),
            policy,
            current_time: Time::ZERO,
            running: None,
            pending: Vec::new(),
            finished: BTreeSet::new(),
            next_request_id: 0,
            next_sequence: 0,
            last_finished: false,
            listeners: EventBroker::new(),
        }
    }

    /// The ordering policy.
    pub const fn policy(&self) -> &P {
        &self.policy
    }

    /// Platform time of the resource.
    pub const fn current_time(&self) -> Time {
        self.current_time
    }

    /// The request holding the resource.
    pub const fn running(&self) -> Option<&ResourceRequest> {
        self.running.as_ref()
    }

    /// Requests waiting for the resource, in arrival order.
    pub fn pending(&self) -> &[ResourceRequest] {
        &self.pending
    }

    fn emit(&self, request: &ResourceRequest, kind: ExecutionEventKind, time: Time) {
        trace!(scheduler = %self.name, actor = %request.actor_name, request = request.id, ?kind, %time);
        self.listeners.publish(ExecutionEvent::new(
            self.name.clone(),
            request.actor,
            request.actor_name.clone(),
            request.id,
            kind,
            time,
        ));
    }

    /// Serves the running request up to `time`, completing and dispatching
    /// as many requests as fit.
    fn advance_to(&mut self, time: Time) {
        while let Some(mut running) = self.running.take() {
            let elapsed = time - self.current_time;
            if running.remaining <= elapsed + TIME_RESOLUTION {
                self.current_time = self.current_time + running.remaining;
                running.remaining = 0.0;
                self.emit(&running, ExecutionEventKind::Stop, self.current_time);
                self.finished.insert(running.actor);
                self.dispatch();
            } else {
                running.remaining -= elapsed;
                self.running = Some(running);
                break;
            }
        }
        if time > self.current_time {
            self.current_time = time;
        }
    }

    fn most_urgent(&self) -> Option<usize> {
        self.pending
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| self.policy.compare(a, b).then(a.id.cmp(&b.id)))
            .map(|(index, _)| index)
    }

    /// Grants the resource to the most urgent pending request, preempting the
    /// running one when the policy allows.
    fn dispatch(&mut self) {
        let Some(best) = self.most_urgent() else {
            return;
        };
        let preempt = match &self.running {
            None => false,
            Some(running) => {
                self.policy.is_preemptive()
                    && self.policy.compare(&self.pending[best], running).is_lt()
            }
        };
        if self.running.is_some() && !preempt {
            return;
        }
        if let Some(preempted) = self.running.take() {
            self.emit(&preempted, ExecutionEventKind::Preempted, self.current_time);
            self.pending.push(preempted);
        }
        let next = self.pending.remove(best);
        self.emit(&next, ExecutionEventKind::Start, self.current_time);
        self.running = Some(next);
    }

    fn number(&mut self, actors: &[Arc<ActorCell>]) {
        for actor in actors {
            actor.set_sequence_number(&self.axis, self.next_sequence);
            self.next_sequence += 1;
        }
    }
}

impl<P: SchedulingPolicy> ResourceScheduler for PolicyScheduler<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn axis(&self) -> &str {
        &self.axis
    }

    fn initialize_decorated_actors(&mut self, actors: &[Arc<ActorCell>]) -> Result<(), KernelError> {
        self.current_time = Time::ZERO;
        self.running = None;
        self.pending.clear();
        self.finished.clear();
        self.last_finished = false;
        self.next_sequence = 0;
        self.number(actors);
        debug!(scheduler = %self.name, policy = self.policy.name(), actors = actors.len(), "decorated actors registered");
        Ok(())
    }

    fn admit_decorated_actors(&mut self, actors: &[Arc<ActorCell>]) -> Result<(), KernelError> {
        self.number(actors);
        debug!(scheduler = %self.name, actors = actors.len(), "decorated actors admitted");
        Ok(())
    }

    fn schedule(
        &mut self,
        actor: &ActorCell,
        environment_time: Time,
        deadline: Time,
        execution_time: f64,
    ) -> Result<Option<f64>, KernelError> {
        if !execution_time.is_finite() || execution_time < 0.0 {
            return Err(KernelError::Unschedulable {
                scheduler: self.name.clone(),
                actor: actor.full_name(),
                reason: format!("execution time {execution_time} is not a finite, non-negative number"),
            });
        }
        self.advance_to(environment_time);
        self.last_finished = false;

        let id = actor.id();
        if self.finished.remove(&id) {
            self.last_finished = true;
        } else if !self.is_waiting_for_resource(id) {
            let request = ResourceRequest {
                id: self.next_request_id,
                actor: id,
                actor_name: actor.full_name(),
                arrival: self.current_time,
                deadline,
                priority: actor.aspect_attributes(&self.axis).map_or(0, |a| a.priority),
                execution_time,
                remaining: execution_time,
            };
            self.next_request_id += 1;
            if execution_time <= TIME_RESOLUTION {
                self.emit(&request, ExecutionEventKind::Start, self.current_time);
                self.emit(&request, ExecutionEventKind::Stop, self.current_time);
                self.last_finished = true;
            } else {
                self.pending.push(request);
            }
        }
        self.dispatch();
        Ok(self.running.as_ref().map(|running| running.remaining))
    }

    fn is_waiting_for_resource(&self, actor: ActorId) -> bool {
        self.running.as_ref().is_some_and(|r| r.actor == actor)
            || self.pending.iter().any(|r| r.actor == actor)
    }

    fn last_scheduled_actor_finished(&self) -> bool {
        self.last_finished
    }

    fn wrapup(&mut self) -> Result<(), KernelError> {
        let outstanding = self.pending.len() + usize::from(self.running.is_some());
        if outstanding > 0 {
            warn!(scheduler = %self.name, outstanding, "dropping unfinished requests at wrapup");
        }
        self.running = None;
        self.pending.clear();
        self.finished.clear();
        Ok(())
    }

    fn add_listener(&mut self, listener: Arc<dyn EventListener>) -> ListenerId {
        self.listeners.add_listener(listener)
    }

    fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove_listener(id)
    }
}
