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

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::*;

use crate::message::{ExecutionEvent, FiringEvent, KernelEvent, RunEvent};
use crate::traits::EventListener;

/// Keeps every event it sees, in arrival order.
///
/// Useful in tests and for reconstructing a timeline after a run.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<KernelEvent>>,
}

impl RecordingListener {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<KernelEvent> {
        self.events.lock().clone()
    }

    /// Recorded firing events.
    #[must_use]
    pub fn firing_events(&self) -> Vec<FiringEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                KernelEvent::Firing(firing) => Some(firing.clone()),
                _ => None,
            })
            .collect()
    }

    /// Recorded resource scheduling events.
    #[must_use]
    pub fn execution_events(&self) -> Vec<ExecutionEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                KernelEvent::Execution(execution) => Some(execution.clone()),
                _ => None,
            })
            .collect()
    }

    /// Recorded run-level events.
    #[must_use]
    pub fn run_events(&self) -> Vec<RunEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                KernelEvent::Run(run) => Some(run.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forgets everything recorded.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventListener for RecordingListener {
    fn on_event(&self, event: &KernelEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Forwards events into a tokio channel, for consumers living on another task.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    sender: mpsc::UnboundedSender<KernelEvent>,
}

impl ChannelListener {
    /// Creates the listener together with the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<KernelEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventListener for ChannelListener {
    fn on_event(&self, event: &KernelEvent) {
        if self.sender.send(event.clone()).is_err() {
            trace!("event channel closed; dropping event");
        }
    }
}

/// Writes every event to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl EventListener for TracingListener {
    fn on_event(&self, event: &KernelEvent) {
        match event {
            KernelEvent::Firing(firing) => debug!(
                actor = %firing.actor_name,
                kind = ?firing.kind,
                time = %firing.time,
                "firing"
            ),
            KernelEvent::Execution(execution) => debug!(
                scheduler = %execution.scheduler,
                actor = %execution.actor_name,
                request = execution.request_id,
                kind = ?execution.kind,
                time = %execution.time,
                "execution"
            ),
            KernelEvent::Run(run) => debug!(event = ?run, "run"),
        }
    }
}
