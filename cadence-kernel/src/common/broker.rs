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
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::*;

use crate::common::ListenerId;
use crate::message::KernelEvent;
use crate::traits::EventListener;

/// Fan-out point for kernel events.
///
/// The broker keeps a thread-safe map of listeners keyed by the id handed out
/// at registration and delivers every published event to each of them. No
/// ordering between listeners is guaranteed.
///
/// One broker is normally installed on the top-level actor; components find
/// it by walking up their containment chain.
#[derive(Default)]
pub struct EventBroker {
    listeners: DashMap<ListenerId, Arc<dyn EventListener>>,
    next_id: AtomicU64,
}

impl EventBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener and returns the handle needed to remove it.
    pub fn add_listener(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.insert(id, listener);
        trace!(listener = id.0, "listener added");
        id
    }

    /// Removes a listener. Returns false when the id was unknown.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Delivers an event to every listener.
    pub fn publish(&self, event: impl Into<KernelEvent>) {
        let event = event.into();
        // Snapshot first so listeners may (un)register without deadlocking the shard locks.
        let listeners: Vec<Arc<dyn EventListener>> = self
            .listeners
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for listener in listeners {
            listener.on_event(&event);
        }
    }
}

impl EventListener for EventBroker {
    fn on_event(&self, event: &KernelEvent) {
        self.publish(event.clone());
    }
}

impl fmt::Debug for EventBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBroker")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::RecordingListener;
    use crate::message::RunEvent;

    #[test]
    fn published_events_reach_every_listener_until_removed() {
        let broker = EventBroker::new();
        let first = Arc::new(RecordingListener::new());
        let second = Arc::new(RecordingListener::new());
        let first_id = broker.add_listener(first.clone());
        broker.add_listener(second.clone());

        broker.publish(RunEvent::Paused);
        assert!(broker.remove_listener(first_id));
        assert!(!broker.remove_listener(first_id));
        broker.publish(RunEvent::Resumed);

        assert_eq!(first.run_events(), vec![RunEvent::Paused]);
        assert_eq!(second.run_events(), vec![RunEvent::Paused, RunEvent::Resumed]);
        assert_eq!(broker.listener_count(), 1);
    }
}
