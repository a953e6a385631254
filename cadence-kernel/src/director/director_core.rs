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

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::*;

use crate::actor::ActorCell;
use crate::aspect::AspectRegistry;
use crate::common::{ActorId, ChangeRequest, KernelConfig, KernelError, Time};
use crate::traits::Initializable;

/// Bookkeeping shared by every director.
///
/// Concrete directors embed one and hand it out through
/// [`Director::core`](crate::traits::Director::core).
pub struct DirectorCore {
    name: String,
    container: RwLock<Weak<ActorCell>>,
    new_actors: Mutex<Vec<Arc<ActorCell>>>,
    finished: AtomicBool,
    running: AtomicBool,
    stop_requested: AtomicBool,
    model_time: Mutex<Time>,
    wakeups: Mutex<BTreeMap<Time, Vec<ActorId>>>,
    aspects: AspectRegistry,
    initializables: RwLock<Vec<Arc<dyn Initializable>>>,
    changes: Mutex<VecDeque<ChangeRequest>>,
    config: KernelConfig,
}

impl DirectorCore {
    /// Bookkeeping for a director called `name`.
    pub fn new(name: impl Into<String>, config: KernelConfig) -> Self {
        let start = config.start_time();
        Self {
            name: name.into(),
            container: RwLock::new(Weak::new()),
            new_actors: Mutex::new(Vec::new()),
            finished: AtomicBool::new(false),
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            model_time: Mutex::new(start),
            wakeups: Mutex::new(BTreeMap::new()),
            aspects: AspectRegistry::new(),
            initializables: RwLock::new(Vec::new()),
            changes: Mutex::new(VecDeque::new()),
            config,
        }
    }

    /// Name used in logs and events.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration the director was built with.
    pub const fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub(crate) fn set_container(&self, container: Weak<ActorCell>) {
        *self.container.write() = container;
    }

    /// The composite being executed.
    pub fn container(&self) -> Option<Arc<ActorCell>> {
        self.container.read().upgrade()
    }

    pub(crate) fn require_container(&self) -> Result<Arc<ActorCell>, KernelError> {
        self.container().ok_or_else(|| {
            KernelError::illegal(format!("director {} is not attached to a composite", self.name))
        })
    }

    /// Current model time.
    pub fn model_time(&self) -> Time {
        *self.model_time.lock()
    }

    pub(crate) fn set_model_time(&self, time: Time) {
        *self.model_time.lock() = time;
    }

    /// Records that `actor` wants to iterate at `time`; never earlier than now.
    pub(crate) fn schedule_wakeup(&self, actor: ActorId, time: Time) -> Time {
        let granted = time.max(self.model_time());
        self.wakeups.lock().entry(granted).or_default().push(actor);
        granted
    }

    /// Earliest pending wake-up.
    pub fn next_wakeup(&self) -> Option<Time> {
        self.wakeups.lock().keys().next().copied()
    }

    /// Removes and returns the actors whose wake-ups are due at or before `time`.
    pub(crate) fn take_wakeups_until(&self, time: Time) -> Vec<ActorId> {
        let mut wakeups = self.wakeups.lock();
        let mut due = Vec::new();
        while let Some(entry) = wakeups.first_entry() {
            if *entry.key() > time {
                break;
            }
            due.extend(entry.remove());
        }
        due
    }

    pub(crate) fn register_new_actor(&self, actor: Arc<ActorCell>) {
        trace!(director = %self.name, actor = %actor.full_name(), "new actor registered");
        self.new_actors.lock().push(actor);
    }

    pub(crate) fn new_actors(&self) -> Vec<Arc<ActorCell>> {
        self.new_actors.lock().clone()
    }

    pub(crate) fn clear_new_actors(&self) {
        self.new_actors.lock().clear();
    }

    pub(crate) fn take_new_actors(&self) -> Vec<Arc<ActorCell>> {
        std::mem::take(&mut *self.new_actors.lock())
    }

    /// True once the director decided the run is over.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub(crate) fn set_finished(&self, finished: bool) {
        self.finished.store(finished, Ordering::Release);
    }

    /// True while a run is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// True once `stop` was called during this run.
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    pub(crate) fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    /// Clears per-run state at the start of a run.
    pub(crate) fn begin_run(&self) {
        self.finished.store(false, Ordering::Release);
        self.stop_requested.store(false, Ordering::Release);
        self.running.store(true, Ordering::Release);
        self.wakeups.lock().clear();
        self.set_model_time(self.config.start_time());
    }

    pub(crate) fn push_change(&self, change: ChangeRequest) {
        debug!(director = %self.name, change = change.description(), "change requested");
        self.changes.lock().push_back(change);
    }

    /// True when change requests wait to be applied.
    pub fn has_pending_changes(&self) -> bool {
        !self.changes.lock().is_empty()
    }

    /// Executes every queued change request against `container`, in order.
    /// Requests queued while applying are applied too.
    pub(crate) fn apply_changes(&self, container: &Arc<ActorCell>) -> Result<usize, KernelError> {
        let mut applied = 0;
        loop {
            let Some(change) = self.changes.lock().pop_front() else {
                return Ok(applied);
            };
            debug!(director = %self.name, change = change.description(), "applying change");
            change.execute(container)?;
            applied += 1;
        }
    }

    /// Resource schedulers of this director.
    pub const fn aspects(&self) -> &AspectRegistry {
        &self.aspects
    }

    pub(crate) fn add_initializable(&self, initializable: Arc<dyn Initializable>) {
        self.initializables.write().push(initializable);
    }

    pub(crate) fn remove_initializable(&self, initializable: &Arc<dyn Initializable>) {
        self.initializables
            .write()
            .retain(|registered| !Arc::ptr_eq(registered, initializable));
    }

    /// Snapshot of the registered dependents.
    pub(crate) fn initializables(&self) -> Vec<Arc<dyn Initializable>> {
        self.initializables.read().clone()
    }
}

impl fmt::Debug for DirectorCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectorCore")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("finished", &self.is_finished())
            .field("model_time", &self.model_time())
            .field("aspects", &self.aspects)
            .finish_non_exhaustive()
    }
}
