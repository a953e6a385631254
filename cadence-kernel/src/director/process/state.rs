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
use tokio::sync::Notify;
use tracing::*;

use crate::common::KernelError;
use crate::receiver::{BlockKind, ThreadMonitor};

/// Thread accounting of one process-director run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ThreadCounts {
    /// Workers that have not exited.
    pub active: usize,
    /// Workers waiting for a token.
    pub read_blocked: usize,
    /// Workers waiting for room.
    pub write_blocked: usize,
    /// Workers held by a pause request.
    pub paused: usize,
}

impl ThreadCounts {
    /// Workers waiting in a receiver for either reason.
    #[must_use]
    pub const fn blocked(&self) -> usize {
        self.read_blocked + self.write_blocked
    }

    /// Every live worker is held or blocked.
    #[must_use]
    pub const fn all_held(&self) -> bool {
        self.paused + self.blocked() >= self.active
    }
}

/// Shared between the director, its workers and its receivers.
///
/// Every change of the counts wakes the director, which re-evaluates
/// completion and deadlock.
#[derive(Debug, Default)]
pub(crate) struct ProcessCoordinator {
    counts: Mutex<ThreadCounts>,
    changed: Notify,
    pause_requested: AtomicBool,
    released: Notify,
    terminate_requested: AtomicBool,
    first_error: Mutex<Option<KernelError>>,
}

impl ProcessCoordinator {
    pub(crate) fn reset(&self) {
        *self.counts.lock() = ThreadCounts::default();
        self.pause_requested.store(false, Ordering::Release);
        self.terminate_requested.store(false, Ordering::Release);
        *self.first_error.lock() = None;
    }

    pub(crate) fn counts(&self) -> ThreadCounts {
        *self.counts.lock()
    }

    fn update(&self, change: impl FnOnce(&mut ThreadCounts)) {
        {
            let mut counts = self.counts.lock();
            change(&mut counts);
            trace!(?counts, "thread counts");
        }
        self.changed.notify_waiters();
    }

    pub(crate) fn increase_active(&self) {
        self.update(|c| c.active += 1);
    }

    pub(crate) fn decrease_active(&self) {
        self.update(|c| c.active = c.active.saturating_sub(1));
    }

    /// Wakes the director without changing the counts.
    pub(crate) fn poke(&self) {
        self.changed.notify_waiters();
    }

    /// Signalled on every change of the counts, flags or error slot.
    pub(crate) const fn changes(&self) -> &Notify {
        &self.changed
    }

    /// Every live worker is blocked in a receiver and nothing is paused.
    pub(crate) fn is_deadlocked(&self) -> bool {
        let counts = self.counts();
        !self.is_pause_requested() && counts.active > 0 && counts.paused == 0 && counts.blocked() >= counts.active
    }

    pub(crate) fn record_error(&self, error: KernelError) {
        if error.is_process_terminated() {
            return;
        }
        error!(%error, "worker failed");
        self.first_error.lock().get_or_insert(error);
        self.poke();
    }

    pub(crate) fn take_error(&self) -> Option<KernelError> {
        self.first_error.lock().take()
    }

    pub(crate) fn set_pause(&self, paused: bool) {
        self.pause_requested.store(paused, Ordering::Release);
        if !paused {
            self.released.notify_waiters();
        }
        self.poke();
    }

    pub(crate) fn is_pause_requested(&self) -> bool {
        self.pause_requested.load(Ordering::Acquire)
    }

    pub(crate) fn request_terminate(&self) {
        self.terminate_requested.store(true, Ordering::Release);
        self.released.notify_waiters();
        self.poke();
    }

    pub(crate) fn is_terminate_requested(&self) -> bool {
        self.terminate_requested.load(Ordering::Acquire)
    }

    /// Holds the calling worker while a pause is requested.
    pub(crate) async fn pause_point(&self) {
        if !self.is_pause_requested() {
            return;
        }
        self.update(|c| c.paused += 1);
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();
            if !self.is_pause_requested() || self.is_terminate_requested() {
                break;
            }
            released.await;
        }
        self.update(|c| c.paused = c.paused.saturating_sub(1));
    }
}

impl ThreadMonitor for ProcessCoordinator {
    fn thread_blocked(&self, kind: BlockKind) {
        self.update(|c| match kind {
            BlockKind::Read => c.read_blocked += 1,
            BlockKind::Write => c.write_blocked += 1,
        });
    }

    fn thread_unblocked(&self, kind: BlockKind) {
        self.update(|c| match kind {
            BlockKind::Read => c.read_blocked = c.read_blocked.saturating_sub(1),
            BlockKind::Write => c.write_blocked = c.write_blocked.saturating_sub(1),
        });
    }

    fn thread_paused(&self) {
        self.update(|c| c.paused += 1);
    }

    fn thread_unpaused(&self) {
        self.update(|c| c.paused = c.paused.saturating_sub(1));
    }
}
