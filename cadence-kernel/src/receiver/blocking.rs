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

use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;

use crate::common::{KernelError, ReceiverContainer};
use crate::message::Token;
use crate::traits::Receiver;

/// Why a task is waiting inside a blocking receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// Waiting for a token.
    Read,
    /// Waiting for room.
    Write,
}

/// Observer of the tasks waiting in blocking receivers.
///
/// Every `thread_blocked` is matched by exactly one `thread_unblocked` of the
/// same kind, and every `thread_paused` by one `thread_unpaused`. Calls are
/// made while the receiver's lock is held, so implementations must not call
/// back into the receiver.
pub trait ThreadMonitor: Send + Sync + Debug {
    /// A task started waiting.
    fn thread_blocked(&self, kind: BlockKind);
    /// A waiting task can proceed.
    fn thread_unblocked(&self, kind: BlockKind);
    /// A task is held by a pause request.
    fn thread_paused(&self);
    /// A held task was released.
    fn thread_unpaused(&self);
}

#[derive(Debug)]
struct BlockingState {
    tokens: VecDeque<Token>,
    capacity: usize,
    paused: bool,
    finished: bool,
    retired: bool,
    read_blocked: bool,
    write_blocked: bool,
    reader_paused: bool,
    writer_paused: bool,
}

/// Bounded FIFO receiver whose `get` and `put` wait instead of failing.
///
/// One reader and one writer per receiver. Block and pause transitions are
/// reported to the [`ThreadMonitor`], and the side that releases a waiting
/// task reports the release itself, so the monitor never counts a task as
/// blocked once it can proceed.
///
/// While paused, a task that could proceed is held instead; a task with
/// nothing to do stays blocked. Once finished, every waiting and future call
/// fails with [`KernelError::ProcessTerminated`]; once retired, with
/// [`KernelError::LinkRetired`].
pub struct BlockingQueueReceiver {
    state: Mutex<BlockingState>,
    notify: Notify,
    monitor: Option<Arc<dyn ThreadMonitor>>,
    owner: RwLock<Option<ReceiverContainer>>,
}

impl BlockingQueueReceiver {
    /// A receiver reporting to `monitor`.
    #[must_use]
    pub fn new(capacity: usize, monitor: Option<Arc<dyn ThreadMonitor>>) -> Self {
        Self {
            state: Mutex::new(BlockingState {
                tokens: VecDeque::new(),
                capacity: capacity.max(1),
                paused: false,
                finished: false,
                retired: false,
                read_blocked: false,
                write_blocked: false,
                reader_paused: false,
                writer_paused: false,
            }),
            notify: Notify::new(),
            monitor,
            owner: RwLock::new(None),
        }
    }

    fn report(&self, event: impl FnOnce(&dyn ThreadMonitor)) {
        if let Some(monitor) = &self.monitor {
            event(monitor.as_ref());
        }
    }

    fn release_reader(&self, state: &mut BlockingState) {
        if state.read_blocked {
            state.read_blocked = false;
            self.report(|m| m.thread_unblocked(BlockKind::Read));
        }
        if state.reader_paused {
            state.reader_paused = false;
            self.report(|m| m.thread_unpaused());
        }
    }

    fn release_writer(&self, state: &mut BlockingState) {
        if state.write_blocked {
            state.write_blocked = false;
            self.report(|m| m.thread_unblocked(BlockKind::Write));
        }
        if state.writer_paused {
            state.writer_paused = false;
            self.report(|m| m.thread_unpaused());
        }
    }

    /// Holds (true) or releases (false) tasks that could otherwise proceed.
    pub fn request_pause(&self, paused: bool) {
        self.state.lock().paused = paused;
        self.notify.notify_waiters();
    }

    /// Ends the run for every task using this receiver.
    pub fn request_finish(&self) {
        self.state.lock().finished = true;
        self.notify.notify_waiters();
    }

    /// Removes the receiver from the topology. Waiting and future calls fail
    /// with [`KernelError::LinkRetired`] so the caller can look its channel up
    /// again.
    pub fn retire(&self) {
        self.state.lock().retired = true;
        self.notify.notify_waiters();
    }

    /// Clears tokens and flags for a new run. A task still recorded as
    /// blocked or paused is reported released first.
    pub fn restart(&self) {
        {
            let mut state = self.state.lock();
            self.release_reader(&mut state);
            self.release_writer(&mut state);
            state.tokens.clear();
            state.paused = false;
            state.finished = false;
            state.retired = false;
        }
        self.notify.notify_waiters();
    }

    /// Changes the capacity. A writer waiting for room is released when the
    /// new capacity leaves some.
    pub fn set_capacity(&self, capacity: usize) {
        {
            let mut state = self.state.lock();
            state.capacity = capacity.max(1);
            if state.write_blocked && state.tokens.len() < state.capacity {
                state.write_blocked = false;
                self.report(|m| m.thread_unblocked(BlockKind::Write));
            }
        }
        self.notify.notify_waiters();
    }

    /// Current capacity.
    #[must_use]
    pub fn current_capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// True while a reader waits for a token.
    #[must_use]
    pub fn is_read_blocked(&self) -> bool {
        self.state.lock().read_blocked
    }

    /// True while a writer waits for room.
    #[must_use]
    pub fn is_write_blocked(&self) -> bool {
        self.state.lock().write_blocked
    }

    /// True once [`request_finish`](Self::request_finish) was called.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.lock().finished
    }

    /// True once [`retire`](Self::retire) was called.
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.state.lock().retired
    }
}

#[async_trait]
impl Receiver for BlockingQueueReceiver {
    fn has_token(&self) -> bool {
        !self.state.lock().tokens.is_empty()
    }

    fn has_room(&self) -> bool {
        let state = self.state.lock();
        state.tokens.len() < state.capacity
    }

    fn size(&self) -> usize {
        self.state.lock().tokens.len()
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.state.lock().capacity)
    }

    async fn get(&self) -> Result<Token, KernelError> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.state.lock();
                if state.finished {
                    self.release_reader(&mut state);
                    return Err(KernelError::ProcessTerminated);
                }
                if state.retired {
                    self.release_reader(&mut state);
                    return Err(KernelError::LinkRetired);
                }
                if !state.paused {
                    if let Some(token) = state.tokens.pop_front() {
                        self.release_reader(&mut state);
                        if state.write_blocked {
                            state.write_blocked = false;
                            self.report(|m| m.thread_unblocked(BlockKind::Write));
                        }
                        drop(state);
                        self.notify.notify_waiters();
                        return Ok(token);
                    }
                }
                if state.tokens.is_empty() {
                    if state.reader_paused {
                        state.reader_paused = false;
                        self.report(|m| m.thread_unpaused());
                    }
                    if !state.read_blocked {
                        state.read_blocked = true;
                        self.report(|m| m.thread_blocked(BlockKind::Read));
                    }
                } else {
                    if state.read_blocked {
                        state.read_blocked = false;
                        self.report(|m| m.thread_unblocked(BlockKind::Read));
                    }
                    if !state.reader_paused {
                        state.reader_paused = true;
                        self.report(|m| m.thread_paused());
                    }
                }
            }
            notified.await;
        }
    }

    async fn put(&self, token: Token) -> Result<(), KernelError> {
        let mut token = Some(token);
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.state.lock();
                if state.finished {
                    self.release_writer(&mut state);
                    return Err(KernelError::ProcessTerminated);
                }
                if state.retired {
                    self.release_writer(&mut state);
                    return Err(KernelError::LinkRetired);
                }
                let room = state.tokens.len() < state.capacity;
                if room && !state.paused {
                    if let Some(token) = token.take() {
                        state.tokens.push_back(token);
                    }
                    self.release_writer(&mut state);
                    if state.read_blocked {
                        state.read_blocked = false;
                        self.report(|m| m.thread_unblocked(BlockKind::Read));
                    }
                    drop(state);
                    self.notify.notify_waiters();
                    return Ok(());
                }
                if room {
                    if state.write_blocked {
                        state.write_blocked = false;
                        self.report(|m| m.thread_unblocked(BlockKind::Write));
                    }
                    if !state.writer_paused {
                        state.writer_paused = true;
                        self.report(|m| m.thread_paused());
                    }
                } else {
                    if state.writer_paused {
                        state.writer_paused = false;
                        self.report(|m| m.thread_unpaused());
                    }
                    if !state.write_blocked {
                        state.write_blocked = true;
                        self.report(|m| m.thread_blocked(BlockKind::Write));
                    }
                }
            }
            notified.await;
        }
    }

    fn clear(&self) -> Result<(), KernelError> {
        {
            let mut state = self.state.lock();
            state.tokens.clear();
            if state.write_blocked {
                state.write_blocked = false;
                self.report(|m| m.thread_unblocked(BlockKind::Write));
            }
        }
        self.notify.notify_waiters();
        Ok(())
    }

    fn container(&self) -> Option<ReceiverContainer> {
        self.owner.read().clone()
    }

    fn set_container(&self, container: Option<ReceiverContainer>) {
        *self.owner.write() = container;
    }
}

impl Debug for BlockingQueueReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BlockingQueueReceiver")
            .field("owner", &*self.owner.read())
            .field("size", &state.tokens.len())
            .field("capacity", &state.capacity)
            .field("paused", &state.paused)
            .field("finished", &state.finished)
            .field("retired", &state.retired)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicIsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[derive(Debug, Default)]
    struct Counter {
        blocked: AtomicIsize,
        paused: AtomicIsize,
    }

    impl ThreadMonitor for Counter {
        fn thread_blocked(&self, _kind: BlockKind) {
            self.blocked.fetch_add(1, Ordering::SeqCst);
        }
        fn thread_unblocked(&self, _kind: BlockKind) {
            self.blocked.fetch_sub(1, Ordering::SeqCst);
        }
        fn thread_paused(&self) {
            self.paused.fetch_add(1, Ordering::SeqCst);
        }
        fn thread_unpaused(&self) {
            self.paused.fetch_sub(1, Ordering::SeqCst);
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn writer_releases_a_blocked_reader() {
        let counter = Arc::new(Counter::default());
        let receiver = Arc::new(BlockingQueueReceiver::new(1, Some(counter.clone())));

        let reader = {
            let receiver = receiver.clone();
            tokio::spawn(async move { receiver.get().await })
        };
        settle().await;
        assert!(receiver.is_read_blocked());
        assert_eq!(counter.blocked.load(Ordering::SeqCst), 1);

        receiver.put(Token::new(7_u16)).await.unwrap();
        assert_eq!(counter.blocked.load(Ordering::SeqCst), 0);
        let token = reader.await.unwrap().unwrap();
        assert_eq!(token.downcast_ref::<u16>(), Some(&7));
        assert_eq!(counter.blocked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pause_holds_a_ready_writer_and_finish_releases_everyone() {
        let counter = Arc::new(Counter::default());
        let receiver = Arc::new(BlockingQueueReceiver::new(1, Some(counter.clone())));
        receiver.request_pause(true);

        let writer = {
            let receiver = receiver.clone();
            tokio::spawn(async move { receiver.put(Token::new(1_u8)).await })
        };
        settle().await;
        assert_eq!(counter.paused.load(Ordering::SeqCst), 1);
        assert_eq!(receiver.size(), 0);

        receiver.request_pause(false);
        writer.await.unwrap().unwrap();
        assert_eq!(counter.paused.load(Ordering::SeqCst), 0);

        let blocked_writer = {
            let receiver = receiver.clone();
            tokio::spawn(async move { receiver.put(Token::new(2_u8)).await })
        };
        settle().await;
        assert!(receiver.is_write_blocked());

        receiver.request_finish();
        let result = blocked_writer.await.unwrap();
        assert_eq!(result, Err(KernelError::ProcessTerminated));
        assert_eq!(counter.blocked.load(Ordering::SeqCst), 0);
        assert!(matches!(receiver.get().await, Err(KernelError::ProcessTerminated)));
    }

    #[tokio::test]
    async fn growing_capacity_releases_a_blocked_writer() {
        let counter = Arc::new(Counter::default());
        let receiver = Arc::new(BlockingQueueReceiver::new(1, Some(counter.clone())));
        receiver.put(Token::new(1_u8)).await.unwrap();

        let writer = {
            let receiver = receiver.clone();
            tokio::spawn(async move { receiver.put(Token::new(2_u8)).await })
        };
        settle().await;
        assert_eq!(counter.blocked.load(Ordering::SeqCst), 1);

        receiver.set_capacity(2);
        assert_eq!(counter.blocked.load(Ordering::SeqCst), 0);
        writer.await.unwrap().unwrap();
        assert_eq!(receiver.size(), 2);
    }

    #[tokio::test]
    async fn restart_clears_flags_left_by_an_abandoned_task() {
        let counter = Arc::new(Counter::default());
        let receiver = Arc::new(BlockingQueueReceiver::new(1, Some(counter.clone())));
        receiver.put(Token::new(1_u8)).await.unwrap();

        let writer = {
            let receiver = receiver.clone();
            tokio::spawn(async move { receiver.put(Token::new(2_u8)).await })
        };
        settle().await;
        writer.abort();
        assert!(writer.await.unwrap_err().is_cancelled());
        assert!(receiver.is_write_blocked());
        assert_eq!(counter.blocked.load(Ordering::SeqCst), 1);

        receiver.restart();
        assert!(!receiver.is_write_blocked());
        assert_eq!(counter.blocked.load(Ordering::SeqCst), 0);
        assert_eq!(receiver.size(), 0);

        receiver.put(Token::new(3_u8)).await.unwrap();
        let token = receiver.get().await.unwrap();
        assert_eq!(token.downcast_ref::<u8>(), Some(&3));
        assert_eq!(counter.blocked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retiring_releases_a_blocked_writer_with_its_own_outcome() {
        let counter = Arc::new(Counter::default());
        let receiver = Arc::new(BlockingQueueReceiver::new(1, Some(counter.clone())));
        receiver.put(Token::new(1_u8)).await.unwrap();

        let writer = {
            let receiver = receiver.clone();
            tokio::spawn(async move { receiver.put(Token::new(2_u8)).await })
        };
        settle().await;
        assert!(receiver.is_write_blocked());

        receiver.retire();
        assert_eq!(writer.await.unwrap(), Err(KernelError::LinkRetired));
        assert!(receiver.is_retired());
        assert!(!receiver.is_finished());
        assert_eq!(counter.blocked.load(Ordering::SeqCst), 0);
        assert!(matches!(receiver.get().await, Err(KernelError::LinkRetired)));
    }
}
