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

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::common::{KernelError, ReceiverContainer};
use crate::message::Token;
use crate::traits::Receiver;

#[derive(Debug, Default)]
struct QueueState {
    tokens: VecDeque<Token>,
    history: VecDeque<Token>,
}

/// A FIFO receiver, bounded or unbounded, that never waits.
///
/// Optionally remembers consumed tokens, keeping at most
/// `history_capacity` of the most recent ones.
#[derive(Debug)]
pub struct QueueReceiver {
    state: Mutex<QueueState>,
    capacity: Option<usize>,
    history_capacity: usize,
    owner: RwLock<Option<ReceiverContainer>>,
}

impl QueueReceiver {
    /// An unbounded queue.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// A queue holding at most `capacity` tokens; `None` is unbounded.
    #[must_use]
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            capacity,
            history_capacity: 0,
            owner: RwLock::new(None),
        }
    }

    /// Keeps the last `history_capacity` consumed tokens.
    #[must_use]
    pub fn with_history(mut self, history_capacity: usize) -> Self {
        self.history_capacity = history_capacity;
        self
    }

    /// Sets the owning port-channel pair.
    #[must_use]
    pub fn with_container(self, owner: ReceiverContainer) -> Self {
        *self.owner.write() = Some(owner);
        self
    }

    /// Consumed tokens, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<Token> {
        self.state.lock().history.iter().cloned().collect()
    }

    /// The buffered token at `offset` from the head, without removing it.
    #[must_use]
    pub fn peek(&self, offset: usize) -> Option<Token> {
        self.state.lock().tokens.get(offset).cloned()
    }
}

#[async_trait]
impl Receiver for QueueReceiver {
    fn has_token(&self) -> bool {
        !self.state.lock().tokens.is_empty()
    }

    fn has_room(&self) -> bool {
        self.capacity
            .map_or(true, |capacity| self.state.lock().tokens.len() < capacity)
    }

    fn size(&self) -> usize {
        self.state.lock().tokens.len()
    }

    fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    async fn get(&self) -> Result<Token, KernelError> {
        let mut state = self.state.lock();
        let token = state.tokens.pop_front().ok_or_else(|| KernelError::NoToken {
            receiver: self.describe(),
        })?;
        if self.history_capacity > 0 {
            if state.history.len() == self.history_capacity {
                state.history.pop_front();
            }
            state.history.push_back(token.clone());
        }
        Ok(token)
    }

    async fn put(&self, token: Token) -> Result<(), KernelError> {
        let mut state = self.state.lock();
        if self.capacity.is_some_and(|capacity| state.tokens.len() >= capacity) {
            return Err(KernelError::NoRoom {
                receiver: self.describe(),
            });
        }
        state.tokens.push_back(token);
        Ok(())
    }

    fn clear(&self) -> Result<(), KernelError> {
        let mut state = self.state.lock();
        state.tokens.clear();
        state.history.clear();
        Ok(())
    }

    fn container(&self) -> Option<ReceiverContainer> {
        self.owner.read().clone()
    }

    fn set_container(&self, container: Option<ReceiverContainer>) {
        *self.owner.write() = container;
    }
}
