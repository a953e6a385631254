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

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::common::{KernelError, ReceiverContainer};
use crate::message::Token;
use crate::traits::Receiver;

/// A single-slot receiver.
///
/// `put` on a full mailbox fails with [`KernelError::NoRoom`] and leaves the
/// stored token in place; `get` on an empty one fails with
/// [`KernelError::NoToken`]. Never waits.
#[derive(Debug, Default)]
pub struct Mailbox {
    slot: Mutex<Option<Token>>,
    owner: RwLock<Option<ReceiverContainer>>,
}

impl Mailbox {
    /// An empty, detached mailbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty mailbox owned by `owner`.
    #[must_use]
    pub fn with_container(owner: ReceiverContainer) -> Self {
        Self {
            slot: Mutex::new(None),
            owner: RwLock::new(Some(owner)),
        }
    }
}

#[async_trait]
impl Receiver for Mailbox {
    fn has_token(&self) -> bool {
        self.slot.lock().is_some()
    }

    fn has_room(&self) -> bool {
        self.slot.lock().is_none()
    }

    fn size(&self) -> usize {
        usize::from(self.slot.lock().is_some())
    }

    fn capacity(&self) -> Option<usize> {
        Some(1)
    }

    async fn get(&self) -> Result<Token, KernelError> {
        self.slot.lock().take().ok_or_else(|| KernelError::NoToken {
            receiver: self.describe(),
        })
    }

    async fn put(&self, token: Token) -> Result<(), KernelError> {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return Err(KernelError::NoRoom {
                receiver: self.describe(),
            });
        }
        *slot = Some(token);
        Ok(())
    }

    fn clear(&self) -> Result<(), KernelError> {
        self.slot.lock().take();
        Ok(())
    }

    fn container(&self) -> Option<ReceiverContainer> {
        self.owner.read().clone()
    }

    fn set_container(&self, container: Option<ReceiverContainer>) {
        *self.owner.write() = container;
    }
}
