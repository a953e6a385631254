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

#[derive(Debug, Clone, Default)]
enum Signal {
    #[default]
    Unknown,
    Absent,
    Present(Token),
}

/// Receiver for fixed-point execution, with a third "unknown" state.
///
/// Within one iteration the value of a channel can only become more
/// defined: unknown becomes absent (`clear`) or present (`put`), and a known
/// state never changes until [`reset`](Receiver::reset). `get` does not
/// consume the value, so every firing of the iteration sees the same token.
/// Only an unknown channel has room; a second `put` fails even with the same
/// token.
#[derive(Debug, Default)]
pub struct FixedPointReceiver {
    signal: Mutex<Signal>,
    owner: RwLock<Option<ReceiverContainer>>,
}

impl FixedPointReceiver {
    /// A detached receiver in the unknown state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True when known to carry no token this iteration.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(*self.signal.lock(), Signal::Absent)
    }
}

#[async_trait]
impl Receiver for FixedPointReceiver {
    fn has_token(&self) -> bool {
        matches!(*self.signal.lock(), Signal::Present(_))
    }

    fn has_room(&self) -> bool {
        matches!(*self.signal.lock(), Signal::Unknown)
    }

    fn is_known(&self) -> bool {
        !matches!(*self.signal.lock(), Signal::Unknown)
    }

    fn size(&self) -> usize {
        usize::from(self.has_token())
    }

    fn capacity(&self) -> Option<usize> {
        Some(1)
    }

    async fn get(&self) -> Result<Token, KernelError> {
        match &*self.signal.lock() {
            Signal::Present(token) => Ok(token.clone()),
            Signal::Unknown | Signal::Absent => Err(KernelError::NoToken {
                receiver: self.describe(),
            }),
        }
    }

    async fn put(&self, token: Token) -> Result<(), KernelError> {
        let mut signal = self.signal.lock();
        match &*signal {
            Signal::Unknown => {
                *signal = Signal::Present(token);
                Ok(())
            }
            Signal::Present(_) | Signal::Absent => Err(KernelError::NoRoom {
                receiver: self.describe(),
            }),
        }
    }

    fn clear(&self) -> Result<(), KernelError> {
        let mut signal = self.signal.lock();
        if let Signal::Present(_) = &*signal {
            return Err(KernelError::illegal(format!(
                "{} is known to be present and cannot become absent",
                self.describe()
            )));
        }
        *signal = Signal::Absent;
        Ok(())
    }

    fn reset(&self) {
        *self.signal.lock() = Signal::Unknown;
    }

    fn container(&self) -> Option<ReceiverContainer> {
        self.owner.read().clone()
    }

    fn set_container(&self, container: Option<ReceiverContainer>) {
        *self.owner.write() = container;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_state_is_monotonic_until_reset() {
        let receiver = FixedPointReceiver::new();
        assert!(!receiver.is_known());
        assert!(receiver.get().await.is_err());

        receiver.clear().unwrap();
        assert!(receiver.is_known());
        assert!(receiver.is_absent());
        assert!(receiver.put(Token::new(3_u8)).await.is_err());

        receiver.reset();
        let token = Token::new(3_u8);
        receiver.put(token.clone()).await.unwrap();
        assert!(!receiver.has_room());
        assert!(matches!(
            receiver.put(token).await,
            Err(KernelError::NoRoom { .. })
        ));
        assert_eq!(receiver.get().await.unwrap().downcast_ref::<u8>(), Some(&3));
        assert!(receiver.has_token());
        assert!(receiver.clear().is_err());
    }

    #[tokio::test]
    async fn put_succeeds_exactly_when_there_is_room() {
        let receiver = FixedPointReceiver::new();
        let token = Token::new("pulse");
        for _ in 0..2 {
            let had_room = receiver.has_room();
            assert_eq!(receiver.put(token.clone()).await.is_ok(), had_room);
        }
        receiver.reset();
        receiver.clear().unwrap();
        assert!(!receiver.has_room());
        assert!(receiver.put(token).await.is_err());
    }
}
