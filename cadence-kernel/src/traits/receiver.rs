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

use std::fmt::Debug;

use async_trait::async_trait;

use crate::common::{KernelError, ReceiverContainer};
use crate::message::Token;

/// The buffering endpoint of one channel.
///
/// `has_room` and `has_token` never block. Non-blocking implementations fail
/// `put` with [`KernelError::NoRoom`] and `get` with [`KernelError::NoToken`]
/// exactly when the corresponding query would have returned false; blocking
/// implementations wait instead. Under the director that allocated the
/// receiver, a true `has_room()`/`has_token()` guarantees that the caller's
/// next `put`/`get` succeeds without waiting.
#[async_trait]
pub trait Receiver: Send + Sync + Debug {
    /// True when a `get` would succeed now.
    fn has_token(&self) -> bool;

    /// True when a `put` would succeed now.
    fn has_room(&self) -> bool;

    /// False while the receiver is in the "unknown" state of fixed-point
    /// execution. Receivers without that state are always known.
    fn is_known(&self) -> bool {
        true
    }

    /// True when no token is buffered.
    fn is_empty(&self) -> bool {
        !self.has_token()
    }

    /// Number of buffered tokens.
    fn size(&self) -> usize;

    /// Maximum number of buffered tokens, `None` when unbounded.
    fn capacity(&self) -> Option<usize>;

    /// Removes and returns the oldest token.
    async fn get(&self) -> Result<Token, KernelError>;

    /// Appends a token.
    async fn put(&self, token: Token) -> Result<(), KernelError>;

    /// Discards every buffered token. For fixed-point receivers this also
    /// asserts that the channel is known to be absent.
    fn clear(&self) -> Result<(), KernelError>;

    /// Returns a fixed-point receiver to the unknown state. No-op elsewhere.
    fn reset(&self) {}

    /// The port-channel pair that owns this receiver.
    fn container(&self) -> Option<ReceiverContainer>;

    /// Reassigns ownership; `None` detaches the receiver.
    fn set_container(&self, container: Option<ReceiverContainer>);

    /// `port[channel]` of the owner, or a placeholder when detached.
    fn describe(&self) -> String {
        self.container()
            .map_or_else(|| "<detached>".to_string(), |c| c.to_string())
    }
}
