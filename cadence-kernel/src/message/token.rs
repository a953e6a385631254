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

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

/// Object-safe view of a token payload.
trait Payload: Any + Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync + Debug> Payload for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An opaque value travelling between actors.
///
/// The kernel never inspects a token. Cloning shares the payload, so a token
/// broadcast to several receivers is not copied.
#[derive(Clone)]
pub struct Token {
    payload: Arc<dyn Payload>,
    type_name: &'static str,
}

impl Token {
    /// Wraps a payload.
    pub fn new<T: Any + Send + Sync + Debug>(value: T) -> Self {
        Self {
            payload: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Borrows the payload as `T`, if that is its type.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (*self.payload).as_any().downcast_ref::<T>()
    }

    /// True when the payload is a `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        (*self.payload).as_any().is::<T>()
    }

    /// Name of the payload type.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// True when both tokens share the same payload allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }
}

impl Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Token({:?})", self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_recovers_the_payload() {
        let token = Token::new(42_u32);
        assert!(token.is::<u32>());
        assert!(!token.is::<i64>());
        assert_eq!(token.downcast_ref::<u32>(), Some(&42));
        assert_eq!(format!("{token:?}"), "Token(42)");

        let copy = token.clone();
        assert!(copy.ptr_eq(&token));
    }

    #[derive(Debug, PartialEq)]
    struct Reading {
        sensor: &'static str,
        value: f64,
    }

    #[test]
    fn shared_payload_keeps_its_type() {
        let token = Token::new(Reading {
            sensor: "flow",
            value: 2.5,
        });
        let copy = token.clone();
        assert!(copy.is::<Reading>());
        assert!(!copy.is::<Token>());
        assert_eq!(
            copy.downcast_ref::<Reading>(),
            Some(&Reading {
                sensor: "flow",
                value: 2.5
            })
        );
    }
}
