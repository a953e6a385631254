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

//! Identifiers, model time and small shared type aliases.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::actor::ActorCell;

static NEXT_ACTOR_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an actor cell.
///
/// Identities are never reused, so a removed actor and its replacement can be
/// told apart by directors that still hold bookkeeping for the old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorId(u64);

impl ActorId {
    pub(crate) fn next() -> Self {
        Self(NEXT_ACTOR_ID.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// The raw numeric value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

/// Identity of a port: its owning actor plus a per-actor index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortId {
    /// Owning actor.
    pub actor: ActorId,
    /// Index allocated by the owning actor; stable for the port's lifetime.
    pub index: usize,
}

/// Handle returned when a listener is registered with an [`EventBroker`](crate::common::EventBroker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// The port-channel pair that currently owns a receiver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiverContainer {
    /// Port that reads from the receiver.
    pub port: PortId,
    /// Channel index within that port.
    pub channel: usize,
    /// Dot-separated full name of the port, for diagnostics.
    pub port_name: String,
}

impl fmt::Display for ReceiverContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.port_name, self.channel)
    }
}

/// Model time.
///
/// A totally ordered wrapper around `f64` (ordering follows
/// [`f64::total_cmp`]), so it can key ordered collections of wake-up requests.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Time(f64);

impl Time {
    /// Time zero.
    pub const ZERO: Self = Self(0.0);
    /// A time later than every finite time.
    pub const POSITIVE_INFINITY: Self = Self(f64::INFINITY);

    /// Wraps a raw value.
    #[must_use]
    pub const fn new(value: f64) -> Self {
        Self(value)
    }

    /// The raw value.
    #[must_use]
    pub const fn as_f64(self) -> f64 {
        self.0
    }

    /// True unless the time is infinite or NaN.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }
}

impl PartialEq for Time {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Time {}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Add<f64> for Time {
    type Output = Self;

    fn add(self, delta: f64) -> Self {
        Self(self.0 + delta)
    }
}

impl Sub for Time {
    type Output = f64;

    fn sub(self, rhs: Self) -> f64 {
        self.0 - rhs.0
    }
}

impl From<f64> for Time {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared handle to an actor cell.
pub type ActorRef = Arc<ActorCell>;
