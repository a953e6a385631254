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

/// Errors raised by the kernel.
///
/// Lifecycle and scheduling errors propagate up the director chain to the
/// [`Manager`](crate::common::Manager), which aborts the run. The kernel never
/// retries on its own.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum KernelError {
    /// A lifecycle method was called out of order, a topology edit was malformed,
    /// or some other contract between components was broken.
    IllegalAction(String),
    /// `put` on a receiver whose `has_room()` is false.
    NoRoom {
        /// The receiver's owner, formatted as `port[channel]`.
        receiver: String,
    },
    /// `get` on a receiver whose `has_token()` is false.
    NoToken {
        /// The receiver's owner, formatted as `port[channel]`.
        receiver: String,
    },
    /// The dependency graph of a container has an instantaneous loop.
    CausalityCycle {
        /// Full name of the container whose graph was analysed.
        container: String,
        /// Full names of every port participating in a cycle.
        ports: Vec<String>,
    },
    /// A resource scheduler could not place a request.
    Unschedulable {
        /// Name of the scheduler.
        scheduler: String,
        /// Full name of the actor whose request could not be placed.
        actor: String,
        /// Why.
        reason: String,
    },
    /// A port reached `initialize` without a resolved type.
    UnresolvedType {
        /// Full name of the port.
        port: String,
    },
    /// Two connected ports declare incompatible types.
    TypeConflict {
        /// Full name of the source port.
        source: String,
        /// Full name of the sink port.
        sink: String,
    },
    /// A blocking receiver was finished while a worker waited on it.
    ///
    /// Workers treat this as the cue to leave their iteration loop; it is
    /// never reported as a run failure.
    ProcessTerminated,
    /// A blocking receiver was dropped from the topology by a change request
    /// while a worker waited on it.
    ///
    /// The firing context answers it by looking the channel up again, so it
    /// only reaches actor code when the channel itself is gone.
    LinkRetired,
    /// User actor code failed.
    Actor {
        /// Full name of the actor.
        actor: String,
        /// Rendered error chain.
        message: String,
    },
    /// An actor's task panicked.
    Panicked {
        /// Full name of the actor.
        actor: String,
        /// Panic payload, when it was a string.
        message: String,
    },
    /// Configuration could not be read or parsed.
    Config(String),
}

impl KernelError {
    /// Shorthand for [`KernelError::IllegalAction`].
    pub fn illegal(message: impl Into<String>) -> Self {
        Self::IllegalAction(message.into())
    }

    /// Converts an error raised by user actor code.
    ///
    /// Kernel errors travelling through `anyhow` (for example a finished
    /// receiver surfacing through `?` inside `fire`) are recovered unchanged.
    pub fn from_actor(actor: &str, error: anyhow::Error) -> Self {
        match error.downcast::<Self>() {
            Ok(kernel) => kernel,
            Err(other) => Self::Actor {
                actor: actor.to_string(),
                message: format!("{other:#}"),
            },
        }
    }

    /// True for the unwinding signal used by process receivers.
    #[must_use]
    pub const fn is_process_terminated(&self) -> bool {
        matches!(self, Self::ProcessTerminated)
    }
}

impl std::fmt::Display for KernelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IllegalAction(msg) => write!(f, "Illegal action: {msg}"),
            Self::NoRoom { receiver } => write!(f, "No room in receiver {receiver}"),
            Self::NoToken { receiver } => write!(f, "No token in receiver {receiver}"),
            Self::CausalityCycle { container, ports } => write!(
                f,
                "Causality cycle in {container} through ports: {}",
                ports.join(", ")
            ),
            Self::Unschedulable {
                scheduler,
                actor,
                reason,
            } => write!(f, "Scheduler {scheduler} cannot place {actor}: {reason}"),
            Self::UnresolvedType { port } => write!(f, "Port {port} has no resolved type"),
            Self::TypeConflict { source, sink } => {
                write!(f, "Type of {source} is incompatible with {sink}")
            }
            Self::ProcessTerminated => write!(f, "Process terminated"),
            Self::LinkRetired => write!(f, "Link retired by a topology change"),
            Self::Actor { actor, message } => write!(f, "Actor {actor} failed: {message}"),
            Self::Panicked { actor, message } => write!(f, "Actor {actor} panicked: {message}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for KernelError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_errors_survive_anyhow() {
        let wrapped = anyhow::Error::new(KernelError::ProcessTerminated);
        assert_eq!(
            KernelError::from_actor("top.a", wrapped),
            KernelError::ProcessTerminated
        );

        let foreign = anyhow::anyhow!("sensor offline");
        match KernelError::from_actor("top.a", foreign) {
            KernelError::Actor { actor, message } => {
                assert_eq!(actor, "top.a");
                assert_eq!(message, "sensor offline");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
