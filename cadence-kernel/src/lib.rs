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

#![forbid(unsafe_code)]
//! Cadence Kernel
//!
//! The execution core of the Cadence actor-oriented modeling environment:
//! the lifecycle contract every actor and director obeys, token receivers,
//! a sequential and a thread-per-actor process director, compositional
//! causality analysis and pluggable resource schedulers.

/// Actor cells, ports, composites and the firing context.
pub mod actor;
/// Execution aspects and resource schedulers.
pub mod aspect;
/// Dependency graphs and causality-cycle detection.
pub mod causality;
/// Identifiers, errors, configuration, logging, events and the run manager.
pub mod common;
pub mod director;
/// Tokens and kernel events.
pub mod message;
pub mod receiver;
/// Capability traits.
pub mod traits;

/// Prelude module for convenient imports.
///
/// Re-exports the types needed to build and run a model, the macros, and the
/// `async_trait` crate.
pub mod prelude {
    pub use async_trait;

    pub use cadence_macro::{cadence_actor, cadence_token};

    pub use crate::actor::{ActorBuilder, ActorCell, FiringContext, LifecycleState, PortDirection, PortRef, PortSpec};
    pub use crate::aspect::{AspectAttributes, AspectRegistry, EarliestDeadlineFirst, Fifo, FixedPriority, PolicyScheduler};
    pub use crate::causality::{DirectedGraph, FunctionDependency};
    pub use crate::common::{
        ActorId, ActorRef, ChangeRequest, ChannelListener, DeclaredTypeResolver, EventBroker, KernelConfig,
        KernelError, Manager, ManagerState, RecordingListener, Time, TracingListener,
    };
    pub use crate::director::{ProcessDirector, SequentialDirector};
    pub use crate::message::{
        ExecutionEvent, ExecutionEventKind, FiringEvent, FiringEventKind, KernelEvent, RunEvent, Token,
    };
    pub use crate::receiver::{BlockingQueueReceiver, FixedPointReceiver, Mailbox, QueueReceiver};
    pub use crate::traits::{
        Actor, Director, EventListener, Executable, Initializable, IterationOutcome, Receiver, ResourceScheduler,
        TypeResolver,
    };
}

mod assertions {
    use static_assertions::assert_impl_all;

    use crate::actor::ActorCell;
    use crate::common::{EventBroker, Manager};
    use crate::director::{ProcessDirector, SequentialDirector};
    use crate::message::Token;
    use crate::receiver::{BlockingQueueReceiver, QueueReceiver};

    assert_impl_all!(ActorCell: Send, Sync);
    assert_impl_all!(Token: Send, Sync, Clone);
    assert_impl_all!(EventBroker: Send, Sync);
    assert_impl_all!(Manager: Send, Sync, Clone);
    assert_impl_all!(SequentialDirector: Send, Sync);
    assert_impl_all!(ProcessDirector: Send, Sync);
    assert_impl_all!(QueueReceiver: Send, Sync);
    assert_impl_all!(BlockingQueueReceiver: Send, Sync);
}
