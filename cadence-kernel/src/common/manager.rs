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

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::*;

use crate::actor::ActorCell;
use crate::common::{ChangeRequest, DeclaredTypeResolver, EventBroker, KernelError, ListenerId};
use crate::message::RunEvent;
use crate::traits::{EventListener, Executable, Initializable, IterationOutcome, TypeResolver};

/// Phase of the run controlled by a [`Manager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagerState {
    /// No run in progress.
    Idle,
    /// Preinitializing the model.
    Preinitializing,
    /// Type resolution between preinitialize and initialize.
    ResolvingTypes,
    /// Initializing the model.
    Initializing,
    /// Running iterations of the top-level actor.
    Iterating,
    /// Held by [`Manager::pause`].
    Paused,
    /// Wrapping up the model.
    WrappingUp,
    /// The run ended normally.
    Exiting,
    /// The run failed; the model may be inconsistent.
    Corrupted,
}

impl ManagerState {
    const fn is_running(self) -> bool {
        matches!(
            self,
            Self::Preinitializing
                | Self::ResolvingTypes
                | Self::Initializing
                | Self::Iterating
                | Self::Paused
                | Self::WrappingUp
        )
    }
}

struct ManagerInner {
    top: Arc<ActorCell>,
    broker: RwLock<Arc<EventBroker>>,
    resolver: RwLock<Arc<dyn TypeResolver>>,
    state: Mutex<ManagerState>,
    iterations: AtomicU64,
    finish_requested: AtomicBool,
    terminated: AtomicBool,
    paused: AtomicBool,
    resumed: Notify,
}

/// Drives one top-level composite through complete runs.
///
/// Cloning yields another handle on the same run, so one task can
/// [`execute`](Self::execute) while others pause, finish or terminate it.
#[derive(Clone)]
pub struct Manager(Arc<ManagerInner>);

impl Manager {
    /// A manager for `top`, which must be an opaque composite.
    ///
    /// The top-level actor's broker is reused, or a new one is installed.
    pub fn new(top: Arc<ActorCell>) -> Self {
        let broker = top.broker().unwrap_or_else(|| {
            let broker = Arc::new(EventBroker::new());
            top.set_broker(Arc::clone(&broker));
            broker
        });
        Self(Arc::new(ManagerInner {
            top,
            broker: RwLock::new(broker),
            resolver: RwLock::new(Arc::new(DeclaredTypeResolver)),
            state: Mutex::new(ManagerState::Idle),
            iterations: AtomicU64::new(0),
            finish_requested: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            resumed: Notify::new(),
        }))
    }

    /// Replaces the [`DeclaredTypeResolver`].
    #[must_use]
    pub fn with_type_resolver(self, resolver: impl TypeResolver + 'static) -> Self {
        *self.0.resolver.write() = Arc::new(resolver);
        self
    }

    /// Publishes events through `broker` instead.
    #[must_use]
    pub fn with_broker(self, broker: Arc<EventBroker>) -> Self {
        self.0.top.set_broker(Arc::clone(&broker));
        *self.0.broker.write() = broker;
        self
    }

    /// The top-level composite.
    #[must_use]
    pub fn top(&self) -> &Arc<ActorCell> {
        &self.0.top
    }

    /// The broker events are published on.
    #[must_use]
    pub fn broker(&self) -> Arc<EventBroker> {
        self.0.broker.read().clone()
    }

    /// Current phase.
    #[must_use]
    pub fn state(&self) -> ManagerState {
        *self.0.state.lock()
    }

    /// Iterations of the top-level actor completed in the current run.
    #[must_use]
    pub fn iteration_count(&self) -> u64 {
        self.0.iterations.load(Ordering::Acquire)
    }

    /// Subscribes `listener` to every kernel event of this model.
    pub fn add_listener(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        self.broker().add_listener(listener)
    }

    /// Unsubscribes a listener.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.broker().remove_listener(id)
    }

    fn publish(&self, event: RunEvent) {
        self.broker().publish(event);
    }

    fn set_state(&self, state: ManagerState) {
        {
            let mut current = self.0.state.lock();
            if *current == state {
                return;
            }
            *current = state;
        }
        debug!(?state, "manager state");
        self.publish(RunEvent::StateChanged(state));
    }

    fn is_terminated(&self) -> bool {
        self.0.terminated.load(Ordering::Acquire)
    }

    /// Runs the model to completion.
    ///
    /// Errors abort the run; wrapup is still attempted, the manager becomes
    /// [`Corrupted`](ManagerState::Corrupted) and the error is published
    /// before being returned. A terminated run returns `Ok`.
    #[instrument(skip(self), fields(top = %self.0.top.full_name()))]
    pub async fn execute(&self) -> Result<(), KernelError> {
        {
            let mut state = self.0.state.lock();
            if state.is_running() {
                return Err(KernelError::illegal(format!(
                    "{} is already running",
                    self.0.top.full_name()
                )));
            }
            *state = ManagerState::Idle;
        }
        self.0.iterations.store(0, Ordering::Release);
        self.0.finish_requested.store(false, Ordering::Release);
        self.0.terminated.store(false, Ordering::Release);
        self.0.paused.store(false, Ordering::Release);
        info!("run started");

        let result = self.run().await;
        if self.is_terminated() {
            self.set_state(ManagerState::Idle);
            self.publish(RunEvent::Terminated);
            info!("run terminated");
            return Ok(());
        }
        match result {
            Ok(()) => {
                self.set_state(ManagerState::Exiting);
                self.publish(RunEvent::Finished);
                info!(iterations = self.iteration_count(), "run finished");
                self.set_state(ManagerState::Idle);
                Ok(())
            }
            Err(error) => {
                error!(%error, "run failed");
                if self.state() != ManagerState::WrappingUp {
                    if let Err(wrapup_error) = self.0.top.wrapup().await {
                        warn!(%wrapup_error, "wrapup after failure also failed");
                    }
                }
                self.set_state(ManagerState::Corrupted);
                self.publish(RunEvent::Error(error.to_string()));
                Err(error)
            }
        }
    }

    async fn run(&self) -> Result<(), KernelError> {
        let top = &self.0.top;
        self.set_state(ManagerState::Preinitializing);
        top.preinitialize().await?;

        self.set_state(ManagerState::ResolvingTypes);
        let resolver = self.0.resolver.read().clone();
        resolver.resolve(top)?;

        self.set_state(ManagerState::Initializing);
        top.initialize().await?;

        self.set_state(ManagerState::Iterating);
        loop {
            self.pause_point().await;
            if self.is_terminated() {
                return Ok(());
            }
            if self.0.finish_requested.load(Ordering::Acquire) {
                break;
            }
            let outcome = top.iterate(1).await?;
            self.0.iterations.fetch_add(1, Ordering::AcqRel);
            match outcome {
                IterationOutcome::StopIterating => break,
                IterationOutcome::NotReady => tokio::task::yield_now().await,
                IterationOutcome::Completed => {}
            }
        }
        if self.is_terminated() {
            return Ok(());
        }

        self.set_state(ManagerState::WrappingUp);
        top.wrapup().await
    }

    async fn pause_point(&self) {
        loop {
            let resumed = self.0.resumed.notified();
            tokio::pin!(resumed);
            resumed.as_mut().enable();
            if !self.0.paused.load(Ordering::Acquire) || self.is_terminated() {
                return;
            }
            resumed.await;
        }
    }

    /// Spawns [`execute`](Self::execute) on the tokio runtime.
    pub fn start(&self) -> JoinHandle<Result<(), KernelError>> {
        let manager = self.clone();
        tokio::spawn(async move { manager.execute().await })
    }

    /// Holds the run at the next safe point. Returns once it is held.
    pub async fn pause(&self) -> Result<(), KernelError> {
        if self.state() != ManagerState::Iterating {
            return Err(KernelError::illegal(format!(
                "cannot pause while {:?}",
                self.state()
            )));
        }
        self.0.paused.store(true, Ordering::Release);
        if let Some(director) = self.0.top.local_director() {
            director.pause().await?;
        }
        self.set_state(ManagerState::Paused);
        self.publish(RunEvent::Paused);
        Ok(())
    }

    /// Releases a pause.
    pub async fn resume(&self) -> Result<(), KernelError> {
        if self.state() != ManagerState::Paused {
            return Err(KernelError::illegal(format!(
                "cannot resume while {:?}",
                self.state()
            )));
        }
        if let Some(director) = self.0.top.local_director() {
            director.resume().await?;
        }
        self.0.paused.store(false, Ordering::Release);
        self.0.resumed.notify_waiters();
        self.set_state(ManagerState::Iterating);
        self.publish(RunEvent::Resumed);
        Ok(())
    }

    /// Ends the run cooperatively at the next iteration boundary.
    pub async fn finish(&self) {
        self.0.finish_requested.store(true, Ordering::Release);
        if self.state() == ManagerState::Paused {
            if let Err(e) = self.resume().await {
                warn!(error = %e, "resume before finish failed");
            }
        }
        self.0.top.stop();
    }

    /// Halts the run immediately. Never fails; the model is left in an
    /// unspecified state.
    pub fn terminate(&self) {
        warn!(top = %self.0.top.full_name(), "terminating");
        self.0.terminated.store(true, Ordering::Release);
        self.0.top.terminate();
        self.0.resumed.notify_waiters();
    }

    /// Applies `change` now when idle, otherwise hands it to the top-level
    /// director for the next safe point.
    pub fn request_change(&self, change: ChangeRequest) -> Result<(), KernelError> {
        match self.0.top.local_director() {
            Some(director) if self.state().is_running() => {
                director.request_change(change);
                Ok(())
            }
            _ => {
                debug!(change = change.description(), "applying change immediately");
                change.execute(&self.0.top)
            }
        }
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("top", &self.0.top.full_name())
            .field("state", &self.state())
            .field("iterations", &self.iteration_count())
            .finish()
    }
}
