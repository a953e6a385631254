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
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::*;

use crate::actor::ActorCell;
use crate::common::KernelError;
use crate::director::process::state::ProcessCoordinator;
use crate::traits::{Executable, Initializable, IterationOutcome};

/// Counts its worker as active from creation until drop, exactly once.
struct ActiveGuard(Arc<ProcessCoordinator>);

impl ActiveGuard {
    fn new(coordinator: Arc<ProcessCoordinator>) -> Self {
        coordinator.increase_active();
        Self(coordinator)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.decrease_active();
    }
}

/// One actor's task and the signal that lets it start iterating.
#[derive(Debug)]
pub(crate) struct Worker {
    pub(crate) actor: Arc<ActorCell>,
    pub(crate) handle: JoinHandle<()>,
    start: Option<oneshot::Sender<()>>,
}

impl Worker {
    /// Spawns the task for `actor`. It is counted as active at once but only
    /// starts iterating after [`start`](Self::start).
    pub(crate) fn spawn(
        actor: Arc<ActorCell>,
        coordinator: Arc<ProcessCoordinator>,
        tracker: &TaskTracker,
    ) -> Self {
        let (start, started) = oneshot::channel();
        let guard = ActiveGuard::new(Arc::clone(&coordinator));
        let handle = tracker.spawn(run(Arc::clone(&actor), coordinator, started, guard));
        Self {
            actor,
            handle,
            start: Some(start),
        }
    }

    pub(crate) fn start(&mut self) {
        if let Some(start) = self.start.take() {
            // the task only goes away before start when it was aborted
            let _ = start.send(());
        }
    }

    /// Lets a never-started task exit without iterating.
    pub(crate) fn cancel_start(&mut self) {
        self.start = None;
    }
}

async fn run(
    actor: Arc<ActorCell>,
    coordinator: Arc<ProcessCoordinator>,
    started: oneshot::Receiver<()>,
    _guard: ActiveGuard,
) {
    if started.await.is_err() {
        trace!(actor = %actor.full_name(), "worker released before start");
        return;
    }
    let name = actor.full_name();
    let outcome = AssertUnwindSafe(work(&actor, &coordinator)).catch_unwind().await;
    match outcome {
        Ok(Ok(())) => trace!(actor = %name, "worker exited"),
        Ok(Err(error)) => coordinator.record_error(error),
        Err(payload) => coordinator.record_error(KernelError::Panicked {
            actor: name,
            message: panic_message(payload.as_ref()),
        }),
    }
}

#[instrument(skip_all, fields(actor = %actor.full_name()))]
async fn work(actor: &Arc<ActorCell>, coordinator: &ProcessCoordinator) -> Result<(), KernelError> {
    let iterations = iterate(actor, coordinator).await;
    let wrapup = actor.wrapup().await;
    match (iterations, wrapup) {
        (Err(error), _) if !error.is_process_terminated() => Err(error),
        (_, Err(error)) if !error.is_process_terminated() => Err(error),
        _ => Ok(()),
    }
}

async fn iterate(actor: &ActorCell, coordinator: &ProcessCoordinator) -> Result<(), KernelError> {
    let mut count = 0_u64;
    loop {
        coordinator.pause_point().await;
        if coordinator.is_terminate_requested() || actor.flags().stop_requested() {
            debug!(iterations = count, "stop observed");
            return Ok(());
        }
        match actor.iterate(1).await? {
            IterationOutcome::StopIterating => {
                debug!(iterations = count + 1, "postfire ended the actor");
                return Ok(());
            }
            IterationOutcome::NotReady => {}
            IterationOutcome::Completed => count += 1,
        }
        tokio::task::yield_now().await;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
