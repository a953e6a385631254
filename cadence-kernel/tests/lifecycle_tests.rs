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
#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cadence_kernel::prelude::*;

use crate::setup::actors::{new_log, sequential_model, Counter, LifecycleRecorder};
use crate::setup::{eventually, initialize_tracing};

mod setup;

/// Every hook runs in the mandated order: preinitialize and initialize once,
/// then prefire/fire/postfire per iteration, then wrapup once.
#[tokio::test]
async fn test_hooks_run_in_lifecycle_order() -> anyhow::Result<()> {
    initialize_tracing();
    let top = sequential_model("top");
    let log = new_log();
    top.add_child(LifecycleRecorder::cell("recorder", log.clone(), 2))?;

    Manager::new(Arc::clone(&top)).execute().await?;

    assert_eq!(
        *log.lock(),
        vec![
            "preinitialize",
            "initialize",
            "prefire",
            "fire",
            "postfire",
            "prefire",
            "fire",
            "postfire",
            "wrapup",
        ]
    );
    let recorder = top.child("recorder").expect("recorder is a child");
    assert_eq!(recorder.lifecycle_state(), LifecycleState::WrappedUp);
    Ok(())
}

/// Calls made out of order are refused instead of reaching the actor.
#[tokio::test]
async fn test_out_of_order_calls_are_rejected() -> anyhow::Result<()> {
    initialize_tracing();
    let log = new_log();
    let cell = LifecycleRecorder::cell("lonely", log.clone(), 1);

    assert!(matches!(cell.fire().await, Err(KernelError::IllegalAction(_))));
    assert!(matches!(cell.initialize().await, Err(KernelError::IllegalAction(_))));
    // wrapup of an actor that never ran is a no-op
    cell.wrapup().await?;
    assert_eq!(cell.lifecycle_state(), LifecycleState::Constructed);

    cell.preinitialize().await?;
    assert!(matches!(cell.preinitialize().await, Err(KernelError::IllegalAction(_))));
    cell.initialize().await?;
    assert!(matches!(cell.postfire().await, Err(KernelError::IllegalAction(_))));
    assert!(cell.prefire().await?);
    cell.fire().await?;
    cell.fire().await?;
    assert!(!cell.postfire().await?);
    cell.wrapup().await?;
    assert!(matches!(cell.wrapup().await, Err(KernelError::IllegalAction(_))));

    assert_eq!(
        *log.lock(),
        vec!["preinitialize", "initialize", "prefire", "fire", "fire", "postfire", "wrapup"]
    );
    Ok(())
}

/// Firing events bracket each phase of an iteration, in order.
#[tokio::test]
async fn test_firing_events_bracket_each_phase() -> anyhow::Result<()> {
    initialize_tracing();
    let top = sequential_model("top");
    let fired = Arc::new(AtomicU64::new(0));
    top.add_child(Counter::cell("counter", fired.clone(), 1))?;

    let manager = Manager::new(Arc::clone(&top));
    let recorder = Arc::new(RecordingListener::new());
    manager.add_listener(recorder.clone());
    manager.execute().await?;

    let kinds: Vec<_> = recorder
        .firing_events()
        .into_iter()
        .filter(|event| event.actor_name == "top.counter")
        .map(|event| event.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            FiringEventKind::BeforeIterate,
            FiringEventKind::BeforePrefire,
            FiringEventKind::AfterPrefire,
            FiringEventKind::BeforeFire,
            FiringEventKind::AfterFire,
            FiringEventKind::BeforePostfire,
            FiringEventKind::AfterPostfire,
            FiringEventKind::AfterIterate,
        ]
    );
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    Ok(())
}

/// `finish` ends an open-ended run at the next iteration boundary and still
/// wraps every actor up.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_finish_stops_at_iteration_boundary() -> anyhow::Result<()> {
    initialize_tracing();
    let top = sequential_model("top");
    let fired = Arc::new(AtomicU64::new(0));
    top.add_child(Counter::cell("forever", fired.clone(), 0))?;

    let manager = Manager::new(Arc::clone(&top));
    let run = manager.start();
    assert!(eventually(Duration::from_secs(5), || fired.load(Ordering::SeqCst) >= 5).await);

    manager.finish().await;
    run.await??;

    assert_eq!(manager.state(), ManagerState::Idle);
    let forever = top.child("forever").expect("forever is a child");
    assert_eq!(forever.lifecycle_state(), LifecycleState::WrappedUp);
    let settled = fired.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(fired.load(Ordering::SeqCst), settled);
    Ok(())
}

/// A model can be run again once the previous run wrapped up.
#[tokio::test]
async fn test_model_runs_twice() -> anyhow::Result<()> {
    initialize_tracing();
    let top = sequential_model("top");
    let log = new_log();
    top.add_child(LifecycleRecorder::cell("recorder", log.clone(), 1))?;
    let manager = Manager::new(Arc::clone(&top));

    manager.execute().await?;
    let first = log.lock().len();
    manager.execute().await?;

    assert_eq!(log.lock().len(), first * 2);
    assert_eq!(manager.iteration_count(), 1);
    Ok(())
}
