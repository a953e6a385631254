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

use crate::setup::actors::{sequential_model, Counter};
use crate::setup::{eventually, initialize_tracing};

mod setup;

/// A top-level sequential model with one single-shot counter per
/// decoration, all served by `scheduler`.
fn decorated_model<S: ResourceScheduler + 'static>(
    scheduler: S,
    decorations: &[(&str, AspectAttributes)],
) -> anyhow::Result<(ActorRef, Vec<Arc<AtomicU64>>)> {
    let top = sequential_model("top");
    let director = top.local_director().expect("opaque top");
    director.aspect_registry().register_scheduler(scheduler)?;
    let mut counts = Vec::new();
    for (name, attributes) in decorations {
        let fired = Arc::new(AtomicU64::new(0));
        let counter = Counter::cell(name, fired.clone(), 1);
        counter.set_aspect_attributes("cpu", attributes.clone());
        top.add_child(counter)?;
        counts.push(fired);
    }
    Ok((top, counts))
}

async fn run_recorded(top: ActorRef) -> anyhow::Result<Vec<(String, ExecutionEventKind, f64)>> {
    let manager = Manager::new(top);
    let recorder = Arc::new(RecordingListener::new());
    manager.add_listener(recorder.clone());
    manager.execute().await?;
    Ok(recorder
        .execution_events()
        .into_iter()
        .map(|event| (event.actor_name, event.kind, event.time.as_f64()))
        .collect())
}

fn event(actor: &str, kind: ExecutionEventKind, time: f64) -> (String, ExecutionEventKind, f64) {
    (format!("top.{actor}"), kind, time)
}

/// Three actors needing one time unit each are served one after the other.
#[tokio::test]
async fn test_fifo_serves_requests_in_arrival_order() -> anyhow::Result<()> {
    initialize_tracing();
    let (top, counts) = decorated_model(
        PolicyScheduler::new("cpu", "cpu", Fifo),
        &[
            ("a", AspectAttributes::new(1.0)),
            ("b", AspectAttributes::new(1.0)),
            ("c", AspectAttributes::new(1.0)),
        ],
    )?;

    let events = run_recorded(top).await?;

    use ExecutionEventKind::{Start, Stop};
    assert_eq!(
        events,
        vec![
            event("a", Start, 0.0),
            event("a", Stop, 1.0),
            event("b", Start, 1.0),
            event("b", Stop, 2.0),
            event("c", Start, 2.0),
            event("c", Stop, 3.0),
        ]
    );
    assert!(counts.iter().all(|fired| fired.load(Ordering::SeqCst) == 1));
    Ok(())
}

/// A more urgent request takes the resource at once; the preempted request
/// resumes with the time it still needs.
#[tokio::test]
async fn test_fixed_priority_preempts() -> anyhow::Result<()> {
    initialize_tracing();
    let (top, _) = decorated_model(
        PolicyScheduler::new("cpu", "cpu", FixedPriority),
        &[
            ("low", AspectAttributes::new(2.0).with_priority(5)),
            ("high", AspectAttributes::new(1.0).with_priority(1)),
        ],
    )?;

    let events = run_recorded(top).await?;

    use ExecutionEventKind::{Preempted, Start, Stop};
    assert_eq!(
        events,
        vec![
            event("low", Start, 0.0),
            event("low", Preempted, 0.0),
            event("high", Start, 0.0),
            event("high", Stop, 1.0),
            event("low", Start, 1.0),
            event("low", Stop, 3.0),
        ]
    );
    Ok(())
}

/// Requests with equal deadlines are served in arrival order.
#[tokio::test]
async fn test_edf_breaks_ties_by_arrival() -> anyhow::Result<()> {
    initialize_tracing();
    let (top, _) = decorated_model(
        PolicyScheduler::new("cpu", "cpu", EarliestDeadlineFirst),
        &[
            ("first", AspectAttributes::new(1.0).with_deadline(10.0)),
            ("second", AspectAttributes::new(1.0).with_deadline(10.0)),
            ("urgent", AspectAttributes::new(1.0).with_deadline(1.5)),
        ],
    )?;

    let events = run_recorded(top).await?;

    let stops: Vec<_> = events
        .iter()
        .filter(|(_, kind, _)| *kind == ExecutionEventKind::Stop)
        .map(|(actor, _, time)| (actor.as_str(), *time))
        .collect();
    assert_eq!(stops, vec![("top.urgent", 1.0), ("top.first", 2.0), ("top.second", 3.0)]);
    Ok(())
}

/// Actors decorated with a zero execution time fire without waiting.
#[tokio::test]
async fn test_zero_execution_time_fires_immediately() -> anyhow::Result<()> {
    initialize_tracing();
    let (top, counts) = decorated_model(
        PolicyScheduler::new("cpu", "cpu", Fifo),
        &[("instant", AspectAttributes::new(0.0))],
    )?;

    let events = run_recorded(top).await?;

    use ExecutionEventKind::{Start, Stop};
    assert_eq!(events, vec![event("instant", Start, 0.0), event("instant", Stop, 0.0)]);
    assert_eq!(counts[0].load(Ordering::SeqCst), 1);
    Ok(())
}

/// A request that can never be served fails the run instead of hanging it.
#[tokio::test]
async fn test_infinite_execution_time_is_unschedulable() -> anyhow::Result<()> {
    initialize_tracing();
    let (top, counts) = decorated_model(
        PolicyScheduler::new("cpu", "cpu", Fifo),
        &[("forever", AspectAttributes::new(f64::INFINITY))],
    )?;
    let manager = Manager::new(top);

    let result = manager.execute().await;

    assert!(
        matches!(&result, Err(KernelError::Unschedulable { actor, .. }) if actor == "top.forever"),
        "unexpected result: {result:?}"
    );
    assert_eq!(manager.state(), ManagerState::Corrupted);
    assert_eq!(counts[0].load(Ordering::SeqCst), 0);
    Ok(())
}

/// Disabled decorations keep their values but bypass the scheduler.
#[tokio::test]
async fn test_disabled_decoration_is_ignored() -> anyhow::Result<()> {
    initialize_tracing();
    let (top, counts) = decorated_model(
        PolicyScheduler::new("cpu", "cpu", Fifo),
        &[("free", AspectAttributes::new(5.0).disabled())],
    )?;

    let events = run_recorded(top).await?;

    assert!(events.is_empty());
    assert_eq!(counts[0].load(Ordering::SeqCst), 1);
    Ok(())
}

/// Sequence numbers follow the firing order of the decorated actors.
#[tokio::test]
async fn test_sequence_numbers_are_assigned_at_initialize() -> anyhow::Result<()> {
    initialize_tracing();
    let (top, _) = decorated_model(
        PolicyScheduler::new("cpu", "cpu", Fifo),
        &[("a", AspectAttributes::new(1.0)), ("b", AspectAttributes::new(1.0))],
    )?;

    run_recorded(Arc::clone(&top)).await?;

    let sequence = |name: &str| {
        top.child(name)
            .and_then(|cell| cell.aspect_attributes("cpu"))
            .and_then(|attributes| attributes.sequence_number)
    };
    assert_eq!(sequence("a"), Some(0));
    assert_eq!(sequence("b"), Some(1));
    Ok(())
}

/// A decorated actor added by a change request mid-run is numbered after
/// the existing ones and is served by the scheduler.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_actor_added_mid_run_joins_the_scheduler() -> anyhow::Result<()> {
    initialize_tracing();
    let top = sequential_model("top");
    top.local_director()
        .expect("opaque top")
        .aspect_registry()
        .register_scheduler(PolicyScheduler::new("cpu", "cpu", Fifo))?;
    let fired = Arc::new(AtomicU64::new(0));
    let a = Counter::cell("a", fired.clone(), 0);
    a.set_aspect_attributes("cpu", AspectAttributes::new(1.0));
    top.add_child(a)?;
    let manager = Manager::new(Arc::clone(&top));
    let recorder = Arc::new(RecordingListener::new());
    manager.add_listener(recorder.clone());

    let run = manager.start();
    assert!(eventually(Duration::from_secs(5), || fired.load(Ordering::SeqCst) > 2).await);

    let late_fired = Arc::new(AtomicU64::new(0));
    let late = Counter::cell("late", late_fired.clone(), 0);
    late.set_aspect_attributes("cpu", AspectAttributes::new(1.0));
    manager.request_change(ChangeRequest::new("add late", move |container| {
        container.add_child(Arc::clone(&late))
    }))?;
    assert!(eventually(Duration::from_secs(5), || late_fired.load(Ordering::SeqCst) > 0).await);

    manager.finish().await;
    run.await??;

    let sequence = |name: &str| {
        top.child(name)
            .and_then(|cell| cell.aspect_attributes("cpu"))
            .and_then(|attributes| attributes.sequence_number)
    };
    assert_eq!(sequence("a"), Some(0));
    assert_eq!(sequence("late"), Some(1));
    assert!(recorder
        .execution_events()
        .iter()
        .any(|event| event.actor_name == "top.late" && event.kind == ExecutionEventKind::Start));
    Ok(())
}

/// Only one scheduler may serve an axis.
#[test]
fn test_axis_is_served_once() {
    let registry = AspectRegistry::new();
    registry
        .register_scheduler(PolicyScheduler::new("cpu", "cpu", Fifo))
        .expect("first registration");
    let second = registry.register_scheduler(PolicyScheduler::new("cpu-2", "cpu", FixedPriority));
    assert!(matches!(second, Err(KernelError::IllegalAction(_))));
    assert!(registry.unregister("cpu").is_some());
    assert!(registry.is_empty());
}
