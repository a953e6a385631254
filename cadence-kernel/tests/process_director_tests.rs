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

use crate::setup::actors::{link, new_log, process_model, Counter, Log, Relay, Sink, Source};
use crate::setup::tokens::Sample;
use crate::setup::{eventually, initialize_tracing};

mod setup;

/// Sends three samples on `bulk`, then one on `signal`.
#[cadence_actor]
struct Burst;

#[async_trait::async_trait]
impl Actor for Burst {
    async fn fire(&mut self, ctx: &FiringContext<'_>) -> anyhow::Result<()> {
        for value in 0..3 {
            ctx.send("bulk", 0, Sample::token(value)).await?;
        }
        ctx.send("signal", 0, Sample::token(99)).await?;
        Ok(())
    }

    async fn postfire(&mut self, _ctx: &FiringContext<'_>) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// Waits for `signal` before reading the three samples of `bulk`.
#[cadence_actor(no_default)]
struct Drain {
    seen: Log<u64>,
}

#[async_trait::async_trait]
impl Actor for Drain {
    async fn fire(&mut self, ctx: &FiringContext<'_>) -> anyhow::Result<()> {
        ctx.get("signal", 0).await?;
        for _ in 0..3 {
            let token = ctx.get("bulk", 0).await?;
            if let Some(value) = Sample::value_of(&token) {
                self.seen.lock().push(value);
            }
        }
        Ok(())
    }

    async fn postfire(&mut self, _ctx: &FiringContext<'_>) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// Broadcasts an ever increasing sample on `out`, never asking to stop.
#[cadence_actor(no_default)]
struct Ticker {
    sent: Arc<AtomicU64>,
}

impl Ticker {
    fn cell(name: &str, sent: Arc<AtomicU64>) -> ActorRef {
        ActorBuilder::new(name).output("out").build_atomic(Self { sent })
    }
}

#[async_trait::async_trait]
impl Actor for Ticker {
    async fn fire(&mut self, ctx: &FiringContext<'_>) -> anyhow::Result<()> {
        let n = self.sent.load(Ordering::SeqCst);
        ctx.broadcast("out", Sample::token(n)).await?;
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn postfire(&mut self, _ctx: &FiringContext<'_>) -> anyhow::Result<bool> {
        Ok(true)
    }
}

fn burst_model(config: KernelConfig) -> anyhow::Result<(ActorRef, Log<u64>)> {
    let top = process_model("top", config);
    let seen = new_log();
    let burst = ActorBuilder::new("burst").output("bulk").output("signal").build_atomic(Burst);
    let drain = ActorBuilder::new("drain")
        .input("bulk")
        .input("signal")
        .build_atomic(Drain { seen: seen.clone() });
    top.add_child(Arc::clone(&burst))?;
    top.add_child(Arc::clone(&drain))?;
    link(&top, &burst, "bulk", &drain, "bulk")?;
    link(&top, &burst, "signal", &drain, "signal")?;
    Ok((top, seen))
}

fn deadlocks(recorder: &RecordingListener) -> Vec<(String, bool)> {
    recorder
        .run_events()
        .into_iter()
        .filter_map(|event| match event {
            RunEvent::Deadlock { container, artificial } => Some((container, artificial)),
            _ => None,
        })
        .collect()
}

fn pipeline(limit: u64) -> anyhow::Result<(ActorRef, Log<u64>)> {
    let top = process_model("top", KernelConfig::default());
    let seen = new_log();
    let source = Source::cell("source", limit);
    let sink = Sink::blocking("sink", seen.clone());
    top.add_child(Arc::clone(&source))?;
    top.add_child(Arc::clone(&sink))?;
    link(&top, &source, "out", &sink, "in")?;
    Ok((top, seen))
}

/// Every token reaches the sink in order. Once the source is done the sink
/// waits forever, which ends the run as a real deadlock.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pipeline_delivers_every_token() -> anyhow::Result<()> {
    initialize_tracing();
    let (top, seen) = pipeline(5)?;
    let manager = Manager::new(Arc::clone(&top));
    let recorder = Arc::new(RecordingListener::new());
    manager.add_listener(recorder.clone());

    manager.execute().await?;

    assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    assert_eq!(deadlocks(&recorder), vec![("top".to_string(), false)]);
    assert_eq!(manager.state(), ManagerState::Idle);
    for child in top.children() {
        assert_eq!(child.lifecycle_state(), LifecycleState::WrappedUp, "{}", child.full_name());
    }
    Ok(())
}

/// Two actors each waiting for the other is reported as a real deadlock
/// and ends the run without error.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_mutual_wait_is_a_real_deadlock() -> anyhow::Result<()> {
    initialize_tracing();
    let top = process_model("top", KernelConfig::default());
    let x = Relay::blocking("x");
    let y = Relay::blocking("y");
    top.add_child(Arc::clone(&x))?;
    top.add_child(Arc::clone(&y))?;
    link(&top, &x, "out", &y, "in")?;
    link(&top, &y, "out", &x, "in")?;

    let manager = Manager::new(Arc::clone(&top));
    let recorder = Arc::new(RecordingListener::new());
    manager.add_listener(recorder.clone());
    tokio::time::timeout(Duration::from_secs(10), manager.execute()).await??;

    assert_eq!(deadlocks(&recorder), vec![("top".to_string(), false)]);
    assert!(recorder.run_events().contains(&RunEvent::Finished));
    Ok(())
}

/// An actor without ports runs on its own task and the run ends when it does.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_zero_port_actor_finishes_run() -> anyhow::Result<()> {
    initialize_tracing();
    let top = process_model("top", KernelConfig::default());
    let fired = Arc::new(AtomicU64::new(0));
    top.add_child(Counter::cell("counter", fired.clone(), 3))?;

    let manager = Manager::new(Arc::clone(&top));
    let recorder = Arc::new(RecordingListener::new());
    manager.add_listener(recorder.clone());
    manager.execute().await?;

    assert_eq!(fired.load(Ordering::SeqCst), 3);
    assert!(deadlocks(&recorder).is_empty());
    assert!(recorder.run_events().contains(&RunEvent::Finished));
    Ok(())
}

/// Execution aspects cannot be honored when every actor has its own task.
#[tokio::test]
async fn test_decorated_actor_is_rejected() -> anyhow::Result<()> {
    initialize_tracing();
    let top = process_model("top", KernelConfig::default());
    let counter = Counter::cell("counter", Arc::new(AtomicU64::new(0)), 1);
    counter.set_aspect_attributes("cpu", AspectAttributes::new(1.0));
    top.add_child(counter)?;

    let result = Manager::new(top).execute().await;
    assert!(matches!(result, Err(KernelError::IllegalAction(_))), "unexpected result: {result:?}");
    Ok(())
}

/// A paused run makes no progress until it is resumed.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pause_holds_every_worker() -> anyhow::Result<()> {
    initialize_tracing();
    let (top, seen) = pipeline(0)?;
    let manager = Manager::new(Arc::clone(&top));
    let recorder = Arc::new(RecordingListener::new());
    manager.add_listener(recorder.clone());

    let run = manager.start();
    assert!(eventually(Duration::from_secs(5), || seen.lock().len() >= 3).await);

    manager.pause().await?;
    assert_eq!(manager.state(), ManagerState::Paused);
    let held = seen.lock().len();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(seen.lock().len(), held);
    assert!(deadlocks(&recorder).is_empty());

    manager.resume().await?;
    assert!(eventually(Duration::from_secs(5), || seen.lock().len() > held + 2).await);

    manager.finish().await;
    run.await??;

    let events = recorder.run_events();
    let paused = events.iter().position(|e| *e == RunEvent::Paused).expect("paused event");
    let resumed = events.iter().position(|e| *e == RunEvent::Resumed).expect("resumed event");
    assert!(paused < resumed);
    let values = seen.lock().clone();
    assert!(values.windows(2).all(|pair| pair[1] == pair[0] + 1));
    Ok(())
}

/// Actors added by a change request are wired in with every worker held
/// and then get their own tasks.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_change_request_adds_pipeline_during_run() -> anyhow::Result<()> {
    initialize_tracing();
    let top = process_model("top", KernelConfig::default());
    let ticks = Arc::new(AtomicU64::new(0));
    top.add_child(Counter::cell("clock", ticks.clone(), 0))?;
    let manager = Manager::new(Arc::clone(&top));

    let run = manager.start();
    assert!(eventually(Duration::from_secs(5), || ticks.load(Ordering::SeqCst) > 2).await);

    let seen = new_log();
    let source = Source::cell("source", 5);
    let sink = Sink::blocking("sink", seen.clone());
    manager.request_change(ChangeRequest::new("add pipeline", move |container| {
        container.add_child(Arc::clone(&source))?;
        container.add_child(Arc::clone(&sink))?;
        link(container, &source, "out", &sink, "in")
    }))?;

    assert!(eventually(Duration::from_secs(5), || seen.lock().len() == 5).await);
    assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);

    manager.finish().await;
    run.await??;
    assert_eq!(top.children().len(), 3);
    Ok(())
}

/// Removing the downstream actor retires its link, and the upstream writer
/// carries on against the rewired (now unconnected) port.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_upstream_survives_removal_of_its_reader() -> anyhow::Result<()> {
    initialize_tracing();
    let top = process_model("top", KernelConfig::default());
    let sent = Arc::new(AtomicU64::new(0));
    let seen = new_log();
    let ticker = Ticker::cell("ticker", sent.clone());
    let sink = Sink::blocking("sink", seen.clone());
    top.add_child(Arc::clone(&ticker))?;
    top.add_child(Arc::clone(&sink))?;
    link(&top, &ticker, "out", &sink, "in")?;
    let manager = Manager::new(Arc::clone(&top));

    let run = manager.start();
    assert!(eventually(Duration::from_secs(5), || seen.lock().len() > 3).await);

    manager.request_change(ChangeRequest::new("remove sink", |container| {
        container.remove_child("sink").map(|_| ())
    }))?;
    assert!(eventually(Duration::from_secs(5), || top.children().len() == 1).await);

    let before = sent.load(Ordering::SeqCst);
    assert!(eventually(Duration::from_secs(5), || sent.load(Ordering::SeqCst) > before + 20).await);
    assert_eq!(manager.state(), ManagerState::Iterating);

    manager.finish().await;
    run.await??;
    Ok(())
}

/// Terminate halts a run that would never end on its own.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_terminate_halts_run() -> anyhow::Result<()> {
    initialize_tracing();
    let (top, seen) = pipeline(0)?;
    let manager = Manager::new(Arc::clone(&top));
    let recorder = Arc::new(RecordingListener::new());
    manager.add_listener(recorder.clone());

    let run = manager.start();
    assert!(eventually(Duration::from_secs(5), || seen.lock().len() >= 2).await);

    manager.terminate();
    tokio::time::timeout(Duration::from_secs(5), run).await???;

    assert!(recorder.run_events().contains(&RunEvent::Terminated));
    assert_eq!(manager.state(), ManagerState::Idle);
    Ok(())
}

/// With queue growth enabled, a writer stuck on a full queue is released
/// by enlarging it; the deadlock is only artificial.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queue_growth_resolves_artificial_deadlock() -> anyhow::Result<()> {
    initialize_tracing();
    let mut config = KernelConfig::default();
    config.process.grow_queues_on_deadlock = true;
    let (top, seen) = burst_model(config)?;
    let manager = Manager::new(top);
    let recorder = Arc::new(RecordingListener::new());
    manager.add_listener(recorder.clone());

    tokio::time::timeout(Duration::from_secs(10), manager.execute()).await??;

    assert_eq!(*seen.lock(), vec![0, 1, 2]);
    let found = deadlocks(&recorder);
    assert!(!found.is_empty());
    assert!(found.iter().all(|(container, artificial)| container == "top" && *artificial));
    Ok(())
}

/// Without queue growth the same model stops on a real deadlock.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_queue_deadlocks_without_growth() -> anyhow::Result<()> {
    initialize_tracing();
    let (top, seen) = burst_model(KernelConfig::default())?;
    let manager = Manager::new(top);
    let recorder = Arc::new(RecordingListener::new());
    manager.add_listener(recorder.clone());

    tokio::time::timeout(Duration::from_secs(10), manager.execute()).await??;

    assert!(seen.lock().is_empty());
    assert_eq!(deadlocks(&recorder), vec![("top".to_string(), false)]);
    Ok(())
}
