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
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cadence_kernel::prelude::*;
use parking_lot::Mutex;

use crate::setup::tokens::Sample;

/// Shared record written by actors and read by the test.
pub type Log<T> = Arc<Mutex<Vec<T>>>;

pub fn new_log<T>() -> Log<T> {
    Arc::new(Mutex::new(Vec::new()))
}

/// A top-level composite run by a sequential director with default settings.
pub fn sequential_model(name: &str) -> ActorRef {
    ActorBuilder::new(name).build_composite(SequentialDirector::with_config(
        format!("{name}-director"),
        KernelConfig::default(),
    ))
}

/// A top-level composite run by a process director.
pub fn process_model(name: &str, config: KernelConfig) -> ActorRef {
    ActorBuilder::new(name).build_composite(ProcessDirector::with_config(format!("{name}-director"), config))
}

/// Connects `from.output` to `to.input` inside `container`.
pub fn link(
    container: &ActorRef,
    from: &ActorRef,
    output: &str,
    to: &ActorRef,
    input: &str,
) -> Result<(), KernelError> {
    let source = from
        .port(output)
        .ok_or_else(|| KernelError::illegal(format!("{} has no port {output}", from.full_name())))?;
    let sink = to
        .port(input)
        .ok_or_else(|| KernelError::illegal(format!("{} has no port {input}", to.full_name())))?;
    container.connect(&source, &sink)
}

/// Emits numbered samples on `out`, one per iteration, and stops after
/// `limit` of them. A limit of zero never stops.
#[cadence_actor(no_default)]
pub struct Source {
    limit: u64,
    sent: u64,
}

impl Source {
    pub fn cell(name: &str, limit: u64) -> ActorRef {
        ActorBuilder::new(name)
            .output("out")
            .build_atomic(Self { limit, sent: 0 })
    }
}

#[async_trait::async_trait]
impl Actor for Source {
    async fn initialize(&mut self, _ctx: &FiringContext<'_>) -> anyhow::Result<()> {
        self.sent = 0;
        Ok(())
    }

    async fn fire(&mut self, ctx: &FiringContext<'_>) -> anyhow::Result<()> {
        ctx.broadcast("out", Sample::token(self.sent)).await?;
        Ok(())
    }

    async fn postfire(&mut self, _ctx: &FiringContext<'_>) -> anyhow::Result<bool> {
        self.sent += 1;
        Ok(self.limit == 0 || self.sent < self.limit)
    }
}

/// Records the value of every sample arriving on `in`.
///
/// A blocking sink always fires and waits in `get`, which is what a process
/// director expects. A polling sink only fires when a token is waiting.
#[cadence_actor(no_default)]
pub struct Sink {
    seen: Log<u64>,
    blocking: bool,
}

impl Sink {
    pub fn polling(name: &str, seen: Log<u64>) -> ActorRef {
        ActorBuilder::new(name)
            .input("in")
            .build_atomic(Self { seen, blocking: false })
    }

    pub fn blocking(name: &str, seen: Log<u64>) -> ActorRef {
        ActorBuilder::new(name)
            .input("in")
            .build_atomic(Self { seen, blocking: true })
    }
}

#[async_trait::async_trait]
impl Actor for Sink {
    async fn prefire(&mut self, ctx: &FiringContext<'_>) -> anyhow::Result<bool> {
        Ok(self.blocking || ctx.has_token("in", 0))
    }

    async fn fire(&mut self, ctx: &FiringContext<'_>) -> anyhow::Result<()> {
        let token = ctx.get("in", 0).await?;
        if let Some(value) = Sample::value_of(&token) {
            self.seen.lock().push(value);
        }
        Ok(())
    }

    fn is_fire_functional(&self) -> bool {
        false
    }
}

/// Reads one token from `in` and forwards it to `out`.
#[cadence_actor(no_default)]
pub struct Relay {
    blocking: bool,
}

impl Relay {
    pub fn polling(name: &str) -> ActorRef {
        ActorBuilder::new(name)
            .input("in")
            .output("out")
            .build_atomic(Self { blocking: false })
    }

    pub fn blocking(name: &str) -> ActorRef {
        ActorBuilder::new(name)
            .input("in")
            .output("out")
            .build_atomic(Self { blocking: true })
    }
}

#[async_trait::async_trait]
impl Actor for Relay {
    async fn prefire(&mut self, ctx: &FiringContext<'_>) -> anyhow::Result<bool> {
        Ok(self.blocking || ctx.has_token("in", 0))
    }

    async fn fire(&mut self, ctx: &FiringContext<'_>) -> anyhow::Result<()> {
        let token = ctx.get("in", 0).await?;
        ctx.broadcast("out", token).await?;
        Ok(())
    }
}

/// Zero-port actor counting its firings. Stops after `limit` firings; a
/// limit of zero never stops.
#[cadence_actor(no_default)]
pub struct Counter {
    fired: Arc<AtomicU64>,
    limit: u64,
}

impl Counter {
    pub fn cell(name: &str, fired: Arc<AtomicU64>, limit: u64) -> ActorRef {
        ActorBuilder::new(name).build_atomic(Self { fired, limit })
    }
}

#[async_trait::async_trait]
impl Actor for Counter {
    async fn initialize(&mut self, _ctx: &FiringContext<'_>) -> anyhow::Result<()> {
        self.fired.store(0, Ordering::SeqCst);
        Ok(())
    }

    async fn fire(&mut self, _ctx: &FiringContext<'_>) -> anyhow::Result<()> {
        self.fired.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn postfire(&mut self, _ctx: &FiringContext<'_>) -> anyhow::Result<bool> {
        Ok(self.limit == 0 || self.fired.load(Ordering::SeqCst) < self.limit)
    }

    fn is_fire_functional(&self) -> bool {
        false
    }
}

/// Zero-port actor writing the name of every lifecycle hook it sees.
#[cadence_actor(no_default)]
pub struct LifecycleRecorder {
    log: Log<String>,
    iterations: u64,
    done: u64,
}

impl LifecycleRecorder {
    pub fn cell(name: &str, log: Log<String>, iterations: u64) -> ActorRef {
        ActorBuilder::new(name).build_atomic(Self {
            log,
            iterations,
            done: 0,
        })
    }

    fn record(&self, hook: &str) {
        self.log.lock().push(hook.to_string());
    }
}

#[async_trait::async_trait]
impl Actor for LifecycleRecorder {
    async fn preinitialize(&mut self, _ctx: &FiringContext<'_>) -> anyhow::Result<()> {
        self.done = 0;
        self.record("preinitialize");
        Ok(())
    }

    async fn initialize(&mut self, _ctx: &FiringContext<'_>) -> anyhow::Result<()> {
        self.record("initialize");
        Ok(())
    }

    async fn prefire(&mut self, _ctx: &FiringContext<'_>) -> anyhow::Result<bool> {
        self.record("prefire");
        Ok(true)
    }

    async fn fire(&mut self, _ctx: &FiringContext<'_>) -> anyhow::Result<()> {
        self.record("fire");
        Ok(())
    }

    async fn postfire(&mut self, _ctx: &FiringContext<'_>) -> anyhow::Result<bool> {
        self.record("postfire");
        self.done += 1;
        Ok(self.done < self.iterations)
    }

    async fn wrapup(&mut self, _ctx: &FiringContext<'_>) -> anyhow::Result<()> {
        self.record("wrapup");
        Ok(())
    }
}
