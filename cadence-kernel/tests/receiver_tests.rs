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

use std::sync::Arc;
use std::time::Duration;

use cadence_kernel::prelude::*;
use cadence_kernel::receiver::{BlockKind, ThreadMonitor};
use parking_lot::Mutex;

use crate::setup::initialize_tracing;
use crate::setup::tokens::Sample;

mod setup;

/// Records every transition reported by a blocking receiver.
#[derive(Debug, Default)]
struct MonitorLog {
    transitions: Mutex<Vec<String>>,
}

impl MonitorLog {
    fn transitions(&self) -> Vec<String> {
        self.transitions.lock().clone()
    }
}

impl ThreadMonitor for MonitorLog {
    fn thread_blocked(&self, kind: BlockKind) {
        self.transitions.lock().push(format!("blocked {kind:?}"));
    }

    fn thread_unblocked(&self, kind: BlockKind) {
        self.transitions.lock().push(format!("unblocked {kind:?}"));
    }

    fn thread_paused(&self) {
        self.transitions.lock().push("paused".to_string());
    }

    fn thread_unpaused(&self) {
        self.transitions.lock().push("unpaused".to_string());
    }
}

fn monitored(capacity: usize) -> (Arc<BlockingQueueReceiver>, Arc<MonitorLog>) {
    let log = Arc::new(MonitorLog::default());
    let monitor: Arc<dyn ThreadMonitor> = log.clone();
    (Arc::new(BlockingQueueReceiver::new(capacity, Some(monitor))), log)
}

/// A reader waiting on an empty queue is woken by the next put, and the
/// monitor sees exactly one block and one release.
#[tokio::test]
async fn test_blocking_get_waits_for_put() -> anyhow::Result<()> {
    initialize_tracing();
    let (receiver, log) = monitored(1);

    let reader = {
        let receiver = Arc::clone(&receiver);
        tokio::spawn(async move { receiver.get().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(receiver.is_read_blocked());
    assert!(!reader.is_finished());

    receiver.put(Sample::token(7)).await?;
    let token = tokio::time::timeout(Duration::from_secs(5), reader).await???;

    assert_eq!(Sample::value_of(&token), Some(7));
    assert!(!receiver.is_read_blocked());
    assert_eq!(log.transitions(), vec!["blocked Read", "unblocked Read"]);
    Ok(())
}

/// A writer facing a full queue waits until a token is taken.
#[tokio::test]
async fn test_blocking_put_waits_for_room() -> anyhow::Result<()> {
    initialize_tracing();
    let (receiver, log) = monitored(1);
    receiver.put(Sample::token(1)).await?;
    assert!(!receiver.has_room());

    let writer = {
        let receiver = Arc::clone(&receiver);
        tokio::spawn(async move { receiver.put(Sample::token(2)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(receiver.is_write_blocked());

    let first = receiver.get().await?;
    tokio::time::timeout(Duration::from_secs(5), writer).await???;
    let second = receiver.get().await?;

    assert_eq!(Sample::value_of(&first), Some(1));
    assert_eq!(Sample::value_of(&second), Some(2));
    assert_eq!(log.transitions(), vec!["blocked Write", "unblocked Write"]);
    Ok(())
}

/// Raising the capacity releases a writer waiting for room.
#[tokio::test]
async fn test_growing_capacity_releases_writer() -> anyhow::Result<()> {
    initialize_tracing();
    let (receiver, _log) = monitored(1);
    receiver.put(Sample::token(1)).await?;

    let writer = {
        let receiver = Arc::clone(&receiver);
        tokio::spawn(async move { receiver.put(Sample::token(2)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(receiver.is_write_blocked());

    receiver.set_capacity(2);
    tokio::time::timeout(Duration::from_secs(5), writer).await???;
    assert_eq!(receiver.size(), 2);
    assert_eq!(receiver.capacity(), Some(2));
    Ok(())
}

/// Finishing a receiver ends every waiting and future call.
#[tokio::test]
async fn test_finish_releases_waiters() -> anyhow::Result<()> {
    initialize_tracing();
    let (receiver, log) = monitored(1);

    let reader = {
        let receiver = Arc::clone(&receiver);
        tokio::spawn(async move { receiver.get().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    receiver.request_finish();

    let result = tokio::time::timeout(Duration::from_secs(5), reader).await??;
    assert!(matches!(result, Err(KernelError::ProcessTerminated)));
    assert!(matches!(receiver.put(Sample::token(1)).await, Err(KernelError::ProcessTerminated)));
    assert_eq!(log.transitions(), vec!["blocked Read", "unblocked Read"]);

    receiver.restart();
    receiver.put(Sample::token(3)).await?;
    assert_eq!(receiver.size(), 1);
    Ok(())
}

/// While paused, a reader that could proceed is held and reported as paused.
#[tokio::test]
async fn test_pause_holds_reader_with_token() -> anyhow::Result<()> {
    initialize_tracing();
    let (receiver, log) = monitored(2);
    receiver.put(Sample::token(5)).await?;
    receiver.request_pause(true);

    let reader = {
        let receiver = Arc::clone(&receiver);
        tokio::spawn(async move { receiver.get().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!reader.is_finished());
    assert_eq!(log.transitions(), vec!["paused"]);

    receiver.request_pause(false);
    let token = tokio::time::timeout(Duration::from_secs(5), reader).await???;
    assert_eq!(Sample::value_of(&token), Some(5));
    assert_eq!(log.transitions(), vec!["paused", "unpaused"]);
    Ok(())
}

/// Non-blocking receivers fail instead of waiting, exactly when the
/// matching query is false.
#[tokio::test]
async fn test_non_blocking_receivers_fail_fast() -> anyhow::Result<()> {
    initialize_tracing();
    let queue = QueueReceiver::new(Some(1));
    assert!(!queue.has_token());
    assert!(matches!(queue.get().await, Err(KernelError::NoToken { .. })));
    queue.put(Sample::token(1)).await?;
    assert!(!queue.has_room());
    assert!(matches!(queue.put(Sample::token(2)).await, Err(KernelError::NoRoom { .. })));

    let mailbox = Mailbox::new();
    mailbox.put(Sample::token(1)).await?;
    assert!(matches!(mailbox.put(Sample::token(2)).await, Err(KernelError::NoRoom { .. })));
    assert_eq!(Sample::value_of(&mailbox.get().await?), Some(1));
    assert!(mailbox.is_empty());

    let fixed_point = FixedPointReceiver::new();
    assert!(!fixed_point.is_known());
    fixed_point.clear()?;
    assert!(fixed_point.is_known() && !fixed_point.has_token());
    Ok(())
}

/// Unbounded queues keep arrival order and a bounded history of taken tokens.
#[tokio::test]
async fn test_queue_history_and_peek() -> anyhow::Result<()> {
    initialize_tracing();
    let queue = QueueReceiver::unbounded().with_history(2);
    for value in 0..4 {
        queue.put(Sample::token(value)).await?;
    }
    assert_eq!(queue.capacity(), None);
    assert_eq!(queue.peek(1).as_ref().and_then(Sample::value_of), Some(1));

    let mut taken = Vec::new();
    while queue.has_token() {
        taken.push(Sample::value_of(&queue.get().await?));
    }
    assert_eq!(taken, vec![Some(0), Some(1), Some(2), Some(3)]);
    let history: Vec<_> = queue.history().iter().map(Sample::value_of).collect();
    assert_eq!(history, vec![Some(2), Some(3)]);
    Ok(())
}
