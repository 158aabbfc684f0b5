//! Stage queues
//!
//! Stages never call each other directly; every hand-off goes through a
//! [`TaskQueue`]. [`MemoryBroker`] is the in-process implementation with the
//! delivery guarantees a networked broker would give:
//!
//! - each queue is ordered by message priority, then publish order
//! - at most `prefetch` deliveries per queue are un-acked at once
//! - a [`Delivery`] dropped without [`Delivery::ack`] is requeued
//!   (at-least-once)

use crate::{PipelineError, Result};
use async_trait::async_trait;
use sonar_core::PipelineTask;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

/// Broker abstraction used by the scheduler
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Create a queue if it does not exist yet
    async fn declare(&self, queue: &str, prefetch: usize) -> Result<()>;

    /// Enqueue a task with a message priority (higher is served first)
    async fn publish(&self, queue: &str, task: PipelineTask, priority: u8) -> Result<()>;

    /// Wait for the next task; `None` once the broker is closed
    async fn receive(&self, queue: &str) -> Option<Delivery>;

    /// Stop delivering and wake every waiting receiver
    fn close(&self);
}

/// Settles a delivery with the broker that produced it
pub trait Acknowledger: Send {
    fn ack(self: Box<Self>);
    fn reject(self: Box<Self>, requeue: bool);
}

/// A task handed to a consumer
///
/// Must be settled with [`ack`](Self::ack) or [`reject`](Self::reject);
/// dropping it unsettled requeues the task.
pub struct Delivery {
    task: Arc<PipelineTask>,
    acker: Option<Box<dyn Acknowledger>>,
}

impl Delivery {
    pub fn new(task: Arc<PipelineTask>, acker: Box<dyn Acknowledger>) -> Self {
        Self {
            task,
            acker: Some(acker),
        }
    }

    pub fn task(&self) -> &Arc<PipelineTask> {
        &self.task
    }

    /// Confirm the task was handled
    pub fn ack(mut self) {
        if let Some(acker) = self.acker.take() {
            acker.ack();
        }
    }

    /// Give the task back, optionally for redelivery
    pub fn reject(mut self, requeue: bool) {
        if let Some(acker) = self.acker.take() {
            acker.reject(requeue);
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if let Some(acker) = self.acker.take() {
            tracing::debug!(task_id = %self.task.task_id, "Unsettled delivery dropped, requeueing");
            acker.reject(true);
        }
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("task_id", &self.task.task_id)
            .field("settled", &self.acker.is_none())
            .finish()
    }
}

struct Envelope {
    priority: u8,
    seq: u64,
    task: Arc<PipelineTask>,
}

impl PartialEq for Envelope {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Envelope {}

impl PartialOrd for Envelope {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Envelope {
    // Max-heap: higher priority first, then lower sequence number
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct QueueState {
    name: String,
    ready: Mutex<BinaryHeap<Envelope>>,
    unacked: Mutex<HashMap<u64, Envelope>>,
    prefetch: Arc<Semaphore>,
    notify: Notify,
    closed: AtomicBool,
}

impl QueueState {
    fn new(name: &str, prefetch: usize) -> Self {
        Self {
            name: name.to_string(),
            ready: Mutex::new(BinaryHeap::new()),
            unacked: Mutex::new(HashMap::new()),
            prefetch: Arc::new(Semaphore::new(prefetch)),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn push(&self, envelope: Envelope) {
        lock(&self.ready).push(envelope);
        self.notify.notify_one();
    }

    fn close(&self) {
        self.closed.store(true, AtomicOrdering::SeqCst);
        self.prefetch.close();
        self.notify.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(AtomicOrdering::SeqCst)
    }
}

struct MemoryAck {
    queue: Arc<QueueState>,
    seq: u64,
    _permit: OwnedSemaphorePermit,
}

impl Acknowledger for MemoryAck {
    fn ack(self: Box<Self>) {
        lock(&self.queue.unacked).remove(&self.seq);
    }

    fn reject(self: Box<Self>, requeue: bool) {
        let envelope = lock(&self.queue.unacked).remove(&self.seq);
        match envelope {
            Some(envelope) if requeue && !self.queue.is_closed() => {
                // Same sequence number: the task keeps its place in line
                self.queue.push(envelope);
            }
            Some(envelope) => {
                tracing::debug!(
                    queue = %self.queue.name,
                    task_id = %envelope.task.task_id,
                    "Delivery discarded"
                );
            }
            None => {}
        }
    }
}

/// In-process broker with named priority queues
#[derive(Default)]
pub struct MemoryBroker {
    queues: RwLock<HashMap<String, Arc<QueueState>>>,
    next_seq: AtomicU64,
    closed: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, name: &str) -> Option<Arc<QueueState>> {
        self.queues
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }

    /// Tasks waiting for a consumer
    pub fn ready_count(&self, queue: &str) -> usize {
        self.queue(queue).map_or(0, |q| {
            let ready = lock(&q.ready);
            ready.len()
        })
    }

    /// Deliveries handed out but not yet settled
    pub fn unacked_count(&self, queue: &str) -> usize {
        self.queue(queue).map_or(0, |q| {
            let unacked = lock(&q.unacked);
            unacked.len()
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl TaskQueue for MemoryBroker {
    async fn declare(&self, queue: &str, prefetch: usize) -> Result<()> {
        if prefetch == 0 {
            return Err(PipelineError::Queue(format!(
                "queue '{}' needs a prefetch of at least 1",
                queue
            )));
        }
        if self.is_closed() {
            return Err(PipelineError::Queue("broker is closed".into()));
        }

        let mut queues = self
            .queues
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        queues
            .entry(queue.to_string())
            .or_insert_with(|| Arc::new(QueueState::new(queue, prefetch)));
        Ok(())
    }

    async fn publish(&self, queue: &str, task: PipelineTask, priority: u8) -> Result<()> {
        if self.is_closed() {
            return Err(PipelineError::Queue("broker is closed".into()));
        }
        let state = self
            .queue(queue)
            .ok_or_else(|| PipelineError::Queue(format!("unknown queue '{}'", queue)))?;

        let seq = self.next_seq.fetch_add(1, AtomicOrdering::SeqCst);
        state.push(Envelope {
            priority,
            seq,
            task: Arc::new(task),
        });
        Ok(())
    }

    async fn receive(&self, queue: &str) -> Option<Delivery> {
        let state = self.queue(queue)?;
        let permit = state.prefetch.clone().acquire_owned().await.ok()?;

        loop {
            let notified = state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if state.is_closed() {
                return None;
            }

            let next = lock(&state.ready).pop();
            if let Some(envelope) = next {
                let task = envelope.task.clone();
                let seq = envelope.seq;
                lock(&state.unacked).insert(seq, envelope);
                let acker = MemoryAck {
                    queue: state.clone(),
                    seq,
                    _permit: permit,
                };
                return Some(Delivery::new(task, Box::new(acker)));
            }

            notified.await;
        }
    }

    fn close(&self) {
        self.closed.store(true, AtomicOrdering::SeqCst);
        let queues = self
            .queues
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for state in queues.values() {
            state.close();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
