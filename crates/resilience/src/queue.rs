//! Request Queue (§4.6), grounded on the original's `RequestQueue`:
//! priority FIFO with backpressure, worker pool, and a monitor sweeper
//! that expires stale entries. `RequestBatcher` is not carried over —
//! out of scope for this spec.

use parking_lot::Mutex;
use serde::Serialize;
use sp_domain::{Error, Priority, QueueConfig, Result};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Notify, Semaphore};
use tokio_util::sync::CancellationToken;

pub type Processor<Req, Resp> =
    Arc<dyn Fn(Req) -> Pin<Box<dyn Future<Output = Result<Resp>> + Send>> + Send + Sync>;

struct Item<Req, Resp> {
    priority: Priority,
    seq: u64,
    enqueued_at: Instant,
    timeout: Duration,
    request: Req,
    tx: oneshot::Sender<Result<Resp>>,
}

impl<Req, Resp> Item<Req, Resp> {
    fn is_expired(&self) -> bool {
        self.enqueued_at.elapsed() > self.timeout
    }
}

impl<Req, Resp> PartialEq for Item<Req, Resp> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}
impl<Req, Resp> Eq for Item<Req, Resp> {}

impl<Req, Resp> PartialOrd for Item<Req, Resp> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<Req, Resp> Ord for Item<Req, Resp> {
    /// `BinaryHeap` is a max-heap: higher `Priority` (numerically smaller)
    /// and earlier enqueue order (smaller `seq`) must compare as greater.
    fn cmp(&self, other: &Self) -> Ordering {
        other.priority.cmp(&self.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default, Serialize, Clone, Copy)]
pub struct QueueStats {
    pub queue_size: usize,
    pub max_size: usize,
    pub active_requests: usize,
    pub max_concurrent: usize,
    pub total_enqueued: u64,
    pub total_processed: u64,
    pub total_dropped: u64,
    pub total_timeout: u64,
    pub total_errors: u64,
    pub success_rate: f64,
    pub drop_rate: f64,
    pub timeout_rate: f64,
    pub error_rate: f64,
}

struct Counters {
    enqueued: AtomicU64,
    processed: AtomicU64,
    dropped: AtomicU64,
    timeout: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn new() -> Self {
        Self {
            enqueued: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            timeout: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }
}

pub struct RequestQueue<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    config: QueueConfig,
    heap: Arc<Mutex<BinaryHeap<Item<Req, Resp>>>>,
    queue_slots: Arc<Semaphore>,
    active: Arc<Semaphore>,
    notify: Arc<Notify>,
    seq: AtomicU64,
    counters: Arc<Counters>,
    active_count: Arc<std::sync::atomic::AtomicUsize>,
    cancel: CancellationToken,
    workers: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl<Req, Resp> RequestQueue<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    pub fn new(config: QueueConfig) -> Self {
        let queue_slots = Arc::new(Semaphore::new(config.max_size));
        let active = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            heap: Arc::new(Mutex::new(BinaryHeap::new())),
            queue_slots,
            active,
            notify: Arc::new(Notify::new()),
            seq: AtomicU64::new(0),
            counters: Arc::new(Counters::new()),
            active_count: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
            cancel: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
            config,
        }
    }

    /// Spawn `config.workers` processing loops plus the monitor sweeper.
    pub fn start(&self, processor: Processor<Req, Resp>) {
        let mut handles = self.workers.lock();
        if !handles.is_empty() {
            return;
        }
        for _ in 0..self.config.workers {
            handles.push(tokio::spawn(worker_loop(
                self.heap.clone(),
                self.queue_slots.clone(),
                self.active.clone(),
                self.notify.clone(),
                self.counters.clone(),
                self.active_count.clone(),
                self.cancel.clone(),
                processor.clone(),
            )));
        }
        handles.push(tokio::spawn(monitor_loop(
            self.heap.clone(),
            self.config.max_size,
            self.config.monitor_interval_secs,
            self.counters.clone(),
            self.cancel.clone(),
        )));
        tracing::info!(workers = self.config.workers, max_size = self.config.max_size, "request queue started");
    }

    pub async fn stop(&self) {
        self.cancel.cancel();
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for h in handles {
            let _ = h.await;
        }
        let abandoned: Vec<_> = std::mem::take(&mut *self.heap.lock()).into_vec();
        for item in abandoned {
            let _ = item.tx.send(Err(Error::Cancelled));
        }
        tracing::info!("request queue stopped");
    }

    /// Enqueue `request` and await its result. `Error::QueueFull` when
    /// backpressure is enabled and the queue is at capacity;
    /// `Error::EnqueueTimeout` when backpressure is disabled and the
    /// blocking wait exceeds `enqueue_wait_secs`.
    pub async fn enqueue(&self, request: Req, priority: Priority, timeout: Option<Duration>) -> Result<Resp> {
        let permit = if self.config.enable_backpressure {
            match self.queue_slots.clone().try_acquire_owned() {
                Ok(p) => p,
                Err(_) => {
                    self.counters.dropped.fetch_add(1, AtomicOrdering::Relaxed);
                    return Err(Error::QueueFull);
                }
            }
        } else {
            let wait = Duration::from_secs(self.config.enqueue_wait_secs);
            match tokio::time::timeout(wait, self.queue_slots.clone().acquire_owned()).await {
                Ok(Ok(p)) => p,
                _ => {
                    self.counters.timeout.fetch_add(1, AtomicOrdering::Relaxed);
                    return Err(Error::EnqueueTimeout);
                }
            }
        };
        // The permit is released by the worker once it dequeues the item,
        // not here — it represents a reserved queue slot, not a processing slot.
        std::mem::forget(permit);

        let (tx, rx) = oneshot::channel();
        let item = Item {
            priority,
            seq: self.seq.fetch_add(1, AtomicOrdering::Relaxed),
            enqueued_at: Instant::now(),
            timeout: timeout.unwrap_or_else(|| Duration::from_secs(self.config.default_timeout_secs)),
            request,
            tx,
        };
        self.heap.lock().push(item);
        self.counters.enqueued.fetch_add(1, AtomicOrdering::Relaxed);
        self.notify.notify_one();

        rx.await.map_err(|_| Error::InternalError("queue worker dropped the response channel".into()))?
    }

    pub fn stats(&self) -> QueueStats {
        let enqueued = self.counters.enqueued.load(AtomicOrdering::Relaxed);
        let processed = self.counters.processed.load(AtomicOrdering::Relaxed);
        let dropped = self.counters.dropped.load(AtomicOrdering::Relaxed);
        let timeout = self.counters.timeout.load(AtomicOrdering::Relaxed);
        let errors = self.counters.errors.load(AtomicOrdering::Relaxed);
        let denom = enqueued.max(1) as f64;
        QueueStats {
            queue_size: self.heap.lock().len(),
            max_size: self.config.max_size,
            active_requests: self.active_count.load(AtomicOrdering::Relaxed),
            max_concurrent: self.config.max_concurrent,
            total_enqueued: enqueued,
            total_processed: processed,
            total_dropped: dropped,
            total_timeout: timeout,
            total_errors: errors,
            success_rate: processed as f64 / denom,
            drop_rate: dropped as f64 / denom,
            timeout_rate: timeout as f64 / denom,
            error_rate: errors as f64 / denom,
        }
    }

    /// Poll until the queue and all in-flight work drain, or `timeout`
    /// elapses.
    pub async fn wait_for_completion(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let idle = self.heap.lock().is_empty() && self.active_count.load(AtomicOrdering::Relaxed) == 0;
            if idle {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop<Req, Resp>(
    heap: Arc<Mutex<BinaryHeap<Item<Req, Resp>>>>,
    queue_slots: Arc<Semaphore>,
    active: Arc<Semaphore>,
    notify: Arc<Notify>,
    counters: Arc<Counters>,
    active_count: Arc<std::sync::atomic::AtomicUsize>,
    cancel: CancellationToken,
    processor: Processor<Req, Resp>,
) where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    loop {
        let item = loop {
            if let Some(item) = heap.lock().pop() {
                break Some(item);
            }
            tokio::select! {
                _ = notify.notified() => continue,
                _ = cancel.cancelled() => break None,
            }
        };
        let Some(item) = item else { break };
        queue_slots.add_permits(1);

        if item.is_expired() {
            counters.timeout.fetch_add(1, AtomicOrdering::Relaxed);
            let _ = item.tx.send(Err(Error::TimeoutInQueue));
            continue;
        }

        let Ok(active_permit) = active.clone().acquire_owned().await else { continue };
        active_count.fetch_add(1, AtomicOrdering::Relaxed);

        let remaining = item.timeout.saturating_sub(item.enqueued_at.elapsed());
        let result = match tokio::time::timeout(remaining, processor(item.request)).await {
            Ok(Ok(resp)) => {
                counters.processed.fetch_add(1, AtomicOrdering::Relaxed);
                Ok(resp)
            }
            Ok(Err(e)) => {
                counters.errors.fetch_add(1, AtomicOrdering::Relaxed);
                Err(e)
            }
            Err(_) => {
                counters.timeout.fetch_add(1, AtomicOrdering::Relaxed);
                Err(Error::AIServiceTimeout("request processing timeout".into()))
            }
        };
        let _ = item.tx.send(result);
        active_count.fetch_sub(1, AtomicOrdering::Relaxed);
        drop(active_permit);
    }
}

async fn monitor_loop<Req, Resp>(
    heap: Arc<Mutex<BinaryHeap<Item<Req, Resp>>>>,
    max_size: usize,
    interval_secs: u64,
    counters: Arc<Counters>,
    cancel: CancellationToken,
) where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    let interval = Duration::from_secs(interval_secs.max(1));
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => break,
        }
        let mut guard = heap.lock();
        let size = guard.len();
        if size as f64 > max_size as f64 * 0.8 {
            tracing::warn!(queue_size = size, max_size, "queue approaching capacity");
        }
        if size == 0 {
            continue;
        }
        let drained: Vec<_> = std::mem::take(&mut *guard).into_vec();
        let (expired, live): (Vec<_>, Vec<_>) = drained.into_iter().partition(|i| i.is_expired());
        for item in live {
            guard.push(item);
        }
        drop(guard);
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "cleaned expired requests from queue");
            counters.timeout.fetch_add(expired.len() as u64, AtomicOrdering::Relaxed);
            for item in expired {
                let _ = item.tx.send(Err(Error::TimeoutInQueue));
            }
        }
    }
}
