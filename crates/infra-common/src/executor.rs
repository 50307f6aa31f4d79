//! Serial execution contexts.
//!
//! A call session is bound at construction to a single serial execution
//! context. Every public mutating operation on the session either runs
//! synchronously if the caller is already on that context, or is redirected
//! onto it, which makes the session state machine single-writer without
//! internal locking.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A unit of work scheduled onto a serial context.
pub type Job = Box<dyn FnOnce() + Send>;

/// A serial execution context with exactly two capabilities: run a unit of
/// work, and answer whether the caller is already on the context.
///
/// Implemented by [`ThreadSerialExecutor`] in production and by
/// [`ManualExecutor`] in tests, where work is drained deterministically.
pub trait SerialExecutor: Send + Sync {
    /// Enqueue a unit of work. Work runs in submission order, one unit at
    /// a time.
    fn dispatch(&self, work: Job);

    /// Whether the calling thread is currently executing on this context.
    fn is_current(&self) -> bool;
}

/// Run `work` synchronously if already on `executor`, otherwise enqueue it.
///
/// This is the redirect rule every public mutating session operation
/// follows.
pub fn run_on(executor: &dyn SerialExecutor, work: Job) {
    if executor.is_current() {
        work();
    } else {
        executor.dispatch(work);
    }
}

/// Production serial executor backed by a dedicated worker thread.
///
/// Work is drained from an unbounded channel in submission order. Dropping
/// the executor closes the channel; the worker finishes queued work and
/// exits.
pub struct ThreadSerialExecutor {
    tx: mpsc::UnboundedSender<Job>,
    worker_id: ThreadId,
    worker: Option<JoinHandle<()>>,
}

impl ThreadSerialExecutor {
    /// Spawn a new serial executor with a named worker thread.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                while let Some(job) = rx.blocking_recv() {
                    job();
                }
                debug!("serial executor worker exiting");
            })
            .expect("failed to spawn serial executor thread");

        let worker_id = worker.thread().id();
        debug!("started serial executor {:?}", name);

        Self {
            tx,
            worker_id,
            worker: Some(worker),
        }
    }
}

impl SerialExecutor for ThreadSerialExecutor {
    fn dispatch(&self, work: Job) {
        if self.tx.send(work).is_err() {
            warn!("dispatch on a shut-down serial executor, dropping work");
        }
    }

    fn is_current(&self) -> bool {
        thread::current().id() == self.worker_id
    }
}

impl Drop for ThreadSerialExecutor {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain remaining work and exit.
        let (closed_tx, _rx) = mpsc::unbounded_channel();
        self.tx = closed_tx;
        if let Some(worker) = self.worker.take() {
            if thread::current().id() != self.worker_id {
                let _ = worker.join();
            }
        }
    }
}

/// Deterministic serial executor for tests.
///
/// Work accumulates in a queue and only runs when the test calls
/// [`ManualExecutor::run_until_idle`], on the calling thread. `is_current`
/// is true exactly while a drained job is running, so redirect logic can be
/// exercised without real threads or timers.
#[derive(Default)]
pub struct ManualExecutor {
    queue: Mutex<VecDeque<Job>>,
    draining: AtomicBool,
    drain_thread: Mutex<Option<ThreadId>>,
}

impl ManualExecutor {
    /// Create an empty executor.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of queued units of work.
    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Run queued work on the calling thread until the queue is empty,
    /// including work enqueued by the work itself. Returns the number of
    /// units executed.
    pub fn run_until_idle(&self) -> usize {
        *self.drain_thread.lock().unwrap() = Some(thread::current().id());
        self.draining.store(true, Ordering::SeqCst);

        let mut ran = 0;
        loop {
            let job = self.queue.lock().unwrap().pop_front();
            match job {
                Some(job) => {
                    job();
                    ran += 1;
                }
                None => break,
            }
        }

        self.draining.store(false, Ordering::SeqCst);
        *self.drain_thread.lock().unwrap() = None;
        ran
    }
}

impl SerialExecutor for ManualExecutor {
    fn dispatch(&self, work: Job) {
        self.queue.lock().unwrap().push_back(work);
    }

    fn is_current(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
            && *self.drain_thread.lock().unwrap() == Some(thread::current().id())
    }
}
