use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{trace, warn};

use super::{Result, RuntimeError};

/// Default number of tasks a single tick may run before it is treated as a livelock.
pub const DEFAULT_MAX_TASKS_PER_TICK: usize = 10_000;

type Task = Box<dyn FnOnce() + Send>;

/// Deferred-task queue standing in for the host's microtask queue.
///
/// Supports both a global runtime (default) and scoped runtimes for isolation.
/// Work queued with [`Runtime::queue_microtask`] never runs synchronously; it
/// runs when the owner of the run loop ends the current tick with
/// [`Runtime::run_pending`].
///
/// # Examples
///
/// Using scoped runtimes for isolation:
///
/// ```
/// use keyed_store::runtime::Runtime;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// Runtime::scope(|| {
///     let hits = Arc::new(AtomicUsize::new(0));
///     let hits_clone = hits.clone();
///     Runtime::current().queue_microtask(move || {
///         hits_clone.fetch_add(1, Ordering::SeqCst);
///     });
///     assert_eq!(hits.load(Ordering::SeqCst), 0);
///
///     Runtime::current().run_pending().unwrap();
///     assert_eq!(hits.load(Ordering::SeqCst), 1);
/// });
/// // Runtime and all its queued work is dropped here
/// ```
pub struct Runtime {
    queue: Mutex<VecDeque<Task>>,
    max_tasks_per_tick: AtomicUsize,
}

// Thread-local stack for scoped runtimes
thread_local! {
    static RUNTIME_STACK: RefCell<Vec<Arc<Runtime>>> = const { RefCell::new(Vec::new()) };
}

impl Runtime {
    /// Create a new isolated runtime with an empty queue.
    pub fn new() -> Arc<Self> {
        Arc::new(Runtime {
            queue: Mutex::new(VecDeque::new()),
            max_tasks_per_tick: AtomicUsize::new(DEFAULT_MAX_TASKS_PER_TICK),
        })
    }

    /// Set how many tasks one call to [`Runtime::run_pending`] may run.
    pub fn with_max_tasks_per_tick(self: Arc<Self>, max: usize) -> Arc<Self> {
        self.max_tasks_per_tick.store(max.max(1), Ordering::SeqCst);
        self
    }

    /// Run a function with a fresh isolated runtime.
    ///
    /// The runtime and anything still queued on it is dropped when the
    /// function returns.
    pub fn scope<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let runtime = Self::new();
        Self::with_runtime(runtime, f)
    }

    /// Get or create the global runtime (fallback).
    pub fn global() -> Arc<Self> {
        use std::sync::OnceLock;
        static RUNTIME: OnceLock<Arc<Runtime>> = OnceLock::new();
        Arc::clone(RUNTIME.get_or_init(Self::new))
    }

    /// Get the current runtime (scoped or global fallback).
    ///
    /// Returns the runtime from the top of the thread-local stack,
    /// or the global runtime if no scoped runtime is active.
    pub fn current() -> Arc<Self> {
        RUNTIME_STACK.with(|stack| stack.borrow().last().cloned().unwrap_or_else(Self::global))
    }

    /// Run a function with a specific runtime as the current context.
    ///
    /// This pushes the runtime onto the thread-local stack for the duration
    /// of the function execution.
    pub fn with_runtime<F, R>(runtime: Arc<Self>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().push(runtime);
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// Queue a task to run at the end of the current tick.
    pub fn queue_microtask<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut queue = self.lock();
        queue.push_back(Box::new(task));
        trace!(queued = queue.len(), "microtask queued");
    }

    /// Number of tasks waiting for the next tick.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// End the current tick: run queued tasks in FIFO order until the queue is
    /// empty, including tasks queued by the tasks being run.
    ///
    /// Returns the number of tasks run. Stops with [`RuntimeError::Livelock`]
    /// once the per-tick budget is spent; unrun tasks stay queued.
    pub fn run_pending(&self) -> Result<usize> {
        let max = self.max_tasks_per_tick.load(Ordering::SeqCst);
        let mut ran = 0;

        loop {
            if ran >= max {
                let remaining = self.pending();
                if remaining == 0 {
                    break;
                }
                warn!(ran, remaining, "tick exceeded its task budget");
                return Err(RuntimeError::Livelock { ran, remaining });
            }

            // Pop under the lock, run outside it so tasks can queue more work.
            let Some(task) = self.lock().pop_front() else {
                break;
            };
            task();
            ran += 1;
        }

        if ran > 0 {
            trace!(ran, "tick drained");
        }
        Ok(ran)
    }

    /// Drop every queued task without running it.
    pub fn clear(&self) {
        let dropped = std::mem::take(&mut *self.lock());
        trace!(dropped = dropped.len(), "runtime cleared");
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Task>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("pending", &self.pending())
            .field("max_tasks_per_tick", &self.max_tasks_per_tick.load(Ordering::SeqCst))
            .finish()
    }
}
