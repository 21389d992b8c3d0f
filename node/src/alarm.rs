//! The alarm: a single-writer timer service.
//!
//! A binary min-heap of `(wakeup, task)` pairs, drained by one dedicated
//! thread that posts due tasks onto the Tokio executor. Scheduling is safe
//! from any thread. Individual tasks are not cancellable; callers guard
//! themselves by capturing weak references. A `None` task is the shutdown
//! sentinel: the worker drains tasks due before it, then exits.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Work scheduled for a wakeup time.
pub type Task = Box<dyn FnOnce() + Send>;

struct Operation {
    wakeup: Instant,
    /// Insertion order, breaking wakeup ties first-come-first-served.
    id: u64,
    task: Option<Task>,
}

impl PartialEq for Operation {
    fn eq(&self, other: &Self) -> bool {
        self.wakeup == other.wakeup && self.id == other.id
    }
}

impl Eq for Operation {}

impl PartialOrd for Operation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Operation {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the earliest wakeup on top
        (other.wakeup, other.id).cmp(&(self.wakeup, self.id))
    }
}

struct AlarmState {
    operations: BinaryHeap<Operation>,
    next_id: u64,
}

struct AlarmInner {
    state: Mutex<AlarmState>,
    condition: Condvar,
    handle: tokio::runtime::Handle,
}

impl AlarmInner {
    fn run(&self) {
        enum Next {
            Shutdown,
            Due,
            WaitFor(Duration),
            WaitForever,
        }

        let mut state = self.state.lock().expect("alarm lock poisoned");
        loop {
            let next = match state.operations.peek() {
                Some(operation) if operation.task.is_none() => Next::Shutdown,
                Some(operation) => {
                    let now = Instant::now();
                    if operation.wakeup <= now {
                        Next::Due
                    } else {
                        Next::WaitFor(operation.wakeup - now)
                    }
                }
                None => Next::WaitForever,
            };
            match next {
                Next::Shutdown => break,
                Next::Due => {
                    let operation = state.operations.pop().expect("peeked operation");
                    if let Some(task) = operation.task {
                        self.handle.spawn(async move {
                            task();
                        });
                    }
                }
                Next::WaitFor(duration) => {
                    state = self
                        .condition
                        .wait_timeout(state, duration)
                        .expect("alarm lock poisoned")
                        .0;
                }
                Next::WaitForever => {
                    state = self.condition.wait(state).expect("alarm lock poisoned");
                }
            }
        }
    }

    fn push(&self, wakeup: Instant, task: Option<Task>) {
        let mut state = self.state.lock().expect("alarm lock poisoned");
        let id = state.next_id;
        state.next_id += 1;
        state.operations.push(Operation { wakeup, id, task });
        self.condition.notify_all();
    }
}

/// The timer service. Dropping it shuts the worker down.
pub struct Alarm {
    inner: Arc<AlarmInner>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Alarm {
    /// Start the worker thread, posting due tasks onto `handle`.
    pub fn new(handle: tokio::runtime::Handle) -> Arc<Self> {
        let inner = Arc::new(AlarmInner {
            state: Mutex::new(AlarmState {
                operations: BinaryHeap::new(),
                next_id: 0,
            }),
            condition: Condvar::new(),
            handle,
        });
        let inner_l = Arc::clone(&inner);
        let thread = std::thread::Builder::new()
            .name("alarm".into())
            .spawn(move || inner_l.run())
            .expect("failed to spawn alarm thread");
        Arc::new(Self {
            inner,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Schedule `task` to run at `wakeup`.
    pub fn add(&self, wakeup: Instant, task: impl FnOnce() + Send + 'static) {
        self.inner.push(wakeup, Some(Box::new(task)));
    }

    /// Schedule `task` to run after `delay`.
    pub fn add_delayed(&self, delay: Duration, task: impl FnOnce() + Send + 'static) {
        self.add(Instant::now() + delay, task);
    }

    /// Submit the shutdown sentinel and join the worker.
    pub fn shutdown(&self) {
        let thread = self.thread.lock().expect("alarm lock poisoned").take();
        if let Some(thread) = thread {
            self.inner.push(Instant::now(), None);
            let _ = thread.join();
        }
    }
}

impl Drop for Alarm {
    fn drop(&mut self) {
        self.shutdown();
    }
}
