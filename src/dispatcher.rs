//! Action Dispatcher
//!
//! FIFO queue of deferred actions drained by a fixed pool of worker
//! threads, keeping application logic off the replication path.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};
use crate::types::Action;

/// Application logic run for every action
pub trait OffCriticalHandler<C>: Send + Sync {
    fn handle(&self, action: Action, context: &C);
}

impl<C, F> OffCriticalHandler<C> for F
where
    F: Fn(Action, &C) + Send + Sync,
{
    fn handle(&self, action: Action, context: &C) {
        self(action, context)
    }
}

/// Queue state guarded by one mutex
struct QueueState {
    actions: VecDeque<Action>,
    running: bool,
    dequeued: u64,
}

struct Shared {
    queue: Mutex<QueueState>,
    available: Condvar,
}

impl Shared {
    /// Block until an action is available; `None` once stopped and drained
    ///
    /// Returns the action with its dequeue sequence number, starting at 0.
    fn next_action(&self) -> Option<(u64, Action)> {
        let mut queue = self.queue.lock();
        while queue.actions.is_empty() && queue.running {
            self.available.wait(&mut queue);
        }
        let action = queue.actions.pop_front()?;
        let seq = queue.dequeued;
        queue.dequeued += 1;
        Some((seq, action))
    }
}

/// Bounded worker pool fed by `post`
pub struct ActionDispatcher {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for ActionDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionDispatcher {
    /// Create a dispatcher; it accepts actions once started
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(QueueState {
                    actions: VecDeque::new(),
                    running: false,
                    dequeued: 0,
                }),
                available: Condvar::new(),
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawn `pool_size` workers that hand actions to `handler` with `context`
    pub fn start<C>(
        &self,
        pool_size: usize,
        thread_name: &str,
        handler: Arc<dyn OffCriticalHandler<C>>,
        context: Arc<C>,
    ) -> Result<()>
    where
        C: Send + Sync + 'static,
    {
        if pool_size == 0 {
            return Err(Error::Config("dispatcher pool size must be at least 1".into()));
        }

        let mut workers = self.workers.lock();
        {
            let mut queue = self.shared.queue.lock();
            if queue.running || !workers.is_empty() {
                return Err(Error::Internal("action dispatcher already started".into()));
            }
            queue.running = true;
        }

        for i in 0..pool_size {
            let shared = Arc::clone(&self.shared);
            let handler = Arc::clone(&handler);
            let context = Arc::clone(&context);
            let spawned = std::thread::Builder::new()
                .name(format!("{}-{}", thread_name, i))
                .spawn(move || worker_loop(i, &shared, handler.as_ref(), &context));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    drop(workers);
                    self.destroy();
                    return Err(e.into());
                }
            }
        }

        tracing::debug!(pool_size, "action dispatcher started");
        Ok(())
    }

    /// Append an action and wake one idle worker
    ///
    /// Returns `false` without enqueueing once shutdown has begun.
    pub fn post(&self, action: Action) -> bool {
        {
            let mut queue = self.shared.queue.lock();
            if !queue.running {
                drop(queue);
                tracing::warn!(action = %action.id, "rejected action: dispatcher is not running");
                return false;
            }
            tracing::trace!(action = %action.id, key = %action.key, "posting action");
            queue.actions.push_back(action);
        }
        self.shared.available.notify_one();
        true
    }

    /// Stop accepting actions, drain the queue and join every worker
    ///
    /// Idempotent. Must not be called from a worker thread.
    pub fn destroy(&self) {
        self.shared.queue.lock().running = false;
        self.shared.available.notify_all();

        let workers: Vec<_> = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return;
        }
        let count = workers.len();
        for handle in workers {
            if handle.join().is_err() {
                tracing::error!("action dispatcher worker panicked");
            }
        }
        tracing::debug!(workers = count, "action dispatcher destroyed");
    }

    pub fn is_running(&self) -> bool {
        self.shared.queue.lock().running
    }

    /// Actions waiting for a worker
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().actions.len()
    }

    /// Actions handed to workers so far
    pub fn dequeued(&self) -> u64 {
        self.shared.queue.lock().dequeued
    }
}

impl Drop for ActionDispatcher {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn worker_loop<C>(index: usize, shared: &Shared, handler: &dyn OffCriticalHandler<C>, context: &C) {
    tracing::trace!(worker = index, "dispatcher worker started");
    // After shutdown, next_action keeps returning queued actions until empty.
    // A panicking handler loses only its own action; the worker keeps draining.
    while let Some((seq, action)) = shared.next_action() {
        tracing::trace!(worker = index, seq, action = %action.id, "dequeued action");
        let id = action.id;
        if catch_unwind(AssertUnwindSafe(|| handler.handle(action, context))).is_err() {
            tracing::error!(worker = index, action = %id, "action handler panicked");
        }
    }
    tracing::trace!(worker = index, "dispatcher worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, Object, RoutingKey};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn action(version: i64) -> Action {
        let mut object = Object::new(format!("k{}", version), "v");
        object.version = version;
        Action::new(RoutingKey::new(DataType(0), 0, 0), &object, 1, false)
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<i64>>,
        count: AtomicUsize,
    }

    fn recording_handler() -> Arc<dyn OffCriticalHandler<Recorder>> {
        Arc::new(|action: Action, recorder: &Recorder| {
            recorder.seen.lock().push(action.version);
            recorder.count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_post_before_start_is_rejected() {
        let dispatcher = ActionDispatcher::new();
        assert!(!dispatcher.post(action(0)));
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn test_single_worker_preserves_order() {
        let dispatcher = ActionDispatcher::new();
        let recorder = Arc::new(Recorder::default());
        dispatcher
            .start(1, "test-ocdp", recording_handler(), Arc::clone(&recorder))
            .unwrap();

        for v in 0..100 {
            assert!(dispatcher.post(action(v)));
        }
        dispatcher.destroy();

        assert_eq!(*recorder.seen.lock(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_many_workers_run_each_action_once() {
        let dispatcher = ActionDispatcher::new();
        let recorder = Arc::new(Recorder::default());
        dispatcher
            .start(4, "test-ocdp", recording_handler(), Arc::clone(&recorder))
            .unwrap();

        for v in 0..500 {
            dispatcher.post(action(v));
        }
        dispatcher.destroy();

        let mut seen = recorder.seen.lock().clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..500).collect::<Vec<_>>());
        assert_eq!(dispatcher.dequeued(), 500);
    }

    #[test]
    fn test_dequeue_is_fifo_single_thread() {
        let shared = Shared {
            queue: Mutex::new(QueueState {
                actions: VecDeque::new(),
                running: true,
                dequeued: 0,
            }),
            available: Condvar::new(),
        };
        for v in [1, 2, 3] {
            shared.queue.lock().actions.push_back(action(v));
        }
        shared.queue.lock().running = false;

        let order: Vec<i64> = std::iter::from_fn(|| shared.next_action())
            .map(|(_, a)| a.version)
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_dequeue_is_fifo_across_workers() {
        let shared = Arc::new(Shared {
            queue: Mutex::new(QueueState {
                actions: VecDeque::new(),
                running: true,
                dequeued: 0,
            }),
            available: Condvar::new(),
        });
        for v in 0..1000 {
            shared.queue.lock().actions.push_back(action(v));
        }
        shared.queue.lock().running = false;

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || {
                    let mut taken = Vec::new();
                    while let Some((seq, a)) = shared.next_action() {
                        taken.push((seq, a.version));
                    }
                    taken
                })
            })
            .collect();
        let mut taken: Vec<(u64, i64)> = threads
            .into_iter()
            .flat_map(|t| t.join().unwrap())
            .collect();
        taken.sort_unstable();

        assert_eq!(taken.len(), 1000);
        for (seq, version) in taken {
            assert_eq!(seq as i64, version);
        }
    }

    #[test]
    fn test_panicking_handler_does_not_lose_actions() {
        let dispatcher = ActionDispatcher::new();
        let recorder = Arc::new(Recorder::default());
        let flaky: Arc<dyn OffCriticalHandler<Recorder>> =
            Arc::new(|action: Action, recorder: &Recorder| {
                if action.version == 0 {
                    panic!("handler failure");
                }
                recorder.seen.lock().push(action.version);
            });
        dispatcher
            .start(1, "test-ocdp", flaky, Arc::clone(&recorder))
            .unwrap();

        for v in 0..5 {
            assert!(dispatcher.post(action(v)));
        }
        dispatcher.destroy();

        assert_eq!(*recorder.seen.lock(), vec![1, 2, 3, 4]);
        assert_eq!(dispatcher.pending(), 0);
        assert_eq!(dispatcher.dequeued(), 5);
    }

    #[test]
    fn test_shutdown_drains_queued_actions() {
        let dispatcher = ActionDispatcher::new();
        let recorder = Arc::new(Recorder::default());
        let slow: Arc<dyn OffCriticalHandler<Recorder>> =
            Arc::new(|action: Action, recorder: &Recorder| {
                std::thread::sleep(Duration::from_millis(2));
                recorder.seen.lock().push(action.version);
                recorder.count.fetch_add(1, Ordering::SeqCst);
            });
        dispatcher
            .start(2, "test-ocdp", slow, Arc::clone(&recorder))
            .unwrap();

        for v in 0..50 {
            dispatcher.post(action(v));
        }
        dispatcher.destroy();

        assert_eq!(recorder.count.load(Ordering::SeqCst), 50);
        assert_eq!(dispatcher.pending(), 0);

        // closed for good
        assert!(!dispatcher.post(action(99)));
        assert_eq!(dispatcher.pending(), 0);
        assert!(!dispatcher.is_running());

        // second destroy is a no-op
        dispatcher.destroy();
    }

    #[test]
    fn test_zero_pool_size_rejected() {
        let dispatcher = ActionDispatcher::new();
        let recorder = Arc::new(Recorder::default());
        assert!(dispatcher
            .start(0, "test-ocdp", recording_handler(), recorder)
            .is_err());
    }
}
