//SPDX-License-Identifier: MPL-2.0

/*!
A small elastic thread pool for blocking work.

The pool keeps `min_threads` workers alive and grows toward `max_threads` when a closure
arrives and no worker is idle.  Closures run exactly once, in no particular order.
*/

use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use crate::error::Error;

type Closure = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadPoolConfig {
    /// Worker thread name.
    pub name: String,
    pub min_threads: usize,
    pub max_threads: usize,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        ThreadPoolConfig {
            name: "native_shell worker".to_string(),
            min_threads: 3,
            max_threads: 15,
        }
    }
}

/**
A closure the pool refused.  Ownership of the closure returns to the caller.
*/
pub struct SubmitError {
    closure: Closure,
    error: Error,
}

impl SubmitError {
    pub fn error(&self) -> &Error {
        &self.error
    }

    pub fn into_closure(self) -> Box<dyn FnOnce() + Send> {
        self.closure
    }

    pub fn into_error(self) -> Error {
        self.error
    }
}

impl Debug for SubmitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmitError").field("error", &self.error).finish_non_exhaustive()
    }
}

struct Queue {
    jobs: VecDeque<Closure>,
    accepting: bool,
    idle: usize,
    threads: usize,
}

struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    config: ThreadPoolConfig,
}

impl ThreadPool {
    pub fn new(config: ThreadPoolConfig) -> Result<ThreadPool, Error> {
        if config.max_threads == 0 || config.min_threads > config.max_threads {
            return Err(Error::invalid_argument(format!(
                "thread pool bounds {}..={} are not usable",
                config.min_threads, config.max_threads
            )));
        }
        let pool = ThreadPool {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue {
                    jobs: VecDeque::new(),
                    accepting: true,
                    idle: 0,
                    threads: 0,
                }),
                available: Condvar::new(),
            }),
            workers: Mutex::new(Vec::new()),
            config,
        };
        for _ in 0..pool.config.min_threads {
            let mut queue = pool.shared.lock();
            pool.spawn_worker(&mut queue)?;
        }
        logwise::info_sync!(
            "Thread pool started with {threads} workers",
            threads = pool.config.min_threads
        );
        Ok(pool)
    }

    /// Spawns one worker; the caller holds the queue lock.
    fn spawn_worker(&self, queue: &mut Queue) -> Result<(), Error> {
        let shared = self.shared.clone();
        let handle = std::thread::Builder::new()
            .name(self.config.name.clone())
            .spawn(move || run_worker(&shared))
            .map_err(|e| Error::ResourceExhausted(format!("can't spawn pool worker: {e}")))?;
        queue.threads += 1;
        self.workers.lock().unwrap_or_else(PoisonError::into_inner).push(handle);
        Ok(())
    }

    /**
    Runs `closure` exactly once on some worker.

    If the pool is shutting down, or no worker exists and none can be spawned, the closure
    comes back inside the error.
    */
    pub fn run_closure<F: FnOnce() + Send + 'static>(&self, closure: F) -> Result<(), SubmitError> {
        let closure: Closure = Box::new(closure);
        let mut queue = self.shared.lock();
        if !queue.accepting {
            return Err(SubmitError {
                closure,
                error: Error::ResourceExhausted("thread pool is no longer accepting work".to_string()),
            });
        }
        if queue.idle <= queue.jobs.len() && queue.threads < self.config.max_threads {
            if let Err(e) = self.spawn_worker(&mut queue) {
                if queue.threads == 0 {
                    return Err(SubmitError { closure, error: e });
                }
                logwise::warn_sync!("Thread pool can't grow: {err}", err = logwise::privacy::LogIt(&e));
            }
        }
        queue.jobs.push_back(closure);
        self.shared.available.notify_one();
        Ok(())
    }

    pub fn threads(&self) -> usize {
        self.shared.lock().threads
    }

    /**
    Stops accepting work, lets workers finish everything already queued, and calls
    `on_completed` from a helper thread once every worker has exited.

    Returns immediately, so the calling thread can keep serving work the queued closures
    depend on.
    */
    pub fn cleanup<F: FnOnce() + Send + 'static>(&self, on_completed: F) -> Result<(), Error> {
        self.stop_accepting();
        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        std::thread::Builder::new()
            .name(format!("{} cleanup", self.config.name))
            .spawn(move || {
                for worker in workers {
                    if worker.join().is_err() {
                        logwise::error_sync!("Pool worker exited abnormally");
                    }
                }
                logwise::info_sync!("Thread pool drained");
                on_completed();
            })
            .map(|_| ())
            .map_err(|e| Error::ResourceExhausted(format!("can't spawn pool cleanup: {e}")))
    }

    fn stop_accepting(&self) {
        self.shared.lock().accepting = false;
        self.shared.available.notify_all();
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        //queued work still runs; workers exit once the queue is empty
        self.stop_accepting();
    }
}

fn run_worker(shared: &Shared) {
    let mut queue = shared.lock();
    loop {
        if let Some(job) = queue.jobs.pop_front() {
            drop(queue);
            if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(job)) {
                let e = Error::from_panic("pool closure", payload);
                logwise::error_sync!("{err}", err = logwise::privacy::LogIt(&e));
            }
            queue = shared.lock();
        } else if !queue.accepting {
            queue.threads -= 1;
            return;
        } else {
            queue.idle += 1;
            queue = shared.available.wait(queue).unwrap_or_else(PoisonError::into_inner);
            queue.idle -= 1;
        }
    }
}
