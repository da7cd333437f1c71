//! Bounded-queue thread pool backing the socket server.
//!
//! Jobs are named closures pulled from a FIFO queue by a fixed set of
//! workers. The pool moves between three states: `Idle` (no workers,
//! queue may hold jobs), `Running` (workers draining the queue) and
//! `Exiting` (workers finish the queue, then leave). Stopping is always
//! cooperative; nothing interrupts a job mid-flight.

use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex},
    thread::{self, JoinHandle},
};

use tracing::{info, trace};

use crate::error::PoolError;

/// Pool lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// No workers alive; queued jobs wait for the next start.
    Idle,
    /// Workers are consuming the queue.
    Running,
    /// Workers drain the remaining queue and exit.
    Exiting,
}

struct Job {
    name: String,
    run: Box<dyn FnOnce() + Send + 'static>,
}

struct PoolInner {
    state: PoolState,
    queue: VecDeque<Job>,
    capacity: usize,
}

/// Fixed-size worker pool over a bounded FIFO job queue.
pub struct ThreadPool {
    name: String,
    size: usize,
    shared: Arc<(Mutex<PoolInner>, Condvar)>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    /// Creates an idle pool with `size` worker slots and a queue bounded at
    /// `capacity` jobs (`0` disables the bound).
    pub fn new(size: usize, capacity: usize, name: &str) -> Self {
        debug_assert!(size >= 1, "a pool needs at least one worker");
        ThreadPool {
            name: format!("{name}_thread_pool"),
            size,
            shared: Arc::new((
                Mutex::new(PoolInner {
                    state: PoolState::Idle,
                    queue: VecDeque::new(),
                    capacity,
                }),
                Condvar::new(),
            )),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the workers. Starting a pool that is not idle is an error.
    pub fn start(&self) -> Result<(), PoolError> {
        {
            let mut inner = self.shared.0.lock()?;
            if inner.state != PoolState::Idle {
                return Err(PoolError::AlreadyRunning(self.name.clone()));
            }
            inner.state = PoolState::Running;
        }

        info!("Starting thread pool '{}'", self.name);
        let mut workers = self.workers.lock()?;
        for index in 0..self.size {
            trace!("Starting worker '{index}'");
            let shared = Arc::clone(&self.shared);
            let name = self.name.clone();
            workers.push(thread::spawn(move || run_worker(&shared, &name)));
        }

        Ok(())
    }

    /// Enqueues a job and wakes one worker. Jobs queued while the pool is
    /// idle wait for the next start. A full queue rejects the job.
    pub fn queue(
        &self,
        name: impl Into<String>,
        run: impl FnOnce() + Send + 'static,
    ) -> Result<(), PoolError> {
        let job = Job {
            name: name.into(),
            run: Box::new(run),
        };

        {
            let mut inner = self.shared.0.lock()?;
            if inner.capacity > 0 && inner.queue.len() >= inner.capacity {
                return Err(PoolError::QueueFull {
                    name: self.name.clone(),
                    capacity: inner.capacity,
                });
            }
            trace!("Queued job '{}'", job.name);
            inner.queue.push_back(job);
        }
        self.shared.1.notify_one();

        Ok(())
    }

    /// Lets the workers finish every queued job, then stops them and
    /// returns the pool to idle.
    pub fn finish_and_stop(&self) -> Result<(), PoolError> {
        info!("Thread pool '{}' stopping", self.name);
        {
            let mut inner = self.shared.0.lock()?;
            if inner.state != PoolState::Running {
                return Err(PoolError::NotRunning(self.name.clone()));
            }
            inner.state = PoolState::Exiting;
        }
        self.shared.1.notify_all();

        self.join_workers()?;
        self.shared.0.lock()?.state = PoolState::Idle;
        info!("Thread pool '{}' stopped", self.name);

        Ok(())
    }

    /// Stops the workers after the jobs they are currently holding;
    /// queued-but-not-started jobs stay queued for a subsequent start.
    pub fn wait_and_pause(&self) -> Result<(), PoolError> {
        info!("Thread pool '{}' pausing", self.name);
        {
            let mut inner = self.shared.0.lock()?;
            if inner.state != PoolState::Running {
                return Err(PoolError::NotRunning(self.name.clone()));
            }
            inner.state = PoolState::Idle;
        }
        self.shared.1.notify_all();

        self.join_workers()?;
        info!("Thread pool '{}' paused", self.name);

        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PoolState {
        self.shared
            .0
            .lock()
            .map(|inner| inner.state)
            .unwrap_or(PoolState::Idle)
    }

    /// Number of jobs waiting in the queue.
    pub fn queued_jobs(&self) -> usize {
        self.shared
            .0
            .lock()
            .map(|inner| inner.queue.len())
            .unwrap_or(0)
    }

    fn join_workers(&self) -> Result<(), PoolError> {
        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock()?;
            workers.drain(..).collect()
        };

        trace!("Waiting for worker threads to finish");
        for handle in handles {
            let _ = handle.join();
        }

        Ok(())
    }
}

impl Drop for ThreadPool {
    /// A pool can only be dropped idle; a still-running pool is drained
    /// first so no queued work is lost.
    fn drop(&mut self) {
        if self.state() == PoolState::Running {
            let _ = self.finish_and_stop();
        }
    }
}

fn run_worker(shared: &(Mutex<PoolInner>, Condvar), pool_name: &str) {
    let (lock, cvar) = shared;

    'outer: loop {
        let Ok(mut inner) = lock.lock() else { return };

        loop {
            if inner.state == PoolState::Idle {
                trace!("Pool '{pool_name}' is idle, exiting worker");
                return;
            }

            if let Some(job) = inner.queue.pop_front() {
                if inner.queue.is_empty() {
                    // A waiter may be watching for emptiness.
                    cvar.notify_all();
                }
                drop(inner);

                trace!("Executing job '{}'", job.name);
                (job.run)();
                trace!("Executed job '{}'", job.name);

                continue 'outer;
            }

            if inner.state == PoolState::Exiting {
                trace!("Pool '{pool_name}' is exiting and the queue is empty, exiting worker");
                return;
            }

            inner = match cvar.wait(inner) {
                Ok(guard) => guard,
                Err(_) => return,
            };
        }
    }
}
