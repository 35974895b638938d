// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Thread groups and thread pools.
//!
//! All of the node's worker threads (UDP receivers, the transfer
//! accept loop, per-zone transfer clients, and the pool that processes
//! individual queries and connections) run inside one
//! [`ThreadGroup`], so the whole node can be shut down by shutting
//! down the group. Long-running tasks poll
//! [`ThreadGroup::is_shutting_down`] (or sleep through
//! [`ThreadGroup::wait_for_shutdown`]) and exit when it fires.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};

use log::error;
use slab::Slab;

////////////////////////////////////////////////////////////////////////
// THREAD GROUPS                                                      //
////////////////////////////////////////////////////////////////////////

/// How long to wait before re-running a respawnable task that exited
/// or panicked, so a crash loop cannot use up all CPU time.
const RESPAWN_DELAY: Duration = Duration::from_secs(1);

/// A group of threads managed and shut down together.
///
/// A `ThreadGroup` supports respawnable threads (whose task is re-run
/// if it exits or panics; see [`ThreadGroup::start_respawnable`]) and
/// child [`ThreadPool`]s of permanent workers accepting one-shot tasks
/// (see [`ThreadGroup::start_pool`]). Once [`ThreadGroup::shut_down`]
/// is called, no new threads start, respawnable tasks are not
/// restarted, and [`ThreadGroup::await_shutdown`] unblocks when every
/// thread has exited.
pub struct ThreadGroup {
    records: Mutex<GroupRecords>,

    /// Notified when shutdown is initiated and again when the last
    /// thread exits. Used with the `records` mutex.
    shutdown_wakeup: Condvar,
}

#[derive(Default)]
struct GroupRecords {
    thread_count: usize,
    pools: Slab<Arc<ThreadPool>>,
    shutting_down: bool,
}

impl ThreadGroup {
    /// Creates a new thread group.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(GroupRecords::default()),
            shutdown_wakeup: Condvar::new(),
        })
    }

    /// Returns whether shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.records.lock().unwrap().shutting_down
    }

    /// Initiates shutdown: wakes every waiting thread and tells the
    /// child pools to wind down.
    pub fn shut_down(&self) {
        let pools: Vec<Arc<ThreadPool>> = {
            let mut records = self.records.lock().unwrap();
            if records.shutting_down {
                return;
            }
            records.shutting_down = true;
            self.shutdown_wakeup.notify_all();
            records.pools.iter().map(|(_, pool)| pool.clone()).collect()
        };
        for pool in pools {
            pool.begin_shutdown();
        }
    }

    /// Blocks until shutdown has been initiated and every thread in
    /// the group has exited.
    pub fn await_shutdown(&self) {
        let mut records = self.records.lock().unwrap();
        while !records.shutting_down || records.thread_count > 0 {
            records = self.shutdown_wakeup.wait(records).unwrap();
        }
    }

    /// Sleeps for up to `timeout`, waking early if shutdown is
    /// initiated. Returns whether the group is shutting down.
    pub fn wait_for_shutdown(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut records = self.records.lock().unwrap();
        loop {
            if records.shutting_down {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .shutdown_wakeup
                .wait_timeout(records, deadline - now)
                .unwrap();
            records = guard;
        }
    }

    /// Starts a respawnable thread. `task` is re-run (after a short
    /// delay) whenever it exits or panics, until the group shuts down.
    pub fn start_respawnable<F>(self: &Arc<Self>, name: Option<String>, task: F) -> Result<(), Error>
    where
        F: Fn() + Send + 'static,
    {
        let group = self.clone();
        let thread_name = name.clone();
        self.spawn_registered(name, move || loop {
            if panic::catch_unwind(AssertUnwindSafe(&task)).is_err() {
                error!(
                    "thread {} panicked",
                    thread_name.as_deref().unwrap_or("(unnamed)"),
                );
            }
            if group.wait_for_shutdown(RESPAWN_DELAY) {
                return;
            }
        })
    }

    /// Starts a child [`ThreadPool`] with `base_workers` permanent
    /// workers. Auxiliary workers spawned for bursts exit after
    /// `linger` without work.
    pub fn start_pool(
        self: &Arc<Self>,
        name: Option<String>,
        base_workers: usize,
        linger: Duration,
    ) -> Result<Arc<ThreadPool>, Error> {
        let pool = Arc::new(ThreadPool {
            group: Arc::downgrade(self),
            name: name.clone(),
            linger,
            inner: Mutex::new(PoolInner::default()),
            work_available: Condvar::new(),
        });

        {
            let mut records = self.records.lock().unwrap();
            if records.shutting_down {
                return Err(Error::ShuttingDown);
            }
            records.pools.insert(pool.clone());
        }

        for i in 0..base_workers {
            let pool = pool.clone();
            let worker_name = name.as_ref().map(|n| format!("{n} worker {i}"));
            self.spawn_registered(worker_name, move || pool.run_worker(false))?;
        }
        Ok(pool)
    }

    /// Spawns a thread counted in the group's records, so
    /// [`ThreadGroup::await_shutdown`] can wait for it.
    fn spawn_registered<F>(self: &Arc<Self>, name: Option<String>, f: F) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut records = self.records.lock().unwrap();
            if records.shutting_down {
                return Err(Error::ShuttingDown);
            }
            records.thread_count += 1;
        }

        let group = self.clone();
        let wrapped = move || {
            f();
            let mut records = group.records.lock().unwrap();
            records.thread_count -= 1;
            if records.thread_count == 0 && records.shutting_down {
                group.shutdown_wakeup.notify_all();
            }
        };

        let builder = match name {
            Some(name) => thread::Builder::new().name(name),
            None => thread::Builder::new(),
        };
        match builder.spawn(wrapped) {
            Ok(_) => Ok(()),
            Err(e) => {
                self.records.lock().unwrap().thread_count -= 1;
                Err(Error::Io(e))
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// THREAD POOLS                                                       //
////////////////////////////////////////////////////////////////////////

type Task = Box<dyn FnOnce() + Send + 'static>;

/// A pool of worker threads accepting one-shot tasks.
///
/// The pool keeps its base workers permanently; when a task arrives
/// and no worker is idle, a temporary auxiliary worker is spawned,
/// which exits once it has lingered without work.
pub struct ThreadPool {
    group: Weak<ThreadGroup>,
    name: Option<String>,
    linger: Duration,
    inner: Mutex<PoolInner>,
    work_available: Condvar,
}

#[derive(Default)]
struct PoolInner {
    queue: VecDeque<Task>,
    idle_workers: usize,
    shutting_down: bool,
}

impl ThreadPool {
    /// Submits a task, spawning an auxiliary worker if every worker is
    /// busy.
    pub fn submit_or_spawn<F>(self: &Arc<Self>, task: F) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        let group = self.group.upgrade().ok_or(Error::ShuttingDown)?;

        let spawn_needed = {
            let mut inner = self.inner.lock().unwrap();
            if inner.shutting_down {
                return Err(Error::ShuttingDown);
            }
            inner.queue.push_back(Box::new(task));
            if inner.idle_workers > 0 {
                self.work_available.notify_one();
                false
            } else {
                true
            }
        };

        if spawn_needed {
            let pool = self.clone();
            let name = self.name.as_ref().map(|n| format!("{n} aux worker"));
            group.spawn_registered(name, move || pool.run_worker(true))?;
        }
        Ok(())
    }

    /// Returns whether the pool's group is shutting down.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.lock().unwrap().shutting_down
    }

    fn begin_shutdown(&self) {
        self.inner.lock().unwrap().shutting_down = true;
        self.work_available.notify_all();
    }

    /// The worker loop. Base workers wait for work indefinitely;
    /// auxiliary workers give up after lingering idle.
    fn run_worker(&self, auxiliary: bool) {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(task) = inner.queue.pop_front() {
                drop(inner);
                if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                    error!(
                        "task in pool {} panicked",
                        self.name.as_deref().unwrap_or("(unnamed)"),
                    );
                }
                inner = self.inner.lock().unwrap();
                continue;
            }
            if inner.shutting_down {
                return;
            }

            inner.idle_workers += 1;
            if auxiliary {
                let (guard, result) = self
                    .work_available
                    .wait_timeout(inner, self.linger)
                    .unwrap();
                inner = guard;
                inner.idle_workers -= 1;
                if result.timed_out() && inner.queue.is_empty() {
                    return;
                }
            } else {
                inner = self.work_available.wait(inner).unwrap();
                inner.idle_workers -= 1;
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error from starting a thread or submitting a task.
#[derive(Debug)]
pub enum Error {
    /// The group is shutting down; no new work is accepted.
    ShuttingDown,
    /// The operating system failed to spawn a thread.
    Io(io::Error),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ShuttingDown => f.write_str("the thread group is shutting down"),
            Self::Io(err) => write!(f, "failed to spawn thread: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::ShuttingDown => None,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn pool_tasks_run() {
        let group = ThreadGroup::new();
        let pool = group
            .start_pool(Some("test".to_owned()), 2, Duration::from_millis(50))
            .unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();
        for _ in 0..8 {
            let counter = counter.clone();
            let tx = tx.clone();
            pool.submit_or_spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                tx.send(()).unwrap();
            })
            .unwrap();
        }
        for _ in 0..8 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);

        group.shut_down();
        group.await_shutdown();
    }

    #[test]
    fn shutdown_wakes_sleepers_early() {
        let group = ThreadGroup::new();
        let (tx, rx) = mpsc::channel();
        {
            let group = group.clone();
            thread::spawn(move || {
                tx.send(group.wait_for_shutdown(Duration::from_secs(60))).unwrap();
            });
        }
        thread::sleep(Duration::from_millis(20));
        group.shut_down();
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }

    #[test]
    fn respawnable_threads_exit_on_shutdown() {
        let group = ThreadGroup::new();
        let (tx, rx) = mpsc::channel();
        group
            .start_respawnable(Some("beat".to_owned()), move || {
                let _ = tx.send(());
            })
            .unwrap();

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        group.shut_down();
        group.await_shutdown();
        assert!(group.start_respawnable(None, || ()).is_err());
    }

    #[test]
    fn submissions_after_shutdown_are_refused() {
        let group = ThreadGroup::new();
        let pool = group
            .start_pool(None, 1, Duration::from_millis(50))
            .unwrap();
        group.shut_down();
        assert!(matches!(
            pool.submit_or_spawn(|| ()),
            Err(Error::ShuttingDown),
        ));
        group.await_shutdown();
    }
}
