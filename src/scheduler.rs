//! Coalescing render scheduler
//!
//! Hosts that redraw on every input event (dragging a point, moving a slider)
//! produce bursts of render requests. The scheduler keeps a single pending
//! slot: a new request replaces the pending one instead of queueing behind it.
//! An idle worker starts rendering as soon as a request arrives. Requests that
//! arrive while a render is running collapse into one rerun with the latest
//! inputs once that render completes. The latest finished result is published
//! for lock-free readers.

use arc_swap::ArcSwapOption;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info};

/// Request and render counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub requested: u64,
    /// Requests replaced by a newer one before they were rendered
    pub coalesced: u64,
    pub completed: u64,
    /// Renders whose job panicked
    pub failed: u64,
}

struct State<R> {
    pending: Option<R>,
    running: bool,
    shutdown: bool,
    stats: SchedulerStats,
}

struct Shared<R, T> {
    state: Mutex<State<R>>,
    wake: Condvar,
    idle: Condvar,
    latest: ArcSwapOption<T>,
}

/// Runs a render job on a worker thread, always with the latest request
pub struct RenderScheduler<R, T> {
    shared: Arc<Shared<R, T>>,
    worker: Option<JoinHandle<()>>,
}

impl<R, T> RenderScheduler<R, T>
where
    R: Send + 'static,
    T: Send + Sync + 'static,
{
    /// Start the worker thread
    pub fn spawn<F>(job: F) -> Self
    where
        F: FnMut(R) -> T + Send + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                pending: None,
                running: false,
                shutdown: false,
                stats: SchedulerStats::default(),
            }),
            wake: Condvar::new(),
            idle: Condvar::new(),
            latest: ArcSwapOption::empty(),
        });

        let worker_shared = shared.clone();
        let worker = std::thread::spawn(move || run_worker(worker_shared, job));

        info!("Render scheduler started");

        Self {
            shared,
            worker: Some(worker),
        }
    }

    /// Submit a request, replacing any request that has not started yet
    pub fn request(&self, request: R) {
        let mut state = self.shared.state.lock();
        if state.pending.replace(request).is_some() {
            state.stats.coalesced += 1;
            debug!("Render request coalesced");
        }
        state.stats.requested += 1;
        self.shared.wake.notify_one();
    }

    /// Result of the most recently completed render
    pub fn latest(&self) -> Option<Arc<T>> {
        self.shared.latest.load_full()
    }

    /// Block until nothing is pending or running
    pub fn wait_idle(&self) {
        let mut state = self.shared.state.lock();
        while (state.pending.is_some() || state.running) && !state.shutdown {
            self.shared.idle.wait(&mut state);
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        self.shared.state.lock().stats
    }
}

impl<R, T> Drop for RenderScheduler<R, T> {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.wake.notify_all();
            self.shared.idle.notify_all();
        }
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.join() {
                error!("Render worker panicked: {:?}", e);
            }
        }
        debug!("Render scheduler stopped");
    }
}

fn run_worker<R, T, F>(shared: Arc<Shared<R, T>>, mut job: F)
where
    F: FnMut(R) -> T,
{
    let mut state = shared.state.lock();
    loop {
        while state.pending.is_none() && !state.shutdown {
            shared.wake.wait(&mut state);
        }
        if state.shutdown {
            break;
        }

        let Some(request) = state.pending.take() else {
            continue;
        };
        state.running = true;

        let outcome = MutexGuard::unlocked(&mut state, || {
            catch_unwind(AssertUnwindSafe(|| job(request)))
        });

        state.running = false;
        match outcome {
            Ok(result) => {
                shared.latest.store(Some(Arc::new(result)));
                state.stats.completed += 1;
            }
            Err(_) => {
                state.stats.failed += 1;
                error!("Render job panicked, keeping the previous result");
            }
        }

        if state.pending.is_none() {
            shared.idle.notify_all();
        } else {
            debug!("Inputs changed during render, rerunning with the latest request");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    #[test]
    fn test_idle_request_starts_immediately() {
        let scheduler = RenderScheduler::spawn(|_: u32| Instant::now());

        let requested_at = Instant::now();
        scheduler.request(1);
        scheduler.wait_idle();

        let started = scheduler.latest().unwrap();
        assert!(started.duration_since(requested_at) < Duration::from_millis(100));
        assert_eq!(scheduler.stats().completed, 1);
    }

    #[test]
    fn test_requests_during_render_rerun_with_latest() {
        let (started_tx, started_rx) = mpsc::channel();
        let scheduler = RenderScheduler::spawn(move |r: u32| {
            started_tx.send(r).unwrap();
            std::thread::sleep(Duration::from_millis(50));
            r
        });

        scheduler.request(1);
        assert_eq!(started_rx.recv().unwrap(), 1);
        for r in 2..=6 {
            scheduler.request(r);
        }
        scheduler.wait_idle();

        assert_eq!(scheduler.latest().as_deref(), Some(&6));
        assert_eq!(started_rx.try_iter().collect::<Vec<_>>(), vec![6]);
        let stats = scheduler.stats();
        assert_eq!(stats.requested, 6);
        assert_eq!(stats.coalesced, 4);
        assert_eq!(stats.completed, 2);
    }

    #[test]
    fn test_panicking_job_does_not_block_idle() {
        let scheduler = RenderScheduler::spawn(|r: u32| {
            if r == 1 {
                panic!("render failed");
            }
            r
        });

        scheduler.request(1);
        scheduler.wait_idle();
        assert!(scheduler.latest().is_none());
        assert_eq!(scheduler.stats().failed, 1);

        scheduler.request(2);
        scheduler.wait_idle();
        assert_eq!(scheduler.latest().as_deref(), Some(&2));
        assert_eq!(scheduler.stats().completed, 1);
    }

    #[test]
    fn test_idle_without_requests() {
        let scheduler: RenderScheduler<u32, u32> = RenderScheduler::spawn(|r| r);
        scheduler.wait_idle();
        assert!(scheduler.latest().is_none());
        assert_eq!(scheduler.stats(), SchedulerStats::default());
    }
}
