//! Background simulation and the latest-result channel.
//!
//! - [`Latest`] — single-value cell; new subscribers see the current value
//! - [`SimulationWorker`] — runs [`trajectory::predict`] on its own thread
//!
//! Requests are not queued. A request submitted while another is pending
//! replaces it, so a burst of sensor updates costs one simulation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::energy::LaunchEnergyModel;
use crate::trajectory::{self, Prediction, ShotInput, Tuning};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Latest
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Slot<T> {
    version: u64,
    value: Option<T>,
}

/// A shared "latest value" cell.
///
/// Cloning shares the cell. Every publish bumps a version counter so
/// subscribers can wait for a value they have not seen yet.
#[derive(Debug)]
pub struct Latest<T> {
    inner: Arc<(Mutex<Slot<T>>, Condvar)>,
}

impl<T> Clone for Latest<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T> Default for Latest<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Latest<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(Slot { version: 0, value: None }), Condvar::new())),
        }
    }

    /// Replace the current value and wake every waiting subscriber.
    pub fn publish(&self, value: T) {
        let (slot, cond) = &*self.inner;
        let mut slot = lock(slot);
        slot.version = slot.version.wrapping_add(1);
        slot.value = Some(value);
        cond.notify_all();
    }

    /// Number of values published so far.
    pub fn version(&self) -> u64 {
        lock(&self.inner.0).version
    }

    /// A subscriber whose first wait returns the current value, if any.
    pub fn subscribe(&self) -> Subscriber<T> {
        Subscriber { cell: self.clone(), seen: 0 }
    }
}

impl<T: Clone> Latest<T> {
    pub fn get(&self) -> Option<T> {
        lock(&self.inner.0).value.clone()
    }
}

/// Reader half of a [`Latest`] that remembers which version it last saw.
#[derive(Debug)]
pub struct Subscriber<T> {
    cell: Latest<T>,
    seen: u64,
}

impl<T: Clone> Subscriber<T> {
    /// The current value if it has not been returned to this subscriber yet.
    pub fn try_next(&mut self) -> Option<T> {
        let slot = lock(&self.cell.inner.0);
        take_unseen(&slot, &mut self.seen)
    }

    /// Block until an unseen value is available or `timeout` elapses.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let (slot, cond) = &*self.cell.inner;
        let mut slot = lock(slot);
        loop {
            if let Some(value) = take_unseen(&slot, &mut self.seen) {
                return Some(value);
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            if remaining.is_zero() {
                return None;
            }
            slot = cond
                .wait_timeout(slot, remaining)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }
}

fn take_unseen<T: Clone>(slot: &Slot<T>, seen: &mut u64) -> Option<T> {
    if slot.version == *seen {
        return None;
    }
    let value = slot.value.clone()?;
    *seen = slot.version;
    Some(value)
}

// ---------------------------------------------------------------------------
// SimulationWorker
// ---------------------------------------------------------------------------

/// One unit of work: a model snapshot plus the shot to simulate.
#[derive(Debug, Clone)]
pub struct SimulationRequest {
    pub model: Arc<LaunchEnergyModel>,
    pub tuning: Tuning,
    pub input: ShotInput,
    /// Target height (m) used for the confidence score
    pub target_height: f64,
}

#[derive(Debug, Default)]
struct Inbox {
    pending: Option<SimulationRequest>,
    shutdown: bool,
}

/// Dedicated simulation thread publishing to a [`Latest<Prediction>`].
#[derive(Debug)]
pub struct SimulationWorker {
    inbox: Arc<(Mutex<Inbox>, Condvar)>,
    results: Latest<Prediction>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    panicked: bool,
}

impl SimulationWorker {
    pub fn spawn() -> std::io::Result<Self> {
        Self::spawn_with(|req| {
            trajectory::predict(&req.model, &req.tuning, &req.input, req.target_height)
        })
    }

    fn spawn_with<F>(simulate: F) -> std::io::Result<Self>
    where
        F: Fn(&SimulationRequest) -> Prediction + Send + 'static,
    {
        let inbox = Arc::new((Mutex::new(Inbox::default()), Condvar::new()));
        let results = Latest::new();
        let running = Arc::new(AtomicBool::new(true));

        let worker = {
            let inbox = Arc::clone(&inbox);
            let results = results.clone();
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("springlaunch-sim".into())
                .spawn(move || {
                    while let Some(req) = next_request(&inbox) {
                        results.publish(simulate(&req));
                    }
                    running.store(false, Ordering::SeqCst);
                })?
        };

        Ok(Self {
            inbox,
            results,
            running,
            worker: Some(worker),
            panicked: false,
        })
    }

    /// Queue `req`, replacing any request the thread has not picked up yet.
    pub fn submit(&self, req: SimulationRequest) {
        let (inbox, cond) = &*self.inbox;
        lock(inbox).pending = Some(req);
        cond.notify_one();
    }

    /// The channel predictions are published on.
    pub fn results(&self) -> Latest<Prediction> {
        self.results.clone()
    }

    /// False once the thread has exited, including by panic.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self.worker.as_ref().is_some_and(|worker| !worker.is_finished())
    }

    /// Whether the thread died from a panic. Known after [`stop`](Self::stop).
    pub fn panicked(&self) -> bool {
        self.panicked
    }

    /// Stop the thread after the simulation in progress, if any. Pending
    /// requests are discarded.
    pub fn stop(&mut self) {
        {
            let (inbox, cond) = &*self.inbox;
            let mut inbox = lock(inbox);
            inbox.shutdown = true;
            inbox.pending = None;
            cond.notify_one();
        }
        if let Some(worker) = self.worker.take() {
            self.panicked = worker.join().is_err();
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for SimulationWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Block until there is a request to run. `None` means shut down.
fn next_request(inbox: &(Mutex<Inbox>, Condvar)) -> Option<SimulationRequest> {
    let (inbox, cond) = inbox;
    let mut guard = lock(inbox);
    loop {
        if guard.shutdown {
            return None;
        }
        if let Some(req) = guard.pending.take() {
            return Some(req);
        }
        guard = cond.wait(guard).unwrap_or_else(|poisoned| poisoned.into_inner());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy::tests::test_model;

    const WAIT: Duration = Duration::from_secs(5);

    fn request(model: &Arc<LaunchEnergyModel>, position: f64) -> SimulationRequest {
        SimulationRequest {
            model: Arc::clone(model),
            tuning: Tuning::default(),
            input: ShotInput {
                position,
                launch_angle: 30.0,
                device_height: 1.0,
                lens_offset: 0.0,
                target_distance: 3.0,
            },
            target_height: 0.0,
        }
    }

    #[test]
    fn late_subscriber_sees_current_value() {
        let cell = Latest::new();
        cell.publish(7);
        let mut sub = cell.subscribe();
        assert_eq!(sub.try_next(), Some(7));
        assert_eq!(sub.try_next(), None);
        cell.publish(8);
        assert_eq!(sub.wait_timeout(WAIT), Some(8));
        assert_eq!(cell.get(), Some(8));
        assert_eq!(cell.version(), 2);
    }

    #[test]
    fn empty_cell_times_out() {
        let cell: Latest<u32> = Latest::new();
        let mut sub = cell.subscribe();
        assert_eq!(sub.wait_timeout(Duration::from_millis(10)), None);
        assert_eq!(cell.get(), None);
    }

    #[test]
    fn wait_wakes_on_publish_from_another_thread() {
        let cell = Latest::new();
        let mut sub = cell.subscribe();
        let writer = cell.clone();
        let handle = thread::spawn(move || writer.publish("ready"));
        assert_eq!(sub.wait_timeout(WAIT), Some("ready"));
        handle.join().unwrap();
    }

    #[test]
    fn worker_publishes_prediction() {
        let model = Arc::new(test_model());
        let worker = SimulationWorker::spawn().unwrap();
        let mut sub = worker.results().subscribe();
        worker.submit(request(&model, 0.0));
        let p = sub.wait_timeout(WAIT).unwrap();
        assert_eq!(p.input.position, 0.0);
        assert!(p.impact.distance > 0.0);
    }

    #[test]
    fn newest_request_wins() {
        let model = Arc::new(test_model());
        let worker = SimulationWorker::spawn().unwrap();
        let mut sub = worker.results().subscribe();
        for i in 0..50 {
            worker.submit(request(&model, f64::from(i)));
        }
        let deadline = Instant::now() + WAIT;
        let mut last = None;
        while Instant::now() < deadline {
            match sub.wait_timeout(Duration::from_millis(100)) {
                Some(p) if p.input.position == 49.0 => {
                    last = Some(p);
                    break;
                }
                Some(_) => continue,
                None => {}
            }
        }
        assert!(last.is_some());
        // Superseded requests are skipped, never queued behind the newest.
        assert!(worker.results().version() <= 50);
    }

    #[test]
    fn stop_joins_thread() {
        let mut worker = SimulationWorker::spawn().unwrap();
        assert!(worker.is_running());
        worker.stop();
        assert!(!worker.is_running());
        assert!(!worker.panicked());
        worker.stop();
    }

    #[test]
    fn panicking_simulation_is_reported() {
        let model = Arc::new(test_model());
        let mut worker = SimulationWorker::spawn_with(|_| panic!("bad model")).unwrap();
        worker.submit(request(&model, 0.0));
        let deadline = Instant::now() + WAIT;
        while worker.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!worker.is_running());
        worker.stop();
        assert!(worker.panicked());
        assert_eq!(worker.results().version(), 0);
    }
}
