//! The simulation clock: a single driver thread advancing a discrete tick
//! counter and fanning each tick out to every registered subscriber.
//!
//! Subscribers are called synchronously, in registration order, on the
//! driver thread — intra-tick ordering across the whole system is therefore
//! deterministic. A panicking subscriber is caught and logged; it can never
//! halt the clock or starve its siblings. `step()` is public so tests (and
//! anything else that wants lockstep control) can drive ticks without the
//! thread.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Discrete simulation time. Incremented by one per tick.
pub type Ticks = u64;

/// A component updated once per tick.
pub trait Tickable: Send + Sync {
    fn on_tick(&self, tick: Ticks);

    /// Name used in logs when this subscriber misbehaves.
    fn name(&self) -> &str {
        "tickable"
    }
}

/// The tick driver. Dropping a started clock joins its thread.
pub struct Clock {
    period: Duration,
    tick: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    subscribers: Arc<Mutex<Vec<Arc<dyn Tickable>>>>,
    handle: Option<JoinHandle<()>>,
}

impl Clock {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            tick: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            handle: None,
        }
    }

    /// Register a subscriber. The list is append-only; registration order
    /// is call order and is preserved for every tick.
    pub fn register(&self, subscriber: Arc<dyn Tickable>) {
        self.subscribers
            .lock()
            .expect("subscriber list mutex poisoned")
            .push(subscriber);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .expect("subscriber list mutex poisoned")
            .len()
    }

    /// The most recently completed tick.
    pub fn current_tick(&self) -> Ticks {
        self.tick.load(Ordering::SeqCst)
    }

    /// Advance one tick synchronously and notify every subscriber.
    pub fn step(&self) {
        Self::run_tick(&self.tick, &self.subscribers);
    }

    fn run_tick(tick: &AtomicU64, subscribers: &Mutex<Vec<Arc<dyn Tickable>>>) {
        let now = tick.fetch_add(1, Ordering::SeqCst) + 1;
        let subscribers = subscribers
            .lock()
            .expect("subscriber list mutex poisoned")
            .clone();
        for subscriber in subscribers {
            let result = catch_unwind(AssertUnwindSafe(|| subscriber.on_tick(now)));
            if let Err(panic) = result {
                let message = panic_message(&panic);
                log::error!(
                    "subscriber {:?} panicked on tick {}: {}",
                    subscriber.name(),
                    now,
                    message
                );
            }
        }
    }

    /// Spawn the driver thread. A second call while running is a no-op.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let period = self.period;
        let tick = Arc::clone(&self.tick);
        let running = Arc::clone(&self.running);
        let subscribers = Arc::clone(&self.subscribers);
        self.handle = Some(
            std::thread::Builder::new()
                .name("waresim-clock".to_string())
                .spawn(move || {
                    while running.load(Ordering::SeqCst) {
                        std::thread::sleep(period);
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        Self::run_tick(&tick, &subscribers);
                    }
                })
                .expect("failed to spawn clock thread"),
        );
    }

    /// Stop tick advancement and join the driver thread.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clock")
            .field("period", &self.period)
            .field("tick", &self.current_tick())
            .field("running", &self.is_running())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
