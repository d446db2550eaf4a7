//! The top-level simulation context: wires the floor, storage, fleet,
//! dispatcher, and clock into one running system.
//!
//! Tick order is fixed at construction: the fleet system runs first (AGVs
//! move, charge, and fault), then the dispatcher system (aborted tasks get
//! reassigned to whatever just went idle).

use crate::dispatch::AgvTaskDispatcher;
use crate::executor::{ProcessOutcome, run_process};
use crate::task::{ProcessError, Task};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use waresim_core::agv::{Fleet, TickCtx};
use waresim_core::area::{Area, Point};
use waresim_core::clock::{Clock, Tickable, Ticks};
use waresim_core::config::{ConfigError, SimConfig};
use waresim_core::storage::{BeveragesBox, Storage};

// ---------------------------------------------------------------------------
// Clock subscribers
// ---------------------------------------------------------------------------

struct FleetSystem {
    fleet: Arc<RwLock<Fleet>>,
    area: Arc<Area>,
    storage: Arc<Storage>,
    config: SimConfig,
    dispatcher: Arc<AgvTaskDispatcher>,
}

impl Tickable for FleetSystem {
    fn on_tick(&self, tick: Ticks) {
        let mut fleet = self.fleet.write().expect("fleet lock poisoned");
        let ctx = TickCtx {
            area: &self.area,
            storage: &self.storage,
            config: &self.config,
            tick,
        };
        let faults = fleet.tick_all(&ctx);

        // Faulting AGVs were already aborted inside tick_all; route their
        // tasks back to the dispatcher, then reap whatever completed. Both
        // happen under the fleet lock so a concurrent assignment can
        // neither race the reap nor see a half-handled fault.
        for fault in &faults {
            log::error!("agv {:?} faulted at tick {tick}: {}", fault.agv, fault.error);
            if let Some(task_id) = fault.task {
                if let Some(task) = self.dispatcher.take_active(task_id) {
                    self.dispatcher.on_task_aborted(task, fault.agv);
                }
            }
        }
        self.dispatcher.retire_completed(&fleet);
    }

    fn name(&self) -> &str {
        "fleet"
    }
}

struct DispatcherSystem {
    dispatcher: Arc<AgvTaskDispatcher>,
}

impl Tickable for DispatcherSystem {
    fn on_tick(&self, _tick: Ticks) {
        self.dispatcher.reassign_aborted_tasks();
    }

    fn name(&self) -> &str {
        "dispatcher"
    }
}

// ---------------------------------------------------------------------------
// SimContext
// ---------------------------------------------------------------------------

/// A fully wired warehouse simulation.
pub struct SimContext {
    config: SimConfig,
    area: Arc<Area>,
    storage: Arc<Storage>,
    fleet: Arc<RwLock<Fleet>>,
    dispatcher: Arc<AgvTaskDispatcher>,
    clock: Clock,
    next_task: AtomicU64,
}

impl SimContext {
    /// Build the standard warehouse from `config`: a grid floor sized to the
    /// storage columns, the standard cell layout, and `fleet_size` AGVs
    /// parked at the origin. The clock is created stopped.
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let area = Arc::new(Area::grid(config.storage_cols as i32 + 1, 5));
        let storage = Arc::new(Storage::standard_layout(&config));

        let mut fleet = Fleet::new();
        for _ in 0..config.fleet_size {
            fleet.spawn(Point::new(0, 0));
        }
        let fleet = Arc::new(RwLock::new(fleet));

        let dispatcher = Arc::new(AgvTaskDispatcher::new(
            fleet.clone(),
            storage.clone(),
            config.clone(),
        ));

        let clock = Clock::new(Duration::from_millis(config.tick_period_ms));
        clock.register(Arc::new(FleetSystem {
            fleet: fleet.clone(),
            area: area.clone(),
            storage: storage.clone(),
            config: config.clone(),
            dispatcher: dispatcher.clone(),
        }));
        clock.register(Arc::new(DispatcherSystem {
            dispatcher: dispatcher.clone(),
        }));

        Ok(Self {
            config,
            area,
            storage,
            fleet,
            dispatcher,
            clock,
            next_task: AtomicU64::new(1),
        })
    }

    /// Start the background clock thread.
    pub fn start(&mut self) {
        self.clock.start();
    }

    /// Advance the simulation by one tick on the calling thread.
    pub fn step(&self) {
        self.clock.step();
    }

    pub fn current_tick(&self) -> Ticks {
        self.clock.current_tick()
    }

    /// Allocate the next task id. Ids are unique for the life of the
    /// context.
    pub fn next_task_id(&self) -> waresim_core::id::TaskId {
        waresim_core::id::TaskId(self.next_task.fetch_add(1, Ordering::SeqCst))
    }

    /// Build a delivery task for `item` and hand it to the dispatcher.
    /// Returns the task id when an AGV took it, `None` when the fleet is
    /// saturated.
    pub fn submit_delivery(&self, item: BeveragesBox) -> Option<waresim_core::id::TaskId> {
        let id = self.next_task_id();
        let task = Task::delivery(id, item.clone(), self.current_tick());
        self.dispatcher.assign_task_to_agv(task, &item).then_some(id)
    }

    /// Run every process of `task` on the worker pool, capped by the
    /// configured shutdown deadline.
    pub fn execute_task(&self, task: &Task) -> Result<Vec<ProcessOutcome>, ProcessError> {
        let timeout = Duration::from_millis(self.config.executor_shutdown_ms);
        task.processes
            .iter()
            .map(|process| run_process(process, timeout))
            .collect()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn area(&self) -> &Area {
        &self.area
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn fleet(&self) -> &RwLock<Fleet> {
        &self.fleet
    }

    pub fn dispatcher(&self) -> &AgvTaskDispatcher {
        &self.dispatcher
    }

    /// Stop the clock and join its thread. The context is consumed; all
    /// shared state drops with it.
    pub fn shutdown(mut self) {
        self.clock.stop();
    }
}

impl std::fmt::Debug for SimContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimContext")
            .field("tick", &self.current_tick())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waresim_core::agv::AgvState;
    use waresim_core::test_utils::ambient_box;

    #[test]
    fn context_builds_the_configured_fleet() {
        let ctx = SimContext::new(SimConfig::default()).unwrap();
        let fleet = ctx.fleet().read().unwrap();
        assert_eq!(fleet.roster().len(), SimConfig::default().fleet_size as usize);
        assert!(fleet.iter().all(|a| a.state() == AgvState::Idle));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SimConfig {
            fleet_size: 0,
            ..SimConfig::default()
        };
        assert!(SimContext::new(config).is_err());
    }

    #[test]
    fn execute_task_yields_one_outcome_per_resource() {
        let ctx = SimContext::new(SimConfig::default()).unwrap();
        let task = Task::delivery(ctx.next_task_id(), ambient_box("cola"), 0);
        let outcomes = ctx.execute_task(&task).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].iter().all(Result::is_ok));
    }

    #[test]
    fn submitted_delivery_reaches_the_dock() {
        let ctx = SimContext::new(SimConfig::default()).unwrap();
        let id = ctx.submit_delivery(ambient_box("cola")).unwrap();

        for _ in 0..40 {
            ctx.step();
        }

        let fleet = ctx.fleet().read().unwrap();
        let dock = ctx.storage().point_of(&ctx.config().loading_dock).unwrap();
        let carrier = fleet
            .iter()
            .find(|a| a.position() == dock)
            .expect("one AGV parked at the dock");
        assert_eq!(carrier.state(), AgvState::Idle);
        assert_eq!(carrier.task(), None);
        drop(fleet);
        // Completed, so retired from the active table; ids start at 1.
        assert_eq!(id, waresim_core::id::TaskId(1));
        assert_eq!(ctx.dispatcher().active_count(), 0);
        ctx.shutdown();
    }
}
