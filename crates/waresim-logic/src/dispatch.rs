//! The AGV task dispatcher: binds delivery tasks to idle AGVs and requeues
//! the tasks of aborted deliveries.
//!
//! All fleet-mutating paths hold the fleet write lock for their whole
//! scan-and-assign sequence, so "find an idle AGV and make it busy" is
//! atomic with respect to concurrent dispatch calls and the clock thread.

use crate::task::Task;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use waresim_core::agv::Fleet;
use waresim_core::config::SimConfig;
use waresim_core::id::{AgvId, TaskId};
use waresim_core::program::{Program, Value};
use waresim_core::storage::{BeveragesBox, Storage};

pub struct AgvTaskDispatcher {
    fleet: Arc<RwLock<Fleet>>,
    storage: Arc<Storage>,
    config: SimConfig,
    /// Tasks currently bound to an AGV, kept so an abort can recover the
    /// full task from just its id.
    active: Mutex<BTreeMap<TaskId, Task>>,
    /// Aborted tasks awaiting reassignment, strictly FIFO.
    aborted: Mutex<VecDeque<Task>>,
}

impl AgvTaskDispatcher {
    pub fn new(fleet: Arc<RwLock<Fleet>>, storage: Arc<Storage>, config: SimConfig) -> Self {
        Self {
            fleet,
            storage,
            config,
            active: Mutex::new(BTreeMap::new()),
            aborted: Mutex::new(VecDeque::new()),
        }
    }

    /// Assign `task` to the first idle AGV in roster order.
    ///
    /// Returns `false` without mutating anything when no AGV is idle or the
    /// box kind has no configured source cell. On success exactly one AGV
    /// goes Idle -> Busy with the delivery program loaded.
    pub fn assign_task_to_agv(&self, task: Task, item: &BeveragesBox) -> bool {
        let mut fleet = self.fleet.write().expect("fleet lock poisoned");
        self.assign_locked(&mut fleet, task, item).is_ok()
    }

    /// Record that `agv` gave up on `task`. The task joins the back of the
    /// reassignment queue.
    pub fn on_task_aborted(&self, task: Task, agv: AgvId) {
        log::warn!("task {:?} aborted by agv {:?}, queued for reassignment", task.id, agv);
        self.aborted
            .lock()
            .expect("abort queue mutex poisoned")
            .push_back(task);
    }

    /// Reassign aborted tasks in FIFO order. Stops entirely at the first
    /// task that cannot be placed (no idle AGV), preserving queue order.
    pub fn reassign_aborted_tasks(&self) {
        let mut fleet = self.fleet.write().expect("fleet lock poisoned");
        loop {
            let task = {
                let mut queue = self.aborted.lock().expect("abort queue mutex poisoned");
                if queue.is_empty() || fleet.first_idle().is_none() {
                    return;
                }
                queue.pop_front().expect("emptiness checked")
            };

            let Some(item) = task.find_box().cloned() else {
                // A task with no box resource can never be delivered.
                log::error!("task {:?} carries no box resource, dropping it", task.id);
                continue;
            };

            if let Err(task) = self.assign_locked(&mut fleet, task, &item) {
                // Put it back at the head so order is preserved, and stop.
                self.aborted
                    .lock()
                    .expect("abort queue mutex poisoned")
                    .push_front(task);
                return;
            }
        }
    }

    /// Drop active entries no longer bound to any AGV. Call after fault
    /// handling, while still holding the fleet lock that `fleet` came from,
    /// so a concurrent assignment cannot be reaped by mistake.
    pub fn retire_completed(&self, fleet: &Fleet) {
        let mut active = self.active.lock().expect("active table mutex poisoned");
        active.retain(|id, _| {
            let bound = fleet.iter().any(|agv| agv.task() == Some(*id));
            if !bound {
                log::debug!("task {id:?} retired");
            }
            bound
        });
    }

    /// Remove and return a bound task (abort bookkeeping).
    pub fn take_active(&self, id: TaskId) -> Option<Task> {
        self.active
            .lock()
            .expect("active table mutex poisoned")
            .remove(&id)
    }

    pub fn active_count(&self) -> usize {
        self.active
            .lock()
            .expect("active table mutex poisoned")
            .len()
    }

    pub fn aborted_count(&self) -> usize {
        self.aborted
            .lock()
            .expect("abort queue mutex poisoned")
            .len()
    }

    /// Idle AGVs right now (read lock only).
    pub fn idle_count(&self) -> usize {
        self.fleet.read().expect("fleet lock poisoned").idle_count()
    }

    /// The scan-and-assign core, run under an already-held write lock.
    /// `Err` hands the task back untouched.
    fn assign_locked(
        &self,
        fleet: &mut Fleet,
        task: Task,
        item: &BeveragesBox,
    ) -> Result<(), Task> {
        let Some(source) = self.config.source_cells.get(&item.kind()) else {
            log::error!("no source cell for box kind {:?}", item.kind());
            return Err(task);
        };
        let Some(id) = fleet.first_idle() else {
            log::debug!("no idle AGV for task {:?}", task.id);
            return Err(task);
        };
        let Some(agv) = fleet.get_mut(id) else {
            return Err(task);
        };

        // Source -> loading dock. The TAKE/RELEASE pair is still missing
        // here, pending inventory synchronization with task management; the
        // AGV drives the route without touching the box.
        let program = Program::move_between(
            Value::Label(source.clone()),
            Value::Label(self.config.loading_dock.clone()),
        );
        if let Err(error) = agv.load_program(&program, &self.storage) {
            log::error!("dispatch program rejected for task {:?}: {error}", task.id);
            return Err(task);
        }
        agv.bind_task(task.id);
        log::info!("task {:?} assigned to agv {:?} (source {source})", task.id, id);
        self.active
            .lock()
            .expect("active table mutex poisoned")
            .insert(task.id, task);
        Ok(())
    }
}

impl std::fmt::Debug for AgvTaskDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgvTaskDispatcher")
            .field("active", &self.active_count())
            .field("aborted", &self.aborted_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;
    use waresim_core::agv::AgvState;
    use waresim_core::id::TaskId;
    use waresim_core::test_utils::*;

    fn dispatcher_with_fleet(n: usize) -> (AgvTaskDispatcher, Arc<RwLock<Fleet>>) {
        let (_, storage, config) = standard_world();
        let fleet = Arc::new(RwLock::new(fleet_of(n)));
        let dispatcher =
            AgvTaskDispatcher::new(fleet.clone(), Arc::new(storage), config);
        (dispatcher, fleet)
    }

    #[test]
    fn assigns_to_first_idle_in_roster_order() {
        let (dispatcher, fleet) = dispatcher_with_fleet(2);
        let item = ambient_box("cola");
        assert!(dispatcher.assign_task_to_agv(Task::delivery(TaskId(1), item.clone(), 0), &item));

        let fleet = fleet.read().unwrap();
        let roster = fleet.roster();
        assert_eq!(fleet.get(roster[0]).unwrap().state(), AgvState::Busy);
        assert_eq!(fleet.get(roster[0]).unwrap().task(), Some(TaskId(1)));
        assert_eq!(fleet.get(roster[1]).unwrap().state(), AgvState::Idle);
    }

    #[test]
    fn two_dispatches_one_idle_agv_one_success() {
        let (dispatcher, _fleet) = dispatcher_with_fleet(1);
        let item = ambient_box("cola");
        let first = dispatcher.assign_task_to_agv(Task::delivery(TaskId(1), item.clone(), 0), &item);
        let second =
            dispatcher.assign_task_to_agv(Task::delivery(TaskId(2), item.clone(), 0), &item);
        assert!(first);
        assert!(!second);
        assert_eq!(dispatcher.active_count(), 1);
    }

    #[test]
    fn no_idle_agv_mutates_nothing() {
        let (dispatcher, fleet) = dispatcher_with_fleet(1);
        let id = fleet.read().unwrap().roster()[0];
        let item = ambient_box("cola");
        assert!(dispatcher.assign_task_to_agv(Task::delivery(TaskId(1), item.clone(), 0), &item));

        let before_route = fleet.read().unwrap().get(id).unwrap().route_len();
        assert!(!dispatcher.assign_task_to_agv(Task::delivery(TaskId(2), item.clone(), 0), &item));
        let fleet = fleet.read().unwrap();
        assert_eq!(fleet.get(id).unwrap().route_len(), before_route);
        assert_eq!(fleet.get(id).unwrap().task(), Some(TaskId(1)));
    }

    #[test]
    fn aborted_task_is_reassigned_fifo() {
        let (dispatcher, fleet) = dispatcher_with_fleet(1);
        let item = ambient_box("cola");
        assert!(dispatcher.assign_task_to_agv(Task::delivery(TaskId(1), item.clone(), 0), &item));

        // The AGV gives up; the dispatcher gets the task back.
        let id = fleet.read().unwrap().roster()[0];
        let aborted = fleet.write().unwrap().get_mut(id).unwrap().abort().unwrap();
        let task = dispatcher.take_active(aborted).unwrap();
        dispatcher.on_task_aborted(task, id);
        assert_eq!(dispatcher.aborted_count(), 1);

        dispatcher.reassign_aborted_tasks();
        assert_eq!(dispatcher.aborted_count(), 0);
        let fleet = fleet.read().unwrap();
        assert_eq!(fleet.get(id).unwrap().state(), AgvState::Busy);
        assert_eq!(fleet.get(id).unwrap().task(), Some(TaskId(1)));
    }

    #[test]
    fn reassignment_stalls_without_idle_agv_preserving_order() {
        let (dispatcher, fleet) = dispatcher_with_fleet(1);
        let item = ambient_box("cola");
        // Occupy the only AGV.
        assert!(dispatcher.assign_task_to_agv(Task::delivery(TaskId(1), item.clone(), 0), &item));

        let id = fleet.read().unwrap().roster()[0];
        dispatcher.on_task_aborted(Task::delivery(TaskId(2), item.clone(), 0), id);
        dispatcher.on_task_aborted(Task::delivery(TaskId(3), item.clone(), 0), id);

        dispatcher.reassign_aborted_tasks();
        // Nothing idle: both stay queued, in order.
        assert_eq!(dispatcher.aborted_count(), 2);

        // Free the AGV; only the head is reassigned (one idle AGV).
        fleet.write().unwrap().get_mut(id).unwrap().abort();
        dispatcher.take_active(TaskId(1));
        dispatcher.reassign_aborted_tasks();
        assert_eq!(dispatcher.aborted_count(), 1);
        assert_eq!(
            fleet.read().unwrap().get(id).unwrap().task(),
            Some(TaskId(2))
        );
    }
}
