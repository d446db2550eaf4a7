//! Integration tests for the orchestration layer.
//!
//! These drive a full [`SimContext`]: deliveries submitted from outside,
//! AGVs moving under clock ticks, aborted tasks recycled by the dispatcher
//! system, and process execution through the bounded pool.

use std::time::Duration;

use waresim_core::agv::AgvState;
use waresim_core::config::SimConfig;
use waresim_core::id::TaskId;
use waresim_core::test_utils::{ambient_box, chilled_box};
use waresim_logic::{SimContext, Task, run_process};

// ===========================================================================
// Test 1: deliveries run end to end under the clock
// ===========================================================================
//
// Two boxes of different kinds go in; two AGVs drive source -> dock and
// come back idle. The dispatcher's active table drains on completion.

#[test]
fn context_delivers_boxes_end_to_end() {
    let ctx = SimContext::new(SimConfig::default()).unwrap();

    let first = ctx.submit_delivery(ambient_box("cola")).unwrap();
    let second = ctx.submit_delivery(chilled_box("kvass")).unwrap();
    assert_ne!(first, second);
    assert_eq!(ctx.dispatcher().active_count(), 2);

    for _ in 0..60 {
        ctx.step();
    }

    let dock = ctx.storage().point_of(&ctx.config().loading_dock).unwrap();
    let fleet = ctx.fleet().read().unwrap();
    let parked = fleet.iter().filter(|a| a.position() == dock).count();
    assert_eq!(parked, 2);
    assert!(fleet.iter().all(|a| a.task().is_none()));
    drop(fleet);
    assert_eq!(ctx.dispatcher().active_count(), 0);
    assert_eq!(ctx.dispatcher().aborted_count(), 0);
    ctx.shutdown();
}

// ===========================================================================
// Test 2: a saturated fleet rejects further deliveries
// ===========================================================================

#[test]
fn saturated_fleet_rejects_submissions() {
    let config = SimConfig {
        fleet_size: 1,
        ..SimConfig::default()
    };
    let ctx = SimContext::new(config).unwrap();

    assert!(ctx.submit_delivery(ambient_box("cola")).is_some());
    assert!(ctx.submit_delivery(ambient_box("soda")).is_none());
    assert_eq!(ctx.dispatcher().active_count(), 1);
    ctx.shutdown();
}

// ===========================================================================
// Test 3: an aborted task is recycled on the next tick
// ===========================================================================
//
// The delivery is yanked off its AGV mid-route. Once the abort is reported,
// a single clock step is enough for the dispatcher system to hand the same
// task back to the (now idle) AGV.

#[test]
fn aborted_task_is_recycled_by_the_clock() {
    let config = SimConfig {
        fleet_size: 1,
        ..SimConfig::default()
    };
    let ctx = SimContext::new(config).unwrap();
    let submitted = ctx.submit_delivery(ambient_box("cola")).unwrap();

    ctx.step();

    let id = {
        let mut fleet = ctx.fleet().write().unwrap();
        let id = fleet.roster()[0];
        let aborted = fleet.get_mut(id).unwrap().abort().unwrap();
        assert_eq!(aborted, submitted);
        id
    };
    let task = ctx.dispatcher().take_active(submitted).unwrap();
    ctx.dispatcher().on_task_aborted(task, id);
    assert_eq!(ctx.dispatcher().aborted_count(), 1);

    ctx.step();

    assert_eq!(ctx.dispatcher().aborted_count(), 0);
    let fleet = ctx.fleet().read().unwrap();
    assert_eq!(fleet.get(id).unwrap().state(), AgvState::Busy);
    assert_eq!(fleet.get(id).unwrap().task(), Some(submitted));
    drop(fleet);
    ctx.shutdown();
}

// ===========================================================================
// Test 4: a delivery task's process runs on the pool
// ===========================================================================

#[test]
fn delivery_process_executes_all_resources() {
    let task = Task::delivery(TaskId(7), ambient_box("cola"), 3);
    let process = &task.processes[0];
    let outcomes = run_process(process, Duration::from_secs(2)).unwrap();
    assert_eq!(outcomes.len(), process.resource_count());
    assert!(outcomes.iter().all(Result::is_ok));
}
