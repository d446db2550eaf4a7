//! The AGV: a battery-powered vehicle driven by a five-state machine and a
//! decoded instruction program.
//!
//! # States
//!
//! `Idle`, `Busy`, `WaitingForCharge`, `MovingToCharge`, `Charging`.
//! Charging is strictly FIFO: a low AGV joins the pool's waiter queue and
//! only the queue head may try to grab a station each tick.
//!
//! # Per-tick phases
//!
//! 1. Idle + low battery -> join the charging queue.
//! 2. Waiting at the queue head -> attempt station acquisition.
//! 3. Charging -> gain charge, release the station at 100.
//! 4. Battery empty outside the charging flow -> blocked, skip the rest.
//! 5. Ensure a path exists for the front leg, then advance up to
//!    `movement_per_tick` waypoints, paying the per-step battery cost; on
//!    arrival fire the leg's deferred operation.
//!
//! A leg whose destination is unreachable is dropped together with its
//! deferred operation and a warning log. Nothing retries it; a dropped
//! charge leg also returns its reserved station to the pool.

use crate::area::{Area, Point};
use crate::clock::Ticks;
use crate::config::SimConfig;
use crate::id::{AgvId, TaskId};
use crate::program::{Instr, Location, Program, ProgramError, TransferDir, decode};
use crate::storage::{BeveragesBox, CellKind, Storage, StorageError};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Fatal faults raised while executing a deferred operation. The fleet
/// system logs these and aborts the AGV's task.
#[derive(Debug, thiserror::Error)]
pub enum AgvError {
    #[error("AGV is at {at}, not at cell {cell:?}")]
    NotAtCell { cell: String, at: Point },
    #[error("cell {cell:?} rejected the {dir:?} transfer")]
    TransferRejected { cell: String, dir: TransferDir },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgvState {
    Idle,
    Busy,
    WaitingForCharge,
    MovingToCharge,
    Charging,
}

/// An operation deferred until the AGV arrives at a leg's destination.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredOp {
    Transfer {
        dir: TransferDir,
        item: BeveragesBox,
        cell: String,
    },
    StartCharging,
}

/// One queued destination and the operation (if any) to fire on arrival.
/// The waypoint queue and the deferred-operation queue of the original
/// design are folded into one structure so the 1:1 pairing is structural.
#[derive(Debug, Clone, PartialEq)]
pub struct Leg {
    pub dest: Point,
    pub on_arrival: Option<DeferredOp>,
}

// ---------------------------------------------------------------------------
// Tick context
// ---------------------------------------------------------------------------

/// Everything an AGV may touch during one tick. Borrowed, never owned.
pub struct TickCtx<'a> {
    pub area: &'a Area,
    pub storage: &'a Storage,
    pub config: &'a SimConfig,
    pub tick: Ticks,
}

// ---------------------------------------------------------------------------
// Agv
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Agv {
    id: AgvId,
    battery: f32,
    position: Point,
    state: AgvState,
    route: VecDeque<Leg>,
    /// Remaining waypoints of the leg currently being walked.
    path: VecDeque<Point>,
    /// Boxes currently on board.
    carrying: Vec<BeveragesBox>,
    /// Task bound by the dispatcher, kept for abort tracking.
    task: Option<TaskId>,
    /// Charging station reserved for this AGV, if any.
    station: Option<Point>,
}

impl Agv {
    pub fn new(id: AgvId, position: Point) -> Self {
        Self {
            id,
            battery: 100.0,
            position,
            state: AgvState::Idle,
            route: VecDeque::new(),
            path: VecDeque::new(),
            carrying: Vec::new(),
            task: None,
            station: None,
        }
    }

    pub fn id(&self) -> AgvId {
        self.id
    }

    pub fn battery(&self) -> f32 {
        self.battery
    }

    /// Test/scenario hook. Clamped to [0, 100].
    pub fn set_battery(&mut self, level: f32) {
        self.battery = level.clamp(0.0, 100.0);
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn state(&self) -> AgvState {
        self.state
    }

    pub fn task(&self) -> Option<TaskId> {
        self.task
    }

    pub fn bind_task(&mut self, task: TaskId) {
        self.task = Some(task);
    }

    pub fn carrying(&self) -> &[BeveragesBox] {
        &self.carrying
    }

    pub fn route_len(&self) -> usize {
        self.route.len()
    }

    pub fn reserved_station(&self) -> Option<Point> {
        self.station
    }

    // -----------------------------------------------------------------------
    // Program loading
    // -----------------------------------------------------------------------

    /// Decode `program` and apply it to this AGV.
    ///
    /// The whole program is decoded and every location resolved *before*
    /// anything mutates, so a malformed program leaves the AGV untouched.
    /// Queued legs flip an idle AGV to `Busy`. A `STOP` terminates the
    /// program: legs queued before it survive, everything after it is gone.
    pub fn load_program(
        &mut self,
        program: &Program,
        storage: &Storage,
    ) -> Result<(), ProgramError> {
        let instrs = decode(program)?;

        let mut new_position: Option<Point> = None;
        let mut legs: Vec<Leg> = Vec::new();

        for instr in instrs {
            match instr {
                Instr::Setup { at } => {
                    new_position = Some(resolve(&at, storage)?);
                }
                Instr::MoveTo { dest } => {
                    legs.push(Leg {
                        dest: resolve(&dest, storage)?,
                        on_arrival: None,
                    });
                }
                Instr::Transfer { dir, item, cell } => {
                    match legs.last_mut() {
                        Some(leg) if leg.on_arrival.is_none() => {
                            leg.on_arrival = Some(DeferredOp::Transfer { dir, item, cell });
                        }
                        _ => return Err(ProgramError::TransferWithoutMove { cell }),
                    }
                }
                Instr::ChargeAt { station } => {
                    let kind = storage
                        .cell_kind(&station)
                        .map_err(|_| ProgramError::NotAChargingStation {
                            cell: station.clone(),
                        })?;
                    if kind != CellKind::ChargingStation {
                        return Err(ProgramError::NotAChargingStation { cell: station });
                    }
                    let dest = storage
                        .point_of(&station)
                        .map_err(|_| ProgramError::NotAChargingStation {
                            cell: station.clone(),
                        })?;
                    legs.push(Leg {
                        dest,
                        on_arrival: Some(DeferredOp::StartCharging),
                    });
                }
                Instr::Halt => break,
            }
        }

        if let Some(position) = new_position {
            self.position = position;
        }
        self.route.extend(legs);
        if !self.route.is_empty() && self.state == AgvState::Idle {
            self.state = AgvState::Busy;
        }
        Ok(())
    }

    /// Abort the current task: drop the task legs and return the bound task
    /// id so the dispatcher can requeue it. Charge legs survive the abort:
    /// an AGV already granted a station keeps its state and reservation and
    /// finishes the charging flow.
    pub fn abort(&mut self) -> Option<TaskId> {
        self.route
            .retain(|leg| leg.on_arrival == Some(DeferredOp::StartCharging));
        self.path.clear();
        if self.state == AgvState::Busy && self.route.is_empty() {
            self.state = AgvState::Idle;
        }
        self.task.take()
    }

    // -----------------------------------------------------------------------
    // Per-tick update
    // -----------------------------------------------------------------------

    pub fn tick(&mut self, ctx: &TickCtx<'_>) -> Result<(), AgvError> {
        // Phase 1: idle and low.
        if self.state == AgvState::Idle
            && self.battery <= ctx.config.low_battery_threshold
            && self.station.is_none()
        {
            self.request_charging(ctx);
        }

        // Phase 2: head-of-line station acquisition.
        if self.state == AgvState::WaitingForCharge {
            self.try_acquire_station(ctx);
        }

        // Phase 3: charge.
        if self.state == AgvState::Charging {
            self.battery = (self.battery + ctx.config.charge_per_tick).min(100.0);
            if self.battery >= 100.0 {
                self.battery = 100.0;
                if let Some(station) = self.station.take() {
                    ctx.storage.charging_pool().release(station);
                }
                self.state = if self.route.is_empty() {
                    AgvState::Idle
                } else {
                    AgvState::Busy
                };
                log::info!("agv {:?} fully charged", self.id);
            }
            return Ok(());
        }

        // Phase 4: exhausted outside the charging flow. The charging flow
        // itself is exempt, otherwise an AGV that hits zero en route to its
        // station could never recover.
        if self.battery <= 0.0 && self.state != AgvState::MovingToCharge {
            if self.state != AgvState::WaitingForCharge && self.station.is_none() {
                self.path.clear();
                self.request_charging(ctx);
            }
            return Ok(());
        }

        // Phase 5: movement.
        if matches!(self.state, AgvState::Busy | AgvState::MovingToCharge) {
            self.advance(ctx)?;
        }
        Ok(())
    }

    fn request_charging(&mut self, ctx: &TickCtx<'_>) {
        ctx.storage.charging_pool().enqueue_waiter(self.id);
        self.state = AgvState::WaitingForCharge;
        log::debug!(
            "agv {:?} requests charging at battery {:.1}",
            self.id,
            self.battery
        );
    }

    fn try_acquire_station(&mut self, ctx: &TickCtx<'_>) {
        // One lock across head check + acquisition keeps the pair atomic.
        let mut pool = ctx.storage.charging_pool();
        if pool.head() != Some(self.id) {
            return;
        }
        let Some(station) = pool.find_available() else {
            return;
        };
        if !pool.occupy(station, self.id) {
            return;
        }
        pool.pop_waiter();
        drop(pool);

        self.station = Some(station);
        self.path.clear();
        self.route.push_front(Leg {
            dest: station,
            on_arrival: Some(DeferredOp::StartCharging),
        });
        self.state = AgvState::MovingToCharge;
        log::debug!("agv {:?} heads to station {}", self.id, station);
    }

    fn advance(&mut self, ctx: &TickCtx<'_>) -> Result<(), AgvError> {
        // Ensure an active path exists for the front leg. Legs that are
        // already satisfied (or unreachable) resolve here without movement.
        while self.path.is_empty() {
            let Some(front) = self.route.front() else {
                self.finish_route();
                return Ok(());
            };
            let dest = front.dest;

            if self.position == dest {
                let leg = self.route.pop_front().expect("front checked");
                self.arrive(leg, ctx)?;
                continue;
            }

            let mut path = ctx.area.find_path(self.position, dest);
            if path.first() == Some(&self.position) {
                path.remove(0);
            }
            if path.is_empty() {
                // Documented gap: no route means the leg and its deferred
                // operation vanish. There is no retry and no timeout.
                log::warn!(
                    "agv {:?}: no path from {} to {}, dropping leg",
                    self.id,
                    self.position,
                    dest
                );
                let leg = self.route.pop_front().expect("front checked");
                if leg.on_arrival == Some(DeferredOp::StartCharging) {
                    // The reservation must not outlive the leg that would
                    // have consumed it.
                    if let Some(station) = self.station.take() {
                        ctx.storage.charging_pool().release(station);
                    }
                    if self.state == AgvState::MovingToCharge {
                        self.state = AgvState::Busy;
                    }
                }
                continue;
            }
            self.path = path.into();
        }

        // Walk up to movement_per_tick waypoints of the current leg.
        let mut steps = ctx.config.movement_per_tick;
        while steps > 0 {
            let Some(next) = self.path.pop_front() else {
                break;
            };
            self.position = next;
            self.battery = (self.battery - ctx.config.step_battery_cost).max(0.0);
            steps -= 1;
        }

        if self.path.is_empty() {
            if let Some(leg) = self.route.pop_front() {
                self.arrive(leg, ctx)?;
            }
            if self.route.is_empty() {
                self.finish_route();
            }
        }
        Ok(())
    }

    fn finish_route(&mut self) {
        if self.state == AgvState::Busy {
            self.state = AgvState::Idle;
            if let Some(task) = self.task.take() {
                log::info!("agv {:?} completed task {:?}", self.id, task);
            }
        }
    }

    fn arrive(&mut self, leg: Leg, ctx: &TickCtx<'_>) -> Result<(), AgvError> {
        match leg.on_arrival {
            None => Ok(()),
            Some(DeferredOp::StartCharging) => {
                self.state = AgvState::Charging;
                Ok(())
            }
            Some(DeferredOp::Transfer { dir, item, cell }) => {
                let expected = ctx.storage.point_of(&cell)?;
                if self.position != expected {
                    return Err(AgvError::NotAtCell {
                        cell,
                        at: self.position,
                    });
                }
                match dir {
                    TransferDir::Take => {
                        if !ctx.storage.remove_box(&cell, &item)? {
                            return Err(AgvError::TransferRejected { cell, dir });
                        }
                        self.carrying.push(item);
                    }
                    TransferDir::Release => {
                        if let Some(index) = self.carrying.iter().position(|b| *b == item) {
                            self.carrying.remove(index);
                        }
                        if !ctx.storage.add_box(&cell, item)? {
                            return Err(AgvError::TransferRejected { cell, dir });
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

fn resolve(location: &Location, storage: &Storage) -> Result<Point, ProgramError> {
    match location {
        Location::Coord(point) => Ok(*point),
        Location::Label(label) => storage.point_of(label).map_err(|_| {
            ProgramError::OperandMismatch {
                opcode: crate::program::Opcode::Move,
                operand: crate::program::Value::Label(label.clone()),
            }
        }),
    }
}

// ---------------------------------------------------------------------------
// Fleet
// ---------------------------------------------------------------------------

/// A fault surfaced by one AGV during a fleet tick. The faulting AGV has
/// already been aborted; `task` is whatever it had bound.
#[derive(Debug)]
pub struct TickFault {
    pub agv: AgvId,
    pub task: Option<TaskId>,
    pub error: AgvError,
}

/// The AGV fleet: a slotmap arena plus a roster preserving creation order,
/// which defines both dispatch scan order and intra-tick update order.
#[derive(Debug, Default)]
pub struct Fleet {
    agvs: SlotMap<AgvId, Agv>,
    roster: Vec<AgvId>,
}

impl Fleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, position: Point) -> AgvId {
        let id = self.agvs.insert_with_key(|id| Agv::new(id, position));
        self.roster.push(id);
        id
    }

    pub fn len(&self) -> usize {
        self.roster.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    pub fn roster(&self) -> &[AgvId] {
        &self.roster
    }

    pub fn get(&self, id: AgvId) -> Option<&Agv> {
        self.agvs.get(id)
    }

    pub fn get_mut(&mut self, id: AgvId) -> Option<&mut Agv> {
        self.agvs.get_mut(id)
    }

    /// AGVs in roster order.
    pub fn iter(&self) -> impl Iterator<Item = &Agv> {
        self.roster.iter().filter_map(|&id| self.agvs.get(id))
    }

    /// First idle AGV in roster order.
    pub fn first_idle(&self) -> Option<AgvId> {
        self.iter()
            .find(|agv| agv.state() == AgvState::Idle)
            .map(Agv::id)
    }

    pub fn idle_count(&self) -> usize {
        self.iter().filter(|a| a.state() == AgvState::Idle).count()
    }

    /// Update every AGV once, in roster order. Faulting AGVs are aborted
    /// and reported; the rest of the fleet is unaffected.
    pub fn tick_all(&mut self, ctx: &TickCtx<'_>) -> Vec<TickFault> {
        let mut faults = Vec::new();
        for index in 0..self.roster.len() {
            let id = self.roster[index];
            let Some(agv) = self.agvs.get_mut(id) else {
                continue;
            };
            if let Err(error) = agv.tick(ctx) {
                let task = agv.abort();
                faults.push(TickFault {
                    agv: id,
                    task,
                    error,
                });
            }
        }
        faults
    }
}
