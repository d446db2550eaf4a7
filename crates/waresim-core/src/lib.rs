//! Waresim Core -- the simulation engine for an automated beverage warehouse.
//!
//! This crate provides the leaf components every layer above depends on:
//! the floor graph and pathfinder, notation-addressed storage cells with
//! 3D capacity accounting, the exclusive charging-station pool, the AGV
//! state machine and its instruction VM, the tick clock, static
//! configuration, and read-only query snapshots.
//!
//! # Tick model
//!
//! A single [`clock::Clock`] thread advances a discrete tick counter on a
//! fixed period and calls every registered [`clock::Tickable`] in
//! registration order, synchronously. All AGVs therefore update in a
//! deterministic order within one tick; the clock isolates subscriber
//! panics so one faulty component cannot halt the rest.
//!
//! # Key types
//!
//! - [`area::Area`] -- directed floor graph with BFS shortest paths.
//! - [`storage::StorageCell`] / [`storage::Storage`] -- 3D-capacity cells
//!   behind per-cell locks, addressed by row/column notation.
//! - [`storage::ChargingPool`] -- exclusive station allocation with a FIFO
//!   waiter queue (head-of-line acquisition).
//! - [`program::Program`] -- (opcode, operand) statements decoded once into
//!   typed instructions.
//! - [`agv::Agv`] / [`agv::Fleet`] -- the vehicle state machine and the
//!   roster-ordered arena it lives in.
//! - [`config::SimConfig`] -- numeric tunables, read once at startup.

pub mod agv;
pub mod area;
pub mod clock;
pub mod config;
pub mod id;
pub mod program;
pub mod query;
pub mod storage;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
