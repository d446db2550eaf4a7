//! Shared test helpers for unit, integration, and property tests.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so downstream
//! crates can opt in via the `test-utils` feature.

use crate::agv::{Fleet, TickCtx};
use crate::area::{Area, Point};
use crate::clock::Ticks;
use crate::config::SimConfig;
use crate::storage::{BeveragesBox, BoxKind, CellKind, Storage, StorageCell};

// ===========================================================================
// Box constructors
// ===========================================================================

pub fn ambient_box(name: &str) -> BeveragesBox {
    BeveragesBox::new(BoxKind::Ambient, name, 2, 2, 2, 12)
}

pub fn chilled_box(name: &str) -> BeveragesBox {
    BeveragesBox::new(BoxKind::Refrigerated, name, 2, 2, 2, 6)
}

pub fn bulk_box(name: &str) -> BeveragesBox {
    BeveragesBox::new(BoxKind::Bulk, name, 5, 5, 5, 60)
}

pub fn sized_box(name: &str, length: u32, width: u32, height: u32) -> BeveragesBox {
    BeveragesBox::new(BoxKind::Ambient, name, length, width, height, 1)
}

// ===========================================================================
// Layout constructors
// ===========================================================================

/// The standard layout from the default config, with its matching area:
/// columns 1..=storage_cols on rows A..E, plus an origin aisle.
pub fn standard_world() -> (Area, Storage, SimConfig) {
    let config = SimConfig::default();
    let storage = Storage::standard_layout(&config);
    let area = Area::grid(config.storage_cols as i32 + 1, 5);
    (area, storage, config)
}

/// A one-cell storage: `notation` holding a fresh 10x10x10 cell of `kind`.
pub fn single_cell_storage(notation: &str, kind: CellKind) -> Storage {
    let mut storage = Storage::new();
    storage
        .insert_cell(notation, StorageCell::new(kind, 10, 10, 10))
        .expect("valid test notation");
    storage
}

pub fn tick_ctx<'a>(
    area: &'a Area,
    storage: &'a Storage,
    config: &'a SimConfig,
    tick: Ticks,
) -> TickCtx<'a> {
    TickCtx {
        area,
        storage,
        config,
        tick,
    }
}

/// Spawn `n` AGVs at the origin.
pub fn fleet_of(n: usize) -> Fleet {
    let mut fleet = Fleet::new();
    for _ in 0..n {
        fleet.spawn(Point::new(0, 0));
    }
    fleet
}
