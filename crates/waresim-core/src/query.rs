//! Read-only query API for GUI and monitoring consumers.
//!
//! Snapshot types are owned copies — no references into live simulation
//! state, so they can be handed to a renderer on another thread without
//! holding any lock.

use crate::agv::{Agv, AgvState, Fleet};
use crate::area::Point;
use crate::id::AgvId;
use crate::storage::{CellKind, Storage};
use serde::Serialize;

// ---------------------------------------------------------------------------
// AGV snapshot
// ---------------------------------------------------------------------------

/// Read-only view of one AGV: exactly the fields the GUI consumes.
#[derive(Debug, Clone, Serialize)]
pub struct AgvSnapshot {
    pub id: AgvId,
    pub battery: f32,
    pub state: AgvState,
    pub position: Point,
    pub carrying: usize,
}

impl AgvSnapshot {
    pub fn of(agv: &Agv) -> Self {
        Self {
            id: agv.id(),
            battery: agv.battery(),
            state: agv.state(),
            position: agv.position(),
            carrying: agv.carrying().len(),
        }
    }
}

/// Snapshot every AGV in roster order.
pub fn fleet_snapshot(fleet: &Fleet) -> Vec<AgvSnapshot> {
    fleet.iter().map(AgvSnapshot::of).collect()
}

// ---------------------------------------------------------------------------
// Cell snapshot
// ---------------------------------------------------------------------------

/// Read-only view of one storage cell's occupancy. `occupied_by` is set
/// only for charging stations currently held by an AGV.
#[derive(Debug, Clone, Serialize)]
pub struct CellSnapshot {
    pub notation: String,
    pub kind: CellKind,
    pub box_count: usize,
    pub used_volume: u64,
    pub remaining_volume: u64,
    pub occupied_by: Option<AgvId>,
}

/// Snapshot every cell in notation order. Locks one cell at a time.
pub fn storage_snapshot(storage: &Storage) -> Vec<CellSnapshot> {
    storage
        .notations()
        .map(|notation| notation.to_string())
        .collect::<Vec<_>>()
        .into_iter()
        .filter_map(|notation| {
            let occupied_by = storage
                .point_of(&notation)
                .ok()
                .and_then(|point| storage.charging_pool().occupant(point));
            storage
                .with_cell(&notation, |cell| CellSnapshot {
                    notation: notation.clone(),
                    kind: cell.kind(),
                    box_count: cell.box_count(),
                    used_volume: cell.used_volume(),
                    remaining_volume: cell.remaining_volume(),
                    occupied_by,
                })
                .ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{BeveragesBox, BoxKind, StorageCell};

    #[test]
    fn fleet_snapshot_preserves_roster_order() {
        let mut fleet = Fleet::new();
        let a = fleet.spawn(Point::new(0, 0));
        let b = fleet.spawn(Point::new(1, 0));
        let snapshots = fleet_snapshot(&fleet);
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].id, a);
        assert_eq!(snapshots[1].id, b);
        assert_eq!(snapshots[0].battery, 100.0);
        assert_eq!(snapshots[0].state, AgvState::Idle);
    }

    #[test]
    fn storage_snapshot_reflects_occupancy() {
        let mut storage = Storage::new();
        storage
            .insert_cell("A1", StorageCell::new(CellKind::Ambient, 10, 10, 10))
            .unwrap();
        let item = BeveragesBox::new(BoxKind::Ambient, "cola", 2, 2, 2, 12);
        assert!(storage.add_box("A1", item.clone()).unwrap());

        let snapshots = storage_snapshot(&storage);
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].box_count, 1);
        assert_eq!(snapshots[0].used_volume, item.volume());
        assert_eq!(
            snapshots[0].remaining_volume,
            1000 - item.volume()
        );
    }
}
