//! Storage cells, beverage boxes, the notation-addressed cell registry, and
//! the charging-station pool.
//!
//! Cells are addressed by a short notation string (row letter + column
//! number, e.g. `"B7"`) that resolves to a floor [`Point`]. Each cell is
//! guarded by its own mutex so concurrent box transfers on different cells
//! never contend. Capacity accounting is fully derived from the placed-box
//! list: a box's placement is found by replaying the greedy stacking policy
//! (fill along length, advance along width, then height), so `add`/`remove`
//! can never drift out of sync with the occupied volume.

use crate::area::Point;
use crate::config::SimConfig;
use crate::id::AgvId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by the storage registry. Capacity and placement violations
/// are *not* errors — mutating cell calls report those as boolean failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid cell notation: {0:?}")]
    InvalidNotation(String),
    #[error("no cell registered at notation {0:?}")]
    UnknownCell(String),
    #[error("cell already registered at notation {0:?}")]
    DuplicateCell(String),
}

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// Classification of a beverage box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BoxKind {
    Ambient,
    Refrigerated,
    Bulk,
}

/// Classification of a storage cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellKind {
    Ambient,
    Refrigerated,
    Bulk,
    ChargingStation,
    /// Accepts any box kind (loading docks, overflow shelving).
    Any,
}

impl CellKind {
    /// Whether a box of `kind` may be stored in a cell of this kind.
    /// Charging stations never hold boxes.
    pub fn accepts(self, kind: BoxKind) -> bool {
        match self {
            CellKind::Ambient => kind == BoxKind::Ambient,
            CellKind::Refrigerated => kind == BoxKind::Refrigerated,
            CellKind::Bulk => kind == BoxKind::Bulk,
            CellKind::ChargingStation => false,
            CellKind::Any => true,
        }
    }
}

// ---------------------------------------------------------------------------
// BeveragesBox
// ---------------------------------------------------------------------------

/// A box of bottled beverages. Immutable once constructed; value-equal so a
/// cell can locate the exact box on removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeveragesBox {
    kind: BoxKind,
    name: String,
    length: u32,
    width: u32,
    height: u32,
    bottles: u32,
}

impl BeveragesBox {
    pub fn new(
        kind: BoxKind,
        name: impl Into<String>,
        length: u32,
        width: u32,
        height: u32,
        bottles: u32,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            length,
            width,
            height,
            bottles,
        }
    }

    pub fn kind(&self) -> BoxKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bottles(&self) -> u32 {
        self.bottles
    }

    pub fn volume(&self) -> u64 {
        self.length as u64 * self.width as u64 * self.height as u64
    }
}

// ---------------------------------------------------------------------------
// StorageCell
// ---------------------------------------------------------------------------

/// A fixed-capacity 3D container of beverage boxes.
///
/// Placement follows a greedy directional stacking policy: boxes fill along
/// the length axis until exhausted, then the row advances along the width
/// axis, then the layer advances along the height axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageCell {
    kind: CellKind,
    max_length: u32,
    max_width: u32,
    max_height: u32,
    boxes: Vec<BeveragesBox>,
}

impl StorageCell {
    pub fn new(kind: CellKind, max_length: u32, max_width: u32, max_height: u32) -> Self {
        Self {
            kind,
            max_length,
            max_width,
            max_height,
            boxes: Vec::new(),
        }
    }

    pub fn kind(&self) -> CellKind {
        self.kind
    }

    pub fn is_charging_station(&self) -> bool {
        self.kind == CellKind::ChargingStation
    }

    pub fn max_volume(&self) -> u64 {
        self.max_length as u64 * self.max_width as u64 * self.max_height as u64
    }

    /// Sum of the volumes of all placed boxes.
    pub fn used_volume(&self) -> u64 {
        self.boxes.iter().map(BeveragesBox::volume).sum()
    }

    pub fn remaining_volume(&self) -> u64 {
        self.max_volume() - self.used_volume()
    }

    pub fn boxes(&self) -> &[BeveragesBox] {
        &self.boxes
    }

    pub fn box_count(&self) -> usize {
        self.boxes.len()
    }

    /// Place a box. Returns `false` with no mutation when the cell is a
    /// charging station, the box kind is incompatible, or the box does not
    /// fit under the stacking policy.
    #[must_use = "a false return means the box was not placed"]
    pub fn add(&mut self, item: BeveragesBox) -> bool {
        if self.kind == CellKind::ChargingStation || !self.kind.accepts(item.kind) {
            return false;
        }
        if self.stacking_position(&item).is_none() {
            return false;
        }
        self.boxes.push(item);
        true
    }

    /// Remove the first box equal to `item`. Returns `false` when absent;
    /// otherwise frees exactly the volume the box occupied.
    #[must_use = "a false return means no box was removed"]
    pub fn remove(&mut self, item: &BeveragesBox) -> bool {
        match self.boxes.iter().position(|b| b == item) {
            Some(index) => {
                self.boxes.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove every box from the cell.
    pub fn clear(&mut self) {
        self.boxes.clear();
    }

    /// Replay the stacking policy over the current boxes plus `candidate`
    /// and return the candidate's position, or `None` when it cannot fit.
    fn stacking_position(&self, candidate: &BeveragesBox) -> Option<(u32, u32, u32)> {
        let (mut x, mut y, mut z) = (0u32, 0u32, 0u32);
        let mut row_width = 0u32;
        let mut layer_height = 0u32;
        let mut position = None;

        for item in self.boxes.iter().chain(std::iter::once(candidate)) {
            if item.length > self.max_length
                || item.width > self.max_width
                || item.height > self.max_height
            {
                return None;
            }
            if x + item.length > self.max_length {
                x = 0;
                y += row_width;
                row_width = 0;
            }
            if y + item.width > self.max_width {
                x = 0;
                y = 0;
                z += layer_height;
                layer_height = 0;
                row_width = 0;
            }
            if z + item.height > self.max_height {
                return None;
            }
            position = Some((x, y, z));
            x += item.length;
            row_width = row_width.max(item.width);
            layer_height = layer_height.max(item.height);
        }

        position
    }
}

// ---------------------------------------------------------------------------
// Notation
// ---------------------------------------------------------------------------

/// Parse a notation string (`"A0"`..`"Z999"`) into a floor point: the row
/// letter maps to `y`, the column number to `x`.
pub fn parse_notation(notation: &str) -> Result<Point, StorageError> {
    let mut chars = notation.chars();
    let row = match chars.next() {
        Some(c) if c.is_ascii_uppercase() => c as i32 - 'A' as i32,
        _ => return Err(StorageError::InvalidNotation(notation.to_string())),
    };
    let digits = chars.as_str();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StorageError::InvalidNotation(notation.to_string()));
    }
    let column: i32 = digits
        .parse()
        .map_err(|_| StorageError::InvalidNotation(notation.to_string()))?;
    Ok(Point::new(column, row))
}

// ---------------------------------------------------------------------------
// ChargingPool
// ---------------------------------------------------------------------------

/// Exclusive charging-station allocation with a FIFO waiter queue.
///
/// Only the waiter at the head of the queue may attempt acquisition each
/// tick; a blocked head stalls everyone behind it. That head-of-line
/// discipline is intended: it keeps the hand-out order strictly first-come,
/// first-served.
#[derive(Debug, Default)]
pub struct ChargingPool {
    /// Station point -> current occupant, in deterministic point order.
    stations: BTreeMap<Point, Option<AgvId>>,
    waiters: VecDeque<AgvId>,
}

impl ChargingPool {
    pub fn register_station(&mut self, point: Point) {
        self.stations.entry(point).or_insert(None);
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    /// First unoccupied station in point order, if any.
    pub fn find_available(&self) -> Option<Point> {
        self.stations
            .iter()
            .find(|(_, occupant)| occupant.is_none())
            .map(|(&point, _)| point)
    }

    /// Reserve `point` for `agv`. Fails when the point is not a station or
    /// is already occupied.
    #[must_use = "a false return means the station was not acquired"]
    pub fn occupy(&mut self, point: Point, agv: AgvId) -> bool {
        match self.stations.get_mut(&point) {
            Some(slot @ None) => {
                *slot = Some(agv);
                true
            }
            _ => false,
        }
    }

    /// Free the station at `point`. A no-op for unknown points.
    pub fn release(&mut self, point: Point) {
        if let Some(slot) = self.stations.get_mut(&point) {
            *slot = None;
        }
    }

    pub fn occupant(&self, point: Point) -> Option<AgvId> {
        self.stations.get(&point).copied().flatten()
    }

    /// Join the back of the waiter queue. Duplicate requests are ignored.
    pub fn enqueue_waiter(&mut self, agv: AgvId) {
        if !self.waiters.contains(&agv) {
            self.waiters.push_back(agv);
        }
    }

    /// The waiter currently allowed to attempt acquisition.
    pub fn head(&self) -> Option<AgvId> {
        self.waiters.front().copied()
    }

    pub fn pop_waiter(&mut self) -> Option<AgvId> {
        self.waiters.pop_front()
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Registry of storage cells addressed by notation, plus the charging pool.
#[derive(Debug, Default)]
pub struct Storage {
    cells: BTreeMap<String, Mutex<StorageCell>>,
    charging: Mutex<ChargingPool>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the standard warehouse layout from config: one row per box
    /// kind (A ambient, B refrigerated, C bulk), a row of Any-kind dock
    /// cells (D), and a row of charging stations (E). Columns are numbered
    /// from 1.
    pub fn standard_layout(config: &SimConfig) -> Self {
        let mut storage = Self::new();
        let dims = (config.cell_length, config.cell_width, config.cell_height);
        let rows = [
            ('A', CellKind::Ambient),
            ('B', CellKind::Refrigerated),
            ('C', CellKind::Bulk),
            ('D', CellKind::Any),
        ];
        for (letter, kind) in rows {
            for col in 1..=config.storage_cols {
                let notation = format!("{letter}{col}");
                let cell = StorageCell::new(kind, dims.0, dims.1, dims.2);
                // Notations generated here always parse.
                storage.insert_cell(&notation, cell).expect("generated notation");
            }
        }
        for col in 1..=config.charging_stations.min(config.storage_cols) {
            let notation = format!("E{col}");
            let cell = StorageCell::new(CellKind::ChargingStation, dims.0, dims.1, dims.2);
            storage.insert_cell(&notation, cell).expect("generated notation");
        }
        storage
    }

    /// Register a cell at `notation`. Charging-station cells are also
    /// registered with the charging pool.
    pub fn insert_cell(&mut self, notation: &str, cell: StorageCell) -> Result<(), StorageError> {
        let point = parse_notation(notation)?;
        if self.cells.contains_key(notation) {
            return Err(StorageError::DuplicateCell(notation.to_string()));
        }
        if cell.is_charging_station() {
            self.charging
                .lock()
                .expect("charging pool mutex poisoned")
                .register_station(point);
        }
        self.cells.insert(notation.to_string(), Mutex::new(cell));
        Ok(())
    }

    /// Resolve a notation to its floor point. Fails on malformed notation
    /// or when no cell is registered there.
    pub fn point_of(&self, notation: &str) -> Result<Point, StorageError> {
        let point = parse_notation(notation)?;
        if !self.cells.contains_key(notation) {
            return Err(StorageError::UnknownCell(notation.to_string()));
        }
        Ok(point)
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Registered notations in deterministic order.
    pub fn notations(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    /// Run `f` against the cell at `notation`, holding only that cell's lock.
    pub fn with_cell<R>(
        &self,
        notation: &str,
        f: impl FnOnce(&mut StorageCell) -> R,
    ) -> Result<R, StorageError> {
        let cell = self
            .cells
            .get(notation)
            .ok_or_else(|| StorageError::UnknownCell(notation.to_string()))?;
        let mut guard = cell.lock().expect("storage cell mutex poisoned");
        Ok(f(&mut guard))
    }

    /// Place a box into the cell at `notation`. `Ok(false)` is a capacity or
    /// compatibility rejection; `Err` means the notation itself is bad.
    pub fn add_box(&self, notation: &str, item: BeveragesBox) -> Result<bool, StorageError> {
        self.with_cell(notation, |cell| cell.add(item))
    }

    /// Remove a box from the cell at `notation`.
    pub fn remove_box(&self, notation: &str, item: &BeveragesBox) -> Result<bool, StorageError> {
        self.with_cell(notation, |cell| cell.remove(item))
    }

    pub fn cell_kind(&self, notation: &str) -> Result<CellKind, StorageError> {
        self.with_cell(notation, |cell| cell.kind())
    }

    /// The charging pool. Callers lock it once per multi-step sequence
    /// (head check + acquisition) so the sequence is atomic.
    pub fn charging_pool(&self) -> MutexGuard<'_, ChargingPool> {
        self.charging.lock().expect("charging pool mutex poisoned")
    }

    // Convenience one-shot delegates over the pool.

    pub fn find_available_charging_station(&self) -> Option<Point> {
        self.charging_pool().find_available()
    }

    #[must_use = "a false return means the station was not acquired"]
    pub fn occupy_charging_station(&self, point: Point, agv: AgvId) -> bool {
        self.charging_pool().occupy(point, agv)
    }

    pub fn release_charging_station(&self, point: Point) {
        self.charging_pool().release(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn small_box(name: &str) -> BeveragesBox {
        BeveragesBox::new(BoxKind::Ambient, name, 2, 2, 2, 12)
    }

    fn agv_ids(n: usize) -> Vec<AgvId> {
        let mut arena: SlotMap<AgvId, ()> = SlotMap::with_key();
        (0..n).map(|_| arena.insert(())).collect()
    }

    #[test]
    fn add_and_remove_restore_capacity() {
        let mut cell = StorageCell::new(CellKind::Ambient, 10, 10, 10);
        let before = cell.remaining_volume();
        let item = small_box("cola");
        assert!(cell.add(item.clone()));
        assert_eq!(cell.remaining_volume(), before - item.volume());
        assert!(cell.remove(&item));
        assert_eq!(cell.remaining_volume(), before);
    }

    #[test]
    fn remove_absent_box_is_false() {
        let mut cell = StorageCell::new(CellKind::Ambient, 10, 10, 10);
        assert!(!cell.remove(&small_box("ghost")));
        assert_eq!(cell.used_volume(), 0);
    }

    #[test]
    fn charging_station_rejects_boxes() {
        let mut cell = StorageCell::new(CellKind::ChargingStation, 10, 10, 10);
        assert!(!cell.add(small_box("cola")));
        assert_eq!(cell.box_count(), 0);
    }

    #[test]
    fn kind_mismatch_rejected_except_any() {
        let chilled = BeveragesBox::new(BoxKind::Refrigerated, "milk", 2, 2, 2, 6);
        let mut ambient = StorageCell::new(CellKind::Ambient, 10, 10, 10);
        assert!(!ambient.add(chilled.clone()));

        let mut any = StorageCell::new(CellKind::Any, 10, 10, 10);
        assert!(any.add(chilled));
    }

    #[test]
    fn fills_to_capacity_then_rejects() {
        // Three 10x10x3 layers fit a 10x10x10 cell; a fourth 10x10x2 does not.
        let mut cell = StorageCell::new(CellKind::Ambient, 10, 10, 10);
        for i in 0..3 {
            let layer = BeveragesBox::new(BoxKind::Ambient, format!("layer{i}"), 10, 10, 3, 48);
            assert!(cell.add(layer));
        }
        let extra = BeveragesBox::new(BoxKind::Ambient, "extra", 10, 10, 2, 24);
        assert!(!cell.add(extra));
        assert_eq!(cell.box_count(), 3);
        assert_eq!(cell.used_volume(), 900);
    }

    #[test]
    fn failed_add_leaves_cell_unchanged() {
        let mut cell = StorageCell::new(CellKind::Ambient, 4, 4, 4);
        assert!(cell.add(BeveragesBox::new(BoxKind::Ambient, "a", 4, 4, 4, 10)));
        let used = cell.used_volume();
        assert!(!cell.add(small_box("b")));
        assert_eq!(cell.used_volume(), used);
        assert_eq!(cell.box_count(), 1);
    }

    #[test]
    fn stacking_advances_rows_and_layers() {
        // Row of two along length, then next row, then next layer.
        let mut cell = StorageCell::new(CellKind::Ambient, 4, 4, 4);
        for i in 0..8 {
            let b = BeveragesBox::new(BoxKind::Ambient, format!("b{i}"), 2, 2, 2, 4);
            assert!(cell.add(b), "box {i} should fit");
        }
        let b = BeveragesBox::new(BoxKind::Ambient, "b8", 2, 2, 2, 4);
        assert!(!cell.add(b));
    }

    #[test]
    fn oversized_box_never_fits() {
        let mut cell = StorageCell::new(CellKind::Ambient, 4, 4, 4);
        assert!(!cell.add(BeveragesBox::new(BoxKind::Ambient, "wide", 5, 1, 1, 1)));
    }

    #[test]
    fn notation_parses_row_and_column() {
        assert_eq!(parse_notation("A0").unwrap(), Point::new(0, 0));
        assert_eq!(parse_notation("B7").unwrap(), Point::new(7, 1));
        assert_eq!(parse_notation("Z12").unwrap(), Point::new(12, 25));
    }

    #[test]
    fn malformed_notation_is_an_error() {
        for bad in ["", "7", "a3", "AB", "A3x", "A-1"] {
            assert!(
                matches!(parse_notation(bad), Err(StorageError::InvalidNotation(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn point_of_requires_registered_cell() {
        let mut storage = Storage::new();
        storage
            .insert_cell("A1", StorageCell::new(CellKind::Ambient, 10, 10, 10))
            .unwrap();
        assert_eq!(storage.point_of("A1").unwrap(), Point::new(1, 0));
        assert!(matches!(
            storage.point_of("A2"),
            Err(StorageError::UnknownCell(_))
        ));
        assert!(matches!(
            storage.point_of("??"),
            Err(StorageError::InvalidNotation(_))
        ));
    }

    #[test]
    fn charging_pool_is_exclusive() {
        let ids = agv_ids(2);
        let mut pool = ChargingPool::default();
        let station = Point::new(1, 4);
        pool.register_station(station);

        assert_eq!(pool.find_available(), Some(station));
        assert!(pool.occupy(station, ids[0]));
        assert!(!pool.occupy(station, ids[1]));
        assert_eq!(pool.occupant(station), Some(ids[0]));
        assert_eq!(pool.find_available(), None);

        pool.release(station);
        assert!(pool.occupy(station, ids[1]));
    }

    #[test]
    fn waiter_queue_is_fifo_without_duplicates() {
        let ids = agv_ids(3);
        let mut pool = ChargingPool::default();
        pool.enqueue_waiter(ids[0]);
        pool.enqueue_waiter(ids[1]);
        pool.enqueue_waiter(ids[0]); // ignored
        assert_eq!(pool.waiter_count(), 2);
        assert_eq!(pool.head(), Some(ids[0]));
        assert_eq!(pool.pop_waiter(), Some(ids[0]));
        assert_eq!(pool.head(), Some(ids[1]));
    }

    #[test]
    fn storage_delegates_station_acquisition() {
        let ids = agv_ids(1);
        let storage = Storage::standard_layout(&SimConfig::default());
        // E1 (1,4) comes before E2 (2,4) in point order.
        let station = storage.find_available_charging_station().unwrap();
        assert_eq!(station, Point::new(1, 4));
        assert!(storage.occupy_charging_station(station, ids[0]));
        assert_eq!(
            storage.find_available_charging_station(),
            Some(Point::new(2, 4))
        );
        storage.release_charging_station(station);
        assert_eq!(storage.find_available_charging_station(), Some(station));
    }

    #[test]
    fn standard_layout_registers_stations() {
        let config = SimConfig::default();
        let storage = Storage::standard_layout(&config);
        assert_eq!(
            storage.charging_pool().station_count(),
            config.charging_stations as usize
        );
        assert_eq!(
            storage.cell_kind(&config.loading_dock).unwrap(),
            CellKind::Any
        );
    }
}
