//! Warehouse floor graph and shortest-path queries.
//!
//! An [`Area`] is a directed adjacency map over integer grid [`Point`]s.
//! Pathfinding is unweighted breadth-first search: aisle edges are
//! unit-length, so hop count and geometric length rank paths identically,
//! and everything stays in integer arithmetic. Adjacency is stored in a
//! `BTreeMap` so neighbor expansion order (and therefore the chosen path)
//! is deterministic across runs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

// ---------------------------------------------------------------------------
// Point
// ---------------------------------------------------------------------------

/// An integer (x, y) coordinate on the warehouse floor. Immutable and
/// value-equal; `Ord` so it can key deterministic maps.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Area
// ---------------------------------------------------------------------------

/// Directed graph of floor coordinates with an optional designated start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Area {
    adjacency: BTreeMap<Point, Vec<Point>>,
    start: Option<Point>,
}

impl Area {
    /// Create an empty area.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a 4-connected `width` x `height` aisle grid with origin (0, 0).
    pub fn grid(width: i32, height: i32) -> Self {
        let mut area = Self::new();
        for x in 0..width {
            for y in 0..height {
                let p = Point::new(x, y);
                area.insert_point(p);
                if x + 1 < width {
                    area.connect_bidirectional(p, Point::new(x + 1, y));
                }
                if y + 1 < height {
                    area.connect_bidirectional(p, Point::new(x, y + 1));
                }
            }
        }
        area.start = Some(Point::new(0, 0));
        area
    }

    /// Add a point with no neighbors. Idempotent.
    pub fn insert_point(&mut self, p: Point) {
        self.adjacency.entry(p).or_default();
    }

    /// Add a directed edge `from -> to`. Both endpoints are inserted.
    /// Duplicate edges are ignored.
    pub fn connect(&mut self, from: Point, to: Point) {
        self.insert_point(to);
        let neighbors = self.adjacency.entry(from).or_default();
        if !neighbors.contains(&to) {
            neighbors.push(to);
        }
    }

    /// Add edges in both directions between `a` and `b`.
    pub fn connect_bidirectional(&mut self, a: Point, b: Point) {
        self.connect(a, b);
        self.connect(b, a);
    }

    /// The designated start point, if one was set.
    pub fn start(&self) -> Option<Point> {
        self.start
    }

    pub fn set_start(&mut self, p: Point) {
        self.insert_point(p);
        self.start = Some(p);
    }

    /// Whether `p` is a known coordinate.
    pub fn contains(&self, p: Point) -> bool {
        self.adjacency.contains_key(&p)
    }

    /// Outgoing neighbors of `p`, in insertion order.
    pub fn neighbors(&self, p: Point) -> &[Point] {
        self.adjacency.get(&p).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of known points.
    pub fn point_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Shortest path from `start` to `target`, inclusive of both endpoints.
    ///
    /// Returns an empty vector when either endpoint is absent from the graph
    /// or no path exists. `find_path(p, p)` is `[p]`.
    pub fn find_path(&self, start: Point, target: Point) -> Vec<Point> {
        if !self.contains(start) || !self.contains(target) {
            return Vec::new();
        }
        if start == target {
            return vec![start];
        }

        let mut parent: BTreeMap<Point, Point> = BTreeMap::new();
        let mut queue: VecDeque<Point> = VecDeque::new();
        parent.insert(start, start);
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            for &next in self.neighbors(current) {
                if parent.contains_key(&next) {
                    continue;
                }
                parent.insert(next, current);
                if next == target {
                    return Self::rebuild(&parent, start, target);
                }
                queue.push_back(next);
            }
        }

        Vec::new()
    }

    fn rebuild(parent: &BTreeMap<Point, Point>, start: Point, target: Point) -> Vec<Point> {
        let mut path = vec![target];
        let mut cursor = target;
        while cursor != start {
            cursor = parent[&cursor];
            path.push(cursor);
        }
        path.reverse();
        path
    }
}
