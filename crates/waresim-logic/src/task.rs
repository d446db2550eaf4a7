//! The delivery task model: Task -> Process -> Operation -> Resource.
//!
//! A [`Resource`] is one tagged-variant contract for every executable unit
//! the warehouse schedules — an AGV, a beverage box, or a software payload —
//! with a quantity and a fungibility flag. Operations are stamped with the
//! clock tick at which they were created, which is what process duration is
//! measured from.

use serde::{Deserialize, Serialize};
use waresim_core::clock::Ticks;
use waresim_core::id::{AgvId, TaskId};
use waresim_core::storage::BeveragesBox;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Invalid or failed resource. Construction faults are raised immediately;
/// `Cancelled` is the outcome of a worker abandoned at the shutdown
/// deadline.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ResourceError {
    #[error("resource quantity must be positive")]
    ZeroQuantity,
    #[error("operation has no resources")]
    EmptyOperation,
    #[error("resource execution cancelled at shutdown deadline")]
    Cancelled,
}

/// Fatal process-level failures.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("process has no operations")]
    Empty,
}

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

/// What a resource actually is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResourceKind {
    /// A vehicle from the fleet.
    Agv(AgvId),
    /// A physical box of beverages.
    Item(BeveragesBox),
    /// A named software work unit.
    Payload(String),
}

/// An executable unit with a quantity and a fungibility flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub kind: ResourceKind,
    pub quantity: u32,
    pub fungible: bool,
}

impl Resource {
    pub fn new(kind: ResourceKind, quantity: u32, fungible: bool) -> Result<Self, ResourceError> {
        if quantity == 0 {
            return Err(ResourceError::ZeroQuantity);
        }
        Ok(Self {
            kind,
            quantity,
            fungible,
        })
    }

    /// A single AGV. AGVs are never fungible.
    pub fn agv(id: AgvId) -> Self {
        Self {
            kind: ResourceKind::Agv(id),
            quantity: 1,
            fungible: false,
        }
    }

    /// One physical box.
    pub fn item(item: BeveragesBox) -> Self {
        Self {
            kind: ResourceKind::Item(item),
            quantity: 1,
            fungible: false,
        }
    }

    /// A fungible software payload repeated `quantity` times.
    pub fn payload(name: impl Into<String>, quantity: u32) -> Result<Self, ResourceError> {
        Self::new(ResourceKind::Payload(name.into()), quantity, true)
    }

    /// Run this resource's unit of work. Failures here surface only on this
    /// resource's outcome slot, never on siblings.
    pub fn execute(&self) -> Result<(), ResourceError> {
        if self.quantity == 0 {
            return Err(ResourceError::ZeroQuantity);
        }
        // The simulated work itself is trivial; the executor cares about
        // scheduling, isolation, and the shutdown deadline.
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// An ordered list of resources, stamped with its creation tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    resources: Vec<Resource>,
    created_tick: Ticks,
}

impl Operation {
    /// Fails immediately on an empty resource list.
    pub fn new(resources: Vec<Resource>, created_tick: Ticks) -> Result<Self, ResourceError> {
        if resources.is_empty() {
            return Err(ResourceError::EmptyOperation);
        }
        Ok(Self {
            resources,
            created_tick,
        })
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn created_tick(&self) -> Ticks {
        self.created_tick
    }
}

// ---------------------------------------------------------------------------
// Process
// ---------------------------------------------------------------------------

/// An ordered list of operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Process {
    operations: Vec<Operation>,
}

impl Process {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn push(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    /// Ticks elapsed since the oldest operation was created.
    pub fn duration(&self, now: Ticks) -> Result<Ticks, ProcessError> {
        let oldest = self
            .operations
            .iter()
            .map(Operation::created_tick)
            .min()
            .ok_or(ProcessError::Empty)?;
        Ok(now.saturating_sub(oldest))
    }

    /// Total resource count across all operations — the executor's
    /// concurrency degree.
    pub fn resource_count(&self) -> usize {
        self.operations.iter().map(|op| op.resources().len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A delivery task consumed by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub priority: u8,
    pub processes: Vec<Process>,
}

impl Task {
    pub fn new(id: TaskId, priority: u8, processes: Vec<Process>) -> Self {
        Self {
            id,
            priority,
            processes,
        }
    }

    /// A minimal delivery task for `item`: one process, one operation,
    /// one Item resource, stamped at `tick`.
    pub fn delivery(id: TaskId, item: BeveragesBox, tick: Ticks) -> Self {
        let operation =
            Operation::new(vec![Resource::item(item)], tick).expect("one resource is non-empty");
        Self::new(id, 0, vec![Process::new(vec![operation])])
    }

    /// Walk Task -> Process -> Operation -> Resource for the first box.
    pub fn find_box(&self) -> Option<&BeveragesBox> {
        self.processes
            .iter()
            .flat_map(|p| p.operations())
            .flat_map(|op| op.resources())
            .find_map(|r| match &r.kind {
                ResourceKind::Item(item) => Some(item),
                _ => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waresim_core::test_utils::ambient_box;

    #[test]
    fn empty_operation_is_rejected() {
        assert!(matches!(
            Operation::new(Vec::new(), 0),
            Err(ResourceError::EmptyOperation)
        ));
    }

    #[test]
    fn zero_quantity_resource_is_rejected() {
        assert!(matches!(
            Resource::payload("sync", 0),
            Err(ResourceError::ZeroQuantity)
        ));
    }

    #[test]
    fn duration_measures_from_oldest_operation() {
        let a = Operation::new(vec![Resource::payload("a", 1).unwrap()], 5).unwrap();
        let b = Operation::new(vec![Resource::payload("b", 1).unwrap()], 9).unwrap();
        let process = Process::new(vec![b, a]);
        assert_eq!(process.duration(12).unwrap(), 7);
    }

    #[test]
    fn duration_of_empty_process_fails() {
        assert!(matches!(
            Process::default().duration(3),
            Err(ProcessError::Empty)
        ));
    }

    #[test]
    fn find_box_walks_the_hierarchy() {
        let item = ambient_box("cola");
        let task = Task::delivery(TaskId(1), item.clone(), 0);
        assert_eq!(task.find_box(), Some(&item));

        let no_box = Task::new(
            TaskId(2),
            0,
            vec![Process::new(vec![
                Operation::new(vec![Resource::payload("sync", 2).unwrap()], 0).unwrap(),
            ])],
        );
        assert_eq!(no_box.find_box(), None);
    }

    #[test]
    fn resource_count_sums_operations() {
        let op1 = Operation::new(
            vec![
                Resource::payload("a", 1).unwrap(),
                Resource::payload("b", 1).unwrap(),
            ],
            0,
        )
        .unwrap();
        let op2 = Operation::new(vec![Resource::payload("c", 1).unwrap()], 0).unwrap();
        assert_eq!(Process::new(vec![op1, op2]).resource_count(), 3);
    }
}
