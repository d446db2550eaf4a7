use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies an AGV in the fleet arena.
    pub struct AgvId;
}

/// Identifies a delivery task. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_equality() {
        let a = TaskId(0);
        let b = TaskId(0);
        let c = TaskId(1);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn agv_ids_are_distinct_per_insert() {
        let mut fleet: slotmap::SlotMap<AgvId, u32> = slotmap::SlotMap::with_key();
        let a = fleet.insert(1);
        let b = fleet.insert(2);
        assert_ne!(a, b);
    }
}
