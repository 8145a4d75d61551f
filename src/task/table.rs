//! Slot-table storage for tasks.
//!
//! Task ids are slot indices. A slot is vacated only by [`TaskTable::remove`]
//! (reaping), so an id stays valid for the task's whole schedulable life;
//! reuse can only hand a recycled id to a task created after the old one was
//! reaped.

use alloc::vec::Vec;

use crate::error::{KernelError, KernelResult};
use crate::task::task::{Task, TaskId};

/// Growable slot table of live tasks.
pub struct TaskTable {
    slots: Vec<Option<Task>>,
}

impl TaskTable {
    pub const fn new() -> TaskTable {
        TaskTable { slots: Vec::new() }
    }

    /// Stores `task`, assigning it the id of the slot it lands in.
    ///
    /// Reuses the lowest free slot before growing. Growth goes through
    /// `try_reserve` so an allocation failure surfaces as `OutOfMemory`
    /// instead of a panic; this path can run with interrupts disabled.
    pub fn insert(&mut self, mut task: Task) -> KernelResult<TaskId> {
        if let Some(slot) = self.slots.iter().position(Option::is_none) {
            task.id = slot;
            self.slots[slot] = Some(task);
            return Ok(slot);
        }
        self.slots
            .try_reserve(1)
            .map_err(|_| KernelError::OutOfMemory)?;
        let slot = self.slots.len();
        task.id = slot;
        self.slots.push(Some(task));
        Ok(slot)
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.slots.get(id).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.slots.get_mut(id).and_then(Option::as_mut)
    }

    /// Vacates the slot, returning the task for teardown.
    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        self.slots.get_mut(id).and_then(Option::take)
    }

    /// Ids of all live tasks, ascending.
    pub fn ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|_| id))
    }
}
