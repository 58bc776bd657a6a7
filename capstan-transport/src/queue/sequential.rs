//! Strictly in-order submit queue.

use std::collections::BTreeMap;

use capstan_core::{TaskId, TaskSpec};

use super::{ActorSubmitQueue, SubmitSlot};

/// Submit queue that dispatches in ascending sequence-number order.
///
/// A task is dispatchable only when it occupies the lowest-numbered live
/// slot and its dependencies have resolved; a later task whose
/// dependencies resolved first waits behind it. Cancelled slots are
/// discarded as the cursor reaches them so they never block the queue.
#[derive(Default)]
pub struct SequentialSubmitQueue {
    slots: BTreeMap<u64, SubmitSlot>,
}

impl SequentialSubmitQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActorSubmitQueue for SequentialSubmitQueue {
    fn emplace(&mut self, sequence_number: u64, spec: TaskSpec) {
        let previous = self.slots.insert(sequence_number, SubmitSlot::new(spec));
        debug_assert!(previous.is_none(), "duplicate sequence number");
    }

    fn contains(&self, sequence_number: u64) -> bool {
        self.slots.contains_key(&sequence_number)
    }

    fn dependencies_resolved(&self, sequence_number: u64) -> bool {
        self.slots
            .get(&sequence_number)
            .is_some_and(|slot| slot.dependencies_resolved)
    }

    fn mark_dependency_resolved(&mut self, sequence_number: u64) {
        if let Some(slot) = self.slots.get_mut(&sequence_number) {
            slot.dependencies_resolved = true;
        }
    }

    fn mark_dependency_failed(&mut self, sequence_number: u64) {
        self.slots.remove(&sequence_number);
    }

    fn mark_task_canceled(&mut self, sequence_number: u64) {
        if let Some(slot) = self.slots.get_mut(&sequence_number) {
            slot.canceled = true;
        }
    }

    fn pop_next_task_to_send(&mut self) -> Option<(TaskSpec, bool)> {
        loop {
            let (&seq, slot) = self.slots.first_key_value()?;
            if slot.canceled {
                self.slots.remove(&seq);
                continue;
            }
            if !slot.dependencies_resolved {
                return None;
            }
            let slot = self.slots.remove(&seq)?;
            return Some((slot.spec, false));
        }
    }

    fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn clear_all_tasks(&mut self) -> Vec<TaskId> {
        let slots = std::mem::take(&mut self.slots);
        slots
            .into_values()
            .filter(|slot| !slot.canceled)
            .map(|slot| slot.spec.task_id)
            .collect()
    }
}
