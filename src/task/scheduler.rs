//! Ready-queue abstraction.

pub mod prio_scheduler;

/// The ready queue consumed by the task core.
///
/// Tasks stay linked while RUNNING, so picking the next task does not remove
/// it. Every insertion and removal names the priority level the task is
/// filed under, since the task's own priority is behind its lock, which the
/// caller already holds.
pub trait BaseScheduler {
    type SchedItem;

    fn init(&mut self);

    /// Appends `task` to the tail of level `prio`.
    fn add_task(&mut self, task: Self::SchedItem, prio: u8);

    /// Unlinks `task` from level `prio`.
    ///
    /// # Safety
    ///
    /// `task` must be linked into this scheduler under `prio`.
    unsafe fn remove_task(&mut self, task: &Self::SchedItem, prio: u8) -> Option<Self::SchedItem>;

    /// Head of the highest non-empty level, left in place.
    fn pick_next_task(&self) -> Option<Self::SchedItem>;

    /// Highest non-empty level.
    fn highest_priority(&self) -> Option<u8>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
