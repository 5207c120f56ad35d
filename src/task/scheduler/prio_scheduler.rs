use alloc::sync::Arc;
use alloc::vec::Vec;

use intrusive_collections::LinkedList;

use crate::config::kernel::MAX_PRIORITY;
use crate::task::task::{PrioMask, SchedAdapter, Task, TaskRef};

/// A fixed-priority preemptive ready queue.
///
/// One FIFO per priority level, plus a bitmap of non-empty levels so the
/// highest runnable level is found with a couple of `trailing_zeros`.
/// Level `0` is the highest priority.
///
/// With up to 32 levels the bitmap is a single word. With more, levels are
/// grouped by eight: `ready_group` has one bit per group and `ready_table`
/// one byte per group.
pub struct PriorityScheduler {
    levels: Vec<LinkedList<SchedAdapter>>,
    ready_group: u32,
    #[cfg(feature = "prio-256")]
    ready_table: [u8; MAX_PRIORITY / 8],
    len: usize,
}

impl PriorityScheduler {
    /// Creates a new empty [`PriorityScheduler`].
    pub fn new() -> Self {
        let mut levels = Vec::with_capacity(MAX_PRIORITY);
        levels.resize_with(MAX_PRIORITY, || LinkedList::new(SchedAdapter::NEW));
        Self {
            levels,
            ready_group: 0,
            #[cfg(feature = "prio-256")]
            ready_table: [0; MAX_PRIORITY / 8],
            len: 0,
        }
    }

    /// get the name of scheduler
    pub fn scheduler_name() -> &'static str {
        "priority-bitmap"
    }

    /// Levels `task` is currently filed under. A consistent queue reports at
    /// most one.
    pub fn levels_of(&self, task: &Task) -> Vec<u8> {
        self.levels
            .iter()
            .enumerate()
            .filter(|(_, list)| list.iter().any(|t| core::ptr::eq(t, task)))
            .map(|(prio, _)| prio as u8)
            .collect()
    }

    /// Tasks at `prio`, head first. Empty for a level past `MAX_PRIORITY`.
    pub fn tasks_at(&self, prio: u8) -> Vec<TaskRef> {
        let mut tasks = Vec::new();
        let Some(level) = self.levels.get(prio as usize) else {
            return tasks;
        };
        let mut cursor = level.front();
        while let Some(task) = cursor.clone_pointer() {
            tasks.push(task);
            cursor.move_next();
        }
        tasks
    }

    #[cfg(not(feature = "prio-256"))]
    fn mark_ready(&mut self, prio: u8) {
        self.ready_group |= PrioMask::new(prio).offset_mask;
    }

    #[cfg(not(feature = "prio-256"))]
    fn mark_empty(&mut self, prio: u8) {
        self.ready_group &= !PrioMask::new(prio).offset_mask;
    }

    #[cfg(feature = "prio-256")]
    fn mark_ready(&mut self, prio: u8) {
        let mask = PrioMask::new(prio);
        self.ready_group |= mask.offset_mask;
        self.ready_table[mask.offset as usize] |= mask.prio_mask;
    }

    #[cfg(feature = "prio-256")]
    fn mark_empty(&mut self, prio: u8) {
        let mask = PrioMask::new(prio);
        let group = &mut self.ready_table[mask.offset as usize];
        *group &= !mask.prio_mask;
        if *group == 0 {
            self.ready_group &= !mask.offset_mask;
        }
    }
}

impl super::BaseScheduler for PriorityScheduler {
    type SchedItem = TaskRef;

    fn init(&mut self) {}

    fn add_task(&mut self, task: Self::SchedItem, prio: u8) {
        self.levels[prio as usize].push_back(task);
        self.mark_ready(prio);
        self.len += 1;
    }

    unsafe fn remove_task(&mut self, task: &Self::SchedItem, prio: u8) -> Option<Self::SchedItem> {
        let level = &mut self.levels[prio as usize];
        let removed = unsafe { level.cursor_mut_from_ptr(Arc::as_ptr(task)) }.remove();
        let now_empty = level.is_empty();
        if removed.is_some() {
            self.len -= 1;
        }
        if now_empty {
            self.mark_empty(prio);
        }
        removed
    }

    fn pick_next_task(&self) -> Option<Self::SchedItem> {
        let prio = self.highest_priority()?;
        self.levels[prio as usize].front().clone_pointer()
    }

    #[cfg(not(feature = "prio-256"))]
    fn highest_priority(&self) -> Option<u8> {
        (self.ready_group != 0).then(|| self.ready_group.trailing_zeros() as u8)
    }

    #[cfg(feature = "prio-256")]
    fn highest_priority(&self) -> Option<u8> {
        if self.ready_group == 0 {
            return None;
        }
        let group = self.ready_group.trailing_zeros() as usize;
        let within = self.ready_table[group].trailing_zeros() as usize;
        Some((group * 8 + within) as u8)
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl Default for PriorityScheduler {
    fn default() -> Self {
        Self::new()
    }
}
