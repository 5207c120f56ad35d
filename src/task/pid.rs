//! Task identifier allocation.

use alloc::vec;
use alloc::vec::Vec;

use crate::hal::SpinNoIrq;

use super::TaskId;

/// Bitmap allocator for task identifiers `1..=capacity`.
///
/// Identifier `0` is never handed out. The lowest free identifier is always
/// issued first, so a released identifier is the next one reused.
pub struct PidAllocator {
    bitmap: Vec<u64>,
    capacity: usize,
    used: usize,
}

impl PidAllocator {
    pub fn new(capacity: usize) -> Self {
        Self {
            bitmap: vec![0; (capacity + 1).div_ceil(64)],
            capacity,
            used: 0,
        }
    }

    pub fn alloc(&mut self) -> Option<TaskId> {
        if self.used == self.capacity {
            return None;
        }
        for (word_idx, word) in self.bitmap.iter_mut().enumerate() {
            // Bit 0 of word 0 stands for pid 0, which is reserved.
            let free = !*word & if word_idx == 0 { !1 } else { !0 };
            if free == 0 {
                continue;
            }
            let pid = word_idx * 64 + free.trailing_zeros() as usize;
            if pid > self.capacity {
                return None;
            }
            *word |= 1 << (pid % 64);
            self.used += 1;
            return Some(pid);
        }
        None
    }

    pub fn free(&mut self, pid: TaskId) {
        assert!(
            pid != 0 && pid <= self.capacity && self.is_allocated(pid),
            "freeing unallocated pid {pid}"
        );
        self.bitmap[pid / 64] &= !(1 << (pid % 64));
        self.used -= 1;
    }

    pub fn is_allocated(&self, pid: TaskId) -> bool {
        pid <= self.capacity && self.bitmap[pid / 64] & (1 << (pid % 64)) != 0
    }

    pub fn used(&self) -> usize {
        self.used
    }
}

/// An allocated identifier that goes back to its allocator on drop unless
/// [`PidGuard::keep`] is called.
pub struct PidGuard<'a> {
    pids: &'a SpinNoIrq<PidAllocator>,
    pid: TaskId,
}

impl<'a> PidGuard<'a> {
    pub fn alloc(pids: &'a SpinNoIrq<PidAllocator>) -> Option<Self> {
        let pid = pids.lock().alloc()?;
        Some(Self { pids, pid })
    }

    pub fn pid(&self) -> TaskId {
        self.pid
    }

    /// Hands the identifier over to its new owner.
    pub fn keep(self) -> TaskId {
        let pid = self.pid;
        core::mem::forget(self);
        pid
    }
}

impl Drop for PidGuard<'_> {
    fn drop(&mut self) {
        self.pids.lock().free(self.pid);
    }
}
