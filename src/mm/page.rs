//! Task pages: a `TaskInfo` header and the task stack in one allocation.

use alloc::sync::Arc;
use core::mem::size_of;
use core::ptr;

use memory_addr::VirtAddr;

use crate::config::kernel::TASK_PAGE_SIZE;
use crate::hal::KernelHal;
use crate::task::Task;

/// Header stored at the base of every task page.
///
/// Lets low-level code find the control block of the task that owns a stack
/// from any address inside that stack.
#[repr(C)]
pub struct TaskInfo {
    pub task: *const Task,
}

/// One task page, returned to the platform on drop.
pub struct TaskPage {
    base: VirtAddr,
    hal: Arc<dyn KernelHal>,
}

impl TaskPage {
    /// Allocates a page from the platform and writes an empty header.
    pub fn alloc(hal: &Arc<dyn KernelHal>) -> Option<Self> {
        let base = hal.alloc_page()?;
        debug_assert!(base.as_usize() % TASK_PAGE_SIZE == 0);
        let page = Self {
            base,
            hal: hal.clone(),
        };
        page.set_owner(ptr::null());
        Some(page)
    }

    #[inline]
    pub fn base(&self) -> VirtAddr {
        self.base
    }

    /// First usable stack address for the target's stack growth direction.
    #[cfg(feature = "stack-grows-up")]
    pub fn stack_start(&self) -> VirtAddr {
        VirtAddr::from(self.base.as_usize() + size_of::<TaskInfo>())
    }

    /// First usable stack address for the target's stack growth direction.
    #[cfg(not(feature = "stack-grows-up"))]
    pub fn stack_start(&self) -> VirtAddr {
        VirtAddr::from(self.base.as_usize() + TASK_PAGE_SIZE - size_of::<usize>())
    }

    pub(crate) fn set_owner(&self, task: *const Task) {
        // Safety: the platform handed out TASK_PAGE_SIZE bytes aligned to
        // TASK_PAGE_SIZE, which covers and aligns the header.
        unsafe { ptr::write(self.base.as_usize() as *mut TaskInfo, TaskInfo { task }) };
    }

    /// Returns the control block recorded in the header.
    pub fn owner(&self) -> *const Task {
        unsafe { (*(self.base.as_usize() as *const TaskInfo)).task }
    }
}

impl Drop for TaskPage {
    fn drop(&mut self) {
        trace!("free task page {:#x}", self.base.as_usize());
        unsafe { self.hal.free_page(self.base) };
    }
}

/// Recovers the control block that owns the stack containing `sp`.
///
/// # Safety
///
/// `sp` must point into the stack of a live task page.
pub unsafe fn task_from_stack(sp: VirtAddr) -> *const Task {
    let base = sp.as_usize() & !(TASK_PAGE_SIZE - 1);
    unsafe { (*(base as *const TaskInfo)).task }
}
