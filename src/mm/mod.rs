//! Memory management module.
//!
//! The task core owns no allocator of its own. Task pages come from the
//! platform through [`KernelHal`](crate::hal::KernelHal); control blocks come
//! from the global allocator.

pub mod page;

pub use page::{TaskInfo, TaskPage, task_from_stack};
