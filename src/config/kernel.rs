//! Kernel configuration constants.

/// Number of priority levels. Priority `0` is the highest.
#[cfg(not(feature = "prio-256"))]
pub const MAX_PRIORITY: usize = 32;
#[cfg(feature = "prio-256")]
pub const MAX_PRIORITY: usize = 256;

/// Size of one task page: the `TaskInfo` header followed by the task stack.
pub const TASK_PAGE_SIZE: usize = 0x2000; // 8K

/// Highest task identifier the pid allocator hands out.
pub const MAX_TASKS: usize = 128;

/// Number of one-shot timer slots available to tasks.
pub const MAX_TIMERS: usize = MAX_TASKS;

/// Tick quota used when a caller does not care.
pub const DEFAULT_TICK_QUOTA: u32 = 10;

pub const TICKS_PER_SEC: usize = 100; // 100 ticks per second
