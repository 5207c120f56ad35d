//! Whole-lifecycle checks through the public API, with a host-side platform.

use std::alloc::{Layout, alloc, dealloc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use memory_addr::VirtAddr;

use rstiny_sched::config::kernel::{DEFAULT_TICK_QUOTA, TASK_PAGE_SIZE};
use rstiny_sched::hal::KernelHal;
use rstiny_sched::task::{TaskEntry, TaskExit, task_ops};
use rstiny_sched::{TaskError, TaskManager, TaskStatus};

#[derive(Default)]
struct HostHal {
    pages: AtomicUsize,
    manager: Mutex<Weak<TaskManager>>,
}

impl HostHal {
    fn layout() -> Layout {
        Layout::from_size_align(TASK_PAGE_SIZE, TASK_PAGE_SIZE).unwrap()
    }

    /// Lets `switch_task` act as the dispatcher, advancing time while the
    /// current task is blocked.
    fn attach(&self, manager: &Arc<TaskManager>) {
        *self.manager.lock().unwrap() = Arc::downgrade(manager);
    }
}

impl KernelHal for HostHal {
    fn alloc_page(&self) -> Option<VirtAddr> {
        let ptr = unsafe { alloc(Self::layout()) };
        if ptr.is_null() {
            return None;
        }
        self.pages.fetch_add(1, Ordering::SeqCst);
        Some(VirtAddr::from(ptr as usize))
    }

    unsafe fn free_page(&self, page: VirtAddr) {
        self.pages.fetch_sub(1, Ordering::SeqCst);
        unsafe { dealloc(page.as_usize() as *mut u8, Self::layout()) };
    }

    fn stack_init(&self, _: TaskEntry, _: usize, stack: VirtAddr, _: TaskExit) -> VirtAddr {
        stack
    }

    fn switch_task(&self) {
        let Some(manager) = self.manager.lock().unwrap().upgrade() else {
            return;
        };
        if let Some(current) = manager.current_task() {
            while current.status() == TaskStatus::Waiting {
                manager.timer_tick();
            }
        }
        manager.dispatch();
    }
}

fn idle(_: usize) {}

#[test]
fn create_ready_reprioritize_delete_reuse() {
    let hal = Arc::new(HostHal::default());
    let mgr = TaskManager::new(hal.clone());

    let t = mgr.create("T", idle, 0, 5, DEFAULT_TICK_QUOTA, None).unwrap();
    let id = t.id();
    assert_eq!(t.status(), TaskStatus::Suspended);

    mgr.ready(&t).unwrap();
    assert_eq!(mgr.ready_levels(&t), [5]);

    mgr.set_priority(&t, 2).unwrap();
    assert_eq!(mgr.ready_levels(&t), [2]);
    assert!(mgr.ready_tasks_at(5).is_empty());

    mgr.delete(&t).unwrap();
    assert!(mgr.is_closed(&t));
    assert!(!mgr.is_live(&t));
    assert!(mgr.ready_levels(&t).is_empty());
    assert_eq!(mgr.ready_count(), 0);

    let next = mgr.create("U", idle, 0, 3, DEFAULT_TICK_QUOTA, None).unwrap();
    assert_eq!(next.id(), id);

    assert_eq!(mgr.reap().len(), 1);
    drop(t);
    assert_eq!(hal.pages.load(Ordering::SeqCst), 1);
}

#[test]
fn independent_managers_do_not_share_state() {
    let a = TaskManager::new(Arc::new(HostHal::default()));
    let b = TaskManager::new(Arc::new(HostHal::default()));

    let ta = a.create("a", idle, 0, 1, DEFAULT_TICK_QUOTA, None).unwrap();
    let tb = b.create("b", idle, 0, 1, DEFAULT_TICK_QUOTA, None).unwrap();
    assert_eq!(ta.id(), tb.id());

    a.ready(&ta).unwrap();
    assert_eq!(a.ready_count(), 1);
    assert_eq!(b.ready_count(), 0);
    assert_eq!(b.hang(&ta), Err(TaskError::InvalidArgument));
}

#[test]
fn system_manager_serves_task_calls() {
    let hal = Arc::new(HostHal::default());
    let mgr = Arc::new(TaskManager::new(hal.clone()));
    hal.attach(&mgr);
    task_ops::init(mgr.clone());
    assert!(task_ops::is_initialized());

    let worker = mgr.create("worker", idle, 0, 4, DEFAULT_TICK_QUOTA, None).unwrap();
    let peer = mgr.create("peer", idle, 0, 4, DEFAULT_TICK_QUOTA, None).unwrap();
    mgr.ready(&worker).unwrap();
    mgr.ready(&peer).unwrap();
    let current = task_ops::current_task().unwrap();
    assert_eq!(current.id(), worker.id());

    task_ops::task_yield();
    assert_eq!(task_ops::current_task().unwrap().id(), peer.id());

    let before = mgr.now();
    task_ops::task_sleep_for(Duration::from_millis(25)).unwrap();
    assert_eq!(mgr.now() - before, 3);
    assert_eq!(peer.wake_flag(), 0);
    assert_eq!(task_ops::task_sleep(0), Err(TaskError::InvalidArgument));
}
