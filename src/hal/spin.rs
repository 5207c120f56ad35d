//! Spinlock that masks local IRQs while held.
//!
//! The task core is entered from task context and from the tick interrupt, so
//! every lock it takes must keep the interrupt handler off the CPU that holds
//! it. Masking goes through the [`IrqOps`] the platform registers with
//! [`init_irq_ops`]; until then the lock only spins.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

use lazyinit::LazyInit;
use lock_api::RawMutex;

/// Local interrupt control supplied by the platform.
pub trait IrqOps: Sync {
    /// Returns `true` if local IRQs are currently masked.
    fn irqs_disabled(&self) -> bool;
    /// Masks local IRQs.
    fn disable_irqs(&self);
    /// Unmasks local IRQs.
    fn enable_irqs(&self);
}

static IRQ_OPS: LazyInit<&'static dyn IrqOps> = LazyInit::new();

/// Registers the platform's interrupt control. Must be called at most once.
pub fn init_irq_ops(ops: &'static dyn IrqOps) {
    IRQ_OPS.init_once(ops);
}

/// Masks IRQs and returns whether they were enabled before.
#[inline]
fn irq_save() -> bool {
    match IRQ_OPS.get() {
        Some(ops) => {
            let irq_enabled_before = !ops.irqs_disabled();
            ops.disable_irqs();
            irq_enabled_before
        }
        None => false,
    }
}

#[inline]
fn irq_restore(irq_enabled_before: bool) {
    if irq_enabled_before {
        if let Some(ops) = IRQ_OPS.get() {
            ops.enable_irqs();
        }
    }
}

pub struct RawSpinNoIrq {
    lock: AtomicBool,
    saved_irq: UnsafeCell<bool>,
}

unsafe impl Sync for RawSpinNoIrq {}
unsafe impl Send for RawSpinNoIrq {}

unsafe impl RawMutex for RawSpinNoIrq {
    type GuardMarker = lock_api::GuardSend;
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self {
        lock: AtomicBool::new(false),
        saved_irq: UnsafeCell::new(false),
    };

    fn lock(&self) {
        let irq_enabled_before = irq_save();
        while self
            .lock
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.lock.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }
        unsafe { *self.saved_irq.get() = irq_enabled_before };
    }

    fn try_lock(&self) -> bool {
        let irq_enabled_before = irq_save();
        if self
            .lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            unsafe { *self.saved_irq.get() = irq_enabled_before };
            true
        } else {
            irq_restore(irq_enabled_before);
            false
        }
    }

    unsafe fn unlock(&self) {
        let irq_enabled_before = unsafe { *self.saved_irq.get() };
        self.lock.store(false, Ordering::Release);
        irq_restore(irq_enabled_before);
    }

    fn is_locked(&self) -> bool {
        self.lock.load(Ordering::Relaxed)
    }
}

/// A spinlock that keeps local IRQs masked while held.
pub type SpinNoIrq<T> = lock_api::Mutex<RawSpinNoIrq, T>;
/// Guard of a [`SpinNoIrq`].
pub type SpinNoIrqGuard<'a, T> = lock_api::MutexGuard<'a, RawSpinNoIrq, T>;
