//! One-shot task timers driven by the scheduler tick.
//!
//! Every task owns at most one timer slot, taken at creation. A slot is armed
//! with a tick count and, once that many ticks have passed, its callback runs
//! with the owning task as context. Stopping or re-arming a slot bumps its
//! sequence number, which turns an expiry that was already collected but not
//! yet delivered into a stale one.

use alloc::collections::BTreeSet;
use alloc::sync::Weak;
use alloc::vec::Vec;

use crate::error::TinyResult;

use super::{Task, TaskManager, TaskRef};

pub type TimerId = usize;

/// Timer callback, invoked from the tick path with the owning task.
pub type TimerCallback = fn(&TaskManager, &TaskRef, Expiry);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct TimerKey {
    deadline: u64,
    key: TimerId,
}

struct TimerSlot {
    name: &'static str,
    callback: TimerCallback,
    context: Weak<Task>,
    deadline: Option<u64>,
    seq: u64,
}

/// Identifies one particular arming of one timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    pub timer: TimerId,
    pub seq: u64,
}

/// An expiry collected by [`TimerList::advance`], waiting to be delivered.
pub struct Expired {
    pub callback: TimerCallback,
    pub context: Weak<Task>,
    pub expiry: Expiry,
}

pub struct TimerList {
    now: u64,
    /// Source of sequence numbers; never repeats, even across slot reuse.
    next_seq: u64,
    slots: Vec<Option<TimerSlot>>,
    armed: BTreeSet<TimerKey>,
}

impl TimerList {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            now: 0,
            next_seq: 0,
            slots,
            armed: BTreeSet::new(),
        }
    }

    /// Current tick count.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Takes a free slot for `context`.
    pub fn init(
        &mut self,
        name: &'static str,
        callback: TimerCallback,
        context: Weak<Task>,
    ) -> TinyResult<TimerId> {
        let Some(id) = self.slots.iter().position(Option::is_none) else {
            anyhow::bail!("timer list full ({} slots)", self.slots.len());
        };
        let seq = self.bump_seq();
        self.slots[id] = Some(TimerSlot {
            name,
            callback,
            context,
            deadline: None,
            seq,
        });
        Ok(id)
    }

    /// Stops the timer and frees its slot.
    pub fn release(&mut self, id: TimerId) {
        self.stop(id);
        self.slots[id] = None;
    }

    /// Arms the timer to fire `ticks` ticks from now, replacing any earlier
    /// arming.
    pub fn start(&mut self, id: TimerId, ticks: u32) -> TinyResult<()> {
        anyhow::ensure!(ticks > 0, "timer armed with zero ticks");
        self.stop(id);
        let now = self.now;
        let Some(slot) = self.slots.get_mut(id).and_then(Option::as_mut) else {
            anyhow::bail!("timer {} is not initialized", id);
        };
        let deadline = now + u64::from(ticks);
        slot.deadline = Some(deadline);
        trace!("timer {} ({}) armed for tick {}", id, slot.name, deadline);
        self.armed.insert(TimerKey { deadline, key: id });
        Ok(())
    }

    /// Disarms the timer. Any expiry collected but not yet delivered becomes
    /// stale.
    pub fn stop(&mut self, id: TimerId) {
        let seq = self.bump_seq();
        if let Some(slot) = self.slots.get_mut(id).and_then(Option::as_mut) {
            if let Some(deadline) = slot.deadline.take() {
                self.armed.remove(&TimerKey { deadline, key: id });
            }
            slot.seq = seq;
        }
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        matches!(self.slots.get(id), Some(Some(slot)) if slot.deadline.is_some())
    }

    /// Whether `expiry` still describes the latest arming of its timer.
    pub fn is_current(&self, expiry: Expiry) -> bool {
        matches!(self.slots.get(expiry.timer), Some(Some(slot)) if slot.seq == expiry.seq)
    }

    /// Advances time by one tick and collects every timer that expired.
    pub fn advance(&mut self) -> Vec<Expired> {
        self.now += 1;
        let mut expired = Vec::new();
        while let Some(first) = self.armed.first().copied() {
            if first.deadline > self.now {
                break;
            }
            self.armed.remove(&first);
            if let Some(slot) = self.slots[first.key].as_mut() {
                slot.deadline = None;
                expired.push(Expired {
                    callback: slot.callback,
                    context: slot.context.clone(),
                    expiry: Expiry {
                        timer: first.key,
                        seq: slot.seq,
                    },
                });
            }
        }
        expired
    }
}

impl Expired {
    /// Delivers the expiry if its task is still alive.
    pub fn fire(self, manager: &TaskManager) {
        if let Some(task) = self.context.upgrade() {
            (self.callback)(manager, &task, self.expiry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &TaskManager, _: &TaskRef, _: Expiry) {}

    #[test]
    fn fires_after_requested_ticks() {
        let mut timers = TimerList::new(2);
        let id = timers.init("t", noop, Weak::new()).unwrap();
        timers.start(id, 3).unwrap();
        assert!(timers.advance().is_empty());
        assert!(timers.advance().is_empty());
        let expired = timers.advance();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].expiry.timer, id);
        assert!(!timers.is_armed(id));
        assert!(timers.is_current(expired[0].expiry));
    }

    #[test]
    fn stop_makes_collected_expiry_stale() {
        let mut timers = TimerList::new(1);
        let id = timers.init("t", noop, Weak::new()).unwrap();
        timers.start(id, 1).unwrap();
        let expired = timers.advance();
        timers.stop(id);
        assert!(!timers.is_current(expired[0].expiry));
    }

    #[test]
    fn init_fails_when_full_and_zero_ticks_rejected() {
        let mut timers = TimerList::new(1);
        let id = timers.init("a", noop, Weak::new()).unwrap();
        assert!(timers.init("b", noop, Weak::new()).is_err());
        assert!(timers.start(id, 0).is_err());
        timers.release(id);
        assert!(timers.init("b", noop, Weak::new()).is_ok());
    }
}
