//! Suspendable lock protecting a buffer's or inode's contents
//! (spec.md §5). Held across blocking disk I/O, so unlike `SpinLock` the
//! holder must be able to block without spinning.
//!
//! The teacher's `SleepLock` is a `locked: Cell<bool>` guarded by an inner
//! `SpinLock<()>`, with the waiter parking via
//! `CPU_TABLE.my_proc().sleep(chan, guard)` (xv6's `sleep`/`wakeup`) and the
//! unlocker calling `PROCESS_TABLE.wakeup(chan)`. There is no process
//! scheduler in this crate (out of scope per spec.md §1), so the same
//! `locked` flag is instead guarded by a `Mutex` and waiters/wakers use a
//! `Condvar` — the uninterruptible, indefinite wait spec.md §5 requires,
//! just parked by the OS thread scheduler instead of a cooperative one.

use std::sync::{Condvar, Mutex};

pub struct SleepLock<T> {
    locked: Mutex<bool>,
    ready: Condvar,
    data: std::cell::UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for SleepLock<T> {}

impl<T> SleepLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            locked: Mutex::new(false),
            ready: Condvar::new(),
            data: std::cell::UnsafeCell::new(data),
        }
    }

    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        let mut held = self.locked.lock().unwrap_or_else(|e| e.into_inner());
        while *held {
            held = self
                .ready
                .wait(held)
                .unwrap_or_else(|e| e.into_inner());
        }
        *held = true;
        drop(held);

        SleepLockGuard {
            lock: self,
            data: unsafe { &mut *self.data.get() },
        }
    }

    /// Called by the guard when dropped.
    fn unlock(&self) {
        let mut held = self.locked.lock().unwrap_or_else(|e| e.into_inner());
        *held = false;
        drop(held);
        self.ready.notify_one();
    }
}

pub struct SleepLockGuard<'a, T> {
    lock: &'a SleepLock<T>,
    data: &'a mut T,
}

impl<'a, T> std::ops::Deref for SleepLockGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        self.data
    }
}

impl<'a, T> std::ops::DerefMut for SleepLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.data
    }
}

impl<'a, T> Drop for SleepLockGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}
