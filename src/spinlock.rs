//! Short critical-section lock protecting identity/refcount fields
//! (spec.md §5: "a short critical-section lock protecting identity/
//! refcount, and a suspendable lock protecting contents").
//!
//! The teacher's `SpinLock` busy-waits on an `AtomicBool` and disables
//! interrupts on the holding core (`cpu::push_off`/`pop_off`) because it
//! runs with no OS underneath it. There is no interrupt controller in this
//! crate — trap/interrupt dispatch is an out-of-scope collaborator
//! (spec.md §1) — so `SpinLock` is a thin, non-spinning wrapper over
//! `std::sync::Mutex` that keeps the teacher's guard-with-`Drop` interface:
//! callers still write `let guard = lock.lock();` and never see a raw
//! `MutexGuard`.

use std::sync::{Mutex, MutexGuard};

pub struct SpinLock<T: ?Sized> {
    inner: Mutex<T>,
}

impl<T> SpinLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            inner: Mutex::new(data),
        }
    }
}

impl<T: ?Sized> SpinLock<T> {
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        SpinLockGuard {
            inner: self.inner.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }
}

pub struct SpinLockGuard<'a, T: ?Sized> {
    inner: MutexGuard<'a, T>,
}

impl<'a, T: ?Sized> std::ops::Deref for SpinLockGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<'a, T: ?Sized> std::ops::DerefMut for SpinLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
