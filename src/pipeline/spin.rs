//! Spin lock guarding the staging buffer.
//!
//! The audio callback must never be descheduled waiting for a lock, so the
//! staging state sits behind a spin lock instead of an OS mutex. Critical
//! sections on both sides are a bounded copy, which keeps the spin short.
//!
//! [`SpinMutex::lock`] falls back to `yield_now` after a while and is meant
//! for the bridge task. The audio callback uses [`lock_spinning`], which never
//! makes a system call.

#![allow(unsafe_code)] // lock_api::RawMutex is an unsafe trait

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::lock_api::{self, GuardSend};

/// Spins before each `yield_now` while the lock is contended.
const SPINS_BEFORE_YIELD: u32 = 64;

/// Raw test-and-test-and-set spin lock.
pub struct RawSpinLock {
    locked: AtomicBool,
}

// SAFETY: `lock` only returns once this thread flipped `locked` from false to
// true with Acquire ordering, and `unlock` releases it with Release ordering,
// so at most one guard exists at a time.
unsafe impl lock_api::RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self {
        locked: AtomicBool::new(false),
    };

    type GuardMarker = GuardSend;

    fn lock(&self) {
        let mut spins = 0u32;
        while !self.try_lock() {
            // Wait on a plain load so contended spinning does not bounce the cache line
            while self.locked.load(Ordering::Relaxed) {
                if spins < SPINS_BEFORE_YIELD {
                    spins += 1;
                    std::hint::spin_loop();
                } else {
                    spins = 0;
                    std::thread::yield_now();
                }
            }
        }
    }

    fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// A mutex that spins instead of parking.
pub type SpinMutex<T> = lock_api::Mutex<RawSpinLock, T>;

/// Guard returned by [`SpinMutex`] locks.
pub type SpinMutexGuard<'a, T> = lock_api::MutexGuard<'a, RawSpinLock, T>;

/// Locks `mutex` by busy-waiting only, without yielding to the scheduler.
///
/// For real-time threads, where a yield does not hand the CPU to a
/// lower-priority lock holder anyway.
pub fn lock_spinning<T>(mutex: &SpinMutex<T>) -> SpinMutexGuard<'_, T> {
    loop {
        if let Some(guard) = mutex.try_lock() {
            return guard;
        }
        while mutex.is_locked() {
            std::hint::spin_loop();
        }
    }
}
