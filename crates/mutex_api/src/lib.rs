//! Lock abstraction consumed by the page allocator.
//!
//! The allocator only needs "acquire, touch the data, release". The kernel
//! plugs in its interrupt-disabling spinlock, hosted tests plug in
//! `std::sync::Mutex`.
#![cfg_attr(
    all(not(test), any(not(feature = "std"), target_os = "none")),
    no_std
)]

use core::ops::DerefMut;

/// A mutex.
pub trait Mutex {
    /// The type of the data that the mutex protects.
    type Data;

    /// The type of the guard that the `lock` method returns.
    ///
    /// The lock is released when the guard is dropped.
    type Guard<'a>: DerefMut<Target = Self::Data>
    where
        Self: 'a;

    /// Creates a new unlocked mutex holding `data`.
    fn new(data: Self::Data) -> Self;

    /// Locks the mutex, spinning or blocking until it is available.
    fn lock(&self) -> Self::Guard<'_>;
}

#[cfg(all(feature = "std", not(target_os = "none")))]
impl<T> Mutex for std::sync::Mutex<T> {
    type Data = T;
    type Guard<'a>
        = std::sync::MutexGuard<'a, T>
    where
        T: 'a;

    fn new(data: Self::Data) -> Self {
        Self::new(data)
    }

    fn lock(&self) -> Self::Guard<'_> {
        // A poisoned lock means a holder panicked, which is already fatal.
        self.lock().unwrap()
    }
}

#[cfg(feature = "spin")]
impl<T> Mutex for spin::Mutex<T> {
    type Data = T;
    type Guard<'a>
        = spin::MutexGuard<'a, T>
    where
        T: 'a;

    fn new(data: Self::Data) -> Self {
        Self::new(data)
    }

    fn lock(&self) -> Self::Guard<'_> {
        self.lock()
    }
}
