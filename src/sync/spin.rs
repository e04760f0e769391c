/*
 * Copyright 2024 Luc Lenôtre
 *
 * This file is part of Maestro.
 *
 * Maestro is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Maestro is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Maestro. If not, see <https://www.gnu.org/licenses/>.
 */

//! Mutually exclusive access primitive based on a spinlock.
//!
//! A [`Spin`] protects its wrapped data from being accessed concurrently. One particularity of
//! kernel-level locking is that an interrupt may preempt the holder of a lock as readily as
//! another thread can; the `INT` generic parameter marks locks that, in a hosting kernel, must
//! additionally mask interrupts on the holding CPU while held (§5: "spinlocks disable interrupts
//! on the holding CPU").
//!
//! This crate does not itself own an interrupt controller — that belongs to the excluded
//! surrounding kernel (§1) — so `INT = false` locks here only document the requirement; a kernel
//! embedding this crate is expected to mask interrupts around the call sites that matter (the
//! block cache and icache membership locks, per §5's lock taxonomy) via its own arch layer.

use core::{
	cell::UnsafeCell,
	fmt::{self, Formatter},
	hint,
	ops::{Deref, DerefMut},
	sync::atomic::{
		AtomicBool,
		Ordering::{Acquire, Release},
	},
};

#[inline(always)]
fn lock(lock: &AtomicBool) {
	while lock.swap(true, Acquire) {
		hint::spin_loop();
	}
}

/// Unlocks the associated [`Spin`] when dropped.
pub struct SpinGuard<'m, T: ?Sized, const INT: bool> {
	spin: &'m Spin<T, INT>,
}

impl<T: ?Sized, const INT: bool> Deref for SpinGuard<'_, T, INT> {
	type Target = T;

	fn deref(&self) -> &Self::Target {
		unsafe { &*self.spin.data.get() }
	}
}

impl<T: ?Sized, const INT: bool> DerefMut for SpinGuard<'_, T, INT> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		unsafe { &mut *self.spin.data.get() }
	}
}

impl<T: ?Sized, const INT: bool> !Send for SpinGuard<'_, T, INT> {}

unsafe impl<T: ?Sized + Sync, const INT: bool> Sync for SpinGuard<'_, T, INT> {}

impl<T: ?Sized + fmt::Debug, const INT: bool> fmt::Debug for SpinGuard<'_, T, INT> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self.deref(), f)
	}
}

impl<T: ?Sized, const INT: bool> Drop for SpinGuard<'_, T, INT> {
	fn drop(&mut self) {
		self.spin.locked.store(false, Release);
	}
}

/// Wraps a value which may be accessed by only one context at a time.
///
/// The `INT` generic parameter tells whether a hosting kernel must mask interrupts while locked.
/// The default is `true` (no masking required), matching most of this crate's locks — only the
/// cache/icache membership locks in §5 need `INT = false`.
pub struct Spin<T: ?Sized, const INT: bool = true> {
	locked: AtomicBool,
	data: UnsafeCell<T>,
}

impl<T, const INT: bool> Spin<T, INT> {
	/// Creates a new instance wrapping the given `data`.
	pub const fn new(data: T) -> Self {
		Self {
			locked: AtomicBool::new(false),
			data: UnsafeCell::new(data),
		}
	}
}

impl<T: Default, const INT: bool> Default for Spin<T, INT> {
	fn default() -> Self {
		Self::new(Default::default())
	}
}

impl<T: ?Sized, const INT: bool> Spin<T, INT> {
	/// Acquires the spinlock, looping until it becomes available.
	///
	/// Returns a [`SpinGuard`] that releases the lock when dropped.
	pub fn lock(&self) -> SpinGuard<T, INT> {
		lock(&self.locked);
		SpinGuard {
			spin: self,
		}
	}

	/// Attempts to acquire the spinlock without blocking.
	pub fn try_lock(&self) -> Option<SpinGuard<T, INT>> {
		if self.locked.swap(true, Acquire) {
			None
		} else {
			Some(SpinGuard {
				spin: self,
			})
		}
	}
}

impl<T, const INT: bool> Spin<T, INT> {
	/// Acquires the spinlock, consumes it and returns the inner value.
	pub fn into_inner(self) -> T {
		self.data.into_inner()
	}
}

unsafe impl<T: ?Sized + Send, const INT: bool> Sync for Spin<T, INT> {}
unsafe impl<T: ?Sized + Send, const INT: bool> Send for Spin<T, INT> {}

impl<T: ?Sized + fmt::Debug, const INT: bool> fmt::Debug for Spin<T, INT> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let guard = self.lock();
		fmt::Debug::fmt(&*guard, f)
	}
}

/// Type alias on [`Spin`] representing a spinlock that must mask interrupts in a hosting kernel.
pub type IntSpin<T> = Spin<T, false>;
/// Type alias on [`SpinGuard`] representing a guard for an [`IntSpin`].
pub type IntSpinGuard<'m, T> = SpinGuard<'m, T, false>;
