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

//! An intrusive sleep/wake channel, the blocking primitive [`SleepLock`] is built on.
//!
//! §5 describes suspension points as blocking "only inside a sleep-lock acquire, an explicit
//! `sleep(channel, spinlock)` call ... and the synchronous block-device wait". The reference
//! kernel implements all three on top of a scheduler that can park and resume a task. This crate
//! has no scheduler of its own (it is the extracted filesystem core, not the whole kernel), so
//! [`WaitQueue`] represents the suspension point abstractly: `wait_until` blocks the calling
//! thread until a predicate holds, and `wake_one`/`wake_all` are its counterpart to `wakeup`.
//!
//! Under the `std` feature (used by the test harness, §1.1) this is backed by a real
//! `Condvar`, so concurrent-reader tests (§8 scenario 5) exercise genuine OS-level blocking. In a
//! `no_std` hosting kernel, a `WaitQueue` instead spins on the predicate; that kernel is expected
//! to replace the spin with a real park/unpark against its scheduler at the two or three call
//! sites that matter (documented in DESIGN.md as an Open Question resolution).

use core::hint;

#[cfg(feature = "std")]
use std::sync::{Condvar, Mutex};

/// A channel threads can block on until a condition becomes true.
pub struct WaitQueue {
	#[cfg(feature = "std")]
	inner: Mutex<()>,
	#[cfg(feature = "std")]
	condvar: Condvar,
}

impl WaitQueue {
	/// Creates a new, empty wait queue.
	pub const fn new() -> Self {
		Self {
			#[cfg(feature = "std")]
			inner: Mutex::new(()),
			#[cfg(feature = "std")]
			condvar: Condvar::new(),
		}
	}

	/// Blocks the calling thread until `cond` returns `true`, re-checking it each time the
	/// queue is woken (or, in the `no_std` fallback, on a spin interval).
	pub fn wait_until<F: FnMut() -> bool>(&self, mut cond: F) {
		#[cfg(feature = "std")]
		{
			let guard = self.inner.lock().unwrap();
			let _unused = self
				.condvar
				.wait_while(guard, |_| !cond())
				.unwrap();
		}
		#[cfg(not(feature = "std"))]
		{
			while !cond() {
				hint::spin_loop();
			}
		}
	}

	/// Wakes one thread blocked in [`Self::wait_until`].
	pub fn wake_one(&self) {
		#[cfg(feature = "std")]
		self.condvar.notify_one();
	}

	/// Wakes every thread blocked in [`Self::wait_until`].
	pub fn wake_all(&self) {
		#[cfg(feature = "std")]
		self.condvar.notify_all();
	}
}

impl Default for WaitQueue {
	fn default() -> Self {
		Self::new()
	}
}

unsafe impl Sync for WaitQueue {}
