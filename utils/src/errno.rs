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

//! Error codes returned by fallible kernel operations.
//!
//! [`Errno`] is deliberately small: it covers only the user-input and resource-exhaustion
//! failures the filesystem core can raise. Corruption and concurrency misuse are not
//! represented here since they are fatal (the caller panics instead of matching on them).

use core::fmt;

/// An error code, analogous to a POSIX `errno` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Errno {
	/// Invalid argument.
	EINVAL,
	/// No such file or directory.
	ENOENT,
	/// Not a directory.
	ENOTDIR,
	/// Is a directory.
	EISDIR,
	/// No space left on device.
	ENOSPC,
	/// Too many open files.
	EMFILE,
	/// File name too long.
	ENAMETOOLONG,
	/// File already exists.
	EEXIST,
	/// Directory not empty.
	ENOTEMPTY,
	/// Structure needs cleaning (on-disk structure is malformed).
	EUCLEAN,
	/// Value too large / arithmetic overflow.
	EOVERFLOW,
	/// I/O error.
	EIO,
	/// No such device or address (unmapped device major number).
	ENXIO,
	/// Bad file descriptor.
	EBADF,
}

impl Errno {
	/// Returns the POSIX-style negative integer this error is surfaced as at the syscall
	/// boundary.
	///
	/// The exact numeric value does not matter to callers in this crate (every syscall wrapper
	/// collapses any `Err` to `-1`, per the on-the-wire convention), but a stable mapping keeps
	/// `as_int` usable for diagnostics and tests.
	pub const fn as_int(self) -> i32 {
		match self {
			Self::EINVAL => -1,
			Self::ENOENT => -2,
			Self::ENOTDIR => -3,
			Self::EISDIR => -4,
			Self::ENOSPC => -5,
			Self::EMFILE => -6,
			Self::ENAMETOOLONG => -7,
			Self::EEXIST => -8,
			Self::ENOTEMPTY => -9,
			Self::EUCLEAN => -10,
			Self::EOVERFLOW => -11,
			Self::EIO => -12,
			Self::ENXIO => -13,
			Self::EBADF => -14,
		}
	}
}

impl fmt::Display for Errno {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{self:?}")
	}
}

/// Shorthand for a [`Result`] whose error type is [`Errno`].
pub type EResult<T> = Result<T, Errno>;

/// Shorthand for a [`Result`] of a fallible allocation.
///
/// In this crate allocation failure is folded into the same [`Errno`] space as other
/// resource-exhaustion errors (`ENOSPC`), since the core never distinguishes "out of memory"
/// from "out of disk" at its interfaces.
pub type AllocResult<T> = Result<T, Errno>;

/// Builds an [`Errno`] value from a bare variant name, mirroring the call-site shape used
/// throughout the rest of the workspace (`errno!(ENOENT)`).
#[macro_export]
macro_rules! errno {
	($variant:ident) => {
		$crate::errno::Errno::$variant
	};
}
