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

//! Utility crate shared by the kernel and its build scripts.
//!
//! This is the small, no-std-friendly foundation the rest of the workspace is built on: a
//! POSIX-ish error type, a handful of math helpers, and thin re-exports of the allocation types
//! used throughout.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod any_repr;
pub mod boxed;
pub mod bytes;
pub mod errno;
pub mod limits;
pub mod math;
pub mod ptr;

pub use any_repr::AnyRepr;
