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

//! Small integer math helpers used by the on-disk format code.

/// Returns `2^n`.
pub const fn pow2(n: u32) -> u32 {
	1 << n
}

/// Returns the base-2 logarithm of `n`, assuming `n` is a power of two.
pub const fn log2(n: u32) -> u32 {
	n.trailing_zeros()
}
