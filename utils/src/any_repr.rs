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

//! Marker trait for types that may be safely reinterpreted from an arbitrary byte pattern.
//!
//! On-disk structures (superblock, group descriptor, inode) are `#[repr(C)]` plain-old-data: any
//! bit pattern read off disk is a valid value of the type. `AnyRepr` documents and gates that
//! assumption at the type level instead of scattering `unsafe` block comments across the driver.
//!
//! # Safety
//!
//! A type may only implement `AnyRepr` if every bit pattern of its size is a valid value: no
//! padding-sensitive niches, no enums with invalid discriminants, no references.

/// See the module documentation.
pub unsafe trait AnyRepr {}

unsafe impl AnyRepr for u8 {}
unsafe impl AnyRepr for u16 {}
unsafe impl AnyRepr for u32 {}
unsafe impl AnyRepr for u64 {}
unsafe impl AnyRepr for i8 {}
unsafe impl AnyRepr for i16 {}
unsafe impl AnyRepr for i32 {}
unsafe impl AnyRepr for i64 {}

unsafe impl<T: AnyRepr, const N: usize> AnyRepr for [T; N] {}
