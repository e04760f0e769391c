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

//! ext2 "rev 2" directory entries (§3): `{inode, rec_len, name_len, file_type, name}`, variable
//! width, word-aligned, never spanning a block boundary except as whole records.
//!
//! This driver implements only the newer header-then-name-read form with record-length
//! validation (§9: "the newer one ... is authoritative").

use utils::any_repr::AnyRepr;

/// Size in bytes of the fixed portion of a directory entry.
pub const HEADER_SIZE: usize = 8;

/// The fixed 8-byte header preceding a directory entry's name.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct DirEntryHeader {
	pub inode: u32,
	pub rec_len: u16,
	pub name_len: u8,
	pub file_type: u8,
}

unsafe impl AnyRepr for DirEntryHeader {}

const _: () = assert!(core::mem::size_of::<DirEntryHeader>() == HEADER_SIZE);

/// `file_type` hint meaning "unknown"; this driver never populates it on write (§4.2:
/// `dirlink` ... `file_type = unknown`), consulting the inode itself instead on lookup.
pub const FT_UNKNOWN: u8 = 0;

impl DirEntryHeader {
	/// Reinterprets the first [`HEADER_SIZE`] bytes of `buf` as a header.
	pub fn from_bytes(buf: &[u8]) -> Self {
		let mut raw = [0u8; HEADER_SIZE];
		raw.copy_from_slice(&buf[..HEADER_SIZE]);
		// SAFETY: `DirEntryHeader: AnyRepr` and `raw` is exactly `HEADER_SIZE` bytes.
		unsafe { core::ptr::read_unaligned(raw.as_ptr() as *const Self) }
	}

	/// Serializes the header into the first [`HEADER_SIZE`] bytes of `buf`.
	pub fn write_to(&self, buf: &mut [u8]) {
		let raw = unsafe {
			core::slice::from_raw_parts(self as *const Self as *const u8, HEADER_SIZE)
		};
		buf[..HEADER_SIZE].copy_from_slice(raw);
	}
}

/// Computes the word-aligned record length for an entry with a name of `name_len` bytes
/// (§4.2: `(8 + name_len + 3) & ~3`).
pub fn record_len(name_len: usize) -> u16 {
	(((HEADER_SIZE + name_len + 3) & !3) as u16)
}
