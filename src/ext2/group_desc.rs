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

//! A block group descriptor (§3, §4.2): a per-group record in the Block Group Descriptor Table
//! (BGDT) carrying bitmap and inode-table locations.

use utils::any_repr::AnyRepr;

/// A single entry of the Block Group Descriptor Table.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct BlockGroupDescriptor {
	/// Block address of the block usage bitmap.
	pub block_bitmap: u32,
	/// Block address of the inode usage bitmap.
	pub inode_bitmap: u32,
	/// Starting block address of the inode table.
	pub inode_table: u32,
	/// Number of unallocated blocks in the group.
	pub free_blocks_count: u16,
	/// Number of unallocated inodes in the group.
	pub free_inodes_count: u16,
	/// Number of directories in the group.
	pub used_dirs_count: u16,
	pub _padding: [u8; 14],
}

unsafe impl AnyRepr for BlockGroupDescriptor {}

const _: () = assert!(core::mem::size_of::<BlockGroupDescriptor>() == 32);

impl BlockGroupDescriptor {
	pub fn block_bitmap(&self) -> u32 {
		self.block_bitmap
	}

	pub fn inode_bitmap(&self) -> u32 {
		self.inode_bitmap
	}

	pub fn inode_table(&self) -> u32 {
		self.inode_table
	}
}
