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

//! The ext2 superblock (§3, §6): volume-global metadata at byte offset 1024 of the partition,
//! cached once at mount.

use utils::any_repr::AnyRepr;

/// Byte offset of the superblock within the partition.
pub const SUPERBLOCK_OFFSET: u64 = 1024;

/// Magic number identifying an ext2 filesystem.
pub const EXT2_MAGIC: u16 = 0xef53;

/// The on-disk superblock, little-endian, bit-exact with the ext2 layout (§6). Only the fields
/// this driver consults are given real semantics; everything between them is preserved as raw
/// bytes so a round-tripped image is not silently corrupted outside the fields we touch.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct Superblock {
	pub inodes_count: u32,
	pub blocks_count: u32,
	pub r_blocks_count: u32,
	pub free_blocks_count: u32,
	pub free_inodes_count: u32,
	pub first_data_block: u32,
	pub log_block_size: u32,
	pub log_frag_size: u32,
	pub blocks_per_group: u32,
	pub frags_per_group: u32,
	pub inodes_per_group: u32,
	pub mtime: u32,
	pub wtime: u32,
	pub mnt_count: u16,
	pub max_mnt_count: u16,
	pub magic: u16,
	pub state: u16,
	pub errors: u16,
	pub minor_rev_level: u16,
	pub lastcheck: u32,
	pub checkinterval: u32,
	pub creator_os: u32,
	pub rev_level: u32,
	pub def_resuid: u16,
	pub def_resgid: u16,
	// -- extended fields (rev_level >= 1) --
	pub first_ino: u32,
	pub inode_size: u16,
	pub block_group_nr: u16,
	pub feature_compat: u32,
	pub feature_incompat: u32,
	pub feature_ro_compat: u32,
	pub uuid: [u8; 16],
	pub volume_name: [u8; 16],
	pub last_mounted: [u8; 64],
	pub algo_bitmap: u32,
	/// Padding out to the full 1024-byte superblock; this driver does not interpret
	/// preallocation hints, the journal UUID, or anything past `algo_bitmap`.
	pub _reserved: [u8; 820],
}

unsafe impl AnyRepr for Superblock {}

const _: () = assert!(core::mem::size_of::<Superblock>() == 1024);

impl Superblock {
	/// Block size in bytes, computed from `log_block_size` (`1024 << log_block_size`).
	///
	/// This driver fixes [`crate::config::BLOCK_SIZE`] at 1024 (§6) and does not support
	/// volumes formatted with a different block size; [`Self::validate`] rejects them.
	pub fn block_size(&self) -> u32 {
		1024 << { self.log_block_size }
	}

	/// Effective on-disk inode size: `inode_size` for revision-1 volumes, 128 for revision 0
	/// (which predates the field).
	pub fn inode_size(&self) -> u16 {
		if { self.rev_level } == 0 {
			128
		} else {
			self.inode_size
		}
	}

	/// Number of block groups, derived from the inode count (equivalent to deriving it from
	/// the block count; both must agree for a well-formed volume).
	pub fn groups_count(&self) -> u32 {
		let inodes_count = { self.inodes_count };
		let inodes_per_group = { self.inodes_per_group };
		inodes_count.div_ceil(inodes_per_group)
	}

	/// Sanity-checks the fields this driver relies on. Corruption here is fatal (§7): mounting
	/// a volume this driver cannot interpret is not a recoverable condition.
	pub fn validate(&self) -> bool {
		{ self.magic } == EXT2_MAGIC
			&& self.block_size() as usize == crate::config::BLOCK_SIZE
			&& { self.inodes_per_group } > 0
			&& { self.blocks_per_group } > 0
	}
}
