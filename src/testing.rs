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

//! Test tooling (§8.1): an in-memory [`BlockDevice`] fake and a tiny ext2 image builder, so the
//! rest of the crate's tests can mount a real (if minuscule) filesystem without a real disk.
//!
//! Grounded on the parent kernel's own test doubles for its block layer (a `Vec`-backed fake
//! satisfying the same device trait the real AHCI/virtio drivers implement), narrowed to exactly
//! the one trait this crate's [`BlockDevice`] exposes.

use crate::{
	block::BlockDevice,
	config::{BLOCK_SIZE, NDIRECT},
	ext2::{
		dirent::{DirEntryHeader, FT_UNKNOWN, HEADER_SIZE, record_len},
		group_desc::BlockGroupDescriptor,
		inode_disk::{FileType, Inode},
		superblock::{EXT2_MAGIC, Superblock},
	},
};
use alloc::vec::Vec;
use utils::{
	bytes,
	errno::{EResult, Errno},
};

/// A disk held entirely in memory, guarded by a plain spinlock (§5.1's `Spin`, not a blocking
/// lock — a test device never actually contends).
pub struct MemDisk {
	blocks: crate::sync::spin::Spin<Vec<[u8; BLOCK_SIZE]>>,
}

impl MemDisk {
	/// Creates a zero-filled disk of `block_count` blocks.
	pub fn new(block_count: usize) -> Self {
		Self {
			blocks: crate::sync::spin::Spin::new(alloc::vec![[0u8; BLOCK_SIZE]; block_count]),
		}
	}

	/// Number of blocks the disk holds.
	pub fn len(&self) -> usize {
		self.blocks.lock().len()
	}
}

impl BlockDevice for MemDisk {
	fn read_block(&self, blockno: u32, buf: &mut [u8; BLOCK_SIZE]) -> EResult<()> {
		let blocks = self.blocks.lock();
		let block = blocks.get(blockno as usize).ok_or(Errno::EIO)?;
		buf.copy_from_slice(block);
		Ok(())
	}

	fn write_block(&self, blockno: u32, buf: &[u8; BLOCK_SIZE]) -> EResult<()> {
		let mut blocks = self.blocks.lock();
		let block = blocks.get_mut(blockno as usize).ok_or(Errno::EIO)?;
		block.copy_from_slice(buf);
		Ok(())
	}
}

/// Layout constants for the image this builder produces: one partition spanning the whole
/// disk, one block group, a 128-byte inode size.
const INODES_PER_GROUP: u32 = 128;
const INODE_SIZE: u16 = 128;
const BOOT_BLOCK: u32 = 0;
const SUPERBLOCK_BLOCK: u32 = 1;
const BGDT_BLOCK: u32 = 2;
const BLOCK_BITMAP_BLOCK: u32 = 3;
const INODE_BITMAP_BLOCK: u32 = 4;
const INODE_TABLE_BLOCK: u32 = 5;

fn inode_table_blocks() -> u32 {
	(INODES_PER_GROUP as usize * INODE_SIZE as usize).div_ceil(BLOCK_SIZE) as u32
}

fn first_data_block() -> u32 {
	INODE_TABLE_BLOCK + inode_table_blocks()
}

/// Builds a minimal ext2 volume with just a root directory (inode 2) containing "." and "..",
/// on a disk of `total_blocks` 1024-byte blocks (must be large enough to hold the fixed
/// metadata above plus whatever the caller's test goes on to allocate).
pub fn build_basic_image(total_blocks: u32) -> MemDisk {
	let disk = MemDisk::new(total_blocks as usize);
	write_mbr(&disk, total_blocks);

	let root_data_block = first_data_block();
	// Bit 0 of the block bitmap corresponds to partition block 1 (`first_data_block` in the
	// superblock), so the metadata blocks (superblock through the inode table) plus the root
	// directory's one data block are exactly the first `root_data_block` bits.
	let used_bits = root_data_block;
	let blocks_per_group = total_blocks - 1;

	write_superblock(&disk, total_blocks, blocks_per_group, used_bits);
	write_group_desc(&disk, blocks_per_group, used_bits);
	write_block_bitmap(&disk, used_bits);
	write_inode_bitmap(&disk);
	write_root_inode(&disk, root_data_block);
	write_root_dir(&disk, root_data_block);

	disk
}

fn write_mbr(disk: &MemDisk, total_blocks: u32) {
	let mut sector = [0u8; BLOCK_SIZE];
	let sector_count = total_blocks * crate::config::SECTORS_PER_BLOCK;
	sector[0x1be + 8..0x1be + 12].copy_from_slice(&0u32.to_le_bytes());
	sector[0x1be + 12..0x1be + 16].copy_from_slice(&sector_count.to_le_bytes());
	sector[510] = 0x55;
	sector[511] = 0xaa;
	disk.write_block(BOOT_BLOCK, &sector).unwrap();
}

fn write_superblock(disk: &MemDisk, total_blocks: u32, blocks_per_group: u32, used_blocks: u32) {
	let sb = Superblock {
		inodes_count: INODES_PER_GROUP,
		blocks_count: total_blocks,
		r_blocks_count: 0,
		free_blocks_count: total_blocks - used_blocks,
		// Inode 1 is conventionally reserved (bad-blocks); the root directory is inode 2.
		free_inodes_count: INODES_PER_GROUP - 2,
		first_data_block: 1,
		log_block_size: 0,
		log_frag_size: 0,
		blocks_per_group,
		frags_per_group: blocks_per_group,
		inodes_per_group: INODES_PER_GROUP,
		mtime: 0,
		wtime: 0,
		mnt_count: 0,
		max_mnt_count: 0,
		magic: EXT2_MAGIC,
		state: 1,
		errors: 1,
		minor_rev_level: 0,
		lastcheck: 0,
		checkinterval: 0,
		creator_os: 0,
		rev_level: 1,
		def_resuid: 0,
		def_resgid: 0,
		first_ino: 11,
		inode_size: INODE_SIZE,
		block_group_nr: 0,
		feature_compat: 0,
		feature_incompat: 0,
		feature_ro_compat: 0,
		uuid: [0; 16],
		volume_name: [0; 16],
		last_mounted: [0; 64],
		algo_bitmap: 0,
		_reserved: [0; 820],
	};
	let mut buf = [0u8; BLOCK_SIZE];
	buf.copy_from_slice(bytes::as_bytes(&sb));
	disk.write_block(SUPERBLOCK_BLOCK, &buf).unwrap();
}

fn write_group_desc(disk: &MemDisk, blocks_per_group: u32, used_blocks: u32) {
	let bgd = BlockGroupDescriptor {
		block_bitmap: BLOCK_BITMAP_BLOCK,
		inode_bitmap: INODE_BITMAP_BLOCK,
		inode_table: INODE_TABLE_BLOCK,
		free_blocks_count: (blocks_per_group - used_blocks) as u16,
		free_inodes_count: (INODES_PER_GROUP - 2) as u16,
		used_dirs_count: 1,
		_padding: [0; 14],
	};
	let mut buf = [0u8; BLOCK_SIZE];
	buf[..core::mem::size_of::<BlockGroupDescriptor>()].copy_from_slice(bytes::as_bytes(&bgd));
	disk.write_block(BGDT_BLOCK, &buf).unwrap();
}

/// Marks every block up to `used_blocks` (boot block through the root directory's data block)
/// as allocated, MSB-first within each byte, matching [`crate::ext2::Ext2Fs`]'s own bitmap
/// convention.
fn write_block_bitmap(disk: &MemDisk, used_blocks: u32) {
	let mut buf = [0u8; BLOCK_SIZE];
	for bit in 0..used_blocks.min((BLOCK_SIZE * 8) as u32) {
		buf[(bit / 8) as usize] |= 1 << (bit % 8);
	}
	disk.write_block(BLOCK_BITMAP_BLOCK, &buf).unwrap();
}

/// Marks inodes 1 (reserved) and 2 (root) allocated; everything else stays free.
fn write_inode_bitmap(disk: &MemDisk) {
	let mut buf = [0u8; BLOCK_SIZE];
	buf[0] = 0b0000_0011;
	disk.write_block(INODE_BITMAP_BLOCK, &buf).unwrap();
}

fn write_root_inode(disk: &MemDisk, root_data_block: u32) {
	let mut block = [0u32; NDIRECT + 3];
	block[0] = root_data_block;
	let inode = Inode {
		mode: FileType::Directory.mode_bits(),
		uid: 0,
		size_lo: BLOCK_SIZE as u32,
		atime: 0,
		ctime: 0,
		mtime: 0,
		dtime: 0,
		gid: 0,
		links_count: 2,
		blocks: crate::config::SECTORS_PER_BLOCK,
		flags: 0,
		osd1: 0,
		block,
		generation: 0,
		file_acl: 0,
		dir_acl: 0,
		faddr: 0,
		osd2: [0; 12],
	};
	// Inode 2 (root) is the first entry of the inode table, immediately after the reserved
	// inode 1's slot.
	let offset = INODE_SIZE as usize;
	let mut buf = [0u8; BLOCK_SIZE];
	buf[offset..offset + core::mem::size_of::<Inode>()].copy_from_slice(bytes::as_bytes(&inode));
	disk.write_block(INODE_TABLE_BLOCK, &buf).unwrap();
}

fn write_root_dir(disk: &MemDisk, root_data_block: u32) {
	let mut buf = [0u8; BLOCK_SIZE];
	let dot_len = record_len(1);
	let dotdot_len = (BLOCK_SIZE - dot_len as usize) as u16;
	let dot = DirEntryHeader {
		inode: crate::config::ROOT_INODE,
		rec_len: dot_len,
		name_len: 1,
		file_type: FT_UNKNOWN,
	};
	dot.write_to(&mut buf);
	buf[HEADER_SIZE] = b'.';
	let dotdot_off = dot_len as usize;
	let dotdot = DirEntryHeader {
		inode: crate::config::ROOT_INODE,
		rec_len: dotdot_len,
		name_len: 2,
		file_type: FT_UNKNOWN,
	};
	dotdot.write_to(&mut buf[dotdot_off..]);
	buf[dotdot_off + HEADER_SIZE] = b'.';
	buf[dotdot_off + HEADER_SIZE + 1] = b'.';
	disk.write_block(root_data_block, &buf).unwrap();
}
