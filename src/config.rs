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

//! Compile-time tunables for the filesystem core.
//!
//! The reference kernel bakes equivalent limits in through a build-time TOML config
//! (`build_cfg!`); here they are plain `const`s, documented the same way `utils::limits`
//! documents its own limits, since this crate has no build script of its own.

/// Size in bytes of a filesystem block and of a block cache buffer.
///
/// Fixed at 1024 for this ext2 driver, matching the reference on-disk layout; the superblock's
/// `log_block_size` field is not consulted to compute a different size.
pub const BLOCK_SIZE: usize = 1024;

/// Number of buffers held by the block cache.
pub const NBUF: usize = 30;

/// Number of slots in the in-memory inode cache.
pub const NINODE: usize = 50;

/// Number of slots in the global open-file table.
pub const NFILE: usize = 100;

/// Number of file descriptors in a single process's table.
pub const NOFILE: usize = 16;

/// Number of 32-bit block pointers directly stored in an on-disk inode.
pub const NDIRECT: usize = 12;

/// Number of block-pointer entries in one indirect block (`BLOCK_SIZE / size_of::<u32>()`).
pub const ENTRIES_PER_INDIRECT: usize = BLOCK_SIZE / 4;

/// Total number of on-disk address slots carried by an inode (12 direct + single + double +
/// triple indirect).
pub const NADDR: usize = NDIRECT + 3;

/// Maximum number of blocks addressable by a single file.
pub const MAXFILEBLOCKS: usize = NDIRECT
	+ ENTRIES_PER_INDIRECT
	+ ENTRIES_PER_INDIRECT * ENTRIES_PER_INDIRECT
	+ ENTRIES_PER_INDIRECT * ENTRIES_PER_INDIRECT * ENTRIES_PER_INDIRECT;

/// Maximum size in bytes of a single file.
pub const MAXFILESIZE: u64 = (MAXFILEBLOCKS as u64) * (BLOCK_SIZE as u64);

/// Number of 512-byte sectors per filesystem block.
pub const SECTORS_PER_BLOCK: u32 = (BLOCK_SIZE / 512) as u32;

/// Path of the device table consulted to seed the device switch on first open.
pub const DEVTAB_PATH: &str = "/etc/devtab";

/// Upper bound, in bytes, used to chunk `filewrite` so that a single logical write stays within
/// a bounded amount of per-operation work, mirroring the reference's `MAXOPBLOCKS`-derived cap
/// even though this crate carries no write-ahead log.
pub const MAX_WRITE_CHUNK: usize = ((MAXOPBLOCKS - 1 - 1 - 2) / 2) * 512;

/// Reference budget figure the write-chunk cap above is derived from.
const MAXOPBLOCKS: usize = 10;

/// ext2 root directory inode number.
pub const ROOT_INODE: u32 = 2;
