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

//! The ext2 on-disk layout driver (§4.2): superblock, block groups, bitmaps, the four-level
//! block map, and directory records.
//!
//! This module and [`crate::icache`] together implement the two divergent concerns the
//! specification assigns to one component in the reference kernel: this module is the on-disk
//! format logic, `icache` is the in-memory interning/locking layer built on top of it. Both are
//! `impl` blocks on the same [`Ext2Fs`] type, since a single ext2 filesystem is the only kind
//! this crate ever mounts (§9: "this crate dispatches statically").

pub mod dirent;
pub mod group_desc;
pub mod inode_disk;
pub mod superblock;

use crate::{
	block::{BlockDevice, DeviceId, cache::BlockCache},
	config::{BLOCK_SIZE, ENTRIES_PER_INDIRECT, MAXFILESIZE, NDIRECT, NINODE},
	error,
	mbr::Mbr,
	sync::spin::Spin,
};
use dirent::{DirEntryHeader, FT_UNKNOWN, HEADER_SIZE, record_len};
use group_desc::BlockGroupDescriptor;
use inode_disk::{FileType, Inode};
use superblock::Superblock;
use utils::{
	bytes,
	errno::{EResult, Errno},
	limits::NAME_MAX,
};

/// This driver only ever mounts one device at a time; everything it caches is keyed with this
/// constant identity (§8 property 1 still holds: no two buffers ever share `(dev, blockno)`,
/// they just all share the same `dev`).
pub(crate) const DEV: DeviceId = DeviceId(0);

/// Byte offset, within the partition, of the group descriptor table (partition-relative block
/// 2, per §4.2).
const BGDT_BLOCK: u32 = 2;

/// In-memory, cache-lock-protected bookkeeping for one in-memory inode slot (§4.3).
pub(crate) struct InodeMeta {
	pub dev: DeviceId,
	pub inum: u32,
	pub refcount: u32,
}

impl InodeMeta {
	pub(crate) const fn unused() -> Self {
		Self {
			dev: DeviceId(0),
			inum: 0,
			refcount: 0,
		}
	}
}

/// Sleep-lock-protected in-memory inode fields: everything except refcount, device and inode
/// number (§3: "sleep lock protects every field except refcount, device, inum").
pub struct InodeState {
	pub valid: bool,
	pub file_type: FileType,
	pub links_count: u16,
	pub size: u64,
	pub addrs: [u32; crate::config::NADDR],
}

impl InodeState {
	const fn unused() -> Self {
		Self {
			valid: false,
			file_type: FileType::Other,
			links_count: 0,
			size: 0,
			addrs: [0; crate::config::NADDR],
		}
	}
}

/// An unlocked, referenced handle to an in-memory inode, as returned by [`Ext2Fs::iget`].
///
/// Mirrors the reference kernel's bare `struct inode *`: holding one keeps the slot from being
/// reused, but does not grant access to its fields (call [`Ext2Fs::ilock`] for that).
#[derive(Clone, Copy)]
pub struct InodeRef {
	pub dev: DeviceId,
	pub inum: u32,
	pub(crate) index: usize,
}

/// A locked, valid in-memory inode, as returned by [`Ext2Fs::ilock`].
pub struct InodeGuard<'f, D: BlockDevice> {
	pub(crate) fs: &'f Ext2Fs<D>,
	pub(crate) r: InodeRef,
	pub(crate) state: crate::sync::sleep_lock::SleepLockGuard<'f, InodeState>,
}

impl<D: BlockDevice> InodeGuard<'_, D> {
	pub fn inum(&self) -> u32 {
		self.r.inum
	}

	pub fn file_type(&self) -> FileType {
		self.state.file_type
	}

	pub fn links_count(&self) -> u16 {
		self.state.links_count
	}

	pub fn set_links_count(&mut self, n: u16) {
		self.state.links_count = n;
	}

	pub fn size(&self) -> u64 {
		self.state.size
	}

	/// `iunlock`: releases the sleep lock. Equivalent to dropping the guard; named to match
	/// the specification's vocabulary.
	pub fn unlock(self) {}
}

/// The mounted ext2 filesystem (§4.2, §4.3): the block cache, the cached superblock, and the
/// in-memory inode table, all owned by one value rather than scattered across module-level
/// statics (§9: "a clean implementation makes these fields of a single `Filesystem` value").
pub struct Ext2Fs<D: BlockDevice> {
	pub cache: BlockCache<D>,
	pub partition_start: u32,
	pub(crate) superblock: Spin<Superblock, false>,
	pub(crate) inode_meta: Spin<[InodeMeta; NINODE], false>,
	pub(crate) inode_state: [crate::sync::sleep_lock::SleepLock<InodeState>; NINODE],
}

impl<D: BlockDevice> Ext2Fs<D> {
	/// Mounts the ext2 filesystem found in the first MBR partition of `device`.
	pub fn mount(device: D) -> EResult<Self> {
		let mbr = Mbr::read(&device)?;
		let partition_start = mbr.partition_start();
		let cache = BlockCache::new(device);
		let superblock = {
			let buf = cache.read(DEV, partition_start + 1)?;
			let sb = bytes::from_bytes::<Superblock>(&buf[..]).ok_or(Errno::EUCLEAN)?;
			*sb
		};
		if !superblock.validate() {
			return Err(Errno::EUCLEAN);
		}
		Ok(Self {
			cache,
			partition_start,
			superblock: Spin::new(superblock),
			inode_meta: Spin::new(core::array::from_fn(|_| InodeMeta::unused())),
			inode_state: core::array::from_fn(|_| {
				crate::sync::sleep_lock::SleepLock::new(InodeState::unused())
			}),
		})
	}

	/// A copy of the cached superblock.
	pub fn superblock(&self) -> Superblock {
		*self.superblock.lock()
	}

	// ---- group descriptor table ----

	fn group_desc(&self, group: u32) -> EResult<BlockGroupDescriptor> {
		let per_block = BLOCK_SIZE / core::mem::size_of::<BlockGroupDescriptor>();
		let blk = BGDT_BLOCK + (group as usize / per_block) as u32;
		let buf = self.cache.read(DEV, self.partition_start + blk)?;
		let idx = group as usize % per_block;
		let off = idx * core::mem::size_of::<BlockGroupDescriptor>();
		bytes::from_bytes::<BlockGroupDescriptor>(&buf[off..])
			.copied()
			.ok_or(Errno::EUCLEAN)
	}

	fn write_group_desc(&self, group: u32, bgd: &BlockGroupDescriptor) -> EResult<()> {
		let per_block = BLOCK_SIZE / core::mem::size_of::<BlockGroupDescriptor>();
		let blk = BGDT_BLOCK + (group as usize / per_block) as u32;
		let mut buf = self.cache.read(DEV, self.partition_start + blk)?;
		let idx = group as usize % per_block;
		let off = idx * core::mem::size_of::<BlockGroupDescriptor>();
		buf[off..off + core::mem::size_of::<BlockGroupDescriptor>()]
			.copy_from_slice(bytes::as_bytes(bgd));
		buf.write()
	}

	// ---- bitmaps ----

	/// Scans `bitmap_block` MSB-first within each byte for the first clear bit among the first
	/// `limit` bits, sets it, and returns its index. Returns `None` if none is free.
	fn bitmap_find_and_set(&self, bitmap_block: u32, limit: usize) -> EResult<Option<u32>> {
		let mut buf = self.cache.read(DEV, bitmap_block)?;
		for byte_idx in 0..BLOCK_SIZE {
			if byte_idx * 8 >= limit {
				break;
			}
			if buf[byte_idx] == 0xff {
				continue;
			}
			for shift in 0..8 {
				let bit_index = byte_idx * 8 + shift;
				if bit_index >= limit {
					break;
				}
				let mask = 1u8 << (7 - shift);
				if buf[byte_idx] & mask == 0 {
					buf[byte_idx] |= mask;
					buf.write()?;
					return Ok(Some(bit_index as u32));
				}
			}
		}
		Ok(None)
	}

	/// Clears bit `index` of `bitmap_block`. Panics if it was already clear (§7: "freeing an
	/// already-free block" is a corruption / invariant violation, fatal).
	fn bitmap_clear(&self, bitmap_block: u32, index: u32) -> EResult<()> {
		let mut buf = self.cache.read(DEV, bitmap_block)?;
		let byte_idx = (index / 8) as usize;
		let shift = index % 8;
		let mask = 1u8 << (7 - shift);
		if buf[byte_idx] & mask == 0 {
			error!("ext2: double free of bitmap bit {index} in block {bitmap_block}");
			panic!("block already free");
		}
		buf[byte_idx] &= !mask;
		buf.write()
	}

	// ---- block allocation ----

	/// `balloc(dev, inum_hint)`: allocates a block from the group containing `inum_hint`'s
	/// inode. Panics if that group has no free block (§4.2, §9: the simple policy does not
	/// roll over to other groups).
	pub fn balloc(&self, inum_hint: u32) -> EResult<u32> {
		let sb = self.superblock();
		let group = (inum_hint - 1) / sb.inodes_per_group;
		let bgd = self.group_desc(group)?;
		let group_first_block = sb.first_data_block + group * sb.blocks_per_group;
		let limit = sb
			.blocks_count
			.saturating_sub(group_first_block)
			.min(sb.blocks_per_group) as usize;
		let bitmap_block = self.partition_start + bgd.block_bitmap();
		match self.bitmap_find_and_set(bitmap_block, limit)? {
			Some(idx) => {
				let blockno = group_first_block + idx;
				let zero = [0u8; BLOCK_SIZE];
				self.cache
					.device()
					.write_block(self.partition_start + blockno, &zero)?;
				let mut sb = self.superblock.lock();
				sb.free_blocks_count -= 1;
				let mut bgd = bgd;
				bgd.free_blocks_count -= 1;
				self.write_group_desc(group, &bgd)?;
				Ok(blockno)
			}
			None => {
				error!("ext2: group {group} has no free block");
				panic!("balloc: group exhausted");
			}
		}
	}

	/// `bfree(dev, relative_block)`: frees a block previously returned by [`Self::balloc`].
	pub fn bfree(&self, relative_block: u32) -> EResult<()> {
		let sb = self.superblock();
		let rel = relative_block - sb.first_data_block;
		let group = rel / sb.blocks_per_group;
		let idx = rel % sb.blocks_per_group;
		let bgd = self.group_desc(group)?;
		self.bitmap_clear(self.partition_start + bgd.block_bitmap(), idx)?;
		let mut sbw = self.superblock.lock();
		sbw.free_blocks_count += 1;
		let mut bgd = bgd;
		bgd.free_blocks_count += 1;
		self.write_group_desc(group, &bgd)
	}

	// ---- inode allocation ----

	fn inode_location(&self, inum: u32) -> EResult<(u32, usize)> {
		let sb = self.superblock();
		let group = (inum - 1) / sb.inodes_per_group;
		let index_in_group = (inum - 1) % sb.inodes_per_group;
		let bgd = self.group_desc(group)?;
		let inode_size = sb.inode_size() as usize;
		let inodes_per_block = BLOCK_SIZE / inode_size;
		let block = bgd.inode_table() + (index_in_group as usize / inodes_per_block) as u32;
		let offset = (index_in_group as usize % inodes_per_block) * inode_size;
		Ok((block, offset))
	}

	pub(crate) fn read_inode_disk(&self, inum: u32) -> EResult<Inode> {
		let (block, offset) = self.inode_location(inum)?;
		let buf = self.cache.read(DEV, self.partition_start + block)?;
		bytes::from_bytes::<Inode>(&buf[offset..])
			.copied()
			.ok_or(Errno::EUCLEAN)
	}

	fn write_inode_disk(&self, inum: u32, disk: &Inode) -> EResult<()> {
		let (block, offset) = self.inode_location(inum)?;
		let mut buf = self.cache.read(DEV, self.partition_start + block)?;
		buf[offset..offset + core::mem::size_of::<Inode>()].copy_from_slice(bytes::as_bytes(disk));
		buf.write()
	}

	/// `ialloc(dev, type)`: finds the first free inode across all groups (in order), zeroes it
	/// on disk with the given type, and returns a referenced in-memory handle via `iget`.
	pub fn ialloc(&self, file_type: FileType) -> EResult<InodeRef> {
		let sb = self.superblock();
		for group in 0..sb.groups_count() {
			let bgd = self.group_desc(group)?;
			let bitmap_block = self.partition_start + bgd.inode_bitmap();
			if let Some(idx) = self.bitmap_find_and_set(bitmap_block, sb.inodes_per_group as usize)? {
				let inum = group * sb.inodes_per_group + idx + 1;
				let mut disk = Inode::zeroed();
				disk.mode = file_type.mode_bits();
				self.write_inode_disk(inum, &disk)?;
				let mut sbw = self.superblock.lock();
				sbw.free_inodes_count -= 1;
				let mut bgd = bgd;
				bgd.free_inodes_count -= 1;
				self.write_group_desc(group, &bgd)?;
				return Ok(self.iget(DEV, inum));
			}
		}
		Err(Errno::ENOSPC)
	}

	/// Frees inode `inum`'s bitmap bit (the inode-table counterpart of [`Self::bfree`]).
	pub(crate) fn ifree(&self, inum: u32) -> EResult<()> {
		let sb = self.superblock();
		let group = (inum - 1) / sb.inodes_per_group;
		let idx = (inum - 1) % sb.inodes_per_group;
		let bgd = self.group_desc(group)?;
		self.bitmap_clear(self.partition_start + bgd.inode_bitmap(), idx)?;
		let mut sbw = self.superblock.lock();
		sbw.free_inodes_count += 1;
		let mut bgd = bgd;
		bgd.free_inodes_count += 1;
		self.write_group_desc(group, &bgd)
	}

	/// `iupdate(inode)`: writes the in-memory fields (type, link count, size, addrs) back to
	/// the on-disk inode. Timestamps and ownership are zeroed (§1 non-goal).
	pub fn iupdate(&self, inode: &InodeGuard<'_, D>) -> EResult<()> {
		let disk = Inode {
			mode: inode.state.file_type.mode_bits(),
			links_count: inode.state.links_count,
			size_lo: inode.state.size as u32,
			block: inode.state.addrs,
			..Inode::zeroed()
		};
		self.write_inode_disk(inode.r.inum, &disk)
	}

	// ---- block map ----

	fn bmap_leaf(&self, r: &InodeRef, slot: &mut u32, idx: usize) -> EResult<u32> {
		if *slot == 0 {
			*slot = self.balloc(r.inum)?;
		}
		let mut buf = self.cache.read(DEV, self.partition_start + *slot)?;
		let off = idx * 4;
		let mut entry = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
		if entry == 0 {
			entry = self.balloc(r.inum)?;
			buf[off..off + 4].copy_from_slice(&entry.to_le_bytes());
			buf.write()?;
		}
		Ok(entry)
	}

	fn bmap_double(&self, r: &InodeRef, slot: &mut u32, idx: usize) -> EResult<u32> {
		let first = idx / ENTRIES_PER_INDIRECT;
		let second = idx % ENTRIES_PER_INDIRECT;
		if *slot == 0 {
			*slot = self.balloc(r.inum)?;
		}
		let mut single = {
			let buf = self.cache.read(DEV, self.partition_start + *slot)?;
			let off = first * 4;
			u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
		};
		if single == 0 {
			single = self.balloc(r.inum)?;
			let mut buf = self.cache.read(DEV, self.partition_start + *slot)?;
			let off = first * 4;
			buf[off..off + 4].copy_from_slice(&single.to_le_bytes());
			buf.write()?;
		}
		self.bmap_leaf(r, &mut single, second)
	}

	fn bmap_triple(&self, r: &InodeRef, slot: &mut u32, idx: usize) -> EResult<u32> {
		let span = ENTRIES_PER_INDIRECT * ENTRIES_PER_INDIRECT;
		let first = idx / span;
		let rest = idx % span;
		if *slot == 0 {
			*slot = self.balloc(r.inum)?;
		}
		let mut dbl = {
			let buf = self.cache.read(DEV, self.partition_start + *slot)?;
			let off = first * 4;
			u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
		};
		if dbl == 0 {
			dbl = self.balloc(r.inum)?;
			let mut buf = self.cache.read(DEV, self.partition_start + *slot)?;
			let off = first * 4;
			buf[off..off + 4].copy_from_slice(&dbl.to_le_bytes());
			buf.write()?;
		}
		self.bmap_double(r, &mut dbl, rest)
	}

	/// `bmap(inode, n)`: resolves logical block `n` to a partition-relative block number,
	/// allocating as needed across the four addressing levels (§4.2).
	pub fn bmap(&self, inode: &mut InodeGuard<'_, D>, n: usize) -> EResult<u32> {
		let r = inode.r;
		if n < NDIRECT {
			if inode.state.addrs[n] == 0 {
				inode.state.addrs[n] = self.balloc(r.inum)?;
			}
			return Ok(inode.state.addrs[n]);
		}
		let n = n - NDIRECT;
		if n < ENTRIES_PER_INDIRECT {
			let mut slot = inode.state.addrs[NDIRECT];
			let blk = self.bmap_leaf(&r, &mut slot, n)?;
			inode.state.addrs[NDIRECT] = slot;
			return Ok(blk);
		}
		let n = n - ENTRIES_PER_INDIRECT;
		if n < ENTRIES_PER_INDIRECT * ENTRIES_PER_INDIRECT {
			let mut slot = inode.state.addrs[NDIRECT + 1];
			let blk = self.bmap_double(&r, &mut slot, n)?;
			inode.state.addrs[NDIRECT + 1] = slot;
			return Ok(blk);
		}
		let n = n - ENTRIES_PER_INDIRECT * ENTRIES_PER_INDIRECT;
		if n < ENTRIES_PER_INDIRECT * ENTRIES_PER_INDIRECT * ENTRIES_PER_INDIRECT {
			let mut slot = inode.state.addrs[NDIRECT + 2];
			let blk = self.bmap_triple(&r, &mut slot, n)?;
			inode.state.addrs[NDIRECT + 2] = slot;
			return Ok(blk);
		}
		error!("ext2: bmap index {n} exceeds the triple-indirect range");
		panic!("file too large");
	}

	fn free_indirect(&self, block: u32, level: u32) -> EResult<()> {
		if level == 0 {
			return self.bfree(block);
		}
		let entries: [u32; ENTRIES_PER_INDIRECT] = {
			let buf = self.cache.read(DEV, self.partition_start + block)?;
			core::array::from_fn(|i| u32::from_le_bytes(buf[i * 4..i * 4 + 4].try_into().unwrap()))
		};
		for e in entries {
			if e != 0 {
				self.free_indirect(e, level - 1)?;
			}
		}
		self.bfree(block)
	}

	/// `itrunc`: frees every block owned by `inode` (direct and all three indirection levels),
	/// sets size to 0, and writes the inode back.
	pub fn itrunc(&self, inode: &mut InodeGuard<'_, D>) -> EResult<()> {
		for i in 0..NDIRECT {
			if inode.state.addrs[i] != 0 {
				self.bfree(inode.state.addrs[i])?;
				inode.state.addrs[i] = 0;
			}
		}
		for (level, slot) in [1u32, 2, 3].into_iter().zip(NDIRECT..NDIRECT + 3) {
			if inode.state.addrs[slot] != 0 {
				self.free_indirect(inode.state.addrs[slot], level)?;
				inode.state.addrs[slot] = 0;
			}
		}
		inode.state.size = 0;
		self.iupdate(inode)
	}

	// ---- read / write ----

	/// `readi(inode, dst, off)`: clamps to the inode's size and reads across block boundaries.
	pub fn readi(&self, inode: &mut InodeGuard<'_, D>, dst: &mut [u8], off: u64) -> EResult<usize> {
		let size = inode.state.size;
		if off > size {
			return Err(Errno::EINVAL);
		}
		if off.checked_add(dst.len() as u64).is_none() {
			return Err(Errno::EOVERFLOW);
		}
		let n = (dst.len() as u64).min(size - off) as usize;
		let mut done = 0;
		let mut cur = off;
		while done < n {
			let block_idx = (cur / BLOCK_SIZE as u64) as usize;
			let block_off = (cur % BLOCK_SIZE as u64) as usize;
			let blockno = self.bmap(inode, block_idx)?;
			let buf = self.cache.read(DEV, self.partition_start + blockno)?;
			let chunk = (n - done).min(BLOCK_SIZE - block_off);
			dst[done..done + chunk].copy_from_slice(&buf[block_off..block_off + chunk]);
			done += chunk;
			cur += chunk as u64;
		}
		Ok(done)
	}

	/// `writei(inode, src, off)`: writes across block boundaries, extending `size` (and
	/// persisting it via `iupdate`) only if the write moves the end-of-file forward.
	pub fn writei(&self, inode: &mut InodeGuard<'_, D>, src: &[u8], off: u64) -> EResult<usize> {
		let end = off
			.checked_add(src.len() as u64)
			.ok_or(Errno::EOVERFLOW)?;
		if end > MAXFILESIZE {
			return Err(Errno::EINVAL);
		}
		let prior_size = inode.state.size;
		let mut done = 0;
		let mut cur = off;
		while done < src.len() {
			let block_idx = (cur / BLOCK_SIZE as u64) as usize;
			let block_off = (cur % BLOCK_SIZE as u64) as usize;
			let blockno = self.bmap(inode, block_idx)?;
			let mut buf = self.cache.read(DEV, self.partition_start + blockno)?;
			let chunk = (src.len() - done).min(BLOCK_SIZE - block_off);
			buf[block_off..block_off + chunk].copy_from_slice(&src[done..done + chunk]);
			buf.write()?;
			done += chunk;
			cur += chunk as u64;
		}
		if cur > prior_size {
			inode.state.size = cur;
			self.iupdate(inode)?;
		}
		Ok(done)
	}

	// ---- directories ----

	/// `dirlookup(dp, name)`: linear scan of `dp`'s directory records. Returns the matching
	/// child (referenced, unlocked, via `iget`) and the byte offset of its record.
	pub fn dirlookup(
		&self,
		dp: &mut InodeGuard<'_, D>,
		name: &[u8],
	) -> EResult<Option<(InodeRef, u64)>> {
		if dp.state.file_type != FileType::Directory {
			return Err(Errno::ENOTDIR);
		}
		let dev = dp.r.dev;
		let size = dp.state.size;
		let mut off = 0u64;
		while off < size {
			let mut header_buf = [0u8; HEADER_SIZE];
			let got = self.readi(dp, &mut header_buf, off)?;
			if got < HEADER_SIZE {
				break;
			}
			let header = DirEntryHeader::from_bytes(&header_buf);
			let rec_len = header.rec_len;
			if (rec_len as usize) < HEADER_SIZE || rec_len as usize > BLOCK_SIZE {
				error!("ext2: directory record length {rec_len} at offset {off} is out of range");
				panic!("corrupt directory entry");
			}
			let name_len = header.name_len as usize;
			if header.inode != 0 && name_len > 0 {
				let mut name_buf = [0u8; NAME_MAX];
				let to_read = name_len.min(NAME_MAX);
				self.readi(dp, &mut name_buf[..to_read], off + HEADER_SIZE as u64)?;
				let bound = name.len().min(NAME_MAX);
				if to_read == bound && &name_buf[..to_read] == &name[..bound] {
					return Ok(Some((self.iget(dev, header.inode), off)));
				}
			}
			off += rec_len as u64;
		}
		Ok(None)
	}

	/// `dirlink(dp, name, inum)`: appends a new directory record at `dp`'s current size. Fails
	/// if `name` already exists in `dp`.
	pub fn dirlink(&self, dp: &mut InodeGuard<'_, D>, name: &[u8], inum: u32) -> EResult<()> {
		if name.len() > NAME_MAX {
			return Err(Errno::ENAMETOOLONG);
		}
		if let Some((existing, _)) = self.dirlookup(dp, name)? {
			self.iput(existing)?;
			return Err(Errno::EEXIST);
		}
		let rec_len = record_len(name.len());
		let header = DirEntryHeader {
			inode: inum,
			rec_len,
			name_len: name.len() as u8,
			file_type: FT_UNKNOWN,
		};
		let mut record = [0u8; BLOCK_SIZE];
		header.write_to(&mut record);
		record[HEADER_SIZE..HEADER_SIZE + name.len()].copy_from_slice(name);
		let off = dp.state.size;
		self.writei(dp, &record[..rec_len as usize], off)?;
		Ok(())
	}

	/// `dirunlink(dp, off)`: clears the `inode` field of the record at `off`, the ext2 way of
	/// deleting a directory entry (§9: "zeroes the inode field ... does not coalesce with the
	/// predecessor's `rec_len`" — the record's slot is left behind as a skipped hole rather than
	/// reclaimed).
	pub fn dirunlink(&self, dp: &mut InodeGuard<'_, D>, off: u64) -> EResult<()> {
		self.writei(dp, &0u32.to_le_bytes(), off)?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{config::ROOT_INODE, testing::build_basic_image};

	#[test]
	fn balloc_then_bfree_round_trips_free_count() {
		let fs = Ext2Fs::mount(build_basic_image(64)).unwrap();
		let before = fs.superblock().free_blocks_count;
		let blockno = fs.balloc(ROOT_INODE).unwrap();
		assert_eq!(fs.superblock().free_blocks_count, before - 1);
		fs.bfree(blockno).unwrap();
		assert_eq!(fs.superblock().free_blocks_count, before);
	}

	#[test]
	#[should_panic(expected = "block already free")]
	fn bfree_twice_panics() {
		let fs = Ext2Fs::mount(build_basic_image(64)).unwrap();
		let blockno = fs.balloc(ROOT_INODE).unwrap();
		fs.bfree(blockno).unwrap();
		fs.bfree(blockno).unwrap();
	}

	#[test]
	fn bmap_is_stable_across_repeated_calls() {
		let fs = Ext2Fs::mount(build_basic_image(64)).unwrap();
		let r = fs.ialloc(FileType::Regular).unwrap();
		let mut guard = fs.ilock(r).unwrap();
		let first = fs.bmap(&mut guard, 0).unwrap();
		let again = fs.bmap(&mut guard, 0).unwrap();
		assert_eq!(first, again);
		guard.unlock();
		fs.iput(r).unwrap();
	}

	#[test]
	fn bmap_allocates_an_indirect_block_past_ndirect() {
		let fs = Ext2Fs::mount(build_basic_image(1024)).unwrap();
		let r = fs.ialloc(FileType::Regular).unwrap();
		let mut guard = fs.ilock(r).unwrap();
		let blk = fs.bmap(&mut guard, NDIRECT).unwrap();
		assert_ne!(blk, 0);
		fs.iupdate(&guard).unwrap();
		let disk = fs.read_inode_disk(r.inum).unwrap();
		let addrs = disk.block;
		assert_ne!(addrs[NDIRECT], 0);
		guard.unlock();
		fs.iput(r).unwrap();
	}

	#[test]
	fn readi_writei_round_trip_across_a_block_boundary() {
		let fs = Ext2Fs::mount(build_basic_image(64)).unwrap();
		let r = fs.ialloc(FileType::Regular).unwrap();
		let mut guard = fs.ilock(r).unwrap();
		let mut data = [0u8; BLOCK_SIZE + 100];
		for (i, b) in data.iter_mut().enumerate() {
			*b = (i % 251) as u8;
		}
		let written = fs.writei(&mut guard, &data, 0).unwrap();
		assert_eq!(written, data.len());
		assert_eq!(guard.size(), data.len() as u64);
		let mut readback = [0u8; BLOCK_SIZE + 100];
		let read = fs.readi(&mut guard, &mut readback, 0).unwrap();
		assert_eq!(read, data.len());
		assert_eq!(&readback[..], &data[..]);
		guard.unlock();
		fs.iput(r).unwrap();
	}

	#[test]
	fn readi_clamps_to_size() {
		let fs = Ext2Fs::mount(build_basic_image(64)).unwrap();
		let r = fs.ialloc(FileType::Regular).unwrap();
		let mut guard = fs.ilock(r).unwrap();
		fs.writei(&mut guard, b"hello", 0).unwrap();
		let mut buf = [0u8; 16];
		assert_eq!(fs.readi(&mut guard, &mut buf, 5).unwrap(), 0);
		let n = fs.readi(&mut guard, &mut buf, 2).unwrap();
		assert_eq!(n, 3);
		assert_eq!(&buf[..3], b"llo");
		guard.unlock();
		fs.iput(r).unwrap();
	}

	#[test]
	fn writei_only_calls_iupdate_when_extending_past_eof() {
		let fs = Ext2Fs::mount(build_basic_image(64)).unwrap();
		let r = fs.ialloc(FileType::Regular).unwrap();
		let mut guard = fs.ilock(r).unwrap();
		fs.writei(&mut guard, b"hello world", 0).unwrap();
		assert_eq!(guard.size(), 11);
		// Overwriting entirely within the existing size must not move it.
		fs.writei(&mut guard, b"HELLO", 0).unwrap();
		assert_eq!(guard.size(), 11);
		guard.unlock();
		fs.iput(r).unwrap();
	}

	#[test]
	fn itrunc_frees_all_blocks_and_resets_size() {
		let fs = Ext2Fs::mount(build_basic_image(64)).unwrap();
		let r = fs.ialloc(FileType::Regular).unwrap();
		let mut guard = fs.ilock(r).unwrap();
		let data = [7u8; BLOCK_SIZE * 3];
		fs.writei(&mut guard, &data, 0).unwrap();
		let free_before = fs.superblock().free_blocks_count;
		fs.itrunc(&mut guard).unwrap();
		assert_eq!(guard.size(), 0);
		assert!(fs.superblock().free_blocks_count > free_before);
		guard.unlock();
		fs.iput(r).unwrap();
	}

	#[test]
	fn dirlink_then_dirlookup_round_trips() {
		let fs = Ext2Fs::mount(build_basic_image(64)).unwrap();
		let child = fs.ialloc(FileType::Regular).unwrap();
		let root_ref = fs.iget(DEV, ROOT_INODE);
		let mut root = fs.ilock(root_ref).unwrap();
		fs.dirlink(&mut root, b"afile", child.inum).unwrap();
		let found = fs.dirlookup(&mut root, b"afile").unwrap().unwrap();
		assert_eq!(found.0.inum, child.inum);
		fs.iput(found.0).unwrap();
		// Re-linking the same name must fail rather than create a duplicate record.
		assert!(matches!(fs.dirlink(&mut root, b"afile", child.inum), Err(Errno::EEXIST)));
		root.unlock();
		fs.iput(root_ref).unwrap();
		fs.iput(child).unwrap();
	}
}
