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

//! The in-memory inode cache (§4.3): interns [`InodeRef`] handles over a fixed-size table and
//! mediates concurrent access through a leaf spinlock (membership/refcount) plus one sleep lock
//! per slot (everything else).
//!
//! Grounded on [`crate::ext2`], which owns the table this module's `impl` block operates on —
//! together they are the two faces of one type, `Ext2Fs`, exactly as §9 describes the reference
//! kernel's inode operations vtable collapsing onto a single filesystem kind here.

use crate::{
	block::{BlockDevice, DeviceId},
	config::NADDR,
	error,
	ext2::{Ext2Fs, InodeGuard, InodeMeta, InodeRef, inode_disk::FileType},
};
use utils::errno::EResult;

impl<D: BlockDevice> Ext2Fs<D> {
	/// `iget(dev, inum)`: finds or interns an unlocked, referenced handle for `(dev, inum)`.
	///
	/// Never touches disk and never blocks on a sleep lock; only the icache spinlock is taken,
	/// held only for the duration of the table scan (§4.3, §5 lock-acquisition order 1: the
	/// icache lock is a leaf with respect to inode sleep locks).
	pub fn iget(&self, dev: DeviceId, inum: u32) -> InodeRef {
		let mut meta = self.inode_meta.lock();
		if let Some(index) = meta
			.iter()
			.position(|m| m.refcount > 0 && m.dev == dev && m.inum == inum)
		{
			meta[index].refcount += 1;
			return InodeRef { dev, inum, index };
		}
		match meta.iter().position(|m| m.refcount == 0) {
			Some(index) => {
				meta[index] = InodeMeta {
					dev,
					inum,
					refcount: 1,
				};
				InodeRef { dev, inum, index }
			}
			None => {
				error!("icache: no free slot for (dev={dev:?}, inum={inum})");
				panic!("icache exhausted");
			}
		}
	}

	/// `idup(inode)`: bumps the refcount of an already-held handle and returns it back to the
	/// caller (mirroring the reference kernel's `idup`, which returns the same pointer it was
	/// given).
	pub fn idup(&self, r: InodeRef) -> InodeRef {
		self.inode_meta.lock()[r.index].refcount += 1;
		r
	}

	/// `ilock(inode)`: acquires the per-slot sleep lock and, the first time since the slot was
	/// populated, faults the inode's type/link-count/size/addrs in from disk.
	///
	/// Panics if the on-disk type is zero (§4.3: "uninitialized inode in an allocated slot" is
	/// corruption, not a recoverable error).
	pub fn ilock(&self, r: InodeRef) -> EResult<InodeGuard<'_, D>> {
		let state = self.inode_state[r.index].lock();
		let mut guard = InodeGuard {
			fs: self,
			r,
			state,
		};
		if !guard.state.valid {
			let disk = self.read_inode_disk(r.inum)?;
			if disk.mode == 0 {
				error!("icache: inode {} has a zero type in an allocated slot", r.inum);
				panic!("uninitialized inode");
			}
			guard.state.file_type = disk.file_type();
			guard.state.links_count = disk.links_count;
			guard.state.size = disk.size();
			guard.state.addrs = disk.block;
			guard.state.valid = true;
		}
		Ok(guard)
	}

	/// `iput(inode)`: drops one reference to `r`, whose sleep lock must currently be free.
	///
	/// If this is the last reference to a zero-link inode, its blocks and bitmap bit are freed
	/// before the slot is released back to the table (§3: "link count == 0 and refcount drops
	/// from 1 to 0 ⇒ the inode's blocks and bitmap bit are freed before the slot is reused").
	pub fn iput(&self, r: InodeRef) -> EResult<()> {
		let state = self.inode_state[r.index].lock();
		let mut guard = InodeGuard {
			fs: self,
			r,
			state,
		};
		if guard.state.valid && guard.state.links_count == 0 {
			let refcount = self.inode_meta.lock()[r.index].refcount;
			if refcount == 1 {
				self.itrunc(&mut guard)?;
				guard.state.file_type = FileType::Other;
				self.iupdate(&guard)?;
				self.ifree(r.inum)?;
				guard.state.valid = false;
				guard.state.addrs = [0; NADDR];
			}
		}
		drop(guard);
		let mut meta = self.inode_meta.lock();
		meta[r.index].refcount -= 1;
		if meta[r.index].refcount == 0 {
			meta[r.index] = InodeMeta::unused();
		}
		Ok(())
	}

	/// `iunlockput`: releases the sleep lock on a locked inode, then [`Self::iput`]s it.
	pub fn iunlockput(&self, guard: InodeGuard<'_, D>) -> EResult<()> {
		let r = guard.r;
		guard.unlock();
		self.iput(r)
	}
}

#[cfg(test)]
mod tests {
	use crate::{
		config::ROOT_INODE,
		ext2::{DEV, Ext2Fs, inode_disk::FileType},
		testing::build_basic_image,
	};

	#[test]
	fn iget_dedups_same_dev_and_inum() {
		let fs = Ext2Fs::mount(build_basic_image(64)).unwrap();
		let a = fs.iget(DEV, ROOT_INODE);
		let b = fs.iget(DEV, ROOT_INODE);
		assert_eq!(a.index, b.index);
		assert_eq!(fs.inode_meta.lock()[a.index].refcount, 2);
		fs.iput(a).unwrap();
		fs.iput(b).unwrap();
	}

	#[test]
	fn ilock_faults_in_root_directory_on_first_use() {
		let fs = Ext2Fs::mount(build_basic_image(64)).unwrap();
		let r = fs.iget(DEV, ROOT_INODE);
		let guard = fs.ilock(r).unwrap();
		assert_eq!(guard.file_type(), FileType::Directory);
		assert_eq!(guard.links_count(), 2);
		guard.unlock();
		fs.iput(r).unwrap();
	}

	#[test]
	fn iput_frees_blocks_and_slot_when_last_ref_drops_a_zero_link_inode() {
		let fs = Ext2Fs::mount(build_basic_image(64)).unwrap();
		let r = fs.ialloc(FileType::Regular).unwrap();
		{
			let mut guard = fs.ilock(r).unwrap();
			fs.writei(&mut guard, b"hello", 0).unwrap();
			guard.set_links_count(0);
			guard.unlock();
		}
		let sb_before = fs.superblock();
		fs.iput(r).unwrap();
		let sb_after = fs.superblock();
		assert!(sb_after.free_blocks_count > sb_before.free_blocks_count);
		assert_eq!(fs.inode_meta.lock()[r.index].refcount, 0);
	}
}
