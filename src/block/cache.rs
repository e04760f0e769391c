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

//! The block cache itself (§4.1).
//!
//! Membership, refcounts and LRU ordering live behind one spinlock (the "cache lock"); the raw
//! payload of each slot lives behind its own [`SleepLock`] (the "buffer lock"). The cache lock is
//! never held across I/O or across a wait on a buffer's sleep lock, so the two never nest the
//! wrong way around (§5's lock-acquisition order).

use super::{BlockDevice, DeviceId};
use crate::{
	config::{BLOCK_SIZE, NBUF},
	error,
	sync::{
		sleep_lock::{SleepLock, SleepLockGuard},
		spin::Spin,
	},
};
use core::{
	array,
	ops::{Deref, DerefMut},
	sync::atomic::{AtomicU64, Ordering::Relaxed},
};
use utils::errno::EResult;

/// Cache-lock-protected bookkeeping for one slot. The payload bytes live in the matching
/// [`SleepLock`] in [`BlockCache::bufs`], not here.
struct Meta {
	/// Whether this slot currently holds a `(dev, blockno)` pair (as opposed to being untouched
	/// since cache creation — distinct from `valid`, which tracks whether the payload reflects
	/// disk).
	used: bool,
	dev: DeviceId,
	blockno: u32,
	/// Number of holders. The slot is a recycling candidate only when this is 0.
	refcount: u32,
	/// Whether the payload reflects the latest known disk contents.
	valid: bool,
	/// Whether the payload has outstanding writes. Buffers are written through synchronously
	/// (§4.1), so this is only ever transiently `true` for the duration of a `write` call.
	dirty: bool,
	/// LRU timestamp, bumped on release. Recycling picks the *smallest* tick among
	/// refcount-zero candidates: the least-recently used.
	tick: u64,
}

impl Meta {
	const fn unused() -> Self {
		Self {
			used: false,
			dev: DeviceId(0),
			blockno: 0,
			refcount: 0,
			valid: false,
			dirty: false,
			tick: 0,
		}
	}
}

/// The buffered block cache described in §4.1.
pub struct BlockCache<D: BlockDevice> {
	device: D,
	meta: Spin<[Meta; NBUF], false>,
	bufs: [SleepLock<[u8; BLOCK_SIZE]>; NBUF],
	next_tick: AtomicU64,
}

/// An unlocked reference to a cache slot, returned by [`BlockCache::get`].
///
/// Per §4.1, the caller must acquire the slot's sleep lock before touching its payload; in
/// practice callers use [`BlockCache::read`], which does both.
pub struct BufHandle {
	index: usize,
	dev: DeviceId,
	blockno: u32,
}

impl<D: BlockDevice> BlockCache<D> {
	/// Creates a cache of [`NBUF`] empty slots backed by `device`.
	pub fn new(device: D) -> Self {
		Self {
			device,
			meta: Spin::new(array::from_fn(|_| Meta::unused())),
			bufs: array::from_fn(|_| SleepLock::new([0u8; BLOCK_SIZE])),
			next_tick: AtomicU64::new(0),
		}
	}

	/// Returns the backing device.
	pub fn device(&self) -> &D {
		&self.device
	}

	/// `get(dev, blockno)`: finds or recycles a slot for `(dev, blockno)`, incrementing its
	/// refcount. Panics if no slot is available to recycle (§4.1, §7: a recycling miss is
	/// fatal).
	pub fn get(&self, dev: DeviceId, blockno: u32) -> BufHandle {
		let mut meta = self.meta.lock();
		if let Some(i) = meta
			.iter()
			.position(|m| m.used && m.dev == dev && m.blockno == blockno)
		{
			meta[i].refcount += 1;
			return BufHandle {
				index: i,
				dev,
				blockno,
			};
		}
		let candidate = meta
			.iter()
			.enumerate()
			.filter(|(_, m)| m.refcount == 0 && !m.dirty)
			.min_by_key(|(_, m)| m.tick)
			.map(|(i, _)| i);
		match candidate {
			Some(i) => {
				meta[i] = Meta {
					used: true,
					dev,
					blockno,
					refcount: 1,
					valid: false,
					dirty: false,
					tick: 0,
				};
				BufHandle {
					index: i,
					dev,
					blockno,
				}
			}
			None => {
				error!("block cache: no buffer to recycle for dev={dev:?} block={blockno}");
				panic!("block cache exhausted");
			}
		}
	}

	/// `read(dev, blockno)`: [`Self::get`], acquire the sleep lock, and fault in the payload
	/// from disk if it is not yet valid.
	pub fn read(&self, dev: DeviceId, blockno: u32) -> EResult<BufGuard<'_, D>> {
		let handle = self.get(dev, blockno);
		let guard = self.bufs[handle.index].lock();
		let mut buf = BufGuard {
			cache: self,
			handle: Some(handle),
			guard,
		};
		if !self.meta.lock()[buf.index()].valid {
			let mut tmp = [0u8; BLOCK_SIZE];
			self.device.read_block(blockno, &mut tmp)?;
			*buf.guard = tmp;
			self.meta.lock()[buf.index()].valid = true;
		}
		Ok(buf)
	}
}

/// A locked, valid buffer, returned by [`BlockCache::read`].
pub struct BufGuard<'c, D: BlockDevice> {
	cache: &'c BlockCache<D>,
	handle: Option<BufHandle>,
	guard: SleepLockGuard<'c, [u8; BLOCK_SIZE]>,
}

impl<'c, D: BlockDevice> BufGuard<'c, D> {
	fn index(&self) -> usize {
		self.handle.as_ref().unwrap().index
	}

	/// The block number this buffer was fetched for.
	pub fn blockno(&self) -> u32 {
		self.handle.as_ref().unwrap().blockno
	}

	/// `write(buffer)`: marks the buffer dirty, synchronously writes it through to disk, then
	/// clears dirty and sets valid. Requires the sleep lock be held, which it is by
	/// construction (this method only exists on an already-locked guard).
	pub fn write(&mut self) -> EResult<()> {
		let (index, blockno) = (self.index(), self.blockno());
		self.cache.meta.lock()[index].dirty = true;
		let res = self.cache.device.write_block(blockno, &self.guard);
		let mut meta = self.cache.meta.lock();
		meta[index].dirty = false;
		meta[index].valid = res.is_ok();
		res
	}

	/// `release(buffer)`: releases the sleep lock and, under the cache lock, decrements the
	/// refcount; if it drops to 0, the slot moves to the front of the LRU (is given the
	/// newest tick).
	///
	/// Equivalent to dropping the guard; provided under the name the specification uses.
	pub fn release(self) {}
}

impl<D: BlockDevice> Deref for BufGuard<'_, D> {
	type Target = [u8; BLOCK_SIZE];

	fn deref(&self) -> &Self::Target {
		&self.guard
	}
}

impl<D: BlockDevice> DerefMut for BufGuard<'_, D> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut self.guard
	}
}

impl<D: BlockDevice> Drop for BufGuard<'_, D> {
	fn drop(&mut self) {
		if let Some(handle) = self.handle.take() {
			let mut meta = self.cache.meta.lock();
			meta[handle.index].refcount -= 1;
			if meta[handle.index].refcount == 0 {
				meta[handle.index].tick = self.cache.next_tick.fetch_add(1, Relaxed);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::MemDisk;

	#[test]
	fn write_then_read_round_trips() {
		let cache = BlockCache::new(MemDisk::new(NBUF + 4));
		{
			let mut buf = cache.read(DeviceId(0), 5).unwrap();
			buf[..5].copy_from_slice(b"hello");
			buf.write().unwrap();
		}
		let buf = cache.read(DeviceId(0), 5).unwrap();
		assert_eq!(&buf[..5], b"hello");
	}

	#[test]
	fn get_dedups_same_fingerprint() {
		let cache = BlockCache::new(MemDisk::new(NBUF + 4));
		let a = cache.get(DeviceId(0), 3);
		let b = cache.get(DeviceId(0), 3);
		assert_eq!(a.index, b.index);
		// Both handles hold a reference; dropping one should not make the slot
		// recyclable while the other is still outstanding.
		assert_eq!(cache.meta.lock()[a.index].refcount, 2);
	}

	#[test]
	#[should_panic(expected = "block cache exhausted")]
	fn recycling_miss_panics_when_every_slot_is_held() {
		let cache = BlockCache::new(MemDisk::new(NBUF + 8));
		// Hold a distinct, never-released buffer in every slot (§4.1: only refcount == 0
		// candidates are eligible for recycling).
		let _held: Vec<_> = (0..NBUF as u32).map(|b| cache.read(DeviceId(0), b).unwrap()).collect();
		let _ = cache.get(DeviceId(0), NBUF as u32 + 1);
	}

	#[test]
	fn release_moves_slot_to_front_of_lru() {
		let cache = BlockCache::new(MemDisk::new(NBUF + 4));
		// Fill every slot while holding all of them at once, so each is assigned to its own
		// slot (none can be recycled while still held), then release in index order so each
		// gets a strictly increasing tick.
		let held: Vec<_> = (0..NBUF as u32).map(|b| cache.read(DeviceId(0), b).unwrap()).collect();
		drop(held);
		// Re-touch block 0 so it becomes the most-recently used; block 1 is now the
		// least-recently used and should be the one recycled next.
		cache.read(DeviceId(0), 0).unwrap();
		let recycled = cache.get(DeviceId(0), NBUF as u32 + 1);
		assert_eq!(recycled.blockno, NBUF as u32 + 1);
		let meta = cache.meta.lock();
		// Block 1's slot was reused; block 0 (freshly touched) is untouched.
		assert!(meta.iter().any(|m| m.used && m.dev == DeviceId(0) && m.blockno == 0));
		assert!(!meta.iter().any(|m| m.used && m.blockno == 1 && m.dev == DeviceId(0)));
	}
}
