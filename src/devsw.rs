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

//! The device switch (§4.4, §6): an indirection table mapping a character device's major number
//! to a [`Device`] implementation, plus the *device table* that maps an inode number to a major
//! by lazily parsing `/etc/devtab` on first use.
//!
//! Grounded on the parent kernel's `device` module (which maintains an analogous
//! major/minor-indexed registry over `DeviceID`); narrowed here to the fixed-size array and
//! explicit `/etc/devtab` bootstrap the specification describes, since this core has no device
//! manager of its own to register devices through at boot.

use crate::{block::BlockDevice, ext2::Ext2Fs, sync::spin::Spin};
use utils::{
	errno::{EResult, Errno},
	ptr::arc::Arc,
};

/// Maximum number of distinct device majors this core can dispatch to.
pub const NDEV: usize = 10;

/// Maximum number of rows this core parses out of `/etc/devtab`.
const MAX_DEVTAB_ENTRIES: usize = 64;

/// A character device callable through the device switch.
pub trait Device: Send + Sync {
	/// Reads from `minor` at byte offset `off` into `buf`, returning the number of bytes read.
	fn read(&self, minor: u32, off: u64, buf: &mut [u8]) -> EResult<usize>;

	/// Writes `buf` to `minor` at byte offset `off`, returning the number of bytes written.
	fn write(&self, minor: u32, off: u64, buf: &[u8]) -> EResult<usize>;
}

/// One row of `/etc/devtab`: `inum \t type \t major \t minor`.
#[derive(Debug, Clone, Copy)]
struct DevTabEntry {
	inum: u32,
	major: u32,
	minor: u32,
}

/// The device switch: `NDEV` registered devices plus the inode-to-major device table parsed
/// from `/etc/devtab`.
pub struct DeviceSwitch {
	devices: Spin<[Option<Arc<dyn Device>>; NDEV]>,
	/// `None` until the first lookup triggers a parse of `/etc/devtab` (§4.4: "populated at
	/// open by reading `/etc/devtab`").
	devtab: Spin<Option<[Option<DevTabEntry>; MAX_DEVTAB_ENTRIES]>>,
}

impl DeviceSwitch {
	/// Creates an empty device switch with no devices registered and the device table not yet
	/// loaded.
	pub fn new() -> Self {
		Self {
			devices: Spin::new(core::array::from_fn(|_| None)),
			devtab: Spin::new(None),
		}
	}

	/// Registers `device` under `major`, overwriting whatever was previously registered there.
	pub fn register(&self, major: u32, device: Arc<dyn Device>) -> EResult<()> {
		let idx = major as usize;
		if idx >= NDEV {
			return Err(Errno::ENXIO);
		}
		self.devices.lock()[idx] = Some(device);
		Ok(())
	}

	/// Parses `contents` (the raw bytes of `/etc/devtab`) into the device table, replacing
	/// whatever was previously loaded. Malformed lines are skipped rather than treated as fatal,
	/// since a foreign `/etc/devtab` is user input, not an on-disk structural invariant.
	pub fn load_devtab(&self, contents: &[u8]) {
		let mut entries = [None; MAX_DEVTAB_ENTRIES];
		let mut count = 0;
		for line in contents.split(|&b| b == b'\n') {
			if line.is_empty() || count >= MAX_DEVTAB_ENTRIES {
				continue;
			}
			let mut fields = line.split(|&b| b == b'\t');
			let parse = |f: Option<&[u8]>| -> Option<u32> {
				let s = core::str::from_utf8(f?).ok()?;
				s.trim().parse().ok()
			};
			let inum = parse(fields.next());
			let _dev_type = fields.next();
			let major = parse(fields.next());
			let minor = parse(fields.next());
			if let (Some(inum), Some(major), Some(minor)) = (inum, major, minor) {
				entries[count] = Some(DevTabEntry { inum, major, minor });
				count += 1;
			}
		}
		*self.devtab.lock() = Some(entries);
	}

	/// Whether `/etc/devtab` has been loaded yet.
	pub fn is_loaded(&self) -> bool {
		self.devtab.lock().is_some()
	}

	/// Records one more `(inum, major, minor)` row, as `mknod` does for a freshly created
	/// device-file inode. Initializes an empty table first if `/etc/devtab` has not been parsed
	/// yet, same as a lookup would.
	pub fn add_entry(&self, inum: u32, major: u32, minor: u32) -> EResult<()> {
		let mut devtab = self.devtab.lock();
		let entries = devtab.get_or_insert_with(|| [None; MAX_DEVTAB_ENTRIES]);
		let slot = entries.iter().position(Option::is_none).ok_or(Errno::ENOSPC)?;
		entries[slot] = Some(DevTabEntry { inum, major, minor });
		Ok(())
	}

	fn lookup(&self, inum: u32) -> Option<(u32, u32)> {
		let devtab = self.devtab.lock();
		let entries = devtab.as_ref()?;
		entries
			.iter()
			.flatten()
			.find(|e| e.inum == inum)
			.map(|e| (e.major, e.minor))
	}

	/// Dispatches a read on the device-file inode `inum` to its registered device, per the
	/// device table populated by [`Self::load_devtab`].
	pub fn read(&self, inum: u32, off: u64, buf: &mut [u8]) -> EResult<usize> {
		let (major, minor) = self.lookup(inum).ok_or(Errno::ENXIO)?;
		let device = self
			.devices
			.lock()
			.get(major as usize)
			.and_then(Option::clone)
			.ok_or(Errno::ENXIO)?;
		device.read(minor, off, buf)
	}

	/// Dispatches a write on the device-file inode `inum`, symmetric with [`Self::read`].
	pub fn write(&self, inum: u32, off: u64, buf: &[u8]) -> EResult<usize> {
		let (major, minor) = self.lookup(inum).ok_or(Errno::ENXIO)?;
		let device = self
			.devices
			.lock()
			.get(major as usize)
			.and_then(Option::clone)
			.ok_or(Errno::ENXIO)?;
		device.write(minor, off, buf)
	}
}

impl Default for DeviceSwitch {
	fn default() -> Self {
		Self::new()
	}
}

/// Reads the whole contents of `/etc/devtab`'s inode into a caller-provided buffer, used to
/// bootstrap [`DeviceSwitch::load_devtab`] on first open of a character-device file.
///
/// Kept free-standing (rather than a `DeviceSwitch` method) since it needs `fs` to `ilock` the
/// already-resolved inode, and the device switch itself has no reference back to the mounted
/// filesystem (§9: global mutable state is kept as sibling fields of the owning `Kernel`, not
/// cross-wired into each other).
pub fn read_devtab_inode<D: BlockDevice>(
	fs: &Ext2Fs<D>,
	inode: crate::ext2::InodeRef,
	buf: &mut [u8],
) -> EResult<usize> {
	let mut guard = fs.ilock(inode)?;
	let size = guard.size().min(buf.len() as u64) as usize;
	if size == 0 {
		guard.unlock();
		return Ok(0);
	}
	let n = fs.readi(&mut guard, &mut buf[..size], 0)?;
	guard.unlock();
	Ok(n)
}
