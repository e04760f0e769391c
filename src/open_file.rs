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

//! The global open-file table (§3, §4.4): `NFILE` open-file descriptions, each layering a byte
//! offset and readable/writable flags on top of either a pipe or an in-memory inode.
//!
//! Grounded on the parent kernel's `file::open_file::OpenFile`, narrowed to the fixed-size
//! table and `NONE | PIPE | INODE` variant the specification actually calls for (the parent's
//! `OpenFile` is backed by a growable `HashMap` keyed on `FileLocation`; this core has no
//! dynamic allocation budget for that, so it reuses xv6's fixed `ftable` shape instead, under
//! the parent's locking idiom).

use crate::{
	block::BlockDevice,
	config::NFILE,
	devsw::DeviceSwitch,
	error,
	ext2::{Ext2Fs, InodeRef, inode_disk::FileType},
	pipe::Pipe,
	sync::spin::Spin,
};
use utils::{
	errno::{EResult, Errno},
	ptr::arc::Arc,
};

/// What an open-file description refers to.
enum Kind {
	/// An unused slot.
	None,
	/// A pipe endpoint.
	Pipe(Arc<Pipe>),
	/// A regular file or directory, backed by an in-memory inode.
	Inode(InodeRef),
}

/// Metadata returned by `fstat` (§6).
#[derive(Debug, Clone, Copy)]
pub struct Stat {
	pub ino: u32,
	pub file_type: FileType,
	pub nlink: u16,
	pub size: u64,
}

/// One slot of the open-file table (§3): a variant over what it refers to, a byte offset,
/// readable/writable flags, and a reference count.
struct File {
	kind: Kind,
	readable: bool,
	writable: bool,
	offset: u64,
	refcount: u32,
}

impl File {
	const fn none() -> Self {
		Self {
			kind: Kind::None,
			readable: false,
			writable: false,
			offset: 0,
			refcount: 0,
		}
	}
}

/// Opaque handle to a slot in the [`FileTable`], as returned by [`FileTable::open_inode`] /
/// [`FileTable::open_pipe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHandle(pub(crate) usize);

/// The global open-file table described in §4.4: a fixed-size array of [`File`]s under one
/// spinlock. Not parameterized over a block device — it only ever stores [`InodeRef`] handles,
/// which are themselves device-agnostic; the device type only enters at the [`Ext2Fs`] each
/// call is handed.
pub struct FileTable {
	files: Spin<[File; NFILE]>,
}

impl FileTable {
	/// Creates an empty table.
	pub fn new() -> Self {
		Self {
			files: Spin::new(core::array::from_fn(|_| File::none())),
		}
	}

	/// `filealloc`: claims the first unused slot, returning `None` if the table is full
	/// (§7: resource exhaustion, not a fatal condition).
	fn alloc(&self) -> Option<FileHandle> {
		let mut files = self.files.lock();
		let index = files.iter().position(|f| f.refcount == 0)?;
		files[index].refcount = 1;
		Some(FileHandle(index))
	}

	/// Allocates a slot backed by inode `r`, with the given access flags.
	pub fn open_inode(&self, r: InodeRef, readable: bool, writable: bool) -> EResult<FileHandle> {
		let h = self.alloc().ok_or(Errno::EMFILE)?;
		let mut files = self.files.lock();
		files[h.0].kind = Kind::Inode(r);
		files[h.0].readable = readable;
		files[h.0].writable = writable;
		files[h.0].offset = 0;
		Ok(h)
	}

	/// Allocates a slot backed by `pipe`, as one endpoint (reading xor writing).
	pub fn open_pipe(&self, pipe: Arc<Pipe>, readable: bool, writable: bool) -> EResult<FileHandle> {
		let h = self.alloc().ok_or(Errno::EMFILE)?;
		let mut files = self.files.lock();
		files[h.0].kind = Kind::Pipe(pipe);
		files[h.0].readable = readable;
		files[h.0].writable = writable;
		files[h.0].offset = 0;
		Ok(h)
	}

	/// `filedup`: bumps the refcount of an already-open slot.
	pub fn dup(&self, h: FileHandle) -> FileHandle {
		let mut files = self.files.lock();
		debug_assert!(files[h.0].refcount > 0);
		files[h.0].refcount += 1;
		h
	}

	/// `fileclose`: drops one reference; on the last reference, releases the pipe end or puts
	/// the inode reference.
	pub fn close<D: BlockDevice>(&self, fs: &Ext2Fs<D>, h: FileHandle) -> EResult<()> {
		let last = {
			let mut files = self.files.lock();
			files[h.0].refcount -= 1;
			files[h.0].refcount == 0
		};
		if !last {
			return Ok(());
		}
		let (kind, readable, writable) = {
			let mut files = self.files.lock();
			let readable = files[h.0].readable;
			let writable = files[h.0].writable;
			let kind = core::mem::replace(&mut files[h.0].kind, Kind::None);
			(kind, readable, writable)
		};
		match kind {
			Kind::None => Ok(()),
			Kind::Pipe(pipe) => {
				pipe.release(readable, writable);
				Ok(())
			}
			Kind::Inode(r) => fs.iput(r),
		}
	}

	/// `filestat`: fills in `Stat` for an inode-backed slot. Fails for a pipe, matching the
	/// reference kernel (only inodes carry metadata `fstat` can report).
	pub fn stat<D: BlockDevice>(&self, fs: &Ext2Fs<D>, h: FileHandle) -> EResult<Stat> {
		let r = match &self.files.lock()[h.0].kind {
			Kind::Inode(r) => *r,
			_ => return Err(Errno::EINVAL),
		};
		let guard = fs.ilock(r)?;
		let stat = Stat {
			ino: guard.inum(),
			file_type: guard.file_type(),
			nlink: guard.links_count(),
			size: guard.size(),
		};
		guard.unlock();
		Ok(stat)
	}

	/// `fileread(file, buf, n)`: requires the slot be readable; reads through the inode (or
	/// pipe) and advances the offset by the number of bytes actually read.
	///
	/// A device-file inode delegates to `devices` instead of reading its data blocks (§4.2,
	/// §4.4: "if the inode is a device file, delegate to the device switch").
	pub fn read<D: BlockDevice>(
		&self,
		fs: &Ext2Fs<D>,
		devices: &DeviceSwitch,
		h: FileHandle,
		buf: &mut [u8],
	) -> EResult<usize> {
		if !self.files.lock()[h.0].readable {
			return Err(Errno::EINVAL);
		}
		enum Target {
			Inode(InodeRef),
			Pipe(Arc<Pipe>),
		}
		let target = match &self.files.lock()[h.0].kind {
			Kind::Inode(r) => Target::Inode(*r),
			Kind::Pipe(p) => Target::Pipe(p.clone()),
			Kind::None => return Err(Errno::EINVAL),
		};
		match target {
			Target::Pipe(pipe) => pipe.read(buf),
			Target::Inode(r) => {
				let off = self.files.lock()[h.0].offset;
				let mut guard = fs.ilock(r)?;
				let is_dev = guard.file_type() == FileType::CharDevice;
				guard.unlock();
				let n = if is_dev {
					devices.read(r.inum, off, buf)?
				} else {
					let mut guard = fs.ilock(r)?;
					let n = fs.readi(&mut guard, buf, off)?;
					guard.unlock();
					n
				};
				self.files.lock()[h.0].offset = off + n as u64;
				Ok(n)
			}
		}
	}

	/// `filewrite(file, buf, n)`: requires the slot be writable; writes through the inode (or
	/// pipe), chunked at [`crate::config::MAX_WRITE_CHUNK`] bytes per iteration to bound the
	/// amount of per-operation work (§4.4), and advances the offset after each chunk. A short
	/// write from `writei` is treated as fatal, per §7.
	///
	/// A device-file inode delegates to `devices` in one call instead, since a character
	/// device has no block-map chunking to respect.
	pub fn write<D: BlockDevice>(
		&self,
		fs: &Ext2Fs<D>,
		devices: &DeviceSwitch,
		h: FileHandle,
		buf: &[u8],
	) -> EResult<usize> {
		if !self.files.lock()[h.0].writable {
			return Err(Errno::EINVAL);
		}
		enum Target {
			Inode(InodeRef),
			Pipe(Arc<Pipe>),
		}
		let target = match &self.files.lock()[h.0].kind {
			Kind::Inode(r) => Target::Inode(*r),
			Kind::Pipe(p) => Target::Pipe(p.clone()),
			Kind::None => return Err(Errno::EINVAL),
		};
		match target {
			Target::Pipe(pipe) => pipe.write(buf),
			Target::Inode(r) => {
				let guard = fs.ilock(r)?;
				let is_dev = guard.file_type() == FileType::CharDevice;
				guard.unlock();
				if is_dev {
					let off = self.files.lock()[h.0].offset;
					let n = devices.write(r.inum, off, buf)?;
					self.files.lock()[h.0].offset = off + n as u64;
					return Ok(n);
				}
				let mut done = 0;
				while done < buf.len() {
					let chunk = (buf.len() - done).min(crate::config::MAX_WRITE_CHUNK);
					let off = self.files.lock()[h.0].offset;
					let mut guard = fs.ilock(r)?;
					let n = fs.writei(&mut guard, &buf[done..done + chunk], off)?;
					guard.unlock();
					if n != chunk {
						error!("filewrite: short write ({n} of {chunk} bytes)");
						panic!("short write");
					}
					self.files.lock()[h.0].offset = off + n as u64;
					done += n;
				}
				Ok(done)
			}
		}
	}
}

impl Default for FileTable {
	fn default() -> Self {
		Self::new()
	}
}
