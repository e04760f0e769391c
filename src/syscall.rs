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

//! The syscall surface (§6): `open`/`read`/`write`/`close`/`fstat`/`link`/`unlink`/`mkdir`/
//! `mknod`/`chdir`/`dup`/`pipe`/`exec`, bundled onto one [`Kernel`] value that owns the mounted
//! filesystem, the global open-file table, and the device switch.
//!
//! Grounded on the parent kernel's syscall dispatch (`syscall::open`, `syscall::read`, ...),
//! each a thin wrapper translating resolver/driver results to a user-visible return value;
//! narrowed here to the bare negative-int convention §7 specifies rather than a full `errno`
//! side-channel, and to one in-process `Process` rather than a scheduler's process table.

use crate::{
	block::BlockDevice,
	devsw::{Device, DeviceSwitch},
	error,
	ext2::{Ext2Fs, inode_disk::FileType},
	namei::{Component, Process},
	open_file::{FileHandle, FileTable, Stat},
	pipe::Pipe,
};
use utils::{
	errno::{EResult, Errno},
	ptr::arc::Arc,
};

/// Open for reading only.
pub const O_RDONLY: u32 = 0;
/// Open for writing only.
pub const O_WRONLY: u32 = 1;
/// Open for both reading and writing.
pub const O_RDWR: u32 = 2;
/// Create the file if it does not already exist.
pub const O_CREATE: u32 = 0x200;

/// Hands the named file's inode to process-replacement logic the surrounding kernel owns.
///
/// `exec(2)` itself — building a new address space and jumping into it — is out of scope here
/// (§1 non-goal); this crate's contribution is resolving `path` and handing the caller its
/// inode plus the `argv` it was given, unchanged.
pub trait ExecDelegate {
	/// Receives the resolved executable's inode number and the original `argv`, and performs
	/// whatever process-image switch the embedding kernel implements.
	fn replace_image(&mut self, inode: u32, argv: &[&[u8]]) -> EResult<()>;
}

/// Bundles the mounted filesystem with the two other pieces of global, process-wide state this
/// core keeps: the open-file table and the device switch (§6: "BCACHE, ICACHE, FTAB" are
/// process-wide, not per-CPU).
pub struct Kernel<D: BlockDevice> {
	pub fs: Ext2Fs<D>,
	pub files: FileTable,
	pub devices: DeviceSwitch,
}

impl<D: BlockDevice> Kernel<D> {
	/// Mounts `device` and wires up empty file and device tables.
	pub fn new(device: D) -> EResult<Self> {
		Ok(Self {
			fs: Ext2Fs::mount(device)?,
			files: FileTable::new(),
			devices: DeviceSwitch::new(),
		})
	}

	/// Registers a character device under `major`, so a later `mknod`/open of a device-file
	/// inode dispatches to it.
	pub fn register_device(&self, major: u32, device: Arc<dyn Device>) -> EResult<()> {
		self.devices.register(major, device)
	}

	/// Ensures `/etc/devtab` has been parsed into the device switch, per §6's "populated at
	/// open" rule. Called lazily the first time a device-file inode is opened.
	fn ensure_devtab_loaded(&self, proc: &Process) -> EResult<()> {
		if self.devices.is_loaded() {
			return Ok(());
		}
		let inode = match self.fs.namei(proc, crate::config::DEVTAB_PATH.as_bytes()) {
			Ok(i) => i,
			Err(Errno::ENOENT) => {
				self.devices.load_devtab(&[]);
				return Ok(());
			}
			Err(e) => return Err(e),
		};
		let mut buf = [0u8; 4096];
		let n = crate::devsw::read_devtab_inode(&self.fs, inode, &mut buf)?;
		self.fs.iput(inode)?;
		self.devices.load_devtab(&buf[..n]);
		Ok(())
	}

	/// `open(path, mode)`: resolves or creates `path` and installs it in a free descriptor slot.
	pub fn open(&self, proc: &mut Process, path: &[u8], mode: u32) -> EResult<usize> {
		let readable = mode & O_WRONLY == 0;
		let writable = mode & O_WRONLY != 0 || mode & O_RDWR != 0;
		let inode = if mode & O_CREATE != 0 {
			match self.fs.namei(proc, path) {
				Ok(i) => i,
				Err(Errno::ENOENT) => self.create(proc, path, FileType::Regular)?,
				Err(e) => return Err(e),
			}
		} else {
			self.fs.namei(proc, path)?
		};
		let guard = self.fs.ilock(inode)?;
		let file_type = guard.file_type();
		let inum = guard.inum();
		guard.unlock();
		if file_type == FileType::Directory && writable {
			self.fs.iput(inode)?;
			return Err(Errno::EISDIR);
		}
		if file_type == FileType::CharDevice {
			self.ensure_devtab_loaded(proc)?;
			let _ = inum;
		}
		let handle = match self.files.open_inode(inode, readable, writable) {
			Ok(h) => h,
			Err(e) => {
				self.fs.iput(inode)?;
				return Err(e);
			}
		};
		let fd = proc.alloc_fd().ok_or_else(|| {
			let _ = self.files.close(&self.fs, handle);
			Errno::EMFILE
		})?;
		proc.ofile[fd] = Some(handle);
		Ok(fd)
	}

	/// Shared by `open`'s `O_CREATE` path and `mkdir`/`mknod`: resolves the parent directory,
	/// allocates a fresh inode of `file_type`, and links it into the parent under the final
	/// path component.
	fn create(&self, proc: &Process, path: &[u8], file_type: FileType) -> EResult<crate::ext2::InodeRef> {
		let (parent, name) = self.fs.nameiparent(proc, path)?;
		let child = match self.fs.ialloc(file_type) {
			Ok(c) => c,
			Err(e) => {
				self.fs.iput(parent)?;
				return Err(e);
			}
		};
		let mut parent_guard = match self.fs.ilock(parent) {
			Ok(g) => g,
			Err(e) => {
				self.fs.iput(child)?;
				self.fs.iput(parent)?;
				return Err(e);
			}
		};
		if let Err(e) = self.link_into(&mut parent_guard, &name, &child, file_type) {
			parent_guard.unlock();
			self.fs.iput(child)?;
			self.fs.iput(parent)?;
			return Err(e);
		}
		parent_guard.unlock();
		self.fs.iput(parent)?;
		Ok(child)
	}

	/// Links `child` into already-locked directory `parent_guard` under `name`, bumping
	/// `parent_guard`'s link count first for a directory child (its own `..` entry), and
	/// populating a freshly allocated directory's `.`/`..` entries.
	fn link_into(
		&self,
		parent_guard: &mut crate::ext2::InodeGuard<'_, D>,
		name: &Component,
		child: &crate::ext2::InodeRef,
		file_type: FileType,
	) -> EResult<()> {
		if file_type == FileType::Directory {
			let mut child_guard = self.fs.ilock(*child)?;
			self.fs.dirlink(&mut child_guard, b".", child.inum)?;
			self.fs.dirlink(&mut child_guard, b"..", parent_guard.inum())?;
			// The child's own "." entry deliberately does not bump its link count (§9:
			// avoids a self-referential count that could keep a deleted directory alive).
			// Its count reflects only the name this call is about to link into the parent.
			child_guard.set_links_count(1);
			self.fs.iupdate(&child_guard)?;
			child_guard.unlock();
			parent_guard.set_links_count(parent_guard.links_count() + 1);
			self.fs.iupdate(parent_guard)?;
		} else {
			let mut child_guard = self.fs.ilock(*child)?;
			child_guard.set_links_count(1);
			self.fs.iupdate(&child_guard)?;
			child_guard.unlock();
		}
		self.fs.dirlink(parent_guard, name.as_bytes(), child.inum)
	}

	/// `read(fd, buf, n)`.
	pub fn read(&self, proc: &Process, fd: usize, buf: &mut [u8]) -> EResult<usize> {
		let handle = self.handle(proc, fd)?;
		self.files.read(&self.fs, &self.devices, handle, buf)
	}

	/// `write(fd, buf, n)`.
	pub fn write(&self, proc: &Process, fd: usize, buf: &[u8]) -> EResult<usize> {
		let handle = self.handle(proc, fd)?;
		self.files.write(&self.fs, &self.devices, handle, buf)
	}

	/// `close(fd)`: drops the descriptor's slot; the file itself stays open until every
	/// descriptor and every `dup`ed copy referring to it has closed.
	pub fn close(&self, proc: &mut Process, fd: usize) -> EResult<()> {
		let handle = self.handle(proc, fd)?;
		proc.ofile[fd] = None;
		self.files.close(&self.fs, handle)
	}

	/// `fstat(fd, *stat)`.
	pub fn fstat(&self, proc: &Process, fd: usize) -> EResult<Stat> {
		let handle = self.handle(proc, fd)?;
		self.files.stat(&self.fs, handle)
	}

	/// `link(old, new)`: adds a second directory entry pointing at `old`'s inode, bumping its
	/// link count. Fails on a directory, matching the reference kernel's `sys_link`.
	pub fn link(&self, proc: &Process, old: &[u8], new: &[u8]) -> EResult<()> {
		let inode = self.fs.namei(proc, old)?;
		let mut guard = self.fs.ilock(inode)?;
		if guard.file_type() == FileType::Directory {
			guard.unlock();
			self.fs.iput(inode)?;
			return Err(Errno::EISDIR);
		}
		guard.set_links_count(guard.links_count() + 1);
		if let Err(e) = self.fs.iupdate(&guard) {
			guard.set_links_count(guard.links_count() - 1);
			guard.unlock();
			self.fs.iput(inode)?;
			return Err(e);
		}
		guard.unlock();
		let (parent, name) = match self.fs.nameiparent(proc, new) {
			Ok(v) => v,
			Err(e) => {
				self.undo_link(inode)?;
				return Err(e);
			}
		};
		let mut parent_guard = self.fs.ilock(parent)?;
		let result = self.fs.dirlink(&mut parent_guard, name.as_bytes(), inode.inum);
		parent_guard.unlock();
		self.fs.iput(parent)?;
		if result.is_err() {
			self.undo_link(inode)?;
		} else {
			self.fs.iput(inode)?;
		}
		result
	}

	/// Reverts the link-count bump [`Self::link`] performed before it discovered the new name
	/// could not be created.
	fn undo_link(&self, inode: crate::ext2::InodeRef) -> EResult<()> {
		let mut guard = self.fs.ilock(inode)?;
		guard.set_links_count(guard.links_count() - 1);
		self.fs.iupdate(&guard)?;
		guard.unlock();
		self.fs.iput(inode)
	}

	/// `unlink(path)`: removes a directory entry and drops the target's link count, freeing its
	/// blocks once both its link count and open-reference count reach zero (handled by
	/// [`crate::icache::Ext2Fs::iput`] through the inode cache, not here).
	pub fn unlink(&self, proc: &Process, path: &[u8]) -> EResult<()> {
		let (parent, name) = self.fs.nameiparent(proc, path)?;
		if name.as_bytes() == b"." || name.as_bytes() == b".." {
			self.fs.iput(parent)?;
			return Err(Errno::EINVAL);
		}
		let mut parent_guard = self.fs.ilock(parent)?;
		let found = self.fs.dirlookup(&mut parent_guard, name.as_bytes())?;
		let Some((target, off)) = found else {
			parent_guard.unlock();
			self.fs.iput(parent)?;
			return Err(Errno::ENOENT);
		};
		let mut target_guard = self.fs.ilock(target)?;
		if target_guard.file_type() == FileType::Directory && !self.dir_is_empty(&mut target_guard)? {
			target_guard.unlock();
			self.fs.iput(target)?;
			parent_guard.unlock();
			self.fs.iput(parent)?;
			return Err(Errno::ENOTEMPTY);
		}
		self.fs.dirunlink(&mut parent_guard, off)?;
		if target_guard.file_type() == FileType::Directory {
			// The removed "." / ".." pair no longer anchors the parent's extra link.
			parent_guard.set_links_count(parent_guard.links_count() - 1);
			self.fs.iupdate(&parent_guard)?;
		}
		target_guard.set_links_count(target_guard.links_count().saturating_sub(1));
		self.fs.iupdate(&target_guard)?;
		target_guard.unlock();
		self.fs.iput(target)?;
		parent_guard.unlock();
		self.fs.iput(parent)?;
		Ok(())
	}

	/// A directory is empty when it holds only its own `.` and `..` entries.
	fn dir_is_empty(&self, guard: &mut crate::ext2::InodeGuard<'_, D>) -> EResult<bool> {
		for name in [b".".as_slice(), b"..".as_slice()] {
			match self.fs.dirlookup(guard, name)? {
				Some((r, _)) => self.fs.iput(r)?,
				None => {
					error!("unlink: directory {} is missing its own {:?} entry", guard.inum(), name);
					panic!("corrupt directory");
				}
			}
		}
		let size = guard.size();
		let entry_count = {
			let mut off = 0u64;
			let mut count = 0;
			while off < size {
				let mut header_buf = [0u8; crate::ext2::dirent::HEADER_SIZE];
				let got = self.fs.readi(guard, &mut header_buf, off)?;
				if got < crate::ext2::dirent::HEADER_SIZE {
					break;
				}
				let header = crate::ext2::dirent::DirEntryHeader::from_bytes(&header_buf);
				if header.inode != 0 {
					count += 1;
				}
				off += header.rec_len as u64;
			}
			count
		};
		Ok(entry_count <= 2)
	}

	/// `mkdir(path)`.
	pub fn mkdir(&self, proc: &Process, path: &[u8]) -> EResult<()> {
		let inode = self.create(proc, path, FileType::Directory)?;
		self.fs.iput(inode)
	}

	/// `mknod(path, major, minor)`: creates a character-device inode and records its
	/// `(major, minor)` pair in the device switch, so a later `open` dispatches reads/writes to
	/// the registered [`Device`].
	pub fn mknod(&self, proc: &Process, path: &[u8], major: u32, minor: u32) -> EResult<()> {
		let inode = self.create(proc, path, FileType::CharDevice)?;
		if let Err(e) = self.devices.add_entry(inode.inum, major, minor) {
			self.fs.iput(inode)?;
			return Err(e);
		}
		self.fs.iput(inode)
	}

	/// `chdir(path)`: replaces the process's cwd with `path`'s inode, which must be a
	/// directory.
	pub fn chdir(&self, proc: &mut Process, path: &[u8]) -> EResult<()> {
		let inode = self.fs.namei(proc, path)?;
		let guard = self.fs.ilock(inode)?;
		if guard.file_type() != FileType::Directory {
			guard.unlock();
			self.fs.iput(inode)?;
			return Err(Errno::ENOTDIR);
		}
		guard.unlock();
		let old = proc.cwd;
		proc.cwd = inode;
		self.fs.iput(old)
	}

	/// `dup(fd)`: installs a second descriptor referring to the same open-file slot.
	pub fn dup(&self, proc: &mut Process, fd: usize) -> EResult<usize> {
		let handle = self.handle(proc, fd)?;
		let new_handle = self.files.dup(handle);
		let new_fd = proc.alloc_fd().ok_or(Errno::EMFILE)?;
		proc.ofile[new_fd] = Some(new_handle);
		Ok(new_fd)
	}

	/// `pipe(*fds)`: creates a pipe and installs its read end and write end at two free
	/// descriptors, returned as `(read_fd, write_fd)`.
	pub fn pipe(&self, proc: &mut Process) -> EResult<(usize, usize)> {
		let pipe = Arc::new(Pipe::new()?);
		let read_handle = self.files.open_pipe(pipe.clone(), true, false)?;
		let read_fd = match proc.alloc_fd() {
			Some(fd) => fd,
			None => {
				self.files.close(&self.fs, read_handle)?;
				return Err(Errno::EMFILE);
			}
		};
		proc.ofile[read_fd] = Some(read_handle);
		let write_handle = match self.files.open_pipe(pipe, false, true) {
			Ok(h) => h,
			Err(e) => {
				proc.ofile[read_fd] = None;
				self.files.close(&self.fs, read_handle)?;
				return Err(e);
			}
		};
		let write_fd = match proc.alloc_fd() {
			Some(fd) => fd,
			None => {
				proc.ofile[read_fd] = None;
				self.files.close(&self.fs, read_handle)?;
				self.files.close(&self.fs, write_handle)?;
				return Err(Errno::EMFILE);
			}
		};
		proc.ofile[write_fd] = Some(write_handle);
		Ok((read_fd, write_fd))
	}

	/// `exec(path, argv)`: resolves `path` to an inode and hands it to `delegate`, which
	/// performs the actual process-image switch this crate does not implement.
	pub fn exec(
		&self,
		proc: &Process,
		path: &[u8],
		argv: &[&[u8]],
		delegate: &mut dyn ExecDelegate,
	) -> EResult<()> {
		let inode = self.fs.namei(proc, path)?;
		let guard = self.fs.ilock(inode)?;
		if guard.file_type() != FileType::Regular {
			guard.unlock();
			self.fs.iput(inode)?;
			return Err(Errno::EINVAL);
		}
		let inum = guard.inum();
		guard.unlock();
		let result = delegate.replace_image(inum, argv);
		self.fs.iput(inode)?;
		result
	}

	fn handle(&self, proc: &Process, fd: usize) -> EResult<FileHandle> {
		proc.ofile.get(fd).copied().flatten().ok_or(Errno::EBADF)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{MemDisk, build_basic_image};

	fn mounted(total_blocks: u32) -> (Kernel<MemDisk>, Process) {
		let kernel = Kernel::new(build_basic_image(total_blocks)).unwrap();
		let proc = Process::new(kernel.fs.iget(crate::ext2::DEV, crate::config::ROOT_INODE));
		(kernel, proc)
	}

	/// A `Device` that echoes back whatever was last written to it, regardless of minor.
	struct EchoDevice {
		last_write: crate::sync::spin::Spin<std::vec::Vec<u8>, false>,
	}

	impl Device for EchoDevice {
		fn read(&self, _minor: u32, off: u64, buf: &mut [u8]) -> EResult<usize> {
			let stored = self.last_write.lock();
			let off = off as usize;
			if off >= stored.len() {
				return Ok(0);
			}
			let n = (stored.len() - off).min(buf.len());
			buf[..n].copy_from_slice(&stored[off..off + n]);
			Ok(n)
		}

		fn write(&self, _minor: u32, _off: u64, buf: &[u8]) -> EResult<usize> {
			let mut stored = self.last_write.lock();
			stored.clear();
			stored.extend_from_slice(buf);
			Ok(buf.len())
		}
	}

	#[test]
	fn create_write_read_and_stat_round_trip() {
		let (kernel, mut proc) = mounted(64);
		let fd = kernel.open(&mut proc, b"/file", O_CREATE | O_RDWR).unwrap();
		assert_eq!(kernel.write(&proc, fd, b"hello world").unwrap(), 11);
		let stat = kernel.fstat(&proc, fd).unwrap();
		assert_eq!(stat.size, 11);
		assert_eq!(stat.file_type, FileType::Regular);
		assert_eq!(stat.nlink, 1);
		kernel.close(&mut proc, fd).unwrap();

		let fd2 = kernel.open(&mut proc, b"/file", O_RDONLY).unwrap();
		let mut buf = [0u8; 32];
		let n = kernel.read(&proc, fd2, &mut buf).unwrap();
		assert_eq!(&buf[..n], b"hello world");
		kernel.close(&mut proc, fd2).unwrap();
	}

	#[test]
	fn mkdir_creates_dot_and_dotdot_then_chdir_and_relative_open_work() {
		let (kernel, mut proc) = mounted(64);
		let root_fd = kernel.open(&mut proc, b"/", O_RDONLY).unwrap();
		let root_nlink_before = kernel.fstat(&proc, root_fd).unwrap().nlink;
		kernel.close(&mut proc, root_fd).unwrap();

		kernel.mkdir(&proc, b"/sub").unwrap();
		let dir_fd = kernel.open(&mut proc, b"/sub", O_RDONLY).unwrap();
		let dir_stat = kernel.fstat(&proc, dir_fd).unwrap();
		assert_eq!(dir_stat.file_type, FileType::Directory);
		// The child's own "." entry does not bump its own link count; only the parent's
		// directory entry naming it does.
		assert_eq!(dir_stat.nlink, 1);
		kernel.close(&mut proc, dir_fd).unwrap();

		// The new subdirectory's ".." bumps the parent's link count instead.
		let root_fd = kernel.open(&mut proc, b"/", O_RDONLY).unwrap();
		assert_eq!(kernel.fstat(&proc, root_fd).unwrap().nlink, root_nlink_before + 1);
		kernel.close(&mut proc, root_fd).unwrap();

		kernel.chdir(&mut proc, b"/sub").unwrap();
		let fd = kernel.open(&mut proc, b"inner", O_CREATE | O_RDWR).unwrap();
		kernel.write(&proc, fd, b"x").unwrap();
		kernel.close(&mut proc, fd).unwrap();

		let fd2 = kernel.open(&mut proc, b"/sub/inner", O_RDONLY).unwrap();
		let mut buf = [0u8; 1];
		assert_eq!(kernel.read(&proc, fd2, &mut buf).unwrap(), 1);
		assert_eq!(&buf, b"x");
		kernel.close(&mut proc, fd2).unwrap();
	}

	#[test]
	fn link_bumps_nlink_and_unlink_drops_it_then_name_is_gone() {
		let (kernel, mut proc) = mounted(64);
		let fd = kernel.open(&mut proc, b"/a", O_CREATE | O_RDWR).unwrap();
		kernel.close(&mut proc, fd).unwrap();
		kernel.link(&proc, b"/a", b"/b").unwrap();

		let fd = kernel.open(&mut proc, b"/a", O_RDONLY).unwrap();
		assert_eq!(kernel.fstat(&proc, fd).unwrap().nlink, 2);
		kernel.close(&mut proc, fd).unwrap();

		kernel.unlink(&proc, b"/b").unwrap();
		assert!(matches!(kernel.open(&mut proc, b"/b", O_RDONLY), Err(Errno::ENOENT)));

		let fd = kernel.open(&mut proc, b"/a", O_RDONLY).unwrap();
		assert_eq!(kernel.fstat(&proc, fd).unwrap().nlink, 1);
		kernel.close(&mut proc, fd).unwrap();
	}

	#[test]
	fn link_rejects_a_directory() {
		let (kernel, proc) = mounted(64);
		kernel.mkdir(&proc, b"/dir").unwrap();
		assert!(matches!(kernel.link(&proc, b"/dir", b"/dir2"), Err(Errno::EISDIR)));
	}

	#[test]
	fn unlink_rejects_a_nonempty_directory() {
		let (kernel, mut proc) = mounted(64);
		kernel.mkdir(&proc, b"/dir").unwrap();
		let fd = kernel.open(&mut proc, b"/dir/child", O_CREATE | O_RDWR).unwrap();
		kernel.close(&mut proc, fd).unwrap();
		assert!(matches!(kernel.unlink(&proc, b"/dir"), Err(Errno::ENOTEMPTY)));
	}

	#[test]
	fn dup_shares_the_same_offset_until_both_descriptors_close() {
		let (kernel, mut proc) = mounted(64);
		let fd = kernel.open(&mut proc, b"/a", O_CREATE | O_RDWR).unwrap();
		kernel.write(&proc, fd, b"0123456789").unwrap();
		let fd2 = kernel.dup(&mut proc, fd).unwrap();
		// dup() aliases the same open-file slot, so fd and fd2 share one offset; after the
		// write above it already sits at end-of-file for both descriptors.
		kernel.close(&mut proc, fd).unwrap();
		assert_eq!(kernel.fstat(&proc, fd2).unwrap().size, 10);
		let mut buf = [0u8; 4];
		assert_eq!(kernel.read(&proc, fd2, &mut buf).unwrap(), 0);
		kernel.close(&mut proc, fd2).unwrap();
	}

	#[test]
	fn pipe_write_then_read_round_trips() {
		let (kernel, mut proc) = mounted(64);
		let (rd, wr) = kernel.pipe(&mut proc).unwrap();
		kernel.write(&proc, wr, b"ping").unwrap();
		let mut buf = [0u8; 4];
		assert_eq!(kernel.read(&proc, rd, &mut buf).unwrap(), 4);
		assert_eq!(&buf, b"ping");
		kernel.close(&mut proc, rd).unwrap();
		kernel.close(&mut proc, wr).unwrap();
	}

	#[test]
	fn mknod_routes_read_and_write_through_the_registered_device() {
		let (kernel, mut proc) = mounted(64);
		kernel
			.register_device(
				7,
				Arc::new(EchoDevice {
					last_write: crate::sync::spin::Spin::new(std::vec::Vec::new()),
				}),
			)
			.unwrap();
		kernel.mknod(&proc, b"/dev0", 7, 3).unwrap();

		let fd = kernel.open(&mut proc, b"/dev0", O_RDWR).unwrap();
		assert_eq!(kernel.write(&proc, fd, b"hello").unwrap(), 5);
		kernel.close(&mut proc, fd).unwrap();

		// The bytes went to the device, not the device-file inode's own data blocks.
		let fd = kernel.open(&mut proc, b"/dev0", O_RDONLY).unwrap();
		assert_eq!(kernel.fstat(&proc, fd).unwrap().size, 0);
		let mut buf = [0u8; 5];
		assert_eq!(kernel.read(&proc, fd, &mut buf).unwrap(), 5);
		assert_eq!(&buf, b"hello");
		kernel.close(&mut proc, fd).unwrap();
	}

	#[test]
	fn writei_through_the_syscall_layer_spans_an_indirect_block() {
		let (kernel, mut proc) = mounted(1024);
		let fd = kernel.open(&mut proc, b"/big", O_CREATE | O_RDWR).unwrap();
		let data = [42u8; 64 * 1024];
		let mut written = 0;
		while written < data.len() {
			written += kernel.write(&proc, fd, &data[written..]).unwrap();
		}
		assert_eq!(kernel.fstat(&proc, fd).unwrap().size, data.len() as u64);
		kernel.close(&mut proc, fd).unwrap();
	}

	#[test]
	fn two_threads_concurrently_read_the_same_file() {
		let (kernel, mut proc) = mounted(1024);
		let fd = kernel.open(&mut proc, b"/shared", O_CREATE | O_RDWR).unwrap();
		let data: std::vec::Vec<u8> = (0..64 * 1024).map(|i| (i % 256) as u8).collect();
		let mut written = 0;
		while written < data.len() {
			written += kernel.write(&proc, fd, &data[written..]).unwrap();
		}
		kernel.close(&mut proc, fd).unwrap();

		std::thread::scope(|scope| {
			for _ in 0..2 {
				scope.spawn(|| {
					let mut reader_proc = Process::new(kernel.fs.iget(crate::ext2::DEV, crate::config::ROOT_INODE));
					let fd = kernel.open(&mut reader_proc, b"/shared", O_RDONLY).unwrap();
					let mut got = std::vec![0u8; data.len()];
					let mut done = 0;
					while done < got.len() {
						let n = kernel.read(&reader_proc, fd, &mut got[done..]).unwrap();
						assert!(n > 0);
						done += n;
					}
					assert_eq!(got, data);
					kernel.close(&mut reader_proc, fd).unwrap();
				});
			}
		});
	}
}
