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

//! The path resolver (§4.5): walks a slash-separated path one component at a time, starting
//! from either the root inode or a process's current working directory.
//!
//! Grounded on the parent kernel's `file::path` resolution, which performs the same
//! lookup-then-descend loop over a `Path` type; narrowed here to the plain byte-slice
//! components and fixed 255-byte name buffer this core's `dirlookup`/`NAME_MAX` already use,
//! rather than pulling in a `Path`/`PathBuf` abstraction of its own.

use crate::{
	block::BlockDevice,
	config::{NOFILE, ROOT_INODE},
	ext2::{DEV, Ext2Fs, InodeRef, inode_disk::FileType},
	open_file::FileHandle,
};
use utils::{
	errno::{EResult, Errno},
	limits::NAME_MAX,
};

/// Per-process state the resolver and syscall layer read and write (§6): a current working
/// directory inode and a fixed-size file-descriptor table.
///
/// No scheduler, signals, or address space — those belong to the surrounding kernel this crate
/// does not implement.
pub struct Process {
	pub cwd: InodeRef,
	pub ofile: [Option<FileHandle>; NOFILE],
}

impl Process {
	/// Creates a process rooted at `cwd` with no open file descriptors.
	pub fn new(cwd: InodeRef) -> Self {
		Self {
			cwd,
			ofile: [None; NOFILE],
		}
	}

	/// Claims the first unused file-descriptor slot, if any (§7: resource exhaustion, not
	/// fatal).
	pub fn alloc_fd(&mut self) -> Option<usize> {
		self.ofile.iter().position(Option::is_none)
	}
}

/// One path component, copied into a fixed buffer since the resolver never holds a borrow
/// across the `iput`/`ilock` calls it interleaves with extracting it.
pub struct Component {
	buf: [u8; NAME_MAX],
	len: usize,
}

impl Component {
	pub fn as_bytes(&self) -> &[u8] {
		&self.buf[..self.len]
	}
}

/// Splits the next path component off the front of `path`.
///
/// Skips leading slashes; if nothing remains, returns `None`. Otherwise copies bytes up to the
/// next `/` (or the end of the string) into a name, together with whatever follows (with
/// trailing slashes stripped). A component longer than [`NAME_MAX`] is an error rather than a
/// silent truncation.
fn skipelem(path: &[u8]) -> EResult<Option<(Component, &[u8])>> {
	let mut p = path;
	while p.first() == Some(&b'/') {
		p = &p[1..];
	}
	if p.is_empty() {
		return Ok(None);
	}
	let end = p.iter().position(|&b| b == b'/').unwrap_or(p.len());
	if end > NAME_MAX {
		return Err(Errno::ENAMETOOLONG);
	}
	let mut buf = [0u8; NAME_MAX];
	buf[..end].copy_from_slice(&p[..end]);
	let mut rest = &p[end..];
	while rest.first() == Some(&b'/') {
		rest = &rest[1..];
	}
	Ok(Some((Component { buf, len: end }, rest)))
}

impl<D: BlockDevice> Ext2Fs<D> {
	/// `namex(path, want_parent)`: resolves `path` to an inode, or, when `want_parent` is true,
	/// to the inode of its last component's parent directory plus that last component's name.
	///
	/// Returns a referenced, unlocked [`InodeRef`] (acquired through `iget`/`idup`, per the
	/// lock-acquisition order in §5: the resolver never holds more than one inode's sleep lock
	/// at a time, and releases the parent's before acquiring the child's).
	fn namex(
		&self,
		proc: &Process,
		path: &[u8],
		want_parent: bool,
	) -> EResult<(InodeRef, Option<Component>)> {
		let mut cur = if path.first() == Some(&b'/') {
			self.iget(DEV, ROOT_INODE)
		} else {
			self.idup(proc.cwd)
		};
		let mut rest = path;
		loop {
			let Some((name, next_rest)) = skipelem(rest)? else {
				if want_parent {
					self.iput(cur)?;
					return Err(Errno::ENOENT);
				}
				return Ok((cur, None));
			};
			let mut guard = match self.ilock(cur) {
				Ok(g) => g,
				Err(e) => {
					self.iput(cur)?;
					return Err(e);
				}
			};
			if guard.file_type() != FileType::Directory {
				guard.unlock();
				self.iput(cur)?;
				return Err(Errno::ENOTDIR);
			}
			if want_parent && next_rest.is_empty() {
				guard.unlock();
				return Ok((cur, Some(name)));
			}
			let found = self.dirlookup(&mut guard, name.as_bytes())?;
			guard.unlock();
			let Some((child, _off)) = found else {
				self.iput(cur)?;
				return Err(Errno::ENOENT);
			};
			self.iput(cur)?;
			cur = child;
			rest = next_rest;
		}
	}

	/// Resolves `path` to the inode it names.
	pub fn namei(&self, proc: &Process, path: &[u8]) -> EResult<InodeRef> {
		let (inode, _) = self.namex(proc, path, false)?;
		Ok(inode)
	}

	/// Resolves `path` to its parent directory's inode plus the final component's name, for
	/// callers that are about to create or remove that final entry themselves (`create`,
	/// `link`, `unlink`, `mkdir`, `mknod`).
	pub fn nameiparent(&self, proc: &Process, path: &[u8]) -> EResult<(InodeRef, Component)> {
		let (dir, name) = self.namex(proc, path, true)?;
		let name = name.ok_or(Errno::ENOENT)?;
		Ok((dir, name))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::build_basic_image;

	#[test]
	fn skipelem_rejects_components_longer_than_name_max() {
		let long = [b'a'; NAME_MAX + 1];
		assert!(matches!(skipelem(&long), Err(Errno::ENAMETOOLONG)));
	}

	#[test]
	fn skipelem_splits_and_skips_slashes() {
		let (first, rest) = skipelem(b"/foo/bar").unwrap().unwrap();
		assert_eq!(first.as_bytes(), b"foo");
		assert_eq!(rest, b"bar");
		let (second, rest) = skipelem(rest).unwrap().unwrap();
		assert_eq!(second.as_bytes(), b"bar");
		assert!(rest.is_empty());
		assert!(skipelem(b"").unwrap().is_none());
	}

	#[test]
	fn namei_resolves_through_a_nested_directory() {
		let fs = Ext2Fs::mount(build_basic_image(64)).unwrap();
		let root_ref = fs.iget(DEV, ROOT_INODE);
		let proc = Process::new(root_ref);

		let sub = fs.ialloc(FileType::Directory).unwrap();
		{
			let mut sub_guard = fs.ilock(sub).unwrap();
			sub_guard.set_links_count(2);
			fs.dirlink(&mut sub_guard, b".", sub.inum).unwrap();
			fs.dirlink(&mut sub_guard, b"..", ROOT_INODE).unwrap();
			sub_guard.unlock();
		}
		let root_for_link = fs.idup(root_ref);
		let mut root_guard = fs.ilock(root_for_link).unwrap();
		fs.dirlink(&mut root_guard, b"sub", sub.inum).unwrap();
		root_guard.unlock();
		fs.iput(root_for_link).unwrap();

		let resolved = fs.namei(&proc, b"/sub").unwrap();
		assert_eq!(resolved.inum, sub.inum);
		fs.iput(resolved).unwrap();

		let (parent, name) = fs.nameiparent(&proc, b"/sub/newfile").unwrap();
		assert_eq!(parent.inum, sub.inum);
		assert_eq!(name.as_bytes(), b"newfile");
		fs.iput(parent).unwrap();
	}

	#[test]
	fn namei_on_missing_component_returns_enoent() {
		let fs = Ext2Fs::mount(build_basic_image(64)).unwrap();
		let proc = Process::new(fs.iget(DEV, ROOT_INODE));
		assert!(matches!(fs.namei(&proc, b"/nope"), Err(Errno::ENOENT)));
	}
}
