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

//! A pipe links a writing end to a reading end through a small in-memory ring buffer.
//!
//! The surrounding kernel's own pipe (`kernel::file::pipe::PipeBuffer`) backs its ring buffer
//! by a page-allocator-backed `RingBuffer` and blocks via a per-pipe [`WaitQueue`]; this is the
//! same shape scaled down to a fixed-size array, since this core has no page allocator of its
//! own to borrow from.

use crate::sync::{spin::Spin, wait_queue::WaitQueue};
use utils::errno::{AllocResult, EResult, Errno};

/// Capacity, in bytes, of a pipe's ring buffer.
pub const PIPE_BUF: usize = 4096;

struct Ring {
	buf: [u8; PIPE_BUF],
	/// Offset of the next byte to read.
	read_pos: usize,
	/// Number of unread bytes currently buffered.
	len: usize,
	/// Number of open read ends.
	readers: usize,
	/// Number of open write ends.
	writers: usize,
}

/// A pipe: a bounded byte queue with a reading end and a writing end.
pub struct Pipe {
	inner: Spin<Ring>,
	rd_queue: WaitQueue,
	wr_queue: WaitQueue,
}

impl Pipe {
	/// Creates a new pipe with one reader and one writer already attached, matching the two file
	/// descriptors `pipe(2)` hands back.
	pub fn new() -> AllocResult<Self> {
		Ok(Self {
			inner: Spin::new(Ring {
				buf: [0; PIPE_BUF],
				read_pos: 0,
				len: 0,
				readers: 1,
				writers: 1,
			}),
			rd_queue: WaitQueue::new(),
			wr_queue: WaitQueue::new(),
		})
	}

	/// Registers one more open end of the given directions (mirrors `fileclose`'s counterpart,
	/// called on `dup`).
	pub fn acquire(&self, readable: bool, writable: bool) {
		let mut inner = self.inner.lock();
		if readable {
			inner.readers += 1;
		}
		if writable {
			inner.writers += 1;
		}
	}

	/// Unregisters one open end; wakes the other side if this was the last end of its kind, so a
	/// blocked peer observes EOF/broken-pipe instead of waiting forever.
	pub fn release(&self, readable: bool, writable: bool) {
		let mut inner = self.inner.lock();
		if readable {
			inner.readers -= 1;
		}
		if writable {
			inner.writers -= 1;
		}
		drop(inner);
		self.rd_queue.wake_all();
		self.wr_queue.wake_all();
	}

	/// Reads up to `dst.len()` bytes, blocking until at least one byte is available or every
	/// writer has gone away (in which case it returns 0, i.e. EOF).
	pub fn read(&self, dst: &mut [u8]) -> EResult<usize> {
		if dst.is_empty() {
			return Ok(0);
		}
		let mut n = 0;
		self.rd_queue.wait_until(|| {
			let mut inner = self.inner.lock();
			if inner.len == 0 && inner.writers > 0 {
				return false;
			}
			n = inner.len.min(dst.len());
			for i in 0..n {
				let idx = (inner.read_pos + i) % PIPE_BUF;
				dst[i] = inner.buf[idx];
			}
			inner.read_pos = (inner.read_pos + n) % PIPE_BUF;
			inner.len -= n;
			true
		});
		self.wr_queue.wake_all();
		Ok(n)
	}

	/// Writes up to `src.len()` bytes, blocking while the ring is full and at least one reader
	/// remains. Returns `Err` once every reader has closed (a broken pipe).
	pub fn write(&self, src: &[u8]) -> EResult<usize> {
		if src.is_empty() {
			return Ok(0);
		}
		let mut n = 0;
		let mut broken = false;
		self.wr_queue.wait_until(|| {
			let mut inner = self.inner.lock();
			if inner.readers == 0 {
				broken = true;
				return true;
			}
			let free = PIPE_BUF - inner.len;
			if free == 0 {
				return false;
			}
			n = free.min(src.len());
			let write_pos = (inner.read_pos + inner.len) % PIPE_BUF;
			for i in 0..n {
				let idx = (write_pos + i) % PIPE_BUF;
				inner.buf[idx] = src[i];
			}
			inner.len += n;
			true
		});
		self.rd_queue.wake_all();
		if broken {
			return Err(Errno::EIO);
		}
		Ok(n)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn write_then_read_round_trips() {
		let pipe = Pipe::new().unwrap();
		assert_eq!(pipe.write(b"hello").unwrap(), 5);
		let mut buf = [0u8; 5];
		assert_eq!(pipe.read(&mut buf).unwrap(), 5);
		assert_eq!(&buf, b"hello");
	}

	#[test]
	fn read_returns_eof_once_every_writer_is_gone() {
		let pipe = Pipe::new().unwrap();
		pipe.release(false, true);
		let mut buf = [0u8; 4];
		assert_eq!(pipe.read(&mut buf).unwrap(), 0);
	}

	#[test]
	fn write_returns_broken_pipe_once_every_reader_is_gone() {
		let pipe = Pipe::new().unwrap();
		pipe.release(true, false);
		assert!(matches!(pipe.write(b"x"), Err(Errno::EIO)));
	}

	#[test]
	fn partial_read_drains_only_whats_buffered() {
		let pipe = Pipe::new().unwrap();
		pipe.write(b"abc").unwrap();
		let mut buf = [0u8; 1];
		assert_eq!(pipe.read(&mut buf).unwrap(), 1);
		assert_eq!(&buf, b"a");
		let mut rest = [0u8; 4];
		assert_eq!(pipe.read(&mut rest[..2]).unwrap(), 2);
		assert_eq!(&rest[..2], b"bc");
	}
}
