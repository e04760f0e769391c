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

//! A small UNIX-style teaching kernel's filesystem core: block cache, ext2 on-disk driver,
//! inode cache, open-file table, device switch, path resolver, and syscall surface.
//!
//! This crate is meant to be embedded, not run standalone: a booting kernel supplies a
//! [`block::BlockDevice`] and a [`log::Sink`], then drives everything else through
//! [`syscall::Kernel`]. The `std` feature additionally builds [`testing`], an in-memory device
//! and image builder used by this crate's own test suite.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod block;
pub mod config;
pub mod devsw;
pub mod ext2;
pub mod icache;
pub mod log;
pub mod mbr;
pub mod namei;
pub mod open_file;
pub mod pipe;
pub mod sync;
pub mod syscall;

#[cfg(any(test, feature = "std"))]
pub mod testing;

pub use ext2::Ext2Fs;
pub use namei::Process;
pub use syscall::Kernel;
