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

//! The MBR partition reader (§6), an external collaborator narrowed to exactly what this crate
//! needs from it: the starting LBA of the first partition.
//!
//! A real kernel's MBR parser also dispatches by partition type (FAT, Linux, ...); that
//! dispatch is out of scope here, per §1 — this crate only ever mounts ext2.

use crate::block::BlockDevice;
use utils::errno::{EResult, Errno};

/// Boot-sector signature at byte offset 510.
const BOOT_SIGNATURE: u16 = 0xaa55;

/// Byte offset of the first partition table entry within the boot sector.
const PART_TABLE_OFFSET: usize = 0x1be;

/// Size in bytes of one partition table entry.
const PART_ENTRY_SIZE: usize = 16;

/// Byte offset, within a partition entry, of the little-endian LBA start field.
const LBA_START_OFFSET: usize = 8;

/// A parsed partition table entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartitionEntry {
	/// Starting LBA of the partition, in 512-byte sectors.
	pub lba_start: u32,
	/// Number of sectors in the partition.
	pub sector_count: u32,
}

/// A parsed MBR boot sector.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mbr {
	/// The four primary partition table entries.
	pub partitions: [PartitionEntry; 4],
}

impl Mbr {
	/// Reads and parses the boot sector (block 0) of `device`.
	pub fn read<D: BlockDevice>(device: &D) -> EResult<Self> {
		let mut sector = [0u8; crate::config::BLOCK_SIZE];
		device.read_block(0, &mut sector)?;
		if u16::from_le_bytes([sector[510], sector[511]]) != BOOT_SIGNATURE {
			return Err(Errno::EUCLEAN);
		}
		let mut partitions = [PartitionEntry::default(); 4];
		for (i, part) in partitions.iter_mut().enumerate() {
			let off = PART_TABLE_OFFSET + i * PART_ENTRY_SIZE;
			let lba_start = u32::from_le_bytes(
				sector[off + LBA_START_OFFSET..off + LBA_START_OFFSET + 4]
					.try_into()
					.unwrap(),
			);
			let sector_count = u32::from_le_bytes(
				sector[off + LBA_START_OFFSET + 4..off + LBA_START_OFFSET + 8]
					.try_into()
					.unwrap(),
			);
			*part = PartitionEntry {
				lba_start,
				sector_count,
			};
		}
		Ok(Self {
			partitions,
		})
	}

	/// Computes `partition_start` (§6) for the first partition: the LBA, in 512-byte sectors,
	/// converted to [`crate::config::BLOCK_SIZE`]-byte blocks.
	pub fn partition_start(&self) -> u32 {
		self.partitions[0].lba_start / crate::config::SECTORS_PER_BLOCK
	}
}
