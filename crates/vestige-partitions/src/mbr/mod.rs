//! Classic PC partition table scanner
//!
//! Decodes the boot-sector partition table and the extended-partition
//! chain (one extended boot record per link) into a tree of typed,
//! addressed blocks:
//!
//! ```text
//! device
//! └── partition_system          disk_id, copy_protected
//!     ├── mbr                   the boot sector itself
//!     ├── partition             primary entries
//!     ├── embr                  one per extended boot record
//!     ├── partition             logical entries found via recursion
//!     └── freespace             synthesized for every uncovered gap
//! ```
//!
//! Extended entries never become partition blocks of their own; only the
//! logical partitions found through them do.

pub mod types;

use std::collections::HashSet;
use std::io::{self, Read, Seek, SeekFrom};
use tracing::debug;

use vestige_core::{BlockId, BlockTree, Error, ReadSeek, Result};

pub use types::{type_description, PartitionEntry, SECTOR_SIZE};
use types::{
    BOOT_SIGNATURE, BOOT_SIGNATURE_OFFSET, COPY_PROTECTED_MARKER, COPY_PROTECTION_OFFSET,
    DISK_ID_OFFSET, ENTRY_COUNT, PARTITION_ENTRY_SIZE, PARTITION_TABLE_OFFSET,
};

/// The MBR/EBR partition scheme decoder
pub struct MbrScheme;

impl MbrScheme {
    /// Does the first sector of `stream` carry a usable partition table?
    ///
    /// Requires the boot signature, boot indicators with only bit 7
    /// meaningful, and at least one entry that is neither empty nor a
    /// GPT-protective marker. Purely observational: two calls on the same
    /// input agree and nothing is mutated beyond the stream position.
    pub fn detect(stream: &mut dyn ReadSeek) -> Result<bool> {
        stream.seek(SeekFrom::Start(0))?;
        let mut sector = [0u8; SECTOR_SIZE as usize];
        match stream.read_exact(&mut sector) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        Ok(Self::looks_like_table(&sector))
    }

    fn looks_like_table(sector: &[u8; SECTOR_SIZE as usize]) -> bool {
        let signature = u16::from_le_bytes([
            sector[BOOT_SIGNATURE_OFFSET],
            sector[BOOT_SIGNATURE_OFFSET + 1],
        ]);
        if signature != BOOT_SIGNATURE {
            return false;
        }

        let mut usable = false;
        for i in 0..ENTRY_COUNT {
            let offset = PARTITION_TABLE_OFFSET + i * PARTITION_ENTRY_SIZE;
            let boot_indicator = sector[offset];
            if boot_indicator & 0x7F != 0 {
                return false;
            }
            let type_code = sector[offset + 4];
            if type_code != 0x00 && type_code != 0xEE {
                usable = true;
            }
        }
        usable
    }

    /// Scan the partition table under `device` and populate the tree
    ///
    /// Creates a `partition_system` block covering the device, decodes the
    /// primary table and every extended boot record reachable from it,
    /// numbers the partitions in tree order, and synthesizes freespace
    /// blocks for the uncovered gaps. Returns the system block id.
    pub fn scan(
        tree: &mut BlockTree,
        device: BlockId,
        stream: &mut dyn ReadSeek,
    ) -> Result<BlockId> {
        let (device_start, device_end) = {
            let block = tree.block(device);
            (block.start(), block.end())
        };
        let system = tree.add_child(device, "partition_system", device_start, device_end)?;

        let mut visited = HashSet::new();
        Self::scan_partitions(tree, system, stream, device_start, 0, &mut visited)?;
        tree.block_mut(system).set_handled(true);

        // Number every non-extended partition in tree order and attach a
        // human-readable description.
        let mut number = 0i64;
        for id in tree.descendants(system) {
            if tree.block(id).kind() != "partition" {
                continue;
            }
            number += 1;
            let description = match tree.block(id).attr_text("type_description") {
                Some(name) => format!("Partition #{} - {}", number, name),
                None => format!(
                    "Partition #{} - type 0x{:02X}",
                    number,
                    tree.block(id).attr_int("type_code").unwrap_or(0)
                ),
            };
            let block = tree.block_mut(id);
            block.set_attr("number", number);
            block.set_attr("description", description);
        }

        tree.add_freespaces(system, SECTOR_SIZE);
        debug!(partitions = number, "partition scan complete");
        Ok(system)
    }

    /// Decode one table sector and recurse into its extended entries
    ///
    /// `base_sector` is 0 for the primary table and the extended
    /// partition's absolute sector for each recursive call. Entry start
    /// sectors are relative to the current base.
    fn scan_partitions(
        tree: &mut BlockTree,
        system: BlockId,
        stream: &mut dyn ReadSeek,
        device_start: u64,
        base_sector: u64,
        visited: &mut HashSet<u64>,
    ) -> Result<()> {
        if !visited.insert(base_sector) {
            return Err(Error::corrupt(format!(
                "extended partition chain loops back to sector {}",
                base_sector
            )));
        }

        let system_end = tree.block(system).end();
        let sector_start = device_start + base_sector * SECTOR_SIZE;
        if sector_start + SECTOR_SIZE - 1 > system_end {
            return Err(Error::corrupt(format!(
                "partition table at sector {} lies outside the device",
                base_sector
            )));
        }

        stream.seek(SeekFrom::Start(base_sector * SECTOR_SIZE))?;
        let mut sector = [0u8; SECTOR_SIZE as usize];
        stream.read_exact(&mut sector)?;

        let signature = u16::from_le_bytes([
            sector[BOOT_SIGNATURE_OFFSET],
            sector[BOOT_SIGNATURE_OFFSET + 1],
        ]);
        if signature != BOOT_SIGNATURE {
            return Err(Error::corrupt(format!(
                "missing boot signature in partition table at sector {}",
                base_sector
            )));
        }

        let table_kind = if base_sector == 0 { "mbr" } else { "embr" };
        let table_block = tree.add_child(
            system,
            table_kind,
            sector_start,
            sector_start + SECTOR_SIZE - 1,
        )?;
        tree.block_mut(table_block).set_handled(true);

        // Disk identity and copy protection live in the boot code area of
        // the outermost sector only; nested records repeat neither.
        if base_sector == 0 {
            let disk_id = u32::from_le_bytes([
                sector[DISK_ID_OFFSET],
                sector[DISK_ID_OFFSET + 1],
                sector[DISK_ID_OFFSET + 2],
                sector[DISK_ID_OFFSET + 3],
            ]);
            let protection = u16::from_le_bytes([
                sector[COPY_PROTECTION_OFFSET],
                sector[COPY_PROTECTION_OFFSET + 1],
            ]);
            let block = tree.block_mut(system);
            block.set_attr("disk_id", disk_id as i64);
            block.set_attr("copy_protected", protection == COPY_PROTECTED_MARKER);
        }

        let mut deferred = Vec::new();
        for i in 0..ENTRY_COUNT {
            let offset = PARTITION_TABLE_OFFSET + i * PARTITION_ENTRY_SIZE;
            let entry = PartitionEntry::parse(&sector[offset..offset + PARTITION_ENTRY_SIZE]);
            if entry.is_empty() {
                continue;
            }

            let absolute_sector = base_sector + entry.start_sector as u64;
            if entry.is_extended() {
                // No block for the extended entry itself; its children are
                // found through the deferred recursive scan.
                deferred.push(absolute_sector);
                continue;
            }

            let start = device_start + absolute_sector * SECTOR_SIZE;
            let end = device_start
                + (absolute_sector + entry.sector_count as u64) * SECTOR_SIZE
                - 1;
            if end > system_end {
                return Err(Error::corrupt(format!(
                    "partition at sector {} extends beyond the device",
                    absolute_sector
                )));
            }

            let id = tree.add_child(system, "partition", start, end)?;
            let block = tree.block_mut(id);
            block.set_attr("is_primary", base_sector == 0);
            block.set_attr("is_logical", base_sector != 0);
            block.set_attr("is_extended", false);
            block.set_attr("is_hidden", entry.is_hidden());
            block.set_attr("is_bootable", entry.is_bootable());
            block.set_attr("type_code", entry.type_code as i64);
            if let Some(name) = type_description(entry.type_code) {
                block.set_attr("type_description", name);
            }
            block.set_attr("start_sector", absolute_sector);
            block.set_attr("end_sector", absolute_sector + entry.sector_count as u64 - 1);
            block.set_attr("sector_count", entry.sector_count as u64);
            debug!(
                sector = absolute_sector,
                type_code = entry.type_code,
                "partition entry"
            );
        }

        for sector in deferred {
            Self::scan_partitions(tree, system, stream, device_start, sector, visited)?;
        }
        Ok(())
    }
}
