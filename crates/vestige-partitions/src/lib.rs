//! # Vestige Partitions
//!
//! Partition-table scanning for the vestige disk-image layer.
//!
//! Given any addressable block (a raw image, a decoded container, or a
//! nested volume), the scanners here discover the partition layout and
//! annotate a [`BlockTree`] with typed, addressed regions that
//! filesystem parsers consume:
//! - **MbrScheme**: the classic PC partition table, including the
//!   extended-partition chain
//! - **SchemeRegistry**: detection probes tried in priority order
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::fs::File;
//! use vestige_core::BlockTree;
//! use vestige_partitions::SchemeRegistry;
//!
//! let mut disk = File::open("disk.img").unwrap();
//! let size = disk.metadata().unwrap().len();
//!
//! let mut tree = BlockTree::new();
//! let device = tree.add_root("device", 0, size - 1);
//!
//! let registry = SchemeRegistry::builtin();
//! if let Some(system) = registry.scan_any(&mut tree, device, &mut disk).unwrap() {
//!     for &id in tree.block(system).children() {
//!         println!("{}", tree.block(id));
//!     }
//! }
//! ```

pub mod mbr;
pub mod registry;

use std::io::{self, Read, Seek};

use vestige_core::{BlockId, BlockTree};
use vestige_stream::SliceStream;

pub use mbr::{type_description, MbrScheme, PartitionEntry};
pub use registry::{PartitionScheme, SchemeRegistry};

/// Expose one block of `stream` as an independent bounded stream
///
/// This is the hand-off point to filesystem parsers: the returned stream
/// covers exactly the block's byte range and nothing outside it.
pub fn block_stream<R: Read + Seek>(
    tree: &BlockTree,
    id: BlockId,
    stream: R,
) -> io::Result<SliceStream<R>> {
    let block = tree.block(id);
    SliceStream::new(stream, block.start(), block.size())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_block_stream_covers_exactly_the_block() {
        let mut tree = BlockTree::new();
        let device = tree.add_root("device", 0, 1023);
        let partition = tree.add_child(device, "partition", 512, 767).unwrap();

        let mut disk = vec![0u8; 1024];
        for (i, byte) in disk.iter_mut().enumerate() {
            *byte = (i / 256) as u8;
        }

        let mut stream = block_stream(&tree, partition, Cursor::new(disk)).unwrap();
        assert_eq!(stream.length(), 256);

        let mut content = Vec::new();
        stream.read_to_end(&mut content).unwrap();
        assert_eq!(content.len(), 256);
        assert!(content.iter().all(|&b| b == 2));
    }
}
