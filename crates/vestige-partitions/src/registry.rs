//! Partition-scheme registry
//!
//! Scheme decoders are tried in priority order against a candidate block;
//! the first one whose detection check claims the input performs the
//! scan. A declined detection is a recovered format mismatch, never an
//! error.

use vestige_core::{BlockId, BlockTree, ReadSeek, Result};

use crate::mbr::MbrScheme;

/// A partition-table decoder behind the registry
pub trait PartitionScheme: Send + Sync {
    /// Short scheme name, e.g. `"mbr"`
    fn name(&self) -> &'static str;

    /// Signature check against the candidate block's content
    fn detect(&self, stream: &mut dyn ReadSeek) -> Result<bool>;

    /// Populate `device` with the decoded partition tree
    fn scan(
        &self,
        tree: &mut BlockTree,
        device: BlockId,
        stream: &mut dyn ReadSeek,
    ) -> Result<BlockId>;
}

impl PartitionScheme for MbrScheme {
    fn name(&self) -> &'static str {
        "mbr"
    }

    fn detect(&self, stream: &mut dyn ReadSeek) -> Result<bool> {
        MbrScheme::detect(stream)
    }

    fn scan(
        &self,
        tree: &mut BlockTree,
        device: BlockId,
        stream: &mut dyn ReadSeek,
    ) -> Result<BlockId> {
        MbrScheme::scan(tree, device, stream)
    }
}

/// Ordered collection of partition schemes
pub struct SchemeRegistry {
    schemes: Vec<Box<dyn PartitionScheme>>,
}

impl SchemeRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            schemes: Vec::new(),
        }
    }

    /// The built-in scheme order
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(MbrScheme));
        registry
    }

    /// Append a scheme at the lowest priority
    pub fn register(&mut self, scheme: Box<dyn PartitionScheme>) {
        self.schemes.push(scheme);
    }

    /// Scan `device` with the first scheme that claims it
    ///
    /// Returns `None` when no registered scheme recognizes the content;
    /// the caller treats the block as unpartitioned.
    pub fn scan_any(
        &self,
        tree: &mut BlockTree,
        device: BlockId,
        stream: &mut dyn ReadSeek,
    ) -> Result<Option<BlockId>> {
        for scheme in &self.schemes {
            if scheme.detect(stream)? {
                return Ok(Some(scheme.scan(tree, device, stream)?));
            }
        }
        Ok(None)
    }
}

impl Default for SchemeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_unrecognized_block_scans_to_none() {
        let registry = SchemeRegistry::builtin();
        let mut tree = BlockTree::new();
        let device = tree.add_root("device", 0, 1023);
        let mut cursor = Cursor::new(vec![0u8; 1024]);

        let result = registry.scan_any(&mut tree, device, &mut cursor).unwrap();
        assert!(result.is_none());
        assert!(tree.block(device).children().is_empty());
    }

    #[test]
    fn test_mbr_claims_and_scans() {
        // One Linux primary partition in sectors 2..=3
        let mut disk = vec![0u8; 4 * 512];
        let entry = 0x1BE;
        disk[entry + 4] = 0x83;
        disk[entry + 8] = 2;
        disk[entry + 12] = 2;
        disk[0x1FE] = 0x55;
        disk[0x1FF] = 0xAA;

        let registry = SchemeRegistry::builtin();
        let mut tree = BlockTree::new();
        let device = tree.add_root("device", 0, 4 * 512 - 1);
        let mut cursor = Cursor::new(disk);

        let system = registry
            .scan_any(&mut tree, device, &mut cursor)
            .unwrap()
            .expect("mbr should claim this block");
        assert_eq!(tree.block(system).kind(), "partition_system");
        assert!(tree
            .descendants(system)
            .into_iter()
            .any(|id| tree.block(id).kind() == "partition"));
    }
}
