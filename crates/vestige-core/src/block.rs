//! Block tree: typed, addressed regions of an evidence medium
//!
//! A [`Block`] describes one addressable byte range of a physical or
//! logical device: a partition system, a boot sector, a partition, a gap.
//! Blocks form a tree owned by a [`BlockTree`] arena; nodes are addressed
//! by [`BlockId`] and keep an explicit parent index plus an ordered child
//! list, so the tree can be walked in both directions without reference
//! cycles.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// Index of a block inside its owning [`BlockTree`]
pub type BlockId = usize;

/// One value in a block's attribute bag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Free-form text, e.g. a type description
    Text(String),
    /// Signed integer, wide enough for sector numbers and type codes
    Int(i64),
    /// Boolean flag, e.g. `is_bootable`
    Flag(bool),
}

impl AttrValue {
    /// Get the text value, if this is a text attribute
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the integer value, if this is an integer attribute
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the flag value, if this is a boolean attribute
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            AttrValue::Flag(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Text(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<u64> for AttrValue {
    fn from(v: u64) -> Self {
        AttrValue::Int(v as i64)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Flag(v)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Text(s) => write!(f, "{}", s),
            AttrValue::Int(v) => write!(f, "{}", v),
            AttrValue::Flag(v) => write!(f, "{}", v),
        }
    }
}

/// A typed, addressed node in the device/partition tree
///
/// The byte range `[start, end]` is inclusive; `size = end - start + 1`.
/// A child's range always lies within its parent's range.
#[derive(Debug, Clone)]
pub struct Block {
    kind: String,
    start: u64,
    end: u64,
    attrs: BTreeMap<String, AttrValue>,
    handled: bool,
    parent: Option<BlockId>,
    children: Vec<BlockId>,
}

impl Block {
    fn new(kind: &str, start: u64, end: u64, parent: Option<BlockId>) -> Self {
        Self {
            kind: kind.to_string(),
            start,
            end,
            attrs: BTreeMap::new(),
            handled: false,
            parent,
            children: Vec::new(),
        }
    }

    /// Get the type tag, e.g. `"partition"` or `"freespace"`
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Get the absolute start address in bytes
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Get the absolute end address in bytes (inclusive)
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Get the size of the range in bytes
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Get a named attribute
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    /// Get a text attribute
    pub fn attr_text(&self, name: &str) -> Option<&str> {
        self.attr(name).and_then(AttrValue::as_text)
    }

    /// Get an integer attribute
    pub fn attr_int(&self, name: &str) -> Option<i64> {
        self.attr(name).and_then(AttrValue::as_int)
    }

    /// Get a flag attribute
    pub fn attr_flag(&self, name: &str) -> Option<bool> {
        self.attr(name).and_then(AttrValue::as_flag)
    }

    /// Set a named attribute
    pub fn set_attr(&mut self, name: &str, value: impl Into<AttrValue>) {
        self.attrs.insert(name.to_string(), value.into());
    }

    /// Iterate over all attributes in name order
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Has a decoder claimed this block?
    pub fn is_handled(&self) -> bool {
        self.handled
    }

    /// Mark this block as claimed by a decoder
    pub fn set_handled(&mut self, handled: bool) {
        self.handled = handled;
    }

    /// Get the parent block id, if any
    pub fn parent(&self) -> Option<BlockId> {
        self.parent
    }

    /// Get the ordered child block ids
    pub fn children(&self) -> &[BlockId] {
        &self.children
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [0x{:08X}..0x{:08X}, {} bytes]",
            self.kind,
            self.start,
            self.end,
            self.size()
        )
    }
}

/// Arena holding one tree of blocks
///
/// Node ids are stable for the lifetime of the tree; blocks are never
/// removed. After a scan completes the tree is treated as read-only
/// except for attaching freespace blocks and descriptions.
#[derive(Debug, Default, Clone)]
pub struct BlockTree {
    nodes: Vec<Block>,
}

impl BlockTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks in the tree
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Is the tree empty?
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Create a parentless block covering `[start, end]`
    pub fn add_root(&mut self, kind: &str, start: u64, end: u64) -> BlockId {
        let id = self.nodes.len();
        self.nodes.push(Block::new(kind, start, end, None));
        id
    }

    /// Create a block as the last child of `parent`
    ///
    /// Fails if the child range does not lie within the parent's range.
    pub fn add_child(&mut self, parent: BlockId, kind: &str, start: u64, end: u64) -> Result<BlockId> {
        let p = &self.nodes[parent];
        if start < p.start || end > p.end || start > end {
            return Err(Error::invalid_operation(format!(
                "child range 0x{:X}..0x{:X} outside parent {} range 0x{:X}..0x{:X}",
                start, end, p.kind, p.start, p.end
            )));
        }
        let id = self.nodes.len();
        self.nodes.push(Block::new(kind, start, end, Some(parent)));
        self.nodes[parent].children.push(id);
        Ok(id)
    }

    /// Get a block by id
    ///
    /// Ids are only ever produced by this tree, so an out-of-range id is a
    /// programming error and panics.
    pub fn block(&self, id: BlockId) -> &Block {
        &self.nodes[id]
    }

    /// Get a block by id, mutably
    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.nodes[id]
    }

    /// Ids of all blocks under `id` in depth-first, sibling order
    ///
    /// `id` itself is not included.
    pub fn descendants(&self, id: BlockId) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut stack: Vec<BlockId> = self.nodes[id].children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.nodes[next].children.iter().rev());
        }
        out
    }

    /// Synthesize `freespace` children for every gap in `id`'s range not
    /// covered by an existing child
    ///
    /// Each freespace block carries `start_sector` and `end_sector`
    /// attributes derived with `sector_size`. Returns the new ids.
    pub fn add_freespaces(&mut self, id: BlockId, sector_size: u64) -> Vec<BlockId> {
        let (range_start, range_end) = {
            let b = &self.nodes[id];
            (b.start, b.end)
        };

        // Merge child ranges; children may touch but partitions never overlap.
        let mut covered: Vec<(u64, u64)> = self.nodes[id]
            .children
            .iter()
            .map(|&c| (self.nodes[c].start, self.nodes[c].end))
            .collect();
        covered.sort_unstable();

        let mut gaps: Vec<(u64, u64)> = Vec::new();
        let mut cursor = range_start;
        for (s, e) in covered {
            if s > cursor {
                gaps.push((cursor, s - 1));
            }
            cursor = cursor.max(e.saturating_add(1));
        }
        if cursor <= range_end {
            gaps.push((cursor, range_end));
        }

        let mut created = Vec::with_capacity(gaps.len());
        for (s, e) in gaps {
            // Gap ranges come from the parent's own range, so add_child
            // cannot fail here.
            let fid = self
                .add_child(id, "freespace", s, e)
                .expect("freespace range within parent");
            let block = self.block_mut(fid);
            block.set_attr("start_sector", s / sector_size);
            block.set_attr("end_sector", e / sector_size);
            created.push(fid);
        }
        created
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_creation() {
        let mut tree = BlockTree::new();
        let root = tree.add_root("partition_system", 0, 1023);

        assert_eq!(tree.block(root).kind(), "partition_system");
        assert_eq!(tree.block(root).start(), 0);
        assert_eq!(tree.block(root).end(), 1023);
        assert_eq!(tree.block(root).size(), 1024);
        assert!(tree.block(root).parent().is_none());
        assert!(tree.block(root).children().is_empty());
    }

    #[test]
    fn test_child_containment() {
        let mut tree = BlockTree::new();
        let root = tree.add_root("partition_system", 0, 1023);

        let child = tree.add_child(root, "partition", 512, 1023).unwrap();
        assert_eq!(tree.block(child).parent(), Some(root));
        assert_eq!(tree.block(root).children(), &[child]);

        // Out of parent bounds
        assert!(tree.add_child(root, "partition", 512, 2048).is_err());
        // Inverted range
        assert!(tree.add_child(root, "partition", 600, 500).is_err());
    }

    #[test]
    fn test_attributes() {
        let mut tree = BlockTree::new();
        let id = tree.add_root("partition", 0, 511);

        let block = tree.block_mut(id);
        block.set_attr("is_bootable", true);
        block.set_attr("type_description", "NTFS/exFAT/HPFS");
        block.set_attr("start_sector", 2048u64);

        let block = tree.block(id);
        assert_eq!(block.attr_flag("is_bootable"), Some(true));
        assert_eq!(block.attr_text("type_description"), Some("NTFS/exFAT/HPFS"));
        assert_eq!(block.attr_int("start_sector"), Some(2048));
        assert!(block.attr("missing").is_none());
        // Wrong type accessor
        assert!(block.attr_text("is_bootable").is_none());
    }

    #[test]
    fn test_handled_flag() {
        let mut tree = BlockTree::new();
        let id = tree.add_root("mbr", 0, 511);

        assert!(!tree.block(id).is_handled());
        tree.block_mut(id).set_handled(true);
        assert!(tree.block(id).is_handled());
    }

    #[test]
    fn test_descendants_order() {
        let mut tree = BlockTree::new();
        let root = tree.add_root("partition_system", 0, 4095);
        let a = tree.add_child(root, "partition", 0, 1023).unwrap();
        let b = tree.add_child(root, "partition", 1024, 4095).unwrap();
        let b1 = tree.add_child(b, "partition", 1024, 2047).unwrap();

        assert_eq!(tree.descendants(root), vec![a, b, b1]);
    }

    #[test]
    fn test_add_freespaces_gaps() {
        let mut tree = BlockTree::new();
        // 8 sectors of 512 bytes
        let root = tree.add_root("partition_system", 0, 4095);
        tree.add_child(root, "mbr", 0, 511).unwrap();
        tree.add_child(root, "partition", 1024, 2047).unwrap();

        let created = tree.add_freespaces(root, 512);
        assert_eq!(created.len(), 2);

        let first = tree.block(created[0]);
        assert_eq!(first.kind(), "freespace");
        assert_eq!((first.start(), first.end()), (512, 1023));
        assert_eq!(first.attr_int("start_sector"), Some(1));
        assert_eq!(first.attr_int("end_sector"), Some(1));

        let second = tree.block(created[1]);
        assert_eq!((second.start(), second.end()), (2048, 4095));
        assert_eq!(second.attr_int("start_sector"), Some(4));
        assert_eq!(second.attr_int("end_sector"), Some(7));
    }

    #[test]
    fn test_add_freespaces_full_coverage() {
        let mut tree = BlockTree::new();
        let root = tree.add_root("partition_system", 0, 4095);
        tree.add_child(root, "partition", 0, 4095).unwrap();

        let created = tree.add_freespaces(root, 512);
        assert!(created.is_empty());
    }

    #[test]
    fn test_freespace_union_equals_parent_range() {
        let mut tree = BlockTree::new();
        let root = tree.add_root("partition_system", 0, 10239);
        tree.add_child(root, "mbr", 0, 511).unwrap();
        tree.add_child(root, "partition", 2048, 4095).unwrap();
        tree.add_child(root, "partition", 6144, 8191).unwrap();
        tree.add_freespaces(root, 512);

        let mut total: u64 = 0;
        for &c in tree.block(root).children() {
            total += tree.block(c).size();
        }
        assert_eq!(total, tree.block(root).size());
    }
}
