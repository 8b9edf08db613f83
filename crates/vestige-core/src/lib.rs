//! # Vestige Core
//!
//! Core traits, types, and error handling for the vestige disk-image
//! virtualization layer.
//!
//! This crate provides the foundational abstractions shared by the rest of
//! the workspace:
//! - **Medium**: one uniformly addressable evidence byte space
//! - **BlockTree**: typed, addressed regions (partition systems,
//!   partitions, freespace) handed to filesystem parsers
//! - **Error**: the shared failure taxonomy (format mismatch vs.
//!   corruption vs. resource errors)
//!
//! ## Example
//!
//! ```rust
//! use vestige_core::{AttrValue, BlockTree};
//!
//! let mut tree = BlockTree::new();
//! let disk = tree.add_root("device", 0, 1_048_575);
//! let part = tree.add_child(disk, "partition", 32_256, 1_048_575).unwrap();
//! tree.block_mut(part).set_attr("is_bootable", true);
//!
//! assert_eq!(tree.block(part).attr("is_bootable"), Some(&AttrValue::Flag(true)));
//! ```

pub mod block;
pub mod error;
pub mod traits;

// Re-export commonly used items
pub use block::{AttrValue, Block, BlockId, BlockTree};
pub use error::{Error, Result};
pub use traits::{Medium, ReadSeek, ReadWriteSeek};
