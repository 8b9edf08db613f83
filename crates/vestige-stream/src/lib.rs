//! # Vestige Stream
//!
//! Address-space primitives for the vestige disk-image layer.
//!
//! This crate turns files into uniformly addressable byte spaces:
//! - **SegmentSpace / SegmentReader**: an ordered set of numbered split
//!   files exposed as one continuous `Read + Seek` stream
//! - **SliceStream**: a bounded window over any stream, used to hand a
//!   partition to a filesystem parser
//! - **MmapStream**: memory-mapped fast path for single-file media
//!
//! ## Example
//!
//! ```rust,no_run
//! use vestige_stream::{numeric_suffixes, SegmentSpace};
//! use std::io::Read;
//!
//! // evidence.001, evidence.002, ... as one stream
//! let mut space = SegmentSpace::new("evidence", numeric_suffixes(3));
//! let mut reader = space.reader().unwrap();
//!
//! let mut sector = [0u8; 512];
//! reader.read_exact(&mut sector).unwrap();
//! ```

pub mod mmap;
pub mod segment;
pub mod slice;

pub use mmap::MmapStream;
pub use segment::{
    container_suffixes, numeric_suffixes, ScanResults, SegmentReader, SegmentSpace, SuffixRule,
};
pub use slice::SliceStream;
