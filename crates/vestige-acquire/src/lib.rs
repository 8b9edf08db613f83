//! # Vestige Acquire
//!
//! The write side of the vestige disk-image layer: streaming acquisition
//! into the evidentiary container format decoded by
//! [`vestige_containers`].
//!
//! The writer consumes arbitrary byte buffers, chunks and optionally
//! compresses them, maintains the chunk-offset tables and per-section
//! checksums, rotates segment files against a configured size budget, and
//! seals the stream with a whole-content digest.
//!
//! ## Example
//!
//! ```rust,no_run
//! use vestige_acquire::{EwfWriter, EwfWriterOptions};
//!
//! let mut writer = EwfWriter::create("evidence", EwfWriterOptions::default()).unwrap();
//! writer.write(&[0u8; 4096]).unwrap();
//! let receipt = writer.close().unwrap();
//!
//! println!("{} bytes in {} segment(s), md5 {}",
//!     receipt.bytes_acquired, receipt.segments, receipt.digest_hex());
//! ```

pub mod error;
pub mod ewf;

pub use error::{AcquireError, Result};
pub use ewf::{AcquireReceipt, EwfWriter, EwfWriterOptions};
