//! # Vestige Containers
//!
//! Container format handlers for the vestige disk-image layer.
//!
//! This crate decodes evidence media into one addressable byte space:
//! - **EwfMedium**: the chunked, compressed, checksummed evidentiary
//!   container format (read side; the write side lives in
//!   `vestige-acquire`)
//! - **RawMedium**: plain sector images, single-file or split
//! - **FormatRegistry**: detection probes tried in priority order
//!
//! ## Example
//!
//! ```rust,no_run
//! use vestige_containers::FormatRegistry;
//! use std::path::Path;
//!
//! let registry = FormatRegistry::builtin();
//! let mut medium = registry.open(Path::new("evidence.E01")).unwrap();
//!
//! println!("format: {}", medium.identify());
//! println!("size:   {} bytes", medium.length());
//! ```

pub mod ewf;
pub mod raw;
pub mod registry;

pub use ewf::{is_ewf_file, AcquisitionInfo, CompressionLevel, EwfMedium};
pub use raw::{RawConfig, RawMedium};
pub use registry::{FormatProbe, FormatRegistry};
