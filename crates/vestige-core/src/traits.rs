//! Core traits for media access

use std::io::{Read, Seek, Write};

/// Trait for opened evidence media (raw images, decoded containers)
///
/// A `Medium` is one uniformly addressable byte space. Whether the bytes
/// come from a single file, a set of numbered split files, or a decoded
/// forensic container is invisible to the consumer.
pub trait Medium: Send {
    /// Get a human-readable identifier for this medium
    fn identify(&self) -> &str;

    /// Get the total size of the medium in bytes
    fn length(&self) -> u64;

    /// Get a readable and seekable stream over the medium content
    fn content(&mut self) -> &mut dyn ReadSeek;
}

/// Combined trait for Read + Seek
pub trait ReadSeek: Read + Seek + Send {}

/// Blanket implementation for any type that implements Read + Seek
impl<T: Read + Seek + Send> ReadSeek for T {}

/// Combined trait for Read + Write + Seek
pub trait ReadWriteSeek: Read + Write + Seek + Send {}

/// Blanket implementation for any type that implements Read + Write + Seek
impl<T: Read + Write + Seek + Send> ReadWriteSeek for T {}
