//! Raw media: sector images with no container metadata
//!
//! A raw medium is either a single file (`disk.img`, `disk.dd`) or a set
//! of numbered split files (`disk.001`, `disk.002`, …) presented through a
//! segment address space.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use vestige_core::{Medium, ReadSeek, Result};
use vestige_stream::{MmapStream, SegmentSpace, SuffixRule};

/// Configuration for opening a raw medium
#[derive(Debug, Clone)]
pub struct RawConfig {
    /// Memory-map single-file media instead of buffered reads
    pub use_mmap: bool,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self { use_mmap: true }
    }
}

/// A raw sector image behind the `Medium` interface
pub struct RawMedium {
    stream: Box<dyn ReadSeek>,
    length: u64,
    identifier: String,
}

impl RawMedium {
    /// Open a single-file raw medium
    pub fn open(path: &Path, config: RawConfig) -> Result<Self> {
        let file = File::open(path)?;
        let length = file.metadata()?.len();

        let stream: Box<dyn ReadSeek> = if config.use_mmap {
            Box::new(MmapStream::from_file(&file)?)
        } else {
            Box::new(file)
        };

        Ok(Self {
            stream,
            length,
            identifier: "raw image".to_string(),
        })
    }

    /// Open a split raw medium through a segment naming rule
    ///
    /// `base` is the path without the segment suffix; the rule maps each
    /// index to the suffix to probe (`0 -> "001"` and so on).
    pub fn open_split(base: impl AsRef<Path>, rule: SuffixRule) -> Result<Self> {
        let mut space = SegmentSpace::new(base.as_ref(), rule);
        let segments = space.segment_count()?;
        let length = space.total_size()?;
        let reader = space.reader()?;

        Ok(Self {
            stream: Box::new(reader),
            length,
            identifier: format!("split raw image ({} segments)", segments),
        })
    }

    /// Wrap any readable and seekable stream of a known length
    pub fn from_stream<R: Read + std::io::Seek + Send + 'static>(stream: R, length: u64) -> Self {
        Self {
            stream: Box::new(stream),
            length,
            identifier: "raw image".to_string(),
        }
    }
}

impl Medium for RawMedium {
    fn identify(&self) -> &str {
        &self.identifier
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn content(&mut self) -> &mut dyn ReadSeek {
        &mut *self.stream
    }
}
