//! Segment address space: numbered split files as one logical stream
//!
//! A split image is an ordered set of files, `image.001`, `image.002`, …,
//! that together hold one contiguous byte space. [`SegmentSpace`] discovers
//! how many segments exist and how large each is; [`SegmentReader`] then
//! exposes the concatenation as a single `Read + Seek` stream.
//!
//! The naming policy is not built in: callers supply a pure
//! `index -> suffix` function ([`SuffixRule`]). Stock rules for zero-padded
//! numeric suffixes and the vendor container lettering scheme are provided.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;

use tracing::debug;
use vestige_core::{Error, Result};

/// Pure naming rule mapping a zero-based segment index to a file suffix
pub type SuffixRule = Box<dyn Fn(usize) -> String + Send + Sync>;

/// Zero-padded numeric suffixes: index 0 maps to `"001"`, 1 to `"002"`, …
pub fn numeric_suffixes(width: usize) -> SuffixRule {
    Box::new(move |index| format!("{:0width$}", index + 1, width = width))
}

/// Vendor container suffixes: `E01` through `E99`, then `EAA`, `EAB`, …
/// rolling into `FAA` after `EZZ`
pub fn container_suffixes() -> SuffixRule {
    Box::new(|index| {
        if index < 99 {
            format!("E{:02}", index + 1)
        } else {
            let n = index - 99;
            let c0 = b'E' + (n / 676) as u8;
            let c1 = b'A' + ((n / 26) % 26) as u8;
            let c2 = b'A' + (n % 26) as u8;
            format!("{}{}{}", c0 as char, c1 as char, c2 as char)
        }
    })
}

/// Results of a completed segment scan
#[derive(Debug, Clone)]
pub struct ScanResults {
    /// Byte size of each segment, in index order
    pub sizes: Vec<u64>,
    /// Sum of all segment sizes
    pub total: u64,
}

/// Scan state: the lazy-load contract made explicit
///
/// Every accessor goes through `ensure_scanned`, so "has this space been
/// probed yet" is visible in the type instead of hidden mutable state.
enum ScanState {
    Unscanned,
    Scanned(ScanResults),
}

/// An ordered set of numbered segment files forming one address space
pub struct SegmentSpace {
    base: PathBuf,
    rule: SuffixRule,
    state: ScanState,
}

impl SegmentSpace {
    /// Create a space over existing segment files
    ///
    /// `base` is the path without its segment suffix; segment `i` is probed
    /// at `base.<rule(i)>`. Nothing is opened until the first scan.
    pub fn new(base: impl Into<PathBuf>, rule: SuffixRule) -> Self {
        Self {
            base: base.into(),
            rule,
            state: ScanState::Unscanned,
        }
    }

    /// Start an empty space for a write session
    ///
    /// No probing happens; segments are appended with [`add_segment`].
    ///
    /// [`add_segment`]: SegmentSpace::add_segment
    pub fn create(base: impl Into<PathBuf>, rule: SuffixRule) -> Self {
        Self {
            base: base.into(),
            rule,
            state: ScanState::Scanned(ScanResults {
                sizes: Vec::new(),
                total: 0,
            }),
        }
    }

    /// Path of segment `index` under the naming rule
    pub fn segment_path(&self, index: usize) -> PathBuf {
        let mut name = self.base.as_os_str().to_os_string();
        name.push(".");
        name.push((self.rule)(index));
        PathBuf::from(name)
    }

    /// Probe segment files starting at index 0 and record their sizes
    ///
    /// Stops at the first missing index. Fails with `SegmentNotFound` if
    /// even the first segment is absent. Idempotent: a second call is a
    /// no-op.
    pub fn ensure_scanned(&mut self) -> Result<()> {
        if matches!(self.state, ScanState::Scanned(_)) {
            return Ok(());
        }

        let mut sizes = Vec::new();
        loop {
            let path = self.segment_path(sizes.len());
            match std::fs::metadata(&path) {
                Ok(meta) => sizes.push(meta.len()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => break,
                Err(e) => return Err(e.into()),
            }
        }

        if sizes.is_empty() {
            return Err(Error::segment_not_found(
                self.segment_path(0).display().to_string(),
            ));
        }

        let total = sizes.iter().sum();
        debug!(segments = sizes.len(), total, "segment scan complete");
        self.state = ScanState::Scanned(ScanResults { sizes, total });
        Ok(())
    }

    fn results(&mut self) -> Result<&ScanResults> {
        self.ensure_scanned()?;
        match &self.state {
            ScanState::Scanned(r) => Ok(r),
            ScanState::Unscanned => unreachable!("ensure_scanned left space unscanned"),
        }
    }

    /// Number of segments found by the scan
    pub fn segment_count(&mut self) -> Result<usize> {
        Ok(self.results()?.sizes.len())
    }

    /// Total logical size: the sum of all segment sizes
    pub fn total_size(&mut self) -> Result<u64> {
        Ok(self.results()?.total)
    }

    /// Byte size of segment `index`
    pub fn segment_size(&mut self, index: usize) -> Result<u64> {
        let results = self.results()?;
        results
            .sizes
            .get(index)
            .copied()
            .ok_or(Error::IndexOutOfRange {
                index,
                count: results.sizes.len(),
            })
    }

    /// Open a fresh reader bound to segment `index`
    pub fn new_reader(&mut self, index: usize) -> Result<File> {
        let count = self.segment_count()?;
        if index >= count {
            return Err(Error::IndexOutOfRange { index, count });
        }
        Ok(File::open(self.segment_path(index))?)
    }

    /// Create the next numbered segment file for a write session
    ///
    /// Returns the new segment's index and a read-write stream bound to it.
    pub fn add_segment(&mut self) -> Result<(usize, File)> {
        // A brand-new write destination legitimately has no segments yet.
        if matches!(self.state, ScanState::Unscanned) {
            match self.ensure_scanned() {
                Ok(()) => {}
                Err(Error::SegmentNotFound(_)) => {
                    self.state = ScanState::Scanned(ScanResults {
                        sizes: Vec::new(),
                        total: 0,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let index = self.segment_count()?;
        let path = self.segment_path(index);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        debug!(index, path = %path.display(), "segment created");

        if let ScanState::Scanned(ref mut results) = self.state {
            results.sizes.push(0);
        }
        Ok((index, file))
    }

    /// Record the final size of a segment written during this session
    pub fn record_segment_size(&mut self, index: usize, size: u64) -> Result<()> {
        let results = match &mut self.state {
            ScanState::Scanned(r) => r,
            ScanState::Unscanned => {
                return Err(Error::invalid_operation(
                    "cannot record a segment size before scanning",
                ))
            }
        };
        let count = results.sizes.len();
        let slot = results
            .sizes
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange { index, count })?;
        *slot = size;
        results.total = results.sizes.iter().sum();
        Ok(())
    }

    /// Build a composing reader over the whole address space
    pub fn reader(&mut self) -> Result<SegmentReader> {
        self.ensure_scanned()?;
        let results = self.results()?;
        let sizes = results.sizes.clone();
        let total = results.total;
        let paths = (0..sizes.len()).map(|i| self.segment_path(i)).collect();
        Ok(SegmentReader {
            paths,
            sizes,
            total,
            standard_size: 0,
            position: 0,
            current_index: 0,
            current: None,
        }
        .with_standard_size())
    }
}

/// A `Read + Seek` stream over the concatenation of all segments
///
/// Segment sizes are assumed uniform except for the last segment, so the
/// segment holding a logical offset is `offset / standard_size`. Crossing a
/// boundary during a read switches streams lazily: the next segment is
/// opened only once the current one is exhausted.
pub struct SegmentReader {
    paths: Vec<PathBuf>,
    sizes: Vec<u64>,
    total: u64,
    standard_size: u64,
    position: u64,
    current_index: usize,
    current: Option<File>,
}

impl SegmentReader {
    fn with_standard_size(mut self) -> Self {
        self.standard_size = self.sizes.first().copied().unwrap_or(0);
        self
    }

    /// Current logical position
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Total logical size of the address space
    pub fn total_size(&self) -> u64 {
        self.total
    }

    fn index_for(&self, offset: u64) -> usize {
        if self.standard_size == 0 {
            return 0;
        }
        ((offset / self.standard_size) as usize).min(self.paths.len() - 1)
    }

    fn segment_start(&self, index: usize) -> u64 {
        self.standard_size * index as u64
    }

    /// Open segment `index` and position it at the in-segment offset for
    /// the current logical position
    fn open_at(&mut self, index: usize) -> io::Result<()> {
        let mut file = File::open(&self.paths[index])?;
        let in_offset = self.position - self.segment_start(index);
        file.seek(SeekFrom::Start(in_offset))?;
        self.current = Some(file);
        self.current_index = index;
        Ok(())
    }
}

impl Read for SegmentReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < buf.len() && self.position < self.total {
            let index = self.index_for(self.position);
            if self.current.is_none() || self.current_index != index {
                self.open_at(index)?;
            }

            let in_offset = self.position - self.segment_start(index);
            let remaining_in_segment = self.sizes[index].saturating_sub(in_offset);
            if remaining_in_segment == 0 {
                // Only reachable when a middle segment is smaller than the
                // standard size, which the scan contract rules out.
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "segment sizes are not uniform",
                ));
            }

            let remaining_total = self.total - self.position;
            let want = (buf.len() - written)
                .min(remaining_in_segment as usize)
                .min(remaining_total as usize);

            let stream = self.current.as_mut().expect("segment stream bound");
            let n = stream.read(&mut buf[written..written + want])?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "segment {} shorter than its scanned size",
                        self.current_index
                    ),
                ));
            }
            written += n;
            self.position += n as u64;
        }
        Ok(written)
    }
}

impl Seek for SegmentReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(offset) => self.position as i64 + offset,
            SeekFrom::End(offset) => self.total as i64 + offset,
        };

        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative offset",
            ));
        }
        let target = target as u64;
        if target > self.total {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek beyond the end of the address space",
            ));
        }

        self.position = target;
        if self.current.is_some() {
            let index = self.index_for(target);
            if index != self.current_index {
                self.open_at(index)?;
            } else {
                let in_offset = target - self.segment_start(index);
                self.current
                    .as_mut()
                    .expect("segment stream bound")
                    .seek(SeekFrom::Start(in_offset))?;
            }
        }
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    /// Write a split image: 10 + 10 + 5 bytes of 0..25
    fn create_split_image(dir: &TempDir) -> PathBuf {
        let base = dir.path().join("evidence");
        let data: Vec<u8> = (0..25).collect();
        for (i, chunk) in data.chunks(10).enumerate() {
            let path = PathBuf::from(format!("{}.{:03}", base.display(), i + 1));
            let mut f = File::create(path).unwrap();
            f.write_all(chunk).unwrap();
        }
        base
    }

    #[test]
    fn test_numeric_suffixes() {
        let rule = numeric_suffixes(3);
        assert_eq!(rule(0), "001");
        assert_eq!(rule(1), "002");
        assert_eq!(rule(99), "100");
    }

    #[test]
    fn test_container_suffixes() {
        let rule = container_suffixes();
        assert_eq!(rule(0), "E01");
        assert_eq!(rule(98), "E99");
        assert_eq!(rule(99), "EAA");
        assert_eq!(rule(100), "EAB");
        assert_eq!(rule(99 + 26), "EBA");
        assert_eq!(rule(99 + 676), "FAA");
    }

    #[test]
    fn test_scan_discovers_segments() {
        let dir = TempDir::new().unwrap();
        let base = create_split_image(&dir);

        let mut space = SegmentSpace::new(&base, numeric_suffixes(3));
        assert_eq!(space.segment_count().unwrap(), 3);
        assert_eq!(space.total_size().unwrap(), 25);
        assert_eq!(space.segment_size(0).unwrap(), 10);
        assert_eq!(space.segment_size(2).unwrap(), 5);
    }

    #[test]
    fn test_scan_idempotent() {
        let dir = TempDir::new().unwrap();
        let base = create_split_image(&dir);

        let mut space = SegmentSpace::new(&base, numeric_suffixes(3));
        space.ensure_scanned().unwrap();
        // Removing a later segment after the scan must not change results.
        std::fs::remove_file(space.segment_path(2)).unwrap();
        space.ensure_scanned().unwrap();
        assert_eq!(space.segment_count().unwrap(), 3);
    }

    #[test]
    fn test_missing_first_segment() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("nothing");

        let mut space = SegmentSpace::new(&base, numeric_suffixes(3));
        match space.ensure_scanned() {
            Err(Error::SegmentNotFound(_)) => {}
            other => panic!("expected SegmentNotFound, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_new_reader_out_of_range() {
        let dir = TempDir::new().unwrap();
        let base = create_split_image(&dir);

        let mut space = SegmentSpace::new(&base, numeric_suffixes(3));
        assert!(space.new_reader(2).is_ok());
        match space.new_reader(3) {
            Err(Error::IndexOutOfRange { index: 3, count: 3 }) => {}
            other => panic!("expected IndexOutOfRange, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_boundary_transparency() {
        let dir = TempDir::new().unwrap();
        let base = create_split_image(&dir);

        let mut space = SegmentSpace::new(&base, numeric_suffixes(3));
        let mut reader = space.reader().unwrap();

        // Reading one byte at every offset matches the logical stream,
        // wherever the segment boundaries fall.
        for offset in 0..25u64 {
            reader.seek(SeekFrom::Start(offset)).unwrap();
            let mut byte = [0u8; 1];
            reader.read_exact(&mut byte).unwrap();
            assert_eq!(byte[0], offset as u8, "offset {}", offset);
        }
    }

    #[test]
    fn test_read_spans_segments() {
        let dir = TempDir::new().unwrap();
        let base = create_split_image(&dir);

        let mut space = SegmentSpace::new(&base, numeric_suffixes(3));
        let mut reader = space.reader().unwrap();

        reader.seek(SeekFrom::Start(8)).unwrap();
        let mut buf = [0u8; 6];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, &[8, 9, 10, 11, 12, 13]);

        // A single read over all three segments
        reader.seek(SeekFrom::Start(0)).unwrap();
        let mut all = Vec::new();
        reader.read_to_end(&mut all).unwrap();
        assert_eq!(all, (0..25).collect::<Vec<u8>>());
    }

    #[test]
    fn test_read_short_only_at_end() {
        let dir = TempDir::new().unwrap();
        let base = create_split_image(&dir);

        let mut space = SegmentSpace::new(&base, numeric_suffixes(3));
        let mut reader = space.reader().unwrap();

        reader.seek(SeekFrom::Start(20)).unwrap();
        let mut buf = [0u8; 10];
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf[..5], &[20, 21, 22, 23, 24]);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_seek_whence_resolution() {
        let dir = TempDir::new().unwrap();
        let base = create_split_image(&dir);

        let mut space = SegmentSpace::new(&base, numeric_suffixes(3));
        let mut reader = space.reader().unwrap();

        assert_eq!(reader.seek(SeekFrom::End(-5)).unwrap(), 20);
        assert_eq!(reader.seek(SeekFrom::Current(-10)).unwrap(), 10);
        assert_eq!(reader.seek(SeekFrom::Current(5)).unwrap(), 15);

        assert!(reader.seek(SeekFrom::Current(-100)).is_err());
        assert!(reader.seek(SeekFrom::Start(26)).is_err());
        // Seeking exactly to the end is allowed and reads nothing.
        assert_eq!(reader.seek(SeekFrom::End(0)).unwrap(), 25);
        let mut buf = [0u8; 1];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_write_session_append() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("acquired");

        let mut space = SegmentSpace::create(&base, numeric_suffixes(3));
        let (index, mut file) = space.add_segment().unwrap();
        assert_eq!(index, 0);
        file.write_all(b"hello").unwrap();
        space.record_segment_size(0, 5).unwrap();

        let (index, mut file) = space.add_segment().unwrap();
        assert_eq!(index, 1);
        file.write_all(b"world").unwrap();
        space.record_segment_size(1, 5).unwrap();

        assert_eq!(space.total_size().unwrap(), 10);
        let mut reader = space.reader().unwrap();
        let mut all = String::new();
        reader.read_to_string(&mut all).unwrap();
        assert_eq!(all, "helloworld");
    }
}
