//! Memory-mapped read stream for single-file media

use memmap2::Mmap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// A read-only stream backed by a memory-mapped file.
///
/// Used as the fast path for single-file raw images, where every read
/// would otherwise be a syscall.
pub struct MmapStream {
    mmap: Mmap,
    position: u64,
}

impl MmapStream {
    /// Open a file with memory mapping
    ///
    /// Only regular files can be mapped; devices and pipes are rejected
    /// before the map is attempted.
    ///
    /// # Safety
    ///
    /// The map itself is `unsafe` because the kernel cannot promise the
    /// file stays unmodified; callers must not truncate the file while the
    /// stream is live.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Self::from_file(&file)
    }

    /// Map an already-open file
    pub fn from_file(file: &File) -> io::Result<Self> {
        let metadata = file.metadata()?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "only regular files can be memory-mapped",
            ));
        }

        // SAFETY: the descriptor is valid and refers to a regular file;
        // the mapping is read-only.
        let mmap = unsafe { Mmap::map(file)? };
        Ok(Self { mmap, position: 0 })
    }

    /// Length of the mapped region
    pub fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// Is the mapped region empty?
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Current read position
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes left from the current position
    pub fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.position)
    }
}

impl Read for MmapStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining() as usize;
        if remaining == 0 {
            return Ok(0);
        }

        let to_read = buf.len().min(remaining);
        let start = self.position as usize;
        buf[..to_read].copy_from_slice(&self.mmap[start..start + to_read]);
        self.position += to_read as u64;
        Ok(to_read)
    }
}

impl Seek for MmapStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => self.len() as i64 + offset,
            SeekFrom::Current(offset) => self.position as i64 + offset,
        };

        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative offset",
            ));
        }

        self.position = target as u64;
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn mapped_fixture() -> MmapStream {
        let mut tmpfile = NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..100).collect();
        tmpfile.write_all(&data).unwrap();
        tmpfile.flush().unwrap();
        MmapStream::open(tmpfile.path()).unwrap()
    }

    #[test]
    fn test_mmap_stream_basic() {
        let stream = mapped_fixture();
        assert_eq!(stream.len(), 100);
        assert_eq!(stream.position(), 0);
        assert_eq!(stream.remaining(), 100);
        assert!(!stream.is_empty());
    }

    #[test]
    fn test_mmap_stream_read() {
        let mut stream = mapped_fixture();
        let mut buf = [0u8; 10];

        let n = stream.read(&mut buf).unwrap();
        assert_eq!(n, 10);
        assert_eq!(&buf, &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(stream.position(), 10);
    }

    #[test]
    fn test_mmap_stream_seek_and_read() {
        let mut stream = mapped_fixture();

        stream.seek(SeekFrom::Start(50)).unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, &[50, 51, 52, 53, 54]);

        stream.seek(SeekFrom::End(-2)).unwrap();
        let n = stream.read(&mut buf).unwrap();
        assert_eq!(n, 2);
        assert_eq!(&buf[..2], &[98, 99]);
    }

    #[test]
    fn test_mmap_stream_negative_seek() {
        let mut stream = mapped_fixture();
        assert!(stream.seek(SeekFrom::Current(-1)).is_err());
    }
}
