//! Bounded window over a subset of a stream

use std::io::{self, Read, Seek, SeekFrom};

/// A stream exposing only `[start, start + length)` of an underlying
/// stream.
///
/// This is how a partition or other block is handed to a filesystem parser
/// as an independent stream without copying: the parser sees offsets
/// `0..length` and cannot read outside the window.
///
/// # Example
///
/// ```rust
/// use vestige_stream::SliceStream;
/// use std::io::{Cursor, Read};
///
/// let disk = Cursor::new((0u8..=255).collect::<Vec<u8>>());
/// let mut partition = SliceStream::new(disk, 64, 32).unwrap();
///
/// let mut first = [0u8; 4];
/// partition.read_exact(&mut first).unwrap();
/// assert_eq!(first, [64, 65, 66, 67]);
/// ```
pub struct SliceStream<R: Read + Seek> {
    inner: R,
    start: u64,
    length: u64,
    position: u64,
}

impl<R: Read + Seek> SliceStream<R> {
    /// Create a window of `length` bytes beginning at `start`
    ///
    /// Fails if the underlying stream cannot seek to `start`.
    pub fn new(mut inner: R, start: u64, length: u64) -> io::Result<Self> {
        inner.seek(SeekFrom::Start(start))?;
        Ok(Self {
            inner,
            start,
            length,
            position: 0,
        })
    }

    /// Absolute start of the window in the underlying stream
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Length of the window in bytes
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Current position relative to the window start
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes left between the current position and the window end
    pub fn remaining(&self) -> u64 {
        self.length.saturating_sub(self.position)
    }

    /// Give back the underlying stream
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Read for SliceStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(remaining) as usize;

        self.inner.seek(SeekFrom::Start(self.start + self.position))?;
        let n = self.inner.read(&mut buf[..want])?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for SliceStream<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => self.length as i64 + offset,
            SeekFrom::Current(offset) => self.position as i64 + offset,
        };

        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before the start of the window",
            ));
        }
        let target = target as u64;
        if target > self.length {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek beyond the end of the window",
            ));
        }

        self.position = target;
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn window() -> SliceStream<Cursor<Vec<u8>>> {
        let data: Vec<u8> = (0..100).collect();
        SliceStream::new(Cursor::new(data), 20, 10).unwrap()
    }

    #[test]
    fn test_slice_accessors() {
        let slice = window();
        assert_eq!(slice.start(), 20);
        assert_eq!(slice.length(), 10);
        assert_eq!(slice.position(), 0);
        assert_eq!(slice.remaining(), 10);
    }

    #[test]
    fn test_slice_read_sequence() {
        let mut slice = window();
        let mut buf = [0u8; 5];

        slice.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, &[20, 21, 22, 23, 24]);
        slice.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, &[25, 26, 27, 28, 29]);
        assert_eq!(slice.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_slice_read_clamped_to_window() {
        let mut slice = window();
        let mut buf = [0u8; 64];

        let n = slice.read(&mut buf).unwrap();
        assert_eq!(n, 10);
        assert_eq!(&buf[..10], &[20, 21, 22, 23, 24, 25, 26, 27, 28, 29]);
    }

    #[test]
    fn test_slice_seek() {
        let mut slice = window();
        let mut buf = [0u8; 2];

        slice.seek(SeekFrom::Start(5)).unwrap();
        slice.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, &[25, 26]);

        slice.seek(SeekFrom::Current(-2)).unwrap();
        assert_eq!(slice.position(), 5);

        slice.seek(SeekFrom::End(-3)).unwrap();
        slice.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, &[27, 28]);
    }

    #[test]
    fn test_slice_seek_bounds() {
        let mut slice = window();

        assert!(slice.seek(SeekFrom::Start(11)).is_err());
        assert!(slice.seek(SeekFrom::Current(-1)).is_err());
        // The window end itself is a valid position.
        assert_eq!(slice.seek(SeekFrom::End(0)).unwrap(), 10);
    }
}
