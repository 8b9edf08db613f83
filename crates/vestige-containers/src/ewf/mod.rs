//! Evidentiary container reader
//!
//! Walks the section chain of every segment file, verifies every
//! descriptor, table and chunk checksum, and exposes the decompressed
//! sector data as one `Read + Seek` stream. A signature mismatch is a
//! format mismatch (`Error::InvalidFormat`); any checksum or extent
//! mismatch is reported as `Error::Corrupt` and never silently accepted.

pub mod types;

use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

use vestige_core::{Error, Medium, ReadSeek, Result};
use vestige_stream::{container_suffixes, SegmentSpace};

pub use types::{
    AcquisitionInfo, CompressionLevel, FileHeader, HashSection, SectionDescriptor, SectionKind,
    TableHeader, VolumeSection,
};

/// Where one chunk's encoded bytes live
#[derive(Debug, Clone)]
struct ChunkLocation {
    /// Index into the opened segment list
    segment: usize,
    /// Absolute start of the chunk bytes within the segment file
    start: u64,
    /// Absolute end, one past the chunk's trailing checksum
    end: u64,
    compressed: bool,
}

/// One decompressed chunk kept around between reads
#[derive(Default)]
struct ChunkCache {
    index: Option<usize>,
    data: Vec<u8>,
}

/// A decoded multi-segment evidentiary container
pub struct EwfMedium {
    segments: Vec<File>,
    volume: VolumeSection,
    info: Option<AcquisitionInfo>,
    stored_digest: Option<[u8; 16]>,
    chunks: Vec<ChunkLocation>,
    cache: ChunkCache,
    position: u64,
    identifier: String,
}

/// Per-segment parser state
struct SegmentParse {
    /// Header offset and end offset of the last sectors section seen
    sectors: Option<(u64, u64)>,
    /// Entries of the last table, kept to verify the mirror
    last_table: Option<Vec<u32>>,
}

impl EwfMedium {
    /// Open a container given the path of its first segment file
    ///
    /// Sibling segments are discovered through the vendor suffix rule
    /// (`.E01`, `.E02`, …).
    pub fn open(first_segment: &Path) -> Result<Self> {
        let base = first_segment.with_extension("");
        let mut space = SegmentSpace::new(base, container_suffixes());
        let count = space.segment_count()?;

        let mut medium = EwfMedium {
            segments: Vec::with_capacity(count),
            volume: VolumeSection {
                media_type: 0,
                chunk_count: 0,
                sectors_per_chunk: 0,
                bytes_per_sector: 0,
                total_sector_count: 0,
                media_flags: 0,
                compression_level: 0,
                error_granularity: 0,
                guid: [0u8; 16],
            },
            info: None,
            stored_digest: None,
            chunks: Vec::new(),
            cache: ChunkCache::default(),
            position: 0,
            identifier: String::new(),
        };

        let mut have_volume = false;
        for index in 0..count {
            let file = space.new_reader(index)?;
            medium.parse_segment(file, index, &mut have_volume)?;
        }

        if !have_volume {
            return Err(Error::invalid_format("container has no volume section"));
        }
        if medium.volume.sectors_per_chunk == 0 || medium.volume.bytes_per_sector == 0 {
            return Err(Error::corrupt("volume section declares zero chunk geometry"));
        }

        medium.identifier = format!(
            "EWF container, {} segment(s), {} chunk(s), {} sectors of {} bytes",
            medium.segments.len(),
            medium.chunks.len(),
            medium.volume.total_sector_count,
            medium.volume.bytes_per_sector
        );
        Ok(medium)
    }

    /// Walk one segment's section chain
    fn parse_segment(&mut self, mut file: File, index: usize, have_volume: &mut bool) -> Result<()> {
        let mut header_bytes = [0u8; FileHeader::SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header_bytes)?;
        let header = FileHeader::parse(&header_bytes)?;
        if header.segment_number as usize != index + 1 {
            return Err(Error::corrupt(format!(
                "segment file {} carries segment number {}",
                index + 1,
                header.segment_number
            )));
        }

        let mut state = SegmentParse {
            sectors: None,
            last_table: None,
        };
        let mut offset = FileHeader::SIZE as u64;

        loop {
            file.seek(SeekFrom::Start(offset))?;
            let mut descriptor_bytes = [0u8; SectionDescriptor::SIZE];
            file.read_exact(&mut descriptor_bytes)?;
            let section = SectionDescriptor::parse(&descriptor_bytes)?;
            debug!(
                segment = index + 1,
                offset,
                kind = section.kind.name(),
                size = section.size,
                "section"
            );

            let payload_offset = offset + SectionDescriptor::SIZE as u64;
            let payload_size = section
                .size
                .checked_sub(SectionDescriptor::SIZE as u64)
                .ok_or_else(|| Error::corrupt("section smaller than its descriptor"))?;

            match &section.kind {
                SectionKind::Header2 | SectionKind::Header => {
                    if self.info.is_none() {
                        let record = self.read_header_record(
                            &mut file,
                            payload_offset,
                            payload_size,
                            section.kind == SectionKind::Header2,
                        )?;
                        self.info = Some(AcquisitionInfo::parse_record(&record)?);
                    }
                }
                SectionKind::Volume | SectionKind::Disk => {
                    let payload = read_payload(&mut file, payload_offset, payload_size)?;
                    self.volume = VolumeSection::parse(&payload)?;
                    *have_volume = true;
                }
                SectionKind::Data => {
                    // Later segments carry a stub copy of the media
                    // description; only use it if no volume was seen.
                    if !*have_volume {
                        let payload = read_payload(&mut file, payload_offset, payload_size)?;
                        self.volume = VolumeSection::parse(&payload)?;
                        *have_volume = true;
                    }
                }
                SectionKind::Sectors => {
                    state.sectors = Some((offset, offset + section.size));
                }
                SectionKind::Table => {
                    let entries =
                        self.parse_table(&mut file, payload_offset, payload_size, &state, index)?;
                    state.last_table = Some(entries);
                }
                SectionKind::Table2 => {
                    let payload = read_payload(&mut file, payload_offset, payload_size)?;
                    let table = TableHeader::parse(&payload)?;
                    let entries =
                        types::parse_table_entries(&payload[TableHeader::SIZE..], table.entry_count as usize)?;
                    match state.last_table.take() {
                        Some(primary) if primary == entries => {}
                        Some(_) => {
                            return Err(Error::corrupt("table mirror disagrees with table"));
                        }
                        None => {
                            return Err(Error::corrupt("table mirror without a primary table"));
                        }
                    }
                }
                SectionKind::Hash => {
                    let payload = read_payload(&mut file, payload_offset, payload_size)?;
                    self.stored_digest = Some(HashSection::parse(&payload)?.digest);
                }
                SectionKind::Next | SectionKind::Done => break,
                SectionKind::Other(_) => {}
            }

            if section.next_offset <= offset {
                return Err(Error::corrupt("section chain does not advance"));
            }
            offset = section.next_offset;
        }

        self.segments.push(file);
        Ok(())
    }

    /// Decompress and decode a header record payload
    fn read_header_record(
        &mut self,
        file: &mut File,
        offset: u64,
        size: u64,
        utf16: bool,
    ) -> Result<String> {
        let payload = read_payload(file, offset, size)?;
        let text = types::inflate(&payload)
            .map_err(|_| Error::corrupt("header section does not decompress"))?;
        if utf16 {
            types::from_utf16le(&text)
        } else {
            String::from_utf8(text).map_err(|_| Error::corrupt("invalid UTF-8 header data"))
        }
    }

    /// Parse a table section into chunk locations
    fn parse_table(
        &mut self,
        file: &mut File,
        offset: u64,
        size: u64,
        state: &SegmentParse,
        segment: usize,
    ) -> Result<Vec<u32>> {
        let (sectors_offset, sectors_end) = state
            .sectors
            .ok_or_else(|| Error::corrupt("table section without sector data"))?;

        let payload = read_payload(file, offset, size)?;
        let table = TableHeader::parse(&payload)?;
        if table.base_offset != sectors_offset {
            return Err(Error::corrupt("table base does not match its sectors section"));
        }
        let entries =
            types::parse_table_entries(&payload[TableHeader::SIZE..], table.entry_count as usize)?;

        for (i, raw) in entries.iter().enumerate() {
            let start = table.base_offset + (raw & !types::CHUNK_COMPRESSED_BIT) as u64;
            let end = match entries.get(i + 1) {
                Some(next) => table.base_offset + (next & !types::CHUNK_COMPRESSED_BIT) as u64,
                None => sectors_end,
            };
            // A chunk is at least one data byte plus its checksum, and must
            // lie inside the sectors section it belongs to.
            if start < sectors_offset + SectionDescriptor::SIZE as u64
                || end <= start + 4
                || end > sectors_end
            {
                return Err(Error::corrupt(format!(
                    "chunk {} extent 0x{:X}..0x{:X} outside its sectors section",
                    self.chunks.len(),
                    start,
                    end
                )));
            }
            self.chunks.push(ChunkLocation {
                segment,
                start,
                end,
                compressed: raw & types::CHUNK_COMPRESSED_BIT != 0,
            });
        }
        Ok(entries)
    }

    /// Media description parsed from the volume section
    pub fn volume(&self) -> &VolumeSection {
        &self.volume
    }

    /// Acquisition metadata, if a header section was present
    pub fn acquisition_info(&self) -> Option<&AcquisitionInfo> {
        self.info.as_ref()
    }

    /// Whole-stream digest stored in the hash section
    pub fn stored_digest(&self) -> Option<[u8; 16]> {
        self.stored_digest
    }

    /// Number of chunks across all segments
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of segment files
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Recompute the content digest and compare it with the stored one
    ///
    /// Returns `None` when the container carries no hash section.
    pub fn verify_digest(&mut self) -> Result<Option<bool>> {
        let stored = match self.stored_digest {
            Some(digest) => digest,
            None => return Ok(None),
        };
        let mut md5 = Md5::new();
        for index in 0..self.chunks.len() {
            let data = self.read_chunk(index)?;
            md5.update(&data);
        }
        let computed: [u8; 16] = md5.finalize().into();
        Ok(Some(computed == stored))
    }

    /// Read, verify and decompress chunk `index`
    fn read_chunk(&mut self, index: usize) -> Result<Vec<u8>> {
        let location = self.chunks[index].clone();
        let file = &mut self.segments[location.segment];

        let extent = (location.end - location.start) as usize;
        let mut encoded = vec![0u8; extent];
        file.seek(SeekFrom::Start(location.start))?;
        file.read_exact(&mut encoded)?;

        let (data, stored_bytes) = encoded.split_at(extent - 4);
        let stored = u32::from_le_bytes(stored_bytes.try_into().expect("4 bytes"));
        let computed = types::checksum(data);
        if stored != computed {
            return Err(Error::corrupt(format!(
                "chunk {} checksum mismatch (stored 0x{:08X}, computed 0x{:08X})",
                index, stored, computed
            )));
        }

        let decoded = if location.compressed {
            types::inflate(data)
                .map_err(|_| Error::corrupt(format!("chunk {} does not decompress", index)))?
        } else {
            data.to_vec()
        };

        if decoded.len() as u64 > self.volume.chunk_size() {
            return Err(Error::corrupt(format!(
                "chunk {} larger than the declared chunk size",
                index
            )));
        }
        Ok(decoded)
    }

    /// Read from the logical stream at `offset`, within one chunk
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || offset >= self.length() {
            return Ok(0);
        }

        let chunk_size = self.volume.chunk_size();
        let index = (offset / chunk_size) as usize;
        if index >= self.chunks.len() {
            return Ok(0);
        }

        if self.cache.index != Some(index) {
            self.cache.data = self.read_chunk(index)?;
            self.cache.index = Some(index);
        }

        let chunk_offset = (offset % chunk_size) as usize;
        let available = self.cache.data.len().saturating_sub(chunk_offset);
        let to_read = buf.len().min(available);
        if to_read > 0 {
            buf[..to_read].copy_from_slice(&self.cache.data[chunk_offset..chunk_offset + to_read]);
        }
        Ok(to_read)
    }

    fn length(&self) -> u64 {
        self.volume.media_size()
    }
}

/// Check whether `path` starts with the container signature
///
/// Purely observational: no state is created or mutated, so two calls on
/// an unchanged file always agree.
pub fn is_ewf_file(path: &Path) -> bool {
    let mut magic = [0u8; 9];
    match File::open(path).and_then(|mut f| f.read_exact(&mut magic)) {
        Ok(()) => magic[..8] == types::EVF_SIGNATURE && magic[8] == types::FORMAT_VERSION,
        Err(_) => false,
    }
}

fn read_payload(file: &mut File, offset: u64, size: u64) -> Result<Vec<u8>> {
    let mut payload = vec![0u8; size as usize];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut payload)
        .map_err(|_| Error::corrupt("section payload truncated"))?;
    Ok(payload)
}

impl Read for EwfMedium {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self
                .read_at(self.position, &mut buf[filled..])
                .map_err(|e| io::Error::other(e.to_string()))?;
            if n == 0 {
                break;
            }
            filled += n;
            self.position += n as u64;
        }
        Ok(filled)
    }
}

impl Seek for EwfMedium {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => self.length() as i64 + offset,
            SeekFrom::Current(offset) => self.position as i64 + offset,
        };

        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative offset",
            ));
        }
        let target = target as u64;
        if target > self.length() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek beyond the end of the medium",
            ));
        }

        self.position = target;
        Ok(self.position)
    }
}

impl Medium for EwfMedium {
    fn identify(&self) -> &str {
        &self.identifier
    }

    fn length(&self) -> u64 {
        EwfMedium::length(self)
    }

    fn content(&mut self) -> &mut dyn ReadSeek {
        self
    }
}
