//! Evidentiary container writer
//!
//! Serializes an arbitrary byte stream, plus acquisition metadata, into
//! the multi-segment container format read by `vestige_containers::ewf`.
//! Section layout per segment:
//!
//! ```text
//! segment 1:  magic | header2 header2 header | volume | sectors table
//!             table2 [...] | next-or-final
//! segment N:  magic | data | sectors table table2 [...] | next-or-final
//! final:      ... | hash | done
//! ```
//!
//! The volume ("volume"/"data") sections are written as stubs and
//! rewritten with the true chunk and sector totals when the stream is
//! closed. Any I/O failure aborts the session in a non-recoverable state;
//! callers discard the output and restart the acquisition.

use md5::{Digest, Md5};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

use vestige_containers::ewf::types::{
    self as wire, AcquisitionInfo, CompressionLevel, FileHeader, HashSection, SectionDescriptor,
    SectionKind, TableHeader, VolumeSection,
};
use vestige_stream::{container_suffixes, SegmentSpace};

use crate::error::{AcquireError, Result};

/// Options for a container write session
#[derive(Debug, Clone)]
pub struct EwfWriterOptions {
    /// Size budget per segment file in bytes
    pub segment_size: u64,
    /// Sectors per chunk (64 by convention)
    pub chunk_sectors: u32,
    /// Bytes per sector (512 by convention)
    pub bytes_per_sector: u32,
    /// Chunk compression setting
    pub compression: CompressionLevel,
    /// Chunk-table entries before a sectors/table/table2 rotation
    pub max_table_entries: u32,
    /// Acquisition metadata written into the header sections
    pub info: AcquisitionInfo,
}

impl Default for EwfWriterOptions {
    fn default() -> Self {
        let now = chrono::Local::now().naive_local();
        Self {
            segment_size: 1_610_612_736, // 1.5 GiB
            chunk_sectors: wire::DEFAULT_SECTORS_PER_CHUNK,
            bytes_per_sector: wire::DEFAULT_BYTES_PER_SECTOR,
            compression: CompressionLevel::Fast,
            max_table_entries: wire::MAX_TABLE_ENTRIES,
            info: AcquisitionInfo {
                examiner: String::new(),
                drive_model: String::new(),
                drive_serial: String::new(),
                tool_name: "vestige".to_string(),
                tool_version: env!("CARGO_PKG_VERSION").to_string(),
                platform: std::env::consts::OS.to_string(),
                acquired_at: now,
                recorded_at: now,
                compression: CompressionLevel::Fast,
            },
        }
    }
}

/// Summary returned by a successful [`EwfWriter::close`]
#[derive(Debug, Clone)]
pub struct AcquireReceipt {
    /// Total content bytes written
    pub bytes_acquired: u64,
    /// Total chunks emitted
    pub chunks: u64,
    /// Number of segment files produced
    pub segments: usize,
    /// MD5 digest of the content stream
    pub digest: [u8; 16],
}

impl AcquireReceipt {
    /// Digest as a lowercase hex string
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }
}

/// The segment file currently being written
struct OpenSegment {
    index: usize,
    file: File,
    /// Current sequential write offset; backpatches restore it
    position: u64,
}

/// A volume/data stub awaiting its final totals
struct StubRef {
    segment_index: usize,
    payload_offset: u64,
}

/// Streaming writer for the evidentiary container format
pub struct EwfWriter {
    opts: EwfWriterOptions,
    space: SegmentSpace,
    guid: [u8; 16],
    header2_payload: Vec<u8>,
    header_payload: Vec<u8>,
    segment: Option<OpenSegment>,
    /// Header offset of the open sectors section, if one is open
    sectors_offset: Option<u64>,
    stubs: Vec<StubRef>,
    table: Vec<u32>,
    pending: Vec<u8>,
    total_bytes: u64,
    total_chunks: u64,
    md5: Md5,
}

impl EwfWriter {
    /// Start a write session at `base`
    ///
    /// Segment files are created as `base.E01`, `base.E02`, … on demand.
    /// Fails fast when the options cannot produce a valid container.
    pub fn create(base: impl AsRef<Path>, opts: EwfWriterOptions) -> Result<Self> {
        if opts.chunk_sectors == 0 || opts.bytes_per_sector == 0 {
            return Err(AcquireError::InvalidOptions(
                "chunk geometry must be non-zero".to_string(),
            ));
        }
        if opts.max_table_entries == 0 {
            return Err(AcquireError::InvalidOptions(
                "table entry limit must be non-zero".to_string(),
            ));
        }

        // The metadata record is fixed for the session, so both header
        // payloads can be encoded up front.
        let record = opts.info.encode_record();
        let header_level = opts
            .compression
            .flate2_level()
            .unwrap_or_else(flate2::Compression::fast);
        let header2_payload = wire::deflate(&wire::to_utf16le(&record), header_level)?;
        let header_payload = wire::deflate(record.as_bytes(), header_level)?;

        let chunk_size = opts.chunk_sectors as u64 * opts.bytes_per_sector as u64;
        let chunk_cost = SectionDescriptor::SIZE as u64 + chunk_size + 4;
        let needed = FileHeader::SIZE as u64
            + 2 * (SectionDescriptor::SIZE as u64 + header2_payload.len() as u64)
            + (SectionDescriptor::SIZE as u64 + header_payload.len() as u64)
            + (SectionDescriptor::SIZE + VolumeSection::SIZE) as u64
            + 2 * chunk_cost
            + trailing_reserve(1);
        if opts.segment_size < needed {
            return Err(AcquireError::SegmentBudget {
                needed,
                budget: opts.segment_size,
            });
        }

        Ok(Self {
            space: SegmentSpace::create(base.as_ref(), container_suffixes()),
            guid: *Uuid::new_v4().as_bytes(),
            header2_payload,
            header_payload,
            segment: None,
            sectors_offset: None,
            stubs: Vec::new(),
            table: Vec::new(),
            pending: Vec::new(),
            total_bytes: 0,
            total_chunks: 0,
            md5: Md5::new(),
            opts,
        })
    }

    /// Chunk size in bytes under the configured geometry
    fn chunk_size(&self) -> u64 {
        self.opts.chunk_sectors as u64 * self.opts.bytes_per_sector as u64
    }

    /// Push content bytes into the stream
    ///
    /// Data is buffered until a full chunk is available; buffered bytes
    /// survive segment rotation and are flushed by [`close`].
    ///
    /// [`close`]: EwfWriter::close
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(buf);
        while self.pending.len() as u64 >= self.chunk_size() {
            self.emit_chunk()?;
        }
        Ok(())
    }

    /// Finish the stream: flush the partial chunk, backpatch every volume
    /// stub with the final totals, and write the hash and done sections
    pub fn close(mut self) -> Result<AcquireReceipt> {
        while !self.pending.is_empty() {
            self.emit_chunk()?;
        }
        // An empty stream still produces a well-formed container.
        if self.segment.is_none() {
            self.open_segment()?;
        }
        self.close_sectors()?;
        self.rewrite_stubs()?;

        let digest: [u8; 16] = self.md5.clone().finalize().into();
        let seg = self.segment.as_mut().expect("segment open");
        write_section(seg, &SectionKind::Hash, &HashSection { digest }.encode())?;

        // Terminal marker: a done section pointing at itself.
        let offset = seg.position;
        seg.file.write_all(&SectionDescriptor::encode(
            &SectionKind::Done,
            offset,
            SectionDescriptor::SIZE as u64,
        ))?;
        seg.position += SectionDescriptor::SIZE as u64;
        seg.file.flush()?;

        let index = seg.index;
        let size = seg.position;
        self.space.record_segment_size(index, size)?;
        debug!(
            segments = self.stubs.len(),
            chunks = self.total_chunks,
            bytes = self.total_bytes,
            "container closed"
        );

        Ok(AcquireReceipt {
            bytes_acquired: self.total_bytes,
            chunks: self.total_chunks,
            segments: self.stubs.len(),
            digest,
        })
    }

    /// Emit exactly one (possibly short) chunk from the pending buffer
    fn emit_chunk(&mut self) -> Result<()> {
        let needs_rotation = match &self.segment {
            Some(seg) => !self.has_room(seg.position),
            None => false,
        };
        if needs_rotation {
            self.finish_segment()?;
        }
        if self.segment.is_none() {
            self.open_segment()?;
        }

        let take = (self.chunk_size() as usize).min(self.pending.len());
        let raw: Vec<u8> = self.pending.drain(..take).collect();
        self.md5.update(&raw);
        self.total_bytes += take as u64;

        // Keep the raw form when compression does not shrink the chunk.
        let (encoded, compressed) = match self.opts.compression.flate2_level() {
            Some(level) => {
                let packed = wire::deflate(&raw, level)?;
                if packed.len() < raw.len() {
                    (packed, true)
                } else {
                    (raw, false)
                }
            }
            None => (raw, false),
        };

        self.ensure_sectors()?;
        let sectors_offset = self.sectors_offset.expect("sectors section open");
        let seg = self.segment.as_mut().expect("segment open");

        let rel = seg.position - sectors_offset;
        debug_assert!(rel < wire::CHUNK_COMPRESSED_BIT as u64);
        let mut entry = rel as u32;
        if compressed {
            entry |= wire::CHUNK_COMPRESSED_BIT;
        }

        seg.file.write_all(&encoded)?;
        seg.file
            .write_all(&wire::checksum(&encoded).to_le_bytes())?;
        seg.position += encoded.len() as u64 + 4;

        self.table.push(entry);
        self.total_chunks += 1;

        if self.table.len() as u32 >= self.opts.max_table_entries {
            self.close_sectors()?;
        }
        Ok(())
    }

    /// Room check: this chunk, one more as margin, and the worst-case
    /// trailing sections must still fit in the segment budget
    fn has_room(&self, position: u64) -> bool {
        let chunk_cost = SectionDescriptor::SIZE as u64 + self.chunk_size() + 4;
        position + 2 * chunk_cost + trailing_reserve(self.table.len() as u64 + 1)
            <= self.opts.segment_size
    }

    /// Create the next segment file and write its fixed leading sections
    fn open_segment(&mut self) -> Result<()> {
        let (index, file) = self.space.add_segment()?;
        let mut seg = OpenSegment {
            index,
            file,
            position: 0,
        };

        seg.file
            .write_all(&FileHeader::encode((index + 1) as u16))?;
        seg.position += FileHeader::SIZE as u64;

        if index == 0 {
            // Two UTF-16 copies of the metadata record, then one UTF-8.
            write_section(&mut seg, &SectionKind::Header2, &self.header2_payload)?;
            write_section(&mut seg, &SectionKind::Header2, &self.header2_payload)?;
            write_section(&mut seg, &SectionKind::Header, &self.header_payload)?;
        }

        let kind = if index == 0 {
            SectionKind::Volume
        } else {
            SectionKind::Data
        };
        let payload_offset = seg.position + SectionDescriptor::SIZE as u64;
        let stub = self.volume_payload();
        write_section(&mut seg, &kind, &stub)?;
        self.stubs.push(StubRef {
            segment_index: index,
            payload_offset,
        });

        debug!(segment = index + 1, "segment opened");
        self.segment = Some(seg);
        Ok(())
    }

    /// Open a sectors section lazily before the first chunk goes in
    ///
    /// Its descriptor is a placeholder: the final size is only known when
    /// the section closes, the one place the writer seeks backward.
    fn ensure_sectors(&mut self) -> Result<()> {
        if self.sectors_offset.is_some() {
            return Ok(());
        }
        let seg = self.segment.as_mut().expect("segment open");
        let offset = seg.position;
        seg.file
            .write_all(&SectionDescriptor::encode(&SectionKind::Sectors, 0, 0))?;
        seg.position += SectionDescriptor::SIZE as u64;
        self.sectors_offset = Some(offset);
        Ok(())
    }

    /// Close the open sectors section and write the chunk index twice
    fn close_sectors(&mut self) -> Result<()> {
        let sectors_offset = match self.sectors_offset.take() {
            Some(offset) => offset,
            None => return Ok(()),
        };
        let entries = std::mem::take(&mut self.table);
        let seg = self.segment.as_mut().expect("segment open");

        // Backpatch the sectors descriptor now that its extent is known.
        let end = seg.position;
        let size = end - sectors_offset;
        seg.file.seek(SeekFrom::Start(sectors_offset))?;
        seg.file
            .write_all(&SectionDescriptor::encode(&SectionKind::Sectors, end, size))?;
        seg.file.seek(SeekFrom::Start(end))?;

        let header = TableHeader {
            entry_count: entries.len() as u32,
            base_offset: sectors_offset,
        };
        let mut payload = header.encode().to_vec();
        payload.extend_from_slice(&wire::encode_table_entries(&entries));
        write_section(seg, &SectionKind::Table, &payload)?;
        write_section(seg, &SectionKind::Table2, &payload)?;
        debug!(chunks = entries.len(), "chunk table written");
        Ok(())
    }

    /// Media description with the totals known so far
    fn volume_payload(&self) -> Vec<u8> {
        VolumeSection {
            media_type: 0x01,
            chunk_count: self.total_chunks as u32,
            sectors_per_chunk: self.opts.chunk_sectors,
            bytes_per_sector: self.opts.bytes_per_sector,
            total_sector_count: self
                .total_bytes
                .div_ceil(self.opts.bytes_per_sector as u64),
            media_flags: 0x01,
            compression_level: self.opts.compression.code(),
            error_granularity: self.opts.chunk_sectors,
            guid: self.guid,
        }
        .encode()
    }

    /// Rewrite every stubbed volume/data section with the current totals
    fn rewrite_stubs(&mut self) -> Result<()> {
        let payload = self.volume_payload();
        let current_index = self.segment.as_ref().map(|seg| seg.index);

        for stub in &self.stubs {
            if Some(stub.segment_index) == current_index {
                let seg = self.segment.as_mut().expect("segment open");
                seg.file.seek(SeekFrom::Start(stub.payload_offset))?;
                seg.file.write_all(&payload)?;
                seg.file.seek(SeekFrom::Start(seg.position))?;
            } else {
                let path = self.space.segment_path(stub.segment_index);
                let mut file = OpenOptions::new().write(true).open(path)?;
                file.seek(SeekFrom::Start(stub.payload_offset))?;
                file.write_all(&payload)?;
            }
        }
        Ok(())
    }

    /// Seal the current segment with a next marker; pending bytes carry
    /// over to the segment opened by the following chunk
    fn finish_segment(&mut self) -> Result<()> {
        self.close_sectors()?;
        self.rewrite_stubs()?;

        let seg = self.segment.as_mut().expect("segment open");
        let offset = seg.position;
        seg.file.write_all(&SectionDescriptor::encode(
            &SectionKind::Next,
            offset,
            SectionDescriptor::SIZE as u64,
        ))?;
        seg.position += SectionDescriptor::SIZE as u64;
        seg.file.flush()?;

        let index = seg.index;
        let size = seg.position;
        self.space.record_segment_size(index, size)?;
        debug!(segment = index + 1, size, "segment sealed");
        self.segment = None;
        Ok(())
    }
}

/// Worst-case bytes needed after the last chunk of a segment: the chunk
/// index and its mirror, a volume-equivalent section, hash, and done
///
/// Computed from the live configuration instead of a hard-coded constant
/// so a different table occupancy or geometry cannot overflow the budget.
fn trailing_reserve(entries: u64) -> u64 {
    let table_section =
        SectionDescriptor::SIZE as u64 + TableHeader::SIZE as u64 + entries * 4 + 4;
    2 * table_section
        + (SectionDescriptor::SIZE + VolumeSection::SIZE) as u64
        + (SectionDescriptor::SIZE + HashSection::SIZE) as u64
        + SectionDescriptor::SIZE as u64
}

/// Write one section whose payload is known up front
fn write_section(seg: &mut OpenSegment, kind: &SectionKind, payload: &[u8]) -> Result<u64> {
    let offset = seg.position;
    let size = SectionDescriptor::SIZE as u64 + payload.len() as u64;
    seg.file
        .write_all(&SectionDescriptor::encode(kind, offset + size, size))?;
    seg.file.write_all(payload)?;
    seg.position += size;
    Ok(offset)
}
