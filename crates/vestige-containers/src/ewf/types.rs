//! Wire structures of the evidentiary container format
//!
//! Every segment file is a sequence of named, offset-linked, checksummed
//! sections behind a 13-byte file header. The layouts here are bit-exact:
//! third-party forensic tools read and write the same bytes. All integers
//! are little-endian; all checksums are Adler-32 over exactly the bytes
//! that precede the checksum field.

use adler32::RollingAdler32;
use chrono::NaiveDateTime;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use uuid::Uuid;

use vestige_core::{Error, Result};

/// File magic: "EVF\x09\x0d\x0a\xff\x00"
pub const EVF_SIGNATURE: [u8; 8] = [0x45, 0x56, 0x46, 0x09, 0x0D, 0x0A, 0xFF, 0x00];

/// Format version byte following the magic
pub const FORMAT_VERSION: u8 = 0x01;

/// Chunk geometry convention: 64 sectors of 512 bytes = 32 KiB per chunk
pub const DEFAULT_SECTORS_PER_CHUNK: u32 = 64;
pub const DEFAULT_BYTES_PER_SECTOR: u32 = 512;

/// Interoperable cap on chunk-offset entries per table section
pub const MAX_TABLE_ENTRIES: u32 = 16375;

/// High bit of a table entry: the chunk it points at is compressed
pub const CHUNK_COMPRESSED_BIT: u32 = 0x8000_0000;

/// Adler-32 over `data`, seed 1
pub fn checksum(data: &[u8]) -> u32 {
    let mut adler = RollingAdler32::new();
    adler.update_buffer(data);
    adler.hash()
}

/// zlib-compress `data` at `level`
pub fn deflate(data: &[u8], level: flate2::Compression) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), level);
    encoder.write_all(data)?;
    encoder.finish()
}

/// zlib-decompress `data`
pub fn inflate(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// The 13-byte file header at the start of every segment
#[derive(Debug, Clone)]
pub struct FileHeader {
    /// Segment number, 1-based on the wire
    pub segment_number: u16,
}

impl FileHeader {
    pub const SIZE: usize = 13;

    /// Parse and validate a file header
    ///
    /// A signature or version mismatch is a format mismatch, not
    /// corruption: the caller should try another decoder.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::invalid_format("file header too short"));
        }
        if data[0..8] != EVF_SIGNATURE {
            return Err(Error::invalid_format("bad container signature"));
        }
        if data[8] != FORMAT_VERSION {
            return Err(Error::invalid_format(format!(
                "unsupported format version {}",
                data[8]
            )));
        }
        if data[11..13] != [0, 0] {
            return Err(Error::invalid_format("non-zero reserved header bytes"));
        }
        Ok(Self {
            segment_number: u16::from_le_bytes([data[9], data[10]]),
        })
    }

    /// Encode a file header for segment `segment_number`
    pub fn encode(segment_number: u16) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..8].copy_from_slice(&EVF_SIGNATURE);
        out[8] = FORMAT_VERSION;
        out[9..11].copy_from_slice(&segment_number.to_le_bytes());
        out
    }
}

/// Section type, stored as a null-padded ASCII name in the descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionKind {
    /// UTF-8 acquisition metadata (compressed)
    Header,
    /// UTF-16 acquisition metadata (compressed), written twice
    Header2,
    /// Media description on the first segment
    Volume,
    /// Legacy alias for the media description
    Disk,
    /// Media description stub on later segments
    Data,
    /// Chunked sector data
    Sectors,
    /// Chunk-offset index for the preceding sectors section
    Table,
    /// Mirror of the chunk-offset index
    Table2,
    /// Stream continues in the next segment
    Next,
    /// Whole-stream content digest
    Hash,
    /// Terminal marker on the last segment
    Done,
    /// Anything this implementation does not know
    Other(String),
}

impl SectionKind {
    /// Parse a section name from its 16-byte field
    pub fn from_bytes(bytes: &[u8; 16]) -> Self {
        let name = std::str::from_utf8(bytes)
            .unwrap_or("")
            .trim_end_matches('\0');
        match name {
            "header" => Self::Header,
            "header2" => Self::Header2,
            "volume" => Self::Volume,
            "disk" => Self::Disk,
            "data" => Self::Data,
            "sectors" => Self::Sectors,
            "table" => Self::Table,
            "table2" => Self::Table2,
            "next" => Self::Next,
            "hash" => Self::Hash,
            "done" => Self::Done,
            other => Self::Other(other.to_string()),
        }
    }

    /// Section name as written on the wire
    pub fn name(&self) -> &str {
        match self {
            Self::Header => "header",
            Self::Header2 => "header2",
            Self::Volume => "volume",
            Self::Disk => "disk",
            Self::Data => "data",
            Self::Sectors => "sectors",
            Self::Table => "table",
            Self::Table2 => "table2",
            Self::Next => "next",
            Self::Hash => "hash",
            Self::Done => "done",
            Self::Other(name) => name,
        }
    }

    /// Encode the name into its 16-byte field
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        let name = self.name().as_bytes();
        let len = name.len().min(16);
        out[..len].copy_from_slice(&name[..len]);
        out
    }
}

/// The 76-byte descriptor in front of every section
///
/// The trailing checksum covers exactly the 72 descriptor bytes before it:
/// name, next-section offset, total size, reserved padding.
#[derive(Debug, Clone)]
pub struct SectionDescriptor {
    pub kind: SectionKind,
    /// Absolute offset of the next section descriptor
    pub next_offset: u64,
    /// Total encoded size of the section, this descriptor included
    pub size: u64,
}

impl SectionDescriptor {
    pub const SIZE: usize = 76;

    /// Parse a descriptor, verifying its checksum
    pub fn parse(data: &[u8; Self::SIZE]) -> Result<Self> {
        let stored = u32::from_le_bytes([data[72], data[73], data[74], data[75]]);
        let computed = checksum(&data[..72]);
        if stored != computed {
            return Err(Error::corrupt(format!(
                "section descriptor checksum mismatch (stored 0x{:08X}, computed 0x{:08X})",
                stored, computed
            )));
        }

        let mut name = [0u8; 16];
        name.copy_from_slice(&data[0..16]);
        Ok(Self {
            kind: SectionKind::from_bytes(&name),
            next_offset: u64::from_le_bytes(data[16..24].try_into().expect("8 bytes")),
            size: u64::from_le_bytes(data[24..32].try_into().expect("8 bytes")),
        })
    }

    /// Encode a descriptor, computing its checksum
    pub fn encode(kind: &SectionKind, next_offset: u64, size: u64) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..16].copy_from_slice(&kind.to_bytes());
        out[16..24].copy_from_slice(&next_offset.to_le_bytes());
        out[24..32].copy_from_slice(&size.to_le_bytes());
        let crc = checksum(&out[..72]);
        out[72..76].copy_from_slice(&crc.to_le_bytes());
        out
    }
}

/// The fixed 1052-byte payload of a volume/data section
///
/// ```text
/// off  size  field
/// 0    1     media type
/// 1    3     reserved
/// 4    4     chunk count
/// 8    4     sectors per chunk
/// 12   4     bytes per sector
/// 16   8     total sector count
/// 24   12    CHS geometry placeholders
/// 36   1     media flags
/// 37   3     reserved
/// 40   4     legacy start sector
/// 44   4     reserved
/// 48   4     legacy hidden-sectors start
/// 52   1     compression level
/// 53   3     reserved
/// 56   4     sector-error granularity
/// 60   4     reserved
/// 64   16    acquisition GUID
/// 80   968   padding
/// 1048 4     checksum of bytes 0..1048
/// ```
#[derive(Debug, Clone)]
pub struct VolumeSection {
    pub media_type: u8,
    pub chunk_count: u32,
    pub sectors_per_chunk: u32,
    pub bytes_per_sector: u32,
    pub total_sector_count: u64,
    pub media_flags: u8,
    pub compression_level: u8,
    pub error_granularity: u32,
    pub guid: [u8; 16],
}

impl VolumeSection {
    pub const SIZE: usize = 1052;

    /// Parse a volume payload, verifying its checksum
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::corrupt("volume section payload too short"));
        }
        let stored = u32::from_le_bytes(data[1048..1052].try_into().expect("4 bytes"));
        let computed = checksum(&data[..1048]);
        if stored != computed {
            return Err(Error::corrupt(format!(
                "volume section checksum mismatch (stored 0x{:08X}, computed 0x{:08X})",
                stored, computed
            )));
        }

        let mut guid = [0u8; 16];
        guid.copy_from_slice(&data[64..80]);
        Ok(Self {
            media_type: data[0],
            chunk_count: u32::from_le_bytes(data[4..8].try_into().expect("4 bytes")),
            sectors_per_chunk: u32::from_le_bytes(data[8..12].try_into().expect("4 bytes")),
            bytes_per_sector: u32::from_le_bytes(data[12..16].try_into().expect("4 bytes")),
            total_sector_count: u64::from_le_bytes(data[16..24].try_into().expect("8 bytes")),
            media_flags: data[36],
            compression_level: data[52],
            error_granularity: u32::from_le_bytes(data[56..60].try_into().expect("4 bytes")),
            guid,
        })
    }

    /// Encode the fixed-size payload, zero-filling all padding
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; Self::SIZE];
        out[0] = self.media_type;
        out[4..8].copy_from_slice(&self.chunk_count.to_le_bytes());
        out[8..12].copy_from_slice(&self.sectors_per_chunk.to_le_bytes());
        out[12..16].copy_from_slice(&self.bytes_per_sector.to_le_bytes());
        out[16..24].copy_from_slice(&self.total_sector_count.to_le_bytes());
        out[36] = self.media_flags;
        out[52] = self.compression_level;
        out[56..60].copy_from_slice(&self.error_granularity.to_le_bytes());
        out[64..80].copy_from_slice(&self.guid);
        let crc = checksum(&out[..1048]);
        out[1048..1052].copy_from_slice(&crc.to_le_bytes());
        out
    }

    /// Chunk size in bytes
    pub fn chunk_size(&self) -> u64 {
        self.sectors_per_chunk as u64 * self.bytes_per_sector as u64
    }

    /// Total media size in bytes
    pub fn media_size(&self) -> u64 {
        self.total_sector_count * self.bytes_per_sector as u64
    }

    /// Acquisition GUID
    pub fn acquisition_guid(&self) -> Uuid {
        Uuid::from_bytes(self.guid)
    }
}

/// The 24-byte header in front of a table section's entry array
#[derive(Debug, Clone)]
pub struct TableHeader {
    pub entry_count: u32,
    /// Absolute offset of the sectors section the entries are relative to
    pub base_offset: u64,
}

impl TableHeader {
    pub const SIZE: usize = 24;

    /// Parse a table header, verifying its checksum
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::corrupt("table header too short"));
        }
        let stored = u32::from_le_bytes(data[20..24].try_into().expect("4 bytes"));
        let computed = checksum(&data[..20]);
        if stored != computed {
            return Err(Error::corrupt(format!(
                "table header checksum mismatch (stored 0x{:08X}, computed 0x{:08X})",
                stored, computed
            )));
        }
        Ok(Self {
            entry_count: u32::from_le_bytes(data[0..4].try_into().expect("4 bytes")),
            base_offset: u64::from_le_bytes(data[8..16].try_into().expect("8 bytes")),
        })
    }

    /// Encode a table header, computing its checksum
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.entry_count.to_le_bytes());
        out[8..16].copy_from_slice(&self.base_offset.to_le_bytes());
        let crc = checksum(&out[..20]);
        out[20..24].copy_from_slice(&crc.to_le_bytes());
        out
    }
}

/// Encode a chunk-offset entry array plus its trailing checksum
pub fn encode_table_entries(entries: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(entries.len() * 4 + 4);
    for entry in entries {
        out.extend_from_slice(&entry.to_le_bytes());
    }
    let crc = checksum(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

/// Parse a chunk-offset entry array, verifying its trailing checksum
pub fn parse_table_entries(data: &[u8], count: usize) -> Result<Vec<u32>> {
    let array_len = count * 4;
    if data.len() < array_len + 4 {
        return Err(Error::corrupt("table entry array truncated"));
    }
    let stored = u32::from_le_bytes(
        data[array_len..array_len + 4]
            .try_into()
            .expect("4 bytes"),
    );
    let computed = checksum(&data[..array_len]);
    if stored != computed {
        return Err(Error::corrupt(format!(
            "table entry checksum mismatch (stored 0x{:08X}, computed 0x{:08X})",
            stored, computed
        )));
    }

    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        entries.push(u32::from_le_bytes(
            data[i * 4..i * 4 + 4].try_into().expect("4 bytes"),
        ));
    }
    Ok(entries)
}

/// The 36-byte payload of the hash section: digest, padding, checksum
#[derive(Debug, Clone)]
pub struct HashSection {
    pub digest: [u8; 16],
}

impl HashSection {
    pub const SIZE: usize = 36;

    /// Parse a hash payload, verifying its checksum
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::corrupt("hash section payload too short"));
        }
        let stored = u32::from_le_bytes(data[32..36].try_into().expect("4 bytes"));
        let computed = checksum(&data[..32]);
        if stored != computed {
            return Err(Error::corrupt(format!(
                "hash section checksum mismatch (stored 0x{:08X}, computed 0x{:08X})",
                stored, computed
            )));
        }
        let mut digest = [0u8; 16];
        digest.copy_from_slice(&data[0..16]);
        Ok(Self { digest })
    }

    /// Encode the payload: 16 digest bytes, 16 padding bytes, checksum
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..16].copy_from_slice(&self.digest);
        let crc = checksum(&out[..32]);
        out[32..36].copy_from_slice(&crc.to_le_bytes());
        out
    }

    /// Digest as a lowercase hex string
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }
}

/// Chunk compression setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionLevel {
    /// Store chunks raw
    None,
    /// zlib fastest
    Fast,
    /// zlib best ratio
    Best,
}

impl CompressionLevel {
    /// Wire code stored in the volume section and header record
    pub fn code(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Fast => 1,
            Self::Best => 2,
        }
    }

    /// Decode a wire code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Fast),
            2 => Some(Self::Best),
            _ => None,
        }
    }

    /// The flate2 level to compress chunks with, if any
    pub fn flate2_level(self) -> Option<flate2::Compression> {
        match self {
            Self::None => None,
            Self::Fast => Some(flate2::Compression::fast()),
            Self::Best => Some(flate2::Compression::best()),
        }
    }
}

/// Acquisition metadata carried by the header sections
///
/// Serialized as a fixed tab-delimited record; see [`encode_record`].
///
/// [`encode_record`]: AcquisitionInfo::encode_record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionInfo {
    pub examiner: String,
    pub drive_model: String,
    pub drive_serial: String,
    pub tool_name: String,
    pub tool_version: String,
    pub platform: String,
    pub acquired_at: NaiveDateTime,
    pub recorded_at: NaiveDateTime,
    pub compression: CompressionLevel,
}

const RECORD_KEYS: &str = "e\tmd\tsn\ta\tav\tov\tm\tu\tr";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

impl AcquisitionInfo {
    /// Encode the tab-delimited header record
    ///
    /// ```text
    /// 1
    /// main
    /// e<TAB>md<TAB>sn<TAB>a<TAB>av<TAB>ov<TAB>m<TAB>u<TAB>r
    /// <values in the same order>
    /// ```
    pub fn encode_record(&self) -> String {
        let values = [
            self.examiner.as_str(),
            self.drive_model.as_str(),
            self.drive_serial.as_str(),
            self.tool_name.as_str(),
            self.tool_version.as_str(),
            self.platform.as_str(),
            &self.acquired_at.format(TIMESTAMP_FORMAT).to_string(),
            &self.recorded_at.format(TIMESTAMP_FORMAT).to_string(),
            &self.compression.code().to_string(),
        ]
        .join("\t");
        format!("1\r\nmain\r\n{}\r\n{}\r\n", RECORD_KEYS, values)
    }

    /// Parse a header record back into acquisition metadata
    pub fn parse_record(text: &str) -> Result<Self> {
        let lines: Vec<&str> = text.split("\r\n").collect();
        if lines.len() < 4 || lines[0] != "1" || lines[1] != "main" {
            return Err(Error::corrupt("malformed acquisition record"));
        }

        let keys: Vec<&str> = lines[2].split('\t').collect();
        let values: Vec<&str> = lines[3].split('\t').collect();
        if keys.len() != values.len() {
            return Err(Error::corrupt("acquisition record key/value mismatch"));
        }
        let field = |key: &str| -> Result<&str> {
            keys.iter()
                .position(|k| *k == key)
                .map(|i| values[i])
                .ok_or_else(|| Error::corrupt(format!("acquisition record missing field '{}'", key)))
        };

        let timestamp = |key: &str| -> Result<NaiveDateTime> {
            NaiveDateTime::parse_from_str(field(key)?, TIMESTAMP_FORMAT)
                .map_err(|_| Error::corrupt(format!("bad timestamp in field '{}'", key)))
        };

        let code: u8 = field("r")?
            .parse()
            .map_err(|_| Error::corrupt("bad compression code"))?;
        let compression = CompressionLevel::from_code(code)
            .ok_or_else(|| Error::corrupt(format!("unknown compression code {}", code)))?;

        Ok(Self {
            examiner: field("e")?.to_string(),
            drive_model: field("md")?.to_string(),
            drive_serial: field("sn")?.to_string(),
            tool_name: field("a")?.to_string(),
            tool_version: field("av")?.to_string(),
            platform: field("ov")?.to_string(),
            acquired_at: timestamp("m")?,
            recorded_at: timestamp("u")?,
            compression,
        })
    }
}

/// Encode text as UTF-16LE with a byte-order mark
pub fn to_utf16le(text: &str) -> Vec<u8> {
    let mut out = vec![0xFF, 0xFE];
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

/// Decode UTF-16LE text, tolerating a leading byte-order mark
pub fn from_utf16le(bytes: &[u8]) -> Result<String> {
    let body = if bytes.starts_with(&[0xFF, 0xFE]) {
        &bytes[2..]
    } else {
        bytes
    };
    if body.len() % 2 != 0 {
        return Err(Error::corrupt("odd-length UTF-16 header data"));
    }
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| Error::corrupt("invalid UTF-16 header data"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_info() -> AcquisitionInfo {
        AcquisitionInfo {
            examiner: "jdoe".to_string(),
            drive_model: "WDC WD10EZEX".to_string(),
            drive_serial: "WD-1234".to_string(),
            tool_name: "vestige".to_string(),
            tool_version: "0.1.0".to_string(),
            platform: "linux".to_string(),
            acquired_at: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(10, 30, 0)
                .unwrap(),
            recorded_at: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(10, 31, 5)
                .unwrap(),
            compression: CompressionLevel::Fast,
        }
    }

    #[test]
    fn test_file_header_roundtrip() {
        let bytes = FileHeader::encode(3);
        let header = FileHeader::parse(&bytes).unwrap();
        assert_eq!(header.segment_number, 3);
    }

    #[test]
    fn test_file_header_rejects_bad_signature() {
        let mut bytes = FileHeader::encode(1);
        bytes[0] = b'X';
        match FileHeader::parse(&bytes) {
            Err(Error::InvalidFormat(_)) => {}
            other => panic!("expected InvalidFormat, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_section_kind_names() {
        let mut bytes = [0u8; 16];
        bytes[..7].copy_from_slice(b"sectors");
        assert_eq!(SectionKind::from_bytes(&bytes), SectionKind::Sectors);
        assert_eq!(SectionKind::Sectors.to_bytes(), bytes);

        let mut odd = [0u8; 16];
        odd[..4].copy_from_slice(b"odd!");
        assert_eq!(
            SectionKind::from_bytes(&odd),
            SectionKind::Other("odd!".to_string())
        );
    }

    #[test]
    fn test_section_descriptor_roundtrip() {
        let bytes = SectionDescriptor::encode(&SectionKind::Table, 4096, 200);
        let parsed = SectionDescriptor::parse(&bytes).unwrap();
        assert_eq!(parsed.kind, SectionKind::Table);
        assert_eq!(parsed.next_offset, 4096);
        assert_eq!(parsed.size, 200);
    }

    #[test]
    fn test_section_descriptor_detects_flip() {
        let mut bytes = SectionDescriptor::encode(&SectionKind::Volume, 13, 1128);
        bytes[20] ^= 0x01;
        match SectionDescriptor::parse(&bytes) {
            Err(Error::Corrupt(_)) => {}
            other => panic!("expected Corrupt, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_volume_section_roundtrip() {
        let volume = VolumeSection {
            media_type: 0x01,
            chunk_count: 7,
            sectors_per_chunk: 64,
            bytes_per_sector: 512,
            total_sector_count: 448,
            media_flags: 0x01,
            compression_level: 1,
            error_granularity: 64,
            guid: *Uuid::new_v4().as_bytes(),
        };

        let bytes = volume.encode();
        assert_eq!(bytes.len(), VolumeSection::SIZE);
        let parsed = VolumeSection::parse(&bytes).unwrap();
        assert_eq!(parsed.chunk_count, 7);
        assert_eq!(parsed.total_sector_count, 448);
        assert_eq!(parsed.guid, volume.guid);
        assert_eq!(parsed.chunk_size(), 32768);
        assert_eq!(parsed.media_size(), 448 * 512);
    }

    #[test]
    fn test_volume_section_detects_flip() {
        let volume = VolumeSection {
            media_type: 0x01,
            chunk_count: 1,
            sectors_per_chunk: 64,
            bytes_per_sector: 512,
            total_sector_count: 64,
            media_flags: 0x01,
            compression_level: 0,
            error_granularity: 64,
            guid: [0u8; 16],
        };
        let mut bytes = volume.encode();
        bytes[4] ^= 0xFF;
        assert!(VolumeSection::parse(&bytes).is_err());
    }

    #[test]
    fn test_table_header_roundtrip() {
        let header = TableHeader {
            entry_count: 42,
            base_offset: 0xDEAD,
        };
        let parsed = TableHeader::parse(&header.encode()).unwrap();
        assert_eq!(parsed.entry_count, 42);
        assert_eq!(parsed.base_offset, 0xDEAD);
    }

    #[test]
    fn test_table_entries_roundtrip() {
        let entries = vec![76, 1024 | CHUNK_COMPRESSED_BIT, 2000];
        let bytes = encode_table_entries(&entries);
        assert_eq!(bytes.len(), 16);
        let parsed = parse_table_entries(&bytes, 3).unwrap();
        assert_eq!(parsed, entries);

        let mut corrupted = bytes.clone();
        corrupted[1] ^= 0x40;
        assert!(parse_table_entries(&corrupted, 3).is_err());
    }

    #[test]
    fn test_hash_section_roundtrip() {
        let hash = HashSection {
            digest: [
                0xd4, 0x1d, 0x8c, 0xd9, 0x8f, 0x00, 0xb2, 0x04, 0xe9, 0x80, 0x09, 0x98, 0xec,
                0xf8, 0x42, 0x7e,
            ],
        };
        let bytes = hash.encode();
        let parsed = HashSection::parse(&bytes).unwrap();
        assert_eq!(parsed.digest, hash.digest);
        assert_eq!(parsed.digest_hex(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_compression_codes() {
        assert_eq!(CompressionLevel::from_code(0), Some(CompressionLevel::None));
        assert_eq!(CompressionLevel::from_code(1), Some(CompressionLevel::Fast));
        assert_eq!(CompressionLevel::from_code(2), Some(CompressionLevel::Best));
        assert_eq!(CompressionLevel::from_code(9), None);
        assert!(CompressionLevel::None.flate2_level().is_none());
    }

    #[test]
    fn test_acquisition_record_roundtrip() {
        let info = sample_info();
        let record = info.encode_record();
        assert!(record.starts_with("1\r\nmain\r\n"));

        let parsed = AcquisitionInfo::parse_record(&record).unwrap();
        assert_eq!(parsed, info);
    }

    #[test]
    fn test_acquisition_record_missing_field() {
        let text = "1\r\nmain\r\ne\tmd\r\njdoe\tmodel\r\n";
        match AcquisitionInfo::parse_record(text) {
            Err(Error::Corrupt(_)) => {}
            other => panic!("expected Corrupt, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_utf16_roundtrip() {
        let record = sample_info().encode_record();
        let bytes = to_utf16le(&record);
        assert_eq!(&bytes[..2], &[0xFF, 0xFE]);
        assert_eq!(from_utf16le(&bytes).unwrap(), record);
        // Also without the BOM
        assert_eq!(from_utf16le(&bytes[2..]).unwrap(), record);
    }

    #[test]
    fn test_deflate_inflate() {
        let data = vec![0xAB; 4096];
        let packed = deflate(&data, flate2::Compression::best()).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(inflate(&packed).unwrap(), data);
    }
}
