//! TIFF header and directory parsing.
//!
//! # Header layout
//!
//! ## Classic TIFF (8 bytes)
//! ```text
//! Bytes 0-1: Byte order ("II" little-endian, "MM" big-endian)
//! Bytes 2-3: Version (42)
//! Bytes 4-7: Offset to first IFD
//! ```
//!
//! ## BigTIFF (16 bytes)
//! ```text
//! Bytes 0-1:  Byte order
//! Bytes 2-3:  Version (43)
//! Bytes 4-5:  Offset byte size (must be 8)
//! Bytes 6-7:  Reserved
//! Bytes 8-15: Offset to first IFD
//! ```
//!
//! # Directory layout
//!
//! An IFD is an entry count, a run of fixed-size entries, and the offset of
//! the next IFD (0 terminates the chain). Entries are 12 bytes in classic
//! TIFF and 20 bytes in BigTIFF. A value that fits in the entry's value
//! field is stored inline; anything larger lives at the offset stored there.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::tags::{FieldType, TiffTag};

// =============================================================================
// Constants
// =============================================================================

const BYTE_ORDER_LITTLE_ENDIAN: [u8; 2] = *b"II";
const BYTE_ORDER_BIG_ENDIAN: [u8; 2] = *b"MM";

const VERSION_TIFF: u16 = 42;
const VERSION_BIGTIFF: u16 = 43;

/// Size of classic TIFF header in bytes
pub const TIFF_HEADER_SIZE: usize = 8;

/// Size of BigTIFF header in bytes
pub const BIGTIFF_HEADER_SIZE: usize = 16;

/// Longest IFD chain the parser will follow
pub const MAX_IFDS: usize = 1024;

/// Upper bound on entries in a single directory
const MAX_IFD_ENTRIES: u64 = 4096;

// =============================================================================
// ByteOrder
// =============================================================================

/// Byte order (endianness) of a TIFF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// "II" (Intel)
    LittleEndian,
    /// "MM" (Motorola)
    BigEndian,
}

impl ByteOrder {
    /// Read a u16 from the first two bytes of `bytes`.
    ///
    /// Callers guarantee the slice is long enough.
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        let raw = [bytes[0], bytes[1]];
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(raw),
            ByteOrder::BigEndian => u16::from_be_bytes(raw),
        }
    }

    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(raw),
            ByteOrder::BigEndian => u32::from_be_bytes(raw),
        }
    }

    #[inline]
    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        match self {
            ByteOrder::LittleEndian => u64::from_le_bytes(raw),
            ByteOrder::BigEndian => u64::from_be_bytes(raw),
        }
    }
}

// =============================================================================
// TiffHeader
// =============================================================================

/// Parsed TIFF file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    pub byte_order: ByteOrder,

    /// Whether this is a BigTIFF file (64-bit offsets)
    pub is_bigtiff: bool,

    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Parse a TIFF header from the first bytes of a file.
    ///
    /// `bytes` should hold 16 bytes when available so BigTIFF headers can be
    /// read; 8 is enough for classic TIFF.
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, TiffError> {
        if bytes.len() < TIFF_HEADER_SIZE {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        let byte_order = match [bytes[0], bytes[1]] {
            BYTE_ORDER_LITTLE_ENDIAN => ByteOrder::LittleEndian,
            BYTE_ORDER_BIG_ENDIAN => ByteOrder::BigEndian,
            _ => return Err(TiffError::InvalidMagic(u16::from_be_bytes([bytes[0], bytes[1]]))),
        };

        let version = byte_order.read_u16(&bytes[2..4]);
        let (is_bigtiff, first_ifd_offset) = match version {
            VERSION_TIFF => (false, byte_order.read_u32(&bytes[4..8]) as u64),
            VERSION_BIGTIFF => {
                if bytes.len() < BIGTIFF_HEADER_SIZE {
                    return Err(TiffError::FileTooSmall {
                        required: BIGTIFF_HEADER_SIZE as u64,
                        actual: bytes.len() as u64,
                    });
                }
                let offset_size = byte_order.read_u16(&bytes[4..6]);
                if offset_size != 8 {
                    return Err(TiffError::InvalidBigTiffOffsetSize(offset_size));
                }
                (true, byte_order.read_u64(&bytes[8..16]))
            }
            _ => return Err(TiffError::InvalidVersion(version)),
        };

        if first_ifd_offset == 0 || first_ifd_offset >= file_size {
            return Err(TiffError::InvalidIfdOffset(first_ifd_offset));
        }

        Ok(TiffHeader {
            byte_order,
            is_bigtiff,
            first_ifd_offset,
        })
    }

    /// Read and parse the header of a file.
    pub fn read(reader: &(impl RangeReader + ?Sized)) -> Result<Self, TiffError> {
        let size = reader.size();
        let len = (BIGTIFF_HEADER_SIZE as u64).min(size) as usize;
        let bytes = reader.read_exact_at(0, len)?;
        Self::parse(&bytes, size)
    }

    /// Size of one IFD entry: 12 bytes classic, 20 bytes BigTIFF.
    #[inline]
    pub const fn ifd_entry_size(&self) -> usize {
        if self.is_bigtiff {
            20
        } else {
            12
        }
    }

    /// Size of the entry count that opens an IFD.
    #[inline]
    pub const fn ifd_count_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            2
        }
    }

    /// Size of the next-IFD offset that closes an IFD.
    #[inline]
    pub const fn ifd_next_offset_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    /// Size of the value/offset field of an entry, which is also the inline
    /// value threshold.
    #[inline]
    pub const fn value_offset_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }
}

// =============================================================================
// IfdEntry
// =============================================================================

/// One tag entry of an IFD, with its value field kept raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    pub tag_id: u16,

    /// Decoded field type, `None` when the type code is unknown
    pub field_type: Option<FieldType>,

    pub field_type_raw: u16,

    /// Number of values (not bytes)
    pub count: u64,

    /// The raw 4 or 8 byte value/offset field
    pub value_offset_bytes: Vec<u8>,

    /// Whether the value is stored in `value_offset_bytes`
    pub is_inline: bool,
}

impl IfdEntry {
    /// Total byte size of the value, `None` for unknown types or overflow.
    pub fn value_byte_size(&self) -> Option<u64> {
        let field_type = self.field_type?;
        self.count.checked_mul(field_type.size_in_bytes() as u64)
    }

    /// Interpret the value field as an offset into the file.
    pub fn value_offset(&self, byte_order: ByteOrder) -> u64 {
        if self.value_offset_bytes.len() >= 8 {
            byte_order.read_u64(&self.value_offset_bytes)
        } else {
            byte_order.read_u32(&self.value_offset_bytes) as u64
        }
    }

    /// Tag name for error messages.
    pub fn tag_name(&self) -> &'static str {
        TiffTag::from_u16(self.tag_id)
            .map(TiffTag::name)
            .unwrap_or("unknown tag")
    }

    /// Read a single inline unsigned integer, if the entry holds one.
    pub fn inline_u32(&self, byte_order: ByteOrder) -> Option<u32> {
        if !self.is_inline || self.count != 1 {
            return None;
        }
        match self.field_type? {
            FieldType::Byte => Some(self.value_offset_bytes[0] as u32),
            FieldType::Short => Some(byte_order.read_u16(&self.value_offset_bytes) as u32),
            FieldType::Long | FieldType::Ifd => Some(byte_order.read_u32(&self.value_offset_bytes)),
            FieldType::Long8 | FieldType::Ifd8 => {
                u32::try_from(byte_order.read_u64(&self.value_offset_bytes)).ok()
            }
            _ => None,
        }
    }

    /// Read a single inline unsigned integer widened to u64.
    pub fn inline_u64(&self, byte_order: ByteOrder) -> Option<u64> {
        if !self.is_inline || self.count != 1 {
            return None;
        }
        match self.field_type? {
            FieldType::Long8 | FieldType::Ifd8 => Some(byte_order.read_u64(&self.value_offset_bytes)),
            _ => self.inline_u32(byte_order).map(u64::from),
        }
    }
}

// =============================================================================
// Ifd
// =============================================================================

/// A parsed Image File Directory.
#[derive(Debug, Clone, Default)]
pub struct Ifd {
    pub entries: Vec<IfdEntry>,

    /// Tag id to position in `entries`; the first occurrence wins
    index: HashMap<u16, usize>,

    /// Offset of the next IFD, 0 at the end of the chain
    pub next_ifd_offset: u64,
}

impl Ifd {
    /// Byte size of a directory holding `entry_count` entries, `None` on
    /// overflow.
    pub fn calculate_size(entry_count: u64, header: &TiffHeader) -> Option<u64> {
        entry_count
            .checked_mul(header.ifd_entry_size() as u64)?
            .checked_add((header.ifd_count_size() + header.ifd_next_offset_size()) as u64)
    }

    /// Parse a directory from bytes starting at its entry count.
    pub fn parse(bytes: &[u8], header: &TiffHeader) -> Result<Self, TiffError> {
        let bo = header.byte_order;
        let count_size = header.ifd_count_size();
        if bytes.len() < count_size {
            return Err(TiffError::FileTooSmall {
                required: count_size as u64,
                actual: bytes.len() as u64,
            });
        }

        let entry_count = if header.is_bigtiff {
            bo.read_u64(bytes)
        } else {
            bo.read_u16(bytes) as u64
        };
        let required = Self::calculate_size(entry_count, header).unwrap_or(u64::MAX);
        if (bytes.len() as u64) < required {
            return Err(TiffError::FileTooSmall {
                required,
                actual: bytes.len() as u64,
            });
        }

        let entry_size = header.ifd_entry_size();
        let value_size = header.value_offset_size();
        let mut ifd = Ifd::default();

        for i in 0..entry_count as usize {
            let raw = &bytes[count_size + i * entry_size..][..entry_size];
            let tag_id = bo.read_u16(&raw[0..2]);
            let field_type_raw = bo.read_u16(&raw[2..4]);
            let (count, value_field) = if header.is_bigtiff {
                (bo.read_u64(&raw[4..12]), &raw[12..20])
            } else {
                (bo.read_u32(&raw[4..8]) as u64, &raw[8..12])
            };

            let field_type = FieldType::from_u16(field_type_raw);
            let is_inline = field_type
                .and_then(|t| count.checked_mul(t.size_in_bytes() as u64))
                .is_some_and(|size| size <= value_size as u64);

            let entry = IfdEntry {
                tag_id,
                field_type,
                field_type_raw,
                count,
                value_offset_bytes: value_field.to_vec(),
                is_inline,
            };
            ifd.index.entry(tag_id).or_insert(ifd.entries.len());
            ifd.entries.push(entry);
        }

        let next = &bytes[count_size + entry_count as usize * entry_size..];
        ifd.next_ifd_offset = if header.is_bigtiff {
            bo.read_u64(next)
        } else {
            bo.read_u32(next) as u64
        };

        Ok(ifd)
    }

    /// Look up an entry by tag.
    pub fn get_entry_by_tag(&self, tag: TiffTag) -> Option<&IfdEntry> {
        self.get_entry(tag.as_u16())
    }

    /// Look up an entry by raw tag id.
    pub fn get_entry(&self, tag_id: u16) -> Option<&IfdEntry> {
        self.index.get(&tag_id).map(|&i| &self.entries[i])
    }

    fn inline_u32(&self, tag: TiffTag, byte_order: ByteOrder) -> Option<u32> {
        self.get_entry_by_tag(tag)?.inline_u32(byte_order)
    }

    pub fn image_width(&self, byte_order: ByteOrder) -> Option<u32> {
        self.inline_u32(TiffTag::ImageWidth, byte_order)
    }

    pub fn image_height(&self, byte_order: ByteOrder) -> Option<u32> {
        self.inline_u32(TiffTag::ImageLength, byte_order)
    }

    pub fn tile_width(&self, byte_order: ByteOrder) -> Option<u32> {
        self.inline_u32(TiffTag::TileWidth, byte_order)
    }

    pub fn tile_height(&self, byte_order: ByteOrder) -> Option<u32> {
        self.inline_u32(TiffTag::TileLength, byte_order)
    }

    pub fn compression(&self, byte_order: ByteOrder) -> Option<u16> {
        self.inline_u32(TiffTag::Compression, byte_order)
            .and_then(|v| u16::try_from(v).ok())
    }

    /// Whether the directory stores its pixels as tiles.
    pub fn is_tiled(&self) -> bool {
        self.get_entry_by_tag(TiffTag::TileWidth).is_some()
            && self.get_entry_by_tag(TiffTag::TileOffsets).is_some()
    }

    /// Whether the directory stores its pixels as strips.
    pub fn is_stripped(&self) -> bool {
        self.get_entry_by_tag(TiffTag::StripOffsets).is_some()
    }
}

// =============================================================================
// Directory chain
// =============================================================================

/// Read one directory at `offset`.
pub fn read_ifd(
    reader: &(impl RangeReader + ?Sized),
    header: &TiffHeader,
    offset: u64,
) -> Result<Ifd, TiffError> {
    let size = reader.size();
    let count_size = header.ifd_count_size() as u64;
    if offset.checked_add(count_size).map_or(true, |end| end > size) {
        return Err(TiffError::InvalidIfdOffset(offset));
    }

    let count_bytes = reader.read_exact_at(offset, count_size as usize)?;
    let entry_count = if header.is_bigtiff {
        header.byte_order.read_u64(&count_bytes)
    } else {
        header.byte_order.read_u16(&count_bytes) as u64
    };
    if entry_count > MAX_IFD_ENTRIES {
        return Err(TiffError::InvalidTagValue {
            tag: "IFD entry count",
            message: format!("{entry_count} entries at offset {offset}"),
        });
    }

    let ifd_size = Ifd::calculate_size(entry_count, header).unwrap_or(u64::MAX);
    if offset.checked_add(ifd_size).map_or(true, |end| end > size) {
        return Err(TiffError::FileTooSmall {
            required: offset.saturating_add(ifd_size),
            actual: size,
        });
    }

    let bytes = reader.read_exact_at(offset, ifd_size as usize)?;
    Ifd::parse(&bytes, header)
}

/// Follow the IFD chain from the header, rejecting loops and runaway chains.
pub fn read_ifd_chain(
    reader: &(impl RangeReader + ?Sized),
    header: &TiffHeader,
) -> Result<Vec<Ifd>, TiffError> {
    let mut ifds = Vec::new();
    let mut visited = HashSet::new();
    let mut offset = header.first_ifd_offset;

    while offset != 0 {
        if !visited.insert(offset) {
            return Err(TiffError::IfdLoop(offset));
        }
        if ifds.len() >= MAX_IFDS {
            return Err(TiffError::TooManyIfds(MAX_IFDS));
        }

        let ifd = read_ifd(reader, header, offset)?;
        debug!(
            index = ifds.len(),
            offset,
            entries = ifd.entries.len(),
            "Parsed IFD"
        );
        offset = ifd.next_ifd_offset;
        ifds.push(ifd);
    }

    Ok(ifds)
}

// =============================================================================
// Tests
// =============================================================================
