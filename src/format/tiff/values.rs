//! TIFF tag value reading.
//!
//! Values are either inline in the IFD entry or stored at an offset. Arrays
//! such as TileOffsets are fetched with a single positional read.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::FieldType;

// =============================================================================
// ValueReader
// =============================================================================

/// Reads tag values respecting the file's byte order and offset width.
pub struct ValueReader<'a, R: RangeReader + ?Sized> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader + ?Sized> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Raw bytes of an entry's value, inline or fetched from the file.
    ///
    /// Out-of-file values are reported as an invalid tag rather than an I/O
    /// failure: the directory itself is lying about its contents.
    pub fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            return Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ));
        }

        let offset = entry.value_offset(self.header.byte_order);
        let file_size = self.reader.size();
        if offset.checked_add(size).map_or(true, |end| end > file_size) {
            return Err(TiffError::InvalidTagValue {
                tag: entry.tag_name(),
                message: format!(
                    "{size} bytes at offset {offset} exceed file size {file_size}"
                ),
            });
        }
        Ok(self.reader.read_exact_at(offset, size as usize)?)
    }

    /// Read a single unsigned integer (BYTE, SHORT, LONG or LONG8).
    pub fn read_u64(&self, entry: &IfdEntry) -> Result<u64, TiffError> {
        if let Some(value) = entry.inline_u64(self.header.byte_order) {
            return Ok(value);
        }
        if entry.count != 1 {
            return Err(TiffError::InvalidTagValue {
                tag: entry.tag_name(),
                message: format!("expected count 1, got {}", entry.count),
            });
        }
        self.read_u64_array(entry)?
            .first()
            .copied()
            .ok_or(TiffError::MissingTag(entry.tag_name()))
    }

    /// Read a single unsigned integer that must fit in 32 bits.
    pub fn read_u32(&self, entry: &IfdEntry) -> Result<u32, TiffError> {
        let value = self.read_u64(entry)?;
        u32::try_from(value).map_err(|_| TiffError::InvalidTagValue {
            tag: entry.tag_name(),
            message: format!("{value} does not fit in 32 bits"),
        })
    }

    /// Read an array of unsigned integers widened to u64.
    ///
    /// This is the path for TileOffsets, TileByteCounts and their strip
    /// counterparts.
    pub fn read_u64_array(&self, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;
        if entry.count == 0 {
            return Ok(Vec::new());
        }

        let bo = self.header.byte_order;
        let bytes = self.read_bytes(entry)?;
        let values = match field_type {
            FieldType::Byte => bytes.iter().map(|&b| b as u64).collect(),
            FieldType::Short => bytes.chunks_exact(2).map(|c| bo.read_u16(c) as u64).collect(),
            FieldType::Long | FieldType::Ifd => {
                bytes.chunks_exact(4).map(|c| bo.read_u32(c) as u64).collect()
            }
            FieldType::Long8 | FieldType::Ifd8 => {
                bytes.chunks_exact(8).map(|c| bo.read_u64(c)).collect()
            }
            other => {
                return Err(TiffError::InvalidTagValue {
                    tag: entry.tag_name(),
                    message: format!("expected an unsigned integer type, got {other:?}"),
                })
            }
        };
        Ok(values)
    }

    /// Read a single RATIONAL (or integer) as a float.
    pub fn read_rational(&self, entry: &IfdEntry) -> Result<f64, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;
        let bo = self.header.byte_order;

        match field_type {
            FieldType::Rational => {
                let bytes = self.read_bytes(entry)?;
                if bytes.len() < 8 {
                    return Err(TiffError::InvalidTagValue {
                        tag: entry.tag_name(),
                        message: "empty RATIONAL".to_string(),
                    });
                }
                let numerator = bo.read_u32(&bytes[0..4]);
                let denominator = bo.read_u32(&bytes[4..8]);
                if denominator == 0 {
                    return Err(TiffError::InvalidTagValue {
                        tag: entry.tag_name(),
                        message: "zero denominator".to_string(),
                    });
                }
                Ok(numerator as f64 / denominator as f64)
            }
            FieldType::Byte | FieldType::Short | FieldType::Long => {
                Ok(self.read_u64(entry)? as f64)
            }
            other => Err(TiffError::InvalidTagValue {
                tag: entry.tag_name(),
                message: format!("expected RATIONAL, got {other:?}"),
            }),
        }
    }

    /// Read an ASCII value, stopping at the first NUL.
    pub fn read_string(&self, entry: &IfdEntry) -> Result<String, TiffError> {
        self.read_string_prefix(entry, usize::MAX)
    }

    /// Read at most `limit` bytes of an ASCII value.
    ///
    /// Format detection uses this to avoid pulling multi-megabyte
    /// descriptions off disk.
    pub fn read_string_prefix(&self, entry: &IfdEntry, limit: usize) -> Result<String, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;
        if !matches!(field_type, FieldType::Ascii | FieldType::Byte | FieldType::Undefined) {
            return Err(TiffError::InvalidTagValue {
                tag: entry.tag_name(),
                message: format!("expected ASCII, got {field_type:?}"),
            });
        }

        let bytes = if entry.count as u128 > limit as u128 && !entry.is_inline {
            let truncated = IfdEntry {
                count: limit as u64,
                ..entry.clone()
            };
            self.read_bytes(&truncated)?
        } else {
            self.read_bytes(entry)?
        };

        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

// =============================================================================
// Tests
// =============================================================================
