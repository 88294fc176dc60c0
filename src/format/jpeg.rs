//! Abbreviated JPEG stream handling.
//!
//! Tiled TIFFs (Aperio SVS in particular) usually store JPEG tiles as
//! abbreviated streams: the quantization and Huffman tables live once in
//! the `JPEGTables` tag and every tile holds only SOI, frame header, scan
//! data and EOI. Before decoding, the shared tables are spliced in:
//!
//! ```text
//! tables:  SOI DQT DHT ... EOI
//! tile:    SOI SOF SOS <entropy data> EOI
//! merged:  SOI DQT DHT ... SOF SOS <entropy data> EOI
//! ```

use bytes::{Bytes, BytesMut};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

const MARKER_DQT: u8 = 0xDB;
const MARKER_SOS: u8 = 0xDA;

/// Whether a stream reaches its first scan without defining any
/// quantization table.
///
/// Walks marker segments from SOI; anything that does not start with SOI is
/// reported as not abbreviated and left for the decoder to reject.
pub fn is_abbreviated(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }

    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return false;
        }
        let marker = data[pos + 1];
        match marker {
            // fill bytes
            0xFF => pos += 1,
            MARKER_DQT => return false,
            MARKER_SOS => return true,
            // standalone markers carry no length
            0x01 | 0xD0..=0xD7 => pos += 2,
            _ => {
                let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
                pos += 2 + length;
            }
        }
    }
    false
}

/// Splice shared tables into an abbreviated tile stream.
///
/// Complete streams are returned untouched so tiles that carry their own
/// tables keep them.
pub fn merge_tables(tables: &[u8], tile: &[u8]) -> Bytes {
    if tables.is_empty() || !is_abbreviated(tile) {
        return Bytes::copy_from_slice(tile);
    }

    let tables_end = if tables.ends_with(&EOI) {
        tables.len() - 2
    } else {
        tables.len()
    };
    let tables_body = if tables.starts_with(&SOI) {
        &tables[2..tables_end]
    } else {
        &tables[..tables_end]
    };

    let mut merged = BytesMut::with_capacity(tile.len() + tables_body.len());
    merged.extend_from_slice(&SOI);
    merged.extend_from_slice(tables_body);
    merged.extend_from_slice(&tile[2..]);
    merged.freeze()
}
