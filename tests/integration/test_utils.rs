//! Test utilities for integration tests.
//!
//! Provides:
//! - A TIFF/BigTIFF writer for synthetic slides in either byte order
//! - A deterministic pixel pattern and expected-region helper
//! - Fixtures for an Aperio-style pyramid and generic tiled TIFFs

#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;

use flate2::write::ZlibEncoder;
use flate2::Compression as ZlibLevel;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use tempfile::TempDir;

// =============================================================================
// Pixel pattern
// =============================================================================

/// Deterministic RGB value of pixel (x, y) in the image seeded with `seed`.
pub fn pattern(seed: usize, x: u32, y: u32) -> [u8; 3] {
    let seed = seed as u32;
    [
        (x.wrapping_mul(7).wrapping_add(seed * 31) % 256) as u8,
        (y.wrapping_mul(3).wrapping_add(seed * 17) % 256) as u8,
        ((x ^ y).wrapping_add(seed * 5) % 256) as u8,
    ]
}

/// Value written to the padding of edge tiles; must never show up in reads.
pub const PADDING: [u8; 3] = [0xEE, 0x11, 0xEE];

/// RGBA bytes a region read of a `pattern` image should return.
pub fn expected_region(
    seed: usize,
    (level_width, level_height): (u32, u32),
    x: i64,
    y: i64,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(width as usize * height as usize * 4);
    for row in 0..height as i64 {
        for col in 0..width as i64 {
            let (px, py) = (x + col, y + row);
            if px < 0 || py < 0 || px >= level_width as i64 || py >= level_height as i64 {
                out.extend_from_slice(&[0, 0, 0, 0]);
            } else {
                let [r, g, b] = pattern(seed, px as u32, py as u32);
                out.extend_from_slice(&[r, g, b, 255]);
            }
        }
    }
    out
}

// =============================================================================
// Image descriptions
// =============================================================================

/// Chunk compression of a synthetic image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    None,
    Lzw,
    Deflate,
    /// Deflate with horizontal differencing (Predictor = 2)
    DeflatePredictor,
    /// Complete JPEG stream per chunk
    Jpeg,
    /// Tables moved to JPEGTables, chunks hold abbreviated streams
    AbbreviatedJpeg,
}

impl Codec {
    fn compression(self) -> u16 {
        match self {
            Codec::None => 1,
            Codec::Lzw => 5,
            Codec::Jpeg | Codec::AbbreviatedJpeg => 7,
            Codec::Deflate | Codec::DeflatePredictor => 8,
        }
    }

    fn is_jpeg(self) -> bool {
        matches!(self, Codec::Jpeg | Codec::AbbreviatedJpeg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Tiled { width: u32, height: u32 },
    Strips { rows: u32 },
}

/// A typed tag value.
#[derive(Debug, Clone)]
pub enum Value {
    Short(Vec<u16>),
    Long(Vec<u32>),
    Long8(Vec<u64>),
    Ascii(String),
    Rational(Vec<(u32, u32)>),
    Undefined(Vec<u8>),
}

impl Value {
    fn field_type(&self) -> u16 {
        match self {
            Value::Short(_) => 3,
            Value::Long(_) => 4,
            Value::Long8(_) => 16,
            Value::Ascii(_) => 2,
            Value::Rational(_) => 5,
            Value::Undefined(_) => 7,
        }
    }

    fn count(&self) -> u64 {
        match self {
            Value::Short(v) => v.len() as u64,
            Value::Long(v) => v.len() as u64,
            Value::Long8(v) => v.len() as u64,
            Value::Ascii(s) => s.len() as u64 + 1,
            Value::Rational(v) => v.len() as u64,
            Value::Undefined(v) => v.len() as u64,
        }
    }

    fn encode(&self, order: Endian) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Value::Short(v) => v.iter().for_each(|&x| order.put_u16(&mut out, x)),
            Value::Long(v) => v.iter().for_each(|&x| order.put_u32(&mut out, x)),
            Value::Long8(v) => v.iter().for_each(|&x| order.put_u64(&mut out, x)),
            Value::Ascii(s) => {
                out.extend_from_slice(s.as_bytes());
                out.push(0);
            }
            Value::Rational(v) => v.iter().for_each(|&(n, d)| {
                order.put_u32(&mut out, n);
                order.put_u32(&mut out, d);
            }),
            Value::Undefined(v) => out.extend_from_slice(v),
        }
        out
    }
}

/// One image directory to write.
#[derive(Debug, Clone)]
pub struct ImageSpec {
    pub width: u32,
    pub height: u32,
    pub layout: Layout,
    pub codec: Codec,
    /// Seed passed to [`pattern`]
    pub seed: usize,
    pub description: Option<String>,
    pub extra_tags: Vec<(u16, Value)>,
    /// Replace (offset, byte count) of one chunk after writing
    pub chunk_override: Option<(usize, Option<u64>, Option<u64>)>,
    /// Leave the chunk index this many entries short
    pub drop_chunks: usize,
}

impl ImageSpec {
    pub fn tiled(width: u32, height: u32, tile: u32, seed: usize) -> Self {
        Self {
            width,
            height,
            layout: Layout::Tiled {
                width: tile,
                height: tile,
            },
            codec: Codec::None,
            seed,
            description: None,
            extra_tags: Vec::new(),
            chunk_override: None,
            drop_chunks: 0,
        }
    }

    pub fn strips(width: u32, height: u32, rows: u32, seed: usize) -> Self {
        Self {
            layout: Layout::Strips { rows },
            ..Self::tiled(width, height, 16, seed)
        }
    }

    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tag(mut self, tag: u16, value: Value) -> Self {
        self.extra_tags.push((tag, value));
        self
    }

    pub fn override_chunk(mut self, index: usize, offset: Option<u64>, count: Option<u64>) -> Self {
        self.chunk_override = Some((index, offset, count));
        self
    }

    pub fn drop_chunks(mut self, count: usize) -> Self {
        self.drop_chunks = count;
        self
    }

    fn chunk_size(&self) -> (u32, u32) {
        match self.layout {
            Layout::Tiled { width, height } => (width, height),
            Layout::Strips { rows } => (self.width, rows.min(self.height)),
        }
    }

    fn grid(&self) -> (u32, u32) {
        let (cw, ch) = self.chunk_size();
        (self.width.div_ceil(cw), self.height.div_ceil(ch))
    }

    /// Raw interleaved RGB samples of one chunk as stored.
    ///
    /// Tiles are padded to the full tile size; the last strip is short.
    pub fn chunk_samples(&self, col: u32, row: u32) -> (u32, u32, Vec<u8>) {
        let (cw, ch) = self.chunk_size();
        let stored_height = match self.layout {
            Layout::Tiled { .. } => ch,
            Layout::Strips { .. } => ch.min(self.height - row * ch),
        };
        let mut samples = Vec::with_capacity(cw as usize * stored_height as usize * 3);
        for y in 0..stored_height {
            for x in 0..cw {
                let (px, py) = (col * cw + x, row * ch + y);
                if px < self.width && py < self.height {
                    samples.extend_from_slice(&pattern(self.seed, px, py));
                } else {
                    samples.extend_from_slice(&PADDING);
                }
            }
        }
        (cw, stored_height, samples)
    }
}

// =============================================================================
// Chunk encoding
// =============================================================================

fn encode_chunk(codec: Codec, width: u32, height: u32, mut samples: Vec<u8>) -> Vec<u8> {
    match codec {
        Codec::None => samples,
        Codec::Lzw => weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
            .encode(&samples)
            .unwrap(),
        Codec::Deflate => zlib(&samples),
        Codec::DeflatePredictor => {
            let stride = width as usize * 3;
            for row in samples.chunks_exact_mut(stride) {
                for i in (3..row.len()).rev() {
                    row[i] = row[i].wrapping_sub(row[i - 3]);
                }
            }
            zlib(&samples)
        }
        Codec::Jpeg | Codec::AbbreviatedJpeg => encode_jpeg(width, height, samples),
    }
}

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), ZlibLevel::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Encode RGB samples as a complete baseline JPEG.
pub fn encode_jpeg(width: u32, height: u32, samples: Vec<u8>) -> Vec<u8> {
    let image = RgbImage::from_raw(width, height, samples).unwrap();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, 90)
        .encode_image(&image)
        .unwrap();
    buf
}

/// Split a complete JPEG into (tables, abbreviated stream).
///
/// DQT and DHT segments before the first scan move to the tables stream.
pub fn split_jpeg_tables(jpeg: &[u8]) -> (Vec<u8>, Vec<u8>) {
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "not a JPEG stream");
    let mut tables = vec![0xFF, 0xD8];
    let mut tile = vec![0xFF, 0xD8];
    let mut pos = 2;
    loop {
        assert_eq!(jpeg[pos], 0xFF, "lost marker sync at {pos}");
        let marker = jpeg[pos + 1];
        if marker == 0xDA {
            tile.extend_from_slice(&jpeg[pos..]);
            break;
        }
        let length = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        let segment = &jpeg[pos..pos + 2 + length];
        if marker == 0xDB || marker == 0xC4 {
            tables.extend_from_slice(segment);
        } else {
            tile.extend_from_slice(segment);
        }
        pos += 2 + length;
    }
    tables.extend_from_slice(&[0xFF, 0xD9]);
    (tables, tile)
}

// =============================================================================
// TIFF writer
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    fn put_u16(self, out: &mut Vec<u8>, v: u16) {
        match self {
            Endian::Little => out.extend_from_slice(&v.to_le_bytes()),
            Endian::Big => out.extend_from_slice(&v.to_be_bytes()),
        }
    }

    fn put_u32(self, out: &mut Vec<u8>, v: u32) {
        match self {
            Endian::Little => out.extend_from_slice(&v.to_le_bytes()),
            Endian::Big => out.extend_from_slice(&v.to_be_bytes()),
        }
    }

    fn put_u64(self, out: &mut Vec<u8>, v: u64) {
        match self {
            Endian::Little => out.extend_from_slice(&v.to_le_bytes()),
            Endian::Big => out.extend_from_slice(&v.to_be_bytes()),
        }
    }

    fn patch(self, out: &mut [u8], at: usize, v: u64, width: usize) {
        let bytes = match (self, width) {
            (Endian::Little, 4) => (v as u32).to_le_bytes().to_vec(),
            (Endian::Big, 4) => (v as u32).to_be_bytes().to_vec(),
            (Endian::Little, _) => v.to_le_bytes().to_vec(),
            (Endian::Big, _) => v.to_be_bytes().to_vec(),
        };
        out[at..at + width].copy_from_slice(&bytes);
    }
}

/// Writes images into a classic TIFF or BigTIFF byte stream.
///
/// Layout per image: chunk data, out-of-line tag values, then the IFD.
/// Each IFD's next pointer is patched once the following IFD is placed.
#[derive(Debug, Clone, Copy)]
pub struct TiffWriter {
    pub endian: Endian,
    pub bigtiff: bool,
}

impl Default for TiffWriter {
    fn default() -> Self {
        Self {
            endian: Endian::Little,
            bigtiff: false,
        }
    }
}

impl TiffWriter {
    pub fn new(endian: Endian, bigtiff: bool) -> Self {
        Self { endian, bigtiff }
    }

    fn offset_width(&self) -> usize {
        if self.bigtiff {
            8
        } else {
            4
        }
    }

    fn offsets_value(&self, values: Vec<u64>) -> Value {
        if self.bigtiff {
            Value::Long8(values)
        } else {
            Value::Long(values.into_iter().map(|v| v as u32).collect())
        }
    }

    pub fn write(&self, images: &[ImageSpec]) -> Vec<u8> {
        let order = self.endian;
        let mut out = Vec::new();
        out.extend_from_slice(match order {
            Endian::Little => b"II",
            Endian::Big => b"MM",
        });
        if self.bigtiff {
            order.put_u16(&mut out, 43);
            order.put_u16(&mut out, 8);
            order.put_u16(&mut out, 0);
        } else {
            order.put_u16(&mut out, 42);
        }
        let mut next_pointer = out.len();
        out.resize(out.len() + self.offset_width(), 0);

        for image in images {
            let ifd_offset = self.write_image(&mut out, image);
            order.patch(&mut out, next_pointer, ifd_offset, self.offset_width());
            next_pointer = out.len() - self.offset_width();
        }
        out
    }

    /// Append one image and its IFD, returning the IFD offset.
    fn write_image(&self, out: &mut Vec<u8>, image: &ImageSpec) -> u64 {
        let order = self.endian;
        let (cols, rows) = image.grid();

        let mut offsets = Vec::new();
        let mut counts = Vec::new();
        let mut jpeg_tables = None;
        for row in 0..rows {
            for col in 0..cols {
                let (w, h, samples) = image.chunk_samples(col, row);
                let mut data = encode_chunk(image.codec, w, h, samples);
                if image.codec == Codec::AbbreviatedJpeg {
                    let (tables, tile) = split_jpeg_tables(&data);
                    jpeg_tables.get_or_insert(tables);
                    data = tile;
                }
                offsets.push(out.len() as u64);
                counts.push(data.len() as u64);
                out.extend_from_slice(&data);
            }
        }
        if let Some((index, offset, count)) = image.chunk_override {
            if let Some(offset) = offset {
                offsets[index] = offset;
            }
            if let Some(count) = count {
                counts[index] = count;
            }
        }
        offsets.truncate(offsets.len() - image.drop_chunks);
        counts.truncate(counts.len() - image.drop_chunks);

        let (chunk_width, chunk_height) = image.chunk_size();
        let photometric = if image.codec.is_jpeg() { 6 } else { 2 };
        let mut tags: Vec<(u16, Value)> = vec![
            (256, Value::Long(vec![image.width])),
            (257, Value::Long(vec![image.height])),
            (258, Value::Short(vec![8, 8, 8])),
            (259, Value::Short(vec![image.codec.compression()])),
            (262, Value::Short(vec![photometric])),
            (277, Value::Short(vec![3])),
            (284, Value::Short(vec![1])),
        ];
        if let Some(description) = &image.description {
            tags.push((270, Value::Ascii(description.clone())));
        }
        if image.codec == Codec::DeflatePredictor {
            tags.push((317, Value::Short(vec![2])));
        }
        match image.layout {
            Layout::Tiled { .. } => {
                tags.push((322, Value::Long(vec![chunk_width])));
                tags.push((323, Value::Long(vec![chunk_height])));
                tags.push((324, self.offsets_value(offsets)));
                tags.push((325, self.offsets_value(counts)));
            }
            Layout::Strips { .. } => {
                tags.push((273, self.offsets_value(offsets)));
                tags.push((278, Value::Long(vec![chunk_height])));
                tags.push((279, self.offsets_value(counts)));
            }
        }
        if let Some(tables) = jpeg_tables {
            tags.push((347, Value::Undefined(tables)));
        }
        // Extra tags replace defaults with the same number
        tags.retain(|(tag, _)| !image.extra_tags.iter().any(|(extra, _)| extra == tag));
        tags.extend(image.extra_tags.iter().cloned());
        tags.sort_by_key(|(tag, _)| *tag);

        // Out-of-line values go before the IFD
        let inline = self.offset_width();
        let mut fields = Vec::with_capacity(tags.len());
        for (tag, value) in &tags {
            let bytes = value.encode(order);
            let field = if bytes.len() <= inline {
                let mut field = bytes;
                field.resize(inline, 0);
                field
            } else {
                if out.len() % 2 == 1 {
                    out.push(0);
                }
                let offset = out.len() as u64;
                out.extend_from_slice(&bytes);
                let mut field = Vec::new();
                if self.bigtiff {
                    order.put_u64(&mut field, offset);
                } else {
                    order.put_u32(&mut field, offset as u32);
                }
                field
            };
            fields.push((*tag, value.field_type(), value.count(), field));
        }

        if out.len() % 2 == 1 {
            out.push(0);
        }
        let ifd_offset = out.len() as u64;
        if self.bigtiff {
            order.put_u64(out, fields.len() as u64);
        } else {
            order.put_u16(out, fields.len() as u16);
        }
        for (tag, field_type, count, field) in fields {
            order.put_u16(out, tag);
            order.put_u16(out, field_type);
            if self.bigtiff {
                order.put_u64(out, count);
            } else {
                order.put_u32(out, count as u32);
            }
            out.extend_from_slice(&field);
        }
        out.resize(out.len() + self.offset_width(), 0);
        ifd_offset
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Write `bytes` to a file named `name` inside `dir`.
pub fn write_file(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Level sizes of the Aperio fixture.
pub const APERIO_LEVELS: [(u32, u32); 3] = [(2000, 1000), (500, 250), (125, 62)];

pub const APERIO_DESCRIPTION: &str = "Aperio Image Library v12.0.15\r\n\
    2000x1000 [0,0 2000x1000] (256x256) JPEG/RGB Q=70|AppMag = 20|MPP = 0.499|Filename = fixture";

/// Seeds of the associated images.
pub const THUMBNAIL_SEED: usize = 10;
pub const LABEL_SEED: usize = 11;
pub const MACRO_SEED: usize = 12;

/// Aperio-style slide: three tiled levels at 256x256 plus thumbnail, label
/// and macro strips, in the usual SVS directory order. Level `i` uses seed
/// `i`.
pub fn aperio_images(codec: Codec) -> Vec<ImageSpec> {
    let level = |index: usize| {
        let (width, height) = APERIO_LEVELS[index];
        ImageSpec::tiled(width, height, 256, index).codec(codec)
    };
    vec![
        level(0).description(APERIO_DESCRIPTION),
        ImageSpec::strips(200, 100, 16, THUMBNAIL_SEED)
            .description("Aperio Image Library v12.0.15\r\n2000x1000 -> 200x100 - |"),
        level(1).description("Aperio Image Library v12.0.15\r\n2000x1000 -> 500x250 - |"),
        level(2).description("Aperio Image Library v12.0.15\r\n2000x1000 -> 125x62 - |"),
        ImageSpec::strips(100, 80, 32, LABEL_SEED)
            .codec(Codec::Lzw)
            .description("Aperio Image Library v12.0.15\r\nlabel 100x80"),
        ImageSpec::strips(300, 120, 40, MACRO_SEED)
            .codec(Codec::Deflate)
            .description("Aperio Image Library v12.0.15\r\nmacro 300x120"),
    ]
}

/// Write the Aperio fixture with uncompressed levels.
pub fn aperio_fixture(dir: &TempDir) -> PathBuf {
    let bytes = TiffWriter::default().write(&aperio_images(Codec::None));
    write_file(dir, "fixture.svs", &bytes)
}

/// Generic tiled pyramid, stored smallest level first. Resolution tags
/// sit on IFD 0: 40000 px/cm is 0.25 um/px, 20000 px/cm is 0.5 um/px.
pub fn generic_images(codec: Codec) -> Vec<ImageSpec> {
    vec![
        ImageSpec::tiled(150, 100, 64, 2)
            .codec(codec)
            .tag(282, Value::Rational(vec![(40_000, 1)]))
            .tag(283, Value::Rational(vec![(20_000, 1)]))
            .tag(296, Value::Short(vec![3]))
            .tag(305, Value::Ascii("fixture-writer 1.0".to_string())),
        ImageSpec::tiled(600, 400, 128, 0).codec(codec),
        ImageSpec::tiled(300, 200, 128, 1).codec(codec),
    ]
}

/// Level sizes of the generic fixture after ordering.
pub const GENERIC_LEVELS: [(u32, u32); 3] = [(600, 400), (300, 200), (150, 100)];
