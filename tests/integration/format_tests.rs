//! Format-specific integration tests.
//!
//! Tests verify:
//! - TIFF parser handles little-endian and big-endian files
//! - BigTIFF files are parsed correctly
//! - Every supported codec decodes to the same pixels
//! - JPEGTables are merged into abbreviated tile streams
//! - Unsupported encodings fail at open with a parse error

use tempfile::TempDir;

use wsi_reader::{detect, Detection, Region, SlideError, SlideFormat, SlideHandle, TileCoord};

use super::test_utils::{
    aperio_images, encode_jpeg, expected_region, generic_images, write_file, Codec, Endian,
    ImageSpec, TiffWriter, Value, APERIO_LEVELS, GENERIC_LEVELS, LABEL_SEED,
};

const WRITERS: [(Endian, bool); 4] = [
    (Endian::Little, false),
    (Endian::Big, false),
    (Endian::Little, true),
    (Endian::Big, true),
];

fn open_images(dir: &TempDir, name: &str, writer: TiffWriter, images: &[ImageSpec]) -> SlideHandle {
    let path = write_file(dir, name, &writer.write(images));
    SlideHandle::open(path).unwrap()
}

// =============================================================================
// Byte order and BigTIFF
// =============================================================================

#[test]
fn test_header_magic() {
    let images = [ImageSpec::tiled(64, 64, 64, 0)];
    let le = TiffWriter::new(Endian::Little, false).write(&images);
    let be = TiffWriter::new(Endian::Big, false).write(&images);
    let big = TiffWriter::new(Endian::Little, true).write(&images);

    assert_eq!(&le[..4], &[b'I', b'I', 42, 0]);
    assert_eq!(&be[..4], &[b'M', b'M', 0, 42]);
    assert_eq!(&big[..4], &[b'I', b'I', 43, 0]);
}

#[test]
fn test_byte_orders_and_bigtiff_read_identically() {
    let dir = TempDir::new().unwrap();
    let images = generic_images(Codec::Lzw);

    let mut reads = Vec::new();
    for (index, (endian, bigtiff)) in WRITERS.into_iter().enumerate() {
        let writer = TiffWriter::new(endian, bigtiff);
        let slide = open_images(&dir, &format!("variant{index}.tif"), writer, &images);

        assert_eq!(slide.format().unwrap(), SlideFormat::GenericTiff);
        assert_eq!(slide.all_level_dimensions().unwrap(), GENERIC_LEVELS.to_vec());
        assert_eq!(slide.property("openslide.mpp-x").unwrap(), "0.25");

        let pixels = slide.read_region(&Region::new(0, 50, 70, 300, 200)).unwrap();
        assert_eq!(
            pixels.pixels(),
            expected_region(0, GENERIC_LEVELS[0], 50, 70, 300, 200).as_slice(),
            "{endian:?} bigtiff={bigtiff}"
        );
        reads.push((
            pixels,
            slide.property("openslide.quickhash-1").unwrap().to_string(),
        ));
    }

    let (first_pixels, first_hash) = &reads[0];
    for (pixels, hash) in &reads[1..] {
        assert_eq!(pixels, first_pixels);
        assert_eq!(hash, first_hash);
    }
}

#[test]
fn test_big_endian_bigtiff_aperio() {
    let dir = TempDir::new().unwrap();
    let slide = open_images(
        &dir,
        "big.svs",
        TiffWriter::new(Endian::Big, true),
        &aperio_images(Codec::Deflate),
    );

    assert_eq!(slide.vendor().unwrap(), "aperio");
    assert_eq!(slide.all_level_dimensions().unwrap(), APERIO_LEVELS.to_vec());
    assert_eq!(slide.level_downsamples().unwrap(), vec![1.0, 4.0, 16.0]);
    assert_eq!(slide.property("aperio.MPP").unwrap(), "0.499");

    let label = slide.read_associated_image("label").unwrap();
    assert_eq!(
        label.pixels(),
        expected_region(LABEL_SEED, (100, 80), 0, 0, 100, 80).as_slice()
    );

    let pixels = slide.read_region(&Region::new(2, 100, 40, 50, 50)).unwrap();
    assert_eq!(
        pixels.pixels(),
        expected_region(2, APERIO_LEVELS[2], 100, 40, 50, 50).as_slice()
    );
}

// =============================================================================
// Codecs
// =============================================================================

#[test]
fn test_lossless_codecs_decode_exactly() {
    let dir = TempDir::new().unwrap();

    for codec in [Codec::None, Codec::Lzw, Codec::Deflate, Codec::DeflatePredictor] {
        let images = [ImageSpec::tiled(300, 200, 128, 3).codec(codec)];
        let slide = open_images(&dir, &format!("{codec:?}.tif"), TiffWriter::default(), &images);

        let pixels = slide.read_region(&Region::full_level(0, (300, 200))).unwrap();
        assert_eq!(
            pixels.pixels(),
            expected_region(3, (300, 200), 0, 0, 300, 200).as_slice(),
            "{codec:?}"
        );
    }
}

#[test]
fn test_jpeg_tile_matches_reference_decode() {
    let dir = TempDir::new().unwrap();
    let spec = ImageSpec::tiled(512, 256, 256, 4).codec(Codec::Jpeg);
    let slide = open_images(&dir, "jpeg.tif", TiffWriter::default(), &[spec.clone()]);

    let (width, height, samples) = spec.chunk_samples(1, 0);
    let reference = image::load_from_memory(&encode_jpeg(width, height, samples))
        .unwrap()
        .to_rgba8();

    let tile = slide.decode_tile(0, TileCoord::new(1, 0)).unwrap();
    assert_eq!((tile.width(), tile.height()), (256, 256));
    assert_eq!(tile.pixels(), reference.as_raw().as_slice());
}

#[test]
fn test_abbreviated_jpeg_matches_complete_jpeg() {
    let dir = TempDir::new().unwrap();
    let complete = open_images(
        &dir,
        "complete.tif",
        TiffWriter::default(),
        &[ImageSpec::tiled(600, 300, 256, 5).codec(Codec::Jpeg)],
    );
    let abbreviated = open_images(
        &dir,
        "abbreviated.tif",
        TiffWriter::default(),
        &[ImageSpec::tiled(600, 300, 256, 5).codec(Codec::AbbreviatedJpeg)],
    );

    let region = Region::full_level(0, (600, 300));
    let expected = complete.read_region(&region).unwrap();
    let actual = abbreviated.read_region(&region).unwrap();
    assert_eq!(actual, expected);

    // Clipped edge tiles keep only level pixels, all opaque
    let edge = abbreviated.decode_tile(0, TileCoord::new(2, 1)).unwrap();
    assert_eq!((edge.width(), edge.height()), (88, 44));
    assert!(edge.pixels().chunks_exact(4).all(|px| px[3] == 255));
}

#[test]
fn test_aperio_with_abbreviated_jpeg_levels() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        "jpeg.svs",
        &TiffWriter::default().write(&aperio_images(Codec::AbbreviatedJpeg)),
    );
    assert!(matches!(
        detect(&path),
        Detection::Recognized(SlideFormat::AperioSvs)
    ));

    let slide = SlideHandle::open(&path).unwrap();
    for level in 0..3 {
        let dims = slide.level_dimensions(level).unwrap();
        let pixels = slide
            .read_region(&Region::new(level, 0, 0, dims.0.min(300), dims.1.min(300)))
            .unwrap();
        assert!(pixels.pixels().chunks_exact(4).all(|px| px[3] == 255));
    }
}

// =============================================================================
// Rejected files
// =============================================================================

#[test]
fn test_unsupported_compression_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        "j2k.tif",
        &TiffWriter::default().write(&[ImageSpec::tiled(128, 128, 128, 0)
            .tag(259, Value::Short(vec![33005]))]),
    );

    let err = SlideHandle::open(&path).unwrap_err();
    assert!(matches!(err, SlideError::Parse { .. }), "{err:?}");
    assert!(err.to_string().contains("JPEG 2000"), "{err}");
}

#[test]
fn test_sixteen_bit_samples_are_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        "deep.tif",
        &TiffWriter::default().write(&[ImageSpec::tiled(128, 128, 128, 0)
            .tag(258, Value::Short(vec![16, 16, 16]))]),
    );

    assert!(matches!(
        SlideHandle::open(&path),
        Err(SlideError::Parse { .. })
    ));
}

#[test]
fn test_aperio_with_stripped_base_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        "stripped.svs",
        &TiffWriter::default().write(&[ImageSpec::strips(256, 256, 64, 0)
            .description("Aperio Image Library v12.0.15\r\n256x256|AppMag = 20")]),
    );

    assert!(matches!(
        detect(&path),
        Detection::Recognized(SlideFormat::AperioSvs)
    ));
    match SlideHandle::open(&path).unwrap_err() {
        SlideError::CorruptContainer { substructure, .. } => assert_eq!(substructure, "IFD 0"),
        other => panic!("expected CorruptContainer, got {other:?}"),
    }
}
