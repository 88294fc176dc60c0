//! Concurrency integration tests.
//!
//! Tests verify:
//! - Parallel region reads on one handle match serial reads
//! - The tile cache does not change pixels
//! - Closing while other threads read yields only complete results or
//!   `ClosedHandle`

use std::sync::Arc;
use std::thread;

use tempfile::TempDir;

use wsi_reader::{CancellationToken, OpenOptions, Region, SlideError, SlideHandle};

use super::test_utils::{aperio_fixture, expected_region, APERIO_LEVELS};

fn regions() -> Vec<Region> {
    let mut regions = Vec::new();
    for i in 0..16i64 {
        regions.push(Region::new(0, i * 97 - 40, i * 53 - 20, 300, 200));
        regions.push(Region::new(1, i * 23, i * 11, 120, 90));
    }
    regions.push(Region::new(2, -5, -5, 140, 70));
    regions
}

#[test]
fn test_parallel_reads_match_serial_reads() {
    let dir = TempDir::new().unwrap();
    let slide = Arc::new(SlideHandle::open(aperio_fixture(&dir)).unwrap());
    let regions = regions();

    let serial: Vec<_> = regions
        .iter()
        .map(|region| slide.read_region(region).unwrap())
        .collect();

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let slide = Arc::clone(&slide);
            let regions = regions.clone();
            thread::spawn(move || {
                // Each worker walks the list from a different start
                (0..regions.len())
                    .map(|i| (i + worker * 5) % regions.len())
                    .map(|i| (i, slide.read_region(&regions[i]).unwrap()))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for handle in handles {
        for (index, pixels) in handle.join().unwrap() {
            assert_eq!(pixels, serial[index], "region {:?}", regions[index]);
        }
    }
}

#[test]
fn test_uncached_handle_reads_identically() {
    let dir = TempDir::new().unwrap();
    let path = aperio_fixture(&dir);
    let cached = SlideHandle::open(&path).unwrap();
    let uncached = SlideHandle::open_with(&path, OpenOptions::new().tile_cache_bytes(0)).unwrap();

    for region in regions() {
        assert_eq!(
            cached.read_region(&region).unwrap(),
            uncached.read_region(&region).unwrap(),
            "{region:?}"
        );
    }
}

#[test]
fn test_close_during_reads() {
    let dir = TempDir::new().unwrap();
    let slide = Arc::new(SlideHandle::open(aperio_fixture(&dir)).unwrap());
    let region = Region::new(0, 100, 100, 700, 500);
    let expected = expected_region(0, APERIO_LEVELS[0], 100, 100, 700, 500);

    thread::scope(|scope| {
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let slide = &slide;
                let region = &region;
                scope.spawn(move || {
                    let mut outcomes = Vec::new();
                    for _ in 0..10 {
                        outcomes.push(slide.read_region(region));
                    }
                    outcomes
                })
            })
            .collect();

        slide.close().unwrap();

        for reader in readers {
            for outcome in reader.join().unwrap() {
                match outcome {
                    Ok(pixels) => assert_eq!(pixels.pixels(), expected.as_slice()),
                    Err(SlideError::ClosedHandle) => {}
                    Err(other) => panic!("unexpected error {other:?}"),
                }
            }
        }
    });

    assert!(slide.is_closed());
    assert!(matches!(
        slide.read_region(&region),
        Err(SlideError::ClosedHandle)
    ));
}

#[test]
fn test_cancel_from_another_thread() {
    let dir = TempDir::new().unwrap();
    let slide = Arc::new(SlideHandle::open_with(
        aperio_fixture(&dir),
        OpenOptions::new().tile_cache_bytes(0),
    )
    .unwrap());
    let token = CancellationToken::new();

    let worker = {
        let slide = Arc::clone(&slide);
        let token = token.clone();
        thread::spawn(move || {
            let mut outcomes = Vec::new();
            while !token.is_cancelled() {
                outcomes.push(slide.read_region_cancellable(
                    &Region::full_level(0, APERIO_LEVELS[0]),
                    &token,
                ));
            }
            // One read after the cancel is always observed
            outcomes.push(slide.read_region_cancellable(
                &Region::full_level(0, APERIO_LEVELS[0]),
                &token,
            ));
            outcomes
        })
    };

    token.cancel();
    let outcomes = worker.join().unwrap();
    assert!(matches!(outcomes.last(), Some(Err(SlideError::Cancelled))));
    for outcome in outcomes {
        match outcome {
            Ok(pixels) => assert_eq!(pixels.width(), APERIO_LEVELS[0].0),
            Err(SlideError::Cancelled) => {}
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }

    // The handle still serves reads after a cancelled one
    assert!(slide.read_region(&Region::new(0, 0, 0, 8, 8)).is_ok());
}
