//! Windowed COG reads against synthetic rasters.

use std::collections::BTreeSet;
use std::sync::Arc;

use cropwatch_common::{CropwatchError, CrsCode, GeoTransform, PixelWindow};
use storage::{CogReader, MemoryRangeReader, MemoryRasterSource, ObjectStorageConfig, ObjectStoreSource, RasterSource};
use test_utils::{position_value, CogBuilder, CogSample};

const HREF: &str = "mem://tile/B04.tif";

fn assert_positions(grid: &cropwatch_common::BandGrid, window: &PixelWindow) {
    for row in 0..window.height {
        for col in 0..window.width {
            let expected = position_value(window.col_off as usize + col, window.row_off as usize + row);
            assert_eq!(
                grid.get(row, col),
                Some(expected as f32),
                "pixel ({}, {}) of window",
                row,
                col
            );
        }
    }
}

#[tokio::test]
async fn test_reads_metadata() {
    let bytes = CogBuilder::new(300, 300).nodata("0").build();
    let reader = CogReader::open(Arc::new(MemoryRangeReader::new(HREF, bytes)), 16 * 1024)
        .await
        .unwrap();

    assert_eq!((reader.width(), reader.height()), (300, 300));
    assert_eq!(reader.crs(), CrsCode::Utm { zone: 47, north: true });
    assert_eq!(
        *reader.transform(),
        GeoTransform::north_up(590_000.0, 15_000.0, 100.0, 100.0)
    );
    assert_eq!(reader.nodata(), Some(0.0));
    assert!(reader.info().tiled);
}

#[tokio::test]
async fn test_tiled_window_values() {
    let bytes = CogBuilder::new(300, 300).sample(CogSample::F32).fill_with(position_value).build();
    let source = MemoryRasterSource::new().with_asset(HREF, bytes);

    let window = PixelWindow::new(157, 95, 111, 111);
    let grid = source.read_window(HREF, &window).await.unwrap();
    assert_eq!(grid.shape(), (111, 111));
    assert_positions(&grid, &window);
}

#[tokio::test]
async fn test_deflate_predictor_bigtiff_big_endian() {
    let bytes = CogBuilder::new(130, 90)
        .sample(CogSample::F32)
        .fill_with(position_value)
        .deflate()
        .predictor()
        .big_tiff()
        .big_endian()
        .tile_size(32, 16)
        .build();
    let source = MemoryRasterSource::new().with_asset(HREF, bytes);

    let window = PixelWindow::new(20, 10, 100, 75);
    let grid = source.read_window(HREF, &window).await.unwrap();
    assert_positions(&grid, &window);
}

#[tokio::test]
async fn test_stripped_layout_with_short_last_strip() {
    let bytes = CogBuilder::new(50, 45)
        .sample(CogSample::F32)
        .fill_with(position_value)
        .stripped(10)
        .deflate()
        .build();
    let source = MemoryRasterSource::new().with_asset(HREF, bytes);

    let window = PixelWindow::new(5, 38, 40, 7);
    let grid = source.read_window(HREF, &window).await.unwrap();
    assert_positions(&grid, &window);
}

#[tokio::test]
async fn test_signed_samples() {
    let bytes = CogBuilder::new(8, 8).sample(CogSample::I16).fill(-1234.0).build();
    let source = MemoryRasterSource::new().with_asset(HREF, bytes);

    let grid = source.read_window(HREF, &PixelWindow::new(0, 0, 8, 8)).await.unwrap();
    assert!(grid.data().iter().all(|v| *v == -1234.0));
}

#[tokio::test]
async fn test_requests_are_scoped_to_window_blocks() {
    let built = CogBuilder::new(300, 300)
        .fill_with(|c, r| ((c * 7 + r * 13) % 4096) as f64)
        .build_with_index();
    let file_len = built.bytes.len() as u64;
    let source = MemoryRasterSource::new()
        .with_asset(HREF, built.bytes.clone())
        .with_header_bytes(built.data_start as usize);

    let window = PixelWindow::new(157, 95, 111, 111);
    source.read_window(HREF, &window).await.unwrap();

    let requests = source.requests_for(HREF);
    assert_eq!(requests[0].range, 0..built.data_start, "header prefix first");

    // 5 tiles across; the window touches tile columns 2..=4 and rows 1..=3
    let expected: BTreeSet<(u64, u64)> = (1..=3)
        .flat_map(|by| (2..=4).map(move |bx| by * 5 + bx))
        .map(|i| (built.blocks[i as usize].start, built.blocks[i as usize].end))
        .collect();
    let tile_requests: BTreeSet<(u64, u64)> = requests[1..]
        .iter()
        .map(|r| (r.range.start, r.range.end))
        .collect();
    assert_eq!(tile_requests, expected);

    assert!(requests.iter().all(|r| r.len() < file_len));
    assert!(source.bytes_requested() < file_len / 2);
}

#[tokio::test]
async fn test_window_outside_raster() {
    let bytes = CogBuilder::new(100, 100).build();
    let source = MemoryRasterSource::new().with_asset(HREF, bytes);

    let err = source
        .read_window(HREF, &PixelWindow::new(200, 0, 10, 10))
        .await
        .unwrap_err();
    match err {
        CropwatchError::InvalidWindow(msg) => assert!(msg.contains("entirely outside"), "{}", msg),
        other => panic!("expected InvalidWindow, got {:?}", other),
    }

    let err = source
        .read_window(HREF, &PixelWindow::new(-5, -5, 10, 10))
        .await
        .unwrap_err();
    match err {
        CropwatchError::InvalidWindow(msg) => assert!(msg.contains("extends past"), "{}", msg),
        other => panic!("expected InvalidWindow, got {:?}", other),
    }
}

#[tokio::test]
async fn test_sparse_tile_reads_nodata() {
    let bytes = CogBuilder::new(128, 64)
        .fill(500.0)
        .nodata("65535")
        .sparse_block(1)
        .build();
    let source = MemoryRasterSource::new().with_asset(HREF, bytes);

    let grid = source.read_window(HREF, &PixelWindow::new(60, 0, 8, 1)).await.unwrap();
    assert_eq!(&grid.data()[..4], &[500.0; 4]);
    assert_eq!(&grid.data()[4..], &[65535.0; 4]);
    assert!(grid.is_nodata(grid.data()[7]));
}

#[tokio::test]
async fn test_nan_nodata() {
    let bytes = CogBuilder::new(4, 4)
        .sample(CogSample::F32)
        .fill(f64::NAN)
        .nodata("nan")
        .build();
    let source = MemoryRasterSource::new().with_asset(HREF, bytes);

    let grid = source.read_window(HREF, &PixelWindow::new(0, 0, 4, 4)).await.unwrap();
    assert!(grid.nodata().unwrap().is_nan());
    assert!(grid.data().iter().all(|v| grid.is_nodata(*v)));
}

#[tokio::test]
async fn test_unsupported_crs_is_reprojection_error() {
    let bytes = CogBuilder::new(4, 4).epsg(2154).build();
    let source = MemoryRasterSource::new().with_asset(HREF, bytes);

    let err = source.open(HREF).await.unwrap_err();
    assert!(matches!(err, CropwatchError::ReprojectionError(_)));
}

#[tokio::test]
async fn test_not_a_tiff() {
    let source = MemoryRasterSource::new().with_asset(HREF, b"<html>403</html>".to_vec());
    let err = source.open(HREF).await.unwrap_err();
    assert!(matches!(err, CropwatchError::UnsupportedFormat(_)));
}

#[tokio::test]
async fn test_local_file_through_object_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("B08.tif");
    std::fs::write(
        &path,
        CogBuilder::new(64, 64).sample(CogSample::F32).fill_with(position_value).build(),
    )
    .unwrap();

    let source = ObjectStoreSource::new(ObjectStorageConfig::default());
    let window = PixelWindow::new(3, 4, 10, 10);
    let grid = source
        .read_window(path.to_str().unwrap(), &window)
        .await
        .unwrap();
    assert_positions(&grid, &window);
}

#[tokio::test]
async fn test_local_files_share_one_store() {
    let dir = tempfile::tempdir().unwrap();
    let red = dir.path().join("B04.tif");
    let nir = dir.path().join("B08.tif");
    std::fs::write(&red, CogBuilder::new(32, 32).fill(1000.0).build()).unwrap();
    std::fs::write(&nir, CogBuilder::new(32, 32).fill(3000.0).build()).unwrap();

    let source = ObjectStoreSource::new(ObjectStorageConfig::default());
    let window = PixelWindow::new(0, 0, 4, 4);
    for path in [&red, &nir, &red] {
        source
            .read_window(path.to_str().unwrap(), &window)
            .await
            .unwrap();
    }
    assert_eq!(source.store_count(), 1);

    // clones reuse the same stores
    let clone = source.clone();
    clone.open(nir.to_str().unwrap()).await.unwrap();
    assert_eq!(source.store_count(), 1);
}
