//! End-to-end pipeline runs over an in-memory catalog and raster source.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio_test::{assert_err, assert_ok};

use catalog::StaticCatalog;
use cropwatch_common::{CropwatchError, CrsCode, GeoPoint, PixelWindow};
use ndvi_processor::{NdviPipeline, PipelineConfig, RetryConfig};
use storage::MemoryRasterSource;
use test_utils::{
    assert_all_valid_approx, band_pair_for_ndvi, fixtures::hrefs, stac_feature_collection,
    stac_item_json, CogBuilder,
};

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
}

fn equator() -> GeoPoint {
    GeoPoint::new(0.0, 100.0).unwrap()
}

fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
    }
}

fn one_scene_catalog() -> StaticCatalog {
    let body = stac_feature_collection(vec![stac_item_json(
        "S2B_47NQA_20250703_0_L2A",
        "2025-07-03T03:45:12Z",
        12.5,
        hrefs::RED,
        hrefs::NIR,
    )]);
    StaticCatalog::from_item_collection(body.to_string().as_bytes()).unwrap()
}

fn band(value: f64) -> Vec<u8> {
    CogBuilder::new(300, 300).fill(value).build()
}

fn pipeline(catalog: StaticCatalog, source: MemoryRasterSource, config: PipelineConfig) -> NdviPipeline {
    NdviPipeline::new(Arc::new(catalog), Arc::new(source), config).unwrap()
}

#[tokio::test]
async fn test_end_to_end_constant_ndvi() {
    let (red, nir) = band_pair_for_ndvi(0.5, 4000.0);
    let source = MemoryRasterSource::new()
        .with_asset(hrefs::RED, band(red))
        .with_asset(hrefs::NIR, band(nir));

    let pipeline = pipeline(one_scene_catalog(), source, PipelineConfig::default());
    let product = assert_ok!(pipeline.run(equator(), date()).await);

    assert_eq!(product.scene_id, "S2B_47NQA_20250703_0_L2A");
    assert_eq!(product.crs, CrsCode::Utm { zone: 47, north: true });
    assert_eq!(product.window, PixelWindow::new(157, 95, 111, 111));
    assert_eq!(product.ndvi.shape(), (111, 111));
    assert_all_valid_approx!(product.ndvi.values(), 0.5, 1e-6);
    assert_eq!(product.stats.nodata_pixels, 0);
    assert_eq!(product.stats.valid_pixels, 111 * 111);

    let decoded = image::load_from_memory(&product.image.bytes).unwrap();
    assert_eq!(decoded.width(), product.image.width);
    assert!(product.image.to_data_uri().starts_with("data:image/png;base64,"));
    assert!(product.caption().contains("mean NDVI 0.50"));
}

#[tokio::test]
async fn test_only_window_tiles_are_fetched() {
    let source = Arc::new(
        MemoryRasterSource::new()
            .with_asset(hrefs::RED, band(1000.0))
            .with_asset(hrefs::NIR, band(3000.0)),
    );
    let pipeline = NdviPipeline::new(
        Arc::new(one_scene_catalog()),
        source.clone(),
        PipelineConfig::default(),
    )
    .unwrap();

    pipeline.run(equator(), date()).await.unwrap();

    let asset_len = source.asset_len(hrefs::RED).unwrap() as u64;
    let red_bytes: u64 = source.requests_for(hrefs::RED).iter().map(|r| r.len()).sum();
    assert!(red_bytes < asset_len);
    assert_eq!(source.open_count(), 2);
}

#[tokio::test]
async fn test_no_imagery_skips_reads() {
    let catalog = StaticCatalog::new(Vec::new());
    let source = Arc::new(MemoryRasterSource::new());
    let pipeline =
        NdviPipeline::new(Arc::new(catalog), source.clone(), PipelineConfig::default()).unwrap();

    let err = pipeline.run(equator(), date()).await.unwrap_err();
    assert!(matches!(err, CropwatchError::ImageryNotFound(_)));
    assert!(err.user_message().contains("No Sentinel-2 imagery"));
    assert_eq!(source.open_count(), 0);
    assert!(source.requests().is_empty());
}

#[tokio::test]
async fn test_zero_bands_are_all_nodata() {
    let source = MemoryRasterSource::new()
        .with_asset(hrefs::RED, band(0.0))
        .with_asset(hrefs::NIR, band(0.0));

    let product = pipeline(one_scene_catalog(), source, PipelineConfig::default())
        .run(equator(), date())
        .await
        .unwrap();

    assert!(product.ndvi.values().iter().all(Option::is_none));
    assert_eq!(product.stats.mean, None);
    assert!(product.caption().contains("no valid pixels"));
    assert!(image::load_from_memory(&product.image.bytes).is_ok());
}

#[tokio::test]
async fn test_misaligned_bands_fail_with_shape_mismatch() {
    let nir = CogBuilder::new(600, 600)
        .pixel_size(50.0, 50.0)
        .fill(3000.0)
        .build();
    let source = MemoryRasterSource::new()
        .with_asset(hrefs::RED, band(1000.0))
        .with_asset(hrefs::NIR, nir);

    let err = pipeline(one_scene_catalog(), source, PipelineConfig::default())
        .run(equator(), date())
        .await
        .unwrap_err();

    match err {
        CropwatchError::ShapeMismatch {
            red_rows, nir_rows, ..
        } => {
            assert_eq!(red_rows, 111);
            assert!(nir_rows > 200);
        }
        other => panic!("expected ShapeMismatch, got {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_catalog_times_out() {
    let catalog = one_scene_catalog().with_delay(Duration::from_millis(300));
    let config = PipelineConfig {
        catalog_timeout: Duration::from_millis(50),
        retry: fast_retry(1),
        ..Default::default()
    };

    let err = assert_err!(
        pipeline(catalog, MemoryRasterSource::new(), config)
            .run(equator(), date())
            .await
    );
    assert!(matches!(err, CropwatchError::Timeout(_)));
}

#[tokio::test]
async fn test_transient_catalog_failures_are_retried() {
    let catalog = Arc::new(one_scene_catalog().failing_first(2));
    let source = MemoryRasterSource::new()
        .with_asset(hrefs::RED, band(1000.0))
        .with_asset(hrefs::NIR, band(3000.0));
    let config = PipelineConfig {
        retry: fast_retry(3),
        ..Default::default()
    };

    let pipeline = NdviPipeline::new(catalog.clone(), Arc::new(source), config).unwrap();
    assert_ok!(pipeline.run(equator(), date()).await);
    assert_eq!(catalog.calls(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_surface_catalog_error() {
    let catalog = Arc::new(one_scene_catalog().failing_first(5));
    let config = PipelineConfig {
        retry: fast_retry(2),
        ..Default::default()
    };

    let pipeline =
        NdviPipeline::new(catalog.clone(), Arc::new(MemoryRasterSource::new()), config).unwrap();
    let err = pipeline.run(equator(), date()).await.unwrap_err();
    assert!(matches!(err, CropwatchError::CatalogUnavailable(_)));
    assert_eq!(catalog.calls(), 2);
}

#[tokio::test]
async fn test_missing_asset_fails_after_retries() {
    let source = Arc::new(MemoryRasterSource::new().with_asset(hrefs::RED, band(1000.0)));
    let config = PipelineConfig {
        retry: fast_retry(3),
        ..Default::default()
    };
    let pipeline = NdviPipeline::new(Arc::new(one_scene_catalog()), source.clone(), config).unwrap();

    let err = pipeline.run(equator(), date()).await.unwrap_err();
    assert!(matches!(err, CropwatchError::RemoteReadError(_)));
    // red opens once, nir is attempted three times
    assert_eq!(source.open_count(), 4);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let config = PipelineConfig {
        margin_deg: -1.0,
        ..Default::default()
    };
    let result = NdviPipeline::new(
        Arc::new(StaticCatalog::default()),
        Arc::new(MemoryRasterSource::new()),
        config,
    );
    assert!(matches!(result, Err(CropwatchError::InvalidInput(_))));
}

#[tokio::test]
async fn test_oversized_search_window_is_rejected() {
    let mut config = PipelineConfig::default();
    config.catalog.window_days = 100_000_000;

    let result = NdviPipeline::new(
        Arc::new(one_scene_catalog()),
        Arc::new(MemoryRasterSource::new()),
        config,
    );
    assert!(matches!(result, Err(CropwatchError::InvalidInput(_))));
}

#[tokio::test]
async fn test_search_window_past_calendar_end_is_invalid_input() {
    let catalog = Arc::new(one_scene_catalog());
    let pipeline = NdviPipeline::new(
        catalog.clone(),
        Arc::new(MemoryRasterSource::new()),
        PipelineConfig::default(),
    )
    .unwrap();

    let err = assert_err!(pipeline.run(equator(), NaiveDate::MAX).await);
    assert!(matches!(err, CropwatchError::InvalidInput(_)));
    assert_eq!(catalog.calls(), 0);
}

#[tokio::test]
async fn test_raster_crs_wins_over_catalog_epsg() {
    let mut item = stac_item_json(
        "S2B_47NQA_20250703_0_L2A",
        "2025-07-03T03:45:12Z",
        12.5,
        hrefs::RED,
        hrefs::NIR,
    );
    item["properties"]["proj:epsg"] = serde_json::json!(32648);
    let body = stac_feature_collection(vec![item]);
    let catalog = StaticCatalog::from_item_collection(body.to_string().as_bytes()).unwrap();

    let (red, nir) = band_pair_for_ndvi(0.5, 4000.0);
    let source = MemoryRasterSource::new()
        .with_asset(hrefs::RED, band(red))
        .with_asset(hrefs::NIR, band(nir));

    let product = assert_ok!(
        pipeline(catalog, source, PipelineConfig::default())
            .run(equator(), date())
            .await
    );
    assert_eq!(product.crs, CrsCode::Utm { zone: 47, north: true });
    assert_eq!(product.window, PixelWindow::new(157, 95, 111, 111));
}
