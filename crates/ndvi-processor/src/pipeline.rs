//! Point and date in, rendered NDVI out.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use metrics::{counter, histogram};
use tracing::{info, instrument, warn};

use catalog::{Catalog, CatalogSearcher, Scene, StacClient};
use cropwatch_common::{
    CropwatchResult, CrsCode, GeoPoint, NdviGrid, PixelWindow, QueryRegion,
};
use projection::{reproject, resolve_window};
use renderer::{NdviRenderer, RenderedImage};
use storage::{CogReader, ObjectStoreSource, RasterSource};

use crate::{compute_ndvi, with_retry, with_timeout, PipelineConfig};

/// Summary statistics over an NDVI grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NdviStats {
    pub valid_pixels: usize,
    pub nodata_pixels: usize,
    pub mean: Option<f32>,
}

impl NdviStats {
    pub fn of(grid: &NdviGrid) -> Self {
        Self {
            valid_pixels: grid.valid_count(),
            nodata_pixels: grid.nodata_count(),
            mean: grid.mean(),
        }
    }
}

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct NdviProduct {
    pub scene_id: String,
    pub datetime: DateTime<Utc>,
    pub cloud_cover: Option<f64>,
    pub crs: CrsCode,
    pub window: PixelWindow,
    pub ndvi: NdviGrid,
    pub stats: NdviStats,
    pub image: RenderedImage,
}

impl NdviProduct {
    /// One-line description for display under the image.
    pub fn caption(&self) -> String {
        let mut caption = format!("{} ({})", self.scene_id, self.datetime.format("%Y-%m-%d"));
        if let Some(cloud) = self.cloud_cover {
            caption.push_str(&format!(", cloud cover {:.1}%", cloud));
        }
        match self.stats.mean {
            Some(mean) => caption.push_str(&format!(", mean NDVI {:.2}", mean)),
            None => caption.push_str(", no valid pixels"),
        }
        caption
    }
}

/// The NDVI pipeline.
///
/// Holds no per-request state, so one instance can serve concurrent calls.
pub struct NdviPipeline {
    searcher: CatalogSearcher,
    source: Arc<dyn RasterSource>,
    renderer: NdviRenderer,
    config: PipelineConfig,
}

impl NdviPipeline {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        source: Arc<dyn RasterSource>,
        config: PipelineConfig,
    ) -> CropwatchResult<Self> {
        config.check()?;

        Ok(Self {
            searcher: CatalogSearcher::new(catalog, config.catalog.clone()),
            source,
            renderer: NdviRenderer::new(config.render.clone()),
            config,
        })
    }

    /// Pipeline over the STAC API and object storage named in `config`.
    pub fn from_config(config: PipelineConfig) -> CropwatchResult<Self> {
        let catalog = Arc::new(StacClient::new(config.catalog.clone())?);
        let source = Arc::new(ObjectStoreSource::new(config.storage.clone()));
        Self::new(catalog, source, config)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run once for a point and start date.
    #[instrument(skip(self, point), fields(lat = point.lat(), lon = point.lon()))]
    pub async fn run(&self, point: GeoPoint, date: NaiveDate) -> CropwatchResult<NdviProduct> {
        let started = Instant::now();
        let result = self.execute(point, date).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        counter!("cropwatch_pipeline_requests_total", "outcome" => outcome).increment(1);
        histogram!("cropwatch_pipeline_duration_seconds").record(started.elapsed().as_secs_f64());

        if let Err(e) = &result {
            warn!(error = %e, outcome, "NDVI pipeline failed");
        }
        result
    }

    async fn execute(&self, point: GeoPoint, date: NaiveDate) -> CropwatchResult<NdviProduct> {
        let region = QueryRegion::new(point, self.config.margin_deg)?;
        let scene = self.search(&point, date).await?;

        let red_href = scene.band(&self.config.catalog.red_asset)?.href.as_str();
        let nir_href = scene.band(&self.config.catalog.nir_asset)?.href.as_str();

        let (red, nir) = futures::try_join!(self.open(red_href), self.open(nir_href))?;

        if let Some(code) = scene.epsg.filter(|&code| code != red.crs().epsg()) {
            warn!(
                scene = %scene.id,
                catalog_epsg = code,
                raster_crs = %red.crs(),
                "Catalog CRS disagrees with the raster header, using the raster"
            );
        }

        let bounds = reproject(&region, red.crs())?;
        let window = resolve_window(&bounds, red.transform())?;
        info!(
            scene = %scene.id,
            crs = %red.crs(),
            col_off = window.col_off,
            row_off = window.row_off,
            width = window.width,
            height = window.height,
            "Resolved read window"
        );

        let nir_window = if nir.crs() == red.crs() && nir.transform().approx_eq(red.transform()) {
            window
        } else {
            warn!(
                red_crs = %red.crs(),
                nir_crs = %nir.crs(),
                "Band rasters are not aligned, resolving a separate window"
            );
            let nir_bounds = reproject(&region, nir.crs())?;
            resolve_window(&nir_bounds, nir.transform())?
        };

        let (red_grid, nir_grid) =
            futures::try_join!(self.read(&red, &window), self.read(&nir, &nir_window))?;

        let ndvi = compute_ndvi(&nir_grid, &red_grid)?;
        let stats = NdviStats::of(&ndvi);
        let image = self.renderer.render(&ndvi)?;

        info!(
            scene = %scene.id,
            valid_pixels = stats.valid_pixels,
            nodata_pixels = stats.nodata_pixels,
            mean = ?stats.mean,
            bytes_fetched = red.bytes_fetched() + nir.bytes_fetched(),
            image_bytes = image.bytes.len(),
            "NDVI computed"
        );

        Ok(NdviProduct {
            scene_id: scene.id,
            datetime: scene.datetime,
            cloud_cover: scene.cloud_cover,
            crs: red.crs(),
            window,
            ndvi,
            stats,
            image,
        })
    }

    async fn search(&self, point: &GeoPoint, date: NaiveDate) -> CropwatchResult<Scene> {
        with_retry(&self.config.retry, "catalog_search", || {
            with_timeout(
                self.config.catalog_timeout,
                "catalog search",
                self.searcher.search(point, date),
            )
        })
        .await
    }

    async fn open(&self, href: &str) -> CropwatchResult<CogReader> {
        with_retry(&self.config.retry, "raster_open", || {
            with_timeout(self.config.read_timeout, "raster open", self.source.open(href))
        })
        .await
    }

    async fn read(
        &self,
        reader: &CogReader,
        window: &PixelWindow,
    ) -> CropwatchResult<cropwatch_common::BandGrid> {
        with_retry(&self.config.retry, "window_read", || {
            with_timeout(self.config.read_timeout, "window read", reader.read_window(window))
        })
        .await
    }
}
