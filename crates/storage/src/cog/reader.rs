//! Windowed reads from cloud-optimized GeoTIFFs over range requests.

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::future::try_join_all;
use metrics::counter;
use rayon::prelude::*;
use tracing::{debug, instrument};

use cropwatch_common::{BandGrid, CropwatchError, CropwatchResult, CrsCode, GeoTransform, PixelWindow};

use super::decode::{decode_block, BlockLayout, Compression, Predictor, SampleType};
use super::geo::{geo_transform, GeoKeys};
use super::tiff::{decode_ascii, decode_f64s, decode_uints, tags, ByteOrder, EntryData, Ifd, IfdEntry, TiffHeader};
use crate::RangeReader;

const MAX_IFD_ENTRIES: u64 = 4096;

/// Metadata of the full-resolution image.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterInfo {
    pub width: usize,
    pub height: usize,
    pub crs: CrsCode,
    pub transform: GeoTransform,
    pub nodata: Option<f32>,
    pub sample_type: SampleType,
    pub compression: Compression,
    pub predictor: Predictor,
    /// Tile size, or full width by rows-per-strip for stripped files
    pub block_width: usize,
    pub block_height: usize,
    pub tiled: bool,
    pub file_size: u64,
}

impl RasterInfo {
    fn blocks_across(&self) -> usize {
        self.width.div_ceil(self.block_width)
    }

    fn blocks_down(&self) -> usize {
        self.height.div_ceil(self.block_height)
    }

    /// Rows actually encoded in block row `by`; the last strip may be short.
    fn block_rows(&self, by: usize) -> usize {
        if self.tiled {
            self.block_height
        } else {
            self.block_height.min(self.height - by * self.block_height)
        }
    }
}

/// Serves byte ranges from the prefetched header when possible, otherwise
/// with a range request.
struct ByteFetcher {
    source: Arc<dyn RangeReader>,
    prefix: Bytes,
    fetched: AtomicU64,
}

impl ByteFetcher {
    async fn fetch(&self, range: Range<u64>) -> CropwatchResult<Bytes> {
        if range.end <= self.prefix.len() as u64 {
            return Ok(self.prefix.slice(range.start as usize..range.end as usize));
        }

        let len = range.end.saturating_sub(range.start);
        debug!(start = range.start, end = range.end, "Fetching byte range");
        let bytes = self.source.read_range(range).await?;
        self.fetched.fetch_add(len, Ordering::Relaxed);
        counter!("cropwatch_bytes_fetched_total").increment(len);
        Ok(bytes)
    }

    async fn entry_bytes(&self, entry: &IfdEntry) -> CropwatchResult<Bytes> {
        match &entry.data {
            EntryData::Inline(bytes) => Ok(bytes.clone()),
            EntryData::Offset { offset, len } => self.fetch(*offset..offset + len).await,
        }
    }
}

/// An opened COG: header parsed, block index loaded, no pixel data read.
pub struct CogReader {
    fetcher: ByteFetcher,
    byte_order: ByteOrder,
    info: RasterInfo,
    block_offsets: Vec<u64>,
    block_byte_counts: Vec<u64>,
}

impl std::fmt::Debug for CogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CogReader")
            .field("href", &self.href())
            .field("info", &self.info)
            .finish()
    }
}

impl CogReader {
    /// Open a raster: one size lookup, one header range request, plus a
    /// request for any tag array the header prefix does not cover.
    #[instrument(skip(source), fields(href = %source.href()))]
    pub async fn open(source: Arc<dyn RangeReader>, header_bytes: usize) -> CropwatchResult<Self> {
        let file_size = source.size().await?;
        let prefix_len = (header_bytes.max(16) as u64).min(file_size);
        let prefix = source.read_range(0..prefix_len).await?;
        counter!("cropwatch_bytes_fetched_total").increment(prefix_len);

        let header = TiffHeader::parse(&prefix)?;
        let fetcher = ByteFetcher {
            source,
            prefix,
            fetched: AtomicU64::new(prefix_len),
        };

        let ifd_start = header.first_ifd_offset;
        let count_size = header.ifd_count_size();
        let count_bytes = fetcher.fetch(ifd_start..ifd_start + count_size).await?;
        if (count_bytes.len() as u64) < count_size {
            return Err(CropwatchError::UnsupportedFormat("truncated IFD".to_string()));
        }
        let entry_count = header.byte_order.uint(&count_bytes, count_size as usize);
        if entry_count == 0 || entry_count > MAX_IFD_ENTRIES {
            return Err(CropwatchError::UnsupportedFormat(format!(
                "implausible IFD entry count {}",
                entry_count
            )));
        }
        let entries_start = ifd_start + count_size;
        let entries = fetcher
            .fetch(entries_start..entries_start + entry_count * header.ifd_entry_size())
            .await?;
        let ifd = Ifd::parse_entries(&entries, entry_count, &header)?;

        let order = header.byte_order;
        let uints = |tag| tag_uints(&fetcher, &ifd, tag, order);
        let floats = |tag| tag_f64s(&fetcher, &ifd, tag, order);

        let width = first(uints(tags::IMAGE_WIDTH).await?, "ImageWidth")? as usize;
        let height = first(uints(tags::IMAGE_LENGTH).await?, "ImageLength")? as usize;

        let samples = optional_first(uints(tags::SAMPLES_PER_PIXEL).await?).unwrap_or(1);
        if samples != 1 {
            return Err(CropwatchError::UnsupportedFormat(format!(
                "{} samples per pixel; only single-band rasters are read",
                samples
            )));
        }

        let bits = optional_first(uints(tags::BITS_PER_SAMPLE).await?).unwrap_or(1);
        let sample_format = optional_first(uints(tags::SAMPLE_FORMAT).await?).unwrap_or(1);
        let sample_type = SampleType::from_tags(sample_format, bits)?;
        let compression = Compression::from_code(optional_first(uints(tags::COMPRESSION).await?).unwrap_or(1))?;
        let predictor = Predictor::from_code(optional_first(uints(tags::PREDICTOR).await?).unwrap_or(1))?;

        let tile_width = optional_first(uints(tags::TILE_WIDTH).await?);
        let (tiled, block_width, block_height, offsets_tag, counts_tag) = match tile_width {
            Some(tw) => {
                let th = first(uints(tags::TILE_LENGTH).await?, "TileLength")?;
                (true, tw as usize, th as usize, tags::TILE_OFFSETS, tags::TILE_BYTE_COUNTS)
            }
            None => {
                let rows = optional_first(uints(tags::ROWS_PER_STRIP).await?)
                    .map(|r| (r as usize).min(height))
                    .unwrap_or(height);
                (false, width, rows, tags::STRIP_OFFSETS, tags::STRIP_BYTE_COUNTS)
            }
        };
        if width == 0 || height == 0 || block_width == 0 || block_height == 0 {
            return Err(CropwatchError::UnsupportedFormat(format!(
                "degenerate raster layout {}x{} in {}x{} blocks",
                width, height, block_width, block_height
            )));
        }

        let (block_offsets, block_byte_counts) = futures::try_join!(uints(offsets_tag), uints(counts_tag))?;
        let block_offsets = block_offsets
            .ok_or_else(|| CropwatchError::UnsupportedFormat("missing block offsets".to_string()))?;
        let block_byte_counts = block_byte_counts
            .ok_or_else(|| CropwatchError::UnsupportedFormat("missing block byte counts".to_string()))?;

        let geo_keys = match uints(tags::GEO_KEY_DIRECTORY).await? {
            Some(dir) => GeoKeys::parse(&dir)?,
            None => GeoKeys::default(),
        };
        let crs = geo_keys.crs()?;
        let transform = geo_transform(
            floats(tags::MODEL_PIXEL_SCALE).await?.as_deref(),
            floats(tags::MODEL_TIEPOINT).await?.as_deref(),
            floats(tags::MODEL_TRANSFORMATION).await?.as_deref(),
            geo_keys.pixel_is_point(),
        )?;

        let nodata = match ifd.get(tags::GDAL_NODATA) {
            Some(entry) => {
                let text = decode_ascii(&fetcher.entry_bytes(entry).await?);
                Some(text.parse::<f64>().map_err(|_| {
                    CropwatchError::UnsupportedFormat(format!("unparsable nodata value '{}'", text))
                })? as f32)
            }
            None => None,
        };

        let info = RasterInfo {
            width,
            height,
            crs,
            transform,
            nodata,
            sample_type,
            compression,
            predictor,
            block_width,
            block_height,
            tiled,
            file_size,
        };

        let blocks = info.blocks_across() * info.blocks_down();
        if block_offsets.len() < blocks || block_byte_counts.len() < blocks {
            return Err(CropwatchError::UnsupportedFormat(format!(
                "raster needs {} blocks but indexes {} offsets and {} byte counts",
                blocks,
                block_offsets.len(),
                block_byte_counts.len()
            )));
        }

        debug!(
            width,
            height,
            crs = %info.crs,
            blocks,
            tiled,
            "Opened raster"
        );

        Ok(Self {
            fetcher,
            byte_order: order,
            info,
            block_offsets,
            block_byte_counts,
        })
    }

    pub fn href(&self) -> &str {
        self.fetcher.source.href()
    }

    pub fn info(&self) -> &RasterInfo {
        &self.info
    }

    pub fn crs(&self) -> CrsCode {
        self.info.crs
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.info.transform
    }

    pub fn width(&self) -> usize {
        self.info.width
    }

    pub fn height(&self) -> usize {
        self.info.height
    }

    pub fn nodata(&self) -> Option<f32> {
        self.info.nodata
    }

    /// Bytes transferred for this raster so far, header included.
    pub fn bytes_fetched(&self) -> u64 {
        self.fetcher.fetched.load(Ordering::Relaxed)
    }

    /// Read `window` as f32 values.
    ///
    /// Only the blocks intersecting the window are fetched, each with its own
    /// range request, concurrently. Sparse blocks read as the nodata value
    /// (or 0 without one). Windows reaching past the raster edge are rejected.
    #[instrument(skip(self), fields(href = %self.href()))]
    pub async fn read_window(&self, window: &PixelWindow) -> CropwatchResult<BandGrid> {
        let info = &self.info;
        if !window.overlaps(info.width, info.height) {
            return Err(CropwatchError::InvalidWindow(format!(
                "window {}x{} at ({}, {}) lies entirely outside the {}x{} raster",
                window.width, window.height, window.col_off, window.row_off, info.width, info.height
            )));
        }
        if !window.fits_within(info.width, info.height) {
            return Err(CropwatchError::InvalidWindow(format!(
                "window {}x{} at ({}, {}) extends past the edge of the {}x{} raster",
                window.width, window.height, window.col_off, window.row_off, info.width, info.height
            )));
        }

        let col0 = window.col_off as usize;
        let row0 = window.row_off as usize;
        let col1 = col0 + window.width;
        let row1 = row0 + window.height;

        let (bw, bh) = (info.block_width, info.block_height);
        let blocks: Vec<(usize, usize)> = (row0 / bh..=(row1 - 1) / bh)
            .flat_map(|by| (col0 / bw..=(col1 - 1) / bw).map(move |bx| (bx, by)))
            .collect();
        debug!(blocks = blocks.len(), "Fetching blocks for window");

        let encoded = try_join_all(blocks.iter().map(|&(bx, by)| self.fetch_block(bx, by))).await?;

        let decoded: Vec<Option<Vec<f32>>> = encoded
            .par_iter()
            .zip(blocks.par_iter())
            .map(|(bytes, &(_, by))| {
                bytes
                    .as_ref()
                    .map(|b| decode_block(b, &self.block_layout(by)))
                    .transpose()
            })
            .collect::<CropwatchResult<_>>()?;

        let mut data = vec![info.nodata.unwrap_or(0.0); window.width * window.height];
        for (&(bx, by), block) in blocks.iter().zip(decoded) {
            let Some(block) = block else {
                continue;
            };

            let block_col0 = bx * bw;
            let block_row0 = by * bh;
            let c_start = col0.max(block_col0);
            let c_end = col1.min(block_col0 + bw);
            let r_start = row0.max(block_row0);
            let r_end = row1.min(block_row0 + info.block_rows(by));
            let run = c_end - c_start;

            for r in r_start..r_end {
                let src = (r - block_row0) * bw + (c_start - block_col0);
                let dst = (r - row0) * window.width + (c_start - col0);
                data[dst..dst + run].copy_from_slice(&block[src..src + run]);
            }
        }

        BandGrid::new(data, window.width, window.height, info.nodata)
    }

    async fn fetch_block(&self, bx: usize, by: usize) -> CropwatchResult<Option<Bytes>> {
        let index = by * self.info.blocks_across() + bx;
        let offset = self.block_offsets[index];
        let len = self.block_byte_counts[index];
        if len == 0 {
            return Ok(None);
        }
        self.fetcher.fetch(offset..offset + len).await.map(Some)
    }

    fn block_layout(&self, by: usize) -> BlockLayout {
        BlockLayout {
            width: self.info.block_width,
            height: self.info.block_rows(by),
            sample_type: self.info.sample_type,
            byte_order: self.byte_order,
            compression: self.info.compression,
            predictor: self.info.predictor,
        }
    }
}

async fn tag_uints(fetcher: &ByteFetcher, ifd: &Ifd, tag: u16, order: ByteOrder) -> CropwatchResult<Option<Vec<u64>>> {
    let Some(entry) = ifd.get(tag) else {
        return Ok(None);
    };
    let bytes = fetcher.entry_bytes(entry).await?;
    decode_uints(&bytes, entry.field_type, entry.count, order).map(Some)
}

async fn tag_f64s(fetcher: &ByteFetcher, ifd: &Ifd, tag: u16, order: ByteOrder) -> CropwatchResult<Option<Vec<f64>>> {
    let Some(entry) = ifd.get(tag) else {
        return Ok(None);
    };
    let bytes = fetcher.entry_bytes(entry).await?;
    decode_f64s(&bytes, entry.field_type, entry.count, order).map(Some)
}

fn optional_first(values: Option<Vec<u64>>) -> Option<u64> {
    values.and_then(|v| v.first().copied())
}

fn first(values: Option<Vec<u64>>, name: &str) -> CropwatchResult<u64> {
    optional_first(values)
        .ok_or_else(|| CropwatchError::UnsupportedFormat(format!("missing required tag {}", name)))
}
