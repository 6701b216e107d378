//! In-memory GeoTIFF writer for synthetic band rasters.
//!
//! Files are laid out the way cloud-optimized GeoTIFFs are: header, then the
//! IFD, then out-of-line tag values, then the pixel blocks, so a reader can
//! parse all metadata from a small prefix.

use std::io::Write;
use std::ops::Range;

use flate2::{write::ZlibEncoder, Compression};

/// Pixel type written to the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CogSample {
    U8,
    U16,
    I16,
    F32,
}

impl CogSample {
    fn bits(&self) -> u16 {
        match self {
            CogSample::U8 => 8,
            CogSample::U16 | CogSample::I16 => 16,
            CogSample::F32 => 32,
        }
    }

    fn format(&self) -> u16 {
        match self {
            CogSample::U8 | CogSample::U16 => 1,
            CogSample::I16 => 2,
            CogSample::F32 => 3,
        }
    }

    fn size(&self) -> usize {
        self.bits() as usize / 8
    }

    fn raw(&self, value: f64) -> u64 {
        match self {
            CogSample::U8 => value as u8 as u64,
            CogSample::U16 => value as u16 as u64,
            CogSample::I16 => value as i16 as u16 as u64,
            CogSample::F32 => (value as f32).to_bits() as u64,
        }
    }
}

/// A written file plus the byte range of every block, in block order.
#[derive(Debug, Clone)]
pub struct BuiltCog {
    pub bytes: Vec<u8>,
    /// Empty ranges mark sparse blocks
    pub blocks: Vec<Range<u64>>,
    /// Offset where pixel data begins; everything before it is metadata
    pub data_start: u64,
}

/// Builder for single-band GeoTIFFs.
///
/// Defaults: 16-bit unsigned, 64x64 tiles, little-endian classic TIFF,
/// uncompressed, WGS84 / UTM 47N with 100 m pixels and origin
/// (590000, 15000), no nodata tag.
#[derive(Debug, Clone)]
pub struct CogBuilder {
    width: usize,
    height: usize,
    values: Vec<f64>,
    sample: CogSample,
    /// `None` writes strips of `rows_per_strip`
    tile: Option<(usize, usize)>,
    rows_per_strip: usize,
    epsg: u16,
    origin: (f64, f64),
    pixel_size: (f64, f64),
    nodata: Option<String>,
    deflate: bool,
    predictor: bool,
    big_endian: bool,
    big_tiff: bool,
    sparse: Vec<usize>,
}

impl CogBuilder {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            values: vec![0.0; width * height],
            sample: CogSample::U16,
            tile: Some((64, 64)),
            rows_per_strip: 16,
            epsg: 32647,
            origin: (590_000.0, 15_000.0),
            pixel_size: (100.0, 100.0),
            nodata: None,
            deflate: false,
            predictor: false,
            big_endian: false,
            big_tiff: false,
            sparse: Vec::new(),
        }
    }

    /// Set every pixel to `value`.
    pub fn fill(mut self, value: f64) -> Self {
        self.values = vec![value; self.width * self.height];
        self
    }

    /// Set each pixel from `f(col, row)`.
    pub fn fill_with(mut self, f: impl Fn(usize, usize) -> f64) -> Self {
        self.values = (0..self.height)
            .flat_map(|row| (0..self.width).map(move |col| (col, row)))
            .map(|(col, row)| f(col, row))
            .collect();
        self
    }

    pub fn sample(mut self, sample: CogSample) -> Self {
        self.sample = sample;
        self
    }

    pub fn tile_size(mut self, width: usize, height: usize) -> Self {
        self.tile = Some((width, height));
        self
    }

    /// Write strips instead of tiles.
    pub fn stripped(mut self, rows_per_strip: usize) -> Self {
        self.tile = None;
        self.rows_per_strip = rows_per_strip;
        self
    }

    pub fn epsg(mut self, code: u16) -> Self {
        self.epsg = code;
        self
    }

    /// Upper-left corner of the upper-left pixel.
    pub fn origin(mut self, x: f64, y: f64) -> Self {
        self.origin = (x, y);
        self
    }

    pub fn pixel_size(mut self, x: f64, y: f64) -> Self {
        self.pixel_size = (x, y);
        self
    }

    /// GDAL_NODATA tag text, e.g. "0" or "nan".
    pub fn nodata(mut self, value: &str) -> Self {
        self.nodata = Some(value.to_string());
        self
    }

    pub fn deflate(mut self) -> Self {
        self.deflate = true;
        self
    }

    pub fn predictor(mut self) -> Self {
        self.predictor = true;
        self
    }

    pub fn big_endian(mut self) -> Self {
        self.big_endian = true;
        self
    }

    pub fn big_tiff(mut self) -> Self {
        self.big_tiff = true;
        self
    }

    /// Leave block `index` empty (offset 0, byte count 0).
    pub fn sparse_block(mut self, index: usize) -> Self {
        self.sparse.push(index);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_with_index().bytes
    }

    pub fn build_with_index(&self) -> BuiltCog {
        let blocks = self.encode_blocks();
        let out = Out {
            big_endian: self.big_endian,
        };

        // Sizes do not depend on offset values, so lay out once with zeros.
        let placeholder = vec![0u64; blocks.len()];
        let data_start = self.metadata_len(&self.entries(&placeholder, &placeholder));

        let mut offsets = Vec::with_capacity(blocks.len());
        let mut counts = Vec::with_capacity(blocks.len());
        let mut block_ranges = Vec::with_capacity(blocks.len());
        let mut cursor = data_start;
        for block in &blocks {
            if block.is_empty() {
                offsets.push(0);
                counts.push(0);
                block_ranges.push(0..0);
            } else {
                offsets.push(cursor);
                counts.push(block.len() as u64);
                block_ranges.push(cursor..cursor + block.len() as u64);
                cursor += block.len() as u64;
            }
        }

        let mut bytes = self.write_metadata(&self.entries(&offsets, &counts), &out);
        debug_assert_eq!(bytes.len() as u64, data_start);
        for block in &blocks {
            bytes.extend_from_slice(block);
        }

        BuiltCog {
            bytes,
            blocks: block_ranges,
            data_start,
        }
    }

    fn block_dims(&self) -> (usize, usize) {
        self.tile.unwrap_or((self.width, self.rows_per_strip.min(self.height)))
    }

    fn encode_blocks(&self) -> Vec<Vec<u8>> {
        let (bw, bh) = self.block_dims();
        let across = self.width.div_ceil(bw);
        let down = self.height.div_ceil(bh);
        let size = self.sample.size();
        let mask = if size >= 8 { u64::MAX } else { (1u64 << (size * 8)) - 1 };
        let out = Out {
            big_endian: self.big_endian,
        };

        let mut blocks = Vec::with_capacity(across * down);
        for by in 0..down {
            for bx in 0..across {
                if self.sparse.contains(&(by * across + bx)) {
                    blocks.push(Vec::new());
                    continue;
                }

                let rows = if self.tile.is_some() {
                    bh
                } else {
                    bh.min(self.height - by * bh)
                };

                let mut raw = Vec::with_capacity(bw * rows);
                for r in 0..rows {
                    for c in 0..bw {
                        let (col, row) = (bx * bw + c, by * bh + r);
                        let value = if col < self.width && row < self.height {
                            self.values[row * self.width + col]
                        } else {
                            0.0
                        };
                        raw.push(self.sample.raw(value));
                    }
                }

                if self.predictor {
                    for row in raw.chunks_mut(bw) {
                        for i in (1..row.len()).rev() {
                            row[i] = row[i].wrapping_sub(row[i - 1]) & mask;
                        }
                    }
                }

                let mut bytes = Vec::with_capacity(raw.len() * size);
                for v in raw {
                    out.uint(&mut bytes, v, size);
                }

                if self.deflate {
                    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
                    // Writing into a Vec cannot fail
                    let _ = enc.write_all(&bytes);
                    bytes = enc.finish().unwrap_or_default();
                }
                blocks.push(bytes);
            }
        }
        blocks
    }

    fn entries(&self, offsets: &[u64], counts: &[u64]) -> Vec<Entry> {
        let offset_type = if self.big_tiff { LONG8 } else { LONG };
        let (bw, bh) = self.block_dims();
        let geographic = self.epsg == 4326;

        let mut entries = vec![
            Entry::uint(256, LONG, &[self.width as u64]),
            Entry::uint(257, LONG, &[self.height as u64]),
            Entry::uint(258, SHORT, &[self.sample.bits() as u64]),
            Entry::uint(259, SHORT, &[if self.deflate { 8 } else { 1 }]),
            Entry::uint(262, SHORT, &[1]),
            Entry::uint(277, SHORT, &[1]),
            Entry::uint(284, SHORT, &[1]),
            Entry::uint(339, SHORT, &[self.sample.format() as u64]),
            Entry::doubles(33550, &[self.pixel_size.0, self.pixel_size.1, 0.0]),
            Entry::doubles(33922, &[0.0, 0.0, 0.0, self.origin.0, self.origin.1, 0.0]),
            Entry::uint(
                34735,
                SHORT,
                &[
                    1,
                    1,
                    0,
                    3,
                    1024,
                    0,
                    1,
                    if geographic { 2 } else { 1 },
                    1025,
                    0,
                    1,
                    1,
                    if geographic { 2048 } else { 3072 },
                    0,
                    1,
                    self.epsg as u64,
                ],
            ),
        ];

        if self.predictor {
            entries.push(Entry::uint(317, SHORT, &[2]));
        }
        if self.tile.is_some() {
            entries.push(Entry::uint(322, LONG, &[bw as u64]));
            entries.push(Entry::uint(323, LONG, &[bh as u64]));
            entries.push(Entry::uint(324, offset_type, offsets));
            entries.push(Entry::uint(325, offset_type, counts));
        } else {
            entries.push(Entry::uint(273, offset_type, offsets));
            entries.push(Entry::uint(278, LONG, &[bh as u64]));
            entries.push(Entry::uint(279, offset_type, counts));
        }
        if let Some(nodata) = &self.nodata {
            let mut text = nodata.clone().into_bytes();
            text.push(0);
            entries.push(Entry {
                tag: 42113,
                field_type: ASCII,
                values: Values::Bytes(text),
            });
        }

        entries.sort_by_key(|e| e.tag);
        entries
    }

    fn header_len(&self) -> u64 {
        if self.big_tiff {
            16
        } else {
            8
        }
    }

    fn ifd_len(&self, count: usize) -> u64 {
        if self.big_tiff {
            8 + 20 * count as u64 + 8
        } else {
            2 + 12 * count as u64 + 4
        }
    }

    fn inline_cap(&self) -> usize {
        if self.big_tiff {
            8
        } else {
            4
        }
    }

    fn metadata_len(&self, entries: &[Entry]) -> u64 {
        let overflow: usize = entries
            .iter()
            .map(|e| e.byte_len())
            .filter(|len| *len > self.inline_cap())
            .map(|len| len + len % 2)
            .sum();
        self.header_len() + self.ifd_len(entries.len()) + overflow as u64
    }

    fn write_metadata(&self, entries: &[Entry], out: &Out) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(if self.big_endian { b"MM" } else { b"II" });
        let first_ifd = self.header_len();
        if self.big_tiff {
            out.uint(&mut buf, 43, 2);
            out.uint(&mut buf, 8, 2);
            out.uint(&mut buf, 0, 2);
            out.uint(&mut buf, first_ifd, 8);
        } else {
            out.uint(&mut buf, 42, 2);
            out.uint(&mut buf, first_ifd, 4);
        }

        let offset_size = if self.big_tiff { 8 } else { 4 };
        let mut overflow = Vec::new();
        let overflow_start = first_ifd + self.ifd_len(entries.len());

        out.uint(&mut buf, entries.len() as u64, if self.big_tiff { 8 } else { 2 });
        for entry in entries {
            let payload = entry.payload(out);
            out.uint(&mut buf, entry.tag as u64, 2);
            out.uint(&mut buf, entry.field_type as u64, 2);
            out.uint(&mut buf, entry.count() as u64, offset_size);
            if payload.len() <= self.inline_cap() {
                let mut field = payload.clone();
                field.resize(offset_size, 0);
                buf.extend_from_slice(&field);
            } else {
                out.uint(&mut buf, overflow_start + overflow.len() as u64, offset_size);
                overflow.extend_from_slice(&payload);
                if payload.len() % 2 == 1 {
                    overflow.push(0);
                }
            }
        }
        out.uint(&mut buf, 0, offset_size);
        buf.extend_from_slice(&overflow);
        buf
    }
}

const ASCII: u16 = 2;
const SHORT: u16 = 3;
const LONG: u16 = 4;
const DOUBLE: u16 = 12;
const LONG8: u16 = 16;

#[derive(Debug, Clone)]
enum Values {
    Uints(Vec<u64>),
    Doubles(Vec<f64>),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone)]
struct Entry {
    tag: u16,
    field_type: u16,
    values: Values,
}

impl Entry {
    fn uint(tag: u16, field_type: u16, values: &[u64]) -> Self {
        Self {
            tag,
            field_type,
            values: Values::Uints(values.to_vec()),
        }
    }

    fn doubles(tag: u16, values: &[f64]) -> Self {
        Self {
            tag,
            field_type: DOUBLE,
            values: Values::Doubles(values.to_vec()),
        }
    }

    fn count(&self) -> usize {
        match &self.values {
            Values::Uints(v) => v.len(),
            Values::Doubles(v) => v.len(),
            Values::Bytes(v) => v.len(),
        }
    }

    fn type_size(&self) -> usize {
        match self.field_type {
            ASCII => 1,
            SHORT => 2,
            LONG => 4,
            _ => 8,
        }
    }

    fn byte_len(&self) -> usize {
        self.count() * self.type_size()
    }

    fn payload(&self, out: &Out) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.byte_len());
        match &self.values {
            Values::Uints(v) => v.iter().for_each(|x| out.uint(&mut buf, *x, self.type_size())),
            Values::Doubles(v) => v.iter().for_each(|x| out.uint(&mut buf, x.to_bits(), 8)),
            Values::Bytes(v) => buf.extend_from_slice(v),
        }
        buf
    }
}

/// Byte-order aware integer writer.
#[derive(Debug, Clone, Copy)]
struct Out {
    big_endian: bool,
}

impl Out {
    fn uint(&self, buf: &mut Vec<u8>, value: u64, size: usize) {
        let bytes = if self.big_endian {
            value.to_be_bytes()[8 - size..].to_vec()
        } else {
            value.to_le_bytes()[..size].to_vec()
        };
        buf.extend_from_slice(&bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_index_covers_data() {
        let built = CogBuilder::new(100, 70).fill(7.0).build_with_index();
        // 2 x 2 tiles of 64x64 u16, uncompressed
        assert_eq!(built.blocks.len(), 4);
        for block in &built.blocks {
            assert_eq!(block.end - block.start, 64 * 64 * 2);
            assert!(block.start >= built.data_start);
        }
        assert_eq!(built.blocks[3].end, built.bytes.len() as u64);
    }

    #[test]
    fn test_header_markers() {
        let le = CogBuilder::new(4, 4).build();
        assert_eq!(&le[0..4], &[b'I', b'I', 42, 0]);

        let be = CogBuilder::new(4, 4).big_endian().big_tiff().build();
        assert_eq!(&be[0..4], &[b'M', b'M', 0, 43]);
    }

    #[test]
    fn test_sparse_block_is_empty() {
        let built = CogBuilder::new(128, 64).sparse_block(1).build_with_index();
        assert_eq!(built.blocks[1], 0..0);
        assert!(!built.blocks[0].is_empty());
    }
}
