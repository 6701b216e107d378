//! PNG encoding for RGBA pixel buffers.
//!
//! Images with at most 256 distinct colors are written as indexed PNG
//! (color type 3, with a tRNS chunk when any entry is translucent). Anything
//! else is written as 8-bit RGBA (color type 6).

use std::collections::{HashMap, HashSet};
use std::io::Write;

use rayon::prelude::*;

use cropwatch_common::{CropwatchError, CropwatchResult};

const SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

const MAX_PALETTE_SIZE: usize = 256;

/// Below this many pixels palette extraction runs on one thread.
const PARALLEL_THRESHOLD: usize = 64 * 64;

const COLOR_TYPE_INDEXED: u8 = 3;
const COLOR_TYPE_RGBA: u8 = 6;

/// Encode RGBA pixels, choosing indexed or RGBA output.
pub fn encode_png(pixels: &[u8], width: usize, height: usize) -> CropwatchResult<Vec<u8>> {
    check_dimensions(pixels, width, height)?;

    match extract_palette(pixels) {
        Some((palette, indices)) => encode_indexed(&palette, &indices, width, height),
        None => encode_rgba(pixels, width, height),
    }
}

/// Encode RGBA pixels as color type 6.
pub fn encode_rgba(pixels: &[u8], width: usize, height: usize) -> CropwatchResult<Vec<u8>> {
    check_dimensions(pixels, width, height)?;

    let mut png = Vec::with_capacity(pixels.len() / 2 + 64);
    png.extend_from_slice(&SIGNATURE);
    write_chunk(&mut png, b"IHDR", &ihdr(width, height, COLOR_TYPE_RGBA));
    write_chunk(&mut png, b"IDAT", &deflate_scanlines(pixels, width * 4)?);
    write_chunk(&mut png, b"IEND", &[]);
    Ok(png)
}

/// Encode palette indices as color type 3.
pub fn encode_indexed(
    palette: &[[u8; 4]],
    indices: &[u8],
    width: usize,
    height: usize,
) -> CropwatchResult<Vec<u8>> {
    if palette.is_empty() || palette.len() > MAX_PALETTE_SIZE {
        return Err(CropwatchError::RenderError(format!(
            "palette has {} entries",
            palette.len()
        )));
    }
    if indices.len() != width * height {
        return Err(CropwatchError::RenderError(format!(
            "{} indices for a {}x{} image",
            indices.len(),
            width,
            height
        )));
    }

    let mut png = Vec::with_capacity(indices.len() / 2 + palette.len() * 4 + 64);
    png.extend_from_slice(&SIGNATURE);
    write_chunk(&mut png, b"IHDR", &ihdr(width, height, COLOR_TYPE_INDEXED));

    let plte: Vec<u8> = palette.iter().flat_map(|c| [c[0], c[1], c[2]]).collect();
    write_chunk(&mut png, b"PLTE", &plte);

    if palette.iter().any(|c| c[3] < 255) {
        let trns: Vec<u8> = palette.iter().map(|c| c[3]).collect();
        write_chunk(&mut png, b"tRNS", &trns);
    }

    write_chunk(&mut png, b"IDAT", &deflate_scanlines(indices, width)?);
    write_chunk(&mut png, b"IEND", &[]);
    Ok(png)
}

fn check_dimensions(pixels: &[u8], width: usize, height: usize) -> CropwatchResult<()> {
    if width == 0 || height == 0 {
        return Err(CropwatchError::RenderError(format!(
            "cannot encode a {}x{} image",
            width, height
        )));
    }
    if pixels.len() != width * height * 4 {
        return Err(CropwatchError::RenderError(format!(
            "{} bytes of RGBA for a {}x{} image",
            pixels.len(),
            width,
            height
        )));
    }
    Ok(())
}

fn ihdr(width: usize, height: usize, color_type: u8) -> [u8; 13] {
    let mut data = [0u8; 13];
    data[0..4].copy_from_slice(&(width as u32).to_be_bytes());
    data[4..8].copy_from_slice(&(height as u32).to_be_bytes());
    data[8] = 8; // bit depth
    data[9] = color_type;
    // compression, filter and interlace methods stay 0
    data
}

/// Zlib-compress rows, each prefixed with filter type 0.
fn deflate_scanlines(data: &[u8], row_bytes: usize) -> CropwatchResult<Vec<u8>> {
    let mut encoder = flate2::write::ZlibEncoder::new(
        Vec::with_capacity(data.len() / 2),
        flate2::Compression::fast(),
    );

    for row in data.chunks_exact(row_bytes) {
        encoder
            .write_all(&[0])
            .and_then(|_| encoder.write_all(row))
            .map_err(|e| CropwatchError::RenderError(format!("IDAT compression failed: {}", e)))?;
    }

    encoder
        .finish()
        .map_err(|e| CropwatchError::RenderError(format!("IDAT compression failed: {}", e)))
}

fn write_chunk(png: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(kind);
    hasher.update(data);

    png.extend_from_slice(kind);
    png.extend_from_slice(data);
    png.extend_from_slice(&hasher.finalize().to_be_bytes());
}

#[inline(always)]
fn pack(px: &[u8]) -> u32 {
    u32::from_le_bytes([px[0], px[1], px[2], px[3]])
}

/// Distinct colors in first-seen order, `None` past the palette limit.
fn distinct_colors(pixels: &[u8]) -> Option<Vec<u32>> {
    let mut order = Vec::with_capacity(MAX_PALETTE_SIZE);
    let mut seen = HashSet::with_capacity(MAX_PALETTE_SIZE);
    for px in pixels.chunks_exact(4) {
        let c = pack(px);
        if seen.insert(c) {
            order.push(c);
            if order.len() > MAX_PALETTE_SIZE {
                return None;
            }
        }
    }
    Some(order)
}

/// Palette in first-seen order plus one index per pixel, or `None` when the
/// image has more than 256 colors.
fn extract_palette(pixels: &[u8]) -> Option<(Vec<[u8; 4]>, Vec<u8>)> {
    let pixel_count = pixels.len() / 4;

    let distinct = if pixel_count >= PARALLEL_THRESHOLD {
        let chunk_bytes = (pixel_count / rayon::current_num_threads()).max(256) * 4;
        let per_chunk: Vec<Option<Vec<u32>>> = pixels
            .par_chunks(chunk_bytes)
            .map(distinct_colors)
            .collect();

        // merging in chunk order keeps first-seen order
        let mut merged = Vec::with_capacity(MAX_PALETTE_SIZE);
        let mut seen = HashSet::with_capacity(MAX_PALETTE_SIZE);
        for colors in per_chunk {
            for c in colors? {
                if seen.insert(c) {
                    merged.push(c);
                }
            }
            if merged.len() > MAX_PALETTE_SIZE {
                return None;
            }
        }
        merged
    } else {
        distinct_colors(pixels)?
    };

    let lookup: HashMap<u32, u8> = distinct
        .iter()
        .enumerate()
        .map(|(i, c)| (*c, i as u8))
        .collect();

    let indices: Vec<u8> = if pixel_count >= PARALLEL_THRESHOLD {
        pixels
            .par_chunks_exact(4)
            .map(|px| lookup.get(&pack(px)).copied().unwrap_or(0))
            .collect()
    } else {
        pixels
            .chunks_exact(4)
            .map(|px| lookup.get(&pack(px)).copied().unwrap_or(0))
            .collect()
    };

    let palette = distinct.iter().map(|c| c.to_le_bytes()).collect();
    Some((palette, indices))
}
