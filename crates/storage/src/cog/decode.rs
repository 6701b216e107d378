//! Block decompression and sample conversion.

use std::io::Read;

use cropwatch_common::{CropwatchError, CropwatchResult};
use flate2::read::ZlibDecoder;

use super::tiff::ByteOrder;

/// Block compression schemes the reader decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Deflate,
}

impl Compression {
    pub fn from_code(code: u64) -> CropwatchResult<Self> {
        match code {
            1 => Ok(Compression::None),
            // 8 is Adobe Deflate, 32946 the older PKZIP code GDAL still reads
            8 | 32946 => Ok(Compression::Deflate),
            other => Err(CropwatchError::UnsupportedFormat(format!(
                "compression {} is not supported",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predictor {
    None,
    /// Horizontal differencing
    Horizontal,
}

impl Predictor {
    pub fn from_code(code: u64) -> CropwatchResult<Self> {
        match code {
            1 => Ok(Predictor::None),
            2 => Ok(Predictor::Horizontal),
            other => Err(CropwatchError::UnsupportedFormat(format!(
                "predictor {} is not supported",
                other
            ))),
        }
    }
}

/// Numeric interpretation of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    F32,
    F64,
}

impl SampleType {
    /// Combine the SampleFormat (339) and BitsPerSample (258) tags.
    pub fn from_tags(sample_format: u64, bits: u64) -> CropwatchResult<Self> {
        match (sample_format, bits) {
            (1, 8) => Ok(SampleType::U8),
            (1, 16) => Ok(SampleType::U16),
            (1, 32) => Ok(SampleType::U32),
            (2, 8) => Ok(SampleType::I8),
            (2, 16) => Ok(SampleType::I16),
            (2, 32) => Ok(SampleType::I32),
            (3, 32) => Ok(SampleType::F32),
            (3, 64) => Ok(SampleType::F64),
            (format, bits) => Err(CropwatchError::UnsupportedFormat(format!(
                "sample format {} with {} bits per sample",
                format, bits
            ))),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            SampleType::U8 | SampleType::I8 => 1,
            SampleType::U16 | SampleType::I16 => 2,
            SampleType::U32 | SampleType::I32 | SampleType::F32 => 4,
            SampleType::F64 => 8,
        }
    }

    /// Interpret the raw bits of one sample as f32.
    fn to_f32(self, raw: u64) -> f32 {
        match self {
            SampleType::U8 | SampleType::U16 | SampleType::U32 => raw as f32,
            SampleType::I8 => raw as u8 as i8 as f32,
            SampleType::I16 => raw as u16 as i16 as f32,
            SampleType::I32 => raw as u32 as i32 as f32,
            SampleType::F32 => f32::from_bits(raw as u32),
            SampleType::F64 => f64::from_bits(raw) as f32,
        }
    }
}

/// Layout of one encoded block (tile or strip).
#[derive(Debug, Clone, Copy)]
pub struct BlockLayout {
    pub width: usize,
    pub height: usize,
    pub sample_type: SampleType,
    pub byte_order: ByteOrder,
    pub compression: Compression,
    pub predictor: Predictor,
}

/// Decompress one block and return its samples as f32, row-major.
pub fn decode_block(encoded: &[u8], layout: &BlockLayout) -> CropwatchResult<Vec<f32>> {
    let raw = match layout.compression {
        Compression::None => encoded.to_vec(),
        Compression::Deflate => {
            let mut out = Vec::with_capacity(layout.width * layout.height * layout.sample_type.size());
            ZlibDecoder::new(encoded)
                .read_to_end(&mut out)
                .map_err(|e| CropwatchError::UnsupportedFormat(format!("corrupt deflate block: {}", e)))?;
            out
        }
    };

    let size = layout.sample_type.size();
    let expected = layout.width * layout.height * size;
    if raw.len() < expected {
        return Err(CropwatchError::UnsupportedFormat(format!(
            "block decoded to {} bytes, expected {}",
            raw.len(),
            expected
        )));
    }

    let mut samples: Vec<u64> = raw[..expected]
        .chunks_exact(size)
        .map(|c| layout.byte_order.uint(c, size))
        .collect();

    if layout.predictor == Predictor::Horizontal {
        undo_horizontal_predictor(&mut samples, layout.width, size);
    }

    Ok(samples
        .into_iter()
        .map(|raw| layout.sample_type.to_f32(raw))
        .collect())
}

/// Reverse horizontal differencing in place, wrapping at the sample width.
fn undo_horizontal_predictor(samples: &mut [u64], width: usize, sample_size: usize) {
    if width == 0 {
        return;
    }
    let mask = if sample_size >= 8 {
        u64::MAX
    } else {
        (1u64 << (sample_size * 8)) - 1
    };
    for row in samples.chunks_mut(width) {
        for i in 1..row.len() {
            row[i] = row[i].wrapping_add(row[i - 1]) & mask;
        }
    }
}
