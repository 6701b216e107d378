//! TIFF / BigTIFF header and IFD parsing.
//!
//! Only the structural parts a windowed reader needs are decoded here: the
//! byte order, the first IFD and its entries. Entry values that do not fit
//! inline are left as file offsets so the caller can fetch them with a range
//! request when the header prefix does not already cover them.

use bytes::Bytes;
use cropwatch_common::{CropwatchError, CropwatchResult};

/// Tag numbers used by the reader.
pub mod tags {
    pub const IMAGE_WIDTH: u16 = 256;
    pub const IMAGE_LENGTH: u16 = 257;
    pub const BITS_PER_SAMPLE: u16 = 258;
    pub const COMPRESSION: u16 = 259;
    pub const STRIP_OFFSETS: u16 = 273;
    pub const SAMPLES_PER_PIXEL: u16 = 277;
    pub const ROWS_PER_STRIP: u16 = 278;
    pub const STRIP_BYTE_COUNTS: u16 = 279;
    pub const PREDICTOR: u16 = 317;
    pub const TILE_WIDTH: u16 = 322;
    pub const TILE_LENGTH: u16 = 323;
    pub const TILE_OFFSETS: u16 = 324;
    pub const TILE_BYTE_COUNTS: u16 = 325;
    pub const SAMPLE_FORMAT: u16 = 339;
    pub const MODEL_PIXEL_SCALE: u16 = 33550;
    pub const MODEL_TIEPOINT: u16 = 33922;
    pub const MODEL_TRANSFORMATION: u16 = 34264;
    pub const GEO_KEY_DIRECTORY: u16 = 34735;
    pub const GDAL_NODATA: u16 = 42113;
}

/// Field types as defined by TIFF 6.0 and BigTIFF.
pub mod field_types {
    pub const BYTE: u16 = 1;
    pub const ASCII: u16 = 2;
    pub const SHORT: u16 = 3;
    pub const LONG: u16 = 4;
    pub const RATIONAL: u16 = 5;
    pub const SBYTE: u16 = 6;
    pub const UNDEFINED: u16 = 7;
    pub const SSHORT: u16 = 8;
    pub const SLONG: u16 = 9;
    pub const SRATIONAL: u16 = 10;
    pub const FLOAT: u16 = 11;
    pub const DOUBLE: u16 = 12;
    pub const IFD: u16 = 13;
    pub const LONG8: u16 = 16;
    pub const SLONG8: u16 = 17;
    pub const IFD8: u16 = 18;
}

/// Size in bytes of one value of a field type, `None` for unknown types.
pub fn field_type_size(field_type: u16) -> Option<u64> {
    use field_types::*;
    match field_type {
        BYTE | ASCII | SBYTE | UNDEFINED => Some(1),
        SHORT | SSHORT => Some(2),
        LONG | SLONG | FLOAT | IFD => Some(4),
        RATIONAL | SRATIONAL | DOUBLE | LONG8 | SLONG8 | IFD8 => Some(8),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// "II"
    LittleEndian,
    /// "MM"
    BigEndian,
}

impl ByteOrder {
    pub fn u16(&self, b: &[u8]) -> u16 {
        let arr = [b[0], b[1]];
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(arr),
            ByteOrder::BigEndian => u16::from_be_bytes(arr),
        }
    }

    pub fn u32(&self, b: &[u8]) -> u32 {
        let arr = [b[0], b[1], b[2], b[3]];
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(arr),
            ByteOrder::BigEndian => u32::from_be_bytes(arr),
        }
    }

    pub fn u64(&self, b: &[u8]) -> u64 {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&b[..8]);
        match self {
            ByteOrder::LittleEndian => u64::from_le_bytes(arr),
            ByteOrder::BigEndian => u64::from_be_bytes(arr),
        }
    }

    /// Read an unsigned value of `size` bytes (1, 2, 4 or 8).
    pub fn uint(&self, b: &[u8], size: usize) -> u64 {
        match size {
            1 => b[0] as u64,
            2 => self.u16(b) as u64,
            4 => self.u32(b) as u64,
            _ => self.u64(b),
        }
    }
}

/// Parsed file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    pub byte_order: ByteOrder,
    pub big_tiff: bool,
    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Parse the 8-byte (classic) or 16-byte (BigTIFF) header.
    pub fn parse(buf: &[u8]) -> CropwatchResult<Self> {
        if buf.len() < 8 {
            return Err(CropwatchError::UnsupportedFormat(
                "file is too short to be a TIFF".to_string(),
            ));
        }

        let byte_order = match &buf[0..2] {
            b"II" => ByteOrder::LittleEndian,
            b"MM" => ByteOrder::BigEndian,
            other => {
                return Err(CropwatchError::UnsupportedFormat(format!(
                    "bad TIFF byte order marker {:?}",
                    other
                )))
            }
        };

        match byte_order.u16(&buf[2..4]) {
            42 => Ok(Self {
                byte_order,
                big_tiff: false,
                first_ifd_offset: byte_order.u32(&buf[4..8]) as u64,
            }),
            43 => {
                if buf.len() < 16 {
                    return Err(CropwatchError::UnsupportedFormat(
                        "truncated BigTIFF header".to_string(),
                    ));
                }
                let offset_size = byte_order.u16(&buf[4..6]);
                if offset_size != 8 {
                    return Err(CropwatchError::UnsupportedFormat(format!(
                        "BigTIFF offset size {} is not 8",
                        offset_size
                    )));
                }
                Ok(Self {
                    byte_order,
                    big_tiff: true,
                    first_ifd_offset: byte_order.u64(&buf[8..16]),
                })
            }
            version => Err(CropwatchError::UnsupportedFormat(format!(
                "unknown TIFF version {}",
                version
            ))),
        }
    }

    /// Size of the entry-count field that starts an IFD.
    pub fn ifd_count_size(&self) -> u64 {
        if self.big_tiff {
            8
        } else {
            2
        }
    }

    /// Size of one IFD entry.
    pub fn ifd_entry_size(&self) -> u64 {
        if self.big_tiff {
            20
        } else {
            12
        }
    }

    /// Largest value payload stored inline in an entry.
    fn inline_capacity(&self) -> u64 {
        if self.big_tiff {
            8
        } else {
            4
        }
    }
}

/// Where an entry's value bytes live.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryData {
    Inline(Bytes),
    /// Absolute file range holding the value bytes.
    Offset { offset: u64, len: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfdEntry {
    pub tag: u16,
    pub field_type: u16,
    pub count: u64,
    pub data: EntryData,
}

/// One image file directory.
#[derive(Debug, Clone, Default)]
pub struct Ifd {
    entries: Vec<IfdEntry>,
}

impl Ifd {
    /// Parse `count` entries from `buf`, which must start at the first entry.
    pub fn parse_entries(buf: &[u8], count: u64, header: &TiffHeader) -> CropwatchResult<Self> {
        let entry_size = header.ifd_entry_size() as usize;
        let needed = count as usize * entry_size;
        if buf.len() < needed {
            return Err(CropwatchError::UnsupportedFormat(format!(
                "IFD needs {} bytes, got {}",
                needed,
                buf.len()
            )));
        }

        let order = header.byte_order;
        let mut entries = Vec::with_capacity(count as usize);
        for chunk in buf[..needed].chunks_exact(entry_size) {
            let tag = order.u16(&chunk[0..2]);
            let field_type = order.u16(&chunk[2..4]);
            let (count, value_field) = if header.big_tiff {
                (order.u64(&chunk[4..12]), &chunk[12..20])
            } else {
                (order.u32(&chunk[4..8]) as u64, &chunk[8..12])
            };

            // Unknown field types are skipped, as TIFF readers must.
            let Some(type_size) = field_type_size(field_type) else {
                continue;
            };
            let len = type_size.checked_mul(count).ok_or_else(|| {
                CropwatchError::UnsupportedFormat(format!("tag {} count overflows", tag))
            })?;

            let data = if len <= header.inline_capacity() {
                EntryData::Inline(Bytes::copy_from_slice(&value_field[..len as usize]))
            } else {
                let offset = if header.big_tiff {
                    order.u64(value_field)
                } else {
                    order.u32(value_field) as u64
                };
                EntryData::Offset { offset, len }
            };

            entries.push(IfdEntry {
                tag,
                field_type,
                count,
                data,
            });
        }

        Ok(Self { entries })
    }

    pub fn get(&self, tag: u16) -> Option<&IfdEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    pub fn entries(&self) -> &[IfdEntry] {
        &self.entries
    }
}

/// Decode integer-typed values into u64.
pub fn decode_uints(bytes: &[u8], field_type: u16, count: u64, order: ByteOrder) -> CropwatchResult<Vec<u64>> {
    use field_types::*;
    let size = match field_type {
        BYTE | UNDEFINED => 1,
        SHORT => 2,
        LONG | IFD => 4,
        LONG8 | IFD8 => 8,
        other => {
            return Err(CropwatchError::UnsupportedFormat(format!(
                "field type {} is not an unsigned integer",
                other
            )))
        }
    };
    values_in(bytes, size, count)?;
    Ok(bytes
        .chunks_exact(size)
        .take(count as usize)
        .map(|c| order.uint(c, size))
        .collect())
}

/// Decode numeric values of any signed, unsigned or floating type into f64.
pub fn decode_f64s(bytes: &[u8], field_type: u16, count: u64, order: ByteOrder) -> CropwatchResult<Vec<f64>> {
    use field_types::*;
    let n = count as usize;
    let out = match field_type {
        DOUBLE => {
            values_in(bytes, 8, count)?;
            bytes
                .chunks_exact(8)
                .take(n)
                .map(|c| f64::from_bits(order.u64(c)))
                .collect()
        }
        FLOAT => {
            values_in(bytes, 4, count)?;
            bytes
                .chunks_exact(4)
                .take(n)
                .map(|c| f32::from_bits(order.u32(c)) as f64)
                .collect()
        }
        SBYTE => bytes.iter().take(n).map(|b| *b as i8 as f64).collect(),
        SSHORT => {
            values_in(bytes, 2, count)?;
            bytes
                .chunks_exact(2)
                .take(n)
                .map(|c| order.u16(c) as i16 as f64)
                .collect()
        }
        SLONG => {
            values_in(bytes, 4, count)?;
            bytes
                .chunks_exact(4)
                .take(n)
                .map(|c| order.u32(c) as i32 as f64)
                .collect()
        }
        _ => decode_uints(bytes, field_type, count, order)?
            .into_iter()
            .map(|v| v as f64)
            .collect(),
    };
    Ok(out)
}

/// Decode an ASCII value, dropping the trailing NUL.
pub fn decode_ascii(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}

fn values_in(bytes: &[u8], size: usize, count: u64) -> CropwatchResult<()> {
    if (bytes.len() as u64) < size as u64 * count {
        return Err(CropwatchError::UnsupportedFormat(format!(
            "tag value holds {} bytes, expected {}",
            bytes.len(),
            size as u64 * count
        )));
    }
    Ok(())
}
