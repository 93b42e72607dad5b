//! TIFF tag value reading.
//!
//! Values can be stored either inline in the IFD entry (for small values)
//! or at an offset in the file (for larger values like arrays). Arrays are
//! fetched with a single range read.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::FieldType;

// =============================================================================
// ValueReader
// =============================================================================

/// Reads tag values from a TIFF file, respecting its byte order.
pub struct ValueReader<'a, R: RangeReader + ?Sized> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader + ?Sized> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Read raw bytes for an IFD entry's value.
    ///
    /// For inline values, returns the bytes from the entry.
    /// For offset values, fetches the bytes from the file.
    pub async fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ))
        } else {
            let offset = entry.value_offset(self.header.byte_order);
            let bytes = self.reader.read_exact_at(offset, size as usize).await?;
            Ok(bytes)
        }
    }

    /// Read a single SHORT or LONG value.
    pub async fn read_u32(&self, entry: &IfdEntry) -> Result<u32, TiffError> {
        if let Some(value) = entry.inline_u32(self.header.byte_order) {
            return Ok(value);
        }

        let values = self.read_u64_array(entry).await?;
        match values.as_slice() {
            [value] => u32::try_from(*value).map_err(|_| TiffError::InvalidTagValue {
                tag: "unknown",
                message: format!("value {} does not fit in 32 bits", value),
            }),
            _ => Err(TiffError::InvalidTagValue {
                tag: "unknown",
                message: format!("expected count 1, got {}", entry.count),
            }),
        }
    }

    /// Read an array of SHORT values (GeoKey directory, BitsPerSample).
    pub async fn read_u16_array(&self, entry: &IfdEntry) -> Result<Vec<u16>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if field_type != FieldType::Short {
            return Err(TiffError::InvalidTagValue {
                tag: "unknown",
                message: format!("expected Short array, got {:?}", field_type),
            });
        }

        let bytes = self.read_bytes(entry).await?;
        let byte_order = self.header.byte_order;
        Ok(bytes
            .chunks_exact(2)
            .map(|chunk| byte_order.read_u16(chunk))
            .collect())
    }

    /// Read an array of unsigned integers, widening SHORT and LONG to u64.
    ///
    /// This is the primary method for reading TileOffsets and TileByteCounts.
    pub async fn read_u64_array(&self, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.count == 0 {
            return Ok(Vec::new());
        }

        let bytes = self.read_bytes(entry).await?;
        let byte_order = self.header.byte_order;

        let values = match field_type {
            FieldType::Short => bytes
                .chunks_exact(2)
                .map(|c| byte_order.read_u16(c) as u64)
                .collect(),
            FieldType::Long => bytes
                .chunks_exact(4)
                .map(|c| byte_order.read_u32(c) as u64)
                .collect(),
            FieldType::Long8 => bytes
                .chunks_exact(8)
                .map(|c| byte_order.read_u64(c))
                .collect(),
            _ => {
                return Err(TiffError::InvalidTagValue {
                    tag: "unknown",
                    message: format!(
                        "expected Short, Long, or Long8 for array, got {:?}",
                        field_type
                    ),
                });
            }
        };

        Ok(values)
    }

    /// Read an array of DOUBLE values (ModelPixelScale, ModelTiepoint).
    pub async fn read_f64_array(&self, entry: &IfdEntry) -> Result<Vec<f64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if field_type != FieldType::Double {
            return Err(TiffError::InvalidTagValue {
                tag: "unknown",
                message: format!("expected Double array, got {:?}", field_type),
            });
        }

        let bytes = self.read_bytes(entry).await?;
        let byte_order = self.header.byte_order;
        Ok(bytes
            .chunks_exact(8)
            .map(|chunk| byte_order.read_f64(chunk))
            .collect())
    }

    /// Read raw bytes from an entry (JPEGTables and other opaque data).
    pub async fn read_raw_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        self.read_bytes(entry).await
    }
}

// =============================================================================
// Tests
// =============================================================================
