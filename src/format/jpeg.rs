//! JPEG-in-TIFF stream handling.
//!
//! Tiled TIFFs with JPEG compression (compression 7) usually store each tile
//! as an abbreviated stream: SOI, scan data, EOI, with the quantization and
//! Huffman tables stored once in the `JPEGTables` tag. Such a tile cannot be
//! decoded on its own; the tables have to be spliced in first:
//!
//! ```text
//! tables:  SOI DQT DHT ... EOI
//! tile:    SOI SOS ... EOI
//! merged:  SOI DQT DHT ... SOS ... EOI
//! ```

use bytes::{Bytes, BytesMut};

/// Start Of Image
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End Of Image
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Define Huffman Table
pub const DHT: [u8; 2] = [0xFF, 0xC4];

/// Define Quantization Table
pub const DQT: [u8; 2] = [0xFF, 0xDB];

/// Start Of Scan
pub const SOS: [u8; 2] = [0xFF, 0xDA];

/// Whether a stream reaches its first scan without defining any tables.
pub fn is_abbreviated_stream(data: &[u8]) -> bool {
    if data.len() < 4 || data[..2] != SOI {
        return false;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }

        let marker = [data[pos], data[pos + 1]];
        if marker == DQT || marker == DHT {
            return false;
        }
        if marker == SOS {
            return true;
        }

        // Standalone markers have no length field
        let standalone = matches!(marker[1], 0x00 | 0x01 | 0xD0..=0xD9 | 0xFF);
        if !standalone && pos + 3 < data.len() {
            let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            pos += 2 + length;
        } else {
            pos += 2;
        }
    }

    false
}

/// Whether a stream carries its own quantization tables.
pub fn is_complete_stream(data: &[u8]) -> bool {
    data.len() >= 4
        && data[..2] == SOI
        && data[2..].windows(2).any(|marker| marker == DQT)
}

/// Splice shared tables in front of an abbreviated tile stream.
pub fn merge_jpeg_tables(tables: &[u8], tile_data: &[u8]) -> Bytes {
    if tables.is_empty() {
        return Bytes::copy_from_slice(tile_data);
    }
    if tile_data.is_empty() {
        return Bytes::new();
    }

    let tables = tables.strip_suffix(&EOI[..]).unwrap_or(tables);
    let scan = tile_data.strip_prefix(&SOI[..]).unwrap_or(tile_data);

    let mut merged = BytesMut::with_capacity(tables.len() + scan.len());
    merged.extend_from_slice(tables);
    merged.extend_from_slice(scan);
    merged.freeze()
}

/// Produce a decodable stream for a raw tile, merging tables when needed.
pub fn prepare_tile_jpeg(tables: Option<&[u8]>, tile_data: &[u8]) -> Bytes {
    match tables {
        Some(tables) if !is_complete_stream(tile_data) && is_abbreviated_stream(tile_data) => {
            merge_jpeg_tables(tables, tile_data)
        }
        _ => Bytes::copy_from_slice(tile_data),
    }
}
