//! Tile formats and container parsers.
//!
//! [`TileFormat`] names the encodings a source can serve and knows how to
//! recognize each one from its leading bytes. The [`tiff`] module parses
//! GeoTIFF structure and [`jpeg`] repairs abbreviated JPEG tiles stored
//! inside them.

pub mod jpeg;
pub mod tiff;

use serde::{Deserialize, Serialize};

/// Encoding of a tile as stored by a source or requested by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileFormat {
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
    Webp,
    /// Mapbox vector tile (protobuf, usually gzipped)
    #[serde(alias = "pbf")]
    Mvt,
}

impl TileFormat {
    pub const fn content_type(self) -> &'static str {
        match self {
            TileFormat::Png => "image/png",
            TileFormat::Jpeg => "image/jpeg",
            TileFormat::Webp => "image/webp",
            TileFormat::Mvt => "application/vnd.mapbox-vector-tile",
        }
    }

    pub const fn extension(self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Jpeg => "jpg",
            TileFormat::Webp => "webp",
            TileFormat::Mvt => "mvt",
        }
    }

    /// Whether the format is a raster image this crate can decode.
    pub const fn is_raster(self) -> bool {
        !matches!(self, TileFormat::Mvt)
    }

    /// Parse a file extension, a short name or a MIME type.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        match value.as_str() {
            "png" | "image/png" => Some(TileFormat::Png),
            "jpg" | "jpeg" | "image/jpeg" | "image/jpg" => Some(TileFormat::Jpeg),
            "webp" | "image/webp" => Some(TileFormat::Webp),
            "mvt" | "pbf" | "application/vnd.mapbox-vector-tile" | "application/x-protobuf" => {
                Some(TileFormat::Mvt)
            }
            _ => None,
        }
    }

    /// Infer the format from a path or URL template's extension.
    pub fn from_path(path: &str) -> Option<Self> {
        let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
        let name = name.split(['?', '#']).next().unwrap_or(name);
        let (_, extension) = name.rsplit_once('.')?;
        Self::parse(extension)
    }

    /// Identify encoded tile data from its magic bytes.
    ///
    /// Gzip streams are assumed to be compressed vector tiles.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(TileFormat::Png)
        } else if data.starts_with(&jpeg::SOI) {
            Some(TileFormat::Jpeg)
        } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            Some(TileFormat::Webp)
        } else if data.starts_with(&[0x1F, 0x8B]) {
            Some(TileFormat::Mvt)
        } else {
            None
        }
    }
}

impl std::fmt::Display for TileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TileFormat::Png => "png",
            TileFormat::Jpeg => "jpeg",
            TileFormat::Webp => "webp",
            TileFormat::Mvt => "mvt",
        })
    }
}
