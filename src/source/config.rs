//! Source and service configuration as read from the JSON configuration
//! file.
//!
//! A source entry looks like:
//!
//! ```json
//! {
//!   "id": "osm",
//!   "type": "xyz",
//!   "title": "OpenStreetMap",
//!   "location": "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
//!   "maxZoom": 19,
//!   "cache": { "dbFile": "cache/osm.mbtiles" }
//! }
//! ```
//!
//! Optional fields left out of the file are filled in once by the source's
//! `init` from backend metadata; the finalized configuration then never
//! changes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::format::TileFormat;
use crate::geo::{GeographicBounds, TileCoordinate, MAX_ZOOM};
use crate::tile::DEFAULT_JPEG_QUALITY;

// =============================================================================
// Source Configuration
// =============================================================================

/// One configured tile source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfiguration {
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default, rename = "abstract")]
    pub abstract_text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<TileFormat>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_zoom: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<u8>,

    /// Rows of the backing storage count from the bottom
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tms: Option<bool>,

    /// Path template, database file, URL template, connection string or
    /// raster path, depending on the backend
    pub location: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<GeographicBounds>,

    #[serde(flatten)]
    pub backend: BackendConfiguration,
}

impl SourceConfiguration {
    pub fn format(&self) -> TileFormat {
        self.format.unwrap_or(TileFormat::Png)
    }

    pub fn min_zoom(&self) -> u8 {
        self.min_zoom.unwrap_or(0)
    }

    pub fn max_zoom(&self) -> u8 {
        self.max_zoom.unwrap_or(MAX_ZOOM)
    }

    pub fn tms(&self) -> bool {
        self.tms.unwrap_or(false)
    }

    /// Whether the source may hold the XYZ tile `(x, y, z)` at all.
    pub fn covers(&self, x: u32, y: u32, z: u8) -> bool {
        z >= self.min_zoom() && z <= self.max_zoom() && TileCoordinate::new(x, y, z).is_valid()
    }

    /// Read-only projection for capabilities and the layer listing.
    pub fn layer(&self) -> Layer {
        let format = self.format();
        Layer {
            id: self.id.clone(),
            title: if self.title.is_empty() {
                self.id.clone()
            } else {
                self.title.clone()
            },
            abstract_text: self.abstract_text.clone(),
            format,
            content_type: format.content_type(),
            min_zoom: self.min_zoom(),
            max_zoom: self.max_zoom(),
            bounds: self.bounds.unwrap_or(GeographicBounds::WORLD),
        }
    }
}

// =============================================================================
// Backend Configuration
// =============================================================================

/// Backend-specific settings, selected by the `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfiguration {
    /// Local directory tree of tile files
    File,

    /// MBTiles database
    MbTiles,

    /// Upstream XYZ server
    Xyz {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache: Option<CacheConfiguration>,
    },

    /// Upstream TMS server
    Tms {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache: Option<CacheConfiguration>,
    },

    /// Upstream WMTS server
    Wmts {
        #[serde(default)]
        wmts: WmtsParameters,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache: Option<CacheConfiguration>,
    },

    /// Upstream WMS server
    Wms {
        wms: WmsParameters,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache: Option<CacheConfiguration>,
    },

    /// PostGIS table served as vector tiles
    PostGis { postgis: PostGisParameters },

    /// Tiled GeoTIFF
    GeoTiff,
}

impl BackendConfiguration {
    /// The `type` tag as written in the configuration file.
    pub const fn type_name(&self) -> &'static str {
        match self {
            BackendConfiguration::File => "file",
            BackendConfiguration::MbTiles => "mbtiles",
            BackendConfiguration::Xyz { .. } => "xyz",
            BackendConfiguration::Tms { .. } => "tms",
            BackendConfiguration::Wmts { .. } => "wmts",
            BackendConfiguration::Wms { .. } => "wms",
            BackendConfiguration::PostGis { .. } => "postgis",
            BackendConfiguration::GeoTiff => "geotiff",
        }
    }

    /// Write-through cache settings of proxy backends.
    pub fn cache(&self) -> Option<&CacheConfiguration> {
        match self {
            BackendConfiguration::Xyz { cache }
            | BackendConfiguration::Tms { cache }
            | BackendConfiguration::Wmts { cache, .. }
            | BackendConfiguration::Wms { cache, .. } => cache.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WmtsParameters {
    #[serde(default)]
    pub layer: String,

    #[serde(default = "default_wmts_style")]
    pub style: String,

    #[serde(default = "default_tile_matrix_set")]
    pub tile_matrix_set: String,
}

impl Default for WmtsParameters {
    fn default() -> Self {
        Self {
            layer: String::new(),
            style: default_wmts_style(),
            tile_matrix_set: default_tile_matrix_set(),
        }
    }
}

fn default_wmts_style() -> String {
    "default".to_string()
}

fn default_tile_matrix_set() -> String {
    "GoogleMapsCompatible".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WmsParameters {
    /// Comma-separated upstream layer names
    pub layers: String,

    #[serde(default)]
    pub styles: String,

    /// `1.1.1` or `1.3.0`
    #[serde(default = "default_wms_version")]
    pub version: String,

    #[serde(default)]
    pub transparent: bool,
}

fn default_wms_version() -> String {
    "1.1.1".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostGisParameters {
    /// Table name, optionally schema-qualified
    pub table: String,

    #[serde(default = "default_geometry_column")]
    pub geometry: String,

    /// Attribute columns copied into the vector tile
    #[serde(default)]
    pub fields: Vec<String>,

    /// SRID of the geometry column; looked up when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srid: Option<i32>,
}

fn default_geometry_column() -> String {
    "geom".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfiguration {
    /// Tile store file; created on first use
    pub db_file: PathBuf,
}

// =============================================================================
// Layer and Service Properties
// =============================================================================

/// Public view of a finalized source.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub format: TileFormat,
    pub content_type: &'static str,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub bounds: GeographicBounds,
}

/// Service-wide descriptive properties and rendering settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceProperties {
    #[serde(default = "default_service_title")]
    pub title: String,

    #[serde(default, rename = "abstract")]
    pub abstract_text: String,

    #[serde(default)]
    pub keywords: Vec<String>,

    /// Quality of JPEG output (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl Default for ServiceProperties {
    fn default() -> Self {
        Self {
            title: default_service_title(),
            abstract_text: String::new(),
            keywords: Vec::new(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

fn default_service_title() -> String {
    "Tile Map Service".to_string()
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}
