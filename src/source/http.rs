//! Tiles proxied from an upstream map server.
//!
//! Four upstream protocols share one implementation:
//!
//! - `xyz` / `tms`: URL template with `{x}`, `{y}` (or `{-y}`) and `{z}`
//! - `wmts`: URL template, or a KVP `GetTile` request when the location has
//!   no placeholders
//! - `wms`: one `GetMap` request per tile covering the tile's EPSG:3857
//!   envelope at 256x256
//!
//! Proxy sources may carry a write-through cache: tiles are looked up in a
//! tile store first and stored there after a successful fetch.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::error::{IoError, SourceError, TileError};
use crate::format::TileFormat;
use crate::geo::{flip_y, tile_to_projected, MAX_ZOOM, TILE_SIZE};
use crate::store::TileStore;

use super::{
    fill_template, BackendConfiguration, SourceConfiguration, TileSource, WmsParameters,
    WmtsParameters,
};

/// Default timeout of one upstream request.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// How tile requests are turned into upstream URLs.
enum UpstreamRequest {
    Template,
    WmtsGetTile { base: Url, params: WmtsParameters },
    WmsGetMap { base: Url, params: WmsParameters },
}

/// Proxy for XYZ, TMS, WMTS and WMS upstreams.
pub struct HttpSource {
    config: SourceConfiguration,
    client: reqwest::Client,
    request: UpstreamRequest,
    cache: Option<TileStore>,
}

impl HttpSource {
    /// Validate the upstream location and open the cache, if configured.
    pub async fn init(
        mut config: SourceConfiguration,
        client: reqwest::Client,
    ) -> Result<Self, SourceError> {
        let base = Url::parse(&config.location).map_err(|e| {
            SourceError::configuration(&config.id, format!("invalid upstream URL: {}", e))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(SourceError::configuration(
                &config.id,
                format!("unsupported URL scheme '{}'", base.scheme()),
            ));
        }

        let request = match &config.backend {
            BackendConfiguration::Xyz { .. } | BackendConfiguration::Tms { .. } => {
                check_template(&config)?;
                UpstreamRequest::Template
            }
            BackendConfiguration::Wmts { wmts, .. } => {
                if has_placeholders(&config.location) {
                    check_template(&config)?;
                    UpstreamRequest::Template
                } else if wmts.layer.is_empty() {
                    return Err(SourceError::configuration(
                        &config.id,
                        "WMTS KVP requests need wmts.layer",
                    ));
                } else {
                    UpstreamRequest::WmtsGetTile {
                        base,
                        params: wmts.clone(),
                    }
                }
            }
            BackendConfiguration::Wms { wms, .. } => {
                if wms.layers.is_empty() {
                    return Err(SourceError::configuration(&config.id, "missing wms.layers"));
                }
                if !matches!(wms.version.as_str(), "1.1.1" | "1.3.0") {
                    return Err(SourceError::configuration(
                        &config.id,
                        format!("unsupported WMS version '{}'", wms.version),
                    ));
                }
                UpstreamRequest::WmsGetMap {
                    base,
                    params: wms.clone(),
                }
            }
            other => {
                return Err(SourceError::configuration(
                    &config.id,
                    format!("'{}' is not an HTTP backend", other.type_name()),
                ))
            }
        };

        if config.format.is_none() {
            config.format = Some(TileFormat::from_path(&config.location).unwrap_or(TileFormat::Png));
        }
        config.min_zoom.get_or_insert(0);
        config.max_zoom.get_or_insert(MAX_ZOOM);
        let tms_default = matches!(config.backend, BackendConfiguration::Tms { .. });
        config.tms.get_or_insert(tms_default);

        let cache = match config.backend.cache() {
            Some(cache) => {
                if let Some(parent) = cache.db_file.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent)
                            .await
                            .map_err(IoError::from)?;
                    }
                }
                Some(TileStore::open_or_create(&cache.db_file).await?)
            }
            None => None,
        };

        Ok(Self {
            config,
            client,
            request,
            cache,
        })
    }

    /// Upstream URL for the XYZ tile `(x, y, z)`.
    fn tile_url(&self, x: u32, y: u32, z: u8) -> String {
        let tms_y = flip_y(y, z);
        match &self.request {
            UpstreamRequest::Template => {
                let row = if self.config.tms() { tms_y } else { y };
                fill_template(&self.config.location, x, row, tms_y, z)
            }
            UpstreamRequest::WmtsGetTile { base, params } => {
                let mut url = base.clone();
                url.query_pairs_mut()
                    .append_pair("SERVICE", "WMTS")
                    .append_pair("REQUEST", "GetTile")
                    .append_pair("VERSION", "1.0.0")
                    .append_pair("LAYER", &params.layer)
                    .append_pair("STYLE", &params.style)
                    .append_pair("TILEMATRIXSET", &params.tile_matrix_set)
                    .append_pair("TILEMATRIX", &z.to_string())
                    .append_pair("TILEROW", &y.to_string())
                    .append_pair("TILECOL", &x.to_string())
                    .append_pair("FORMAT", self.config.format().content_type());
                url.into()
            }
            UpstreamRequest::WmsGetMap { base, params } => {
                let bounds = tile_to_projected(x, y, z);
                let srs_key = if params.version == "1.3.0" { "CRS" } else { "SRS" };
                let bbox = format!(
                    "{},{},{},{}",
                    bounds.left, bounds.bottom, bounds.right, bounds.top
                );
                let size = TILE_SIZE.to_string();
                let mut url = base.clone();
                url.query_pairs_mut()
                    .append_pair("SERVICE", "WMS")
                    .append_pair("REQUEST", "GetMap")
                    .append_pair("VERSION", &params.version)
                    .append_pair("LAYERS", &params.layers)
                    .append_pair("STYLES", &params.styles)
                    .append_pair(srs_key, "EPSG:3857")
                    .append_pair("BBOX", &bbox)
                    .append_pair("WIDTH", &size)
                    .append_pair("HEIGHT", &size)
                    .append_pair("FORMAT", self.config.format().content_type())
                    .append_pair(
                        "TRANSPARENT",
                        if params.transparent { "TRUE" } else { "FALSE" },
                    );
                url.into()
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<Option<Bytes>, TileError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TileError::Upstream {
                message: format!("request to {} failed: {}", url, e),
            })?;

        if response.status() != StatusCode::OK {
            debug!(
                source_id = %self.config.id,
                status = response.status().as_u16(),
                url = url,
                "Upstream returned no tile"
            );
            return Ok(None);
        }

        let body = response.bytes().await.map_err(|e| TileError::Upstream {
            message: format!("reading response from {} failed: {}", url, e),
        })?;
        Ok(Some(body))
    }

    async fn read_cached(&self, store: &TileStore, x: u32, tms_y: u32, z: u8) -> Option<Bytes> {
        match store.read_tile(x, tms_y, z).await {
            Ok(found) => found,
            Err(e) => {
                warn!(source_id = %self.config.id, error = %e, "Tile cache read failed");
                None
            }
        }
    }
}

#[async_trait]
impl TileSource for HttpSource {
    fn configuration(&self) -> &SourceConfiguration {
        &self.config
    }

    async fn get_tile(
        &self,
        x: u32,
        y: u32,
        z: u8,
        cancel: &CancellationToken,
    ) -> Result<Option<Bytes>, TileError> {
        if !self.config.covers(x, y, z) {
            return Ok(None);
        }

        let tms_y = flip_y(y, z);
        if let Some(store) = &self.cache {
            if let Some(data) = self.read_cached(store, x, tms_y, z).await {
                debug!(source_id = %self.config.id, x, y, z, "Tile cache hit");
                return Ok(Some(data));
            }
        }

        let url = self.tile_url(x, y, z);
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TileError::Cancelled),
            result = self.fetch(&url) => result?,
        };

        if let (Some(store), Some(data)) = (&self.cache, &fetched) {
            if let Err(e) = store.add_tile(x, tms_y, z, data).await {
                warn!(source_id = %self.config.id, error = %e, "Tile cache write failed");
            }
        }

        Ok(fetched)
    }
}

fn has_placeholders(location: &str) -> bool {
    ["{x}", "{y}", "{-y}", "{z}"]
        .iter()
        .any(|p| location.contains(p))
}

fn check_template(config: &SourceConfiguration) -> Result<(), SourceError> {
    let location = &config.location;
    let has_row = location.contains("{y}") || location.contains("{-y}");
    if location.contains("{x}") && has_row && location.contains("{z}") {
        Ok(())
    } else {
        Err(SourceError::configuration(
            &config.id,
            "URL template must contain {x}, {y} or {-y}, and {z}",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::CacheConfiguration;

    fn config(location: &str, backend: BackendConfiguration) -> SourceConfiguration {
        SourceConfiguration {
            id: "upstream".to_string(),
            title: String::new(),
            abstract_text: String::new(),
            format: None,
            min_zoom: None,
            max_zoom: None,
            tms: None,
            location: location.to_string(),
            bounds: None,
            backend,
        }
    }

    async fn init(location: &str, backend: BackendConfiguration) -> HttpSource {
        HttpSource::init(config(location, backend), reqwest::Client::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_xyz_and_tms_templates() {
        let xyz = init(
            "https://tiles.example.com/{z}/{x}/{y}.png",
            BackendConfiguration::Xyz { cache: None },
        )
        .await;
        assert_eq!(xyz.tile_url(1, 0, 2), "https://tiles.example.com/2/1/0.png");
        assert_eq!(xyz.configuration().format(), TileFormat::Png);

        let tms = init(
            "https://tiles.example.com/{z}/{x}/{y}.jpg",
            BackendConfiguration::Tms { cache: None },
        )
        .await;
        assert!(tms.configuration().tms());
        assert_eq!(tms.tile_url(1, 0, 2), "https://tiles.example.com/2/1/3.jpg");
        assert_eq!(tms.configuration().format(), TileFormat::Jpeg);

        let inverted = init(
            "https://tiles.example.com/{z}/{x}/{-y}.png",
            BackendConfiguration::Xyz { cache: None },
        )
        .await;
        assert_eq!(inverted.tile_url(0, 0, 1), "https://tiles.example.com/1/0/1.png");
    }

    #[tokio::test]
    async fn test_wmts_kvp_url() {
        let source = init(
            "https://maps.example.com/wmts",
            BackendConfiguration::Wmts {
                wmts: WmtsParameters {
                    layer: "ortho".to_string(),
                    style: "default".to_string(),
                    tile_matrix_set: "GoogleMapsCompatible".to_string(),
                },
                cache: None,
            },
        )
        .await;

        let url = Url::parse(&source.tile_url(5, 7, 4)).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("REQUEST".to_string(), "GetTile".to_string())));
        assert!(pairs.contains(&("LAYER".to_string(), "ortho".to_string())));
        assert!(pairs.contains(&("TILEMATRIX".to_string(), "4".to_string())));
        assert!(pairs.contains(&("TILEROW".to_string(), "7".to_string())));
        assert!(pairs.contains(&("TILECOL".to_string(), "5".to_string())));
    }

    #[tokio::test]
    async fn test_wms_getmap_url() {
        let wms = |version: &str| BackendConfiguration::Wms {
            wms: WmsParameters {
                layers: "topo".to_string(),
                styles: String::new(),
                version: version.to_string(),
                transparent: true,
            },
            cache: None,
        };

        let source = init("https://maps.example.com/wms?map=base", wms("1.1.1")).await;
        let url = Url::parse(&source.tile_url(0, 0, 0)).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("map".to_string(), "base".to_string())));
        assert!(pairs.contains(&("SRS".to_string(), "EPSG:3857".to_string())));
        assert!(pairs.contains(&("WIDTH".to_string(), "256".to_string())));
        assert!(pairs.contains(&("TRANSPARENT".to_string(), "TRUE".to_string())));
        let bbox = &pairs.iter().find(|(k, _)| k == "BBOX").unwrap().1;
        let values: Vec<f64> = bbox.split(',').map(|v| v.parse().unwrap()).collect();
        assert!((values[0] + 20037508.342789244).abs() < 1e-3);
        assert!((values[3] - 20037508.342789244).abs() < 1e-3);

        let source = init("https://maps.example.com/wms", wms("1.3.0")).await;
        let url = Url::parse(&source.tile_url(0, 0, 0)).unwrap();
        assert!(url.query_pairs().any(|(k, v)| k == "CRS" && v == "EPSG:3857"));
    }

    #[tokio::test]
    async fn test_init_rejects_bad_locations() {
        let client = reqwest::Client::new();
        let cases = [
            ("not a url", BackendConfiguration::Xyz { cache: None }),
            ("ftp://example.com/{z}/{x}/{y}", BackendConfiguration::Xyz { cache: None }),
            ("https://example.com/{z}/{x}.png", BackendConfiguration::Xyz { cache: None }),
        ];
        for (location, backend) in cases {
            let result = HttpSource::init(config(location, backend), client.clone()).await;
            assert!(matches!(result, Err(SourceError::Configuration { .. })), "{}", location);
        }
    }

    #[tokio::test]
    async fn test_zoom_outside_range_skips_network() {
        let mut config = config(
            "http://127.0.0.1:9/{z}/{x}/{y}.png",
            BackendConfiguration::Xyz { cache: None },
        );
        config.max_zoom = Some(3);
        let source = HttpSource::init(config, reqwest::Client::new()).await.unwrap();
        let cancel = CancellationToken::new();
        assert_eq!(source.get_tile(0, 0, 4, &cancel).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cancelled_request() {
        let source = init(
            "http://10.255.255.1/{z}/{x}/{y}.png",
            BackendConfiguration::Xyz { cache: None },
        )
        .await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = source.get_tile(0, 0, 0, &cancel).await;
        assert!(matches!(result, Err(TileError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cache_file_created() {
        let dir = tempfile::TempDir::new().unwrap();
        let db_file = dir.path().join("cache").join("osm.mbtiles");
        let source = init(
            "https://tiles.example.com/{z}/{x}/{y}.png",
            BackendConfiguration::Xyz {
                cache: Some(CacheConfiguration {
                    db_file: db_file.clone(),
                }),
            },
        )
        .await;
        assert!(source.cache.is_some());
        assert!(db_file.exists());
    }
}
