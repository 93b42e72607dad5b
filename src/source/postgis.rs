//! Vector tiles rendered by PostGIS.
//!
//! Each request runs one `ST_AsMVT` query over the rows whose geometry
//! intersects the tile envelope. PostGIS numbers tiles in the XYZ
//! convention, so coordinates are passed through unchanged.

use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{SourceError, TileError};
use crate::format::TileFormat;
use crate::geo::MAX_ZOOM;

use super::{BackendConfiguration, PostGisParameters, SourceConfiguration, TileSource};

/// Tile extent in MVT coordinate units.
const MVT_EXTENT: u32 = 4096;

/// Geometry buffer around each tile in MVT units.
const MVT_BUFFER: u32 = 64;

/// Serves one table as Mapbox vector tiles.
pub struct PostGisSource {
    config: SourceConfiguration,
    options: PgConnectOptions,
    query: String,
}

impl PostGisSource {
    /// Validate identifiers, resolve the geometry SRID and prepare the tile
    /// query.
    pub async fn init(mut config: SourceConfiguration) -> Result<Self, SourceError> {
        let params = match &config.backend {
            BackendConfiguration::PostGis { postgis } => postgis.clone(),
            other => {
                return Err(SourceError::configuration(
                    &config.id,
                    format!("'{}' is not a PostGIS backend", other.type_name()),
                ))
            }
        };
        validate_identifiers(&config.id, &params)?;

        let options = PgConnectOptions::from_str(&config.location).map_err(|e| {
            SourceError::configuration(&config.id, format!("invalid connection string: {}", e))
        })?;

        let srid = match params.srid {
            Some(srid) => srid,
            None => find_srid(&options, &params).await?,
        };

        config.format = Some(TileFormat::Mvt);
        config.min_zoom.get_or_insert(0);
        config.max_zoom.get_or_insert(MAX_ZOOM);
        config.tms = Some(false);

        let query = tile_query(&config.id, &params, srid);
        debug!(source_id = %config.id, table = %params.table, srid, "Prepared vector tile query");

        Ok(Self {
            config,
            options,
            query,
        })
    }

    async fn render(&self, x: u32, y: u32, z: u8) -> Result<Option<Bytes>, TileError> {
        let database_error = |e: sqlx::Error| TileError::Database {
            message: e.to_string(),
        };

        let mut conn = PgConnection::connect_with(&self.options)
            .await
            .map_err(database_error)?;
        let (tile,): (Option<Vec<u8>>,) = sqlx::query_as(&self.query)
            .bind(z as i32)
            .bind(x as i32)
            .bind(y as i32)
            .fetch_one(&mut conn)
            .await
            .map_err(database_error)?;
        conn.close().await.map_err(database_error)?;

        Ok(tile.filter(|t| !t.is_empty()).map(Bytes::from))
    }
}

#[async_trait]
impl TileSource for PostGisSource {
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

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TileError::Cancelled),
            result = self.render(x, y, z) => result,
        }
    }
}

/// Look up the SRID of the geometry column; fails when the column does not
/// exist.
async fn find_srid(
    options: &PgConnectOptions,
    params: &PostGisParameters,
) -> Result<i32, SourceError> {
    let (schema, table) = match params.table.split_once('.') {
        Some((schema, table)) => (schema, table),
        None => ("public", params.table.as_str()),
    };

    let mut conn = PgConnection::connect_with(options).await?;
    let (srid,): (i32,) = sqlx::query_as("SELECT Find_SRID($1, $2, $3)")
        .bind(schema)
        .bind(table)
        .bind(params.geometry.as_str())
        .fetch_one(&mut conn)
        .await?;
    conn.close().await?;
    Ok(srid)
}

fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_identifiers(id: &str, params: &PostGisParameters) -> Result<(), SourceError> {
    let table_ok = !params.table.is_empty()
        && params.table.split('.').count() <= 2
        && params.table.split('.').all(is_identifier);
    if !table_ok {
        return Err(SourceError::configuration(
            id,
            format!("invalid table name '{}'", params.table),
        ));
    }
    if !is_identifier(&params.geometry) {
        return Err(SourceError::configuration(
            id,
            format!("invalid geometry column '{}'", params.geometry),
        ));
    }
    if let Some(field) = params.fields.iter().find(|f| !is_identifier(f)) {
        return Err(SourceError::configuration(
            id,
            format!("invalid field name '{}'", field),
        ));
    }
    Ok(())
}

/// Tile query with `$1 = z`, `$2 = x`, `$3 = y`.
///
/// Identifiers must already be validated.
fn tile_query(layer: &str, params: &PostGisParameters, srid: i32) -> String {
    let table = params
        .table
        .split('.')
        .map(|part| format!("\"{}\"", part))
        .collect::<Vec<_>>()
        .join(".");
    let geometry = format!("t.\"{}\"", params.geometry);
    let fields: String = params
        .fields
        .iter()
        .map(|f| format!(", t.\"{}\"", f))
        .collect();

    format!(
        "SELECT ST_AsMVT(tile, '{layer}', {extent}, 'geom') FROM (\
         SELECT ST_AsMVTGeom(ST_Transform({geometry}, 3857), ST_TileEnvelope($1, $2, $3), \
         {extent}, {buffer}, true) AS geom{fields} \
         FROM {table} AS t \
         WHERE {geometry} && ST_Transform(ST_TileEnvelope($1, $2, $3), {srid})\
         ) AS tile WHERE tile.geom IS NOT NULL",
        layer = layer.replace('\'', "''"),
        extent = MVT_EXTENT,
        buffer = MVT_BUFFER,
        geometry = geometry,
        fields = fields,
        table = table,
        srid = srid,
    )
}
