//! Content-addressable tile store in the MBTiles deduplicated layout.
//!
//! Tiles are keyed in a `map` table by `(zoom_level, tile_column, tile_row)`
//! and point at a row of `images` by `tile_id`. Blank tiles of the same
//! color share one image. A `tiles` view exposes the standard MBTiles shape,
//! so any MBTiles reader can consume the file.
//!
//! Rows use the TMS convention (row 0 at the bottom); callers flip.
//!
//! Every operation opens its own connection. SQLite serializes writers and
//! the busy timeout absorbs short contention between concurrent requests.

mod blank;

pub use blank::{check_if_blank, tile_id};

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use tracing::debug;

use crate::error::StoreError;

const SCHEMA: &[&str] = &[
    "CREATE TABLE metadata (name TEXT, value TEXT)",
    "CREATE UNIQUE INDEX name ON metadata (name)",
    "CREATE TABLE map (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER, tile_id TEXT)",
    "CREATE UNIQUE INDEX map_index ON map (zoom_level, tile_column, tile_row)",
    "CREATE TABLE images (tile_data BLOB, tile_id TEXT)",
    "CREATE UNIQUE INDEX images_id ON images (tile_id)",
    "CREATE VIEW tiles AS SELECT map.zoom_level AS zoom_level, map.tile_column AS tile_column, \
     map.tile_row AS tile_row, images.tile_data AS tile_data \
     FROM map JOIN images ON images.tile_id = map.tile_id",
];

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Physical table layout of a tile database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreLayout {
    /// `map` + `images` tables (writable)
    Deduplicated,
    /// A single `tiles` table, as written by most MBTiles tools (read-only)
    Flat,
}

/// One `metadata` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataItem {
    pub name: String,
    pub value: String,
}

impl MetadataItem {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Handle to a tile database file.
#[derive(Debug, Clone)]
pub struct TileStore {
    path: PathBuf,
    layout: StoreLayout,
}

impl TileStore {
    /// Create a new file with the deduplicated schema.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut conn = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT)
            .connect()
            .await?;

        let mut tx = conn.begin().await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        conn.close().await?;

        debug!(path = %path.display(), "Created tile store");
        Ok(Self {
            path,
            layout: StoreLayout::Deduplicated,
        })
    }

    /// Open an existing file, detecting its layout.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut conn = connect(&path).await?;

        let names: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type IN ('table', 'view')")
                .fetch_all(&mut conn)
                .await?;
        conn.close().await?;

        let has = |table: &str| names.iter().any(|(name,)| name == table);
        let layout = if has("map") && has("images") {
            StoreLayout::Deduplicated
        } else if has("tiles") {
            StoreLayout::Flat
        } else {
            return Err(StoreError::InvalidLayout(format!(
                "{} has neither map/images nor tiles tables",
                path.display()
            )));
        };

        Ok(Self { path, layout })
    }

    /// Open the file if it exists, otherwise create it.
    pub async fn open_or_create(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            Self::open(path).await
        } else {
            Self::create(path).await
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> StoreLayout {
        self.layout
    }

    /// Store a tile, deduplicating blank tiles by color.
    ///
    /// An existing tile at the same coordinate is kept.
    pub async fn add_tile(
        &self,
        col: u32,
        row: u32,
        zoom: u8,
        data: &[u8],
    ) -> Result<(), StoreError> {
        self.ensure_writable()?;
        let owned = data.to_vec();
        let id = tokio::task::spawn_blocking(move || tile_id(col, row, zoom, &owned))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?;

        let mut conn = connect(&self.path).await?;
        let mut tx = conn.begin().await?;

        // images_id is unique, so a known id keeps its first image
        sqlx::query("INSERT OR IGNORE INTO images (tile_data, tile_id) VALUES (?, ?)")
            .bind(data)
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT OR IGNORE INTO map (zoom_level, tile_column, tile_row, tile_id) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(zoom as i64)
        .bind(col as i64)
        .bind(row as i64)
        .bind(id.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        conn.close().await?;
        Ok(())
    }

    /// Read the tile at a TMS coordinate.
    pub async fn read_tile(
        &self,
        col: u32,
        row: u32,
        zoom: u8,
    ) -> Result<Option<Bytes>, StoreError> {
        let sql = match self.layout {
            StoreLayout::Deduplicated => {
                "SELECT images.tile_data FROM map JOIN images ON images.tile_id = map.tile_id \
                 WHERE map.zoom_level = ? AND map.tile_column = ? AND map.tile_row = ?"
            }
            StoreLayout::Flat => {
                "SELECT tile_data FROM tiles \
                 WHERE zoom_level = ? AND tile_column = ? AND tile_row = ?"
            }
        };

        let mut conn = connect(&self.path).await?;
        let found: Option<(Vec<u8>,)> = sqlx::query_as(sql)
            .bind(zoom as i64)
            .bind(col as i64)
            .bind(row as i64)
            .fetch_optional(&mut conn)
            .await?;
        conn.close().await?;

        Ok(found.map(|(data,)| Bytes::from(data)))
    }

    /// Any one tile, used to sniff the format of a file without metadata.
    pub async fn read_first_tile(&self) -> Result<Option<Bytes>, StoreError> {
        let mut conn = connect(&self.path).await?;
        let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT tile_data FROM tiles LIMIT 1")
            .fetch_optional(&mut conn)
            .await?;
        conn.close().await?;

        Ok(row.map(|(data,)| Bytes::from(data)))
    }

    /// Lowest and highest zoom holding at least one tile.
    pub async fn read_zoom_level_range(&self) -> Result<Option<(u8, u8)>, StoreError> {
        let sql = match self.layout {
            StoreLayout::Deduplicated => "SELECT MIN(zoom_level), MAX(zoom_level) FROM map",
            StoreLayout::Flat => "SELECT MIN(zoom_level), MAX(zoom_level) FROM tiles",
        };

        let mut conn = connect(&self.path).await?;
        let (min, max): (Option<i64>, Option<i64>) =
            sqlx::query_as(sql).fetch_one(&mut conn).await?;
        conn.close().await?;

        Ok(match (min, max) {
            (Some(min), Some(max)) => Some((clamp_zoom(min), clamp_zoom(max))),
            _ => None,
        })
    }

    pub async fn read_metadata(&self) -> Result<Vec<MetadataItem>, StoreError> {
        let mut conn = connect(&self.path).await?;
        let rows: Vec<(Option<String>, Option<String>)> =
            sqlx::query_as("SELECT name, value FROM metadata")
                .fetch_all(&mut conn)
                .await?;
        conn.close().await?;

        Ok(rows
            .into_iter()
            .filter_map(|(name, value)| Some(MetadataItem::new(name?, value?)))
            .collect())
    }

    /// Insert a metadata value, replacing any previous value of that name.
    pub async fn add_metadata_item(&self, item: &MetadataItem) -> Result<(), StoreError> {
        self.ensure_writable()?;
        let mut conn = connect(&self.path).await?;
        sqlx::query("INSERT OR REPLACE INTO metadata (name, value) VALUES (?, ?)")
            .bind(item.name.as_str())
            .bind(item.value.as_str())
            .execute(&mut conn)
            .await?;
        conn.close().await?;
        Ok(())
    }

    fn ensure_writable(&self) -> Result<(), StoreError> {
        match self.layout {
            StoreLayout::Deduplicated => Ok(()),
            StoreLayout::Flat => Err(StoreError::ReadOnly(self.path.display().to_string())),
        }
    }
}

async fn connect(path: &Path) -> Result<SqliteConnection, StoreError> {
    let conn = SqliteConnectOptions::new()
        .filename(path)
        .busy_timeout(BUSY_TIMEOUT)
        .connect()
        .await?;
    Ok(conn)
}

fn clamp_zoom(zoom: i64) -> u8 {
    zoom.clamp(0, u8::MAX as i64) as u8
}
