//! Tile store integration tests.
//!
//! Tests verify:
//! - Blank tile deduplication in the `images` table
//! - Idempotent re-adds of a coordinate
//! - The `tiles` view seen by plain MBTiles readers
//! - Read-only handling of flat MBTiles files

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use tempfile::TempDir;

use tile_map_service::error::StoreError;
use tile_map_service::store::{MetadataItem, StoreLayout, TileStore};

use super::test_utils::{gradient_png, solid_png, BLUE, RED};

async fn count(path: &std::path::Path, sql: &str) -> i64 {
    let mut conn = SqliteConnectOptions::new()
        .filename(path)
        .connect()
        .await
        .unwrap();
    let (n,): (i64,) = sqlx::query_as(sql).fetch_one(&mut conn).await.unwrap();
    conn.close().await.unwrap();
    n
}

#[tokio::test]
async fn test_blank_tiles_share_one_image() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.mbtiles");
    let store = TileStore::create(&path).await.unwrap();

    store.add_tile(0, 0, 1, &solid_png(RED)).await.unwrap();
    store.add_tile(1, 0, 1, &solid_png(RED)).await.unwrap();
    store.add_tile(0, 1, 1, &solid_png(BLUE)).await.unwrap();
    store.add_tile(1, 1, 1, &gradient_png(7)).await.unwrap();

    assert_eq!(count(&path, "SELECT COUNT(*) FROM map").await, 4);
    assert_eq!(count(&path, "SELECT COUNT(*) FROM images").await, 3);
    assert_eq!(
        count(&path, "SELECT COUNT(*) FROM images WHERE tile_id = '#FF0000FF'").await,
        1
    );
    assert_eq!(count(&path, "SELECT COUNT(*) FROM tiles").await, 4);

    let red = store.read_tile(1, 0, 1).await.unwrap().unwrap();
    assert_eq!(red.as_ref(), solid_png(RED).as_slice());
}

#[tokio::test]
async fn test_re_adding_a_coordinate_keeps_one_row() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.mbtiles");
    let store = TileStore::create(&path).await.unwrap();

    store.add_tile(3, 4, 5, &gradient_png(1)).await.unwrap();
    store.add_tile(3, 4, 5, &gradient_png(1)).await.unwrap();

    assert_eq!(count(&path, "SELECT COUNT(*) FROM map").await, 1);
    assert_eq!(count(&path, "SELECT COUNT(*) FROM images").await, 1);
    assert_eq!(store.read_zoom_level_range().await.unwrap(), Some((5, 5)));
    assert!(store.read_tile(3, 5, 5).await.unwrap().is_none());
}

#[tokio::test]
async fn test_metadata_round_trip_and_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("meta.mbtiles");
    let store = TileStore::open_or_create(&path).await.unwrap();

    store
        .add_metadata_item(&MetadataItem::new("name", "First"))
        .await
        .unwrap();
    store
        .add_metadata_item(&MetadataItem::new("name", "Second"))
        .await
        .unwrap();
    store
        .add_metadata_item(&MetadataItem::new("format", "png"))
        .await
        .unwrap();

    let reopened = TileStore::open_or_create(&path).await.unwrap();
    assert_eq!(reopened.layout(), StoreLayout::Deduplicated);
    let mut metadata = reopened.read_metadata().await.unwrap();
    metadata.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(
        metadata,
        vec![
            MetadataItem::new("format", "png"),
            MetadataItem::new("name", "Second"),
        ]
    );
}

#[tokio::test]
async fn test_flat_file_is_read_only() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flat.mbtiles");
    {
        let mut conn = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .connect()
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE tiles (zoom_level INTEGER, tile_column INTEGER, \
             tile_row INTEGER, tile_data BLOB)",
        )
        .execute(&mut conn)
        .await
        .unwrap();
        sqlx::query("INSERT INTO tiles VALUES (0, 0, 0, ?)")
            .bind(gradient_png(2))
            .execute(&mut conn)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE metadata (name TEXT, value TEXT)")
            .execute(&mut conn)
            .await
            .unwrap();
        conn.close().await.unwrap();
    }

    let store = TileStore::open(&path).await.unwrap();
    assert_eq!(store.layout(), StoreLayout::Flat);
    assert!(store.read_tile(0, 0, 0).await.unwrap().is_some());
    assert_eq!(store.read_zoom_level_range().await.unwrap(), Some((0, 0)));
    assert!(matches!(
        store.add_tile(1, 1, 1, &gradient_png(3)).await,
        Err(StoreError::ReadOnly(_))
    ));
}

#[tokio::test]
async fn test_open_rejects_unrelated_database() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("other.db");
    {
        let mut conn = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .connect()
            .await
            .unwrap();
        sqlx::query("CREATE TABLE people (name TEXT)")
            .execute(&mut conn)
            .await
            .unwrap();
        conn.close().await.unwrap();
    }

    assert!(matches!(
        TileStore::open(&path).await,
        Err(StoreError::InvalidLayout(_))
    ));
}
