//! SQLite persistence for tile rows and their payload details.
//!
//! Tile rows are partitioned across one logical table per zoom-10
//! ancestor, named `quadmap_<raw>`; keys shallower than the partition
//! zoom share a single `quadmap_high` table. Partitioning keeps each
//! table's quadkey index small while keeping ancestry lookups local: a
//! query at or below the partition zoom touches exactly one partition.
//!
//! A single embedded connection serves the whole process, serialised
//! behind one mutex. SQLite is a single-writer engine; the mutex makes
//! that constraint explicit rather than discovering it as busy errors.
//! All database errors surface unchanged; there are no retries.

use bytes::Bytes;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::Result;
use crate::quadkey::QuadKey;
use crate::tile::{TileDetails, TileType};

/// Zoom level of the ancestor that names a tile row's partition table.
pub const TABLE_PARTITION_ZOOM: u8 = 10;

/// Payload details for one stored feature, mirroring the `details`
/// table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailsRecord {
    pub id: i64,
    /// Full-precision border as WKT.
    pub border: String,
    /// Simplified border as WKT.
    pub simple_border: String,
    /// Simplified border as WKB.
    pub simple_border_wkb: Bytes,
    pub tile_type: u16,
    /// Seconds since the Unix epoch.
    pub datetime: i64,
    pub scale: u16,
    pub identifier: String,
    pub enabled: bool,
}

/// A row returned by [`TileStore::search_between`]: the queried subset
/// of details columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: i64,
    pub scale: u16,
    pub identifier: String,
    /// Present when the search asked for border geometry.
    pub simple_border_wkb: Option<Bytes>,
}

/// The partition table holding rows for `key`.
pub fn partition_table_name(key: QuadKey) -> String {
    if key.zoom() < TABLE_PARTITION_ZOOM {
        return "quadmap_high".to_string();
    }
    let mut ancestor = key;
    while ancestor.zoom() > TABLE_PARTITION_ZOOM {
        let Ok(parent) = ancestor.parent() else { break };
        ancestor = parent;
    }
    format!("quadmap_{}", ancestor.raw())
}

struct StoreInner {
    conn: Connection,
    /// Partition tables known to exist, to skip repeat DDL.
    partitions: FxHashSet<String>,
}

/// SQLite-backed store for `(quadkey, details_mask, details_id)` rows
/// and their payload details.
pub struct TileStore {
    inner: Mutex<StoreInner>,
}

impl TileStore {
    /// Open (or create) a store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<TileStore> {
        let conn = Connection::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opened tile store");
        Self::from_connection(conn)
    }

    /// Open an in-memory store; contents vanish on drop.
    pub fn open_in_memory() -> Result<TileStore> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<TileStore> {
        conn.execute_batch(
            "PRAGMA cache_size = -1000000;
             PRAGMA temp_store = MEMORY;
             CREATE TABLE IF NOT EXISTS details (
                 id INTEGER PRIMARY KEY,
                 border TEXT,
                 simple_border TEXT,
                 simple_border_wkb BLOB,
                 tiletype INTEGER,
                 datetime INTEGER,
                 scale INTEGER,
                 identifier TEXT,
                 enabled BOOLEAN
             );
             CREATE INDEX IF NOT EXISTS details_index ON details(id);
             CREATE TABLE IF NOT EXISTS processed (
                 id INTEGER PRIMARY KEY,
                 identifier TEXT
             );",
        )?;
        Ok(TileStore {
            inner: Mutex::new(StoreInner {
                conn,
                partitions: FxHashSet::default(),
            }),
        })
    }

    /// Begin an explicit transaction for bulk ingest.
    pub fn begin(&self) -> Result<()> {
        self.inner.lock().conn.execute_batch("BEGIN")?;
        Ok(())
    }

    /// Commit the transaction opened by [`begin`].
    ///
    /// [`begin`]: TileStore::begin
    pub fn commit(&self) -> Result<()> {
        self.inner.lock().conn.execute_batch("COMMIT")?;
        Ok(())
    }

    /// Insert one tile row, creating its partition table on first use.
    pub fn insert_tile(&self, key: QuadKey, details: TileDetails, details_id: i64) -> Result<()> {
        let table = partition_table_name(key);
        let mut inner = self.inner.lock();
        Self::create_partition_if_missing(&mut inner, &table)?;
        inner.conn.execute(
            &format!(
                "INSERT INTO {} (quadkey, details_mask, details_id) VALUES (?1, ?2, ?3)",
                table
            ),
            params![key.raw() as i64, details.raw() as i64, details_id],
        )?;
        Ok(())
    }

    fn create_partition_if_missing(inner: &mut StoreInner, table: &str) -> Result<()> {
        if inner.partitions.contains(table) {
            return Ok(());
        }
        inner.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                 id INTEGER PRIMARY KEY,
                 quadkey INTEGER,
                 details_mask INTEGER,
                 details_id INTEGER
             );
             CREATE INDEX IF NOT EXISTS {table}_index ON {table}(quadkey);"
        ))?;
        debug!(table, "created partition table");
        inner.partitions.insert(table.to_string());
        Ok(())
    }

    /// Insert a details row and return its id.
    pub fn insert_details(&self, details: &DetailsRecord) -> Result<i64> {
        let inner = self.inner.lock();
        inner.conn.execute(
            "INSERT INTO details (border, simple_border, simple_border_wkb, tiletype,
                                  datetime, scale, identifier, enabled)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                details.border,
                details.simple_border,
                details.simple_border_wkb.as_ref(),
                details.tile_type,
                details.datetime,
                details.scale,
                details.identifier,
                details.enabled,
            ],
        )?;
        Ok(inner.conn.last_insert_rowid())
    }

    /// Replace the simplified-border WKB of an existing details row.
    pub fn update_details_wkb(&self, id: i64, wkb: &[u8]) -> Result<()> {
        self.inner.lock().conn.execute(
            "UPDATE details SET simple_border_wkb = ?1 WHERE id = ?2",
            params![wkb, id],
        )?;
        Ok(())
    }

    /// Fetch an enabled details row by id.
    pub fn get_details(&self, id: i64) -> Result<Option<DetailsRecord>> {
        let inner = self.inner.lock();
        let record = inner
            .conn
            .query_row(
                "SELECT id, border, simple_border, simple_border_wkb, tiletype,
                        datetime, scale, identifier, enabled
                 FROM details WHERE enabled = 1 AND id = ?1",
                [id],
                |row| {
                    Ok(DetailsRecord {
                        id: row.get(0)?,
                        border: row.get(1)?,
                        simple_border: row.get(2)?,
                        simple_border_wkb: Bytes::from(row.get::<_, Vec<u8>>(3)?),
                        tile_type: row.get(4)?,
                        datetime: row.get(5)?,
                        scale: row.get(6)?,
                        identifier: row.get(7)?,
                        enabled: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Scan one partition for payload rows with quadkey in `[qk1, qk2)`.
    ///
    /// Both keys must map to the same partition; the partition is chosen
    /// from `qk1`. When `tile_types` is non-empty, only rows whose
    /// details mask encodes one of the requested types (full or not)
    /// match. Results are distinct by details id, capped at `limit`.
    pub fn search_between(
        &self,
        qk1: QuadKey,
        qk2: QuadKey,
        tile_types: &[TileType],
        include_border_geometry: bool,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        self.query_hits(
            &partition_table_name(qk1),
            "qm.quadkey >= ? AND qm.quadkey < ?",
            vec![qk1.raw() as i64, qk2.raw() as i64],
            tile_types,
            include_border_geometry,
            limit,
        )
    }

    /// Scan for payload rows anywhere under `key` (itself included).
    pub fn search_details_within(
        &self,
        key: QuadKey,
        tile_types: &[TileType],
        include_border_geometry: bool,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let table = partition_table_name(key);
        if key.zoom() == 0 {
            // The root's descendant range spans the sign flip of
            // SQLite's signed integers; scan the whole high table.
            return self.query_hits(&table, "1 = 1", vec![], tile_types, include_border_geometry, limit);
        }
        let range = key.range();
        self.query_hits(
            &table,
            "qm.quadkey BETWEEN ? AND ?",
            vec![range.start as i64, range.end as i64],
            tile_types,
            include_border_geometry,
            limit,
        )
    }

    fn query_hits(
        &self,
        table: &str,
        quadkey_predicate: &str,
        mut params: Vec<i64>,
        tile_types: &[TileType],
        include_border_geometry: bool,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let mut tile_filter = String::new();
        if !tile_types.is_empty() {
            // One not-full and one full mask value per requested type.
            let placeholders = vec!["?"; tile_types.len() * 2].join(", ");
            tile_filter = format!(" AND qm.details_mask IN ({placeholders})");
            for tile_type in tile_types {
                params.push(tile_type.presence_mask() as i64);
                params.push(tile_type.full_mask() as i64);
            }
        }

        let columns = if include_border_geometry {
            "d.id, d.scale, d.identifier, d.simple_border_wkb"
        } else {
            "d.id, d.scale, d.identifier"
        };
        let sql = format!(
            "SELECT {columns} FROM details d WHERE d.id IN (
                 SELECT DISTINCT qm.details_id FROM {table} qm
                 WHERE {quadkey_predicate}{tile_filter}
             ) LIMIT {limit}"
        );

        let inner = self.inner.lock();
        let mut stmt = inner.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
            Ok(SearchHit {
                id: row.get(0)?,
                scale: row.get(1)?,
                identifier: row.get(2)?,
                simple_border_wkb: if include_border_geometry {
                    row.get::<_, Option<Vec<u8>>>(3)?.map(Bytes::from)
                } else {
                    None
                },
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Record an ingest identifier for idempotency.
    pub fn mark_processed(&self, identifier: &str) -> Result<()> {
        self.inner.lock().conn.execute(
            "INSERT INTO processed (identifier) VALUES (?1)",
            [identifier],
        )?;
        Ok(())
    }

    /// Whether an ingest identifier was recorded before.
    pub fn is_processed(&self, identifier: &str) -> Result<bool> {
        let inner = self.inner.lock();
        let found = inner
            .conn
            .query_row(
                "SELECT 1 FROM processed WHERE identifier = ?1 LIMIT 1",
                [identifier],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}
