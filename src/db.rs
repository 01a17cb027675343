use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::enrich::ArtistMetrics;
use crate::graph::{
    Band, BandGraph, BuildOptions, BuildOutcome, BuildReport, GraphBuilder, MergePolicy,
    SelfLoopPolicy,
};
use crate::record::{BandMention, RelationRecord};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// SQLite-backed relation store, metadata cache and graph snapshot.
pub struct Store {
    conn: Connection,
}

pub struct Stats {
    pub record_count: usize,
    pub band_count: usize,
    pub connection_count: usize,
    pub cache_entries: usize,
    pub db_size: String,
}

/// Bookkeeping stored next to a graph snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub built_at: NaiveDateTime,
    pub report: BuildReport,
    pub options: BuildOptions,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("no graph snapshot at {}; run `ffo build` first", .0.display())]
    Missing(PathBuf),
    #[error("graph snapshot is corrupt ({0}); run `ffo build` to rebuild it")]
    Corrupt(String),
    #[error("reading graph snapshot: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Store { conn };
        store.init_schema()?;
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Store { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open a store that must already exist, for commands that only read
    /// the graph.
    pub fn open_existing(path: &Path) -> std::result::Result<Self, SnapshotError> {
        if !path.exists() {
            return Err(SnapshotError::Missing(path.to_path_buf()));
        }
        Store::open(path).map_err(|e| SnapshotError::Corrupt(e.to_string()))
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS relation_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_name TEXT NOT NULL,
                source_country TEXT,
                source_followers INTEGER,
                source_popularity INTEGER,
                recommended_name TEXT NOT NULL,
                recommended_country TEXT,
                recommended_followers INTEGER,
                recommended_popularity INTEGER,
                ingested_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS metadata_cache (
                name TEXT PRIMARY KEY,
                found INTEGER NOT NULL,
                followers INTEGER,
                popularity INTEGER
            );
            CREATE TABLE IF NOT EXISTS bands (
                position INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                country TEXT,
                followers INTEGER,
                popularity INTEGER
            );
            CREATE TABLE IF NOT EXISTS connections (
                position INTEGER PRIMARY KEY,
                a INTEGER NOT NULL,
                b INTEGER NOT NULL,
                weight INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS snapshot_meta (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                built_at TEXT NOT NULL,
                records INTEGER NOT NULL,
                skipped_empty INTEGER NOT NULL,
                skipped_self_loops INTEGER NOT NULL,
                self_loops TEXT NOT NULL,
                merge_policy TEXT NOT NULL
            );
            ",
        )
    }

    // ── relation records ──

    /// Append records in order. Returns how many were written.
    pub fn append_records(&self, records: &[RelationRecord]) -> Result<usize> {
        let now = now_string();
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO relation_records (
                    source_name, source_country, source_followers, source_popularity,
                    recommended_name, recommended_country, recommended_followers, recommended_popularity,
                    ingested_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for r in records {
                stmt.execute(params![
                    r.source.name,
                    r.source.country,
                    r.source.followers.map(to_sql_int),
                    r.source.popularity,
                    r.recommended.name,
                    r.recommended.country,
                    r.recommended.followers.map(to_sql_int),
                    r.recommended.popularity,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Every record in ingestion order.
    pub fn all_records(&self) -> Result<Vec<RelationRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_name, source_country, source_followers, source_popularity,
                    recommended_name, recommended_country, recommended_followers, recommended_popularity
             FROM relation_records ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RelationRecord {
                source: BandMention {
                    name: row.get(0)?,
                    country: row.get(1)?,
                    followers: from_sql_int(row.get(2)?),
                    popularity: row.get(3)?,
                },
                recommended: BandMention {
                    name: row.get(4)?,
                    country: row.get(5)?,
                    followers: from_sql_int(row.get(6)?),
                    popularity: row.get(7)?,
                },
            })
        })?;
        rows.collect()
    }

    pub fn record_count(&self) -> Result<usize> {
        self.conn
            .query_row("SELECT COUNT(*) FROM relation_records", [], |r| r.get(0))
    }

    pub fn clear_records(&self) -> Result<usize> {
        self.conn.execute("DELETE FROM relation_records", [])
    }

    // ── metadata cache ──

    pub fn load_cache(&self) -> Result<HashMap<String, Option<ArtistMetrics>>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, found, followers, popularity FROM metadata_cache")?;
        let rows = stmt.query_map([], |row| {
            let found: bool = row.get(1)?;
            let metrics = found.then(|| -> Result<ArtistMetrics> {
                Ok(ArtistMetrics {
                    followers: from_sql_int(row.get(2)?),
                    popularity: row.get(3)?,
                })
            });
            Ok((row.get::<_, String>(0)?, metrics.transpose()?))
        })?;
        rows.collect()
    }

    /// Replace the persisted cache with `entries`.
    pub fn save_cache(&self, entries: &HashMap<String, Option<ArtistMetrics>>) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM metadata_cache", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO metadata_cache (name, found, followers, popularity)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (name, metrics) in entries {
                stmt.execute(params![
                    name,
                    metrics.is_some(),
                    metrics.and_then(|m| m.followers).map(to_sql_int),
                    metrics.and_then(|m| m.popularity),
                ])?;
            }
        }
        tx.commit()
    }

    // ── graph snapshot ──

    /// Replace the stored snapshot with `graph` in one transaction; readers
    /// see either the old snapshot or the new one.
    pub fn save_snapshot(
        &self,
        graph: &BandGraph,
        report: &BuildReport,
        options: &BuildOptions,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(
            "DELETE FROM bands; DELETE FROM connections; DELETE FROM snapshot_meta;",
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO bands (position, name, country, followers, popularity)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (i, b) in graph.bands().iter().enumerate() {
                stmt.execute(params![
                    i as i64,
                    b.name,
                    b.country,
                    b.followers.map(to_sql_int),
                    b.popularity
                ])?;
            }
            let mut stmt = tx.prepare(
                "INSERT INTO connections (position, a, b, weight) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (i, c) in graph.connections().iter().enumerate() {
                stmt.execute(params![i as i64, c.a as i64, c.b as i64, c.weight])?;
            }
        }
        tx.execute(
            "INSERT INTO snapshot_meta
                (id, built_at, records, skipped_empty, skipped_self_loops, self_loops, merge_policy)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                now_string(),
                report.records as i64,
                report.skipped_empty as i64,
                report.skipped_self_loops as i64,
                enum_name(&options.self_loops),
                enum_name(&options.merge),
            ],
        )?;
        tx.commit()
    }

    pub fn snapshot_info(&self) -> std::result::Result<Option<SnapshotInfo>, SnapshotError> {
        let row = self
            .conn
            .query_row(
                "SELECT built_at, records, skipped_empty, skipped_self_loops, self_loops, merge_policy
                 FROM snapshot_meta WHERE id = 1",
                [],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, i64>(1)?,
                        r.get::<_, i64>(2)?,
                        r.get::<_, i64>(3)?,
                        r.get::<_, String>(4)?,
                        r.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;
        let Some((built_at, records, skipped_empty, skipped_self_loops, self_loops, merge)) = row
        else {
            return Ok(None);
        };
        let corrupt = |what: &str| SnapshotError::Corrupt(what.to_string());
        let built_at = NaiveDateTime::parse_from_str(&built_at, TIMESTAMP_FORMAT)
            .map_err(|_| corrupt("bad build timestamp"))?;
        let self_loops: SelfLoopPolicy =
            parse_enum(&self_loops).ok_or_else(|| corrupt("unknown self-loop policy"))?;
        let merge: MergePolicy =
            parse_enum(&merge).ok_or_else(|| corrupt("unknown merge policy"))?;
        Ok(Some(SnapshotInfo {
            built_at,
            report: BuildReport {
                records: records as usize,
                skipped_empty: skipped_empty as usize,
                skipped_self_loops: skipped_self_loops as usize,
            },
            options: BuildOptions { self_loops, merge },
        }))
    }

    /// Load the stored graph exactly as it was saved. `Missing` means no
    /// build ever ran; a build over zero records loads as an empty graph.
    pub fn load_snapshot(
        &self,
        path: &Path,
    ) -> std::result::Result<(BandGraph, SnapshotInfo), SnapshotError> {
        let info = self
            .snapshot_info()?
            .ok_or_else(|| SnapshotError::Missing(path.to_path_buf()))?;

        let mut graph = BandGraph::new();
        let mut stmt = self.conn.prepare(
            "SELECT position, name, country, followers, popularity FROM bands ORDER BY position",
        )?;
        let bands = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                Band {
                    name: row.get(1)?,
                    country: row.get(2)?,
                    followers: from_sql_int(row.get(3)?),
                    popularity: row.get(4)?,
                },
            ))
        })?;
        for band in bands {
            let (position, band) = band?;
            if position as usize != graph.band_count() {
                return Err(SnapshotError::Corrupt("gap in band positions".into()));
            }
            graph.push_band(band);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT a, b, weight FROM connections ORDER BY position")?;
        let connections = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, u32>(2)?,
            ))
        })?;
        for connection in connections {
            let (a, b, weight) = connection?;
            let n = graph.band_count() as i64;
            if !(0..n).contains(&a) || !(0..n).contains(&b) || weight == 0 {
                return Err(SnapshotError::Corrupt("dangling connection".into()));
            }
            graph.push_connection(a as usize, b as usize, weight);
        }
        Ok((graph, info))
    }

    /// Rebuild the graph from every stored record and replace the snapshot.
    pub fn rebuild(&self, options: &BuildOptions) -> Result<BuildOutcome> {
        let records = self.all_records()?;
        let outcome = GraphBuilder::new(*options).build(&records);
        self.save_snapshot(&outcome.graph, &outcome.report, options)?;
        Ok(outcome)
    }

    pub fn stats(&self) -> Result<Stats> {
        let count = |table: &str| -> Result<usize> {
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        };
        let page_size: i64 = self.conn.query_row("PRAGMA page_size", [], |r| r.get(0))?;
        let page_count: i64 = self.conn.query_row("PRAGMA page_count", [], |r| r.get(0))?;
        let bytes = page_size * page_count;
        let db_size = if bytes > 1_048_576 {
            format!("{:.1} MB", bytes as f64 / 1_048_576.0)
        } else {
            format!("{:.1} KB", bytes as f64 / 1024.0)
        };
        Ok(Stats {
            record_count: count("relation_records")?,
            band_count: count("bands")?,
            connection_count: count("connections")?,
            cache_entries: count("metadata_cache")?,
            db_size,
        })
    }
}

fn now_string() -> String {
    Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string()
}

// SQLite integers are signed; follower counts never get near i64::MAX.
fn to_sql_int(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn from_sql_int(n: Option<i64>) -> Option<u64> {
    n.and_then(|n| u64::try_from(n).ok())
}

fn enum_name<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn parse_enum<T: serde::de::DeserializeOwned>(name: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(name.to_string())).ok()
}
