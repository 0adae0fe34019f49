//! SQLite store for versioned resource state documents, keyed by
//! `(resource type, instance name)`.

#![forbid(unsafe_code)]

use anyhow::{anyhow, Context, Result};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::debug;

use scalr_core::{Attrs, StateDoc};

/// One persisted row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredState {
    pub type_name: String,
    pub name: String,
    pub ts: i64,
    pub doc: StateDoc,
}

pub trait StateStore: Send + Sync {
    /// Insert or replace the document for `(type_name, name)`.
    fn put(&self, type_name: &str, name: &str, doc: &StateDoc) -> Result<()>;
    fn get(&self, type_name: &str, name: &str) -> Result<Option<StoredState>>;
    /// Returns whether a row was removed.
    fn remove(&self, type_name: &str, name: &str) -> Result<bool>;
    /// All rows, optionally restricted to one type, ordered by type then name.
    fn list(&self, type_name: Option<&str>) -> Result<Vec<StoredState>>;
}

/// SQLite-backed store. Synchronous; one connection behind a mutex.
pub struct SqliteStateStore {
    db: std::sync::Mutex<rusqlite::Connection>,
}

impl SqliteStateStore {
    pub fn open_default() -> Result<Self> {
        let path = std::env::var("SCALR_STATE_PATH").unwrap_or_else(|_| default_db_path());
        Self::open(&path)
    }

    pub fn open(path: &str) -> Result<Self> {
        let started = std::time::Instant::now();
        let db = rusqlite::Connection::open(path).with_context(|| format!("opening sqlite db at {}", path))?;
        Self::init(db, started)
    }

    /// Private database, gone when the store is dropped.
    pub fn open_in_memory() -> Result<Self> {
        let started = std::time::Instant::now();
        let db = rusqlite::Connection::open_in_memory().context("opening in-memory sqlite db")?;
        Self::init(db, started)
    }

    fn init(db: rusqlite::Connection, started: std::time::Instant) -> Result<Self> {
        db.pragma_update(None, "journal_mode", "WAL").ok();
        db.pragma_update(None, "synchronous", "NORMAL").ok();
        db.execute(
            "CREATE TABLE IF NOT EXISTS resource_state (
                type    TEXT NOT NULL,
                name    TEXT NOT NULL,
                version INTEGER NOT NULL,
                attrs   BLOB NOT NULL,
                ts      INTEGER NOT NULL,
                PRIMARY KEY (type, name)
            )",
            [],
        )
        .context("creating resource_state table")?;
        histogram!("persist_open_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(Self { db: std::sync::Mutex::new(db) })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>> {
        self.db.lock().map_err(|_| anyhow!("state store lock poisoned"))
    }
}

fn row_to_state(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, i64, Vec<u8>, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode(raw: (String, String, i64, Vec<u8>, i64)) -> Result<StoredState> {
    let (type_name, name, version, blob, ts) = raw;
    let attrs: Attrs = serde_json::from_slice(&maybe_decompress(&blob))
        .with_context(|| format!("decoding stored attributes of {}.{}", type_name, name))?;
    let version = u32::try_from(version).with_context(|| format!("bad stored version {} for {}.{}", version, type_name, name))?;
    Ok(StoredState { type_name, name, ts, doc: StateDoc::new(version, attrs) })
}

impl StateStore for SqliteStateStore {
    fn put(&self, type_name: &str, name: &str, doc: &StateDoc) -> Result<()> {
        let started = std::time::Instant::now();
        let json = serde_json::to_vec(&doc.attrs).context("encoding attributes")?;
        let blob = maybe_compress(&json);
        let db = self.conn()?;
        db.execute(
            "INSERT INTO resource_state(type, name, version, attrs, ts) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(type, name) DO UPDATE SET version = excluded.version, attrs = excluded.attrs, ts = excluded.ts",
            (type_name, name, doc.version as i64, &blob, now_ts()),
        )
        .with_context(|| format!("writing state for {}.{}", type_name, name))?;
        debug!(type_name, name, version = doc.version, bytes = blob.len(), "state stored");
        histogram!("persist_put_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("persist_put_total", 1u64);
        Ok(())
    }

    fn get(&self, type_name: &str, name: &str) -> Result<Option<StoredState>> {
        let started = std::time::Instant::now();
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT type, name, version, attrs, ts FROM resource_state WHERE type = ?1 AND name = ?2")?;
        let mut rows = stmt.query((type_name, name))?;
        let out = match rows.next()? {
            Some(row) => Some(decode(row_to_state(row)?)?),
            None => None,
        };
        histogram!("persist_get_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(out)
    }

    fn remove(&self, type_name: &str, name: &str) -> Result<bool> {
        let db = self.conn()?;
        let n = db
            .execute("DELETE FROM resource_state WHERE type = ?1 AND name = ?2", (type_name, name))
            .with_context(|| format!("removing state for {}.{}", type_name, name))?;
        if n > 0 {
            counter!("persist_remove_total", 1u64);
        }
        Ok(n > 0)
    }

    fn list(&self, type_name: Option<&str>) -> Result<Vec<StoredState>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT type, name, version, attrs, ts FROM resource_state
             WHERE ?1 IS NULL OR type = ?1 ORDER BY type, name",
        )?;
        let rows = stmt.query_map([type_name], row_to_state)?;
        let mut out = Vec::new();
        for raw in rows {
            out.push(decode(raw?)?);
        }
        Ok(out)
    }
}

fn default_db_path() -> String {
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = std::path::PathBuf::from(home);
        p.push(".scalr");
        let _ = std::fs::create_dir_all(&p);
        p.push("state.db");
        return p.to_string_lossy().to_string();
    }
    "scalr-state.db".to_string()
}

pub fn now_ts() -> i64 {
    let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    now.as_secs() as i64
}

pub fn maybe_compress(raw: &[u8]) -> Vec<u8> {
    #[cfg(feature = "zstd")]
    {
        let lvl: i32 = std::env::var("SCALR_ZSTD_LEVEL").ok().and_then(|s| s.parse().ok()).unwrap_or(3);
        return zstd::encode_all(raw, lvl).unwrap_or_else(|_| raw.to_vec());
    }
    raw.to_vec()
}

/// Accepts both compressed and plain blobs, so toggling the feature keeps
/// existing databases readable.
pub fn maybe_decompress(blob: &[u8]) -> Vec<u8> {
    #[cfg(feature = "zstd")]
    {
        if let Ok(de) = zstd::decode_all(std::io::Cursor::new(blob)) {
            return de;
        }
    }
    blob.to_vec()
}
