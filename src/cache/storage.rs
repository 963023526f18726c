//! SQLite-based namespaced cache storage with file blob support
//!
//! Entries live in versioned namespaces. Small bodies are stored inline in
//! SQLite, large bodies (>10KB) as files under the namespace's blob directory.
//! Entry timestamps are stored in nanoseconds so ages compare exactly.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::cache::key::blob_name;
use crate::error::CacheError;
use crate::http::Response;

/// Schema version - increment to trigger nuke-and-rebuild
const SCHEMA_VERSION: i32 = 2;

/// Bodies larger than this are stored as external blobs
const INLINE_THRESHOLD: usize = 10 * 1024; // 10KB

type Result<T> = std::result::Result<T, CacheError>;

/// Versioned logical bucket of entries, e.g. `static` at `v3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub name: String,
    pub version: String,
}

impl Namespace {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

/// A stored response together with when it was stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub url: String,
    pub response: Response,
    pub stored_at: DateTime<Utc>,
}

/// One response queued for an atomic multi-entry write
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub key: String,
    pub url: String,
    pub response: Response,
}

/// SQLite-backed cache storage with file blob support.
///
/// The connection sits behind a mutex so a single store can be shared by
/// every in-flight request and background refresh.
pub struct CacheStore {
    conn: Mutex<Connection>,
    blobs_dir: PathBuf,
}

impl CacheStore {
    /// Open or create cache storage at the default XDG cache location
    pub fn open() -> Result<Self> {
        let cache_dir = Self::cache_dir()?;
        Self::open_at(&cache_dir)
    }

    /// Get the cache directory path (~/.cache/edgecache on Linux)
    pub fn cache_dir() -> Result<PathBuf> {
        let cache_base = dirs::cache_dir().ok_or(CacheError::NoHome)?;
        Ok(cache_base.join("edgecache"))
    }

    /// Open cache storage at a specific directory
    pub fn open_at(cache_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(cache_dir)
            .map_err(|e| CacheError::Io(format!("Failed to create cache dir: {}", e)))?;

        let db_path = cache_dir.join("cache.db");
        let blobs_dir = cache_dir.join("blobs");
        std::fs::create_dir_all(&blobs_dir)
            .map_err(|e| CacheError::Io(format!("Failed to create blobs dir: {}", e)))?;

        let conn = Connection::open(&db_path)?;

        // Check schema version - nuke if mismatched
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |r| r.get(0))
            .unwrap_or(0);

        if version != 0 && version != SCHEMA_VERSION {
            log::info!(
                "Cache schema version mismatch ({} != {}), rebuilding",
                version,
                SCHEMA_VERSION
            );
            drop(conn);
            Self::nuke(&db_path, &blobs_dir)?;
            return Self::open_at(cache_dir);
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS namespaces (
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (name, version)
            );

            CREATE TABLE IF NOT EXISTS entries (
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                request_key TEXT NOT NULL,
                url TEXT NOT NULL,
                status INTEGER NOT NULL,
                headers TEXT NOT NULL,
                body BLOB,
                blob_path TEXT,
                stored_at INTEGER NOT NULL,
                size_bytes INTEGER NOT NULL,
                PRIMARY KEY (name, version, request_key)
            );

            CREATE INDEX IF NOT EXISTS idx_entries_namespace ON entries(name, version);

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            );
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self {
            conn: Mutex::new(conn),
            blobs_dir,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CacheError::Io("Cache connection lock poisoned".to_string()))
    }

    /// Create the namespace if it does not exist yet
    pub fn open_namespace(&self, ns: &Namespace) -> Result<()> {
        let conn = self.conn()?;
        Self::ensure_namespace(&conn, ns)
    }

    fn ensure_namespace(conn: &Connection, ns: &Namespace) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO namespaces (name, version, created_at) VALUES (?1, ?2, ?3)",
            params![ns.name, ns.version, Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    /// All namespaces with their entry counts, oldest first
    pub fn list_namespaces(&self) -> Result<Vec<NamespaceInfo>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT n.name, n.version, n.created_at,
                    COUNT(e.request_key), COALESCE(SUM(e.size_bytes), 0)
             FROM namespaces n
             LEFT JOIN entries e ON e.name = n.name AND e.version = n.version
             GROUP BY n.name, n.version
             ORDER BY n.created_at, n.name",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(NamespaceInfo {
                namespace: Namespace::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                created_at: millis_to_datetime(row.get(2)?),
                entries: row.get::<_, i64>(3)? as usize,
                size_bytes: row.get::<_, i64>(4)? as usize,
            })
        })?;

        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Delete a namespace and everything in it. Returns the number of entries removed.
    pub fn delete_namespace(&self, ns: &Namespace) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM entries WHERE name = ?1 AND version = ?2",
            params![ns.name, ns.version],
        )?;
        tx.execute(
            "DELETE FROM namespaces WHERE name = ?1 AND version = ?2",
            params![ns.name, ns.version],
        )?;
        tx.commit()?;

        let dir = self.namespace_dir(ns);
        if dir.exists()
            && let Err(e) = std::fs::remove_dir_all(&dir)
        {
            log::warn!("Failed to remove blobs for {}: {}", ns, e);
        }

        Ok(removed)
    }

    /// Look up an entry regardless of its age
    pub fn get(&self, ns: &Namespace, key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.conn()?;

        let row: Option<(String, u16, String, Option<Vec<u8>>, Option<String>, i64)> = conn
            .query_row(
                "SELECT url, status, headers, body, blob_path, stored_at FROM entries
                 WHERE name = ?1 AND version = ?2 AND request_key = ?3",
                params![ns.name, ns.version, key],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((url, status, headers, body, blob_path, stored_at)) = row else {
            return Ok(None);
        };

        let headers: Vec<(String, String)> = serde_json::from_str(&headers)
            .map_err(|e| CacheError::Corrupt(format!("headers for {}: {}", url, e)))?;

        let body = match (body, blob_path) {
            (Some(body), None) => body,
            (None, Some(blob_path)) => {
                let full_path = self.blobs_dir.join(&blob_path);
                match std::fs::read(&full_path) {
                    Ok(data) => data,
                    Err(e) => {
                        log::warn!("Failed to read blob {}: {}", blob_path, e);
                        // Delete stale entry
                        let _ = conn.execute(
                            "DELETE FROM entries WHERE name = ?1 AND version = ?2 AND request_key = ?3",
                            params![ns.name, ns.version, key],
                        );
                        return Ok(None);
                    }
                }
            }
            _ => return Err(CacheError::Corrupt(format!("no body stored for {}", url))),
        };

        Ok(Some(CacheEntry {
            url,
            response: Response {
                status,
                headers,
                body,
            },
            stored_at: nanos_to_datetime(stored_at),
        }))
    }

    /// Store (or overwrite) one entry. Last write wins.
    pub fn put(
        &self,
        ns: &Namespace,
        key: &str,
        url: &str,
        response: &Response,
        stored_at: DateTime<Utc>,
    ) -> Result<()> {
        self.write_rows(ns, [(key, url, response)], stored_at)
    }

    /// Store a batch of entries all-or-nothing.
    ///
    /// The namespace is created inside the same transaction, so a failed batch
    /// leaves no trace of it.
    pub fn put_all(
        &self,
        ns: &Namespace,
        entries: &[PendingEntry],
        stored_at: DateTime<Utc>,
    ) -> Result<()> {
        let rows = entries
            .iter()
            .map(|e| (e.key.as_str(), e.url.as_str(), &e.response));
        self.write_rows(ns, rows, stored_at)
    }

    /// Write rows in one transaction.
    ///
    /// Blob bodies are staged next to their final path and only moved into
    /// place once the transaction has committed, so a failed write never
    /// touches the blob of the entry it would have replaced.
    fn write_rows<'a, I>(&self, ns: &Namespace, rows: I, stored_at: DateTime<Utc>) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str, &'a Response)>,
    {
        let stored_at = stored_at
            .timestamp_nanos_opt()
            .ok_or_else(|| CacheError::Corrupt(format!("timestamp {} out of range", stored_at)))?;

        let mut conn = self.conn()?;
        let mut files = BlobChanges::default();

        let result = (|| -> Result<()> {
            let tx = conn.transaction()?;
            Self::ensure_namespace(&tx, ns)?;
            for (key, url, response) in rows {
                self.put_in(&tx, ns, key, url, response, stored_at, &mut files)?;
            }
            tx.commit()?;
            Ok(())
        })();

        match result {
            Ok(()) => files.apply(),
            Err(e) => {
                files.discard();
                Err(e)
            }
        }
    }

    /// Write one row inside an open transaction, recording its file changes
    #[allow(clippy::too_many_arguments)]
    fn put_in(
        &self,
        tx: &Transaction<'_>,
        ns: &Namespace,
        key: &str,
        url: &str,
        response: &Response,
        stored_at: i64,
        files: &mut BlobChanges,
    ) -> Result<()> {
        let headers = serde_json::to_string(&response.headers)
            .map_err(|e| CacheError::Corrupt(format!("headers for {}: {}", url, e)))?;
        let size = response.body.len();

        let previous_blob: Option<String> = tx
            .query_row(
                "SELECT blob_path FROM entries WHERE name = ?1 AND version = ?2 AND request_key = ?3",
                params![ns.name, ns.version, key],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        if size <= INLINE_THRESHOLD {
            // Store inline in SQLite
            tx.execute(
                "INSERT OR REPLACE INTO entries
                 (name, version, request_key, url, status, headers, body, blob_path, stored_at, size_bytes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, ?9)",
                params![
                    ns.name,
                    ns.version,
                    key,
                    url,
                    response.status,
                    headers,
                    response.body,
                    stored_at,
                    size as i64
                ],
            )?;

            if let Some(old) = previous_blob {
                files.obsolete.push(self.blobs_dir.join(old));
            }
        } else {
            // Store as external blob
            let (rel_path, staged) = self.write_blob(ns, key, &response.body)?;
            files.staged.push(staged);
            tx.execute(
                "INSERT OR REPLACE INTO entries
                 (name, version, request_key, url, status, headers, body, blob_path, stored_at, size_bytes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8, ?9)",
                params![
                    ns.name,
                    ns.version,
                    key,
                    url,
                    response.status,
                    headers,
                    rel_path,
                    stored_at,
                    size as i64
                ],
            )?;
        }
        Ok(())
    }

    /// Delete a specific entry by key
    pub fn delete(&self, ns: &Namespace, key: &str) -> Result<bool> {
        let conn = self.conn()?;

        let blob: Option<String> = conn
            .query_row(
                "SELECT blob_path FROM entries WHERE name = ?1 AND version = ?2 AND request_key = ?3",
                params![ns.name, ns.version, key],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        let deleted = conn.execute(
            "DELETE FROM entries WHERE name = ?1 AND version = ?2 AND request_key = ?3",
            params![ns.name, ns.version, key],
        )?;

        if let Some(blob) = blob {
            let _ = std::fs::remove_file(self.blobs_dir.join(blob));
        }

        Ok(deleted > 0)
    }

    /// Number of entries stored under a key across every namespace
    pub fn count_key(&self, key: &str) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE request_key = ?1",
            [key],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }

    /// Summaries of stored entries, optionally limited to one namespace
    pub fn list_entries(&self, ns: Option<&Namespace>) -> Result<Vec<EntrySummary>> {
        let conn = self.conn()?;
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<EntrySummary> {
            Ok(EntrySummary {
                namespace: Namespace::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                url: row.get(2)?,
                status: row.get(3)?,
                size_bytes: row.get::<_, i64>(4)? as usize,
                stored_at: nanos_to_datetime(row.get(5)?),
            })
        };

        let entries = match ns {
            Some(ns) => {
                let mut stmt = conn.prepare(
                    "SELECT name, version, url, status, size_bytes, stored_at FROM entries
                     WHERE name = ?1 AND version = ?2 ORDER BY url",
                )?;
                let rows = stmt.query_map(params![ns.name, ns.version], map_row)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT name, version, url, status, size_bytes, stored_at FROM entries
                     ORDER BY name, version, url",
                )?;
                let rows = stmt.query_map([], map_row)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        Ok(entries)
    }

    /// Read a value from the meta table
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row("SELECT value FROM meta WHERE key = ?1", [key], |r| r.get(0))
            .optional()?)
    }

    /// Set a value in the meta table
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Remove a value from the meta table
    pub fn delete_meta(&self, key: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM meta WHERE key = ?1", [key])?;
        Ok(())
    }

    /// Clear all namespaces and entries (version bookkeeping is kept)
    pub fn clear_all(&self) -> Result<ClearStats> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |r| r.get(0))?;

        conn.execute("DELETE FROM entries", [])?;
        conn.execute("DELETE FROM namespaces", [])?;

        // Clear blobs directory
        if self.blobs_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.blobs_dir) {
                log::warn!("Failed to clear blobs directory: {}", e);
            }
            std::fs::create_dir_all(&self.blobs_dir)
                .map_err(|e| CacheError::Io(format!("Failed to recreate blobs dir: {}", e)))?;
        }

        Ok(ClearStats {
            entries_removed: count as usize,
        })
    }

    /// Get cache statistics
    pub fn stats(&self) -> Result<CacheStats> {
        let conn = self.conn()?;

        let total_entries: i64 =
            conn.query_row("SELECT COUNT(*) FROM entries", [], |r| r.get(0))?;

        let namespaces: i64 =
            conn.query_row("SELECT COUNT(*) FROM namespaces", [], |r| r.get(0))?;

        let total_size: i64 = conn.query_row(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM entries",
            [],
            |r| r.get(0),
        )?;

        let (oldest, newest): (Option<i64>, Option<i64>) = conn.query_row(
            "SELECT MIN(stored_at), MAX(stored_at) FROM entries",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;

        Ok(CacheStats {
            total_entries: total_entries as usize,
            namespaces: namespaces as usize,
            total_size_bytes: total_size as usize,
            oldest_entry: oldest.map(nanos_to_datetime),
            newest_entry: newest.map(nanos_to_datetime),
        })
    }

    fn namespace_dir(&self, ns: &Namespace) -> PathBuf {
        self.blobs_dir
            .join(path_segment(&ns.name))
            .join(path_segment(&ns.version))
    }

    /// Stage a blob file, sharded by first 2 chars of the hashed key.
    /// The returned relative path is where it lands once moved into place.
    fn write_blob(&self, ns: &Namespace, key: &str, data: &[u8]) -> Result<(String, StagedBlob)> {
        let name = blob_name(key);
        let shard = &name[..2];
        let shard_dir = self.namespace_dir(ns).join(shard);
        std::fs::create_dir_all(&shard_dir)
            .map_err(|e| CacheError::Io(format!("Failed to create shard dir: {}", e)))?;

        let filename = format!("{}.bin", name);
        let rel_path = format!(
            "{}/{}/{}/{}",
            path_segment(&ns.name),
            path_segment(&ns.version),
            shard,
            filename
        );
        let staged = StagedBlob {
            tmp: shard_dir.join(format!("{}.tmp", filename)),
            dest: shard_dir.join(&filename),
        };

        std::fs::write(&staged.tmp, data)
            .map_err(|e| CacheError::Io(format!("Failed to write blob: {}", e)))?;

        Ok((rel_path, staged))
    }

    /// Nuke the cache (delete DB and all blobs)
    fn nuke(db_path: &Path, blobs_dir: &Path) -> Result<()> {
        if db_path.exists() {
            std::fs::remove_file(db_path)
                .map_err(|e| CacheError::Io(format!("Failed to remove cache DB: {}", e)))?;
        }
        if blobs_dir.exists() {
            std::fs::remove_dir_all(blobs_dir)
                .map_err(|e| CacheError::Io(format!("Failed to remove blobs dir: {}", e)))?;
        }
        Ok(())
    }
}

/// A blob body written beside its final path
struct StagedBlob {
    tmp: PathBuf,
    dest: PathBuf,
}

/// Blob file changes of one write, applied once its transaction commits
#[derive(Default)]
struct BlobChanges {
    staged: Vec<StagedBlob>,
    /// Blobs of entries that are now stored inline
    obsolete: Vec<PathBuf>,
}

impl BlobChanges {
    fn apply(self) -> Result<()> {
        let mut failure = None;
        for blob in &self.staged {
            if let Err(e) = std::fs::rename(&blob.tmp, &blob.dest) {
                log::warn!("Failed to move blob into {}: {}", blob.dest.display(), e);
                let _ = std::fs::remove_file(&blob.tmp);
                failure.get_or_insert(CacheError::Io(format!("Failed to move blob: {}", e)));
            }
        }
        for path in self.obsolete {
            let _ = std::fs::remove_file(path);
        }
        failure.map_or(Ok(()), Err)
    }

    fn discard(self) {
        for blob in self.staged {
            let _ = std::fs::remove_file(blob.tmp);
        }
    }
}

/// Keep namespace names and versions safe to use as directory names
fn path_segment(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn nanos_to_datetime(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}

/// A namespace with its current size
#[derive(Debug, Clone)]
pub struct NamespaceInfo {
    pub namespace: Namespace,
    pub created_at: DateTime<Utc>,
    pub entries: usize,
    pub size_bytes: usize,
}

/// Listing row for a stored entry (body omitted)
#[derive(Debug, Clone)]
pub struct EntrySummary {
    pub namespace: Namespace,
    pub url: String,
    pub status: u16,
    pub size_bytes: usize,
    pub stored_at: DateTime<Utc>,
}

/// Statistics about cache clear operation
#[derive(Debug)]
pub struct ClearStats {
    pub entries_removed: usize,
}

/// Statistics about cache state
#[derive(Debug)]
pub struct CacheStats {
    pub total_entries: usize,
    pub namespaces: usize,
    pub total_size_bytes: usize,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_storage() -> (CacheStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = CacheStore::open_at(dir.path()).unwrap();
        (storage, dir)
    }

    fn ok(body: &[u8]) -> Response {
        Response::new(200)
            .with_header("content-type", "text/plain")
            .with_body(body.to_vec())
    }

    fn api_v1() -> Namespace {
        Namespace::new("api", "v1")
    }

    #[test]
    fn test_put_get_inline() {
        let (storage, _dir) = test_storage();
        let now = Utc::now();

        storage
            .put(&api_v1(), "GET http://a/", "http://a/", &ok(b"small data"), now)
            .unwrap();

        let entry = storage.get(&api_v1(), "GET http://a/").unwrap().unwrap();
        assert_eq!(entry.response, ok(b"small data"));
        assert_eq!(entry.stored_at, now);
        assert_eq!(entry.url, "http://a/");
    }

    #[test]
    fn test_stored_at_keeps_sub_millisecond_precision() {
        let (storage, _dir) = test_storage();
        let stored_at = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();

        storage
            .put(&api_v1(), "GET http://a/", "http://a/", &ok(b"x"), stored_at)
            .unwrap();
        storage
            .put(&api_v1(), "GET http://big/", "http://big/", &ok(&[0u8; 20_000]), stored_at)
            .unwrap();

        for key in ["GET http://a/", "GET http://big/"] {
            let entry = storage.get(&api_v1(), key).unwrap().unwrap();
            assert_eq!(entry.stored_at, stored_at);
        }
        let listed = storage.list_entries(Some(&api_v1())).unwrap();
        assert!(listed.iter().all(|e| e.stored_at == stored_at));
        assert_eq!(storage.stats().unwrap().newest_entry, Some(stored_at));
    }

    #[test]
    fn test_put_get_blob() {
        let (storage, _dir) = test_storage();
        let data = vec![0xffu8; 20_000]; // 20KB binary - will use blob

        storage
            .put(&api_v1(), "GET http://big/", "http://big/", &ok(&data), Utc::now())
            .unwrap();

        let entry = storage.get(&api_v1(), "GET http://big/").unwrap().unwrap();
        assert_eq!(entry.response.body, data);
    }

    #[test]
    fn test_overwrite_keeps_single_entry() {
        let (storage, _dir) = test_storage();

        for i in 0..5 {
            let body = format!("body {}", i);
            storage
                .put(&api_v1(), "GET http://a/", "http://a/", &ok(body.as_bytes()), Utc::now())
                .unwrap();
        }

        assert_eq!(storage.count_key("GET http://a/").unwrap(), 1);
        let entry = storage.get(&api_v1(), "GET http://a/").unwrap().unwrap();
        assert_eq!(entry.response.body, b"body 4");
    }

    #[test]
    fn test_blob_replaced_by_inline_removes_file() {
        let (storage, dir) = test_storage();
        let key = "GET http://big/";

        storage
            .put(&api_v1(), key, "http://big/", &ok(&vec![b'x'; 20_000]), Utc::now())
            .unwrap();
        storage
            .put(&api_v1(), key, "http://big/", &ok(b"tiny"), Utc::now())
            .unwrap();

        let name = blob_name(key);
        let path = dir
            .path()
            .join("blobs/api/v1")
            .join(&name[..2])
            .join(format!("{}.bin", name));
        assert!(!path.exists());
        assert_eq!(
            storage.get(&api_v1(), key).unwrap().unwrap().response.body,
            b"tiny"
        );
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let (storage, _dir) = test_storage();
        let v2 = Namespace::new("api", "v2");

        storage
            .put(&api_v1(), "GET http://a/", "http://a/", &ok(b"one"), Utc::now())
            .unwrap();

        assert!(storage.get(&v2, "GET http://a/").unwrap().is_none());
        assert!(storage.get(&api_v1(), "GET http://a/").unwrap().is_some());
    }

    #[test]
    fn test_delete_entry() {
        let (storage, _dir) = test_storage();

        storage
            .put(&api_v1(), "GET http://a/", "http://a/", &ok(b"x"), Utc::now())
            .unwrap();

        assert!(storage.delete(&api_v1(), "GET http://a/").unwrap());
        assert!(!storage.delete(&api_v1(), "GET http://a/").unwrap());
        assert!(storage.get(&api_v1(), "GET http://a/").unwrap().is_none());
    }

    #[test]
    fn test_delete_namespace_removes_entries_and_blobs() {
        let (storage, dir) = test_storage();
        let ns = Namespace::new("static", "v1");

        storage
            .put(&ns, "GET http://a/", "http://a/", &ok(&vec![b'x'; 20_000]), Utc::now())
            .unwrap();
        storage
            .put(&ns, "GET http://b/", "http://b/", &ok(b"small"), Utc::now())
            .unwrap();

        assert_eq!(storage.delete_namespace(&ns).unwrap(), 2);
        assert!(storage.list_namespaces().unwrap().is_empty());
        assert!(!dir.path().join("blobs/static/v1").exists());
    }

    #[test]
    fn test_put_all_creates_namespace_atomically() {
        let (storage, _dir) = test_storage();
        let ns = Namespace::new("static", "v2");
        let entries = vec![
            PendingEntry {
                key: "GET http://a/".to_string(),
                url: "http://a/".to_string(),
                response: ok(b"a"),
            },
            PendingEntry {
                key: "GET http://b/".to_string(),
                url: "http://b/".to_string(),
                response: ok(b"b"),
            },
        ];

        storage.put_all(&ns, &entries, Utc::now()).unwrap();

        let namespaces = storage.list_namespaces().unwrap();
        assert_eq!(namespaces.len(), 1);
        assert_eq!(namespaces[0].namespace, ns);
        assert_eq!(namespaces[0].entries, 2);
    }

    fn blob_file(dir: &TempDir, ns: &str, version: &str, key: &str) -> PathBuf {
        let name = blob_name(key);
        dir.path()
            .join("blobs")
            .join(ns)
            .join(version)
            .join(&name[..2])
            .join(format!("{}.bin", name))
    }

    #[test]
    fn test_failed_overwrite_keeps_previous_blob() {
        let (storage, dir) = test_storage();
        let key = "GET http://big/";
        let original = vec![b'a'; 20_000];
        storage
            .put(&api_v1(), key, "http://big/", &ok(&original), Utc::now())
            .unwrap();

        // Make the next row insert fail after its blob has been written
        let other = Connection::open(dir.path().join("cache.db")).unwrap();
        other
            .execute_batch(
                "CREATE TRIGGER reject_errors BEFORE INSERT ON entries
                 WHEN NEW.status >= 500
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let replacement = Response::new(503).with_body(vec![b'b'; 30_000]);
        assert!(
            storage
                .put(&api_v1(), key, "http://big/", &replacement, Utc::now())
                .is_err()
        );

        let entry = storage.get(&api_v1(), key).unwrap().unwrap();
        assert_eq!(entry.response.status, 200);
        assert_eq!(entry.response.body, original);
        let path = blob_file(&dir, "api", "v1", key);
        assert_eq!(std::fs::read(&path).unwrap(), original);
        assert!(!path.with_extension("bin.tmp").exists());
    }

    #[test]
    fn test_blob_overwrite_leaves_no_staging_files() {
        let (storage, dir) = test_storage();
        let key = "GET http://big/";

        for fill in [b'a', b'b'] {
            storage
                .put(&api_v1(), key, "http://big/", &ok(&vec![fill; 20_000]), Utc::now())
                .unwrap();
        }

        let path = blob_file(&dir, "api", "v1", key);
        assert_eq!(std::fs::read(&path).unwrap(), vec![b'b'; 20_000]);
        let shard = path.parent().unwrap();
        assert_eq!(std::fs::read_dir(shard).unwrap().count(), 1);
    }

    #[test]
    fn test_open_namespace_is_idempotent() {
        let (storage, _dir) = test_storage();
        let ns = Namespace::new("dynamic", "v1");

        storage.open_namespace(&ns).unwrap();
        storage.open_namespace(&ns).unwrap();

        let namespaces = storage.list_namespaces().unwrap();
        assert_eq!(namespaces.len(), 1);
        assert_eq!(namespaces[0].entries, 0);
    }

    #[test]
    fn test_meta_roundtrip() {
        let (storage, _dir) = test_storage();

        assert_eq!(storage.get_meta("active_version").unwrap(), None);
        storage.set_meta("active_version", "v1").unwrap();
        storage.set_meta("active_version", "v2").unwrap();
        assert_eq!(
            storage.get_meta("active_version").unwrap().as_deref(),
            Some("v2")
        );
        storage.delete_meta("active_version").unwrap();
        assert_eq!(storage.get_meta("active_version").unwrap(), None);
    }

    #[test]
    fn test_clear_all() {
        let (storage, _dir) = test_storage();

        storage
            .put(&api_v1(), "k1", "http://a/", &ok(b"d1"), Utc::now())
            .unwrap();
        storage
            .put(&api_v1(), "k2", "http://b/", &ok(b"d2"), Utc::now())
            .unwrap();

        let stats = storage.clear_all().unwrap();
        assert_eq!(stats.entries_removed, 2);

        assert!(storage.get(&api_v1(), "k1").unwrap().is_none());
        assert!(storage.get(&api_v1(), "k2").unwrap().is_none());
    }

    #[test]
    fn test_stats() {
        let (storage, _dir) = test_storage();

        storage
            .put(&api_v1(), "k1", "http://a/", &ok(b"data1"), Utc::now())
            .unwrap();
        storage
            .put(&Namespace::new("static", "v1"), "k2", "http://b/", &ok(b"data2"), Utc::now())
            .unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.namespaces, 2);
        assert_eq!(stats.total_size_bytes, 10);
        assert!(stats.oldest_entry.is_some());
    }

    #[test]
    fn test_list_entries_filtered() {
        let (storage, _dir) = test_storage();

        storage
            .put(&api_v1(), "k1", "http://a/", &ok(b"d1"), Utc::now())
            .unwrap();
        storage
            .put(&Namespace::new("static", "v1"), "k2", "http://b/", &ok(b"d2"), Utc::now())
            .unwrap();

        assert_eq!(storage.list_entries(None).unwrap().len(), 2);
        let api = storage.list_entries(Some(&api_v1())).unwrap();
        assert_eq!(api.len(), 1);
        assert_eq!(api[0].url, "http://a/");
        assert_eq!(api[0].status, 200);
    }
}
