//! Versioned cache partitions and their entries.
//!
//! A partition is one named cache generation ("static-v2", "dynamic-v2").
//! Exactly one generation per kind is current at any time; superseded
//! generations are deleted whole during activation, never reused. Entries
//! are only ever replaced as complete rows, so a concurrent overwrite is
//! last-writer-wins and never torn.

use super::connection::CacheDb;
use crate::request::RequestKey;
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Names of the current static and dynamic partitions for one version tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionNames {
    pub static_name: String,
    pub dynamic_name: String,
}

impl PartitionNames {
    /// Derive the partition pair for a version tag, e.g. `v2.0` ->
    /// `static-v2.0` / `dynamic-v2.0`.
    pub fn for_version(version: &str) -> Self {
        Self { static_name: format!("static-{version}"), dynamic_name: format!("dynamic-{version}") }
    }

    /// Whether `name` belongs to the current generation.
    pub fn contains(&self, name: &str) -> bool {
        name == self.static_name || name == self.dynamic_name
    }
}

/// Immutable snapshot of a successful response.
///
/// Stored whole under a request key; a newer successful fetch for the same
/// key replaces the entire row. Entries are never individually expired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Instant the snapshot was taken.
    pub stored_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value with the given name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Handle to one named partition.
///
/// Cheap to clone; all handles for the same name address the same rows.
#[derive(Clone, Debug)]
pub struct Partition {
    db: CacheDb,
    name: String,
}

impl CacheDb {
    /// Open a partition by name, creating it if absent. Idempotent.
    pub async fn open_partition(&self, name: &str) -> Result<Partition, Error> {
        let owned = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
                    params![owned, Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(Partition { db: self.clone(), name: name.to_string() })
    }

    /// Names of every partition currently in the store.
    pub async fn list_partition_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM partitions ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a partition and every entry it owns.
    ///
    /// Returns false if no partition by that name existed.
    pub async fn delete_partition(&self, name: &str) -> Result<bool, Error> {
        let owned = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM partitions WHERE name = ?1", params![owned])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }
}

impl Partition {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up the entry for a request key. A miss is `Ok(None)`.
    pub async fn get(&self, key: &RequestKey) -> Result<Option<CachedResponse>, Error> {
        let partition = self.name.clone();
        let hash = key.digest();
        self.db
            .conn
            .call(move |conn| -> Result<Option<CachedResponse>, Error> {
                let result = conn.query_row(
                    "SELECT status, headers_json, body, stored_at
                     FROM entries WHERE partition = ?1 AND key_hash = ?2",
                    params![partition, hash],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Vec<u8>>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                );

                match result {
                    Ok((status, headers_json, body, stored_at)) => {
                        // Corrupted metadata degrades rather than failing the lookup.
                        let headers: Vec<(String, String)> = serde_json::from_str(&headers_json).unwrap_or_default();
                        let stored_at = DateTime::parse_from_rfc3339(&stored_at)
                            .map(|t| t.with_timezone(&Utc))
                            .unwrap_or_else(|_| Utc::now());
                        Ok(Some(CachedResponse { status: status as u16, headers, body, stored_at }))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Store a response under a request key, replacing any existing entry.
    ///
    /// The whole row is written in one UPSERT, so concurrent writers for the
    /// same key resolve last-writer-wins.
    pub async fn put(&self, key: &RequestKey, response: &CachedResponse) -> Result<(), Error> {
        let partition = self.name.clone();
        let hash = key.digest();
        let method = key.method().as_str().to_string();
        let url = key.url().to_string();
        let headers_json =
            serde_json::to_string(&response.headers).map_err(|e| Error::StoreWrite(e.to_string()))?;
        let status = response.status as i64;
        let body = response.body.clone();
        let stored_at = response.stored_at.to_rfc3339();

        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO entries (partition, key_hash, method, url, status, headers_json, body, stored_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(partition, key_hash) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                    params![partition, hash, method, url, status, headers_json, body, stored_at],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| match Error::from(e) {
                Error::Database(inner) => Error::StoreWrite(inner.to_string()),
                other => other,
            })
    }

    /// Number of entries currently in this partition.
    pub async fn len(&self) -> Result<u64, Error> {
        let partition = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM entries WHERE partition = ?1",
                    params![partition],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_response(body: &str) -> CachedResponse {
        CachedResponse {
            status: 200,
            headers: vec![("content-type".to_string(), "text/html".to_string())],
            body: body.as_bytes().to_vec(),
            stored_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_open_partition_idempotent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_partition("static-v1").await.unwrap();
        db.open_partition("static-v1").await.unwrap();

        assert_eq!(db.list_partition_names().await.unwrap(), vec!["static-v1"]);
    }

    #[tokio::test]
    async fn test_get_miss_is_none() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let partition = db.open_partition("dynamic-v1").await.unwrap();
        let key = RequestKey::get("https://example.com/missing").unwrap();

        assert!(partition.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_then_get_round_trips() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let partition = db.open_partition("static-v1").await.unwrap();
        let key = RequestKey::get("https://example.com/index.html").unwrap();

        partition.put(&key, &make_response("<html>shell</html>")).await.unwrap();

        let hit = partition.get(&key).await.unwrap().unwrap();
        assert_eq!(hit.status, 200);
        assert_eq!(hit.body, b"<html>shell</html>");
        assert_eq!(hit.header("Content-Type"), Some("text/html"));
    }

    #[tokio::test]
    async fn test_put_overwrites_whole_entry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let partition = db.open_partition("dynamic-v1").await.unwrap();
        let key = RequestKey::get("https://example.com/api/tasks").unwrap();

        partition.put(&key, &make_response("old")).await.unwrap();
        partition.put(&key, &make_response("new")).await.unwrap();

        let hit = partition.get(&key).await.unwrap().unwrap();
        assert_eq!(hit.body, b"new");
        assert_eq!(partition.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_put_failure_surfaces_as_store_write() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let partition = db.open_partition("dynamic-v1").await.unwrap();

        // Simulate quota exhaustion: every entry write aborts.
        db.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch(
                    "CREATE TRIGGER quota_exceeded BEFORE INSERT ON entries
                     BEGIN SELECT RAISE(ABORT, 'quota exceeded'); END;",
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let key = RequestKey::get("https://example.com/api/tasks").unwrap();
        let result = partition.put(&key, &make_response("payload")).await;
        assert!(matches!(result, Err(Error::StoreWrite(_))));

        // Reads keep working and the failed write left nothing behind.
        assert!(partition.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partitions_are_isolated() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let stat = db.open_partition("static-v1").await.unwrap();
        let dynamic = db.open_partition("dynamic-v1").await.unwrap();
        let key = RequestKey::get("https://example.com/shared").unwrap();

        stat.put(&key, &make_response("static copy")).await.unwrap();

        assert!(dynamic.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_partition_cascades_to_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let partition = db.open_partition("static-v1").await.unwrap();
        let key = RequestKey::get("https://example.com/index.html").unwrap();
        partition.put(&key, &make_response("shell")).await.unwrap();

        assert!(db.delete_partition("static-v1").await.unwrap());
        assert!(!db.delete_partition("static-v1").await.unwrap());
        assert!(db.list_partition_names().await.unwrap().is_empty());

        // Reopening the partition starts empty.
        let reopened = db.open_partition("static-v1").await.unwrap();
        assert_eq!(reopened.len().await.unwrap(), 0);
    }

    #[test]
    fn test_partition_names_for_version() {
        let names = PartitionNames::for_version("v2.0");
        assert_eq!(names.static_name, "static-v2.0");
        assert_eq!(names.dynamic_name, "dynamic-v2.0");
        assert!(names.contains("static-v2.0"));
        assert!(!names.contains("static-v1.0"));
    }
}
