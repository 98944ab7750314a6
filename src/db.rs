// 🗄️ Record Store - upsert / prune / query by business key
// The sync engine only sees the `Store` trait. `SqliteStore` is the bundled
// implementation: one `records` table keyed by (type, state, key digest) plus
// the append-only `events` audit table.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::record::{Fields, ImportRecordKey, RecordType, StateCode};

const ROW_SAVEPOINT: &str = "import_row";
/// How long a job waits for another job's write transaction.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("stored row is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stored key `{shape}` / `{encoded}` could not be decoded")]
    CorruptKey { shape: String, encoded: String },

    #[error("stored timestamp `{0}` is not RFC 3339")]
    CorruptTimestamp(String),

    #[error("{0}")]
    Other(String),
}

// ============================================================================
// STORED ROWS & EVENTS
// ============================================================================

/// One persisted row of a record type for one state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRecord {
    pub record_id: String,
    pub key: ImportRecordKey,
    pub fields: Fields,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Audit trail entry. Every insert, update and delete writes one.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Audit entity id for one keyed row: `US_ID:<digest>`.
pub fn entity_id(state: StateCode, key: &ImportRecordKey) -> String {
    format!("{}:{}", state, key.digest())
}

// ============================================================================
// STORE CONTRACT
// ============================================================================

/// Narrow persistence contract the sync engine depends on.
///
/// Each `upsert` and each deleted row is independently atomic. The job
/// methods are optional: stores without transactions keep the defaults and
/// rely on the engine deferring deletes until the full key set is known.
pub trait Store {
    fn begin_job(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn commit_job(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn rollback_job(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn get(
        &self,
        record_type: RecordType,
        state: StateCode,
        key: &ImportRecordKey,
    ) -> Result<Option<StoredRecord>, StoreError>;

    /// Insert if the key is unseen, else replace the stored fields.
    fn upsert(
        &self,
        record_type: RecordType,
        state: StateCode,
        key: &ImportRecordKey,
        fields: &Fields,
    ) -> Result<UpsertOutcome, StoreError>;

    fn find_many(&self, record_type: RecordType, state: StateCode) -> Result<Vec<StoredRecord>, StoreError>;

    /// Stored keys with the given shape.
    fn find_keys(
        &self,
        record_type: RecordType,
        state: StateCode,
        key_shape: &str,
    ) -> Result<Vec<ImportRecordKey>, StoreError>;

    /// Delete every row of `key_shape` whose key is not in `keep`. Returns the
    /// deleted keys.
    fn delete_where_key_not_in(
        &self,
        record_type: RecordType,
        state: StateCode,
        key_shape: &str,
        keep: &HashSet<ImportRecordKey>,
    ) -> Result<Vec<ImportRecordKey>, StoreError>;
}

// ============================================================================
// SQLITE
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<(), StoreError> {
    // WAL for crash recovery; in-memory databases silently keep "memory"
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Records Table (one row per record type + state + business key)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_id TEXT UNIQUE NOT NULL,
            record_type TEXT NOT NULL,
            state_code TEXT NOT NULL,
            key_shape TEXT NOT NULL,
            key_encoded TEXT NOT NULL,
            key_digest TEXT NOT NULL,
            data TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (record_type, state_code, key_digest)
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_scope ON records(record_type, state_code, key_shape)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<(), StoreError> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Events for one entity, newest first.
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id DESC",
    )?;

    let rows = stmt
        .query_map(params![entity_type, entity_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(event_id, timestamp, event_type, entity_type, entity_id, data, actor)| {
            Ok(Event {
                event_id,
                timestamp: parse_timestamp(&timestamp)?,
                event_type,
                entity_type,
                entity_id,
                data: serde_json::from_str(&data)?,
                actor,
            })
        })
        .collect()
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::CorruptTimestamp(value.to_string()))
}

pub struct SqliteStore {
    conn: Connection,
    actor: String,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        setup_database(&conn)?;
        Ok(SqliteStore {
            conn,
            actor: "sync_engine".to_string(),
        })
    }

    /// Actor recorded on audit events.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Audit events for one keyed row, newest first.
    pub fn events_for(
        &self,
        record_type: RecordType,
        state: StateCode,
        key: &ImportRecordKey,
    ) -> Result<Vec<Event>, StoreError> {
        get_events_for_entity(&self.conn, &record_type.id(), &entity_id(state, key))
    }

    pub fn count(&self, record_type: RecordType, state: StateCode) -> Result<i64, StoreError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE record_type = ?1 AND state_code = ?2",
            params![record_type.id(), state.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn audit(
        &self,
        event_type: &str,
        record_type: RecordType,
        state: StateCode,
        key: &ImportRecordKey,
        data: serde_json::Value,
    ) -> Result<(), StoreError> {
        let event = Event::new(event_type, &record_type.id(), &entity_id(state, key), data, &self.actor);
        insert_event(&self.conn, &event)
    }

    fn write_row(
        &self,
        record_type: RecordType,
        state: StateCode,
        key: &ImportRecordKey,
        fields: &Fields,
    ) -> Result<UpsertOutcome, StoreError> {
        let now = Utc::now().to_rfc3339();
        let data = serde_json::to_string(fields)?;
        let digest = key.digest();

        let updated = self.conn.execute(
            "UPDATE records SET data = ?1, version = version + 1, updated_at = ?2
             WHERE record_type = ?3 AND state_code = ?4 AND key_digest = ?5",
            params![data, now, record_type.id(), state.as_str(), digest],
        )?;

        let outcome = if updated > 0 {
            UpsertOutcome::Updated
        } else {
            self.conn.execute(
                "INSERT INTO records (
                    record_id, record_type, state_code, key_shape, key_encoded, key_digest,
                    data, version, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8)",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    record_type.id(),
                    state.as_str(),
                    key.shape(),
                    key.encoded(),
                    digest,
                    data,
                    now,
                ],
            )?;
            UpsertOutcome::Inserted
        };

        let event_type = match outcome {
            UpsertOutcome::Inserted => "record_inserted",
            UpsertOutcome::Updated => "record_updated",
        };
        self.audit(
            event_type,
            record_type,
            state,
            key,
            serde_json::json!({ "key": key.to_string(), "fields": fields.len() }),
        )?;
        Ok(outcome)
    }

    fn row_to_stored(
        record_id: String,
        shape: String,
        encoded: String,
        data: String,
        version: i64,
        updated_at: String,
    ) -> Result<StoredRecord, StoreError> {
        let key = ImportRecordKey::decode(&shape, &encoded).ok_or(StoreError::CorruptKey { shape, encoded })?;
        Ok(StoredRecord {
            record_id,
            key,
            fields: serde_json::from_str(&data)?,
            version,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }
}

// ============================================================================
// CONNECTOR
// ============================================================================

/// Opens one store per import job, so jobs never share a connection.
pub trait StoreConnector: Send + Sync {
    type Store: Store;

    fn connect(&self) -> Result<Self::Store, StoreError>;
}

enum Target {
    File(PathBuf),
    /// Shared-cache in-memory database; `_keeper` holds it open.
    Memory { uri: String, _keeper: Mutex<Connection> },
}

pub struct SqliteConnector {
    target: Target,
    actor: String,
}

impl SqliteConnector {
    /// Database file. The schema is created here, once.
    pub fn file<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        setup_database(&Connection::open(&path)?)?;
        Ok(SqliteConnector {
            target: Target::File(path),
            actor: "sync_engine".to_string(),
        })
    }

    /// Private in-memory database seen by every store this connector opens.
    pub fn in_memory() -> Result<Self, StoreError> {
        let uri = format!("file:sync-{}?mode=memory&cache=shared", Uuid::new_v4());
        let keeper = Connection::open(&uri)?;
        setup_database(&keeper)?;
        Ok(SqliteConnector {
            target: Target::Memory {
                uri,
                _keeper: Mutex::new(keeper),
            },
            actor: "sync_engine".to_string(),
        })
    }

    /// Actor recorded on audit events by every opened store.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }
}

impl StoreConnector for SqliteConnector {
    type Store = SqliteStore;

    fn connect(&self) -> Result<SqliteStore, StoreError> {
        let store = match &self.target {
            Target::File(path) => SqliteStore::open(path)?,
            Target::Memory { uri, .. } => SqliteStore::open(uri)?,
        };
        Ok(store.with_actor(self.actor.clone()))
    }
}

impl Store for SqliteStore {
    // IMMEDIATE takes the write lock up front, so a concurrent job waits on
    // the busy timeout instead of failing on a read-to-write upgrade.
    fn begin_job(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit_job(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback_job(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn get(
        &self,
        record_type: RecordType,
        state: StateCode,
        key: &ImportRecordKey,
    ) -> Result<Option<StoredRecord>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT record_id, key_shape, key_encoded, data, version, updated_at
                 FROM records
                 WHERE record_type = ?1 AND state_code = ?2 AND key_digest = ?3",
                params![record_type.id(), state.as_str(), key.digest()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, shape, encoded, data, version, updated_at)| {
            Self::row_to_stored(id, shape, encoded, data, version, updated_at)
        })
        .transpose()
    }

    fn upsert(
        &self,
        record_type: RecordType,
        state: StateCode,
        key: &ImportRecordKey,
        fields: &Fields,
    ) -> Result<UpsertOutcome, StoreError> {
        // row write and its audit event land together or not at all
        self.conn.execute_batch(&format!("SAVEPOINT {}", ROW_SAVEPOINT))?;
        match self.write_row(record_type, state, key, fields) {
            Ok(outcome) => {
                self.conn.execute_batch(&format!("RELEASE {}", ROW_SAVEPOINT))?;
                Ok(outcome)
            }
            Err(e) => {
                self.conn
                    .execute_batch(&format!("ROLLBACK TO {0}; RELEASE {0}", ROW_SAVEPOINT))?;
                Err(e)
            }
        }
    }

    fn find_many(&self, record_type: RecordType, state: StateCode) -> Result<Vec<StoredRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT record_id, key_shape, key_encoded, data, version, updated_at
             FROM records
             WHERE record_type = ?1 AND state_code = ?2
             ORDER BY id",
        )?;

        let rows = stmt
            .query_map(params![record_type.id(), state.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, shape, encoded, data, version, updated_at)| {
                Self::row_to_stored(id, shape, encoded, data, version, updated_at)
            })
            .collect()
    }

    fn find_keys(
        &self,
        record_type: RecordType,
        state: StateCode,
        key_shape: &str,
    ) -> Result<Vec<ImportRecordKey>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT key_encoded FROM records
             WHERE record_type = ?1 AND state_code = ?2 AND key_shape = ?3
             ORDER BY id",
        )?;

        let encoded = stmt
            .query_map(params![record_type.id(), state.as_str(), key_shape], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        encoded
            .into_iter()
            .map(|encoded| {
                ImportRecordKey::decode(key_shape, &encoded).ok_or_else(|| StoreError::CorruptKey {
                    shape: key_shape.to_string(),
                    encoded,
                })
            })
            .collect()
    }

    fn delete_where_key_not_in(
        &self,
        record_type: RecordType,
        state: StateCode,
        key_shape: &str,
        keep: &HashSet<ImportRecordKey>,
    ) -> Result<Vec<ImportRecordKey>, StoreError> {
        let stale: Vec<ImportRecordKey> = self
            .find_keys(record_type, state, key_shape)?
            .into_iter()
            .filter(|key| !keep.contains(key))
            .collect();

        for key in &stale {
            self.conn.execute_batch(&format!("SAVEPOINT {}", ROW_SAVEPOINT))?;
            let deleted = self
                .conn
                .execute(
                    "DELETE FROM records WHERE record_type = ?1 AND state_code = ?2 AND key_digest = ?3",
                    params![record_type.id(), state.as_str(), key.digest()],
                )
                .map_err(StoreError::from)
                .and_then(|_| {
                    self.audit(
                        "record_deleted",
                        record_type,
                        state,
                        key,
                        serde_json::json!({ "key": key.to_string() }),
                    )
                });
            match deleted {
                Ok(()) => self.conn.execute_batch(&format!("RELEASE {}", ROW_SAVEPOINT))?,
                Err(e) => {
                    self.conn
                        .execute_batch(&format!("ROLLBACK TO {0}; RELEASE {0}", ROW_SAVEPOINT))?;
                    return Err(e);
                }
            }
        }

        Ok(stale)
    }
}
