//! 인스턴스 레코드 저장소
//!
//! "이 사용자에게 인스턴스가 있는가"의 유일한 기준입니다. owner, 컨테이너 이름,
//! 서브도메인의 유일성은 저장소가 직접 보장하며, 같은 사용자의 동시 생성 경쟁도
//! 여기서 닫힙니다. 먼저 들어온 claim이 이기고 이후 insert는 모두
//! [`ProvisionerError::RecordConflict`]로 실패합니다.
//!
//! 상태 변경은 status 컬럼에 대한 compare-and-set인
//! [`InstanceStore::update_status`]를 거칩니다.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use tracing::debug;

use scoutpost_core::types::{InstanceRecord, InstanceSettings, InstanceStatus};

use crate::error::ProvisionerError;

/// Persistent instance records.
pub trait InstanceStore: Send + Sync + 'static {
    /// Record for `owner`, if any.
    fn find_by_owner(
        &self,
        owner: &str,
    ) -> impl Future<Output = Result<Option<InstanceRecord>, ProvisionerError>> + Send;

    /// Inserts a new record; `RecordConflict` if owner, container name or
    /// subdomain is already taken.
    fn insert(
        &self,
        record: InstanceRecord,
    ) -> impl Future<Output = Result<(), ProvisionerError>> + Send;

    /// Moves `owner` from `expected` to `next`.
    ///
    /// `InvalidTransition` if the state machine forbids the move,
    /// `NotFound` without a record, `RecordConflict` if the stored status is
    /// not `expected`.
    fn update_status(
        &self,
        owner: &str,
        expected: InstanceStatus,
        next: InstanceStatus,
    ) -> impl Future<Output = Result<InstanceRecord, ProvisionerError>> + Send;

    /// Deletes the record; `false` if there was none.
    fn delete_by_owner(
        &self,
        owner: &str,
    ) -> impl Future<Output = Result<bool, ProvisionerError>> + Send;

    /// Up to `limit` records ordered by creation time.
    fn list_all(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<InstanceRecord>, ProvisionerError>> + Send;
}

// --- In-memory store ---

/// Mutex-guarded map with the same uniqueness rules as the SQLite store.
#[derive(Debug, Default)]
pub struct MemoryInstanceStore {
    records: Mutex<BTreeMap<String, InstanceRecord>>,
}

impl MemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> Result<MutexGuard<'_, BTreeMap<String, InstanceRecord>>, ProvisionerError> {
        self.records
            .lock()
            .map_err(|_| ProvisionerError::Store("record table mutex poisoned".to_owned()))
    }
}

impl InstanceStore for MemoryInstanceStore {
    async fn find_by_owner(&self, owner: &str) -> Result<Option<InstanceRecord>, ProvisionerError> {
        Ok(self.table()?.get(owner).cloned())
    }

    async fn insert(&self, record: InstanceRecord) -> Result<(), ProvisionerError> {
        let mut table = self.table()?;
        if table.contains_key(&record.owner) {
            return Err(ProvisionerError::RecordConflict(format!(
                "owner '{}' already has a record",
                record.owner
            )));
        }
        if let Some(other) = table.values().find(|r| {
            r.container_name == record.container_name || r.subdomain == record.subdomain
        }) {
            return Err(ProvisionerError::RecordConflict(format!(
                "names of '{}' collide with owner '{}'",
                record.owner, other.owner
            )));
        }
        table.insert(record.owner.clone(), record);
        Ok(())
    }

    async fn update_status(
        &self,
        owner: &str,
        expected: InstanceStatus,
        next: InstanceStatus,
    ) -> Result<InstanceRecord, ProvisionerError> {
        expected.transition(owner, next)?;
        let mut table = self.table()?;
        let record = table
            .get_mut(owner)
            .ok_or_else(|| ProvisionerError::NotFound(owner.to_owned()))?;
        if record.status != expected {
            return Err(ProvisionerError::RecordConflict(format!(
                "'{owner}' is {}, expected {expected}",
                record.status
            )));
        }
        record.status = next;
        Ok(record.clone())
    }

    async fn delete_by_owner(&self, owner: &str) -> Result<bool, ProvisionerError> {
        Ok(self.table()?.remove(owner).is_some())
    }

    async fn list_all(&self, limit: usize) -> Result<Vec<InstanceRecord>, ProvisionerError> {
        let mut records: Vec<InstanceRecord> = self.table()?.values().cloned().collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.owner.cmp(&b.owner))
        });
        records.truncate(limit);
        Ok(records)
    }
}

// --- SQLite store ---

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS instances (
    owner          TEXT PRIMARY KEY NOT NULL,
    container_name TEXT NOT NULL UNIQUE,
    subdomain      TEXT NOT NULL UNIQUE,
    db_name        TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    settings       TEXT NOT NULL,
    status         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_instances_created_at ON instances (created_at);
";

const COLUMNS: &str = "owner, container_name, subdomain, db_name, created_at, settings, status";

/// SQLite-backed store.
///
/// One connection behind a mutex; every call runs on the blocking pool.
/// Several handles (or processes) may share one file: WAL mode plus a busy
/// timeout, with uniqueness enforced by the schema.
#[derive(Clone)]
pub struct SqliteInstanceStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteInstanceStore {
    /// Opens (or creates) the store at `path`. `:memory:` gives an ephemeral store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ProvisionerError> {
        let path = path.as_ref();
        let conn = if path == Path::new(":memory:") {
            Connection::open_in_memory()
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ProvisionerError::Store(format!("create {}: {e}", parent.display()))
                })?;
            }
            Connection::open(path)
        }
        .map_err(|e| ProvisionerError::Store(format!("open {}: {e}", path.display())))?;

        Self::init(&conn).map_err(|e| ProvisionerError::Store(format!("init schema: {e}")))?;
        debug!(path = %path.display(), "instance store opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Ephemeral in-memory store.
    pub fn open_in_memory() -> Result<Self, ProvisionerError> {
        Self::open(":memory:")
    }

    fn init(conn: &Connection) -> rusqlite::Result<()> {
        // journal_mode returns a row; pragma_update tolerates that
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        conn.execute_batch(SCHEMA)
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, ProvisionerError>
    where
        F: FnOnce(&mut Connection) -> Result<T, ProvisionerError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| ProvisionerError::Store("connection mutex poisoned".to_owned()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| ProvisionerError::Store(format!("store task failed: {e}")))?
    }
}

/// Raw column values of one row.
type RawRow = (String, String, String, String, String, String, String);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn decode(raw: RawRow) -> Result<InstanceRecord, ProvisionerError> {
    let (owner, container_name, subdomain, db_name, created_at, settings, status) = raw;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| ProvisionerError::Store(format!("bad created_at for '{owner}': {e}")))?
        .with_timezone(&Utc);
    let settings: InstanceSettings = serde_json::from_str(&settings)
        .map_err(|e| ProvisionerError::Store(format!("bad settings for '{owner}': {e}")))?;
    let status: InstanceStatus = status
        .parse()
        .map_err(|e| ProvisionerError::Store(format!("bad status for '{owner}': {e}")))?;
    Ok(InstanceRecord {
        owner,
        container_name,
        subdomain,
        db_name,
        created_at,
        settings,
        status,
    })
}

fn query_err(e: rusqlite::Error) -> ProvisionerError {
    ProvisionerError::Store(e.to_string())
}

fn select_owner(conn: &Connection, owner: &str) -> Result<Option<InstanceRecord>, ProvisionerError> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM instances WHERE owner = ?1"),
        params![owner],
        read_row,
    )
    .optional()
    .map_err(query_err)?
    .map(decode)
    .transpose()
}

impl InstanceStore for SqliteInstanceStore {
    async fn find_by_owner(&self, owner: &str) -> Result<Option<InstanceRecord>, ProvisionerError> {
        let owner = owner.to_owned();
        self.with_conn(move |conn| select_owner(conn, &owner)).await
    }

    async fn insert(&self, record: InstanceRecord) -> Result<(), ProvisionerError> {
        let settings = serde_json::to_string(&record.settings)
            .map_err(|e| ProvisionerError::Store(format!("encode settings: {e}")))?;
        self.with_conn(move |conn| {
            let result = conn.execute(
                &format!("INSERT INTO instances ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    record.owner,
                    record.container_name,
                    record.subdomain,
                    record.db_name,
                    record
                        .created_at
                        .to_rfc3339_opts(SecondsFormat::Micros, true),
                    settings,
                    record.status.as_str(),
                ],
            );
            match result {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(err, msg))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    Err(ProvisionerError::RecordConflict(format!(
                        "'{}': {}",
                        record.owner,
                        msg.unwrap_or_else(|| "unique constraint".to_owned())
                    )))
                }
                Err(e) => Err(query_err(e)),
            }
        })
        .await
    }

    async fn update_status(
        &self,
        owner: &str,
        expected: InstanceStatus,
        next: InstanceStatus,
    ) -> Result<InstanceRecord, ProvisionerError> {
        expected.transition(owner, next)?;
        let owner = owner.to_owned();
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(query_err)?;
            let changed = tx
                .execute(
                    "UPDATE instances SET status = ?3 WHERE owner = ?1 AND status = ?2",
                    params![owner, expected.as_str(), next.as_str()],
                )
                .map_err(query_err)?;
            let current = select_owner(&tx, &owner)?;
            match (changed, current) {
                (0, None) => Err(ProvisionerError::NotFound(owner)),
                (0, Some(record)) => Err(ProvisionerError::RecordConflict(format!(
                    "'{owner}' is {}, expected {expected}",
                    record.status
                ))),
                (_, Some(record)) => {
                    tx.commit().map_err(query_err)?;
                    Ok(record)
                }
                (_, None) => Err(ProvisionerError::Store(format!(
                    "'{owner}' vanished during status update"
                ))),
            }
        })
        .await
    }

    async fn delete_by_owner(&self, owner: &str) -> Result<bool, ProvisionerError> {
        let owner = owner.to_owned();
        self.with_conn(move |conn| {
            let deleted = conn
                .execute("DELETE FROM instances WHERE owner = ?1", params![owner])
                .map_err(query_err)?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn list_all(&self, limit: usize) -> Result<Vec<InstanceRecord>, ProvisionerError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {COLUMNS} FROM instances ORDER BY created_at, owner LIMIT ?1"
                ))
                .map_err(query_err)?;
            let rows = stmt
                .query_map(params![limit], read_row)
                .map_err(query_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(query_err)?;
            rows.into_iter().map(decode).collect()
        })
        .await
    }
}
