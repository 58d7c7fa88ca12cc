// src/storage/sqlite.rs

//! SQLite-backed store. Several processes opening the same file share one
//! queue, one lock table and one liveaction table; every compound operation
//! runs inside a `BEGIN IMMEDIATE` transaction so it is atomic across them.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

use super::{LiveActionStore, LockStore, QueueStore};
use crate::errors::{Result, RunqError};
use crate::model::{ExecutionRequest, LiveAction, Lock};
use crate::types::ExecutionStatus;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        debug!(path = %path.display(), "opened sqlite store");
        Ok(store)
    }

    /// Private in-memory database (tests, single process).
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn()?.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS execution_queue (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                payload TEXT NOT NULL,          -- liveaction snapshot (JSON)
                ready_at INTEGER NOT NULL,      -- unix micros
                delay_ms INTEGER NOT NULL,
                priority INTEGER NOT NULL,
                affinity TEXT
            );
            CREATE INDEX IF NOT EXISTS execution_queue_order
                ON execution_queue (priority DESC, ready_at ASC, delay_ms ASC);

            CREATE TABLE IF NOT EXISTS locks (
                name TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                expiry INTEGER NOT NULL,        -- unix micros
                proc_info TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS liveactions (
                id TEXT PRIMARY KEY,
                action TEXT NOT NULL,
                status TEXT NOT NULL,
                start_timestamp INTEGER NOT NULL,
                end_timestamp INTEGER,
                record TEXT NOT NULL            -- full liveaction (JSON)
            );
            CREATE INDEX IF NOT EXISTS liveactions_status_start
                ON liveactions (status, start_timestamp);
            CREATE INDEX IF NOT EXISTS liveactions_action_status
                ON liveactions (action, status);
            ",
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RunqError::StorageUnavailable(format!("poisoned sqlite mutex: {e}")))
    }
}

fn micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

fn from_micros(value: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(value)
        .ok_or_else(|| RunqError::StorageUnavailable(format!("corrupt timestamp {value}")))
}

struct QueueRow {
    seq: i64,
    id: String,
    payload: String,
    ready_at: i64,
    delay_ms: i64,
    priority: i32,
    affinity: Option<String>,
}

impl QueueRow {
    fn into_request(self) -> Result<ExecutionRequest> {
        Ok(ExecutionRequest {
            id: self.id,
            payload: serde_json::from_str(&self.payload)?,
            ready_at: from_micros(self.ready_at)?,
            delay: Duration::from_millis(self.delay_ms.max(0) as u64),
            priority: self.priority,
            affinity: self.affinity,
        })
    }
}

impl QueueStore for SqliteStore {
    fn insert_request(&self, request: &ExecutionRequest) -> Result<()> {
        let payload = serde_json::to_string(&request.payload)?;
        self.conn()?.execute(
            "INSERT INTO execution_queue (id, payload, ready_at, delay_ms, priority, affinity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                request.id,
                payload,
                micros(request.ready_at),
                i64::try_from(request.delay.as_millis()).unwrap_or(i64::MAX),
                request.priority,
                request.affinity,
            ],
        )?;
        Ok(())
    }

    fn pop_ready(&self, now: DateTime<Utc>) -> Result<Option<ExecutionRequest>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let row = tx
            .query_row(
                "SELECT seq, id, payload, ready_at, delay_ms, priority, affinity
                 FROM execution_queue
                 WHERE ready_at <= ?1
                 ORDER BY priority DESC, ready_at ASC, delay_ms ASC, seq ASC
                 LIMIT 1",
                params![micros(now)],
                |r| {
                    Ok(QueueRow {
                        seq: r.get(0)?,
                        id: r.get(1)?,
                        payload: r.get(2)?,
                        ready_at: r.get(3)?,
                        delay_ms: r.get(4)?,
                        priority: r.get(5)?,
                        affinity: r.get(6)?,
                    })
                },
            )
            .optional()?;

        let Some(row) = row else {
            tx.commit()?;
            return Ok(None);
        };

        // Undecodable rows stay queued; dropping `tx` rolls back.
        let seq = row.seq;
        let request = row.into_request()?;

        tx.execute("DELETE FROM execution_queue WHERE seq = ?1", params![seq])?;
        tx.commit()?;

        Ok(Some(request))
    }

    fn queued_count(&self) -> Result<usize> {
        let count: i64 =
            self.conn()?
                .query_row("SELECT COUNT(*) FROM execution_queue", [], |r| r.get(0))?;
        Ok(count.max(0) as usize)
    }
}

impl LockStore for SqliteStore {
    fn insert_lock_if_absent(&self, lock: &Lock, now: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Expired rows count as absent.
        tx.execute(
            "DELETE FROM locks WHERE name = ?1 AND expiry <= ?2",
            params![lock.name, micros(now)],
        )?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO locks (name, owner, expiry, proc_info) VALUES (?1, ?2, ?3, ?4)",
            params![lock.name, lock.owner, micros(lock.expiry), lock.proc_info],
        )?;
        tx.commit()?;

        Ok(inserted == 1)
    }

    fn delete_lock(&self, name: &str, owner: &str) -> Result<bool> {
        let deleted = self.conn()?.execute(
            "DELETE FROM locks WHERE name = ?1 AND owner = ?2",
            params![name, owner],
        )?;
        Ok(deleted > 0)
    }

    fn live_lock(&self, name: &str, now: DateTime<Utc>) -> Result<Option<Lock>> {
        let row = self
            .conn()?
            .query_row(
                "SELECT name, owner, expiry, proc_info FROM locks WHERE name = ?1 AND expiry > ?2",
                params![name, micros(now)],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, i64>(2)?,
                        r.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((name, owner, expiry, proc_info)) => Ok(Some(Lock {
                name,
                owner,
                expiry: from_micros(expiry)?,
                proc_info,
            })),
            None => Ok(None),
        }
    }

    fn purge_expired_locks(&self, now: DateTime<Utc>) -> Result<usize> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM locks WHERE expiry <= ?1", params![micros(now)])?;
        Ok(deleted)
    }
}

impl LiveActionStore for SqliteStore {
    fn insert_liveaction(&self, liveaction: &LiveAction) -> Result<()> {
        let record = serde_json::to_string(liveaction)?;
        self.conn()?.execute(
            "INSERT INTO liveactions (id, action, status, start_timestamp, end_timestamp, record)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                liveaction.id,
                liveaction.action,
                liveaction.status.as_str(),
                micros(liveaction.start_timestamp),
                liveaction.end_timestamp.map(micros),
                record,
            ],
        )?;
        Ok(())
    }

    fn get_liveaction(&self, id: &str) -> Result<Option<LiveAction>> {
        let record: Option<String> = self
            .conn()?
            .query_row(
                "SELECT record FROM liveactions WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?;

        match record {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn update_liveaction(&self, liveaction: &LiveAction) -> Result<()> {
        let record = serde_json::to_string(liveaction)?;
        self.conn()?.execute(
            "INSERT INTO liveactions (id, action, status, start_timestamp, end_timestamp, record)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                action = excluded.action,
                status = excluded.status,
                start_timestamp = excluded.start_timestamp,
                end_timestamp = excluded.end_timestamp,
                record = excluded.record",
            params![
                liveaction.id,
                liveaction.action,
                liveaction.status.as_str(),
                micros(liveaction.start_timestamp),
                liveaction.end_timestamp.map(micros),
                record,
            ],
        )?;
        Ok(())
    }

    fn query_liveactions(
        &self,
        status: ExecutionStatus,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<LiveAction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT record FROM liveactions
             WHERE status = ?1 AND start_timestamp <= ?2
             ORDER BY start_timestamp ASC, id ASC",
        )?;
        let records = stmt
            .query_map(params![status.as_str(), micros(started_before)], |r| {
                r.get::<_, String>(0)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        records
            .iter()
            .map(|json| serde_json::from_str(json).map_err(RunqError::from))
            .collect()
    }

    fn count_liveactions(&self, action: &str, statuses: &[ExecutionStatus]) -> Result<usize> {
        let conn = self.conn()?;
        let mut total = 0usize;
        for status in statuses {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM liveactions WHERE action = ?1 AND status = ?2",
                params![action, status.as_str()],
                |r| r.get(0),
            )?;
            total += count.max(0) as usize;
        }
        Ok(total)
    }

    fn purge_liveactions(&self, cutoff: DateTime<Utc>, include_incomplete: bool) -> Result<usize> {
        let conn = self.conn()?;
        let cutoff = micros(cutoff);

        if include_incomplete {
            let deleted = conn.execute(
                "DELETE FROM liveactions WHERE start_timestamp < ?1",
                params![cutoff],
            )?;
            return Ok(deleted);
        }

        let mut deleted = 0usize;
        for status in ExecutionStatus::COMPLETED {
            deleted += conn.execute(
                "DELETE FROM liveactions
                 WHERE status = ?1 AND start_timestamp < ?2
                   AND end_timestamp IS NOT NULL AND end_timestamp < ?2",
                params![status.as_str(), cutoff],
            )?;
        }
        Ok(deleted)
    }
}
