use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::error::{MirrorError, Result};

use super::store::Replica;

/// The job types the queue knows about.
///
/// `ProcessLayer` and `MigrateMap` appear in snapshots produced by the
/// full map server; this engine never drains them but must round-trip
/// them unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkKind {
    MirrorLayer,
    MirrorPaperMap,
    UnpackLayer,
    ProcessLayer,
    MigrateMap,
}

impl WorkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkKind::MirrorLayer => "MirrorLayer",
            WorkKind::MirrorPaperMap => "MirrorPaperMap",
            WorkKind::UnpackLayer => "UnpackLayer",
            WorkKind::ProcessLayer => "ProcessLayer",
            WorkKind::MigrateMap => "MigrateMap",
        }
    }

    fn parse(value: &str) -> rusqlite::Result<Self> {
        match value {
            "MirrorLayer" => Ok(WorkKind::MirrorLayer),
            "MirrorPaperMap" => Ok(WorkKind::MirrorPaperMap),
            "UnpackLayer" => Ok(WorkKind::UnpackLayer),
            "ProcessLayer" => Ok(WorkKind::ProcessLayer),
            "MigrateMap" => Ok(WorkKind::MigrateMap),
            other => Err(rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("unknown work kind '{other}'").into(),
            )),
        }
    }
}

/// Lifecycle of a work item. Transitions are monotonic:
/// `Pending -> Processing -> {Done | Pending}`. A failure returns the
/// row to Pending with its error recorded, so the row is never
/// silently discarded; only a later drain pass (or an operator
/// clearing the error) touches it again. `Failed` is a parking state
/// used by operator tooling, never entered by the drain loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkState {
    Pending,
    Processing,
    Done,
    Failed,
}

impl WorkState {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkState::Pending => "Pending",
            WorkState::Processing => "Processing",
            WorkState::Done => "Done",
            WorkState::Failed => "Failed",
        }
    }

    fn parse(value: &str) -> rusqlite::Result<Self> {
        match value {
            "Pending" => Ok(WorkState::Pending),
            "Processing" => Ok(WorkState::Processing),
            "Done" => Ok(WorkState::Done),
            "Failed" => Ok(WorkState::Failed),
            other => Err(rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("unknown work state '{other}'").into(),
            )),
        }
    }
}

/// One persisted background job
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: i64,
    pub kind: WorkKind,
    pub state: WorkState,
    /// Job-type-specific JSON payload
    pub data: String,
    pub created_utc: DateTime<Utc>,
    pub started_utc: Option<DateTime<Utc>>,
    pub finished_utc: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub target_entity_id: Option<i64>,
}

/// The persisted background work queue, stored in the replica database.
///
/// FIFO by insertion. No lease or claim column: at most one drainer may
/// run against a given replica at a time.
pub struct WorkQueue<'a> {
    conn: &'a Connection,
}

impl Replica {
    pub fn queue(&self) -> WorkQueue<'_> {
        WorkQueue {
            conn: self.connection(),
        }
    }
}

impl WorkQueue<'_> {
    /// Enqueue a new Pending job. Returns the work item id.
    pub fn enqueue(&self, kind: WorkKind, target_entity_id: i64, data: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO work_items (kind, state, data, created_utc, target_entity_id)
             VALUES (?1, 'Pending', ?2, ?3, ?4)",
            params![kind.as_str(), data, Utc::now(), target_entity_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All Pending items of one kind, in insertion order.
    pub fn pending(&self, kind: WorkKind) -> Result<Vec<WorkItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, state, data, created_utc, started_utc, finished_utc, error, target_entity_id
             FROM work_items WHERE state = 'Pending' AND kind = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([kind.as_str()], Self::row_to_item)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn pending_count(&self) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM work_items WHERE state = 'Pending'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Pending rows carrying an error from an earlier drain attempt.
    pub fn errored_count(&self) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM work_items WHERE state = 'Pending' AND error IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Pending -> Processing. Rejects any other starting state so the
    /// state machine stays monotonic.
    pub fn mark_processing(&self, id: i64) -> Result<()> {
        self.transition(
            id,
            "UPDATE work_items SET state = 'Processing', started_utc = ?2
             WHERE id = ?1 AND state = 'Pending'",
        )
    }

    /// Processing -> Done.
    pub fn mark_done(&self, id: i64) -> Result<()> {
        self.transition(
            id,
            "UPDATE work_items SET state = 'Done', finished_utc = ?2
             WHERE id = ?1 AND state = 'Processing'",
        )
    }

    /// Processing -> Pending, recording the error on the row. The row
    /// stays non-terminal so the next drain pass picks it up again;
    /// nothing is ever silently discarded.
    pub fn mark_failed(&self, id: i64, error: &str) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE work_items SET state = 'Pending', started_utc = NULL,
                                   finished_utc = ?2, error = ?3
             WHERE id = ?1 AND state = 'Processing'",
            params![id, Utc::now(), error],
        )?;
        if updated == 0 {
            return Err(MirrorError::Structural(format!(
                "invalid state transition for work item {id}"
            )));
        }
        Ok(())
    }

    /// Put rows left Processing by an interrupted run back in line.
    /// Safe because at most one drainer runs per replica; a row that is
    /// Processing when no drain is active can only be a crash leftover.
    pub fn reset_processing(&self) -> Result<usize> {
        Ok(self.conn.execute(
            "UPDATE work_items SET state = 'Pending', started_utc = NULL
             WHERE state = 'Processing'",
            [],
        )?)
    }

    /// Operator action: clear a recorded error and put a parked
    /// (Failed) row back in line. The only retry mechanism - the
    /// engine itself never retries or backs off.
    pub fn retry(&self, id: i64) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE work_items SET state = 'Pending', error = NULL,
                                   started_utc = NULL, finished_utc = NULL
             WHERE id = ?1 AND state IN ('Failed', 'Pending')",
            params![id],
        )?;
        if updated == 0 {
            return Err(MirrorError::Structural(format!(
                "work item {id} is not in a retryable state"
            )));
        }
        Ok(())
    }

    /// Remove completed rows. Failed and Pending rows survive so a
    /// later drain pass (or an operator) can deal with them.
    pub fn prune_done(&self) -> Result<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM work_items WHERE state = 'Done'", [])?)
    }

    fn transition(&self, id: i64, sql: &str) -> Result<()> {
        let updated = self.conn.execute(sql, params![id, Utc::now()])?;
        if updated == 0 {
            return Err(MirrorError::Structural(format!(
                "invalid state transition for work item {id}"
            )));
        }
        Ok(())
    }

    fn row_to_item(row: &Row) -> rusqlite::Result<WorkItem> {
        Ok(WorkItem {
            id: row.get(0)?,
            kind: WorkKind::parse(&row.get::<_, String>(1)?)?,
            state: WorkState::parse(&row.get::<_, String>(2)?)?,
            data: row.get(3)?,
            created_utc: row.get(4)?,
            started_utc: row.get(5)?,
            finished_utc: row.get(6)?,
            error: row.get(7)?,
            target_entity_id: row.get(8)?,
        })
    }
}
