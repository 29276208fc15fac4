use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use tokio_rusqlite::Connection;

use crate::types::{ReviewUnit, Task, TaskId, Worker, WorkerId};

/// Async SQLite journal of tasks, workers and review units.
///
/// The scheduler writes every changed record after commit and reads the
/// whole journal back on startup.
pub struct CacheDb {
    conn: Connection,
}

// ---------------------------------------------------------------------------
// helpers – enum / json / time <-> SQLite text
// ---------------------------------------------------------------------------

fn enum_to_sql<T: serde::Serialize>(val: &T) -> String {
    serde_json::to_value(val)
        .ok()
        .and_then(|v| v.as_str().map(str::to_owned))
        .unwrap_or_default()
}

fn enum_from_sql<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn json_to_sql<T: serde::Serialize>(val: &T) -> String {
    serde_json::to_string(val).unwrap_or_else(|_| "null".to_string())
}

fn json_from_sql<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn time_from_sql(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

impl CacheDb {
    /// Open (or create) a database at the given file path.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, tokio_rusqlite::Error> {
        let conn = Connection::open(path.as_ref()).await?;
        let db = Self { conn };
        db.init_schema().await?;
        Ok(db)
    }

    /// Create a purely in-memory database (useful for tests).
    pub async fn new_in_memory() -> Result<Self, tokio_rusqlite::Error> {
        let conn = Connection::open_in_memory().await?;
        let db = Self { conn };
        db.init_schema().await?;
        Ok(db)
    }

    // -----------------------------------------------------------------------
    // Schema
    // -----------------------------------------------------------------------

    async fn init_schema(&self) -> Result<(), tokio_rusqlite::Error> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA busy_timeout=5000;

                    CREATE TABLE IF NOT EXISTS tasks (
                        id              TEXT PRIMARY KEY,
                        title           TEXT NOT NULL,
                        body            TEXT NOT NULL,
                        priority        TEXT NOT NULL,
                        size            TEXT NOT NULL,
                        status          TEXT NOT NULL,
                        repository      TEXT,
                        dependencies    TEXT NOT NULL,
                        estimated_files TEXT NOT NULL,
                        tags            TEXT NOT NULL,
                        labels          TEXT NOT NULL,
                        assigned_worker TEXT,
                        retry_count     INTEGER NOT NULL DEFAULT 0,
                        last_error      TEXT,
                        ingest_seq      INTEGER NOT NULL,
                        created_at      TEXT NOT NULL,
                        updated_at      TEXT NOT NULL
                    );

                    CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);

                    CREATE TABLE IF NOT EXISTS workers (
                        id              TEXT PRIMARY KEY,
                        status          TEXT NOT NULL,
                        current_task    TEXT,
                        last_heartbeat  TEXT NOT NULL,
                        specialization  TEXT,
                        registered_at   TEXT NOT NULL,
                        tasks_completed INTEGER NOT NULL DEFAULT 0
                    );

                    CREATE TABLE IF NOT EXISTS review_units (
                        task_id    TEXT PRIMARY KEY,
                        state      TEXT NOT NULL,
                        url        TEXT,
                        created_at TEXT NOT NULL,
                        updated_at TEXT NOT NULL
                    );
                    ",
                )?;
                Ok(())
            })
            .await
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    pub async fn upsert_task(&self, task: &Task) -> Result<(), tokio_rusqlite::Error> {
        let id = task.id.to_string();
        let title = task.title.clone();
        let body = task.body.clone();
        let priority = enum_to_sql(&task.priority);
        let size = enum_to_sql(&task.size);
        let status = enum_to_sql(&task.status);
        let repository = task.repository.clone();
        let dependencies = json_to_sql(&task.dependencies);
        let estimated_files = json_to_sql(&task.estimated_files);
        let tags = json_to_sql(&task.tags);
        let labels = json_to_sql(&task.labels);
        let assigned_worker = task.assigned_worker.as_ref().map(|w| w.to_string());
        let retry_count = task.retry_count as i64;
        let last_error = task.last_error.clone();
        let ingest_seq = task.ingest_seq as i64;
        let created_at = task.created_at.to_rfc3339();
        let updated_at = task.updated_at.to_rfc3339();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO tasks (id, title, body, priority, size, status, repository,
                        dependencies, estimated_files, tags, labels, assigned_worker,
                        retry_count, last_error, ingest_seq, created_at, updated_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)
                     ON CONFLICT(id) DO UPDATE SET
                        title=excluded.title, body=excluded.body, priority=excluded.priority,
                        size=excluded.size, status=excluded.status,
                        repository=excluded.repository, dependencies=excluded.dependencies,
                        estimated_files=excluded.estimated_files, tags=excluded.tags,
                        labels=excluded.labels, assigned_worker=excluded.assigned_worker,
                        retry_count=excluded.retry_count, last_error=excluded.last_error,
                        ingest_seq=excluded.ingest_seq, created_at=excluded.created_at,
                        updated_at=excluded.updated_at",
                    rusqlite::params![
                        id,
                        title,
                        body,
                        priority,
                        size,
                        status,
                        repository,
                        dependencies,
                        estimated_files,
                        tags,
                        labels,
                        assigned_worker,
                        retry_count,
                        last_error,
                        ingest_seq,
                        created_at,
                        updated_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, tokio_rusqlite::Error> {
        let id_str = id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!("{TASK_COLUMNS} WHERE id = ?1"))?;
                let mut rows = stmt.query(rusqlite::params![id_str])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_task(row)?)),
                    None => Ok(None),
                }
            })
            .await
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>, tokio_rusqlite::Error> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!("{TASK_COLUMNS} ORDER BY ingest_seq"))?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_task(row)?);
                }
                Ok(out)
            })
            .await
    }

    pub async fn delete_task(&self, id: &TaskId) -> Result<(), tokio_rusqlite::Error> {
        let id_str = id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM tasks WHERE id = ?1", rusqlite::params![id_str])?;
                Ok(())
            })
            .await
    }

    // -----------------------------------------------------------------------
    // Workers
    // -----------------------------------------------------------------------

    pub async fn upsert_worker(&self, worker: &Worker) -> Result<(), tokio_rusqlite::Error> {
        let id = worker.id.to_string();
        let status = enum_to_sql(&worker.status);
        let current_task = worker.current_task.as_ref().map(|t| t.to_string());
        let last_heartbeat = worker.last_heartbeat.to_rfc3339();
        let specialization = worker.specialization.as_ref().map(json_to_sql);
        let registered_at = worker.registered_at.to_rfc3339();
        let tasks_completed = worker.tasks_completed as i64;

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO workers (id, status, current_task, last_heartbeat,
                        specialization, registered_at, tasks_completed)
                     VALUES (?1,?2,?3,?4,?5,?6,?7)
                     ON CONFLICT(id) DO UPDATE SET
                        status=excluded.status, current_task=excluded.current_task,
                        last_heartbeat=excluded.last_heartbeat,
                        specialization=excluded.specialization,
                        tasks_completed=excluded.tasks_completed",
                    rusqlite::params![
                        id,
                        status,
                        current_task,
                        last_heartbeat,
                        specialization,
                        registered_at,
                        tasks_completed,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn list_workers(&self) -> Result<Vec<Worker>, tokio_rusqlite::Error> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, status, current_task, last_heartbeat, specialization,
                            registered_at, tasks_completed
                     FROM workers ORDER BY id",
                )?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_worker(row)?);
                }
                Ok(out)
            })
            .await
    }

    pub async fn delete_worker(&self, id: &WorkerId) -> Result<(), tokio_rusqlite::Error> {
        let id_str = id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM workers WHERE id = ?1", rusqlite::params![id_str])?;
                Ok(())
            })
            .await
    }

    // -----------------------------------------------------------------------
    // Review units
    // -----------------------------------------------------------------------

    pub async fn upsert_review_unit(&self, unit: &ReviewUnit) -> Result<(), tokio_rusqlite::Error> {
        let task_id = unit.task_id.to_string();
        let state = enum_to_sql(&unit.state);
        let url = unit.url.clone();
        let created_at = unit.created_at.to_rfc3339();
        let updated_at = unit.updated_at.to_rfc3339();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO review_units (task_id, state, url, created_at, updated_at)
                     VALUES (?1,?2,?3,?4,?5)
                     ON CONFLICT(task_id) DO UPDATE SET
                        state=excluded.state, url=excluded.url,
                        updated_at=excluded.updated_at",
                    rusqlite::params![task_id, state, url, created_at, updated_at],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn list_review_units(&self) -> Result<Vec<ReviewUnit>, tokio_rusqlite::Error> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT task_id, state, url, created_at, updated_at
                     FROM review_units ORDER BY created_at",
                )?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_review_unit(row)?);
                }
                Ok(out)
            })
            .await
    }

    pub async fn delete_review_unit(&self, task_id: &TaskId) -> Result<(), tokio_rusqlite::Error> {
        let id_str = task_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM review_units WHERE task_id = ?1",
                    rusqlite::params![id_str],
                )?;
                Ok(())
            })
            .await
    }
}

// ---------------------------------------------------------------------------
// Row mapping helpers
// ---------------------------------------------------------------------------

const TASK_COLUMNS: &str = "SELECT id, title, body, priority, size, status, repository,
        dependencies, estimated_files, tags, labels, assigned_worker, retry_count,
        last_error, ingest_seq, created_at, updated_at
    FROM tasks";

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let id: String = row.get(0)?;
    let priority: String = row.get(3)?;
    let size: String = row.get(4)?;
    let status: String = row.get(5)?;
    let dependencies: String = row.get(7)?;
    let estimated_files: String = row.get(8)?;
    let tags: String = row.get(9)?;
    let labels: String = row.get(10)?;
    let assigned_worker: Option<String> = row.get(11)?;
    let retry_count: i64 = row.get(12)?;
    let ingest_seq: i64 = row.get(14)?;
    let created_at: String = row.get(15)?;
    let updated_at: String = row.get(16)?;

    Ok(Task {
        id: TaskId::new(id),
        title: row.get(1)?,
        body: row.get(2)?,
        priority: enum_from_sql(3, &priority)?,
        size: enum_from_sql(4, &size)?,
        status: enum_from_sql(5, &status)?,
        repository: row.get(6)?,
        dependencies: json_from_sql(7, &dependencies)?,
        estimated_files: json_from_sql(8, &estimated_files)?,
        tags: json_from_sql(9, &tags)?,
        labels: json_from_sql(10, &labels)?,
        assigned_worker: assigned_worker.map(WorkerId::new),
        retry_count: retry_count as u32,
        last_error: row.get(13)?,
        ingest_seq: ingest_seq as u64,
        created_at: time_from_sql(15, &created_at)?,
        updated_at: time_from_sql(16, &updated_at)?,
    })
}

fn row_to_worker(row: &rusqlite::Row<'_>) -> rusqlite::Result<Worker> {
    let id: String = row.get(0)?;
    let status: String = row.get(1)?;
    let current_task: Option<String> = row.get(2)?;
    let last_heartbeat: String = row.get(3)?;
    let specialization: Option<String> = row.get(4)?;
    let registered_at: String = row.get(5)?;
    let tasks_completed: i64 = row.get(6)?;

    Ok(Worker {
        id: WorkerId::new(id),
        status: enum_from_sql(1, &status)?,
        current_task: current_task.map(TaskId::new),
        last_heartbeat: time_from_sql(3, &last_heartbeat)?,
        specialization: specialization
            .map(|s| json_from_sql(4, &s))
            .transpose()?,
        registered_at: time_from_sql(5, &registered_at)?,
        tasks_completed: tasks_completed as u64,
    })
}

fn row_to_review_unit(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReviewUnit> {
    let task_id: String = row.get(0)?;
    let state: String = row.get(1)?;
    let created_at: String = row.get(3)?;
    let updated_at: String = row.get(4)?;

    Ok(ReviewUnit {
        task_id: TaskId::new(task_id),
        state: enum_from_sql(1, &state)?,
        url: row.get(2)?,
        created_at: time_from_sql(3, &created_at)?,
        updated_at: time_from_sql(4, &updated_at)?,
    })
}
