//! The storage module provides database operations for scheduled extraction
//! tasks and their run history using SQLite.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use url::Url;
use uuid::Uuid;

use crate::selector::FieldDescriptor;

/// Storage provides database operations for tasks and task runs.
pub struct Storage {
    /// The underlying SQLite connection wrapped in Arc<Mutex<>> to make it thread-safe
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    /// Creates a new Storage instance with a database at the specified path.
    ///
    /// Pass `:memory:` for a throwaway in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized
    pub fn new(database_path: &str) -> Result<Self> {
        let conn = Connection::open(database_path)
            .with_context(|| format!("Unable to open database {database_path}"))?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Initializes the tasks and task_runs tables if they don't exist.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS tasks (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    source_url TEXT NOT NULL,
                    fields TEXT NOT NULL,
                    selectors TEXT NULL,
                    created_at INTEGER NOT NULL,
                    enabled INTEGER NOT NULL DEFAULT 1
                );
                CREATE TABLE IF NOT EXISTS task_runs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    task_id TEXT NOT NULL,
                    ran_at INTEGER NOT NULL,
                    success INTEGER NOT NULL,
                    total INTEGER NOT NULL,
                    error TEXT NULL,
                    rows TEXT NOT NULL
                );
            "#,
        )?;

        Ok(())
    }

    /// Inserts a new task.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is already taken or the database operation fails
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned
    pub fn add_task(&self, task: &Task) -> Result<()> {
        let fields = serde_json::to_string(&task.fields)?;
        let selectors = task
            .selectors
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.conn.lock().expect("Storage mutex poisoned");
        conn.execute(
            "INSERT INTO tasks (id, name, source_url, fields, selectors, created_at, enabled) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                task.id,
                task.name,
                task.source_url.as_str(),
                fields,
                selectors,
                task.created_at.timestamp(),
                task.enabled
            ],
        )
        .with_context(|| format!("Unable to store task {}", task.id))?;

        Ok(())
    }

    /// Returns all tasks, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or a stored task is corrupt
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned
    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        let conn = self.conn.lock().expect("Storage mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, name, source_url, fields, selectors, created_at, enabled FROM tasks ORDER BY created_at ASC, id ASC",
        )?;
        let rows: Result<Vec<TaskRow>, rusqlite::Error> =
            stmt.query_map([], TaskRow::from_row)?.collect();

        rows?.into_iter().map(Task::try_from).collect()
    }

    /// Gets a task by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or the stored task is corrupt
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned
    pub fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let conn = self.conn.lock().expect("Storage mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, name, source_url, fields, selectors, created_at, enabled FROM tasks WHERE id = ?1",
        )?;
        let task_row = stmt
            .query_row([id], TaskRow::from_row)
            .optional()
            .map_err(|e| anyhow::anyhow!("Unable to fetch task row: {e}"))?;

        task_row.map(Task::try_from).transpose()
    }

    /// Removes a task together with its run history.
    ///
    /// Returns `false` when no task has this id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned
    pub fn remove_task(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("Storage mutex poisoned");
        conn.execute("DELETE FROM task_runs WHERE task_id = ?1", params![id])?;
        let removed = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    /// Enables or disables a task. Returns `false` when no task has this id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned
    pub fn set_task_enabled(&self, id: &str, enabled: bool) -> Result<bool> {
        let conn = self.conn.lock().expect("Storage mutex poisoned");
        let updated = conn.execute(
            "UPDATE tasks SET enabled = ?1 WHERE id = ?2",
            params![enabled, id],
        )?;
        Ok(updated > 0)
    }

    /// Appends a run to the history.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned
    pub fn record_run(&self, run: &TaskRun) -> Result<()> {
        let total = i64::try_from(run.total).context("Row count does not fit the database")?;
        let conn = self.conn.lock().expect("Storage mutex poisoned");
        conn.execute(
            "INSERT INTO task_runs (task_id, ran_at, success, total, error, rows) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run.task_id,
                run.ran_at.timestamp(),
                run.success,
                total,
                run.error.as_deref(),
                run.rows
            ],
        )?;

        Ok(())
    }

    /// Gets the most recent runs, newest first, optionally for one task only.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned
    pub fn list_runs(&self, task_id: Option<&str>, limit: u32) -> Result<Vec<TaskRun>> {
        let conn = self.conn.lock().expect("Storage mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT task_id, ran_at, success, total, error, rows FROM task_runs
             WHERE ?1 IS NULL OR task_id = ?1
             ORDER BY ran_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![task_id, limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut runs = Vec::new();
        for row in rows {
            let (task_id, ran_at, success, total, error, rows) = row?;
            runs.push(TaskRun {
                task_id,
                ran_at: DateTime::from_timestamp_secs(ran_at)
                    .context("Unable to initialize ran_at from database")?,
                success,
                total: usize::try_from(total).unwrap_or_default(),
                error,
                rows,
            });
        }

        Ok(runs)
    }
}

/// Represents a task stored in the database
#[derive(Debug)]
pub struct TaskRow {
    pub id: String,
    pub name: String,
    pub source_url: String,
    pub fields: String,
    pub selectors: Option<String>,
    pub created_at: i64,
    pub enabled: bool,
}

impl TaskRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(TaskRow {
            id: row.get(0)?,
            name: row.get(1)?,
            source_url: row.get(2)?,
            fields: row.get(3)?,
            selectors: row.get(4)?,
            created_at: row.get(5)?,
            enabled: row.get(6)?,
        })
    }
}

/// A page to extract from on demand, with the fields wanted from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Eight hex characters
    pub id: String,
    pub name: String,
    pub source_url: Url,
    /// Field names handed to the model when no selectors are pinned
    pub fields: Vec<String>,
    /// Selectors to use instead of asking the model
    pub selectors: Option<Vec<FieldDescriptor>>,
    pub created_at: DateTime<Utc>,
    pub enabled: bool,
}

impl Task {
    /// Creates an enabled task with a fresh id.
    pub fn new(
        name: impl Into<String>,
        source_url: Url,
        fields: Vec<String>,
        selectors: Option<Vec<FieldDescriptor>>,
    ) -> Self {
        Task {
            id: task_id(),
            name: name.into(),
            source_url,
            fields,
            selectors,
            created_at: Utc::now(),
            enabled: true,
        }
    }
}

/// Short task id: the first 8 hex digits of a random UUID.
fn task_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    uuid.get(..8).unwrap_or(&uuid).to_owned()
}

impl TryFrom<TaskRow> for Task {
    type Error = anyhow::Error;

    fn try_from(task_row: TaskRow) -> Result<Self> {
        Ok(Task {
            source_url: Url::parse(&task_row.source_url)
                .with_context(|| format!("Invalid source URL of task {}", task_row.id))?,
            fields: serde_json::from_str(&task_row.fields)
                .with_context(|| format!("Invalid fields of task {}", task_row.id))?,
            selectors: task_row
                .selectors
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .with_context(|| format!("Invalid selectors of task {}", task_row.id))?,
            created_at: DateTime::from_timestamp_secs(task_row.created_at)
                .context("Unable to initialize created_at from database")?,
            enabled: task_row.enabled,
            id: task_row.id,
            name: task_row.name,
        })
    }
}

/// One execution of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRun {
    pub task_id: String,
    pub ran_at: DateTime<Utc>,
    pub success: bool,
    /// Number of extracted rows
    pub total: usize,
    pub error: Option<String>,
    /// Extracted rows as a JSON array
    pub rows: String,
}
