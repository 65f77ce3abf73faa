use crate::error::{MigrationError, Result};
use crate::sql::quote_ident;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Whether the store enforces declared foreign keys. Required in every
/// [`StoreConfig`]; there is no implicit default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForeignKeys {
    Enforced,
    Disabled,
}

impl ForeignKeys {
    pub fn is_enforced(self) -> bool {
        matches!(self, ForeignKeys::Enforced)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    #[default]
    Delete,
    Truncate,
    Wal,
    Memory,
}

impl JournalMode {
    fn pragma_value(self) -> &'static str {
        match self {
            JournalMode::Delete => "DELETE",
            JournalMode::Truncate => "TRUNCATE",
            JournalMode::Wal => "WAL",
            JournalMode::Memory => "MEMORY",
        }
    }
}

/// Everything needed to open the store. Passed to every open call instead of
/// toggling connection state after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub foreign_keys: ForeignKeys,
    #[serde(default)]
    pub journal_mode: JournalMode,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl StoreConfig {
    pub fn new<P: AsRef<Path>>(path: P, foreign_keys: ForeignKeys) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            foreign_keys,
            journal_mode: JournalMode::default(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// One row of `PRAGMA foreign_key_check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyViolation {
    pub table: String,
    pub rowid: Option<i64>,
    pub parent: String,
}

pub struct Store {
    conn: Connection,
    config: StoreConfig,
}

impl Store {
    pub fn open(config: &StoreConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&config.path, flags)?;
        let store = Self {
            conn,
            config: config.clone(),
        };
        store.apply_pragmas()?;
        info!(
            path = %config.path.display(),
            foreign_keys = ?config.foreign_keys,
            "Opened store"
        );
        Ok(store)
    }

    fn apply_pragmas(&self) -> Result<()> {
        let requested = self.config.foreign_keys.is_enforced();
        self.conn.execute_batch(&format!(
            "PRAGMA foreign_keys = {};",
            if requested { "ON" } else { "OFF" }
        ))?;
        self.conn.execute_batch(&format!(
            "PRAGMA journal_mode = {};",
            self.config.journal_mode.pragma_value()
        ))?;
        self.conn
            .busy_timeout(Duration::from_millis(self.config.busy_timeout_ms))?;

        let actual = self.foreign_keys_enforced()?;
        if actual != requested {
            return Err(MigrationError::ForeignKeySetting { requested, actual });
        }
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn foreign_keys_enforced(&self) -> Result<bool> {
        let on: i64 = self
            .conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        Ok(on == 1)
    }

    /// Runs one statement as its own unit of work and returns the number of
    /// rows it changed.
    pub fn execute_step(&self, step: &str, sql: &str) -> Result<usize> {
        debug!(step, "Executing statement");
        self.conn
            .execute(sql, [])
            .map_err(|e| MigrationError::from_sqlite(step, e))
    }

    pub fn execute_batch_step(&self, step: &str, sql: &str) -> Result<()> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| MigrationError::from_sqlite(step, e))
    }

    /// User tables, sorted by name.
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn column_names(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let names = stmt
            .query_map(params![table], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    pub fn row_count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    /// `ALTER TABLE ... ADD COLUMN`, treating an already-present column as
    /// success. Returns whether the column was added. Any other failure is
    /// returned unchanged.
    pub fn add_column_if_missing(&self, table: &str, column: &str, sql_type: &str) -> Result<bool> {
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_ident(table),
            quote_ident(column),
            sql_type
        );
        match self.conn.execute(&sql, []) {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(_, Some(ref message)))
                if message.starts_with("duplicate column name") =>
            {
                debug!(table, column, "Column already present");
                Ok(false)
            }
            Err(e) => Err(MigrationError::from_sqlite("add_column", e)),
        }
    }

    pub fn foreign_key_violations(&self) -> Result<Vec<ForeignKeyViolation>> {
        let mut stmt = self.conn.prepare("PRAGMA foreign_key_check")?;
        let violations = stmt
            .query_map([], |row| {
                Ok(ForeignKeyViolation {
                    table: row.get(0)?,
                    rowid: row.get(1)?,
                    parent: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(violations)
    }

    pub fn drop_table(&self, table: &str) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", quote_ident(table));
        self.execute_step("drop_table", &sql)?;
        Ok(())
    }
}
