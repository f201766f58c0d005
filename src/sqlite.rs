use std::ops::ControlFlow;
use std::time::Duration;

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags, ToSql};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DbError;

/// Core value types for SQLite operations
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(v: ValueRef<'_>) -> Self {
        match v {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Real(f) => ToSqlOutput::from(*f),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Blob(b) => ToSqlOutput::from(b.as_slice()),
        })
    }
}

/// One result row, values kept in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Value at position 0, regardless of the column name.
    pub fn first(&self) -> Option<&Value> {
        self.values.first()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|idx| self.values.get(idx))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// How the database file is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    /// Read/write, creating the file when missing.
    #[default]
    Create,
    ReadWrite,
    ReadOnly,
}

impl OpenMode {
    pub fn flags(self) -> OpenFlags {
        let base = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        match self {
            OpenMode::Create => {
                base | OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            }
            OpenMode::ReadWrite => base | OpenFlags::SQLITE_OPEN_READ_WRITE,
            OpenMode::ReadOnly => base | OpenFlags::SQLITE_OPEN_READ_ONLY,
        }
    }
}

/// Largest busy timeout SQLite accepts; the driver takes it as an `i32`.
pub const MAX_BUSY_TIMEOUT_MS: u64 = i32::MAX as u64;

/// Driver options passed to [`crate::SqliteSupport::connect`].
///
/// An options value with nothing set counts as absent and is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ConnectOptions {
    pub open_mode: Option<OpenMode>,
    pub busy_timeout_ms: Option<u64>,
    pub foreign_keys: Option<bool>,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_open_mode(mut self, mode: OpenMode) -> Self {
        self.open_mode = Some(mode);
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.busy_timeout_ms = Some(ms.min(MAX_BUSY_TIMEOUT_MS));
        self
    }

    pub fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = Some(enabled);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.open_mode.is_none() && self.busy_timeout_ms.is_none() && self.foreign_keys.is_none()
    }

    /// Reject values the driver cannot take before anything is opened.
    pub fn validate(&self) -> Result<(), DbError> {
        match self.busy_timeout_ms {
            Some(ms) if ms > MAX_BUSY_TIMEOUT_MS => Err(DbError::Config(format!(
                "busy_timeout_ms {} out of range (max {})",
                ms, MAX_BUSY_TIMEOUT_MS
            ))),
            _ => Ok(()),
        }
    }
}

/// Positional parameters for the XML stored-procedure call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureBinds {
    pub internal_key: String,
    pub control_key: String,
    pub input_xml: String,
    /// A disconnect request produces no output rows.
    #[serde(default)]
    pub disconnect: bool,
}

impl ProcedureBinds {
    pub fn new(
        internal_key: impl Into<String>,
        control_key: impl Into<String>,
        input_xml: impl Into<String>,
    ) -> Self {
        Self {
            internal_key: internal_key.into(),
            control_key: control_key.into(),
            input_xml: input_xml.into(),
            disconnect: false,
        }
    }

    pub fn with_disconnect(mut self, disconnect: bool) -> Self {
        self.disconnect = disconnect;
        self
    }

    /// Bound as `?1`, `?2`, `?3`.
    pub fn positional(&self) -> [Value; 3] {
        [
            Value::Text(self.internal_key.clone()),
            Value::Text(self.control_key.clone()),
            Value::Text(self.input_xml.clone()),
        ]
    }
}

/// Anything that can run a statement and hand back rows one at a time.
pub trait RowSource {
    /// Run `statement` with `params`, calling `on_row` for each row until it
    /// returns `Break` or the rows run out.
    fn query_each(
        &self,
        statement: &str,
        params: &[Value],
        on_row: &mut dyn FnMut(Row) -> ControlFlow<()>,
    ) -> Result<(), DbError>;

    /// Run `statement` with `params` without reading any rows it produces.
    fn execute_only(&self, statement: &str, params: &[Value]) -> Result<(), DbError>;
}

/// Live SQLite session returned by [`crate::SqliteSupport::connect`].
#[derive(Debug)]
pub struct Session {
    conn: Connection,
    database: String,
}

impl Session {
    pub(crate) fn open(
        database: &str,
        path: &str,
        options: &ConnectOptions,
    ) -> Result<Self, DbError> {
        let connect_err = |source: rusqlite::Error| DbError::Connect {
            database: database.to_string(),
            source,
        };
        options.validate()?;
        let flags = options.open_mode.unwrap_or_default().flags();
        let conn = if path == MEMORY_PATH {
            Connection::open_in_memory_with_flags(flags)
        } else {
            Connection::open_with_flags(path, flags)
        }
        .map_err(connect_err)?;

        if let Some(ms) = options.busy_timeout_ms {
            conn.busy_timeout(Duration::from_millis(ms))
                .map_err(connect_err)?;
        }
        if let Some(enabled) = options.foreign_keys {
            conn.pragma_update(None, "foreign_keys", enabled)
                .map_err(connect_err)?;
        }

        Ok(Self {
            conn,
            database: database.to_string(),
        })
    }

    /// The locator this session was opened from.
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn close(self) -> Result<(), DbError> {
        let database = self.database;
        self.conn.close().map_err(|(_, source)| DbError::Connect { database, source })
    }

    fn prepare(&self, statement: &str) -> Result<rusqlite::Statement<'_>, DbError> {
        self.conn.prepare(statement).map_err(|source| DbError::Prepare {
            statement: statement.to_string(),
            source,
        })
    }
}

impl RowSource for Session {
    fn query_each(
        &self,
        statement: &str,
        params: &[Value],
        on_row: &mut dyn FnMut(Row) -> ControlFlow<()>,
    ) -> Result<(), DbError> {
        let mut stmt = self.prepare(statement)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let width = columns.len();

        debug!(statement, params = params.len(), "executing statement");
        let mut rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(|source| DbError::Execute { source })?;
        let mut fetched = 0usize;
        while let Some(row) = rows.next().map_err(|source| DbError::Execute { source })? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                let value = row
                    .get_ref(idx)
                    .map_err(|source| DbError::Execute { source })?;
                values.push(Value::from(value));
            }
            fetched += 1;
            if on_row(Row::new(columns.clone(), values)).is_break() {
                break;
            }
        }
        debug!(statement, rows = fetched, "statement finished");
        Ok(())
    }

    fn execute_only(&self, statement: &str, params: &[Value]) -> Result<(), DbError> {
        let mut stmt = self.prepare(statement)?;
        debug!(statement, params = params.len(), "executing statement without fetch");
        let mut rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(|source| DbError::Execute { source })?;
        // Step once so the statement actually runs; produced rows are discarded.
        if rows
            .next()
            .map_err(|source| DbError::Execute { source })?
            .is_some()
        {
            debug!(statement, "discarding rows from statement");
        }
        Ok(())
    }
}

pub(crate) const MEMORY_PATH: &str = ":memory:";

/// Split a locator into the path SQLite should open. Accepts `sqlite:<path>`,
/// a bare path, or `:memory:`.
pub(crate) fn database_path(database: &str) -> Result<&str, DbError> {
    let path = database.strip_prefix("sqlite:").unwrap_or(database).trim();
    if path.is_empty() {
        return Err(DbError::Config(format!(
            "database locator '{}' does not name a file",
            database
        )));
    }
    Ok(path)
}
