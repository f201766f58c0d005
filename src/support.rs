use std::ops::ControlFlow;

use tracing::{debug, info, warn};

use crate::error::{DbError, ErrorState};
use crate::sqlite::{database_path, ConnectOptions, ProcedureBinds, Row, RowSource, Session};
use crate::xml::XmlAssembler;

/// Connection helper that also remembers the most recent failure.
///
/// Every operation returns a `Result`. The error state mirrors the last `Err`
/// handed out and is left untouched by successful calls.
#[derive(Debug, Default)]
pub struct SqliteSupport {
    last_error: Option<ErrorState>,
}

impl SqliteSupport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session on `database`. Fails without touching the filesystem
    /// when `options` is missing or empty.
    ///
    /// SQLite has no authentication, so `user` and `password` are accepted
    /// and ignored.
    pub fn connect(
        &mut self,
        database: &str,
        user: &str,
        _password: &str,
        options: Option<&ConnectOptions>,
    ) -> Result<Session, DbError> {
        let result = match options {
            Some(opts) if !opts.is_empty() => database_path(database)
                .and_then(|path| Session::open(database, path, opts)),
            _ => Err(DbError::Config(
                "connection options are required".to_string(),
            )),
        };
        let session = self.record(result)?;
        debug!(database, user, "session credentials accepted");
        info!(database, "opened database session");
        Ok(session)
    }

    /// Close `session`. Failures are logged, not returned.
    pub fn disconnect(&self, session: Session) {
        let database = session.database().to_string();
        match session.close() {
            Ok(()) => info!(database = %database, "closed database session"),
            Err(err) => warn!(database = %database, error = %err, "database session did not close cleanly"),
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        self.last_error.as_ref().map(|e| e.code.as_str())
    }

    pub fn error_message(&self) -> Option<&str> {
        self.last_error.as_ref().map(|e| e.message.as_str())
    }

    pub fn last_error(&self) -> Option<&ErrorState> {
        self.last_error.as_ref()
    }

    /// Run a parameterless statement and collect every row.
    pub fn execute_query<S>(&mut self, source: &S, statement: &str) -> Result<Vec<Row>, DbError>
    where
        S: RowSource + ?Sized,
    {
        let mut rows = Vec::new();
        let result = source.query_each(statement, &[], &mut |row: Row| {
            rows.push(row);
            ControlFlow::Continue(())
        });
        self.record(result)?;
        debug!(rows = rows.len(), "query materialized");
        Ok(rows)
    }

    /// Call a procedure that returns an XML document split over rows and
    /// stitch it back together.
    ///
    /// The three keys in `binds` are bound as `?1..?3`. For a disconnect
    /// request the statement runs but no rows are read and the output is empty.
    pub fn exec_xml_stored_procedure<S>(
        &mut self,
        source: &S,
        statement: &str,
        binds: &ProcedureBinds,
    ) -> Result<String, DbError>
    where
        S: RowSource + ?Sized,
    {
        let params = binds.positional();

        if binds.disconnect {
            let result = source.execute_only(statement, &params);
            self.record(result)?;
            return Ok(String::new());
        }

        let mut assembler = XmlAssembler::new();
        let result = source.query_each(statement, &params, &mut |row: Row| assembler.push_row(&row));
        self.record(result)?;
        Ok(assembler.finish())
    }

    fn record<T>(&mut self, result: Result<T, DbError>) -> Result<T, DbError> {
        if let Err(err) = &result {
            let state = err.error_state();
            warn!(code = %state.code, error = %err, "database operation failed");
            self.last_error = Some(state);
        }
        result
    }
}
