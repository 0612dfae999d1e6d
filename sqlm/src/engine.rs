///
/// # Engine Contract
///
/// The handle talks to the database engine only through the `Engine` trait:
/// compile a statement list once, execute the compiled form with positional
/// parameters inside an optional transaction context, and close the
/// underlying handle. `SqliteEngine` implements it over rusqlite with
/// bundled SQLite.
///
/// ## SQLite Binding
///
/// - Compiling splits the text into individual statements on top-level `;`
///   (quoted strings, quoted/bracketed identifiers and comments are skipped)
///   and prepares the first one so syntax errors surface early.
/// - Executing runs each statement through rusqlite's prepared-statement
///   cache. Parameters `?1..?N` bind from one shared slice; extra values are
///   ignored, missing ones are an error.
/// - Statements that produce columns return one materialized `RowSet` each.
///
/// Only the first statement of a list is prepared by `compile`. Later ones
/// may name tables an earlier statement creates, so they are prepared when
/// they run. A syntax error further down a list therefore surfaces from
/// `execute`, after the statements before it have taken effect, and the list
/// stays in the handle's statement cache.
///
/// Statements containing their own `;` inside a body (for example
/// `CREATE TRIGGER … BEGIN … END`) are not supported by the splitter.
///

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags};
use tracing::{trace, warn};

use crate::config::DbOptions;
use crate::errors::DbError;
use crate::value::Value;

/// Context of the transaction a statement runs in. Only present while the
/// nesting depth is above zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxContext {
    id: u64,
}

impl TxContext {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Materialized result of one row-producing statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Pulls rows in order until the callback returns `Ok(false)` or an error.
    pub fn each<F>(&self, mut f: F) -> Result<(), DbError>
    where
        F: FnMut(&[Value]) -> Result<bool, DbError>,
    {
        for row in &self.rows {
            if !f(row)? {
                break;
            }
        }
        Ok(())
    }
}

pub trait Engine {
    type Compiled: Clone;

    fn compile(&mut self, text: &str) -> Result<Self::Compiled, DbError>;

    fn execute(
        &mut self,
        ctx: Option<&TxContext>,
        compiled: &Self::Compiled,
        params: &[Value],
    ) -> Result<Vec<RowSet>, DbError>;

    fn close(&mut self) -> Result<(), DbError>;
}

/// Compiled form of a statement list for `SqliteEngine`.
#[derive(Debug, Clone)]
pub struct StatementList {
    statements: Arc<[String]>,
}

impl StatementList {
    pub fn statements(&self) -> &[String] {
        &self.statements
    }
}

pub struct SqliteEngine {
    conn: Option<Connection>,
}

impl SqliteEngine {
    pub fn new(conn: Connection) -> Self {
        Self { conn: Some(conn) }
    }

    pub fn open(path: &Path) -> Result<Self, DbError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        Ok(Self::new(Connection::open_with_flags(path, flags)?))
    }

    pub fn create(path: &Path) -> Result<Self, DbError> {
        Ok(Self::new(Connection::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    pub fn configure(&self, options: &DbOptions) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.set_prepared_statement_cache_capacity(options.statement_cache_capacity);
        if options.busy_timeout_ms > 0 {
            conn.busy_timeout(Duration::from_millis(options.busy_timeout_ms))?;
        }
        Ok(())
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.conn.as_ref()
    }

    fn conn(&self) -> Result<&Connection, DbError> {
        self.conn.as_ref().ok_or(DbError::Closed)
    }
}

impl Engine for SqliteEngine {
    type Compiled = StatementList;

    fn compile(&mut self, text: &str) -> Result<StatementList, DbError> {
        let statements = split_statements(text)?;
        let conn = self.conn()?;
        conn.prepare_cached(&statements[0])?;
        Ok(StatementList {
            statements: statements.into(),
        })
    }

    fn execute(
        &mut self,
        ctx: Option<&TxContext>,
        compiled: &StatementList,
        params: &[Value],
    ) -> Result<Vec<RowSet>, DbError> {
        let conn = self.conn()?;
        let mut results = Vec::new();

        for sql in compiled.statements() {
            trace!(tx = ctx.map(TxContext::id), sql = %sql, "executing");
            let mut stmt = conn.prepare_cached(sql)?;
            for index in 1..=stmt.parameter_count() {
                let value = params.get(index - 1).ok_or_else(|| DbError::MissingParameter {
                    index,
                    statement: sql.clone(),
                })?;
                stmt.raw_bind_parameter(index, to_sqlite(value))?;
            }

            if stmt.column_count() == 0 {
                stmt.raw_execute()?;
                continue;
            }

            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let width = columns.len();
            let mut rows = Vec::new();
            let mut cursor = stmt.raw_query();
            while let Some(row) = cursor.next()? {
                let mut values = Vec::with_capacity(width);
                for col in 0..width {
                    values.push(from_sqlite(row.get::<_, SqlValue>(col)?));
                }
                rows.push(values);
            }
            results.push(RowSet::new(columns, rows));
        }

        Ok(results)
    }

    fn close(&mut self) -> Result<(), DbError> {
        if let Some(conn) = self.conn.take() {
            if let Err((conn, e)) = conn.close() {
                warn!(error = %e, "failed to close connection");
                self.conn = Some(conn);
                return Err(e.into());
            }
        }
        Ok(())
    }
}

fn to_sqlite(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(r) => SqlValue::Real(*r),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Blob(b) => SqlValue::Blob(b.clone()),
    }
}

fn from_sqlite(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Integer(i),
        SqlValue::Real(r) => Value::Real(r),
        SqlValue::Text(s) => Value::Text(s),
        SqlValue::Blob(b) => Value::Blob(b),
    }
}

/// Splits a statement list on top-level semicolons. Each returned statement
/// keeps its terminating `;`.
pub fn split_statements(text: &str) -> Result<Vec<String>, DbError> {
    let syntax = |reason: &str| DbError::Syntax {
        statement: text.to_string(),
        reason: reason.to_string(),
    };

    let bytes = text.as_bytes();
    let mut statements = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => {
                i += 1;
                loop {
                    match bytes.get(i) {
                        None => return Err(syntax("unterminated quoted text")),
                        Some(&b) if b == quote => {
                            // A doubled quote is an escaped quote.
                            if bytes.get(i + 1) == Some(&quote) {
                                i += 2;
                            } else {
                                break;
                            }
                        }
                        Some(_) => i += 1,
                    }
                }
            }
            b'[' => match bytes[i..].iter().position(|&b| b == b']') {
                Some(len) => i += len,
                None => return Err(syntax("unterminated bracketed identifier")),
            },
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                match bytes[i..].iter().position(|&b| b == b'\n') {
                    Some(len) => i += len,
                    None => i = bytes.len(),
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => match text[i + 2..].find("*/") {
                Some(len) => i += len + 3,
                None => return Err(syntax("unterminated comment")),
            },
            b';' => {
                push_statement(&mut statements, &text[start..=i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    push_statement(&mut statements, &text[start..]);

    if statements.is_empty() {
        return Err(syntax("empty statement"));
    }
    Ok(statements)
}

fn push_statement(statements: &mut Vec<String>, piece: &str) {
    let trimmed = piece.trim();
    if trimmed.is_empty() || trimmed == ";" || is_comment_only(trimmed) {
        return;
    }
    statements.push(trimmed.to_string());
}

fn is_comment_only(piece: &str) -> bool {
    let mut rest = piece.trim_start();
    loop {
        if rest.is_empty() || rest == ";" {
            return true;
        }
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map_or("", |(_, tail)| tail).trim_start();
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map_or("", |(_, tail)| tail).trim_start();
        } else {
            return false;
        }
    }
}
