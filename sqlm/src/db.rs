///
/// # Database Handle
///
/// `Database` owns the engine handle together with everything derived from
/// it during the handle's life: the descriptor cache, the compiled statement
/// cache, the transaction tracker, the trace flag and the latched error.
///
/// ## Latched Errors
///
/// The first error of any operation is stored on the handle and every later
/// operation becomes a no-op until the caller clears it. Calls can therefore
/// be chained and checked once at the end:
///
/// ```rust,ignore
/// let mut db = Database::create(path)?;
/// db.table_create::<Member>().insert(&members).retrieve(&mut list, "ORDER BY name", params![]);
/// if let Some(err) = db.error() {
///     eprintln!("{err}");
/// }
/// ```
///
/// Internal rollbacks after a failed operation still reach the engine while
/// the error is latched; the first error is kept.
///
/// ## Single Caller
///
/// A handle is driven by one caller at a time. There is no internal locking
/// and every call runs synchronously until the engine returns.
///

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::DbOptions;
use crate::descriptor::{Descriptor, DescriptorCache};
use crate::engine::{Engine, RowSet, SqliteEngine};
use crate::errors::DbError;
use crate::record::Record;
use crate::statement::StatementCache;
use crate::transaction::{BeginStep, EndStep, TransactionTracker};
use crate::value::{Param, Value};

const BEGIN: &str = "BEGIN TRANSACTION;";
const COMMIT: &str = "COMMIT;";
const ROLLBACK: &str = "ROLLBACK;";

pub struct Database<E: Engine = SqliteEngine> {
    engine: Option<E>,
    descriptors: DescriptorCache,
    statements: StatementCache<E::Compiled>,
    transact: TransactionTracker,
    trace: bool,
    err: Option<DbError>,
}

impl Database<SqliteEngine> {
    /// Attaches to a connection that is already open.
    pub fn with_connection(conn: rusqlite::Connection) -> Self {
        Self::from_engine(SqliteEngine::new(conn))
    }

    /// Opens an existing database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        Self::open_with(path, &DbOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: &DbOptions) -> Result<Self, DbError> {
        let engine = SqliteEngine::open(path.as_ref())?;
        Self::configured(engine, options)
    }

    /// Creates a database file, replacing any existing one. Missing parent
    /// directories are created.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, DbError> {
        Self::create_with(path, &DbOptions::default())
    }

    pub fn create_with(path: impl AsRef<Path>, options: &DbOptions) -> Result<Self, DbError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let engine = SqliteEngine::create(path)?;
        Self::configured(engine, options)
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::configured(SqliteEngine::open_in_memory()?, &DbOptions::default())
    }

    fn configured(engine: SqliteEngine, options: &DbOptions) -> Result<Self, DbError> {
        engine.configure(options)?;
        let mut db = Self::from_engine(engine);
        db.trace = options.trace;
        Ok(db)
    }
}

impl<E: Engine> Database<E> {
    pub fn from_engine(engine: E) -> Self {
        Self {
            engine: Some(engine),
            descriptors: DescriptorCache::new(),
            statements: StatementCache::new(),
            transact: TransactionTracker::new(),
            trace: false,
            err: None,
        }
    }

    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn engine_mut(&mut self) -> Option<&mut E> {
        self.engine.as_mut()
    }

    /// Releases the engine handle. Later operations report `Closed`.
    pub fn close(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            if self.transact.depth() > 0 {
                warn!(depth = self.transact.depth(), "closing with an open transaction");
            }
            self.transact.reset();
            debug!(
                hits = self.statements.hits(),
                misses = self.statements.misses(),
                "closing database"
            );
            if let Err(e) = engine.close() {
                self.set_error(e);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.engine.is_none()
    }

    pub fn is_ok(&self) -> bool {
        self.err.is_none()
    }

    pub fn is_err(&self) -> bool {
        self.err.is_some()
    }

    pub fn error(&self) -> Option<&DbError> {
        self.err.as_ref()
    }

    pub fn result(&self) -> Result<(), &DbError> {
        match &self.err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Latches `err` unless an error is already latched.
    pub fn set_error(&mut self, err: DbError) {
        if self.err.is_none() {
            warn!(error = %err, "database error latched");
            self.err = Some(err);
        }
    }

    pub fn set_error_message(&mut self, message: impl Into<String>) {
        self.set_error(DbError::Message(message.into()));
    }

    pub fn clear_error(&mut self) {
        self.err = None;
    }

    pub fn take_error(&mut self) -> Option<DbError> {
        self.err.take()
    }

    /// Turns statement tracing on or off.
    pub fn set_trace(&mut self, on: bool) -> &mut Self {
        if self.err.is_none() {
            self.trace = on;
        }
        self
    }

    pub fn is_tracing(&self) -> bool {
        self.trace
    }

    pub fn transaction_depth(&self) -> usize {
        self.transact.depth()
    }

    pub fn cached_statement_count(&self) -> usize {
        self.statements.len()
    }

    pub fn cached_descriptor_count(&self) -> usize {
        self.descriptors.len()
    }

    /// Derives (or reuses) the descriptor of `R`, latching derivation errors.
    pub fn descriptor<R: Record>(&mut self) -> Option<Arc<Descriptor<R>>> {
        if self.err.is_some() {
            return None;
        }
        let result = self.descriptors.get_or_derive::<R>();
        self.latch(result)
    }

    /// Compiles (or reuses) and runs a raw statement list.
    pub fn exec(&mut self, text: &str, params: &[&dyn Param]) -> Vec<RowSet> {
        if self.err.is_some() {
            return Vec::new();
        }
        let result = to_values(params).and_then(|values| self.execute(text, &values));
        self.latch(result).unwrap_or_default()
    }

    /// Begins a possibly nested transaction.
    pub fn begin(&mut self) -> &mut Self {
        if self.err.is_none() {
            self.begin_scope();
        }
        self
    }

    pub fn commit(&mut self) -> &mut Self {
        if self.err.is_none() {
            self.end_scope(true);
        }
        self
    }

    pub fn rollback(&mut self) -> &mut Self {
        if self.err.is_none() {
            self.end_scope(false);
        }
        self
    }

    pub(crate) fn latch<T>(&mut self, result: Result<T, DbError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.set_error(e);
                None
            }
        }
    }

    /// Runs `body` inside one transaction scope, committing when it and the
    /// handle are error free and rolling back otherwise.
    pub(crate) fn transaction<F>(&mut self, body: F)
    where
        F: FnOnce(&mut Self) -> Result<(), DbError>,
    {
        if !self.begin_scope() {
            return;
        }
        let result = body(self);
        let ok = self.latch(result).is_some() && self.err.is_none();
        self.end_scope(ok);
    }

    /// The statement executor. Every statement the handle runs passes through
    /// here; the latched error is not consulted.
    pub(crate) fn execute(&mut self, text: &str, params: &[Value]) -> Result<Vec<RowSet>, DbError> {
        let Some(engine) = self.engine.as_mut() else {
            return Err(DbError::Closed);
        };

        let compiled = self.statements.get_or_compile(text, |text| engine.compile(text));
        let cached = matches!(compiled, Ok((_, true)));
        let result = compiled
            .and_then(|(compiled, _)| engine.execute(self.transact.context(), &compiled, params));

        if self.trace {
            info!(
                target: "sqlm::trace",
                "SQL [{}{}{}] {}",
                if cached { "C" } else { "-" },
                if self.transact.context().is_some() { "T" } else { "-" },
                if result.is_err() || self.err.is_some() { "E" } else { "-" },
                text
            );
        }
        result
    }

    fn begin_scope(&mut self) -> bool {
        let step = self.transact.begin();
        if step == BeginStep::Open {
            if let Err(e) = self.execute(BEGIN, &[]) {
                self.transact.abandon();
                self.set_error(e);
                return false;
            }
            debug!(tx = ?self.transact.context().map(|ctx| ctx.id()), "transaction opened");
        }
        self.transact.entered();
        true
    }

    fn end_scope(&mut self, commit: bool) {
        let step = match self.transact.end(commit) {
            Ok(step) => step,
            Err(e) => {
                self.set_error(e);
                return;
            }
        };

        match step {
            EndStep::Nest => self.transact.exited(),
            EndStep::Commit => match self.execute(COMMIT, &[]) {
                Ok(_) => {
                    debug!("transaction committed");
                    self.transact.exited();
                }
                Err(e) => {
                    self.set_error(e);
                    self.roll_back();
                }
            },
            EndStep::Rollback => {
                let poisoned = commit && self.transact.is_rollback_only();
                if self.roll_back() && poisoned {
                    self.set_error(DbError::RolledBack);
                }
            }
        }
    }

    fn roll_back(&mut self) -> bool {
        match self.execute(ROLLBACK, &[]) {
            Ok(_) => {
                debug!("transaction rolled back");
                self.transact.exited();
                true
            }
            Err(e) => {
                self.set_error(e);
                false
            }
        }
    }
}

pub(crate) fn to_values(params: &[&dyn Param]) -> Result<Vec<Value>, DbError> {
    params.iter().map(|param| param.to_param()).collect()
}
