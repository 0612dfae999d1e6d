///
/// # sqlm: Declarative record mapping for SQLite
///
/// Describe a record type once with field tags, then create its table and
/// insert, update, delete and retrieve rows without writing SQL for the
/// common cases. Statement text is generated from a per-type descriptor that
/// is derived on first use and cached for the life of the handle.
///
/// ## Library Usage
///
/// ```rust,ignore
/// use sqlm::{params, record, Database};
///
/// record! {
///     #[derive(Debug, Clone, Default)]
///     pub struct Member {
///         #[table("member")]
///         pub id: i64,
///         #[column]
///         pub name: String,
///         #[column("group_num")]
///         pub num: i64,
///     }
/// }
///
/// let mut db = Database::create("members.db")?;
/// let mut list = Vec::new();
/// db.table_create::<Member>()
///     .insert(&members)
///     .retrieve(&mut list, "WHERE group_num > ?1 ORDER BY name", params![1000]);
/// db.result()?;
/// ```
///
/// ## Error Handling
///
/// Operations latch the first error on the handle and turn into no-ops until
/// it is cleared, so a chain of calls is checked once with `error()`,
/// `result()` or `take_error()`.
///

pub mod config;
pub mod crud;
pub mod db;
pub mod descriptor;
pub mod engine;
pub mod errors;
pub mod record;
pub mod statement;
pub mod transaction;
pub mod value;

#[cfg(test)]
mod testing;

pub use config::DbOptions;
pub use db::Database;
pub use descriptor::{Descriptor, DescriptorCache, ALL_COLUMNS, ROW_ID};
pub use engine::{split_statements, Engine, RowSet, SqliteEngine, StatementList, TxContext};
pub use errors::DbError;
pub use record::{FieldDef, Record, Shape, Tag, FIELD_NAME};
pub use statement::StatementCache;
pub use transaction::TransactionTracker;
pub use value::{FieldValue, Param, Value};
