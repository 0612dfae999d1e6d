///
/// # Type Descriptors
///
/// A `Descriptor` is the per-record-type mapping every CRUD operation works
/// from: the table name, the key field, the column → field correspondence and
/// the SQL fragments generated from them. It is derived from `Record::shape()`
/// once per handle and cached by `TypeId`; a cached descriptor is never
/// modified or re-validated.
///
/// ## Derivation Rules
///
/// Fields are scanned in declaration order:
///
/// 1. A field with a column tag becomes a managed column. Its semantic type
///    must be in the supported list, otherwise derivation fails naming it.
/// 2. A field with a table tag names the table and holds the row identifier.
///    Only one is allowed, and it must be a plain `i64` (not `Option<i64>`).
/// 3. After the scan, a type without managed columns or without a table tag
///    is rejected.
///
/// Nothing is cached when derivation fails.
///
/// ## Fragments
///
/// For `struct Rec { #[table("rec")] id: i64, #[column] a: i64, #[column] name: String }`:
///
/// - create: `a INTEGER, name TEXT`
/// - insert: `a, name` / `?1, ?2`
/// - select: `rowid, a, name`
///

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::errors::DbError;
use crate::record::{FieldDef, Record, FIELD_NAME};
use crate::value::{column_declaration, is_supported, semantic_type, FieldValue, Value};

/// Row identifier expression of the engine.
pub const ROW_ID: &str = "rowid";

/// Update target meaning "every managed column".
pub const ALL_COLUMNS: &str = "*";

#[derive(Debug, Default)]
struct InsertFragments {
    names: Vec<String>,
    name_list: String,
    placeholders: String,
    fields: Vec<usize>,
}

#[derive(Debug, Default)]
struct SelectFragments {
    name_list: String,
    fields: Vec<usize>,
    type_names: Vec<String>,
}

#[derive(Debug)]
pub struct Descriptor<R> {
    record: &'static str,
    table: String,
    key: usize,
    fields: Vec<FieldDef<R>>,
    columns: IndexMap<String, usize>,
    create: String,
    insert: InsertFragments,
    select: SelectFragments,
}

impl<R: Record> Descriptor<R> {
    pub fn derive() -> Result<Self, DbError> {
        let shape = R::shape();
        let record = shape.record_name();
        let fields = shape.into_fields();

        let mut table: Option<(&'static str, usize)> = None;
        let mut columns = IndexMap::new();
        let mut create_list = Vec::new();
        let mut insert = InsertFragments::default();
        let mut select_list = Vec::new();
        let mut select = SelectFragments::default();

        for (index, field) in fields.iter().enumerate() {
            if let Some(tag) = field.column_tag() {
                let column = if tag == FIELD_NAME { field.name() } else { tag };
                let semantic = semantic_type(field.type_name());
                if !is_supported(semantic) {
                    return Err(DbError::UnsupportedType {
                        type_name: semantic.to_string(),
                    });
                }

                columns.insert(column.to_string(), index);
                create_list.push(format!("{} {}", column, column_declaration(semantic)));
                insert.names.push(column.to_string());
                insert.fields.push(index);
                select_list.push(column.to_string());
                select.fields.push(index);
                select.type_names.push(semantic.to_string());
            } else if let Some(name) = field.table_tag() {
                if table.is_some() {
                    return Err(DbError::DuplicateTableTag {
                        record: record.to_string(),
                    });
                }
                if field.is_nullable() || field.type_name() != i64::type_name() {
                    let found = if field.is_nullable() {
                        format!("Option<{}>", field.type_name())
                    } else {
                        field.type_name().to_string()
                    };
                    return Err(DbError::KeyNotInt64 {
                        record: record.to_string(),
                        field: field.name().to_string(),
                        found,
                    });
                }

                table = Some((name, index));
                select_list.push(ROW_ID.to_string());
                select.fields.push(index);
                select.type_names.push(i64::type_name().to_string());
            }
        }

        if insert.fields.is_empty() {
            return Err(DbError::NoColumns {
                record: record.to_string(),
            });
        }
        let Some((table, key)) = table else {
            return Err(DbError::MissingTableTag {
                record: record.to_string(),
            });
        };

        insert.name_list = insert.names.join(", ");
        insert.placeholders = (1..=insert.fields.len())
            .map(|pos| format!("?{}", pos))
            .collect::<Vec<_>>()
            .join(", ");
        select.name_list = select_list.join(", ");

        Ok(Self {
            record,
            table: table.to_string(),
            key,
            fields,
            columns,
            create: create_list.join(", "),
            insert,
            select,
        })
    }

    pub fn record_name(&self) -> &'static str {
        self.record
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key_field(&self) -> &FieldDef<R> {
        &self.fields[self.key]
    }

    pub fn column(&self, name: &str) -> Option<&FieldDef<R>> {
        self.columns.get(name).map(|&index| &self.fields[index])
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn create_columns(&self) -> &str {
        &self.create
    }

    pub fn insert_columns(&self) -> &str {
        &self.insert.name_list
    }

    pub fn insert_placeholders(&self) -> &str {
        &self.insert.placeholders
    }

    pub fn select_columns(&self) -> &str {
        &self.select.name_list
    }

    pub fn select_types(&self) -> &[String] {
        &self.select.type_names
    }

    pub fn drop_table_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {};", self.table)
    }

    pub fn create_table_sql(&self) -> String {
        format!("CREATE TABLE {} ({});", self.table, self.create)
    }

    pub fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES ({});",
            self.table, self.insert.name_list, self.insert.placeholders
        )
    }

    pub fn select_sql(&self, tail: &str) -> String {
        format!("SELECT {} FROM {}{};", self.select.name_list, self.table, pre_pad(tail))
    }

    pub fn delete_sql(&self, tail: &str) -> String {
        format!("DELETE FROM {}{};", self.table, pre_pad(tail))
    }

    /// Builds `UPDATE … SET … WHERE rowid == ?N` for the named columns and
    /// returns it with the field indexes to bind, key field last.
    pub fn update_sql(&self, names: &[&str]) -> Result<(String, Vec<usize>), DbError> {
        if names.is_empty() {
            return Err(DbError::NoUpdateColumns);
        }
        let targets: Vec<&str> = if names[0] == ALL_COLUMNS {
            self.insert.names.iter().map(String::as_str).collect()
        } else {
            names.to_vec()
        };

        let mut assignments = Vec::with_capacity(targets.len());
        let mut bind = Vec::with_capacity(targets.len() + 1);
        for (pos, name) in targets.iter().enumerate() {
            let index = *self.columns.get(*name).ok_or_else(|| DbError::UnknownColumn {
                table: self.table.clone(),
                column: name.to_string(),
            })?;
            assignments.push(format!("{} = ?{}", name, pos + 1));
            bind.push(index);
        }
        bind.push(self.key);

        let sql = format!(
            "UPDATE {} SET {} WHERE {} == ?{};",
            self.table,
            assignments.join(", "),
            ROW_ID,
            bind.len()
        );
        Ok((sql, bind))
    }

    pub fn insert_values(&self, rec: &R) -> Result<Vec<Value>, DbError> {
        self.values(rec, &self.insert.fields)
    }

    pub fn values(&self, rec: &R, indexes: &[usize]) -> Result<Vec<Value>, DbError> {
        indexes
            .iter()
            .map(|&index| self.fields[index].read(rec))
            .collect()
    }

    /// Decodes one result row of `select_sql` into a fresh record.
    pub fn decode_row(&self, row: &[Value]) -> Result<R, DbError> {
        if row.len() != self.select.fields.len() {
            return Err(DbError::RowShape {
                expected: self.select.fields.len(),
                found: row.len(),
            });
        }

        let mut rec = R::default();
        for (pos, value) in row.iter().enumerate() {
            let field = &self.fields[self.select.fields[pos]];
            field
                .write(&mut rec, value.clone())
                .map_err(|e| with_column(e, field.name()))?;
        }
        Ok(rec)
    }
}

fn pre_pad(tail: &str) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!(" {}", tail)
    }
}

fn with_column(err: DbError, name: &str) -> DbError {
    match err {
        DbError::Decode {
            column,
            expected,
            found,
        } if column.is_empty() => DbError::Decode {
            column: name.to_string(),
            expected,
            found,
        },
        other => other,
    }
}

/// Descriptors derived so far, keyed by record type.
#[derive(Default)]
pub struct DescriptorCache {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl DescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_derive<R: Record>(&mut self) -> Result<Arc<Descriptor<R>>, DbError> {
        let id = TypeId::of::<R>();
        if let Some(entry) = self.entries.get(&id) {
            if let Ok(dsc) = Arc::clone(entry).downcast::<Descriptor<R>>() {
                return Ok(dsc);
            }
        }

        let dsc = Arc::new(Descriptor::<R>::derive()?);
        debug!(
            record = dsc.record_name(),
            table = dsc.table(),
            columns = dsc.insert_columns(),
            "derived descriptor"
        );
        self.entries.insert(id, dsc.clone());
        Ok(dsc)
    }

    pub fn contains<R: Record>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<R>())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
