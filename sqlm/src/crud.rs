///
/// # Record Operations
///
/// Table creation, insert, update, delete, truncate and retrieve for any
/// `Record` type. Each operation:
///
/// 1. does nothing when an error is already latched,
/// 2. fetches the record's descriptor (derived once, then cached),
/// 3. generates its statement text from the descriptor,
/// 4. runs the statements through the handle's executor.
///
/// Mutating operations run inside one transaction scope, so a failure part
/// way through leaves the table as it was before the call. When the caller
/// already holds an open transaction the scope nests inside it.
///
/// Filter tails are appended verbatim after the generated statement and may
/// refer to positional parameters `?1..?N` supplied alongside.
///

use crate::db::{to_values, Database};
use crate::engine::{Engine, RowSet};
use crate::errors::DbError;
use crate::record::Record;
use crate::value::Param;

impl<E: Engine> Database<E> {
    /// Drops and recreates the table of `R`.
    pub fn table_create<R: Record>(&mut self) -> &mut Self {
        let Some(dsc) = self.descriptor::<R>() else {
            return self;
        };
        self.transaction(|db| {
            db.execute(&dsc.drop_table_sql(), &[])?;
            db.execute(&dsc.create_table_sql(), &[])?;
            Ok(())
        });
        self
    }

    /// Inserts every record as a new row. Key fields are ignored; the engine
    /// assigns row identifiers.
    pub fn insert<R: Record>(&mut self, records: &[R]) -> &mut Self {
        let Some(dsc) = self.descriptor::<R>() else {
            return self;
        };
        if records.is_empty() {
            return self;
        }
        let sql = dsc.insert_sql();
        self.transaction(|db| {
            for rec in records {
                let values = dsc.insert_values(rec)?;
                db.execute(&sql, &values)?;
            }
            Ok(())
        });
        self
    }

    /// Writes the named columns of `rec` to the row its key identifies.
    /// A single `"*"` selects every mapped column.
    pub fn update<R: Record>(&mut self, rec: &R, columns: &[&str]) -> &mut Self {
        if self.is_err() {
            return self;
        }
        if columns.is_empty() {
            self.set_error(DbError::NoUpdateColumns);
            return self;
        }
        let Some(dsc) = self.descriptor::<R>() else {
            return self;
        };

        let statement = dsc
            .update_sql(columns)
            .and_then(|(sql, bind)| Ok((sql, dsc.values(rec, &bind)?)));
        let Some((sql, values)) = self.latch(statement) else {
            return self;
        };
        self.transaction(|db| db.execute(&sql, &values).map(drop));
        self
    }

    /// Deletes the rows of `R`'s table matching `tail`; an empty tail
    /// deletes every row.
    pub fn delete<R: Record>(&mut self, tail: &str, params: &[&dyn Param]) -> &mut Self {
        let Some(dsc) = self.descriptor::<R>() else {
            return self;
        };
        let Some(values) = self.latch(to_values(params)) else {
            return self;
        };
        let sql = dsc.delete_sql(tail);
        self.transaction(|db| db.execute(&sql, &values).map(drop));
        self
    }

    pub fn truncate<R: Record>(&mut self) -> &mut Self {
        self.delete::<R>("", &[])
    }

    /// Appends the rows matching `tail` to `dest`. `dest` is never cleared;
    /// nothing is appended when any row fails to decode.
    pub fn retrieve<R: Record>(
        &mut self,
        dest: &mut Vec<R>,
        tail: &str,
        params: &[&dyn Param],
    ) -> &mut Self {
        let Some(dsc) = self.descriptor::<R>() else {
            return self;
        };
        let sql = dsc.select_sql(tail);
        let result = to_values(params)
            .and_then(|values| self.execute(&sql, &values))
            .and_then(|sets| {
                let mut decoded = Vec::with_capacity(sets.iter().map(RowSet::len).sum());
                for set in &sets {
                    set.each(|row| {
                        decoded.push(dsc.decode_row(row)?);
                        Ok(true)
                    })?;
                }
                Ok(decoded)
            });
        if let Some(decoded) = self.latch(result) {
            dest.extend(decoded);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RowSet;
    use crate::params;
    use crate::testing::RecordingEngine;
    use crate::value::Value;

    crate::record! {
        #[derive(Debug, Clone, Default, PartialEq)]
        struct Member {
            #[table("member")]
            id: i64,
            #[column]
            name: String,
            #[column("group_num")]
            num: i64,
            scratch: i32,
        }
    }

    crate::record! {
        #[derive(Debug, Default)]
        struct Keyless {
            #[column]
            name: String,
        }
    }

    fn recording() -> Database<RecordingEngine> {
        Database::from_engine(RecordingEngine::default())
    }

    fn executed(db: &Database<RecordingEngine>) -> Vec<String> {
        db.engine().unwrap().executed_text()
    }

    fn member(name: &str, num: i64) -> Member {
        Member {
            name: name.to_string(),
            num,
            ..Member::default()
        }
    }

    #[test]
    fn test_table_create_runs_in_one_transaction() {
        let mut db = recording();
        db.table_create::<Member>();

        assert!(db.is_ok());
        assert_eq!(
            executed(&db),
            vec![
                "BEGIN TRANSACTION;",
                "DROP TABLE IF EXISTS member;",
                "CREATE TABLE member (name TEXT, group_num INTEGER);",
                "COMMIT;",
            ]
        );
    }

    #[test]
    fn test_table_create_rejects_bad_records_without_statements() {
        let mut db = recording();
        db.table_create::<Keyless>();
        assert!(matches!(db.error(), Some(DbError::MissingTableTag { .. })));
        assert!(executed(&db).is_empty());
        assert_eq!(db.cached_descriptor_count(), 0);
    }

    #[test]
    fn test_insert_binds_mapped_fields_and_reuses_the_statement() {
        let mut db = recording();
        let mut first = member("ann", 7);
        first.id = 99;
        db.insert(&[first, member("bob", 8)]);

        assert!(db.is_ok());
        let engine = db.engine().unwrap();
        assert_eq!(engine.compiled.len(), 3);
        let inserts: Vec<_> = engine.executed[1..3].iter().map(|(_, _, v)| v.clone()).collect();
        assert_eq!(
            inserts,
            vec![
                vec![Value::Text("ann".to_string()), Value::Integer(7)],
                vec![Value::Text("bob".to_string()), Value::Integer(8)],
            ]
        );
        assert_eq!(engine.executed[1].1, "INSERT INTO member (name, group_num) VALUES (?1, ?2);");
        assert_eq!(engine.executed[3].1, "COMMIT;");
    }

    #[test]
    fn test_insert_failure_rolls_back_the_whole_call() {
        let mut db = recording();
        db.engine_mut().unwrap().fail_at(2);
        db.insert(&[member("a", 1), member("b", 2), member("c", 3)]);

        assert!(matches!(db.error(), Some(DbError::Engine(_))));
        assert_eq!(db.transaction_depth(), 0);
        let log = executed(&db);
        assert_eq!(log.len(), 4);
        assert_eq!(log.last().unwrap(), "ROLLBACK;");
    }

    #[test]
    fn test_insert_nests_inside_caller_transaction() {
        let mut db = recording();
        db.begin();
        db.insert(&[member("a", 1)]).insert(&[member("b", 2)]);
        db.commit();

        let log = executed(&db);
        assert_eq!(log.iter().filter(|s| *s == "BEGIN TRANSACTION;").count(), 1);
        assert_eq!(log.iter().filter(|s| *s == "COMMIT;").count(), 1);
    }

    #[test]
    fn test_update_named_columns() {
        let mut db = recording();
        let mut rec = member("ann", 1003);
        rec.id = 4;
        db.update(&rec, &["group_num"]);

        assert!(db.is_ok());
        let (_, sql, values) = &db.engine().unwrap().executed[1];
        assert_eq!(sql, "UPDATE member SET group_num = ?1 WHERE rowid == ?2;");
        assert_eq!(values, &vec![Value::Integer(1003), Value::Integer(4)]);
    }

    #[test]
    fn test_update_usage_errors_run_nothing() {
        let mut db = recording();
        db.update(&member("a", 1), &[]);
        assert!(matches!(db.error(), Some(DbError::NoUpdateColumns)));

        db.clear_error();
        db.update(&member("a", 1), &["scratch"]);
        assert_eq!(
            db.error().unwrap().to_string(),
            "table 'member' has no column 'scratch'"
        );
        assert!(executed(&db).is_empty());
    }

    #[test]
    fn test_delete_and_truncate() {
        let mut db = recording();
        db.delete::<Member>("WHERE group_num == ?1", params![3i64]);
        db.truncate::<Member>();

        assert!(db.is_ok());
        let engine = db.engine().unwrap();
        assert_eq!(engine.executed[1].1, "DELETE FROM member WHERE group_num == ?1;");
        assert_eq!(engine.executed[1].2, vec![Value::Integer(3)]);
        assert_eq!(engine.executed[4].1, "DELETE FROM member;");
    }

    #[test]
    fn test_retrieve_appends_decoded_rows() {
        let mut db = recording();
        db.engine_mut().unwrap().answer_selects(RowSet::new(
            vec!["rowid".into(), "name".into(), "group_num".into()],
            vec![
                vec![Value::Integer(1), Value::Text("ann".into()), Value::Integer(7)],
                vec![Value::Integer(2), Value::Text("bob".into()), Value::Integer(8)],
            ],
        ));

        let mut list = vec![member("kept", 0)];
        db.retrieve(&mut list, "ORDER BY name", params![]);

        assert!(db.is_ok());
        assert_eq!(list.len(), 3);
        assert_eq!(list[1], Member { id: 1, name: "ann".into(), num: 7, scratch: 0 });
        assert_eq!(list[2].id, 2);
        assert_eq!(
            executed(&db),
            vec!["SELECT rowid, name, group_num FROM member ORDER BY name;"]
        );
    }

    #[test]
    fn test_retrieve_decode_failure_appends_nothing() {
        let mut db = recording();
        db.engine_mut().unwrap().answer_selects(RowSet::new(
            vec!["rowid".into(), "name".into(), "group_num".into()],
            vec![
                vec![Value::Integer(1), Value::Text("ann".into()), Value::Integer(7)],
                vec![Value::Integer(2), Value::Text("bob".into()), Value::Text("x".into())],
            ],
        ));

        let mut list = Vec::new();
        db.retrieve::<Member>(&mut list, "", params![]);
        assert!(list.is_empty());
        match db.error() {
            Some(DbError::Decode { column, .. }) => assert_eq!(column, "num"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_operations_are_no_ops_while_latched() {
        let mut db = recording();
        db.set_error_message("stop");
        let mut list: Vec<Member> = Vec::new();
        db.table_create::<Member>()
            .insert(&[member("a", 1)])
            .update(&member("a", 1), &["*"])
            .delete::<Member>("", params![])
            .truncate::<Member>()
            .retrieve(&mut list, "", params![]);

        assert!(executed(&db).is_empty());
        assert_eq!(db.cached_descriptor_count(), 0);
        assert_eq!(db.error().unwrap().to_string(), "stop");
    }
}
